//! Request handlers.

pub mod auth;
pub mod health;
pub mod orders;
pub mod segments;

pub use auth::*;
pub use health::*;
pub use orders::*;
pub use segments::*;
