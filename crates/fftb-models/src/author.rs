//! Publisher and performer identities.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

/// Prefix for publisher authority names.
pub const PUBLISHERS_PREFIX: &str = "v1/publishers";

/// Prefix for performer authority names.
pub const PERFORMERS_PREFIX: &str = "v1/performers";

/// A publisher or performer.
///
/// Identity is the name alone: two authors with the same name are the same
/// caller regardless of which key they presented.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Author {
    /// Unique author name
    pub name: String,

    /// Signed authority key, when the author was issued one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authority_key: Option<String>,
}

impl Author {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            authority_key: None,
        }
    }

    pub fn with_authority_key(mut self, key: impl Into<String>) -> Self {
        self.authority_key = Some(key.into());
        self
    }

    /// Author registered as a publisher under `name`.
    pub fn publisher(name: &str) -> Self {
        Self::new(format!("{}/{}", PUBLISHERS_PREFIX, name))
    }

    /// Author registered as a performer under `name`.
    pub fn performer(name: &str) -> Self {
        Self::new(format!("{}/{}", PERFORMERS_PREFIX, name))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_empty()
    }
}

impl PartialEq for Author {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for Author {}

impl Hash for Author {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl fmt::Display for Author {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}
