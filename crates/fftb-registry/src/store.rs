//! Key/value store contract.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::RegistryResult;

/// Minimal durable key/value store.
///
/// Keys are type-prefixed paths such as `v1/segments/<id>`. Patterns use
/// `*` (any run of characters) and `?` (one character).
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Value stored under `key`; `NotFound` when absent or expired.
    async fn get(&self, key: &str) -> RegistryResult<String>;

    async fn set(&self, key: &str, value: String) -> RegistryResult<()>;

    /// Every live value whose key matches `pattern`, ordered by key.
    async fn find_all(&self, pattern: &str) -> RegistryResult<Vec<String>>;

    /// Remove `key`. Destroying a missing key is not an error.
    async fn destroy(&self, key: &str) -> RegistryResult<()>;

    /// Expire `key` at `at`; a deadline in the past removes it immediately.
    async fn expire_at(&self, key: &str, at: DateTime<Utc>) -> RegistryResult<()>;

    /// Make buffered writes durable.
    async fn persist(&self) -> RegistryResult<()>;
}

/// Glob match supporting `*` and `?`.
pub fn pattern_matches(pattern: &str, key: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let key: Vec<char> = key.chars().collect();

    let (mut p, mut k) = (0, 0);
    let mut star: Option<(usize, usize)> = None;

    while k < key.len() {
        if p < pattern.len() && (pattern[p] == '?' || pattern[p] == key[k]) {
            p += 1;
            k += 1;
        } else if p < pattern.len() && pattern[p] == '*' {
            star = Some((p, k));
            p += 1;
        } else if let Some((star_p, star_k)) = star {
            p = star_p + 1;
            k = star_k + 1;
            star = Some((star_p, star_k + 1));
        } else {
            return false;
        }
    }

    pattern[p..].iter().all(|c| *c == '*')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pattern_matches() {
        assert!(pattern_matches("v1/segments/*", "v1/segments/abc"));
        assert!(pattern_matches("v1/segments/*", "v1/segments/"));
        assert!(!pattern_matches("v1/segments/*", "v1/orders/abc"));
        assert!(pattern_matches("*", "anything"));
        assert!(pattern_matches("v1/*/a?c", "v1/orders/abc"));
        assert!(!pattern_matches("v1/*/a?c", "v1/orders/abbc"));
        assert!(pattern_matches("exact", "exact"));
        assert!(!pattern_matches("exact", "exactly"));
    }
}
