//! User directory collaborator seam
//!
//! Account storage and authentication live outside the core; the core only
//! needs profile lookup for drop-file substitution, the security-level
//! check, and the per-door daily usage counter. `MemoryDirectory` is the
//! in-process implementation used by the standalone binary and the tests.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::types::UserProfile;

/// Queries the core consumes from the user-directory collaborator
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Look up a profile by handle (case-insensitive)
    async fn lookup(&self, handle: &str) -> Option<UserProfile>;

    /// How many times this user launched this door today
    async fn usage_today(&self, handle: &str, door: &str) -> u32;

    /// Record one launch of a door by a user
    async fn record_usage(&self, handle: &str, door: &str);
}

/// In-memory directory backed by a pair of maps
#[derive(Debug, Default)]
pub struct MemoryDirectory {
    users: RwLock<HashMap<String, UserProfile>>,
    usage: RwLock<HashMap<(String, String), u32>>,
}

impl MemoryDirectory {
    /// Create an empty directory
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a profile
    pub async fn insert(&self, profile: UserProfile) {
        let key = profile.handle.to_lowercase();
        self.users.write().await.insert(key, profile);
    }
}

#[async_trait]
impl UserDirectory for MemoryDirectory {
    async fn lookup(&self, handle: &str) -> Option<UserProfile> {
        self.users.read().await.get(&handle.to_lowercase()).cloned()
    }

    async fn usage_today(&self, handle: &str, door: &str) -> u32 {
        let key = (handle.to_lowercase(), door.to_string());
        self.usage.read().await.get(&key).copied().unwrap_or(0)
    }

    async fn record_usage(&self, handle: &str, door: &str) {
        let key = (handle.to_lowercase(), door.to_string());
        *self.usage.write().await.entry(key).or_insert(0) += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_lookup_is_case_insensitive() {
        let dir = MemoryDirectory::new();
        dir.insert(UserProfile::guest("Cyber")).await;

        assert!(dir.lookup("CYBER").await.is_some());
        assert!(dir.lookup("cyber").await.is_some());
        assert!(dir.lookup("nobody").await.is_none());
    }

    #[tokio::test]
    async fn test_usage_counter() {
        let dir = MemoryDirectory::new();
        assert_eq!(dir.usage_today("cyber", "lord").await, 0);

        dir.record_usage("cyber", "lord").await;
        dir.record_usage("CYBER", "lord").await;
        assert_eq!(dir.usage_today("cyber", "lord").await, 2);
        assert_eq!(dir.usage_today("cyber", "tradewars").await, 0);
    }
}
