//! In-memory preferences store

use super::PreferencesStore;
use crate::error::AtriumResult;
use crate::ids::UserId;
use crate::types::UserPreferences;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;

/// Preferences kept in process memory.
#[derive(Debug, Default)]
pub struct InMemoryPreferences {
    entries: RwLock<HashMap<UserId, UserPreferences>>,
}

impl InMemoryPreferences {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store preferences for a user, replacing previous ones.
    pub fn set(&self, user: UserId, preferences: UserPreferences) {
        self.entries.write().insert(user, preferences);
    }

    /// Forget a user's preferences.
    pub fn remove(&self, user: &UserId) -> Option<UserPreferences> {
        self.entries.write().remove(user)
    }
}

#[async_trait]
impl PreferencesStore for InMemoryPreferences {
    async fn preferences(&self, user: &UserId) -> AtriumResult<Option<UserPreferences>> {
        Ok(self.entries.read().get(user).copied())
    }
}
