//! Mock user directory.

use crate::error::{EngineError, Result};
use crate::providers::UserDirectory;
use crate::types::{Role, User, UserId};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};

/// In-memory user directory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryUserDirectory {
    users: Arc<Mutex<HashMap<UserId, User>>>,
}

impl InMemoryUserDirectory {
    /// Create an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a user.
    pub fn insert(&self, id: UserId, role: Role) {
        self.users
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(id, User { id, role });
    }
}

impl UserDirectory for InMemoryUserDirectory {
    fn find_user(&self, id: UserId) -> impl Future<Output = Result<Option<User>>> + Send {
        let users = Arc::clone(&self.users);

        async move {
            Ok(users
                .lock()
                .map_err(|_| EngineError::StorageFault("user directory lock poisoned".to_string()))?
                .get(&id)
                .cloned())
        }
    }
}
