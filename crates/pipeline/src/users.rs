use std::collections::HashMap;

use gatehouse_core_types::{User, UserId};
use parking_lot::RwLock;
use tracing::debug;

/// Resolves request user ids to their roles and authorisations.
pub trait UserDirectory: Send + Sync {
    fn get_user(&self, user_id: &UserId) -> Option<User>;
    fn add_user(&self, user: User);

    /// Unknown users resolve to a user with no roles.
    fn resolve(&self, user_id: &UserId) -> User {
        self.get_user(user_id).unwrap_or_else(|| {
            debug!(user = %user_id, "unknown user, resolving without roles");
            User {
                user_id: user_id.clone(),
                ..User::default()
            }
        })
    }
}

#[derive(Debug, Default)]
pub struct InMemoryUserDirectory {
    users: RwLock<HashMap<UserId, User>>,
}

impl InMemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_users(users: impl IntoIterator<Item = User>) -> Self {
        let directory = Self::new();
        for user in users {
            directory.add_user(user);
        }
        directory
    }

    pub fn len(&self) -> usize {
        self.users.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.read().is_empty()
    }
}

impl UserDirectory for InMemoryUserDirectory {
    fn get_user(&self, user_id: &UserId) -> Option<User> {
        self.users.read().get(user_id).cloned()
    }

    fn add_user(&self, user: User) {
        self.users.write().insert(user.user_id.clone(), user);
    }
}
