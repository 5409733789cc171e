use std::{
    collections::BTreeMap,
    sync::{Mutex, MutexGuard, PoisonError},
};

use async_trait::async_trait;
use time::OffsetDateTime;
use tracing::debug;

use super::{normalize_email, NewUser, Role, StoreError, User, UserId, UserStore};

#[derive(Debug)]
struct UserTable {
    rows: BTreeMap<UserId, User>,
    next_id: UserId,
}

impl Default for UserTable {
    fn default() -> Self {
        Self {
            rows: BTreeMap::new(),
            next_id: 1,
        }
    }
}

/// Process-lifetime user store. State is not shared between processes, so
/// running several workers with this backend splits the user set.
#[derive(Debug, Default)]
pub struct MemoryUserStore {
    table: Mutex<UserTable>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    // A poisoned lock only means another request panicked mid-operation; the
    // table itself is never left half-written.
    fn table(&self) -> MutexGuard<'_, UserTable> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let key = normalize_email(email);
        Ok(self.table().rows.values().find(|u| u.email == key).cloned())
    }

    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, StoreError> {
        Ok(self.table().rows.get(&id).cloned())
    }

    async fn create(&self, new_user: NewUser) -> Result<User, StoreError> {
        let email = normalize_email(&new_user.email);
        // Check and insert under one guard.
        let mut table = self.table();
        if table.rows.values().any(|u| u.email == email) {
            return Err(StoreError::Conflict);
        }
        let id = table.next_id;
        table.next_id += 1;
        let now = OffsetDateTime::now_utc();
        let user = User {
            id,
            email,
            password_hash: new_user.password_hash,
            name: new_user.name,
            role: new_user.role.unwrap_or_default(),
            created_at: now,
            updated_at: now,
        };
        table.rows.insert(id, user.clone());
        debug!(user_id = id, "user inserted into memory store");
        Ok(user)
    }

    async fn list_all(&self) -> Result<Vec<User>, StoreError> {
        // Ids grow with insertion order, so reverse id order is newest first.
        Ok(self.table().rows.values().rev().cloned().collect())
    }

    async fn delete(&self, id: UserId) -> Result<bool, StoreError> {
        Ok(self.table().rows.remove(&id).is_some())
    }

    async fn set_role(&self, id: UserId, role: Role) -> Result<Option<User>, StoreError> {
        let mut table = self.table();
        Ok(table.rows.get_mut(&id).map(|u| {
            u.role = role;
            u.updated_at = OffsetDateTime::now_utc();
            u.clone()
        }))
    }

    async fn count(&self) -> Result<i64, StoreError> {
        Ok(self.table().rows.len() as i64)
    }
}
