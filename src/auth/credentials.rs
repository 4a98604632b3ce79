//! Lookup of stored credentials by username.
//!
//! The user tables belong to the user-management side of the application; the
//! auth core only reads `{id, username, password_hash}` through
//! [`CredentialStore`].

use std::collections::HashMap;

use parking_lot::RwLock;
use rocket_db_pools::sqlx::{self, FromRow, PgPool};

use crate::auth::{AuthResult, UserId};

#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct CredentialRecord {
    pub user_id: UserId,
    pub username: String,
    pub password_hash: String,
}

#[rocket::async_trait]
pub trait CredentialStore: Send + Sync {
    async fn find_by_username(&self, username: &str) -> AuthResult<Option<CredentialRecord>>;
}

/// Postgres-backed credentials read from the `users` table.
#[derive(Debug, Clone)]
pub struct PgCredentialStore {
    pool: PgPool,
}

impl PgCredentialStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[rocket::async_trait]
impl CredentialStore for PgCredentialStore {
    async fn find_by_username(&self, username: &str) -> AuthResult<Option<CredentialRecord>> {
        let record = sqlx::query_as::<_, CredentialRecord>(
            "SELECT id AS user_id, username, password_hash FROM users WHERE username = $1",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }
}

/// In-process credential table, used by tests and local development.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    records: RwLock<HashMap<String, CredentialRecord>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, user_id: UserId, username: &str, password_hash: &str) {
        self.records.write().insert(
            username.to_string(),
            CredentialRecord {
                user_id,
                username: username.to_string(),
                password_hash: password_hash.to_string(),
            },
        );
    }
}

#[rocket::async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn find_by_username(&self, username: &str) -> AuthResult<Option<CredentialRecord>> {
        Ok(self.records.read().get(username).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_store_finds_exact_username() {
        let store = MemoryCredentialStore::new();
        store.insert(10, "alice", "$argon2id$hash");

        let found = store
            .find_by_username("alice")
            .await
            .expect("lookup")
            .expect("alice exists");
        assert_eq!(found.user_id, 10);
        assert_eq!(found.password_hash, "$argon2id$hash");

        assert!(store.find_by_username("ghost").await.expect("lookup").is_none());
        assert!(store.find_by_username("Alice").await.expect("lookup").is_none());
    }

    #[tokio::test]
    async fn reinserting_replaces_the_record() {
        let store = MemoryCredentialStore::new();
        store.insert(10, "alice", "old");
        store.insert(10, "alice", "new");

        let found = store.find_by_username("alice").await.expect("lookup");
        assert_eq!(found.map(|record| record.password_hash), Some("new".to_string()));
    }
}
