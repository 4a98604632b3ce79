//! Server-side copy of each user's current refresh token.
//!
//! One slot per identity: writing a new token replaces the previous one and
//! resets its time-to-live, which is what revokes older refresh tokens.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use deadpool_redis::redis::AsyncCommands;
use deadpool_redis::{Config as RedisConfig, Pool as RedisPool, Runtime};
use parking_lot::Mutex;
use subtle::ConstantTimeEq;

use crate::auth::{AuthError, AuthResult, UserId};

pub const DEFAULT_KEY_PREFIX: &str = "refresh_token";

/// Storage key for a user's refresh token slot.
pub fn session_key(prefix: &str, user_id: UserId) -> String {
    format!("{prefix}_{user_id}")
}

#[rocket::async_trait]
pub trait SessionStore: Send + Sync {
    /// Overwrites any existing entry for `user_id` and restarts its TTL.
    async fn put(&self, user_id: UserId, refresh_token: &str, ttl: Duration) -> AuthResult<()>;

    /// `Ok(None)` when the user has no live session.
    async fn get(&self, user_id: UserId) -> AuthResult<Option<String>>;
}

#[derive(Clone)]
pub struct RedisSessionStore {
    pool: RedisPool,
    prefix: String,
}

impl RedisSessionStore {
    pub fn new(pool: RedisPool, prefix: impl Into<String>) -> Self {
        Self {
            pool,
            prefix: prefix.into(),
        }
    }

    /// Builds a lazily-connecting pool; no connection is made until first use.
    pub fn connect(url: &str, prefix: impl Into<String>) -> AuthResult<Self> {
        let pool = RedisConfig::from_url(url)
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|err| AuthError::Config(format!("invalid redis configuration: {err}")))?;
        Ok(Self::new(pool, prefix))
    }

    pub async fn ping(&self) -> AuthResult<()> {
        let mut conn = self.pool.get().await?;
        deadpool_redis::redis::cmd("PING")
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(())
    }
}

#[rocket::async_trait]
impl SessionStore for RedisSessionStore {
    async fn put(&self, user_id: UserId, refresh_token: &str, ttl: Duration) -> AuthResult<()> {
        let mut conn = self.pool.get().await?;
        let key = session_key(&self.prefix, user_id);

        // SET .. EX replaces the value and the expiry in one command.
        conn.set_ex::<_, _, ()>(&key, refresh_token, ttl.as_secs().max(1))
            .await?;

        Ok(())
    }

    async fn get(&self, user_id: UserId) -> AuthResult<Option<String>> {
        let mut conn = self.pool.get().await?;
        let key = session_key(&self.prefix, user_id);

        let token: Option<String> = conn.get(&key).await?;
        Ok(token)
    }
}

#[derive(Debug)]
struct SessionEntry {
    refresh_token: String,
    expires_at: Instant,
}

/// Process-local store with the same overwrite and expiry semantics as the
/// Redis backend. Expired entries are dropped when next read.
#[derive(Debug)]
pub struct MemorySessionStore {
    prefix: String,
    entries: Mutex<HashMap<String, SessionEntry>>,
}

impl MemorySessionStore {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Time left before the user's entry expires, if there is one.
    pub fn remaining_ttl(&self, user_id: UserId) -> Option<Duration> {
        let key = session_key(&self.prefix, user_id);
        let entries = self.entries.lock();
        entries
            .get(&key)
            .and_then(|entry| entry.expires_at.checked_duration_since(Instant::now()))
    }
}

impl Default for MemorySessionStore {
    fn default() -> Self {
        Self::new(DEFAULT_KEY_PREFIX)
    }
}

#[rocket::async_trait]
impl SessionStore for MemorySessionStore {
    async fn put(&self, user_id: UserId, refresh_token: &str, ttl: Duration) -> AuthResult<()> {
        let key = session_key(&self.prefix, user_id);
        self.entries.lock().insert(
            key,
            SessionEntry {
                refresh_token: refresh_token.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn get(&self, user_id: UserId) -> AuthResult<Option<String>> {
        let key = session_key(&self.prefix, user_id);
        let mut entries = self.entries.lock();

        match entries.get(&key) {
            Some(entry) if entry.expires_at > Instant::now() => {
                Ok(Some(entry.refresh_token.clone()))
            }
            Some(_) => {
                entries.remove(&key);
                Ok(None)
            }
            None => Ok(None),
        }
    }
}

/// Whether a presented refresh token is byte-equal to the stored one, compared
/// in constant time.
pub fn tokens_match(presented: &str, stored: &str) -> bool {
    presented.as_bytes().ct_eq(stored.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_per_identity_and_stable() {
        assert_eq!(session_key("refresh_token", 10), "refresh_token_10");
        assert_eq!(session_key("refresh_token", 10), session_key("refresh_token", 10));
        assert_ne!(session_key("refresh_token", 1), session_key("refresh_token", 11));
    }

    #[test]
    fn token_comparison_is_exact() {
        assert!(tokens_match("abc.def.ghi", "abc.def.ghi"));
        assert!(!tokens_match("abc.def.ghi", "abc.def.ghj"));
        assert!(!tokens_match("abc", "abcd"));
        assert!(!tokens_match("", "abc"));
    }

    #[tokio::test]
    async fn put_overwrites_previous_token() {
        let store = MemorySessionStore::default();
        let ttl = Duration::from_secs(60);

        store.put(10, "first", ttl).await.expect("first put");
        store.put(10, "second", ttl).await.expect("second put");

        assert_eq!(store.get(10).await.expect("get"), Some("second".to_string()));
    }

    #[tokio::test]
    async fn identities_do_not_share_slots() {
        let store = MemorySessionStore::default();
        let ttl = Duration::from_secs(60);

        store.put(1, "one", ttl).await.expect("put 1");
        store.put(2, "two", ttl).await.expect("put 2");

        assert_eq!(store.get(1).await.expect("get 1"), Some("one".to_string()));
        assert_eq!(store.get(2).await.expect("get 2"), Some("two".to_string()));
        assert_eq!(store.get(3).await.expect("get 3"), None);
    }

    #[tokio::test]
    async fn entries_expire_after_ttl() {
        let store = MemorySessionStore::default();
        store
            .put(10, "short-lived", Duration::from_millis(30))
            .await
            .expect("put");

        tokio::time::sleep(Duration::from_millis(80)).await;

        assert_eq!(store.get(10).await.expect("get"), None);
        assert_eq!(store.remaining_ttl(10), None);
    }

    #[tokio::test]
    async fn rewrite_resets_ttl() {
        let store = MemorySessionStore::default();
        store
            .put(10, "token", Duration::from_secs(5))
            .await
            .expect("short put");
        store
            .put(10, "token", Duration::from_secs(3000))
            .await
            .expect("long put");

        let remaining = store.remaining_ttl(10).expect("entry present");
        assert!(remaining > Duration::from_secs(2990));
    }
}
