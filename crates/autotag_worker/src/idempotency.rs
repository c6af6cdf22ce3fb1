//! Shared "already handled" markers.
//!
//! Check-then-mark is two round trips and not atomic. Two workers racing on
//! the same key can both run the job; every side effect downstream (tag add,
//! folder create, upload with auto-rename) tolerates being repeated, so the
//! store only has to guarantee that a marking is never lost.

use async_trait::async_trait;
use autotag_protocol::IdempotencyKey;
use redis::aio::ConnectionManager;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Idempotency store unavailable: {0}")]
    Redis(#[from] redis::RedisError),
}

#[async_trait]
pub trait IdempotencyStore: Send + Sync {
    async fn already_processed(&self, key: &IdempotencyKey) -> Result<bool, StoreError>;

    /// Record the key. `ttl` of `None` or zero keeps it forever.
    async fn mark_processed(
        &self,
        key: &IdempotencyKey,
        ttl: Option<Duration>,
    ) -> Result<(), StoreError>;
}

/// Whole seconds of a TTL, or `None` when the marker should not expire.
fn ttl_secs(ttl: Option<Duration>) -> Option<u64> {
    ttl.map(|d| d.as_secs()).filter(|secs| *secs > 0)
}

// ============================================================================
// Redis
// ============================================================================

/// Redis-backed store shared by every worker process.
///
/// `ConnectionManager` reconnects on its own; a clone per call is cheap and
/// multiplexes over the same connection.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
}

impl RedisStore {
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        info!("Connected to idempotency store");
        Ok(Self { conn })
    }
}

#[async_trait]
impl IdempotencyStore for RedisStore {
    async fn already_processed(&self, key: &IdempotencyKey) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let exists: bool = redis::cmd("EXISTS")
            .arg(key.as_str())
            .query_async(&mut conn)
            .await?;
        Ok(exists)
    }

    async fn mark_processed(
        &self,
        key: &IdempotencyKey,
        ttl: Option<Duration>,
    ) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let mut cmd = redis::cmd("SET");
        cmd.arg(key.as_str()).arg("1");
        if let Some(secs) = ttl_secs(ttl) {
            cmd.arg("EX").arg(secs);
        }
        let _: () = cmd.query_async(&mut conn).await?;
        debug!(key = %key, ttl_secs = ?ttl_secs(ttl), "Marked processed");
        Ok(())
    }
}

// ============================================================================
// In-memory
// ============================================================================

/// Process-local store for tests and single-process runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Option<Instant>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.lock()
            .values()
            .filter(|expiry| expiry.map_or(true, |at| at > now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Option<Instant>>> {
        // A poisoned map is still a valid map.
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl IdempotencyStore for MemoryStore {
    async fn already_processed(&self, key: &IdempotencyKey) -> Result<bool, StoreError> {
        let mut entries = self.lock();
        match entries.get(key.as_str()) {
            Some(Some(expiry)) if *expiry <= Instant::now() => {
                entries.remove(key.as_str());
                Ok(false)
            }
            Some(_) => Ok(true),
            None => Ok(false),
        }
    }

    async fn mark_processed(
        &self,
        key: &IdempotencyKey,
        ttl: Option<Duration>,
    ) -> Result<(), StoreError> {
        let expiry = ttl_secs(ttl).map(|secs| Instant::now() + Duration::from_secs(secs));
        self.lock().insert(key.as_str().to_string(), expiry);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use autotag_protocol::{JobKind, RepoEvent};

    fn key(node: &str) -> IdempotencyKey {
        let body = format!(
            r#"{{"nodeRef":"workspace://SpacesStore/{}","eventType":"CONTENT_READY"}}"#,
            node
        );
        IdempotencyKey::for_job(JobKind::Tagging, &RepoEvent::from_json(body.as_bytes()).unwrap())
    }

    #[tokio::test]
    async fn test_mark_then_check() {
        let store = MemoryStore::new();
        let k = key("n1");
        assert!(!store.already_processed(&k).await.unwrap());

        store.mark_processed(&k, None).await.unwrap();
        assert!(store.already_processed(&k).await.unwrap());
        assert!(!store.already_processed(&key("n2")).await.unwrap());
    }

    #[tokio::test]
    async fn test_marking_twice_is_harmless() {
        let store = MemoryStore::new();
        let k = key("n1");
        store.mark_processed(&k, None).await.unwrap();
        store.mark_processed(&k, None).await.unwrap();
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_zero_ttl_means_no_expiry() {
        assert_eq!(ttl_secs(None), None);
        assert_eq!(ttl_secs(Some(Duration::ZERO)), None);
        assert_eq!(ttl_secs(Some(Duration::from_secs(86_400))), Some(86_400));
    }
}
