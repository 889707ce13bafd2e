// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! In-flight guard for reconciliation runs.
//!
//! At most one run may be in flight across every replica of the service. The guard
//! is a lease on a single key in a shared store:
//!
//! - [`GuardStore::try_acquire`] is an atomic set-if-absent with a TTL, so two
//!   triggers racing for the key cannot both win.
//! - [`GuardStore::release`] only deletes the key while it still carries the lease's
//!   token. A run that outlived its TTL cannot free a lease someone else now holds.
//! - [`GuardStore::renew`] pushes the expiry out again, under the same token check.
//!   The holder renews while it works, so the TTL only bounds how long a crashed
//!   holder can block later runs, not how long a healthy run may take.
//!
//! [`RedisGuardStore`] is the shared implementation; [`MemoryGuardStore`] covers
//! single-replica deployments and tests.

use async_trait::async_trait;
use chrono::Utc;
use redis::aio::ConnectionManager;
use redis::Script;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::LazyLock;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

use crate::errors::SyncError;

static LEASE_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Deletes KEYS[1] only if it still holds ARGV[1].
static RELEASE_SCRIPT: LazyLock<Script> = LazyLock::new(|| {
    Script::new(
        r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
else
    return 0
end
"#,
    )
});

/// Extends KEYS[1] to ARGV[2] milliseconds only if it still holds ARGV[1].
static RENEW_SCRIPT: LazyLock<Script> = LazyLock::new(|| {
    Script::new(
        r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("PEXPIRE", KEYS[1], ARGV[2])
else
    return 0
end
"#,
    )
});

fn ttl_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

/// Proof of holding the guard key. Hand it back to [`GuardStore::release`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuardLease {
    key: String,
    token: String,
}

impl GuardLease {
    fn new(key: &str) -> Self {
        let token = format!(
            "{}-{}-{}",
            std::process::id(),
            Utc::now().timestamp_nanos_opt().unwrap_or_default(),
            LEASE_COUNTER.fetch_add(1, Ordering::Relaxed)
        );
        Self {
            key: key.to_string(),
            token,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn token(&self) -> &str {
        &self.token
    }
}

/// Shared store holding the in-flight flag.
#[async_trait]
pub trait GuardStore: Send + Sync {
    /// Atomically take `key` for `ttl` if nobody holds it.
    ///
    /// Returns `None` when another holder has the key.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Guard`] if the store cannot be reached.
    async fn try_acquire(&self, key: &str, ttl: Duration) -> Result<Option<GuardLease>, SyncError>;

    /// Release a lease. Returns `false` when the key had already expired or changed hands.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Guard`] if the store cannot be reached.
    async fn release(&self, lease: &GuardLease) -> Result<bool, SyncError>;

    /// Reset the lease's expiry to `ttl` from now. Returns `false` when the key had
    /// already expired or changed hands; the lease is lost and must not be renewed again.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Guard`] if the store cannot be reached.
    async fn renew(&self, lease: &GuardLease, ttl: Duration) -> Result<bool, SyncError>;

    /// Whether anybody currently holds `key`.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Guard`] if the store cannot be reached.
    async fn is_held(&self, key: &str) -> Result<bool, SyncError>;
}

/// Guard backed by Redis (`SET key token NX PX ttl`).
#[derive(Clone)]
pub struct RedisGuardStore {
    conn: ConnectionManager,
}

impl RedisGuardStore {
    /// Connect to the Redis server at `url`.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Guard`] if the URL is invalid or the server is unreachable.
    pub async fn connect(url: &str) -> Result<Self, SyncError> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl GuardStore for RedisGuardStore {
    async fn try_acquire(&self, key: &str, ttl: Duration) -> Result<Option<GuardLease>, SyncError> {
        let lease = GuardLease::new(key);
        let mut conn = self.conn.clone();
        let ttl_ms = ttl_millis(ttl);

        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(lease.token())
            .arg("NX")
            .arg("PX")
            .arg(ttl_ms)
            .query_async(&mut conn)
            .await?;

        debug!(key, acquired = reply.is_some(), "Guard acquisition attempted");
        Ok(reply.map(|_| lease))
    }

    async fn release(&self, lease: &GuardLease) -> Result<bool, SyncError> {
        let mut conn = self.conn.clone();
        let deleted: i64 = RELEASE_SCRIPT
            .key(lease.key())
            .arg(lease.token())
            .invoke_async(&mut conn)
            .await?;
        Ok(deleted == 1)
    }

    async fn renew(&self, lease: &GuardLease, ttl: Duration) -> Result<bool, SyncError> {
        let mut conn = self.conn.clone();
        let extended: i64 = RENEW_SCRIPT
            .key(lease.key())
            .arg(lease.token())
            .arg(ttl_millis(ttl))
            .invoke_async(&mut conn)
            .await?;
        Ok(extended == 1)
    }

    async fn is_held(&self, key: &str) -> Result<bool, SyncError> {
        let mut conn = self.conn.clone();
        let exists: bool = redis::cmd("EXISTS").arg(key).query_async(&mut conn).await?;
        Ok(exists)
    }
}

/// Guard kept in process memory. Only excludes runs within this process.
#[derive(Debug, Default)]
pub struct MemoryGuardStore {
    leases: Mutex<HashMap<String, (String, Instant)>>,
}

impl MemoryGuardStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl GuardStore for MemoryGuardStore {
    async fn try_acquire(&self, key: &str, ttl: Duration) -> Result<Option<GuardLease>, SyncError> {
        let mut leases = self.leases.lock().await;
        let now = Instant::now();

        if let Some((_, expires_at)) = leases.get(key) {
            if *expires_at > now {
                return Ok(None);
            }
        }

        let lease = GuardLease::new(key);
        leases.insert(key.to_string(), (lease.token().to_string(), now + ttl));
        Ok(Some(lease))
    }

    async fn release(&self, lease: &GuardLease) -> Result<bool, SyncError> {
        let mut leases = self.leases.lock().await;
        match leases.get(lease.key()) {
            Some((token, _)) if token == lease.token() => {
                leases.remove(lease.key());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn renew(&self, lease: &GuardLease, ttl: Duration) -> Result<bool, SyncError> {
        let mut leases = self.leases.lock().await;
        let now = Instant::now();
        match leases.get_mut(lease.key()) {
            Some((token, expires_at)) if token.as_str() == lease.token() && *expires_at > now => {
                *expires_at = now + ttl;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn is_held(&self, key: &str) -> Result<bool, SyncError> {
        let leases = self.leases.lock().await;
        Ok(leases
            .get(key)
            .is_some_and(|(_, expires_at)| *expires_at > Instant::now()))
    }
}
