//! Keyed engine session pool.
//!
//! Provides session reuse per connection identity with:
//! - Lazy creation on first lookup
//! - Idle TTL eviction, swept on every lookup (no background timer)
//! - Recreation of sessions that report themselves disconnected
//! - At most one `connect()` in flight per identity
//!
//! The structural map is guarded by one short-lived mutex. The network-bound
//! connect runs outside it, serialized per key by an async creation lock, so
//! unrelated identities never wait on each other.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::clock::{Clock, SystemClock};
use crate::engine::{EngineSession, EngineSessionFactory};
use crate::error::CubistError;
use crate::models::{ConnectionDescriptor, ConnectionIdentity, PoolStatus};
use crate::services::executor::EngineExecutor;

/// A session owned by the pool.
struct PooledSession {
    session: Arc<dyn EngineSession>,
    last_used_at: DateTime<Utc>,
}

#[derive(Default)]
struct PoolInner {
    sessions: HashMap<String, PooledSession>,
    creation_locks: HashMap<String, Arc<tokio::sync::Mutex<()>>>,
}

impl PoolInner {
    /// Drop sessions idle for longer than `ttl`. Returns how many were evicted.
    fn sweep(&mut self, now: DateTime<Utc>, ttl: chrono::Duration) -> usize {
        let before = self.sessions.len();
        self.sessions.retain(|key, entry| {
            let keep = now - entry.last_used_at <= ttl;
            if !keep {
                tracing::debug!(identity = %key, "Evicting idle session");
            }
            keep
        });

        // Creation locks nobody is holding or waiting on are only worth keeping
        // while their session is alive.
        let sessions = &self.sessions;
        self.creation_locks
            .retain(|key, lock| Arc::strong_count(lock) > 1 || sessions.contains_key(key));

        before - self.sessions.len()
    }
}

/// Engine sessions keyed by connection identity.
pub struct ConnectionPool {
    factory: Arc<dyn EngineSessionFactory>,
    executor: EngineExecutor,
    clock: Arc<dyn Clock>,
    ttl: chrono::Duration,
    inner: Mutex<PoolInner>,
}

impl ConnectionPool {
    /// Create a pool using wall-clock time.
    pub fn new(
        factory: Arc<dyn EngineSessionFactory>,
        executor: EngineExecutor,
        ttl: Duration,
    ) -> Self {
        Self::with_clock(factory, executor, ttl, Arc::new(SystemClock))
    }

    /// Create a pool with a custom time source.
    pub fn with_clock(
        factory: Arc<dyn EngineSessionFactory>,
        executor: EngineExecutor,
        ttl: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let ttl = chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::weeks(52 * 100));
        Self { factory, executor, clock, ttl, inner: Mutex::new(PoolInner::default()) }
    }

    /// Get the pooled session for `descriptor`, opening one through the
    /// injected factory when none is usable.
    pub async fn get_or_create(
        &self,
        descriptor: &ConnectionDescriptor,
    ) -> Result<Arc<dyn EngineSession>, CubistError> {
        let factory = self.factory.clone();
        let target = descriptor.clone();
        self.get_or_create_with(&descriptor.identity, move || factory.connect(&target)).await
    }

    /// Get the pooled session for `identity`, running `connect` on the
    /// engine executor when none is usable.
    ///
    /// A failed connect propagates unchanged and leaves the pool untouched.
    pub async fn get_or_create_with<F>(
        &self,
        identity: &ConnectionIdentity,
        connect: F,
    ) -> Result<Arc<dyn EngineSession>, CubistError>
    where
        F: FnOnce() -> Result<Arc<dyn EngineSession>, CubistError> + Send + 'static,
    {
        let key = identity.key();

        if let Some(session) = self.try_reuse(&key) {
            return Ok(session);
        }

        let creation_lock = self.creation_lock(&key);
        let _creating = creation_lock.lock().await;

        // Another caller may have finished connecting while we waited.
        if let Some(session) = self.try_reuse(&key) {
            return Ok(session);
        }

        tracing::debug!(identity = %key, "Opening engine session");
        let session = self.executor.run(connect).await.map_err(|e| {
            tracing::warn!(identity = %key, error = %e, "Failed to open engine session");
            e
        })?;

        self.inner.lock().sessions.insert(
            key.clone(),
            PooledSession { session: session.clone(), last_used_at: self.clock.now() },
        );

        tracing::info!(
            identity = %key,
            endpoint = %identity.endpoint,
            catalog = %identity.catalog,
            "Engine session opened"
        );

        Ok(session)
    }

    /// Sweep expired entries, then return the live session for `key` if any.
    fn try_reuse(&self, key: &str) -> Option<Arc<dyn EngineSession>> {
        let now = self.clock.now();
        let mut inner = self.inner.lock();
        inner.sweep(now, self.ttl);

        let connected = inner.sessions.get(key).map(|entry| entry.session.is_connected());
        match connected {
            Some(true) => {
                let entry = inner.sessions.get_mut(key)?;
                entry.last_used_at = now;
                tracing::trace!(identity = %key, "Reusing pooled session");
                Some(entry.session.clone())
            }
            Some(false) => {
                inner.sessions.remove(key);
                tracing::debug!(identity = %key, "Pooled session disconnected, recreating");
                None
            }
            None => None,
        }
    }

    fn creation_lock(&self, key: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.inner.lock().creation_locks.entry(key.to_string()).or_default().clone()
    }

    /// Evict every session idle past the TTL. Returns how many were evicted.
    pub fn evict_expired(&self) -> usize {
        let now = self.clock.now();
        self.inner.lock().sweep(now, self.ttl)
    }

    /// Whether a session for `identity` is currently pooled.
    pub fn contains(&self, identity: &ConnectionIdentity) -> bool {
        self.inner.lock().sessions.contains_key(&identity.key())
    }

    /// Number of pooled sessions.
    pub fn len(&self) -> usize {
        self.inner.lock().sessions.len()
    }

    /// Whether the pool holds no sessions.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current pool status.
    pub fn status(&self) -> PoolStatus {
        let inner = self.inner.lock();
        PoolStatus {
            sessions: inner.sessions.len(),
            pending: inner.creation_locks.values().filter(|l| Arc::strong_count(l) > 1).count(),
            ttl_secs: self.ttl.num_seconds(),
        }
    }
}

impl std::fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("ttl_secs", &self.ttl.num_seconds())
            .field("sessions", &self.len())
            .finish()
    }
}
