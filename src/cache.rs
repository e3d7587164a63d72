//! Key-value cache and lock capability
//!
//! The invocation service only needs a handful of primitives: plain k/v
//! access, an expiring counter for rate limiting, and an owner-checked lock
//! for the token refresh critical section. [`MemoryCache`] provides them
//! for a single process; a networked backend can implement [`Cache`] for
//! multi-replica deployments.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use rand::Rng;
use thiserror::Error;
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache value for '{0}' is not an integer")]
    NotAnInteger(String),
    #[error("cache backend unavailable: {0}")]
    Unavailable(String),
}

/// Proof of lock ownership returned by [`Cache::acquire_lock`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockToken(String);

impl LockToken {
    fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[async_trait]
pub trait Cache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), CacheError>;
    async fn delete(&self, key: &str) -> Result<bool, CacheError>;
    /// Increments the counter at `key`, creating it with `ttl` when absent.
    async fn incr(&self, key: &str, ttl: Duration) -> Result<i64, CacheError>;
    /// Tries to take `key` for `ttl`, waiting at most `wait`. `None` means the
    /// lock is held elsewhere.
    async fn acquire_lock(
        &self,
        key: &str,
        ttl: Duration,
        wait: Duration,
    ) -> Result<Option<LockToken>, CacheError>;
    /// Releases `key` only if `token` still owns it.
    async fn release_lock(&self, key: &str, token: &LockToken) -> Result<bool, CacheError>;
}

#[derive(Debug)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

const LOCK_POLL_MIN_MS: u64 = 10;
const LOCK_POLL_MAX_MS: u64 = 40;
const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug)]
struct Store {
    entries: HashMap<String, Entry>,
    last_sweep: Instant,
}

impl Store {
    /// Drops expired entries, at most once per `interval`. Rate-limit
    /// windows and lock keys are written once and never read back after
    /// they expire, so writes are where they get collected.
    fn sweep(&mut self, now: Instant, interval: Duration) {
        if now.saturating_duration_since(self.last_sweep) < interval {
            return;
        }
        self.entries.retain(|_, entry| entry.is_live(now));
        self.last_sweep = now;
    }
}

#[derive(Debug)]
pub struct MemoryCache {
    store: Mutex<Store>,
    sweep_interval: Duration,
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::with_sweep_interval(DEFAULT_SWEEP_INTERVAL)
    }
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sweep_interval(sweep_interval: Duration) -> Self {
        Self {
            store: Mutex::new(Store {
                entries: HashMap::new(),
                last_sweep: Instant::now(),
            }),
            sweep_interval,
        }
    }

    async fn try_lock(&self, key: &str, token: &LockToken, ttl: Duration) -> bool {
        let now = Instant::now();
        let mut store = self.store.lock().await;
        store.sweep(now, self.sweep_interval);
        if store.entries.get(key).is_some_and(|entry| entry.is_live(now)) {
            return false;
        }
        store.entries.insert(
            key.to_string(),
            Entry {
                value: token.as_str().to_string(),
                expires_at: Some(now + ttl),
            },
        );
        true
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let now = Instant::now();
        let mut store = self.store.lock().await;
        match store.entries.get(key) {
            Some(entry) if entry.is_live(now) => Ok(Some(entry.value.clone())),
            Some(_) => {
                store.entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), CacheError> {
        let now = Instant::now();
        let mut store = self.store.lock().await;
        store.sweep(now, self.sweep_interval);
        store.entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: ttl.map(|ttl| now + ttl),
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        Ok(self.store.lock().await.entries.remove(key).is_some())
    }

    async fn incr(&self, key: &str, ttl: Duration) -> Result<i64, CacheError> {
        let now = Instant::now();
        let mut store = self.store.lock().await;
        store.sweep(now, self.sweep_interval);
        let current = match store.entries.get(key) {
            Some(entry) if entry.is_live(now) => Some((
                entry
                    .value
                    .parse::<i64>()
                    .map_err(|_| CacheError::NotAnInteger(key.to_string()))?,
                entry.expires_at,
            )),
            _ => None,
        };

        let (next, expires_at) = match current {
            Some((value, expires_at)) => (value + 1, expires_at),
            None => (1, Some(now + ttl)),
        };
        store.entries.insert(
            key.to_string(),
            Entry {
                value: next.to_string(),
                expires_at,
            },
        );
        Ok(next)
    }

    async fn acquire_lock(
        &self,
        key: &str,
        ttl: Duration,
        wait: Duration,
    ) -> Result<Option<LockToken>, CacheError> {
        let token = LockToken::generate();
        let deadline = Instant::now() + wait;

        loop {
            if self.try_lock(key, &token, ttl).await {
                return Ok(Some(token));
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            let jitter = rand::thread_rng().gen_range(LOCK_POLL_MIN_MS..=LOCK_POLL_MAX_MS);
            let pause = Duration::from_millis(jitter).min(deadline - now);
            tokio::time::sleep(pause).await;
        }
    }

    async fn release_lock(&self, key: &str, token: &LockToken) -> Result<bool, CacheError> {
        let mut store = self.store.lock().await;
        let owned = store
            .entries
            .get(key)
            .is_some_and(|entry| entry.value == token.as_str() && entry.is_live(Instant::now()));
        if owned {
            store.entries.remove(key);
        }
        Ok(owned)
    }
}
