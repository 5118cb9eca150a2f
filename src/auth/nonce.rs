//! Short-lived confirmation codes for irreversible actions.
//!
//! Flow Overview:
//! 1) A caller asks for a destructive action without a code; the route either
//!    finds a live nonce bound to that caller or generates a new one, and
//!    returns it without acting.
//! 2) The caller resubmits with the code; the route validates it, performs the
//!    action, then deletes the nonce.
//!
//! Records live only in process memory. Expiry is checked lazily on access and
//! a background task evicts abandoned records on a fixed interval.

use rand::{rngs::OsRng, RngCore};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::debug;

/// Default lifetime of a nonce.
pub const DEFAULT_NONCE_TTL: Duration = Duration::from_secs(5 * 60);

/// Upper bound on any nonce lifetime; longer TTLs are clamped to it.
pub const MAX_NONCE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// How often the background task evicts expired records.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Random bytes per nonce; hex encoding doubles the length.
const NONCE_BYTES: usize = 10;

struct NonceRecord<T> {
    data: T,
    expires_at: Instant,
}

impl<T> NonceRecord<T> {
    fn is_expired(&self, now: Instant) -> bool {
        now > self.expires_at
    }
}

type Records<T> = Arc<RwLock<HashMap<String, NonceRecord<T>>>>;

/// In-memory nonce store with an owned sweep task.
///
/// Must be created inside a tokio runtime. The sweep task stops on
/// [`NonceRegistry::shutdown`] or when the registry is dropped.
pub struct NonceRegistry<T> {
    records: Records<T>,
    default_ttl: Duration,
    sweeper: JoinHandle<()>,
}

impl<T> NonceRegistry<T>
where
    T: Clone + Send + Sync + 'static,
{
    #[must_use]
    pub fn new(default_ttl: Duration) -> Self {
        Self::with_sweep_interval(default_ttl, SWEEP_INTERVAL)
    }

    #[must_use]
    pub fn with_sweep_interval(default_ttl: Duration, sweep_interval: Duration) -> Self {
        let records: Records<T> = Arc::new(RwLock::new(HashMap::new()));
        let sweeper = spawn_sweeper(Arc::clone(&records), sweep_interval);
        Self {
            records,
            default_ttl,
            sweeper,
        }
    }

    #[must_use]
    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Store `data` under a fresh nonce valid for `ttl` (or the default TTL),
    /// capped at [`MAX_NONCE_TTL`].
    pub async fn generate(&self, data: T, ttl: Option<Duration>) -> String {
        let nonce = generate_hex();
        let ttl = ttl.unwrap_or(self.default_ttl).min(MAX_NONCE_TTL);
        let now = Instant::now();
        let expires_at = now.checked_add(ttl).unwrap_or(now);

        self.records
            .write()
            .await
            .insert(nonce.clone(), NonceRecord { data, expires_at });

        nonce
    }

    /// First live nonce whose data matches `predicate`. Does not consume it.
    pub async fn find<F>(&self, predicate: F) -> Option<String>
    where
        F: Fn(&T) -> bool,
    {
        let now = Instant::now();
        let records = self.records.read().await;
        records
            .iter()
            .find(|(_, record)| !record.is_expired(now) && predicate(&record.data))
            .map(|(nonce, _)| nonce.clone())
    }

    /// Data bound to `nonce` if it is still live. Expired records are evicted.
    pub async fn verify(&self, nonce: &str) -> Option<T> {
        let now = Instant::now();
        let mut records = self.records.write().await;

        if records.get(nonce)?.is_expired(now) {
            records.remove(nonce);
            return None;
        }

        records.get(nonce).map(|record| record.data.clone())
    }

    /// Remove `nonce` regardless of expiry. Returns whether it was present.
    pub async fn delete(&self, nonce: &str) -> bool {
        self.records.write().await.remove(nonce).is_some()
    }

    /// Evict every expired record. Returns how many were removed.
    pub async fn sweep(&self) -> usize {
        sweep(&self.records).await
    }

    /// Physical record count, including expired records not swept yet.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    /// Stop the background sweep task.
    pub fn shutdown(&self) {
        self.sweeper.abort();
    }
}

impl<T> Drop for NonceRegistry<T> {
    fn drop(&mut self) {
        self.sweeper.abort();
    }
}

impl<T> fmt::Debug for NonceRegistry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NonceRegistry")
            .field("default_ttl", &self.default_ttl)
            .field("sweeper_finished", &self.sweeper.is_finished())
            .finish_non_exhaustive()
    }
}

fn spawn_sweeper<T>(records: Records<T>, period: Duration) -> JoinHandle<()>
where
    T: Send + Sync + 'static,
{
    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let removed = sweep(&records).await;
            if removed > 0 {
                debug!(removed, "swept expired nonces");
            }
        }
    })
}

async fn sweep<T>(records: &RwLock<HashMap<String, NonceRecord<T>>>) -> usize {
    let now = Instant::now();
    let mut records = records.write().await;
    let before = records.len();
    records.retain(|_, record| !record.is_expired(now));
    before - records.len()
}

fn generate_hex() -> String {
    let mut bytes = [0u8; NONCE_BYTES];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}
