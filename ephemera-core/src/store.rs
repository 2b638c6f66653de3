use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};
use std::time::Duration;
use tokio::sync::watch;

use crate::clock::{Clock, SystemClock};
use crate::config::StoreConfig;
use crate::entry::Entry;

/// Internal shared state for the store
struct StoreInner {
    data: RwLock<HashMap<String, Entry>>,
    clock: Arc<dyn Clock>,
    /// Sender to signal shutdown to the sweeper
    shutdown_tx: watch::Sender<bool>,
}

impl StoreInner {
    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Entry>> {
        self.data.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Entry>> {
        self.data.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Removes every entry whose expiry has strictly passed
    fn sweep(&self) -> usize {
        let now = self.clock.now();
        let mut data = self.write();
        let before = data.len();
        data.retain(|_, entry| !entry.is_stale(now));
        before - data.len()
    }
}

/// Thread-safe in-memory key/value store with per-entry expiry
///
/// The whole map sits behind a single reader/writer lock: reads run
/// concurrently with each other, and every mutation (`set`, `delete`,
/// `take`, `reset`, sweep) holds the lock exclusively.
///
/// Expiry is enforced twice. Reads lazily treat an expired entry as absent
/// without removing it, and a background sweeper evicts expired entries
/// every [`StoreConfig::sweep_interval`]. The sweeper runs until
/// [`Store::close`] is called or the last handle is dropped.
///
/// # Example
///
/// ```rust,no_run
/// use ephemera_core::Store;
/// use std::time::Duration;
///
/// #[tokio::main]
/// async fn main() {
///     let store = Store::new();
///
///     store.set("4815162342", b"payload".to_vec(), Duration::from_secs(1800));
///     assert!(store.get("4815162342").is_some());
///
///     store.delete("4815162342");
///     store.close();
/// }
/// ```
#[derive(Clone)]
pub struct Store {
    inner: Arc<StoreInner>,
}

impl Store {
    /// Creates a new store with default configuration and the system clock
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime context. The store requires
    /// a runtime to spawn its background sweeper.
    pub fn new() -> Self {
        Self::with_config(StoreConfig::default())
    }

    /// Creates a new store with custom configuration and the system clock
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime context.
    pub fn with_config(config: StoreConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Creates a new store reading time from `clock`
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime context.
    pub fn with_clock(config: StoreConfig, clock: Arc<dyn Clock>) -> Self {
        if tokio::runtime::Handle::try_current().is_err() {
            panic!(
                "ephemera_core::Store requires a Tokio runtime. \
                 Construct the store from within a #[tokio::main] or \
                 #[tokio::test] context, or from code running on a Tokio runtime."
            );
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let inner = Arc::new(StoreInner {
            data: RwLock::new(HashMap::new()),
            clock,
            shutdown_tx,
        });

        tokio::spawn(Self::sweep_task(
            Arc::downgrade(&inner),
            config.sweep_interval,
            shutdown_rx,
        ));

        Self { inner }
    }

    /// Background task that periodically evicts expired entries
    async fn sweep_task(
        inner: Weak<StoreInner>,
        interval: Duration,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        let mut ticker = tokio::time::interval(interval);
        // The first tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let Some(inner) = inner.upgrade() else {
                        break;
                    };
                    let removed = inner.sweep();
                    if removed > 0 {
                        tracing::debug!(removed, "swept expired entries");
                    }
                }
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::debug!("sweeper stopped");
    }

    /// Retrieves the payload stored under `key`
    ///
    /// Returns `None` for an empty key, a missing key, or an expired key.
    /// Expired entries are left in place for the sweeper.
    pub fn get(&self, key: &str) -> Option<Arc<[u8]>> {
        if key.is_empty() {
            return None;
        }
        let now = self.inner.clock.now();
        let data = self.inner.read();
        data.get(key)
            .filter(|entry| entry.is_live(now))
            .map(Entry::payload_shared)
    }

    /// Stores `payload` under `key` for `ttl`
    ///
    /// A zero `ttl` stores the entry without expiry. Sub-second remainders
    /// round up to the next whole second. An empty key or empty payload is
    /// ignored. An existing entry is replaced, payload and expiry together.
    pub fn set(&self, key: impl Into<String>, payload: impl Into<Arc<[u8]>>, ttl: Duration) {
        let key = key.into();
        let payload = payload.into();
        if key.is_empty() || payload.is_empty() {
            return;
        }

        let expires_at = if ttl.is_zero() {
            None
        } else {
            let secs = ttl.as_secs().saturating_add(u64::from(ttl.subsec_nanos() > 0));
            Some(self.inner.clock.now().saturating_add(secs))
        };

        self.inner.write().insert(key, Entry::new(payload, expires_at));
    }

    /// Removes `key` if present. Missing or empty keys are ignored.
    pub fn delete(&self, key: &str) {
        if key.is_empty() {
            return;
        }
        self.inner.write().remove(key);
    }

    /// Removes `key` and returns its payload, in one exclusive step
    ///
    /// Of several concurrent callers taking the same key, at most one sees
    /// the payload. An expired entry is reported absent and left for the
    /// sweeper, as with [`Store::get`].
    pub fn take(&self, key: &str) -> Option<Arc<[u8]>> {
        if key.is_empty() {
            return None;
        }
        let now = self.inner.clock.now();
        let mut data = self.inner.write();
        if !data.get(key)?.is_live(now) {
            return None;
        }
        data.remove(key).map(|entry| entry.payload_shared())
    }

    /// Replaces the whole mapping with an empty one
    pub fn reset(&self) {
        *self.inner.write() = HashMap::new();
    }

    /// Stops the background sweeper after its current cycle
    ///
    /// The store stays usable and keeps its entries; only active eviction
    /// stops. Reads still apply the lazy expiry check.
    pub fn close(&self) {
        self.inner.shutdown_tx.send_replace(true);
    }

    /// Returns `true` once [`Store::close`] has been called
    pub fn is_closed(&self) -> bool {
        *self.inner.shutdown_tx.borrow()
    }

    /// Runs one sweep pass now and returns the number of evicted entries
    ///
    /// Note: this is also done automatically by the background task.
    pub fn sweep(&self) -> usize {
        self.inner.sweep()
    }

    /// Checks if a key exists and is not expired
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Returns the number of entries in the store (including unswept expired ones)
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    /// Returns `true` if the store holds no entries
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("len", &self.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Drop for StoreInner {
    fn drop(&mut self) {
        self.shutdown_tx.send_replace(true);
    }
}
