use std::sync::Arc;
use std::time::Duration;

use ephemera_core::Store;

use crate::dispatch::{dispatch, Completion};
use crate::error::Error;

/// Truncates a key for safe logging (keys double as secrets)
pub(crate) fn truncate_key_for_log(key: &str) -> String {
    const MAX_LOG_LEN: usize = 4;
    match key.char_indices().nth(MAX_LOG_LEN) {
        Some((cut, _)) => format!("{}...", &key[..cut]),
        None => key.to_string(),
    }
}

/// Ephemeral key/value operations, each dispatched as its own unit of work.
pub trait TokenStore: Send + Sync {
    /// Looks up a live payload; `None` if missing or expired
    fn find(&self, key: &str) -> Completion<Option<Arc<[u8]>>, Error>;

    /// Stores `payload` under `key` for `ttl`
    fn set(&self, key: &str, payload: Vec<u8>, ttl: Duration) -> Completion<(), Error>;

    /// Removes `key`; succeeds whether or not it existed
    fn delete(&self, key: &str) -> Completion<(), Error>;

    /// Removes `key` and hands back its live payload in one step
    fn take(&self, key: &str) -> Completion<Option<Arc<[u8]>>, Error>;
}

/// [`TokenStore`] over a shared in-process [`Store`]
#[derive(Debug, Clone)]
pub struct MemoryTokenStore {
    store: Store,
}

impl MemoryTokenStore {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// The underlying store handle
    pub fn store(&self) -> &Store {
        &self.store
    }
}

impl TokenStore for MemoryTokenStore {
    fn find(&self, key: &str) -> Completion<Option<Arc<[u8]>>, Error> {
        let store = self.store.clone();
        let key = key.to_owned();
        dispatch(async move {
            tracing::debug!("GET {}", truncate_key_for_log(&key));
            Ok(store.get(&key))
        })
    }

    fn set(&self, key: &str, payload: Vec<u8>, ttl: Duration) -> Completion<(), Error> {
        let store = self.store.clone();
        let key = key.to_owned();
        dispatch(async move {
            tracing::debug!("SET {} (ttl: {}s)", truncate_key_for_log(&key), ttl.as_secs());
            store.set(key, payload, ttl);
            Ok(())
        })
    }

    fn delete(&self, key: &str) -> Completion<(), Error> {
        let store = self.store.clone();
        let key = key.to_owned();
        dispatch(async move {
            tracing::debug!("DELETE {}", truncate_key_for_log(&key));
            store.delete(&key);
            Ok(())
        })
    }

    fn take(&self, key: &str) -> Completion<Option<Arc<[u8]>>, Error> {
        let store = self.store.clone();
        let key = key.to_owned();
        dispatch(async move {
            tracing::debug!("TAKE {}", truncate_key_for_log(&key));
            Ok(store.take(&key))
        })
    }
}
