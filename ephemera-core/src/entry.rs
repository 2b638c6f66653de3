use std::sync::Arc;

/// A stored payload with its optional expiry
#[derive(Debug, Clone)]
pub struct Entry {
    payload: Arc<[u8]>,
    /// Unix seconds after which the entry is gone; `None` never expires
    expires_at: Option<u64>,
}

impl Entry {
    /// Creates a new entry with the given payload and expiry
    pub fn new(payload: impl Into<Arc<[u8]>>, expires_at: Option<u64>) -> Self {
        Self {
            payload: payload.into(),
            expires_at,
        }
    }

    /// Returns the stored payload
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Returns a shared reference to the payload (zero-cost clone)
    pub fn payload_shared(&self) -> Arc<[u8]> {
        Arc::clone(&self.payload)
    }

    /// Returns the expiry timestamp, if any
    pub fn expires_at(&self) -> Option<u64> {
        self.expires_at
    }

    /// Whether a read at `now` may observe this entry
    pub fn is_live(&self, now: u64) -> bool {
        match self.expires_at {
            None => true,
            Some(at) => at > now,
        }
    }

    /// Whether a sweep at `now` should evict this entry
    pub fn is_stale(&self, now: u64) -> bool {
        matches!(self.expires_at, Some(at) if at < now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_without_expiry_is_always_live() {
        let entry = Entry::new(b"value".to_vec(), None);

        assert_eq!(entry.payload(), b"value");
        assert!(entry.is_live(u64::MAX));
        assert!(!entry.is_stale(u64::MAX));
    }

    #[test]
    fn test_read_and_sweep_boundaries() {
        let entry = Entry::new(b"value".to_vec(), Some(100));

        assert!(entry.is_live(99));
        // Reads treat the expiry second itself as expired...
        assert!(!entry.is_live(100));
        // ...while the sweeper waits until it has strictly passed.
        assert!(!entry.is_stale(100));
        assert!(entry.is_stale(101));
    }

    #[test]
    fn test_payload_shared_returns_arc() {
        let entry = Entry::new(b"shared".to_vec(), None);

        let shared1 = entry.payload_shared();
        let shared2 = entry.payload_shared();
        assert!(Arc::ptr_eq(&shared1, &shared2));
        assert_eq!(&*shared1, b"shared");
    }
}
