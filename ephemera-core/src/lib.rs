//! # Ephemera Core
//!
//! A memory-resident key/value store for short-lived, single-use state.
//!
//! ## Features
//!
//! - One reader/writer lock over the whole map: concurrent reads,
//!   exclusive writes
//! - Lazy expiration on read (expired entries read as absent)
//! - Background sweeper evicting expired entries every 10 seconds by default
//! - Opaque byte payloads under string keys
//! - Pluggable [`Clock`] with second granularity, so expiry can be tested
//!   without sleeping
//!
//! Nothing survives a restart; losing the contents on a crash is expected.
//!
//! ## Example
//!
//! ```rust,no_run
//! use ephemera_core::{Store, StoreConfig};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     let store = Store::with_config(
//!         StoreConfig::default().with_sweep_interval(Duration::from_secs(30)),
//!     );
//!
//!     // Stored for 30 minutes
//!     store.set("0123456789", b"payload".to_vec(), Duration::from_secs(30 * 60));
//!
//!     if let Some(payload) = store.get("0123456789") {
//!         println!("{} bytes", payload.len());
//!     }
//!
//!     store.delete("0123456789");
//!
//!     // Stop the sweeper; the store itself remains usable
//!     store.close();
//! }
//! ```

mod clock;
mod config;
mod entry;
mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{StoreConfig, DEFAULT_SWEEP_INTERVAL};
pub use entry::Entry;
pub use store::Store;
