use std::time::Duration;

/// Default interval between background sweeps.
///
/// Bounds how long an abandoned, expired entry can keep occupying memory
/// while keeping write-lock acquisitions by the sweeper infrequent.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(10);

/// Configuration for the store's background sweeper
///
/// # Example
///
/// ```rust
/// use ephemera_core::StoreConfig;
/// use std::time::Duration;
///
/// let config = StoreConfig::default()
///     .with_sweep_interval(Duration::from_secs(30));
/// ```
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Interval between sweeps (default: 10 seconds)
    pub sweep_interval: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
        }
    }
}

impl StoreConfig {
    /// Creates a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the sweep interval
    ///
    /// This determines how often the background task evicts expired entries.
    /// A zero interval is raised to one millisecond, since the ticker cannot
    /// run with a zero period.
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval.max(Duration::from_millis(1));
        self
    }
}
