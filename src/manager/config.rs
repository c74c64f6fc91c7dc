//! Resource manager configuration.

use std::time::Duration;

use crate::config::{PoolConfig, DEFAULT_IDLE_RETENTION, DEFAULT_SAMPLE_INTERVAL, DEFAULT_TICK};
use crate::error::{Error, Result};

/// Largest pool size a manager will steer towards. Idle levels are tracked
/// per size, so larger bounds are clamped.
pub const MAX_POOL_SIZE: u32 = 65_536;

/// Sizing and timing parameters for a [`ResourceManager`](super::ResourceManager).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceManagerConfig {
    /// Resources kept allocated even when idle.
    pub min: u32,
    /// Target number of idle resources.
    pub threshold: u32,
    /// Hard ceiling on allocated resources.
    pub max: u32,
    /// Control-loop period.
    pub tick: Duration,
    /// Spacing between idle samples after the first.
    pub sample_interval: Duration,
    /// Delay before the first idle sample.
    pub initial_sample_delay: Duration,
    /// Age after which an idle sample stops counting.
    pub idle_retention: Duration,
    /// Prefix for the control-loop thread name.
    pub thread_name_prefix: String,
}

impl Default for ResourceManagerConfig {
    fn default() -> Self {
        Self::from(&PoolConfig::default())
    }
}

impl From<&PoolConfig> for ResourceManagerConfig {
    fn from(config: &PoolConfig) -> Self {
        Self {
            min: config.min,
            threshold: config.threshold,
            max: config.max,
            tick: config.tick,
            sample_interval: config.sample_interval,
            initial_sample_delay: config.initial_sample_delay,
            idle_retention: config.idle_retention,
            thread_name_prefix: config.thread_name_prefix.clone(),
        }
    }
}

impl ResourceManagerConfig {
    /// Creates a configuration with the given sizing and default timing.
    #[must_use]
    pub fn new(min: u32, threshold: u32, max: u32) -> Self {
        Self {
            min,
            threshold,
            max,
            tick: DEFAULT_TICK,
            sample_interval: DEFAULT_SAMPLE_INTERVAL,
            initial_sample_delay: DEFAULT_SAMPLE_INTERVAL,
            idle_retention: DEFAULT_IDLE_RETENTION,
            thread_name_prefix: "rightsize".to_string(),
        }
    }

    /// Sets the control-loop period.
    #[must_use]
    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    /// Sets the spacing between idle samples.
    #[must_use]
    pub fn with_sample_interval(mut self, interval: Duration) -> Self {
        self.sample_interval = interval;
        self
    }

    /// Sets the delay before the first idle sample.
    #[must_use]
    pub fn with_initial_sample_delay(mut self, delay: Duration) -> Self {
        self.initial_sample_delay = delay;
        self
    }

    /// Sets how long an idle sample counts as evidence.
    #[must_use]
    pub fn with_idle_retention(mut self, retention: Duration) -> Self {
        self.idle_retention = retention;
        self
    }

    /// Validates and repairs the configuration.
    ///
    /// A zero tick is rejected. Sizes above [`MAX_POOL_SIZE`] are clamped to
    /// it, then a `max` below `min` is raised to `min`.
    pub fn normalized(mut self) -> Result<Self> {
        if self.tick.is_zero() {
            return Err(Error::invalid_argument("resource manager: tick must be positive"));
        }
        if self.min.max(self.threshold).max(self.max) > MAX_POOL_SIZE {
            tracing::warn!(
                min = self.min,
                threshold = self.threshold,
                max = self.max,
                cap = MAX_POOL_SIZE,
                "pool sizes above cap, clamping"
            );
            self.min = self.min.min(MAX_POOL_SIZE);
            self.threshold = self.threshold.min(MAX_POOL_SIZE);
            self.max = self.max.min(MAX_POOL_SIZE);
        }
        if self.max < self.min {
            tracing::warn!(
                min = self.min,
                max = self.max,
                "max below min, raising max to min"
            );
            self.max = self.min;
        }
        Ok(self)
    }

    /// Number of whole ticks covering `span`, rounded up.
    pub(crate) fn ticks_for(&self, span: Duration) -> u64 {
        let tick = self.tick.as_nanos().max(1);
        u64::try_from(span.as_nanos().div_ceil(tick)).unwrap_or(u64::MAX)
    }

    pub(crate) fn sample_ticks(&self) -> u64 {
        self.ticks_for(self.sample_interval).max(1)
    }

    pub(crate) fn initial_sample_ticks(&self) -> u64 {
        self.ticks_for(self.initial_sample_delay)
    }
}
