#![allow(dead_code)]
#![allow(unused_imports)]
//! Shared integration test utilities.
//!
//! Import with:
//! ```ignore
//! mod common;
//! use common::*;
//! ```

use parking_lot::Mutex;
use proptest::prelude::ProptestConfig;
use proptest::test_runner::RngSeed;
use rightsize::{ResourceManager, ResourceManagerConfig, ResourcePool, Result};
use std::sync::Once;
use std::time::{Duration, Instant};
use tracing_subscriber::fmt::format::FmtSpan;

static INIT_LOGGING: Once = Once::new();

/// Default seed for property tests when running under CI.
pub const DEFAULT_PROPTEST_SEED: u64 = 0x5EED_5EED;

const PROPTEST_SEED_ENV: &str = "RIGHTSIZE_PROPTEST_SEED";

/// Build a ProptestConfig with deterministic seed support for CI.
#[must_use]
pub fn test_proptest_config(cases: u32) -> ProptestConfig {
    let mut config = ProptestConfig::with_cases(cases);
    if matches!(config.rng_seed, RngSeed::Random) {
        if let Some(seed) = read_proptest_seed() {
            config.rng_seed = RngSeed::Fixed(seed);
        }
    }
    config
}

fn read_proptest_seed() -> Option<u64> {
    if let Ok(value) = std::env::var(PROPTEST_SEED_ENV) {
        return value.parse::<u64>().ok();
    }
    if std::env::var("CI").is_ok() {
        return Some(DEFAULT_PROPTEST_SEED);
    }
    None
}

/// Initialize test logging with trace-level output.
pub fn init_test_logging() {
    INIT_LOGGING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::TRACE)
            .with_test_writer()
            .with_file(true)
            .with_line_number(true)
            .with_target(true)
            .with_thread_ids(true)
            .with_span_events(FmtSpan::CLOSE)
            .with_ansi(false)
            .try_init();
    });
}

/// Log a test phase header.
pub fn test_phase(name: &str) {
    tracing::info!(phase = %name, "========================================");
    tracing::info!(phase = %name, "TEST PHASE: {}", name);
    tracing::info!(phase = %name, "========================================");
}

/// Log test completion.
pub fn test_complete(name: &str) {
    tracing::info!(test = %name, "test completed successfully: {}", name);
}

/// Polls `condition` until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
}

/// Manager timing fast enough for tests: 10ms ticks, sampling every tick.
#[must_use]
pub fn fast_manager_config(min: u32, threshold: u32, max: u32) -> ResourceManagerConfig {
    ResourceManagerConfig::new(min, threshold, max)
        .with_tick(Duration::from_millis(10))
        .with_sample_interval(Duration::from_millis(10))
        .with_initial_sample_delay(Duration::ZERO)
        .with_idle_retention(Duration::from_secs(60))
}

/// A callback issued by the manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Call {
    /// `allocate(n)`
    Allocate(u32),
    /// `release(n)`
    Release(u32),
    /// `prune()`
    Prune,
}

/// Pool double that records callbacks and reports its counts to the manager.
///
/// `allocate` adds idle resources; `release` retires idle ones first.
pub struct RecordingPool {
    manager: ResourceManager,
    counts: Mutex<(u32, u32)>,
    calls: Mutex<Vec<Call>>,
}

impl RecordingPool {
    /// Creates the double and reports `(allocated, idle)` to `manager`.
    pub fn new(manager: &ResourceManager, allocated: u32, idle: u32) -> Self {
        manager.update(allocated, idle);
        Self {
            manager: manager.clone(),
            counts: Mutex::new((allocated, idle)),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Overrides the counts, as if workers changed state.
    pub fn set(&self, allocated: u32, idle: u32) {
        let mut counts = self.counts.lock();
        *counts = (allocated, idle);
        self.manager.update(allocated, idle);
    }

    /// Returns the callbacks seen so far.
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    /// Returns the callbacks seen so far, without prunes.
    pub fn commands(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|call| *call != Call::Prune)
            .collect()
    }
}

impl ResourcePool for RecordingPool {
    fn allocate(&self, n: u32) -> Result<()> {
        self.calls.lock().push(Call::Allocate(n));
        let mut counts = self.counts.lock();
        counts.0 += n;
        counts.1 += n;
        self.manager.update(counts.0, counts.1);
        Ok(())
    }

    fn release(&self, n: u32) -> Result<()> {
        self.calls.lock().push(Call::Release(n));
        let mut counts = self.counts.lock();
        let n = n.min(counts.0);
        counts.0 -= n;
        counts.1 = counts.1.saturating_sub(n);
        self.manager.update(counts.0, counts.1);
        Ok(())
    }

    fn prune(&self) -> Result<()> {
        self.calls.lock().push(Call::Prune);
        Ok(())
    }
}
