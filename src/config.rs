//! Pool configuration loading.
//!
//! # Configuration Precedence
//!
//! Settings are resolved in this order (highest priority first):
//!
//! 1. **Environment variables**: `RIGHTSIZE_*`, applied last by
//!    [`PoolConfig::apply_env_overrides`]
//! 2. **Property map, config file or code**: [`PoolConfig::from_map`],
//!    [`PoolConfig::from_toml_str`] with the `config-file` feature, or
//!    fields set directly on [`PoolConfig`]
//! 3. **Defaults**: [`PoolConfig::default()`]
//!
//! The property map and environment loaders never fail: a value that is
//! missing or cannot be parsed leaves the default in place and is logged.
//! The TOML loader is strict and reports a [`ConfigError`].
//!
//! # Property Keys
//!
//! | Key | Type | Maps to |
//! |-----|------|---------|
//! | `min` | `u32` | `min` |
//! | `max` | `u32` | `max` |
//! | `min-idle` (or `threshold`) | `u32` | `threshold` |
//!
//! # Environment Variables
//!
//! | Variable | Type | Maps to |
//! |----------|------|---------|
//! | `RIGHTSIZE_MIN` | `u32` | `min` |
//! | `RIGHTSIZE_MAX` | `u32` | `max` |
//! | `RIGHTSIZE_THRESHOLD` | `u32` | `threshold` |
//! | `RIGHTSIZE_TICK_MS` | `u64` | `tick` |
//! | `RIGHTSIZE_SAMPLE_SECS` | `u64` | `sample_interval` |
//! | `RIGHTSIZE_INITIAL_SAMPLE_SECS` | `u64` | `initial_sample_delay` |
//! | `RIGHTSIZE_IDLE_RETENTION_SECS` | `u64` | `idle_retention` |
//! | `RIGHTSIZE_THREAD_NAME_PREFIX` | `String` | `thread_name_prefix` |

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// Environment variable name for the minimum worker count.
pub const ENV_MIN: &str = "RIGHTSIZE_MIN";
/// Environment variable name for the maximum worker count.
pub const ENV_MAX: &str = "RIGHTSIZE_MAX";
/// Environment variable name for the idle threshold.
pub const ENV_THRESHOLD: &str = "RIGHTSIZE_THRESHOLD";
/// Environment variable name for the control-loop tick in milliseconds.
pub const ENV_TICK_MS: &str = "RIGHTSIZE_TICK_MS";
/// Environment variable name for the idle sample interval in seconds.
pub const ENV_SAMPLE_SECS: &str = "RIGHTSIZE_SAMPLE_SECS";
/// Environment variable name for the delay before the first idle sample.
pub const ENV_INITIAL_SAMPLE_SECS: &str = "RIGHTSIZE_INITIAL_SAMPLE_SECS";
/// Environment variable name for idle-sample retention in seconds.
pub const ENV_IDLE_RETENTION_SECS: &str = "RIGHTSIZE_IDLE_RETENTION_SECS";
/// Environment variable name for the worker thread name prefix.
pub const ENV_THREAD_NAME_PREFIX: &str = "RIGHTSIZE_THREAD_NAME_PREFIX";

/// Default control-loop period.
pub const DEFAULT_TICK: Duration = Duration::from_secs(1);
/// Default spacing between idle samples.
pub const DEFAULT_SAMPLE_INTERVAL: Duration = Duration::from_secs(60);
/// Default age after which an idle sample stops counting as evidence.
pub const DEFAULT_IDLE_RETENTION: Duration = Duration::from_secs(30 * 60);

/// Errors from the strict configuration loaders.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("failed to read config file {path}: {source}")]
    Io {
        /// File that was being read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The config text is not valid TOML for this schema.
    #[cfg(feature = "config-file")]
    #[error("failed to parse TOML config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value parsed but is out of range.
    #[error("invalid value for {key}: {reason}")]
    Invalid {
        /// Offending key.
        key: &'static str,
        /// Why the value was rejected.
        reason: String,
    },
}

/// Sizing and timing parameters for a worker pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// Workers kept allocated even when idle.
    pub min: u32,
    /// Target number of idle workers.
    pub threshold: u32,
    /// Hard ceiling on allocated workers.
    pub max: u32,
    /// Control-loop period.
    pub tick: Duration,
    /// Spacing between idle samples after the first.
    pub sample_interval: Duration,
    /// Delay before the first idle sample.
    pub initial_sample_delay: Duration,
    /// Age after which an idle sample stops counting.
    pub idle_retention: Duration,
    /// Prefix for worker and manager thread names.
    pub thread_name_prefix: String,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min: 1,
            threshold: 1,
            max: 1,
            tick: DEFAULT_TICK,
            sample_interval: DEFAULT_SAMPLE_INTERVAL,
            initial_sample_delay: DEFAULT_SAMPLE_INTERVAL,
            idle_retention: DEFAULT_IDLE_RETENTION,
            thread_name_prefix: "rightsize".to_string(),
        }
    }
}

impl PoolConfig {
    /// Creates a configuration with the given sizing and default timing.
    #[must_use]
    pub fn new(min: u32, threshold: u32, max: u32) -> Self {
        Self {
            min,
            threshold,
            max,
            ..Self::default()
        }
    }

    /// Builds a configuration from a string property map.
    ///
    /// `threshold` comes from `min-idle`, falling back to `threshold`.
    #[must_use]
    pub fn from_map(props: &HashMap<String, String>) -> Self {
        let defaults = Self::default();
        let lookup = |key: &str| props.get(key).map(String::as_str);

        let min = lenient_u32("min", lookup("min")).unwrap_or(defaults.min);
        let max = lenient_u32("max", lookup("max")).unwrap_or(defaults.max);
        let threshold = lenient_u32("min-idle", lookup("min-idle"))
            .or_else(|| lenient_u32("threshold", lookup("threshold")))
            .unwrap_or(defaults.threshold);

        tracing::debug!(min, threshold, max, "pool config loaded from properties");
        Self {
            min,
            threshold,
            max,
            ..defaults
        }
    }

    /// Applies `RIGHTSIZE_*` environment overrides in place.
    ///
    /// Only variables that are set and parse are applied.
    pub fn apply_env_overrides(&mut self) {
        if let Some(v) = lenient_u32(ENV_MIN, read_env(ENV_MIN).as_deref()) {
            self.min = v;
        }
        if let Some(v) = lenient_u32(ENV_MAX, read_env(ENV_MAX).as_deref()) {
            self.max = v;
        }
        if let Some(v) = lenient_u32(ENV_THRESHOLD, read_env(ENV_THRESHOLD).as_deref()) {
            self.threshold = v;
        }
        if let Some(v) = lenient_u64(ENV_TICK_MS, read_env(ENV_TICK_MS).as_deref()) {
            self.tick = Duration::from_millis(v);
        }
        if let Some(v) = lenient_u64(ENV_SAMPLE_SECS, read_env(ENV_SAMPLE_SECS).as_deref()) {
            self.sample_interval = Duration::from_secs(v);
        }
        if let Some(v) = lenient_u64(
            ENV_INITIAL_SAMPLE_SECS,
            read_env(ENV_INITIAL_SAMPLE_SECS).as_deref(),
        ) {
            self.initial_sample_delay = Duration::from_secs(v);
        }
        if let Some(v) = lenient_u64(
            ENV_IDLE_RETENTION_SECS,
            read_env(ENV_IDLE_RETENTION_SECS).as_deref(),
        ) {
            self.idle_retention = Duration::from_secs(v);
        }
        if let Some(v) = read_env(ENV_THREAD_NAME_PREFIX) {
            self.thread_name_prefix = v;
        }
    }

    /// Parses a strict TOML configuration.
    ///
    /// ```toml
    /// min = 2
    /// min-idle = 3
    /// max = 10
    /// tick_ms = 1000
    /// sample_secs = 60
    /// initial_sample_secs = 60
    /// idle_retention_secs = 1800
    /// thread_name_prefix = "ingest"
    /// ```
    #[cfg(feature = "config-file")]
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let parsed: PoolToml = toml::from_str(text)?;
        parsed.into_config()
    }

    /// Reads and parses a strict TOML configuration file.
    #[cfg(feature = "config-file")]
    pub fn from_toml_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }
}

#[cfg(feature = "config-file")]
#[derive(serde::Deserialize, Default, Debug)]
#[serde(deny_unknown_fields)]
struct PoolToml {
    min: Option<u32>,
    #[serde(rename = "min-idle")]
    min_idle: Option<u32>,
    threshold: Option<u32>,
    max: Option<u32>,
    tick_ms: Option<u64>,
    sample_secs: Option<u64>,
    initial_sample_secs: Option<u64>,
    idle_retention_secs: Option<u64>,
    thread_name_prefix: Option<String>,
}

#[cfg(feature = "config-file")]
impl PoolToml {
    fn into_config(self) -> Result<PoolConfig, ConfigError> {
        let mut config = PoolConfig::default();
        if let Some(v) = self.min {
            config.min = v;
        }
        if let Some(v) = self.min_idle.or(self.threshold) {
            config.threshold = v;
        }
        if let Some(v) = self.max {
            config.max = v;
        }
        if let Some(v) = self.tick_ms {
            if v == 0 {
                return Err(ConfigError::Invalid {
                    key: "tick_ms",
                    reason: "tick must be positive".to_string(),
                });
            }
            config.tick = Duration::from_millis(v);
        }
        if let Some(v) = self.sample_secs {
            config.sample_interval = Duration::from_secs(v);
        }
        if let Some(v) = self.initial_sample_secs {
            config.initial_sample_delay = Duration::from_secs(v);
        }
        if let Some(v) = self.idle_retention_secs {
            config.idle_retention = Duration::from_secs(v);
        }
        if let Some(v) = self.thread_name_prefix {
            config.thread_name_prefix = v;
        }
        Ok(config)
    }
}

fn read_env(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

fn lenient_u32(key: &str, raw: Option<&str>) -> Option<u32> {
    let raw = raw?;
    match raw.trim().parse::<u32>() {
        Ok(v) => Some(v),
        Err(e) => {
            tracing::warn!(key, value = raw, error = %e, "ignoring unparseable config value");
            None
        }
    }
}

fn lenient_u64(key: &str, raw: Option<&str>) -> Option<u64> {
    let raw = raw?;
    match raw.trim().parse::<u64>() {
        Ok(v) => Some(v),
        Err(e) => {
            tracing::warn!(key, value = raw, error = %e, "ignoring unparseable config value");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{env_lock, init_test_logging};

    const ALL_ENV: [&str; 8] = [
        ENV_MIN,
        ENV_MAX,
        ENV_THRESHOLD,
        ENV_TICK_MS,
        ENV_SAMPLE_SECS,
        ENV_INITIAL_SAMPLE_SECS,
        ENV_IDLE_RETENTION_SECS,
        ENV_THREAD_NAME_PREFIX,
    ];

    fn props(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    fn with_envs<R>(vars: &[(&str, &str)], f: impl FnOnce() -> R) -> R {
        let _guard = env_lock();
        for var in ALL_ENV {
            std::env::remove_var(var);
        }
        for (k, v) in vars {
            std::env::set_var(k, v);
        }
        let result = f();
        for (k, _) in vars {
            std::env::remove_var(k);
        }
        result
    }

    #[test]
    fn empty_map_yields_defaults() {
        init_test_logging();
        let config = PoolConfig::from_map(&HashMap::new());
        assert_eq!(config, PoolConfig::default());
        assert_eq!(config.min, 1);
        assert_eq!(config.threshold, 1);
        assert_eq!(config.max, 1);
        assert_eq!(config.idle_retention, Duration::from_secs(1800));
    }

    #[test]
    fn min_idle_takes_precedence_over_threshold() {
        init_test_logging();
        let config = PoolConfig::from_map(&props(&[
            ("min", "2"),
            ("max", "10"),
            ("min-idle", "3"),
            ("threshold", "7"),
        ]));
        assert_eq!((config.min, config.threshold, config.max), (2, 3, 10));

        let config = PoolConfig::from_map(&props(&[("threshold", "7")]));
        assert_eq!(config.threshold, 7);
    }

    #[test]
    fn unparseable_values_fall_back() {
        init_test_logging();
        let config = PoolConfig::from_map(&props(&[
            ("min", "lots"),
            ("max", "-4"),
            ("min-idle", ""),
            ("threshold", " 5 "),
        ]));
        assert_eq!(config.min, 1);
        assert_eq!(config.max, 1);
        assert_eq!(config.threshold, 5);
    }

    #[test]
    fn env_overrides_apply_when_set() {
        init_test_logging();
        let config = with_envs(
            &[
                (ENV_MIN, "3"),
                (ENV_MAX, "12"),
                (ENV_TICK_MS, "250"),
                (ENV_THREAD_NAME_PREFIX, "ingest"),
                (ENV_THRESHOLD, "nope"),
            ],
            || {
                let mut config = PoolConfig::new(1, 2, 4);
                config.apply_env_overrides();
                config
            },
        );
        assert_eq!(config.min, 3);
        assert_eq!(config.max, 12);
        assert_eq!(config.threshold, 2);
        assert_eq!(config.tick, Duration::from_millis(250));
        assert_eq!(config.thread_name_prefix, "ingest");
    }

    #[test]
    fn env_overrides_noop_when_unset() {
        init_test_logging();
        let config = with_envs(&[], || {
            let mut config = PoolConfig::new(2, 3, 10);
            config.apply_env_overrides();
            config
        });
        assert_eq!(config, PoolConfig::new(2, 3, 10));
    }

    #[test]
    fn config_error_display() {
        let err = ConfigError::Invalid {
            key: "tick_ms",
            reason: "tick must be positive".to_string(),
        };
        assert_eq!(err.to_string(), "invalid value for tick_ms: tick must be positive");
        let err: crate::Error = err.into();
        assert_eq!(err.kind(), crate::ErrorKind::Config);
    }

    #[cfg(feature = "config-file")]
    #[test]
    fn toml_round_trip_fields() {
        let config = PoolConfig::from_toml_str(
            r#"
            min = 2
            min-idle = 3
            max = 10
            tick_ms = 500
            idle_retention_secs = 120
            thread_name_prefix = "ingest"
            "#,
        )
        .expect("valid toml");
        assert_eq!((config.min, config.threshold, config.max), (2, 3, 10));
        assert_eq!(config.tick, Duration::from_millis(500));
        assert_eq!(config.idle_retention, Duration::from_secs(120));
        assert_eq!(config.sample_interval, DEFAULT_SAMPLE_INTERVAL);
        assert_eq!(config.thread_name_prefix, "ingest");
    }

    #[cfg(feature = "config-file")]
    #[test]
    fn toml_is_strict() {
        let err = PoolConfig::from_toml_str("min = \"two\"").expect_err("wrong type");
        assert!(matches!(err, ConfigError::Parse(_)));
        let err = PoolConfig::from_toml_str("maximum = 3").expect_err("unknown key");
        assert!(matches!(err, ConfigError::Parse(_)));
        let err = PoolConfig::from_toml_str("tick_ms = 0").expect_err("zero tick");
        assert!(matches!(err, ConfigError::Invalid { key: "tick_ms", .. }));
    }
}
