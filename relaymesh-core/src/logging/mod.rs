//! Logging subsystem for relaymesh
//!
//! Every component logs through `tracing` with structured fields (`node`,
//! `peer`, `conn_id`). This module installs the process-wide subscriber: an
//! `EnvFilter` in front of a `fmt` layer that writes either human-readable
//! lines or JSON. `RUST_LOG`, when set, replaces the configured filter.

use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry,
};

mod error;
mod level;

pub use error::LoggingError;
pub use level::LogLevel;

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub level: LogLevel,
    pub with_timestamp: bool,
    pub with_target: bool,
    pub json_format: bool,
    /// Per-target overrides appended after the base level
    pub directives: Vec<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self::new(LogLevel::Info)
    }
}

impl LogConfig {
    pub fn new(level: LogLevel) -> Self {
        Self {
            level,
            with_timestamp: true,
            with_target: true,
            json_format: false,
            directives: Vec::new(),
        }
    }

    pub fn with_timestamp(mut self, enabled: bool) -> Self {
        self.with_timestamp = enabled;
        self
    }

    pub fn with_target(mut self, enabled: bool) -> Self {
        self.with_target = enabled;
        self
    }

    pub fn json_format(mut self, enabled: bool) -> Self {
        self.json_format = enabled;
        self
    }

    /// Add filter directives such as `relaymesh_core::core_controller=trace`
    pub fn directives<I, S>(mut self, directives: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.directives.extend(directives.into_iter().map(Into::into));
        self
    }

    /// Filter string built from the level and directives
    pub fn filter_spec(&self) -> String {
        std::iter::once(self.level.as_str().to_string())
            .chain(self.directives.iter().map(|d| d.trim().to_string()))
            .filter(|d| !d.is_empty())
            .collect::<Vec<_>>()
            .join(",")
    }

    /// The filter this configuration describes, ignoring `RUST_LOG`
    pub fn env_filter(&self) -> Result<EnvFilter, LoggingError> {
        let spec = self.filter_spec();
        EnvFilter::try_new(&spec)
            .map_err(|e| LoggingError::InvalidConfiguration(format!("filter '{}': {}", spec, e)))
    }
}

/// Install the subscriber with default settings (info, human-readable)
///
/// # Example
/// ```
/// use relaymesh_core::logging::init_logging;
///
/// let _ = init_logging();
/// ```
pub fn init_logging() -> Result<(), LoggingError> {
    init_logging_with_config(LogConfig::default())
}

/// Install the subscriber described by `config`
///
/// Fails if a global subscriber is already installed or a directive does not
/// parse.
pub fn init_logging_with_config(config: LogConfig) -> Result<(), LoggingError> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => config.env_filter()?,
    };

    let target = config.with_target;
    let fmt_layer: Box<dyn Layer<Registry> + Send + Sync> =
        match (config.json_format, config.with_timestamp) {
            (true, true) => fmt::layer().json().with_target(target).boxed(),
            (true, false) => fmt::layer().json().without_time().with_target(target).boxed(),
            (false, true) => fmt::layer().with_target(target).boxed(),
            (false, false) => fmt::layer().without_time().with_target(target).boxed(),
        };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(env_filter)
        .try_init()
        .map_err(|e| LoggingError::InitializationFailed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_info_with_timestamps() {
        let config = LogConfig::default();
        assert_eq!(config.level, LogLevel::Info);
        assert!(config.with_timestamp && config.with_target && !config.json_format);
        assert_eq!(config.filter_spec(), "info");
    }

    #[test]
    fn test_directives_extend_filter() {
        let config = LogConfig::new(LogLevel::Warn)
            .json_format(true)
            .directives(["relaymesh_core::core_router=debug", " "]);

        assert!(config.json_format);
        assert_eq!(config.filter_spec(), "warn,relaymesh_core::core_router=debug");
        assert!(config.env_filter().is_ok());
    }

    #[test]
    fn test_bad_directive_is_rejected() {
        let config = LogConfig::new(LogLevel::Info).directives(["core_router=loudest"]);
        assert!(matches!(
            config.env_filter(),
            Err(LoggingError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_second_init_fails() {
        // Whichever call wins, at most one install can succeed per process.
        let first = init_logging_with_config(LogConfig::new(LogLevel::Warn).with_timestamp(false));
        let second = init_logging_with_config(LogConfig::new(LogLevel::Warn));
        assert!(!(first.is_ok() && second.is_ok()));
        assert!(matches!(second, Err(LoggingError::InitializationFailed(_))));
    }
}
