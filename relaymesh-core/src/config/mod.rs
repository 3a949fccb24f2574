//! Configuration management for relaymesh
//!
//! Controller and router settings, loadable from TOML files and overridable
//! from `RELAYMESH_<SECTION>_<KEY>` environment variables. Durations are
//! written in humantime form (`"5s"`, `"250ms"`).

use serde::{Deserialize, Serialize};
use std::env;
use std::fmt::Display;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::core_store::is_file_safe;
use crate::logging::{LogConfig, LogLevel};

mod error;

pub use error::ConfigError;

/// Frames larger than this are discarded by every reader (16 MiB)
pub const DEFAULT_MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Controller process settings
    pub controller: ControllerConfig,

    /// Router process settings
    pub router: RouterConfig,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// Metrics configuration
    pub metrics: MetricsConfig,
}

/// Controller configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Address routers connect to
    pub bind_address: SocketAddr,

    /// How often stale routers are swept
    #[serde(with = "humantime_serde")]
    pub heartbeat_check_interval: Duration,

    /// Silence after which a router is evicted
    #[serde(with = "humantime_serde")]
    pub heartbeat_timeout: Duration,

    /// Time a new connection has to send its auth frame
    #[serde(with = "humantime_serde")]
    pub auth_timeout: Duration,

    /// Upper bound on a single buffered frame
    pub max_frame_size: usize,

    /// Static topology, applied as routers join
    pub edges: Vec<EdgeConfig>,
}

/// One undirected link of the static topology
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeConfig {
    pub a: String,
    pub b: String,
    pub weight: i64,
}

impl EdgeConfig {
    pub fn new(a: impl Into<String>, b: impl Into<String>, weight: i64) -> Self {
        Self {
            a: a.into(),
            b: b.into(),
            weight,
        }
    }
}

/// Router configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Unique node name; also names the route file
    pub name: String,

    /// Listen address for peers and local applications
    pub bind_address: SocketAddr,

    /// Host announced to the controller; defaults to the bind IP
    pub advertise_host: Option<String>,

    /// Controller `host:port`
    pub controller_address: String,

    #[serde(with = "humantime_serde")]
    pub heartbeat_interval: Duration,

    /// Timeout for dialing the controller or a next hop
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,

    /// Directory holding `routes_<name>.json`
    pub routes_dir: PathBuf,

    /// Directory receiving file payloads, one subdirectory per node
    pub received_dir: PathBuf,

    pub max_frame_size: usize,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Enable JSON formatting
    pub json_format: bool,

    /// Include timestamps
    pub with_timestamp: bool,

    /// Include target module
    pub with_target: bool,

    /// Extra filter directives, e.g. `relaymesh_core::core_router=debug`
    pub directives: Vec<String>,
}

/// Metrics configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Serve a Prometheus scrape endpoint
    pub enabled: bool,

    /// Metrics bind address
    pub bind_address: SocketAddr,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 8079),
            heartbeat_check_interval: Duration::from_secs(5),
            heartbeat_timeout: Duration::from_secs(10),
            auth_timeout: Duration::from_secs(5),
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            edges: Vec::new(),
        }
    }
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            name: "router".to_string(),
            bind_address: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 8080),
            advertise_host: None,
            controller_address: "127.0.0.1:8079".to_string(),
            heartbeat_interval: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(5),
            routes_dir: PathBuf::from("./routes"),
            received_dir: PathBuf::from("./received"),
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

impl RouterConfig {
    /// Host placed in this router's auth frame
    ///
    /// An unspecified bind address (`0.0.0.0`) is not dialable, so loopback
    /// is announced instead unless `advertise_host` says otherwise.
    pub fn announced_host(&self, bound: SocketAddr) -> String {
        match &self.advertise_host {
            Some(host) => host.clone(),
            None if bound.ip().is_unspecified() => Ipv4Addr::LOCALHOST.to_string(),
            None => bound.ip().to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            with_timestamp: true,
            with_target: true,
            directives: Vec::new(),
        }
    }
}

impl LoggingConfig {
    /// Convert to the logging subsystem's configuration
    pub fn to_log_config(&self) -> Result<LogConfig, ConfigError> {
        let level = LogLevel::parse(&self.level)
            .ok_or_else(|| ConfigError::invalid("logging.level", &self.level))?;
        Ok(LogConfig::new(level)
            .with_timestamp(self.with_timestamp)
            .with_target(self.with_target)
            .json_format(self.json_format)
            .directives(self.directives.iter().cloned()))
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bind_address: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 9090),
        }
    }
}

fn env_value<T>(key: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse()
            .map(Some)
            .map_err(|e| ConfigError::invalid(key, e)),
        Err(_) => Ok(None),
    }
}

fn env_duration(key: &str) -> Result<Option<Duration>, ConfigError> {
    match env::var(key) {
        Ok(raw) => humantime_serde::re::humantime::parse_duration(&raw)
            .map(Some)
            .map_err(|e| ConfigError::invalid(key, e)),
        Err(_) => Ok(None),
    }
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// Environment variables follow the pattern: RELAYMESH_<SECTION>_<KEY>
    /// Example: RELAYMESH_ROUTER_NAME=NY
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Overlay environment variables onto an existing configuration
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        // Controller
        if let Some(addr) = env_value("RELAYMESH_CONTROLLER_BIND_ADDRESS")? {
            self.controller.bind_address = addr;
        }
        if let Some(interval) = env_duration("RELAYMESH_CONTROLLER_HEARTBEAT_CHECK_INTERVAL")? {
            self.controller.heartbeat_check_interval = interval;
        }
        if let Some(timeout) = env_duration("RELAYMESH_CONTROLLER_HEARTBEAT_TIMEOUT")? {
            self.controller.heartbeat_timeout = timeout;
        }

        // Router
        if let Ok(name) = env::var("RELAYMESH_ROUTER_NAME") {
            self.router.name = name;
        }
        if let Some(addr) = env_value("RELAYMESH_ROUTER_BIND_ADDRESS")? {
            self.router.bind_address = addr;
        }
        if let Ok(host) = env::var("RELAYMESH_ROUTER_ADVERTISE_HOST") {
            self.router.advertise_host = Some(host);
        }
        if let Ok(addr) = env::var("RELAYMESH_ROUTER_CONTROLLER_ADDRESS") {
            self.router.controller_address = addr;
        }
        if let Some(interval) = env_duration("RELAYMESH_ROUTER_HEARTBEAT_INTERVAL")? {
            self.router.heartbeat_interval = interval;
        }
        if let Ok(dir) = env::var("RELAYMESH_ROUTER_ROUTES_DIR") {
            self.router.routes_dir = PathBuf::from(dir);
        }
        if let Ok(dir) = env::var("RELAYMESH_ROUTER_RECEIVED_DIR") {
            self.router.received_dir = PathBuf::from(dir);
        }

        // Logging
        if let Ok(level) = env::var("RELAYMESH_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(json) = env_value("RELAYMESH_LOG_JSON")? {
            self.logging.json_format = json;
        }

        // Metrics
        if let Some(enabled) = env_value("RELAYMESH_METRICS_ENABLED")? {
            self.metrics.enabled = enabled;
        }
        if let Some(addr) = env_value("RELAYMESH_METRICS_BIND_ADDRESS")? {
            self.metrics.bind_address = addr;
        }

        Ok(())
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| ConfigError::FileReadError(e.to_string()))?;

        let config: Self =
            toml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.controller.validate()?;
        self.router.validate()?;
        self.logging
            .to_log_config()?
            .env_filter()
            .map_err(|e| ConfigError::invalid("logging.directives", e))?;
        Ok(())
    }

    /// Save configuration to file
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let contents =
            toml::to_string_pretty(self).map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(path, contents).map_err(|e| ConfigError::FileWriteError(e.to_string()))?;

        Ok(())
    }
}

impl ControllerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.heartbeat_check_interval.is_zero() {
            return Err(ConfigError::ValidationFailed(
                "heartbeat_check_interval must be greater than 0".to_string(),
            ));
        }
        if self.heartbeat_timeout <= self.heartbeat_check_interval {
            return Err(ConfigError::ValidationFailed(
                "heartbeat_timeout must exceed heartbeat_check_interval".to_string(),
            ));
        }
        if self.auth_timeout.is_zero() {
            return Err(ConfigError::ValidationFailed(
                "auth_timeout must be greater than 0".to_string(),
            ));
        }
        if self.max_frame_size == 0 {
            return Err(ConfigError::ValidationFailed(
                "max_frame_size must be greater than 0".to_string(),
            ));
        }
        for edge in &self.edges {
            if edge.weight <= 0 {
                return Err(ConfigError::ValidationFailed(format!(
                    "edge {}-{} has non-positive weight {}",
                    edge.a, edge.b, edge.weight
                )));
            }
            if edge.a.is_empty() || edge.b.is_empty() || edge.a == edge.b {
                return Err(ConfigError::ValidationFailed(format!(
                    "edge '{}'-'{}' must join two distinct named nodes",
                    edge.a, edge.b
                )));
            }
        }
        Ok(())
    }
}

impl RouterConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "router name must not be empty".to_string(),
            ));
        }
        // The name becomes part of file names on disk.
        if !is_file_safe(&self.name) {
            return Err(ConfigError::ValidationFailed(format!(
                "router name '{}' may only use letters, digits, '-', '_' and '.'",
                self.name
            )));
        }
        if self.controller_address.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "controller_address must not be empty".to_string(),
            ));
        }
        if self.heartbeat_interval.is_zero() {
            return Err(ConfigError::ValidationFailed(
                "heartbeat_interval must be greater than 0".to_string(),
            ));
        }
        if self.max_frame_size == 0 {
            return Err(ConfigError::ValidationFailed(
                "max_frame_size must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}
