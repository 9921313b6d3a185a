//! Configuration loading from TOML files
//!
//! Config file is selected via:
//! 1. --config <path> command line argument
//! 2. CONFIG_FILE environment variable
//! 3. Default: config/dev.toml
//!
//! Every section is optional; missing keys take the defaults below.

use crate::domain::notification::NotifyStyle;
use crate::domain::position::{is_valid_time_format, DisplayTimezone, TimestampSource};
use anyhow::Context;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_ENDPOINT: &str = "http://api.open-notify.org/iss-now.json";
pub const DEFAULT_TIMESTAMP_FORMAT: &str = "%H:%M:%S";

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Request timeout (0 = unbounded)
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self { endpoint: default_endpoint(), timeout_ms: default_timeout_ms() }
    }
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

fn default_timeout_ms() -> u64 {
    10_000
}

#[derive(Debug, Clone, Deserialize)]
pub struct PollConfig {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// Manual trigger debounce window (0 = every trigger refreshes)
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    /// Drop completions from cycles older than the last rendered one
    #[serde(default = "default_true")]
    pub drop_stale: bool,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            debounce_ms: default_debounce_ms(),
            drop_stale: true,
        }
    }
}

fn default_interval_secs() -> u64 {
    300 // Public API etiquette: no more than one request per few minutes
}

fn default_debounce_ms() -> u64 {
    1000
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct MapConfig {
    #[serde(default = "default_zoom")]
    pub default_zoom: u8,
    #[serde(default = "default_max_zoom")]
    pub max_zoom: u8,
    #[serde(default = "default_attribution")]
    pub attribution: String,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            default_zoom: default_zoom(),
            max_zoom: default_max_zoom(),
            attribution: default_attribution(),
        }
    }
}

fn default_zoom() -> u8 {
    2
}

fn default_max_zoom() -> u8 {
    18
}

fn default_attribution() -> String {
    "© OpenStreetMap contributors".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct MarkerConfig {
    /// Name of the tracked object, used on the marker and in messages
    #[serde(default = "default_label")]
    pub label: String,
    /// Glyph drawn at the marker position
    #[serde(default = "default_symbol")]
    pub symbol: String,
    #[serde(default = "default_true")]
    pub popup: bool,
}

impl Default for MarkerConfig {
    fn default() -> Self {
        Self {
            label: default_label(),
            symbol: default_symbol(),
            popup: true,
        }
    }
}

fn default_label() -> String {
    "ISS".to_string()
}

fn default_symbol() -> String {
    "◉".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct DisplayConfig {
    #[serde(default = "default_timestamp_source")]
    pub timestamp_source: TimestampSource,
    #[serde(default = "default_timestamp_format")]
    pub timestamp_format: String,
    #[serde(default = "default_timezone")]
    pub timezone: DisplayTimezone,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            timestamp_source: default_timestamp_source(),
            timestamp_format: default_timestamp_format(),
            timezone: default_timezone(),
        }
    }
}

fn default_timestamp_source() -> TimestampSource {
    TimestampSource::Server
}

fn default_timestamp_format() -> String {
    DEFAULT_TIMESTAMP_FORMAT.to_string()
}

fn default_timezone() -> DisplayTimezone {
    DisplayTimezone::Local
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotifyConfig {
    #[serde(default = "default_notify_style")]
    pub style: NotifyStyle,
    #[serde(default = "default_toast_secs")]
    pub toast_secs: u64,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self { style: default_notify_style(), toast_secs: default_toast_secs() }
    }
}

fn default_notify_style() -> NotifyStyle {
    NotifyStyle::Toast
}

fn default_toast_secs() -> u64 {
    5
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConnectivityConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_probe_interval_secs")]
    pub probe_interval_secs: u64,
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
}

impl Default for ConnectivityConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            probe_interval_secs: default_probe_interval_secs(),
            probe_timeout_ms: default_probe_timeout_ms(),
        }
    }
}

fn default_probe_interval_secs() -> u64 {
    15
}

fn default_probe_timeout_ms() -> u64 {
    3000
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_interval_secs")]
    pub interval_secs: u64,
    /// Prometheus metrics HTTP port (0 to disable)
    #[serde(default)]
    pub prometheus_port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { interval_secs: default_metrics_interval_secs(), prometheus_port: 0 }
    }
}

fn default_metrics_interval_secs() -> u64 {
    60
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub poll: PollConfig,
    #[serde(default)]
    pub map: MapConfig,
    #[serde(default)]
    pub marker: MarkerConfig,
    #[serde(default)]
    pub display: DisplayConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
    #[serde(default)]
    pub connectivity: ConnectivityConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    endpoint: String,
    timeout_ms: u64,
    interval_secs: u64,
    debounce_ms: u64,
    drop_stale: bool,
    default_zoom: u8,
    max_zoom: u8,
    attribution: String,
    marker_label: String,
    marker_symbol: String,
    popup: bool,
    timestamp_source: TimestampSource,
    timestamp_format: String,
    timezone: DisplayTimezone,
    notify_style: NotifyStyle,
    toast_secs: u64,
    connectivity_enabled: bool,
    probe_interval_secs: u64,
    probe_timeout_ms: u64,
    metrics_interval_secs: u64,
    prometheus_port: u16,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_toml(TomlConfig::default(), "default".to_string())
    }
}

impl Config {
    fn from_toml(toml_config: TomlConfig, config_file: String) -> Self {
        let timestamp_format = if is_valid_time_format(&toml_config.display.timestamp_format) {
            toml_config.display.timestamp_format
        } else {
            eprintln!(
                "Warning: invalid timestamp_format {:?}. Using {:?}.",
                toml_config.display.timestamp_format, DEFAULT_TIMESTAMP_FORMAT
            );
            DEFAULT_TIMESTAMP_FORMAT.to_string()
        };

        Self {
            endpoint: toml_config.api.endpoint,
            timeout_ms: toml_config.api.timeout_ms,
            interval_secs: toml_config.poll.interval_secs.max(1),
            debounce_ms: toml_config.poll.debounce_ms,
            drop_stale: toml_config.poll.drop_stale,
            default_zoom: toml_config.map.default_zoom.min(toml_config.map.max_zoom),
            max_zoom: toml_config.map.max_zoom,
            attribution: toml_config.map.attribution,
            marker_label: toml_config.marker.label,
            marker_symbol: toml_config.marker.symbol,
            popup: toml_config.marker.popup,
            timestamp_source: toml_config.display.timestamp_source,
            timestamp_format,
            timezone: toml_config.display.timezone,
            notify_style: toml_config.notify.style,
            toast_secs: toml_config.notify.toast_secs,
            connectivity_enabled: toml_config.connectivity.enabled,
            probe_interval_secs: toml_config.connectivity.probe_interval_secs.max(1),
            probe_timeout_ms: toml_config.connectivity.probe_timeout_ms,
            metrics_interval_secs: toml_config.metrics.interval_secs.max(1),
            prometheus_port: toml_config.metrics.prometheus_port,
            config_file,
        }
    }

    /// Determine config file path from args or environment
    pub fn resolve_config_path(args: &[String]) -> String {
        for (i, arg) in args.iter().enumerate() {
            if arg == "--config" {
                if let Some(path) = args.get(i + 1) {
                    return path.clone();
                }
            }
            if let Some(path) = arg.strip_prefix("--config=") {
                return path.to_string();
            }
        }

        if let Ok(path) = env::var("CONFIG_FILE") {
            return path;
        }

        "config/dev.toml".to_string()
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let toml_config: TomlConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        Ok(Self::from_toml(toml_config, path.display().to_string()))
    }

    /// Load configuration - tries TOML file first, falls back to defaults
    pub fn load(args: &[String]) -> Self {
        Self::load_from_path(&Self::resolve_config_path(args))
    }

    /// Load configuration from an explicit path, falling back to defaults
    pub fn load_from_path(path: &str) -> Self {
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Warning: {:#}. Using defaults.", e);
                Self::default()
            }
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Request timeout, `None` when unbounded
    pub fn request_timeout(&self) -> Option<Duration> {
        (self.timeout_ms > 0).then(|| Duration::from_millis(self.timeout_ms))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn debounce_window(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn drop_stale(&self) -> bool {
        self.drop_stale
    }

    pub fn default_zoom(&self) -> u8 {
        self.default_zoom
    }

    pub fn max_zoom(&self) -> u8 {
        self.max_zoom
    }

    pub fn attribution(&self) -> &str {
        &self.attribution
    }

    pub fn marker_label(&self) -> &str {
        &self.marker_label
    }

    pub fn marker_symbol(&self) -> &str {
        &self.marker_symbol
    }

    pub fn popup(&self) -> bool {
        self.popup
    }

    pub fn timestamp_source(&self) -> TimestampSource {
        self.timestamp_source
    }

    pub fn timestamp_format(&self) -> &str {
        &self.timestamp_format
    }

    pub fn timezone(&self) -> DisplayTimezone {
        self.timezone
    }

    pub fn notify_style(&self) -> NotifyStyle {
        self.notify_style
    }

    pub fn toast_duration(&self) -> Duration {
        Duration::from_secs(self.toast_secs)
    }

    pub fn connectivity_enabled(&self) -> bool {
        self.connectivity_enabled
    }

    pub fn probe_interval(&self) -> Duration {
        Duration::from_secs(self.probe_interval_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn metrics_interval_secs(&self) -> u64 {
        self.metrics_interval_secs
    }

    pub fn prometheus_port(&self) -> u16 {
        self.prometheus_port
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }

    /// Builder method for tests and embedders to point at another endpoint
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Builder method to set the request timeout (0 = unbounded)
    pub fn with_timeout_ms(mut self, ms: u64) -> Self {
        self.timeout_ms = ms;
        self
    }

    /// Builder method to set the manual trigger debounce window
    pub fn with_debounce_ms(mut self, ms: u64) -> Self {
        self.debounce_ms = ms;
        self
    }

    /// Builder method to choose the timestamp source and UTC formatting
    pub fn with_timestamp(mut self, source: TimestampSource, format: &str) -> Self {
        self.timestamp_source = source;
        self.timestamp_format = format.to_string();
        self.timezone = DisplayTimezone::Utc;
        self
    }

    pub fn with_notify_style(mut self, style: NotifyStyle) -> Self {
        self.notify_style = style;
        self
    }

    pub fn with_drop_stale(mut self, drop_stale: bool) -> Self {
        self.drop_stale = drop_stale;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.endpoint(), DEFAULT_ENDPOINT);
        assert_eq!(config.request_timeout(), Some(Duration::from_secs(10)));
        assert_eq!(config.poll_interval(), Duration::from_secs(300));
        assert_eq!(config.debounce_window(), Duration::from_secs(1));
        assert_eq!(config.default_zoom(), 2);
        assert_eq!(config.max_zoom(), 18);
        assert_eq!(config.toast_duration(), Duration::from_secs(5));
        assert_eq!(config.notify_style(), NotifyStyle::Toast);
        assert_eq!(config.timestamp_source(), TimestampSource::Server);
        assert_eq!(config.marker_label(), "ISS");
        assert_eq!(config.prometheus_port(), 0);
        assert!(config.drop_stale());
    }

    #[test]
    fn test_zero_timeout_is_unbounded() {
        let config = Config::default().with_timeout_ms(0);
        assert_eq!(config.request_timeout(), None);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let toml_config: TomlConfig = toml::from_str(
            r#"
[poll]
interval_secs = 5

[notify]
style = "log"
"#,
        )
        .unwrap();
        let config = Config::from_toml(toml_config, "inline".to_string());
        assert_eq!(config.poll_interval(), Duration::from_secs(5));
        assert_eq!(config.debounce_window(), Duration::from_secs(1));
        assert_eq!(config.notify_style(), NotifyStyle::Log);
        assert_eq!(config.endpoint(), DEFAULT_ENDPOINT);
    }

    #[test]
    fn test_default_zoom_clamped_to_max() {
        let toml_config: TomlConfig =
            toml::from_str("[map]\ndefault_zoom = 20\nmax_zoom = 10\n").unwrap();
        let config = Config::from_toml(toml_config, "inline".to_string());
        assert_eq!(config.default_zoom(), 10);
    }

    #[test]
    fn test_invalid_timestamp_format_falls_back() {
        let toml_config: TomlConfig =
            toml::from_str("[display]\ntimestamp_format = \"%Q\"\n").unwrap();
        let config = Config::from_toml(toml_config, "inline".to_string());
        assert_eq!(config.timestamp_format(), DEFAULT_TIMESTAMP_FORMAT);
    }

    #[test]
    fn test_resolve_config_path_from_arg() {
        let args: Vec<String> =
            vec!["iss-tracker".to_string(), "--config".to_string(), "config/prod.toml".to_string()];
        assert_eq!(Config::resolve_config_path(&args), "config/prod.toml");
    }

    #[test]
    fn test_resolve_config_path_from_arg_equals() {
        let args: Vec<String> =
            vec!["iss-tracker".to_string(), "--config=config/fast.toml".to_string()];
        assert_eq!(Config::resolve_config_path(&args), "config/fast.toml");
    }
}
