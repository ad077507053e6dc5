//! Configuration management for the event generator

use crate::errors::{EventGenError, Result};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Size units, powers of 1024.
const SIZE_UNITS: [(&str, u64); 5] = [
    ("B", 1),
    ("KB", 1024),
    ("MB", 1024 * 1024),
    ("GB", 1024 * 1024 * 1024),
    ("PB", 1024 * 1024 * 1024 * 1024),
];

/// Time range units in seconds.
const TIME_UNITS: [(&str, u64); 3] = [("m", 60), ("h", 3600), ("d", 86400)];

/// Wire format of emitted events
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Json,
    Xml,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Xml => write!(f, "xml"),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = EventGenError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "xml" => Ok(OutputFormat::Xml),
            other => Err(EventGenError::UnsupportedEventFormat(other.to_string())),
        }
    }
}

/// Bearer token for the sink. Only ever read from the environment.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct SecretToken(String);

impl SecretToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for SecretToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretToken(**redacted**)")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Wire format of dispatched events
    #[serde(default)]
    pub format: OutputFormat,

    /// Path to the raw audit log used as sample input
    pub samples: String,

    /// Total volume to emit, e.g. "10MB"
    pub output_size: String,

    /// Window to spread the volume across, e.g. "1h"
    pub time_range: String,

    /// Destination of the HTTP POSTs
    pub webhook_url: String,

    /// IANA zone used for event timestamps
    #[serde(default = "default_timezone")]
    pub timezone: String,

    /// HTTP timeout for each delivery
    #[serde(default = "default_http_timeout_seconds")]
    pub http_timeout_seconds: u64,

    /// Injected from AUTH_TOKEN, never part of the file
    #[serde(skip)]
    pub auth_token: SecretToken,
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_http_timeout_seconds() -> u64 {
    30
}

impl Default for Config {
    fn default() -> Self {
        Self {
            format: OutputFormat::Json,
            samples: "audit_log.txt".to_string(),
            output_size: "10MB".to_string(),
            time_range: "1h".to_string(),
            webhook_url: "http://localhost:8080/webhook".to_string(),
            timezone: default_timezone(),
            http_timeout_seconds: default_http_timeout_seconds(),
            auth_token: SecretToken::default(),
        }
    }
}

impl Config {
    /// Load configuration from a JSON file, then apply the environment
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            EventGenError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;

        let mut config = Self::from_json(&text)?;
        config.apply_env()?;
        Ok(config)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text)
            .map_err(|e| EventGenError::Config(format!("invalid configuration: {}", e)))
    }

    /// Apply AUTH_TOKEN and the EVENTGEN_* overrides from the process
    /// environment. An unknown EVENTGEN_FORMAT is an error.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_overrides(|name| env::var(name).ok())
    }

    /// Apply overrides from any variable source.
    pub fn apply_overrides<F>(&mut self, var: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(token) = var("AUTH_TOKEN") {
            self.auth_token = SecretToken::new(token);
        }

        if let Some(format) = var("EVENTGEN_FORMAT") {
            self.format = format.parse()?;
        }

        if let Some(samples) = var("EVENTGEN_SAMPLES") {
            self.samples = samples;
        }

        if let Some(output_size) = var("EVENTGEN_OUTPUT_SIZE") {
            self.output_size = output_size;
        }

        if let Some(time_range) = var("EVENTGEN_TIME_RANGE") {
            self.time_range = time_range;
        }

        if let Some(webhook_url) = var("EVENTGEN_WEBHOOK_URL") {
            self.webhook_url = webhook_url;
        }

        Ok(())
    }

    /// Validate the configuration. Size, time and zone strings must parse.
    pub fn validate(&self) -> Result<()> {
        if self.samples.is_empty() {
            return Err(EventGenError::Config("samples cannot be empty".to_string()));
        }

        if self.webhook_url.is_empty() {
            return Err(EventGenError::Config("webhook_url cannot be empty".to_string()));
        }

        if self.http_timeout_seconds == 0 {
            return Err(EventGenError::Config(
                "http_timeout_seconds must be greater than 0".to_string(),
            ));
        }

        self.byte_budget()?;
        self.time_budget()?;
        self.tz()?;

        Ok(())
    }

    pub fn byte_budget(&self) -> Result<u64> {
        parse_size(&self.output_size)
    }

    pub fn time_budget(&self) -> Result<u64> {
        parse_time_range(&self.time_range)
    }

    pub fn tz(&self) -> Result<Tz> {
        self.timezone
            .parse::<Tz>()
            .map_err(|_| EventGenError::Config(format!("unknown timezone '{}'", self.timezone)))
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_seconds)
    }
}

/// Split "10MB" into (10, "MB"). Returns None without a leading number.
fn split_quantity(value: &str) -> Option<(u64, &str)> {
    let value = value.trim();
    let digits_end = value
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(value.len());

    let number = value[..digits_end].parse().ok()?;
    Some((number, value[digits_end..].trim()))
}

fn lookup(units: &[(&str, u64)], unit: &str) -> Option<u64> {
    units.iter().find(|(name, _)| *name == unit).map(|(_, m)| *m)
}

/// Parse a size like "10MB" into bytes
pub fn parse_size(size: &str) -> Result<u64> {
    let invalid = || EventGenError::InvalidSizeUnit(size.to_string());

    let (number, unit) = split_quantity(size).ok_or_else(invalid)?;
    let multiplier = lookup(&SIZE_UNITS, unit).ok_or_else(invalid)?;

    number.checked_mul(multiplier).ok_or_else(invalid)
}

/// Parse a time range like "2h" into seconds
pub fn parse_time_range(time_range: &str) -> Result<u64> {
    let invalid = || EventGenError::InvalidTimeUnit(time_range.to_string());

    let (number, unit) = split_quantity(time_range).ok_or_else(invalid)?;
    let multiplier = lookup(&TIME_UNITS, unit).ok_or_else(invalid)?;

    number.checked_mul(multiplier).ok_or_else(invalid)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("10MB").unwrap(), 10 * 1024 * 1024);
        assert_eq!(parse_size("1KB").unwrap(), 1024);
        assert_eq!(parse_size("512B").unwrap(), 512);
        assert_eq!(parse_size("2GB").unwrap(), 2 * 1024 * 1024 * 1024);
        assert_eq!(parse_size(" 3 MB ").unwrap(), 3 * 1024 * 1024);
    }

    #[test]
    fn test_parse_size_rejects_unknown_units() {
        assert!(matches!(parse_size("10X"), Err(EventGenError::InvalidSizeUnit(_))));
        assert!(matches!(parse_size("10mb"), Err(EventGenError::InvalidSizeUnit(_))));
        assert!(matches!(parse_size("MB"), Err(EventGenError::InvalidSizeUnit(_))));
        assert!(matches!(parse_size(""), Err(EventGenError::InvalidSizeUnit(_))));
    }

    #[test]
    fn test_parse_time_range() {
        assert_eq!(parse_time_range("2h").unwrap(), 7200);
        assert_eq!(parse_time_range("1m").unwrap(), 60);
        assert_eq!(parse_time_range("3d").unwrap(), 3 * 86400);
    }

    #[test]
    fn test_parse_time_range_rejects_unknown_units() {
        assert!(matches!(parse_time_range("5s"), Err(EventGenError::InvalidTimeUnit(_))));
        assert!(matches!(parse_time_range("h"), Err(EventGenError::InvalidTimeUnit(_))));
        assert!(matches!(parse_time_range("1.5h"), Err(EventGenError::InvalidTimeUnit(_))));
    }

    #[test]
    fn test_config_from_json_applies_defaults() {
        let config = Config::from_json(
            r#"{
                "format": "xml",
                "samples": "audit_log.txt",
                "output_size": "1KB",
                "time_range": "1m",
                "webhook_url": "http://localhost:9000/hook"
            }"#,
        )
        .unwrap();

        assert_eq!(config.format, OutputFormat::Xml);
        assert_eq!(config.timezone, "UTC");
        assert_eq!(config.http_timeout(), Duration::from_secs(30));
        assert!(config.auth_token.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_auth_token_is_never_read_from_file() {
        let config = Config::from_json(
            r#"{
                "samples": "s",
                "output_size": "1KB",
                "time_range": "1m",
                "webhook_url": "http://x",
                "auth_token": "from-file"
            }"#,
        )
        .unwrap();

        assert!(config.auth_token.is_empty());
    }

    #[test]
    fn test_auth_token_is_never_serialized_or_logged() {
        let mut config = Config::default();
        config.auth_token = SecretToken::new("super-secret");

        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("super-secret"));
        assert!(!format!("{:?}", config).contains("super-secret"));
    }

    #[test]
    fn test_validate_rejects_bad_units_and_zones() {
        let mut config = Config::default();
        config.output_size = "10X".to_string();
        assert!(matches!(config.validate(), Err(EventGenError::InvalidSizeUnit(_))));

        let mut config = Config::default();
        config.time_range = "5s".to_string();
        assert!(matches!(config.validate(), Err(EventGenError::InvalidTimeUnit(_))));

        let mut config = Config::default();
        config.timezone = "Mars/Olympus".to_string();
        assert!(matches!(config.validate(), Err(EventGenError::Config(_))));

        let mut config = Config::default();
        config.webhook_url = String::new();
        assert!(matches!(config.validate(), Err(EventGenError::Config(_))));
    }

    #[test]
    fn test_unknown_format_override_is_rejected() {
        let mut config = Config::default();
        config.format = OutputFormat::Xml;

        let result = config.apply_overrides(|name| match name {
            "EVENTGEN_FORMAT" => Some("yaml".to_string()),
            _ => None,
        });

        assert!(matches!(result, Err(EventGenError::UnsupportedEventFormat(_))));
    }

    #[test]
    fn test_overrides_replace_file_values() {
        let mut config = Config::default();

        config
            .apply_overrides(|name| match name {
                "AUTH_TOKEN" => Some("env-token".to_string()),
                "EVENTGEN_FORMAT" => Some("xml".to_string()),
                "EVENTGEN_OUTPUT_SIZE" => Some("2KB".to_string()),
                "EVENTGEN_WEBHOOK_URL" => Some("http://sink:9000/in".to_string()),
                _ => None,
            })
            .unwrap();

        assert_eq!(config.auth_token.expose(), "env-token");
        assert_eq!(config.format, OutputFormat::Xml);
        assert_eq!(config.byte_budget().unwrap(), 2048);
        assert_eq!(config.webhook_url, "http://sink:9000/in");
        assert_eq!(config.time_range, "1h");
    }

    #[test]
    fn test_output_format_from_str() {
        assert_eq!("json".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        assert_eq!("XML".parse::<OutputFormat>().unwrap(), OutputFormat::Xml);
        assert!(matches!(
            "yaml".parse::<OutputFormat>(),
            Err(EventGenError::UnsupportedEventFormat(_))
        ));
    }
}
