//! Feed Client Configuration Settings
//!
//! Configuration types for the feed client, loaded from environment variables.
//! Parsing goes through a key lookup function so that tests can supply their
//! own variables without touching the process environment.

use std::path::PathBuf;
use std::time::Duration;

use crate::domain::reference::ConversionTableFormat;
use crate::domain::streaming::{FeedEndpoint, FeedKind};
use crate::infrastructure::powertrade::DEFAULT_BASE_URL;

/// Feed endpoint settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointSettings {
    /// Feed base URL; each feed kind is selected with a `type[]` query.
    pub base_url: String,
    /// Feed kinds to subscribe, one connection each.
    pub feeds: Vec<FeedKind>,
}

impl Default for EndpointSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            feeds: FeedKind::ALL.to_vec(),
        }
    }
}

impl EndpointSettings {
    /// One endpoint per configured feed kind.
    #[must_use]
    pub fn endpoints(&self) -> Vec<FeedEndpoint> {
        self.feeds
            .iter()
            .map(|kind| FeedEndpoint::for_kind(&self.base_url, *kind))
            .collect()
    }
}

/// Reference data file locations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceDataSettings {
    /// JSON reference dataset.
    pub reference_data_path: PathBuf,
    /// Conversion table.
    pub conversion_table_path: PathBuf,
    /// Whether the conversion table starts with a header row.
    pub conversion_table_has_header: bool,
}

impl Default for ReferenceDataSettings {
    fn default() -> Self {
        Self {
            reference_data_path: PathBuf::from("data/ref_data.json"),
            conversion_table_path: PathBuf::from("data/product.csv"),
            conversion_table_has_header: false,
        }
    }
}

impl ReferenceDataSettings {
    /// Conversion table layout.
    #[must_use]
    pub fn conversion_table_format(&self) -> ConversionTableFormat {
        ConversionTableFormat {
            has_header: self.conversion_table_has_header,
            ..ConversionTableFormat::default()
        }
    }
}

/// Per-connection liveness and reconnection settings.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedSettings {
    /// Ping interval.
    pub heartbeat_interval: Duration,
    /// Pong timeout, measured from the ping.
    pub heartbeat_timeout: Duration,
    /// Delay before reconnecting.
    pub reconnect_delay: Duration,
    /// Delay cap when the multiplier is above one.
    pub reconnect_delay_max: Duration,
    /// Delay multiplier (1.0 = fixed delay).
    pub reconnect_delay_multiplier: f64,
    /// Jitter fraction applied to each delay.
    pub reconnect_jitter: f64,
    /// Consecutive failed connections before giving up (0 = unlimited).
    pub max_reconnect_attempts: u32,
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(10),
            heartbeat_timeout: Duration::from_secs(20),
            reconnect_delay: Duration::from_secs(5),
            reconnect_delay_max: Duration::from_secs(60),
            reconnect_delay_multiplier: 1.0,
            reconnect_jitter: 0.0,
            max_reconnect_attempts: 10,
        }
    }
}

/// Server port settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerSettings {
    /// Health and metrics HTTP port (0 = disabled).
    pub health_port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self { health_port: 8083 }
    }
}

/// Record fan-out settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SinkSettings {
    /// Broadcast capacity per record kind.
    pub record_channel_capacity: usize,
}

impl Default for SinkSettings {
    fn default() -> Self {
        Self {
            record_channel_capacity: 10_000,
        }
    }
}

/// Complete feed client configuration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClientConfig {
    /// Feed endpoints.
    pub endpoints: EndpointSettings,
    /// Reference data locations.
    pub reference: ReferenceDataSettings,
    /// Liveness and reconnection.
    pub feed: FeedSettings,
    /// Server ports.
    pub server: ServerSettings,
    /// Record fan-out.
    pub sink: SinkSettings,
}

impl ClientConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable holds an invalid value.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable holds an invalid value.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(&lookup);
        let defaults = Self::default();

        let endpoints = EndpointSettings {
            base_url: env
                .string("POWERTRADE_WS_BASE_URL")
                .unwrap_or(defaults.endpoints.base_url),
            feeds: match env.string("POWERTRADE_FEEDS") {
                Some(raw) => parse_feeds(&raw)?,
                None => defaults.endpoints.feeds,
            },
        };

        let reference = ReferenceDataSettings {
            reference_data_path: env
                .string("POWERTRADE_REFERENCE_DATA_PATH")
                .map_or(defaults.reference.reference_data_path, PathBuf::from),
            conversion_table_path: env
                .string("POWERTRADE_CONVERSION_TABLE_PATH")
                .map_or(defaults.reference.conversion_table_path, PathBuf::from),
            conversion_table_has_header: env.bool(
                "POWERTRADE_CONVERSION_TABLE_HAS_HEADER",
                defaults.reference.conversion_table_has_header,
            )?,
        };

        let feed = FeedSettings {
            heartbeat_interval: env.duration_secs(
                "FEED_HEARTBEAT_INTERVAL_SECS",
                defaults.feed.heartbeat_interval,
            ),
            heartbeat_timeout: env.duration_secs(
                "FEED_HEARTBEAT_TIMEOUT_SECS",
                defaults.feed.heartbeat_timeout,
            ),
            reconnect_delay: env
                .duration_secs("FEED_RECONNECT_DELAY_SECS", defaults.feed.reconnect_delay),
            reconnect_delay_max: env.duration_secs(
                "FEED_RECONNECT_DELAY_MAX_SECS",
                defaults.feed.reconnect_delay_max,
            ),
            reconnect_delay_multiplier: env.parse(
                "FEED_RECONNECT_DELAY_MULTIPLIER",
                defaults.feed.reconnect_delay_multiplier,
            ),
            reconnect_jitter: env.parse("FEED_RECONNECT_JITTER", defaults.feed.reconnect_jitter),
            max_reconnect_attempts: env.parse(
                "FEED_MAX_RECONNECT_ATTEMPTS",
                defaults.feed.max_reconnect_attempts,
            ),
        };

        let server = ServerSettings {
            health_port: env.parse("FEED_HEALTH_PORT", defaults.server.health_port),
        };

        let sink = SinkSettings {
            record_channel_capacity: env.parse(
                "FEED_RECORD_CHANNEL_CAPACITY",
                defaults.sink.record_channel_capacity,
            ),
        };

        let config = Self {
            endpoints,
            reference,
            feed,
            server,
            sink,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let feed = &self.feed;
        if feed.heartbeat_interval.is_zero() {
            return Err(invalid("FEED_HEARTBEAT_INTERVAL_SECS", "0"));
        }
        if feed.heartbeat_timeout.is_zero() {
            return Err(invalid("FEED_HEARTBEAT_TIMEOUT_SECS", "0"));
        }
        let multiplier = feed.reconnect_delay_multiplier;
        if !multiplier.is_finite() || multiplier < 1.0 {
            return Err(invalid("FEED_RECONNECT_DELAY_MULTIPLIER", multiplier));
        }
        if !(0.0..=1.0).contains(&feed.reconnect_jitter) {
            return Err(invalid("FEED_RECONNECT_JITTER", feed.reconnect_jitter));
        }
        if self.sink.record_channel_capacity == 0 {
            return Err(invalid("FEED_RECORD_CHANNEL_CAPACITY", "0"));
        }
        Ok(())
    }
}

fn invalid(key: &str, value: impl std::fmt::Display) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    }
}

/// Configuration error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// Feed list names an unknown kind.
    #[error("unknown feed kind in POWERTRADE_FEEDS: {0}")]
    UnknownFeed(String),
    /// Feed list is empty.
    #[error("POWERTRADE_FEEDS must name at least one feed")]
    NoFeeds,
    /// Variable holds a value that cannot be used.
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue {
        /// Variable name.
        key: String,
        /// Offending value.
        value: String,
    },
}

fn parse_feeds(raw: &str) -> Result<Vec<FeedKind>, ConfigError> {
    let mut feeds = Vec::new();
    for name in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let kind: FeedKind = name
            .parse()
            .map_err(|_| ConfigError::UnknownFeed(name.to_string()))?;
        if !feeds.contains(&kind) {
            feeds.push(kind);
        }
    }

    if feeds.is_empty() {
        return Err(ConfigError::NoFeeds);
    }
    Ok(feeds)
}

struct Env<'a>(&'a dyn Fn(&str) -> Option<String>);

impl Env<'_> {
    fn string(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|v| !v.trim().is_empty())
    }

    fn parse<T: std::str::FromStr>(&self, key: &str, default: T) -> T {
        self.string(key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }

    fn duration_secs(&self, key: &str, default: Duration) -> Duration {
        self.string(key)
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map_or(default, Duration::from_secs)
    }

    fn bool(&self, key: &str, default: bool) -> Result<bool, ConfigError> {
        let Some(value) = self.string(key) else {
            return Ok(default);
        };
        match value.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::InvalidValue {
                key: key.to_string(),
                value,
            }),
        }
    }
}
