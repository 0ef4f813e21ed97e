//! MongoDB connection configuration.
//!
//! Configuration is supplied explicitly: a connection URI plus optional
//! driver tuning and the default time zone used when converting stored
//! timestamps to local date-times. Nothing here reads the environment or
//! the filesystem; [`MongoConfig::from_toml_str`] only parses text the caller
//! already has.

use std::time::Duration;

use chrono::FixedOffset;
use mongodb::options::ClientOptions;
use serde::Deserialize;

use crate::error::{MongoError, MongoResult};

const DEFAULT_URI: &str = "mongodb://localhost:27017";

/// MongoDB connection configuration.
#[derive(Debug, Clone)]
pub struct MongoConfig {
    /// MongoDB connection URI.
    pub uri: String,
    /// Database handed out by [`MongoClient::default_database`](crate::MongoClient::default_database).
    pub default_database: Option<String>,
    /// Application name (shown in server logs).
    pub app_name: Option<String>,
    /// Minimum connection pool size.
    pub min_pool_size: Option<u32>,
    /// Maximum connection pool size.
    pub max_pool_size: Option<u32>,
    /// Maximum idle time for connections.
    pub max_idle_time: Option<Duration>,
    /// Connection timeout.
    pub connect_timeout: Option<Duration>,
    /// Server selection timeout.
    pub server_selection_timeout: Option<Duration>,
    /// Read preference.
    pub read_preference: Option<ReadPreference>,
    /// Retry writes.
    pub retry_writes: Option<bool>,
    /// Retry reads.
    pub retry_reads: Option<bool>,
    /// Direct connection (bypass replica set discovery).
    pub direct_connection: Option<bool>,
    /// Zone used to turn stored timestamps into local date-times and back.
    /// Defaults to UTC, matching the store's own timestamp semantics.
    ///
    /// Only fixed UTC offsets are supported. Named regions such as
    /// `Europe/Berlin` are rejected, and no daylight-saving shift is ever
    /// applied.
    pub default_zone: FixedOffset,
}

/// MongoDB read preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadPreference {
    /// Read from primary only.
    #[default]
    Primary,
    /// Read from primary preferred, fallback to secondary.
    PrimaryPreferred,
    /// Read from secondary only.
    Secondary,
    /// Read from secondary preferred, fallback to primary.
    SecondaryPreferred,
    /// Read from nearest member.
    Nearest,
}

/// UTC as a fixed offset.
pub fn utc_zone() -> FixedOffset {
    FixedOffset::east_opt(0).unwrap_or_else(|| unreachable!("zero offset is always valid"))
}

impl Default for MongoConfig {
    fn default() -> Self {
        Self {
            uri: DEFAULT_URI.to_string(),
            default_database: None,
            app_name: Some("quarry".to_string()),
            min_pool_size: None,
            max_pool_size: Some(10),
            max_idle_time: Some(Duration::from_secs(300)),
            connect_timeout: Some(Duration::from_secs(10)),
            server_selection_timeout: Some(Duration::from_secs(30)),
            read_preference: Some(ReadPreference::Primary),
            retry_writes: None,
            retry_reads: None,
            direct_connection: None,
            default_zone: utc_zone(),
        }
    }
}

impl MongoConfig {
    /// Create a new configuration from a MongoDB URI.
    pub fn from_uri(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            ..Self::default()
        }
    }

    /// Create a builder for configuration.
    pub fn builder() -> MongoConfigBuilder {
        MongoConfigBuilder::new()
    }

    /// Parse the `[mongodb]` table of a TOML document.
    ///
    /// ```toml
    /// [mongodb]
    /// uri = "mongodb://localhost:27017"
    /// default_database = "iot"
    /// default_zone = "+08:00"
    /// connect_timeout_ms = 5000
    /// ```
    pub fn from_toml_str(text: &str) -> MongoResult<Self> {
        let file: ConfigFile = toml::from_str(text)
            .map_err(|e| MongoError::config(format!("invalid TOML configuration: {}", e)))?;
        file.mongodb.into_builder()?.build()
    }

    /// Convert to MongoDB ClientOptions.
    pub async fn to_client_options(&self) -> MongoResult<ClientOptions> {
        let mut options = ClientOptions::parse(&self.uri)
            .await
            .map_err(|e| MongoError::config(format!("failed to parse URI: {}", e)))?;
        self.apply_to(&mut options);
        Ok(options)
    }

    /// Convert to MongoDB ClientOptions from synchronous code.
    ///
    /// URI parsing may resolve SRV records, so it runs on a short-lived
    /// current-thread runtime.
    #[cfg(feature = "blocking")]
    pub fn to_client_options_blocking(&self) -> MongoResult<ClientOptions> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| MongoError::connection(format!("failed to start runtime: {}", e)))?;
        runtime.block_on(self.to_client_options())
    }

    fn apply_to(&self, options: &mut ClientOptions) {
        if let Some(ref app_name) = self.app_name {
            options.app_name = Some(app_name.clone());
        }

        if let Some(min_pool) = self.min_pool_size {
            options.min_pool_size = Some(min_pool);
        }

        if let Some(max_pool) = self.max_pool_size {
            options.max_pool_size = Some(max_pool);
        }

        if let Some(max_idle) = self.max_idle_time {
            options.max_idle_time = Some(max_idle);
        }

        if let Some(connect_timeout) = self.connect_timeout {
            options.connect_timeout = Some(connect_timeout);
        }

        if let Some(selection_timeout) = self.server_selection_timeout {
            options.server_selection_timeout = Some(selection_timeout);
        }

        if let Some(read_pref) = self.read_preference {
            use mongodb::options::{ReadPreference as Driver, SelectionCriteria};

            let pref = match read_pref {
                ReadPreference::Primary => Driver::Primary,
                ReadPreference::PrimaryPreferred => Driver::PrimaryPreferred {
                    options: Default::default(),
                },
                ReadPreference::Secondary => Driver::Secondary {
                    options: Default::default(),
                },
                ReadPreference::SecondaryPreferred => Driver::SecondaryPreferred {
                    options: Default::default(),
                },
                ReadPreference::Nearest => Driver::Nearest {
                    options: Default::default(),
                },
            };
            options.selection_criteria = Some(SelectionCriteria::ReadPreference(pref));
        }

        if let Some(retry_writes) = self.retry_writes {
            options.retry_writes = Some(retry_writes);
        }

        if let Some(retry_reads) = self.retry_reads {
            options.retry_reads = Some(retry_reads);
        }

        if let Some(direct) = self.direct_connection {
            options.direct_connection = Some(direct);
        }
    }
}

/// Builder for MongoDB configuration.
#[derive(Debug, Default)]
pub struct MongoConfigBuilder {
    uri: Option<String>,
    default_database: Option<String>,
    app_name: Option<String>,
    min_pool_size: Option<u32>,
    max_pool_size: Option<u32>,
    max_idle_time: Option<Duration>,
    connect_timeout: Option<Duration>,
    server_selection_timeout: Option<Duration>,
    read_preference: Option<ReadPreference>,
    retry_writes: Option<bool>,
    retry_reads: Option<bool>,
    direct_connection: Option<bool>,
    default_zone: Option<FixedOffset>,
}

impl MongoConfigBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the MongoDB URI.
    pub fn uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = Some(uri.into());
        self
    }

    /// Set the default database name.
    pub fn default_database(mut self, database: impl Into<String>) -> Self {
        self.default_database = Some(database.into());
        self
    }

    /// Set the application name.
    pub fn app_name(mut self, name: impl Into<String>) -> Self {
        self.app_name = Some(name.into());
        self
    }

    /// Set the minimum pool size.
    pub fn min_pool_size(mut self, size: u32) -> Self {
        self.min_pool_size = Some(size);
        self
    }

    /// Set the maximum pool size.
    pub fn max_pool_size(mut self, size: u32) -> Self {
        self.max_pool_size = Some(size);
        self
    }

    /// Set the maximum idle time for connections.
    pub fn max_idle_time(mut self, duration: Duration) -> Self {
        self.max_idle_time = Some(duration);
        self
    }

    /// Set the connection timeout.
    pub fn connect_timeout(mut self, duration: Duration) -> Self {
        self.connect_timeout = Some(duration);
        self
    }

    /// Set the server selection timeout.
    pub fn server_selection_timeout(mut self, duration: Duration) -> Self {
        self.server_selection_timeout = Some(duration);
        self
    }

    /// Set the read preference.
    pub fn read_preference(mut self, pref: ReadPreference) -> Self {
        self.read_preference = Some(pref);
        self
    }

    /// Enable or disable retry writes.
    pub fn retry_writes(mut self, enabled: bool) -> Self {
        self.retry_writes = Some(enabled);
        self
    }

    /// Enable or disable retry reads.
    pub fn retry_reads(mut self, enabled: bool) -> Self {
        self.retry_reads = Some(enabled);
        self
    }

    /// Enable direct connection (bypass replica set discovery).
    pub fn direct_connection(mut self, enabled: bool) -> Self {
        self.direct_connection = Some(enabled);
        self
    }

    /// Override the default zone (UTC).
    pub fn default_zone(mut self, zone: FixedOffset) -> Self {
        self.default_zone = Some(zone);
        self
    }

    /// Build the configuration.
    pub fn build(self) -> MongoResult<MongoConfig> {
        let uri = self.uri.unwrap_or_else(|| DEFAULT_URI.to_string());
        if uri.trim().is_empty() {
            return Err(MongoError::config("connection URI must not be blank"));
        }

        let defaults = MongoConfig::default();
        Ok(MongoConfig {
            uri,
            default_database: self.default_database,
            app_name: self.app_name.or(defaults.app_name),
            min_pool_size: self.min_pool_size,
            max_pool_size: self.max_pool_size.or(defaults.max_pool_size),
            max_idle_time: self.max_idle_time.or(defaults.max_idle_time),
            connect_timeout: self.connect_timeout.or(defaults.connect_timeout),
            server_selection_timeout: self
                .server_selection_timeout
                .or(defaults.server_selection_timeout),
            read_preference: self.read_preference.or(defaults.read_preference),
            retry_writes: self.retry_writes,
            retry_reads: self.retry_reads,
            direct_connection: self.direct_connection,
            default_zone: self.default_zone.unwrap_or(defaults.default_zone),
        })
    }
}

#[derive(Debug, Deserialize)]
struct ConfigFile {
    mongodb: MongoSection,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct MongoSection {
    uri: Option<String>,
    default_database: Option<String>,
    app_name: Option<String>,
    min_pool_size: Option<u32>,
    max_pool_size: Option<u32>,
    max_idle_time_ms: Option<u64>,
    connect_timeout_ms: Option<u64>,
    server_selection_timeout_ms: Option<u64>,
    read_preference: Option<ReadPreference>,
    retry_writes: Option<bool>,
    retry_reads: Option<bool>,
    direct_connection: Option<bool>,
    default_zone: Option<String>,
}

impl MongoSection {
    fn into_builder(self) -> MongoResult<MongoConfigBuilder> {
        let default_zone = match self.default_zone {
            Some(zone) => Some(parse_zone(&zone)?),
            None => None,
        };

        Ok(MongoConfigBuilder {
            uri: self.uri,
            default_database: self.default_database,
            app_name: self.app_name,
            min_pool_size: self.min_pool_size,
            max_pool_size: self.max_pool_size,
            max_idle_time: self.max_idle_time_ms.map(Duration::from_millis),
            connect_timeout: self.connect_timeout_ms.map(Duration::from_millis),
            server_selection_timeout: self.server_selection_timeout_ms.map(Duration::from_millis),
            read_preference: self.read_preference,
            retry_writes: self.retry_writes,
            retry_reads: self.retry_reads,
            direct_connection: self.direct_connection,
            default_zone,
        })
    }
}

/// Parse a zone given as `UTC`, `Z` or a `±HH:MM` offset. Region names
/// are a configuration error.
pub fn parse_zone(text: &str) -> MongoResult<FixedOffset> {
    let text = text.trim();
    if text.eq_ignore_ascii_case("utc") || text == "Z" {
        return Ok(utc_zone());
    }
    text.parse::<FixedOffset>()
        .map_err(|e| MongoError::config(format!("invalid zone offset '{}': {}", text, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_from_uri() {
        let config = MongoConfig::from_uri("mongodb://localhost:27017");
        assert_eq!(config.uri, "mongodb://localhost:27017");
        assert_eq!(config.default_zone, utc_zone());
        assert!(config.default_database.is_none());
    }

    #[test]
    fn test_config_builder() {
        let zone = FixedOffset::east_opt(8 * 3600).unwrap();
        let config = MongoConfig::builder()
            .uri("mongodb://db:27017")
            .default_database("iot")
            .app_name("test-app")
            .max_pool_size(20)
            .default_zone(zone)
            .build()
            .unwrap();

        assert_eq!(config.default_database.as_deref(), Some("iot"));
        assert_eq!(config.app_name, Some("test-app".to_string()));
        assert_eq!(config.max_pool_size, Some(20));
        assert_eq!(config.default_zone, zone);
    }

    #[test]
    fn test_config_builder_rejects_blank_uri() {
        let result = MongoConfig::builder().uri("   ").build();
        assert!(result.unwrap_err().is_config_error());
    }

    #[test]
    fn test_config_from_toml() {
        let config = MongoConfig::from_toml_str(
            r#"
            [mongodb]
            uri = "mongodb://db:27017"
            default_database = "iot"
            default_zone = "+08:00"
            connect_timeout_ms = 5000
            read_preference = "secondary_preferred"
            "#,
        )
        .unwrap();

        assert_eq!(config.uri, "mongodb://db:27017");
        assert_eq!(config.default_zone.local_minus_utc(), 8 * 3600);
        assert_eq!(config.connect_timeout, Some(Duration::from_secs(5)));
        assert_eq!(
            config.read_preference,
            Some(ReadPreference::SecondaryPreferred)
        );
    }

    #[test]
    fn test_config_from_toml_rejects_bad_zone() {
        let result = MongoConfig::from_toml_str(
            r#"
            [mongodb]
            default_zone = "Mars/Olympus"
            "#,
        );
        assert!(result.unwrap_err().is_config_error());
    }

    #[test]
    fn test_parse_zone() {
        assert_eq!(parse_zone("UTC").unwrap(), utc_zone());
        assert_eq!(parse_zone("-05:00").unwrap().local_minus_utc(), -5 * 3600);
    }

    #[test]
    fn test_parse_zone_rejects_region_names() {
        for name in ["Europe/Berlin", "Asia/Shanghai", "CET"] {
            assert!(parse_zone(name).unwrap_err().is_config_error(), "{}", name);
        }
    }

    #[test]
    fn test_read_preference_default() {
        let pref: ReadPreference = Default::default();
        assert_eq!(pref, ReadPreference::Primary);
    }
}
