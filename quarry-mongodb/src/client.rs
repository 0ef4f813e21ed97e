//! MongoDB client wrapper with built-in connection pooling.

use std::sync::Arc;

use bson::{Document, doc};
use chrono::FixedOffset;
use mongodb::{Client, Collection, Database};
use tracing::info;

use crate::coerce::Coercer;
use crate::config::MongoConfig;
use crate::engine::MongoEngine;
use crate::error::{MongoError, MongoResult};

/// A MongoDB client with connection pooling.
///
/// The driver pools connections internally; this wrapper adds the
/// configured default database and the time zone used when coercing
/// stored timestamps into local date-times. Cloning is cheap.
#[derive(Clone)]
pub struct MongoClient {
    client: Client,
    config: Arc<MongoConfig>,
    coercer: Coercer,
}

impl MongoClient {
    /// Create a new client from configuration.
    pub async fn new(config: MongoConfig) -> MongoResult<Self> {
        let options = config.to_client_options().await?;

        let client = Client::with_options(options)
            .map_err(|e| MongoError::connection(format!("failed to create client: {}", e)))?;

        info!(
            uri = %config.uri,
            database = config.default_database.as_deref().unwrap_or(""),
            zone = %config.default_zone,
            "MongoDB client created"
        );

        let coercer = Coercer::new(config.default_zone);
        Ok(Self {
            client,
            config: Arc::new(config),
            coercer,
        })
    }

    /// Create a builder for the client.
    pub fn builder() -> MongoClientBuilder {
        MongoClientBuilder::new()
    }

    /// Get a database by name.
    pub fn database(&self, name: &str) -> Database {
        self.client.database(name)
    }

    /// Get the configured default database.
    pub fn default_database(&self) -> MongoResult<Database> {
        self.config
            .default_database
            .as_deref()
            .map(|name| self.client.database(name))
            .ok_or_else(|| MongoError::config("no default database configured"))
    }

    /// Get a collection of the given database.
    pub fn collection(&self, database: &Database, name: &str) -> Collection<Document> {
        database.collection(name)
    }

    /// Get a collection by database and collection name.
    pub fn collection_in(&self, database: &str, name: &str) -> Collection<Document> {
        self.client.database(database).collection(name)
    }

    /// Coercer carrying the configured zone.
    pub fn coercer(&self) -> Coercer {
        self.coercer
    }

    /// Zone used for local date-times.
    pub fn zone(&self) -> FixedOffset {
        self.coercer.zone()
    }

    /// Query engine sharing this client.
    pub fn engine(&self) -> MongoEngine {
        MongoEngine::new(self.clone())
    }

    /// Get the underlying MongoDB client.
    pub fn inner(&self) -> &Client {
        &self.client
    }

    /// Get the configuration.
    pub fn config(&self) -> &MongoConfig {
        &self.config
    }

    /// Check if the client is healthy by pinging the server.
    pub async fn is_healthy(&self) -> bool {
        self.client
            .database("admin")
            .run_command(doc! { "ping": 1 }, None)
            .await
            .is_ok()
    }

    /// Close pooled connections and end server sessions.
    ///
    /// Waits for outstanding cursors and sessions held by clones of this
    /// client to be dropped.
    pub async fn shutdown(self) {
        info!(uri = %self.config.uri, "MongoDB client shutting down");
        self.client.shutdown().await;
    }
}

/// Builder for MongoClient.
#[derive(Debug, Default)]
pub struct MongoClientBuilder {
    uri: Option<String>,
    default_database: Option<String>,
    app_name: Option<String>,
    max_pool_size: Option<u32>,
    min_pool_size: Option<u32>,
    connect_timeout: Option<std::time::Duration>,
    direct_connection: Option<bool>,
    default_zone: Option<FixedOffset>,
}

impl MongoClientBuilder {
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

    /// Set the maximum pool size.
    pub fn max_pool_size(mut self, size: u32) -> Self {
        self.max_pool_size = Some(size);
        self
    }

    /// Set the minimum pool size.
    pub fn min_pool_size(mut self, size: u32) -> Self {
        self.min_pool_size = Some(size);
        self
    }

    /// Set the connection timeout.
    pub fn connect_timeout(mut self, duration: std::time::Duration) -> Self {
        self.connect_timeout = Some(duration);
        self
    }

    /// Enable direct connection (bypass replica set discovery).
    pub fn direct_connection(mut self, enabled: bool) -> Self {
        self.direct_connection = Some(enabled);
        self
    }

    /// Set the zone for local date-times.
    pub fn default_zone(mut self, zone: FixedOffset) -> Self {
        self.default_zone = Some(zone);
        self
    }

    /// Resolve the configuration without connecting.
    pub fn into_config(self) -> MongoResult<MongoConfig> {
        let mut config_builder = MongoConfig::builder();

        if let Some(uri) = self.uri {
            config_builder = config_builder.uri(uri);
        }

        if let Some(database) = self.default_database {
            config_builder = config_builder.default_database(database);
        }

        if let Some(app_name) = self.app_name {
            config_builder = config_builder.app_name(app_name);
        }

        if let Some(max_pool) = self.max_pool_size {
            config_builder = config_builder.max_pool_size(max_pool);
        }

        if let Some(min_pool) = self.min_pool_size {
            config_builder = config_builder.min_pool_size(min_pool);
        }

        if let Some(timeout) = self.connect_timeout {
            config_builder = config_builder.connect_timeout(timeout);
        }

        if let Some(direct) = self.direct_connection {
            config_builder = config_builder.direct_connection(direct);
        }

        if let Some(zone) = self.default_zone {
            config_builder = config_builder.default_zone(zone);
        }

        config_builder.build()
    }

    /// Build the client.
    pub async fn build(self) -> MongoResult<MongoClient> {
        let config = self.into_config()?;
        MongoClient::new(config).await
    }
}
