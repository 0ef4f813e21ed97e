//! Synchronous client and engine.
//!
//! Mirrors [`MongoClient`](crate::MongoClient) and
//! [`MongoEngine`](crate::MongoEngine) on the driver's `sync` API, for
//! callers without an async runtime. Pipelines and options are assembled by
//! the same functions, so both flavors send identical commands.

use std::sync::Arc;

use bson::{Document, doc};
use mongodb::results::{DeleteResult, InsertManyResult, InsertOneResult, UpdateResult};
use mongodb::sync::{Client, Collection, Cursor, Database};
use tracing::{debug, info};

use crate::coerce::Coercer;
use crate::config::MongoConfig;
use crate::engine::{read_total_groups, upsert_options};
use crate::entity::{self, Entity};
use crate::error::{MongoError, MongoResult};
use crate::filter::Filter;
use crate::pipeline::{self, CountPlan};
use crate::query::MongoQuery;
use crate::render::render;
use crate::stage::Pipeline;
use crate::write::{self, BulkWriteSummary, WriteModel};

/// Query over a blocking collection.
pub type BlockingQuery<'a> = MongoQuery<'a, Collection<Document>>;

/// Blocking client.
#[derive(Clone)]
pub struct BlockingClient {
    client: Client,
    config: Arc<MongoConfig>,
    coercer: Coercer,
}

impl BlockingClient {
    /// Create a new client from configuration.
    pub fn new(config: MongoConfig) -> MongoResult<Self> {
        let options = config.to_client_options_blocking()?;
        let client = Client::with_options(options)
            .map_err(|e| MongoError::connection(format!("failed to create client: {}", e)))?;

        info!(
            uri = %config.uri,
            database = config.default_database.as_deref().unwrap_or(""),
            zone = %config.default_zone,
            "MongoDB blocking client created"
        );

        let coercer = Coercer::new(config.default_zone);
        Ok(Self {
            client,
            config: Arc::new(config),
            coercer,
        })
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

    /// Query engine sharing this client.
    pub fn engine(&self) -> BlockingEngine {
        BlockingEngine {
            client: self.clone(),
        }
    }

    /// Get the underlying driver client.
    pub fn inner(&self) -> &Client {
        &self.client
    }

    /// Get the configuration.
    pub fn config(&self) -> &MongoConfig {
        &self.config
    }

    /// Ping the server.
    pub fn is_healthy(&self) -> bool {
        self.client
            .database("admin")
            .run_command(doc! { "ping": 1 }, None)
            .is_ok()
    }

    /// Close the connection pools and end server sessions. Blocks until
    /// every outstanding cursor and session has been released.
    pub fn shutdown(self) {
        info!(uri = %self.config.uri, "MongoDB blocking client shutting down");
        self.client.shutdown();
    }
}

/// Blocking query engine.
#[derive(Clone)]
pub struct BlockingEngine {
    client: BlockingClient,
}

impl BlockingEngine {
    /// Get a reference to the client.
    pub fn client(&self) -> &BlockingClient {
        &self.client
    }

    fn coercer(&self) -> Coercer {
        self.client.coercer()
    }

    /// Run `pipeline` on `collection` and collect the results.
    pub fn aggregate(
        &self,
        collection: &Collection<Document>,
        pipeline: &Pipeline,
    ) -> MongoResult<Vec<Document>> {
        debug!(
            namespace = %collection.namespace(),
            pipeline = %render(pipeline),
            "Aggregation pipeline"
        );
        let cursor = collection.aggregate(pipeline.to_documents(), None)?;
        let documents = cursor.collect::<Result<Vec<_>, _>>()?;
        Ok(documents)
    }

    /// Count matching documents, or matching groups when the query groups.
    pub fn count(&self, query: &BlockingQuery<'_>) -> MongoResult<u64> {
        let collection = query.collection();
        match pipeline::count_plan(query)? {
            CountPlan::Documents(filter) => {
                debug!(namespace = %collection.namespace(), filter = %filter, "Counting documents");
                Ok(collection.count_documents(filter, None)?)
            }
            CountPlan::Groups(pipeline) => {
                debug!(
                    namespace = %collection.namespace(),
                    pipeline = %render(&pipeline),
                    "Aggregation pipeline"
                );
                let mut cursor = collection.aggregate(pipeline.to_documents(), None)?;
                match cursor.next().transpose()? {
                    Some(result) => read_total_groups(&result),
                    None => Ok(0),
                }
            }
        }
    }

    /// Cursor over matching documents. The server cursor is released when
    /// the iterator drops.
    pub fn find(&self, query: &BlockingQuery<'_>) -> MongoResult<Cursor<Document>> {
        let collection = query.collection();
        let filter = query.filter().to_document();
        debug!(namespace = %collection.namespace(), filter = %filter, "Executing find");
        Ok(collection.find(filter, pipeline::find_options(query))?)
    }

    /// Matching documents mapped to `T`.
    pub fn find_as<T: Entity>(&self, query: &BlockingQuery<'_>) -> MongoResult<Vec<T>> {
        let coercer = self.coercer();
        self.find(query)?
            .map(|document| entity::to_entity(&document?, &coercer))
            .collect()
    }

    /// First matching document.
    pub fn find_first(&self, query: &BlockingQuery<'_>) -> MongoResult<Option<Document>> {
        let collection = query.collection();
        let filter = query.filter().to_document();
        debug!(namespace = %collection.namespace(), filter = %filter, "Executing find_first");
        Ok(collection.find_one(filter, pipeline::find_one_options(query))?)
    }

    /// First matching document mapped to `T`.
    pub fn find_first_as<T: Entity>(&self, query: &BlockingQuery<'_>) -> MongoResult<Option<T>> {
        let coercer = self.coercer();
        self.find_first(query)?
            .map(|document| entity::to_entity(&document, &coercer))
            .transpose()
    }

    /// Group matching documents.
    pub fn group(&self, query: &BlockingQuery<'_>) -> MongoResult<Vec<Document>> {
        let pipeline = pipeline::group_pipeline(query)?;
        self.aggregate(query.collection(), &pipeline)
    }

    /// Embed (and optionally merge) correlated right-side documents.
    pub fn left_outer_join(&self, query: &BlockingQuery<'_>) -> MongoResult<Vec<Document>> {
        let pipeline = pipeline::left_outer_join_pipeline(query)?;
        self.aggregate(query.collection(), &pipeline)
    }

    /// Insert caller data stamped with creation and update times.
    pub fn insert_one(
        &self,
        collection: &Collection<Document>,
        data: Document,
    ) -> MongoResult<InsertOneResult> {
        let document = write::stamp_new_document(data, bson::DateTime::now());
        Ok(collection.insert_one(document, None)?)
    }

    /// Insert a mapped entity stamped with creation and update times.
    pub fn insert_one_entity<T: Entity>(
        &self,
        collection: &Collection<Document>,
        entity: &T,
    ) -> MongoResult<InsertOneResult> {
        let mapped = entity::to_document(entity, &self.coercer())?;
        let document = write::stamp_entity_document(mapped, bson::DateTime::now());
        Ok(collection.insert_one(document, None)?)
    }

    /// Insert several caller documents, each stamped.
    pub fn insert_many(
        &self,
        collection: &Collection<Document>,
        data: impl IntoIterator<Item = Document>,
    ) -> MongoResult<InsertManyResult> {
        let now = bson::DateTime::now();
        let documents: Vec<Document> = data
            .into_iter()
            .map(|document| write::stamp_new_document(document, now))
            .collect();
        Ok(collection.insert_many(documents, None)?)
    }

    /// Insert several mapped entities, each stamped.
    pub fn insert_many_entities<T: Entity>(
        &self,
        collection: &Collection<Document>,
        entities: &[T],
    ) -> MongoResult<InsertManyResult> {
        let coercer = self.coercer();
        let now = bson::DateTime::now();
        let documents = entities
            .iter()
            .map(|entity| {
                entity::to_document(entity, &coercer)
                    .map(|mapped| write::stamp_entity_document(mapped, now))
            })
            .collect::<MongoResult<Vec<_>>>()?;
        Ok(collection.insert_many(documents, None)?)
    }

    /// Upsert every document matching `filter`.
    pub fn save_or_update(
        &self,
        collection: &Collection<Document>,
        filter: impl Into<Filter>,
        data: &Document,
        force: bool,
    ) -> MongoResult<UpdateResult> {
        let update = write::save_or_update_document(data, bson::DateTime::now(), force);
        Ok(collection.update_many(filter.into().to_document(), update, upsert_options(true))?)
    }

    /// Upsert a mapped entity into every document matching `filter`.
    pub fn save_or_update_entity<T: Entity>(
        &self,
        collection: &Collection<Document>,
        filter: impl Into<Filter>,
        entity: &T,
        force: bool,
    ) -> MongoResult<UpdateResult> {
        let data = entity::to_document(entity, &self.coercer())?;
        self.save_or_update(collection, filter, &data, force)
    }

    /// Delete every document matching `filter`.
    pub fn delete(
        &self,
        collection: &Collection<Document>,
        filter: impl Into<Filter>,
    ) -> MongoResult<DeleteResult> {
        Ok(collection.delete_many(filter.into().to_document(), None)?)
    }

    /// Apply `models` in order, stopping at the first failure.
    pub fn bulk_write(
        &self,
        collection: &Collection<Document>,
        models: Vec<WriteModel>,
    ) -> MongoResult<BulkWriteSummary> {
        debug!(
            namespace = %collection.namespace(),
            models = models.len(),
            "Executing bulk write"
        );
        let mut summary = BulkWriteSummary::default();
        for model in models {
            debug!(operation = model.name(), "Executing write model");
            match model {
                WriteModel::InsertOne { document } => {
                    let result = collection.insert_one(document, None)?;
                    summary.record_insert(result.inserted_id);
                }
                WriteModel::UpdateOne {
                    filter,
                    update,
                    upsert,
                } => {
                    let result =
                        collection.update_one(filter.to_document(), update, upsert_options(upsert))?;
                    summary.record_update(&result);
                }
                WriteModel::UpdateMany {
                    filter,
                    update,
                    upsert,
                } => {
                    let result =
                        collection.update_many(filter.to_document(), update, upsert_options(upsert))?;
                    summary.record_update(&result);
                }
                WriteModel::ReplaceOne {
                    filter,
                    replacement,
                    upsert,
                } => {
                    let mut options = mongodb::options::ReplaceOptions::default();
                    options.upsert = Some(upsert);
                    let result = collection.replace_one(filter.to_document(), replacement, options)?;
                    summary.record_update(&result);
                }
                WriteModel::DeleteOne { filter } => {
                    let result = collection.delete_one(filter.to_document(), None)?;
                    summary.record_delete(&result);
                }
                WriteModel::DeleteMany { filter } => {
                    let result = collection.delete_many(filter.to_document(), None)?;
                    summary.record_delete(&result);
                }
            }
        }
        Ok(summary)
    }
}
