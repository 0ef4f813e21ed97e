//! Asynchronous query engine.
//!
//! [`MongoEngine`] runs assembled pipelines and find commands against the
//! collection a [`MongoQuery`] borrows, and maps results through the entity
//! mapper with the client's coercer. Store errors are returned unchanged.

use bson::{Bson, Document};
use futures::TryStreamExt;
use mongodb::options::UpdateOptions;
use mongodb::results::{DeleteResult, InsertManyResult, InsertOneResult, UpdateResult};
use mongodb::{Collection, Cursor};
use tracing::debug;

use crate::client::MongoClient;
use crate::coerce::Coercer;
use crate::entity::{self, Entity};
use crate::error::{MongoError, MongoResult};
use crate::filter::Filter;
use crate::pipeline::{self, CountPlan, TOTAL_GROUPS_FIELD};
use crate::query::MongoQuery;
use crate::render::render;
use crate::stage::Pipeline;
use crate::write::{self, BulkWriteSummary, WriteModel};

/// Query engine bound to a client.
#[derive(Clone)]
pub struct MongoEngine {
    client: MongoClient,
}

impl MongoEngine {
    /// Create a new engine with the given client.
    pub fn new(client: MongoClient) -> Self {
        Self { client }
    }

    /// Get a reference to the client.
    pub fn client(&self) -> &MongoClient {
        &self.client
    }

    fn coercer(&self) -> Coercer {
        self.client.coercer()
    }

    /// Run `pipeline` on `collection` and collect the results.
    pub async fn aggregate(
        &self,
        collection: &Collection<Document>,
        pipeline: &Pipeline,
    ) -> MongoResult<Vec<Document>> {
        debug!(
            namespace = %collection.namespace(),
            pipeline = %render(pipeline),
            "Aggregation pipeline"
        );
        let cursor = collection.aggregate(pipeline.to_documents(), None).await?;
        let documents: Vec<Document> = cursor.try_collect().await?;
        Ok(documents)
    }

    /// Count matching documents, or matching groups when the query groups.
    pub async fn count(&self, query: &MongoQuery<'_>) -> MongoResult<u64> {
        let collection = query.collection();
        match pipeline::count_plan(query)? {
            CountPlan::Documents(filter) => {
                debug!(namespace = %collection.namespace(), filter = %filter, "Counting documents");
                Ok(collection.count_documents(filter, None).await?)
            }
            CountPlan::Groups(pipeline) => {
                debug!(
                    namespace = %collection.namespace(),
                    pipeline = %render(&pipeline),
                    "Aggregation pipeline"
                );
                let mut cursor = collection.aggregate(pipeline.to_documents(), None).await?;
                match cursor.try_next().await? {
                    Some(result) => read_total_groups(&result),
                    None => Ok(0),
                }
            }
        }
    }

    /// Open a cursor over matching documents with projection, sort, skip and
    /// limit applied. The server cursor is released when the cursor drops.
    pub async fn find(&self, query: &MongoQuery<'_>) -> MongoResult<Cursor<Document>> {
        let collection = query.collection();
        let filter = query.filter().to_document();
        debug!(namespace = %collection.namespace(), filter = %filter, "Executing find");
        Ok(collection
            .find(filter, pipeline::find_options(query))
            .await?)
    }

    /// Matching documents mapped to `T`.
    pub async fn find_as<T: Entity>(&self, query: &MongoQuery<'_>) -> MongoResult<Vec<T>> {
        let coercer = self.coercer();
        let mut cursor = self.find(query).await?;
        let mut results = Vec::new();
        while let Some(document) = cursor.try_next().await? {
            results.push(entity::to_entity(&document, &coercer)?);
        }
        Ok(results)
    }

    /// First matching document.
    pub async fn find_first(&self, query: &MongoQuery<'_>) -> MongoResult<Option<Document>> {
        let collection = query.collection();
        let filter = query.filter().to_document();
        debug!(namespace = %collection.namespace(), filter = %filter, "Executing find_first");
        Ok(collection
            .find_one(filter, pipeline::find_one_options(query))
            .await?)
    }

    /// First matching document mapped to `T`.
    pub async fn find_first_as<T: Entity>(&self, query: &MongoQuery<'_>) -> MongoResult<Option<T>> {
        let coercer = self.coercer();
        self.find_first(query)
            .await?
            .map(|document| entity::to_entity(&document, &coercer))
            .transpose()
    }

    /// Group matching documents.
    pub async fn group(&self, query: &MongoQuery<'_>) -> MongoResult<Vec<Document>> {
        let pipeline = pipeline::group_pipeline(query)?;
        self.aggregate(query.collection(), &pipeline).await
    }

    /// Embed (and optionally merge) correlated documents of the right
    /// collection into each matching document.
    pub async fn left_outer_join(&self, query: &MongoQuery<'_>) -> MongoResult<Vec<Document>> {
        let pipeline = pipeline::left_outer_join_pipeline(query)?;
        self.aggregate(query.collection(), &pipeline).await
    }

    /// Insert caller data stamped with creation and update times.
    pub async fn insert_one(
        &self,
        collection: &Collection<Document>,
        data: Document,
    ) -> MongoResult<InsertOneResult> {
        let document = write::stamp_new_document(data, bson::DateTime::now());
        Ok(collection.insert_one(document, None).await?)
    }

    /// Insert a mapped entity stamped with creation and update times.
    pub async fn insert_one_entity<T: Entity>(
        &self,
        collection: &Collection<Document>,
        entity: &T,
    ) -> MongoResult<InsertOneResult> {
        let mapped = entity::to_document(entity, &self.coercer())?;
        let document = write::stamp_entity_document(mapped, bson::DateTime::now());
        Ok(collection.insert_one(document, None).await?)
    }

    /// Insert several caller documents, each stamped.
    pub async fn insert_many(
        &self,
        collection: &Collection<Document>,
        data: impl IntoIterator<Item = Document>,
    ) -> MongoResult<InsertManyResult> {
        let now = bson::DateTime::now();
        let documents: Vec<Document> = data
            .into_iter()
            .map(|document| write::stamp_new_document(document, now))
            .collect();
        Ok(collection.insert_many(documents, None).await?)
    }

    /// Insert several mapped entities, each stamped.
    pub async fn insert_many_entities<T: Entity>(
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
        Ok(collection.insert_many(documents, None).await?)
    }

    /// Upsert every document matching `filter`.
    ///
    /// See [`write::save_or_update_document`] for how `data` and `force`
    /// shape the update.
    pub async fn save_or_update(
        &self,
        collection: &Collection<Document>,
        filter: impl Into<Filter>,
        data: &Document,
        force: bool,
    ) -> MongoResult<UpdateResult> {
        let update = write::save_or_update_document(data, bson::DateTime::now(), force);
        Ok(collection
            .update_many(filter.into().to_document(), update, upsert_options(true))
            .await?)
    }

    /// Upsert a mapped entity into every document matching `filter`.
    pub async fn save_or_update_entity<T: Entity>(
        &self,
        collection: &Collection<Document>,
        filter: impl Into<Filter>,
        entity: &T,
        force: bool,
    ) -> MongoResult<UpdateResult> {
        let data = entity::to_document(entity, &self.coercer())?;
        self.save_or_update(collection, filter, &data, force).await
    }

    /// Delete every document matching `filter`.
    pub async fn delete(
        &self,
        collection: &Collection<Document>,
        filter: impl Into<Filter>,
    ) -> MongoResult<DeleteResult> {
        Ok(collection
            .delete_many(filter.into().to_document(), None)
            .await?)
    }

    /// Apply `models` in order, stopping at the first failure.
    pub async fn bulk_write(
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
                    let result = collection.insert_one(document, None).await?;
                    summary.record_insert(result.inserted_id);
                }
                WriteModel::UpdateOne {
                    filter,
                    update,
                    upsert,
                } => {
                    let result = collection
                        .update_one(filter.to_document(), update, upsert_options(upsert))
                        .await?;
                    summary.record_update(&result);
                }
                WriteModel::UpdateMany {
                    filter,
                    update,
                    upsert,
                } => {
                    let result = collection
                        .update_many(filter.to_document(), update, upsert_options(upsert))
                        .await?;
                    summary.record_update(&result);
                }
                WriteModel::ReplaceOne {
                    filter,
                    replacement,
                    upsert,
                } => {
                    let mut options = mongodb::options::ReplaceOptions::default();
                    options.upsert = Some(upsert);
                    let result = collection
                        .replace_one(filter.to_document(), replacement, options)
                        .await?;
                    summary.record_update(&result);
                }
                WriteModel::DeleteOne { filter } => {
                    let result = collection.delete_one(filter.to_document(), None).await?;
                    summary.record_delete(&result);
                }
                WriteModel::DeleteMany { filter } => {
                    let result = collection.delete_many(filter.to_document(), None).await?;
                    summary.record_delete(&result);
                }
            }
        }
        Ok(summary)
    }
}

pub(crate) fn upsert_options(upsert: bool) -> UpdateOptions {
    let mut options = UpdateOptions::default();
    options.upsert = Some(upsert);
    options
}

/// Read the grouped count from the `$count` result document.
pub(crate) fn read_total_groups(result: &Document) -> MongoResult<u64> {
    match result.get(TOTAL_GROUPS_FIELD) {
        Some(Bson::Int32(n)) => Ok(u64::try_from(*n).unwrap_or(0)),
        Some(Bson::Int64(n)) => Ok(u64::try_from(*n).unwrap_or(0)),
        Some(other) => Err(MongoError::query(format!(
            "'{TOTAL_GROUPS_FIELD}' is not an integer: {other}"
        ))),
        None => Err(MongoError::query(format!(
            "count result is missing '{TOTAL_GROUPS_FIELD}'"
        ))),
    }
}
