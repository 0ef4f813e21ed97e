//! Write-side document preparation.
//!
//! Inserts and upserts stamp two timestamps: [`CREATE_TIME_FIELD`] is only
//! written when a document is created, [`UPDATE_TIME_FIELD`] on every write.
//! The functions here build the documents; the engines send them.

use bson::{Bson, Document, doc};
use mongodb::results::{DeleteResult, UpdateResult};

use crate::filter::Filter;

/// Creation timestamp field.
pub const CREATE_TIME_FIELD: &str = "create_time";

/// Last-update timestamp field.
pub const UPDATE_TIME_FIELD: &str = "update_time";

fn is_timestamp_field(key: &str) -> bool {
    key == CREATE_TIME_FIELD || key == UPDATE_TIME_FIELD
}

/// Document to insert from caller data: the timestamps first, then every
/// caller key. A caller-supplied timestamp replaces the stamp.
pub fn stamp_new_document(data: Document, now: bson::DateTime) -> Document {
    let mut document = doc! {
        CREATE_TIME_FIELD: now,
        UPDATE_TIME_FIELD: now,
    };
    for (key, value) in data {
        document.insert(key, value);
    }
    document
}

/// Document to insert from a mapped entity: the entity's columns, then the
/// timestamps, which always win.
pub fn stamp_entity_document(mut document: Document, now: bson::DateTime) -> Document {
    document.insert(CREATE_TIME_FIELD, now);
    document.insert(UPDATE_TIME_FIELD, now);
    document
}

/// Update document for an upsert.
///
/// `create_time` goes to `$setOnInsert`, `update_time` and the data to
/// `$set`. Caller values for the two timestamp keys are ignored.
///
/// Unless `force` is set, `null` values are dropped, strings are trimmed
/// and blank strings are dropped, so a partial record never clears stored
/// values. With `force` every value is written as given, `null` included.
pub fn save_or_update_document(data: &Document, now: bson::DateTime, force: bool) -> Document {
    let mut set = doc! { UPDATE_TIME_FIELD: now };
    for (key, value) in data {
        if is_timestamp_field(key) {
            continue;
        }
        if force {
            set.insert(key.as_str(), value.clone());
            continue;
        }
        match value {
            Bson::Null => {}
            Bson::String(text) => {
                let trimmed = text.trim();
                if !trimmed.is_empty() {
                    set.insert(key.as_str(), trimmed);
                }
            }
            other => {
                set.insert(key.as_str(), other.clone());
            }
        }
    }

    doc! {
        "$setOnInsert": { CREATE_TIME_FIELD: now },
        "$set": set,
    }
}

/// One operation of a bulk write.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteModel {
    /// Insert a document.
    InsertOne {
        /// Document to insert.
        document: Document,
    },
    /// Update the first matching document.
    UpdateOne {
        /// Selects the document.
        filter: Filter,
        /// Update operators.
        update: Document,
        /// Insert when nothing matches.
        upsert: bool,
    },
    /// Update every matching document.
    UpdateMany {
        /// Selects the documents.
        filter: Filter,
        /// Update operators.
        update: Document,
        /// Insert when nothing matches.
        upsert: bool,
    },
    /// Replace the first matching document.
    ReplaceOne {
        /// Selects the document.
        filter: Filter,
        /// Replacement document.
        replacement: Document,
        /// Insert when nothing matches.
        upsert: bool,
    },
    /// Delete the first matching document.
    DeleteOne {
        /// Selects the document.
        filter: Filter,
    },
    /// Delete every matching document.
    DeleteMany {
        /// Selects the documents.
        filter: Filter,
    },
}

impl WriteModel {
    /// Short operation name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::InsertOne { .. } => "insertOne",
            Self::UpdateOne { .. } => "updateOne",
            Self::UpdateMany { .. } => "updateMany",
            Self::ReplaceOne { .. } => "replaceOne",
            Self::DeleteOne { .. } => "deleteOne",
            Self::DeleteMany { .. } => "deleteMany",
        }
    }
}

/// Aggregated outcome of a bulk write.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BulkWriteSummary {
    /// Documents inserted.
    pub inserted_count: u64,
    /// Documents matched by updates and replacements.
    pub matched_count: u64,
    /// Documents modified by updates and replacements.
    pub modified_count: u64,
    /// Documents deleted.
    pub deleted_count: u64,
    /// Documents inserted by upserts.
    pub upserted_count: u64,
    /// Ids of inserted documents, in model order.
    pub inserted_ids: Vec<Bson>,
    /// Ids of upserted documents, in model order.
    pub upserted_ids: Vec<Bson>,
}

impl BulkWriteSummary {
    /// Record an insert.
    pub fn record_insert(&mut self, inserted_id: Bson) {
        self.inserted_count += 1;
        self.inserted_ids.push(inserted_id);
    }

    /// Record an update or replacement.
    pub fn record_update(&mut self, result: &UpdateResult) {
        self.matched_count += result.matched_count;
        self.modified_count += result.modified_count;
        if let Some(id) = &result.upserted_id {
            self.upserted_count += 1;
            self.upserted_ids.push(id.clone());
        }
    }

    /// Record a delete.
    pub fn record_delete(&mut self, result: &DeleteResult) {
        self.deleted_count += result.deleted_count;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn now() -> bson::DateTime {
        bson::DateTime::from_millis(1_700_000_000_000)
    }

    #[test]
    fn test_stamp_new_document_caller_wins() {
        let earlier = bson::DateTime::from_millis(0);
        let document = stamp_new_document(doc! { "name": "a", CREATE_TIME_FIELD: earlier }, now());
        assert_eq!(
            document,
            doc! { "create_time": earlier, "update_time": now(), "name": "a" }
        );
    }

    #[test]
    fn test_stamp_entity_document_stamp_wins() {
        let earlier = bson::DateTime::from_millis(0);
        let document = stamp_entity_document(doc! { "name": "a", UPDATE_TIME_FIELD: earlier }, now());
        assert_eq!(
            document,
            doc! { "name": "a", "update_time": now(), "create_time": now() }
        );
    }

    #[test]
    fn test_save_or_update_drops_null_and_blank() {
        let data = doc! {
            "name": "  gw  ",
            "note": "   ",
            "area": null,
            "port": 22,
            CREATE_TIME_FIELD: "ignored",
            UPDATE_TIME_FIELD: "ignored",
        };
        assert_eq!(
            save_or_update_document(&data, now(), false),
            doc! {
                "$setOnInsert": { "create_time": now() },
                "$set": { "update_time": now(), "name": "gw", "port": 22 },
            }
        );
    }

    #[test]
    fn test_save_or_update_force_writes_everything() {
        let data = doc! { "name": "  gw  ", "note": "", "area": null, "update_time": 1 };
        assert_eq!(
            save_or_update_document(&data, now(), true),
            doc! {
                "$setOnInsert": { "create_time": now() },
                "$set": {
                    "update_time": now(),
                    "name": "  gw  ",
                    "note": "",
                    "area": null,
                },
            }
        );
    }

    #[test]
    fn test_bulk_summary_accumulates() {
        let mut summary = BulkWriteSummary::default();
        summary.record_insert(Bson::Int32(1));
        summary.record_insert(Bson::Int32(2));
        assert_eq!(summary.inserted_count, 2);
        assert_eq!(summary.inserted_ids, vec![Bson::Int32(1), Bson::Int32(2)]);
        assert_eq!(summary.deleted_count, 0);
    }

    #[test]
    fn test_model_names() {
        let models = vec![
            WriteModel::InsertOne {
                document: doc! { "a": 1 },
            },
            WriteModel::UpdateOne {
                filter: Filter::eq("a", 1),
                update: doc! { "$set": { "b": 2 } },
                upsert: false,
            },
            WriteModel::UpdateMany {
                filter: Filter::Empty,
                update: doc! { "$set": { "b": 2 } },
                upsert: true,
            },
            WriteModel::ReplaceOne {
                filter: Filter::eq("a", 1),
                replacement: doc! { "a": 2 },
                upsert: false,
            },
            WriteModel::DeleteOne {
                filter: Filter::eq("a", 2),
            },
            WriteModel::DeleteMany {
                filter: Filter::Empty,
            },
        ];
        assert_eq!(
            models.iter().map(WriteModel::name).collect::<Vec<_>>(),
            vec![
                "insertOne",
                "updateOne",
                "updateMany",
                "replaceOne",
                "deleteOne",
                "deleteMany"
            ]
        );
    }
}
