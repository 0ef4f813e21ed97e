//! # quarry-mongodb
//!
//! Query descriptors, aggregation pipeline assembly and entity mapping on
//! top of the official MongoDB driver.
//!
//! This crate provides:
//! - A [`MongoQuery`] descriptor bundling filter, projection, sort,
//!   pagination, grouping and join parameters
//! - Pipeline assembly for counting, grouping and left outer joins, with a
//!   shell-style [`render`](render::render) of every pipeline it runs
//! - An [`Entity`](entity::Entity) mapper between documents and plain
//!   structs, with lenient per-field type coercion
//! - Timestamped inserts and upserts
//!
//! ## Example
//!
//! ```rust,ignore
//! use quarry_mongodb::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = MongoClient::builder()
//!         .uri("mongodb://localhost:27017")
//!         .default_database("iot")
//!         .build()
//!         .await?;
//!
//!     let sims = client.default_database()?.collection::<Document>("sim_info");
//!     let query = MongoQuery::builder(&sims)
//!         .filter(Filter::eq("status", "active"))
//!         .group_field("operator")
//!         .total_name("count")
//!         .build();
//!
//!     let engine = client.engine();
//!     let groups = engine.group(&query).await?;
//!     let total_groups = engine.count(&query).await?;
//!     println!("{total_groups} operators: {groups:?}");
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Entity Mapping
//!
//! ```rust,ignore
//! use quarry_codegen::Entity;
//!
//! #[derive(Debug, Default, Entity)]
//! #[entity(rename_all = "snake_case")]
//! struct SimInfo {
//!     iccid: Option<String>,
//!     #[entity(column = "flow_used", desc = "used traffic in KB")]
//!     used: Option<i64>,
//!     activated_at: Option<chrono::NaiveDateTime>,
//! }
//! ```

#[cfg(feature = "blocking")]
pub mod blocking;
pub mod client;
pub mod coerce;
pub mod config;
pub mod engine;
pub mod entity;
pub mod error;
pub mod filter;
pub mod logging;
pub mod pipeline;
pub mod projection;
pub mod query;
pub mod render;
pub mod stage;
pub mod write;

pub use bson::oid::ObjectId;
pub use bson::{Bson, Document, doc};
pub use client::{MongoClient, MongoClientBuilder};
pub use coerce::{Coerce, Coercer};
pub use config::{MongoConfig, MongoConfigBuilder, ReadPreference};
pub use engine::MongoEngine;
pub use entity::{Column, Entity};
pub use error::{MongoError, MongoResult};
pub use filter::{CompareOp, Filter, FilterBuilder};
pub use projection::{Projection, Sort, SortDirection};
pub use query::{MongoQuery, MongoQueryBuilder};
pub use stage::{Accumulator, Pipeline, Stage};
pub use write::{BulkWriteSummary, WriteModel};

/// Prelude for convenient imports.
pub mod prelude {
    #[cfg(feature = "blocking")]
    pub use crate::blocking::{BlockingClient, BlockingEngine, BlockingQuery};
    pub use crate::client::{MongoClient, MongoClientBuilder};
    pub use crate::coerce::Coercer;
    pub use crate::config::{MongoConfig, MongoConfigBuilder};
    pub use crate::engine::MongoEngine;
    pub use crate::entity::Entity;
    pub use crate::error::{MongoError, MongoResult};
    pub use crate::filter::{Filter, FilterBuilder};
    pub use crate::projection::{Projection, Sort};
    pub use crate::query::{MongoQuery, MongoQueryBuilder};
    pub use crate::stage::{Accumulator, Pipeline, Stage};
    pub use crate::write::WriteModel;
    pub use bson::oid::ObjectId;
    pub use bson::{Bson, Document, doc};
}
