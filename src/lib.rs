//! # Quarry
//!
//! Declarative query descriptors and aggregation pipeline assembly for
//! MongoDB.
//!
//! Quarry provides:
//! - An immutable query descriptor covering filter, projection, sort,
//!   pagination, grouping and left outer joins
//! - Pipeline assembly for `count`, `find`, `group` and `left_outer_join`
//! - A shell-style rendering of every pipeline, logged before it runs
//! - A derive-based entity mapper with lenient type coercion
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use quarry::prelude::*;
//!
//! #[derive(Debug, Default, Entity)]
//! #[entity(crate = "quarry::mongodb")]
//! pub struct SimInfo {
//!     #[entity(column = "_id")]
//!     pub iccid: Option<String>,
//!     pub operator: Option<String>,
//!     pub flow_used: Option<i64>,
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), quarry::MongoError> {
//!     let client = MongoClient::builder()
//!         .uri("mongodb://localhost:27017")
//!         .default_database("iot")
//!         .build()
//!         .await?;
//!
//!     let sims = client.default_database()?.collection::<Document>("sim_info");
//!     let query = MongoQuery::builder(&sims)
//!         .filter(Filter::eq("operator", "cmcc"))
//!         .sort(Sort::descending("flow_used"))
//!         .page(1, 20)
//!         .build();
//!
//!     let page: Vec<SimInfo> = client.engine().find_as(&query).await?;
//!     println!("{page:?}");
//!
//!     client.shutdown().await;
//!     Ok(())
//! }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

/// The MongoDB layer: client, engine, descriptors and pipeline assembly.
pub mod mongodb {
    pub use quarry_mongodb::*;
}

// Re-export proc macros
#[cfg(feature = "derive")]
pub use quarry_codegen::Entity;

pub use quarry_mongodb::{
    Filter, MongoClient, MongoConfig, MongoEngine, MongoError, MongoQuery, MongoResult, Pipeline,
    Projection, Sort, Stage,
};

/// Prelude module for convenient imports.
pub mod prelude {
    #[cfg(feature = "derive")]
    pub use crate::Entity;
    pub use quarry_mongodb::prelude::*;
}
