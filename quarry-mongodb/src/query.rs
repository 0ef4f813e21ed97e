//! Query descriptors.
//!
//! A [`MongoQuery`] captures everything the assembler needs: filter,
//! projection, sort, pagination, grouping and join parameters. It is built
//! once through [`MongoQueryBuilder`] and read-only afterwards, so one
//! descriptor can be shared by several operations (and threads) without
//! coordination. [`MongoQuery::to_builder`] derives a modified copy.
//!
//! The descriptor borrows its collection handle; it never owns it.
//!
//! ```rust
//! use quarry_mongodb::filter::Filter;
//! use quarry_mongodb::projection::Sort;
//! use quarry_mongodb::query::MongoQuery;
//!
//! # struct Sims;
//! let sims = Sims;
//! let query = MongoQuery::builder(&sims)
//!     .filter(Filter::eq("sim_status", "active"))
//!     .sort(Sort::descending("create_time"))
//!     .page(3, 20)
//!     .build();
//!
//! assert_eq!(query.skip(), Some(40));
//! assert_eq!(query.limit(), Some(20));
//! assert_eq!(query.right_limit(), 1);
//! ```

use crate::filter::Filter;
use crate::projection::{Projection, Sort};

/// Read-only query descriptor over a borrowed collection handle `C`.
#[derive(Debug)]
pub struct MongoQuery<'a, C = mongodb::Collection<bson::Document>> {
    collection: &'a C,
    filter: Filter,
    projection: Option<Projection>,
    sort: Option<Sort>,
    skip: Option<u64>,
    limit: Option<u64>,
    group_fields: Vec<String>,
    total_name: Option<String>,
    right_collection_name: Option<String>,
    left_join_field: Option<String>,
    right_join_field: Option<String>,
    right_projection: Option<Projection>,
    right_limit: u64,
    right_filter: Filter,
    merge_right_objects_to_left: bool,
}

impl<C> Clone for MongoQuery<'_, C> {
    fn clone(&self) -> Self {
        Self {
            collection: self.collection,
            filter: self.filter.clone(),
            projection: self.projection.clone(),
            sort: self.sort.clone(),
            skip: self.skip,
            limit: self.limit,
            group_fields: self.group_fields.clone(),
            total_name: self.total_name.clone(),
            right_collection_name: self.right_collection_name.clone(),
            left_join_field: self.left_join_field.clone(),
            right_join_field: self.right_join_field.clone(),
            right_projection: self.right_projection.clone(),
            right_limit: self.right_limit,
            right_filter: self.right_filter.clone(),
            merge_right_objects_to_left: self.merge_right_objects_to_left,
        }
    }
}

impl<'a, C> MongoQuery<'a, C> {
    /// Start a descriptor over `collection`.
    pub fn builder(collection: &'a C) -> MongoQueryBuilder<'a, C> {
        MongoQueryBuilder::new(collection)
    }

    /// A builder initialised from this descriptor.
    pub fn to_builder(&self) -> MongoQueryBuilder<'a, C> {
        MongoQueryBuilder {
            query: self.clone(),
        }
    }

    /// The target collection handle.
    pub fn collection(&self) -> &'a C {
        self.collection
    }

    /// Document filter; [`Filter::Empty`] matches everything.
    pub fn filter(&self) -> &Filter {
        &self.filter
    }

    /// Result projection.
    pub fn projection(&self) -> Option<&Projection> {
        self.projection.as_ref()
    }

    /// Result ordering. A sort without keys counts as absent.
    pub fn sort(&self) -> Option<&Sort> {
        self.sort.as_ref().filter(|sort| !sort.is_empty())
    }

    /// Number of results to skip.
    pub fn skip(&self) -> Option<u64> {
        self.skip
    }

    /// Maximum number of results.
    pub fn limit(&self) -> Option<u64> {
        self.limit
    }

    /// Group-by fields, in declaration order.
    pub fn group_fields(&self) -> &[String] {
        &self.group_fields
    }

    /// Whether any group field was declared.
    pub fn is_grouped(&self) -> bool {
        !self.group_fields.is_empty()
    }

    /// Name of the per-group count field. Blank names count as absent.
    pub fn total_name(&self) -> Option<&str> {
        non_blank(&self.total_name)
    }

    /// Collection joined by `left_outer_join`.
    pub fn right_collection_name(&self) -> Option<&str> {
        non_blank(&self.right_collection_name)
    }

    /// Join field of the left (queried) collection.
    pub fn left_join_field(&self) -> Option<&str> {
        non_blank(&self.left_join_field)
    }

    /// Join field of the right collection.
    pub fn right_join_field(&self) -> Option<&str> {
        non_blank(&self.right_join_field)
    }

    /// Projection applied to joined documents.
    pub fn right_projection(&self) -> Option<&Projection> {
        self.right_projection.as_ref()
    }

    /// Maximum joined documents per left document (default 1).
    pub fn right_limit(&self) -> u64 {
        self.right_limit
    }

    /// Filter applied to joined documents; [`Filter::Empty`] by default.
    pub fn right_filter(&self) -> &Filter {
        &self.right_filter
    }

    /// Whether the first joined document is merged into the left one.
    pub fn merge_right_objects_to_left(&self) -> bool {
        self.merge_right_objects_to_left
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

/// Builder for [`MongoQuery`].
#[derive(Debug)]
pub struct MongoQueryBuilder<'a, C = mongodb::Collection<bson::Document>> {
    query: MongoQuery<'a, C>,
}

impl<'a, C> MongoQueryBuilder<'a, C> {
    /// Create a builder with defaults: match everything, no pagination,
    /// no grouping, join limit 1.
    pub fn new(collection: &'a C) -> Self {
        Self {
            query: MongoQuery {
                collection,
                filter: Filter::Empty,
                projection: None,
                sort: None,
                skip: None,
                limit: None,
                group_fields: Vec::new(),
                total_name: None,
                right_collection_name: None,
                left_join_field: None,
                right_join_field: None,
                right_projection: None,
                right_limit: 1,
                right_filter: Filter::Empty,
                merge_right_objects_to_left: false,
            },
        }
    }

    /// Set the filter.
    pub fn filter(mut self, filter: impl Into<Filter>) -> Self {
        self.query.filter = filter.into();
        self
    }

    /// Set the projection.
    pub fn projection(mut self, projection: impl Into<Projection>) -> Self {
        self.query.projection = Some(projection.into());
        self
    }

    /// Set the sort.
    pub fn sort(mut self, sort: impl Into<Sort>) -> Self {
        self.query.sort = Some(sort.into());
        self
    }

    /// Set the number of results to skip.
    pub fn skip(mut self, skip: u64) -> Self {
        self.query.skip = Some(skip);
        self
    }

    /// Set the maximum number of results.
    pub fn limit(mut self, limit: u64) -> Self {
        self.query.limit = Some(limit);
        self
    }

    /// Paginate: `skip = (page - 1) * page_size`, `limit = page_size`.
    /// Pages start at 1; page 0 is treated as page 1.
    pub fn page(mut self, page: u64, page_size: u64) -> Self {
        self.query.skip = Some(page.saturating_sub(1).saturating_mul(page_size));
        self.query.limit = Some(page_size);
        self
    }

    /// Replace the group-by fields.
    pub fn group_fields<S: Into<String>>(mut self, fields: impl IntoIterator<Item = S>) -> Self {
        self.query.group_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Append one group-by field.
    pub fn group_field(mut self, field: impl Into<String>) -> Self {
        self.query.group_fields.push(field.into());
        self
    }

    /// Set the per-group count field name.
    pub fn total_name(mut self, name: impl Into<String>) -> Self {
        self.query.total_name = Some(name.into());
        self
    }

    /// Set the joined collection.
    pub fn right_collection_name(mut self, name: impl Into<String>) -> Self {
        self.query.right_collection_name = Some(name.into());
        self
    }

    /// Set the left join field.
    pub fn left_join_field(mut self, field: impl Into<String>) -> Self {
        self.query.left_join_field = Some(field.into());
        self
    }

    /// Set the right join field.
    pub fn right_join_field(mut self, field: impl Into<String>) -> Self {
        self.query.right_join_field = Some(field.into());
        self
    }

    /// Set the projection for joined documents.
    pub fn right_projection(mut self, projection: impl Into<Projection>) -> Self {
        self.query.right_projection = Some(projection.into());
        self
    }

    /// Set the maximum joined documents per left document.
    pub fn right_limit(mut self, limit: u64) -> Self {
        self.query.right_limit = limit;
        self
    }

    /// Set the filter for joined documents.
    pub fn right_filter(mut self, filter: impl Into<Filter>) -> Self {
        self.query.right_filter = filter.into();
        self
    }

    /// Merge the first joined document into the left one.
    pub fn merge_right_objects_to_left(mut self, merge: bool) -> Self {
        self.query.merge_right_objects_to_left = merge;
        self
    }

    /// Freeze the descriptor.
    pub fn build(self) -> MongoQuery<'a, C> {
        self.query
    }
}
