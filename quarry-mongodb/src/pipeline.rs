//! Pipeline assembly.
//!
//! Pure functions from a [`MongoQuery`] to the stages (or find options) each
//! operation sends to the store. Every call builds a fresh pipeline; the
//! descriptor is only read.
//!
//! Stage order is fixed per operation:
//!
//! | operation           | stages                                                                  |
//! |---------------------|-------------------------------------------------------------------------|
//! | grouped count       | match, group, count                                                     |
//! | group               | match, group, project, sort?, skip?, limit?                             |
//! | left outer join     | match, sort?, lookup, (replaceWith, project)?, project?, skip?, limit?  |

use bson::{Bson, Document, doc};
use mongodb::options::{FindOneOptions, FindOptions};

use crate::error::{MongoError, MongoResult};
use crate::filter::Filter;
use crate::projection::Projection;
use crate::query::MongoQuery;
use crate::stage::{Accumulator, Pipeline, Stage};

/// Field the grouped count is written to.
pub const TOTAL_GROUPS_FIELD: &str = "__totalGroups";

/// Suffix of the array field holding joined documents.
pub const JOINED_FIELD_SUFFIX: &str = "__datas";

/// Lookup variable bound to the left document's join value.
pub const LEFT_JOIN_VALUE_VAR: &str = "left_join_value";

/// Array field the joined documents of `right_collection` are stored in.
pub fn joined_field(right_collection: &str) -> String {
    format!("{right_collection}{JOINED_FIELD_SUFFIX}")
}

/// How a count is answered.
#[derive(Debug, Clone, PartialEq)]
pub enum CountPlan {
    /// Ungrouped: count documents matching this filter directly.
    Documents(Document),
    /// Grouped: run this pipeline and read [`TOTAL_GROUPS_FIELD`].
    Groups(Pipeline),
}

/// Plan `count`.
pub fn count_plan<C>(query: &MongoQuery<'_, C>) -> MongoResult<CountPlan> {
    if !query.is_grouped() {
        return Ok(CountPlan::Documents(query.filter().to_document()));
    }
    check_group_fields(query)?;

    Ok(CountPlan::Groups(
        Pipeline::new()
            .with(Stage::matching(query.filter().clone()))
            .with(Stage::group_by(query.group_fields(), []))
            .with(Stage::count(TOTAL_GROUPS_FIELD)),
    ))
}

/// Driver options for `find`: projection, sort, skip, limit.
pub fn find_options<C>(query: &MongoQuery<'_, C>) -> FindOptions {
    let mut options = FindOptions::default();
    options.projection = query.projection().map(Projection::to_document);
    options.sort = query.sort().map(|sort| sort.to_document());
    options.skip = query.skip();
    options.limit = query.limit().map(|limit| i64::try_from(limit).unwrap_or(i64::MAX));
    options
}

/// Driver options for `find_first`: projection and sort.
pub fn find_one_options<C>(query: &MongoQuery<'_, C>) -> FindOneOptions {
    let mut options = FindOneOptions::default();
    options.projection = query.projection().map(Projection::to_document);
    options.sort = query.sort().map(|sort| sort.to_document());
    options
}

/// Projection unwrapping the group key: `_id` dropped, each group field
/// re-exposed from `$_id.<field>` in order, then the total when named.
pub fn default_group_projection(group_fields: &[String], total_name: Option<&str>) -> Projection {
    let mut parts = Vec::with_capacity(group_fields.len() + 2);
    parts.push(Projection::ExcludeId);
    for field in group_fields {
        parts.push(Projection::computed(field.as_str(), format!("$_id.{field}")));
    }
    if let Some(total) = total_name {
        parts.push(Projection::include([total]));
    }
    Projection::Fields(parts)
}

/// Assemble `group`.
pub fn group_pipeline<C>(query: &MongoQuery<'_, C>) -> MongoResult<Pipeline> {
    check_group_fields(query)?;

    let accumulators: Vec<(String, Accumulator)> = query
        .total_name()
        .map(|total| (total.to_string(), Accumulator::count()))
        .into_iter()
        .collect();

    let projection = match query.projection() {
        Some(projection) => projection.clone(),
        None => default_group_projection(query.group_fields(), query.total_name()),
    };

    let mut pipeline = Pipeline::new()
        .with(Stage::matching(query.filter().clone()))
        .with(Stage::group_by(query.group_fields(), accumulators))
        .with(Stage::project(projection));

    if let Some(sort) = query.sort() {
        pipeline.push(Stage::sort(sort.clone()));
    }
    push_pagination(&mut pipeline, query);

    Ok(pipeline)
}

/// Assemble `left_outer_join`.
pub fn left_outer_join_pipeline<C>(query: &MongoQuery<'_, C>) -> MongoResult<Pipeline> {
    let right_collection = query
        .right_collection_name()
        .ok_or_else(|| MongoError::config("left outer join requires a right collection name"))?;
    let left_join_field = query
        .left_join_field()
        .ok_or_else(|| MongoError::config("left outer join requires a left join field"))?;
    let right_join_field = query
        .right_join_field()
        .ok_or_else(|| MongoError::config("left outer join requires a right join field"))?;
    if query.right_limit() == 0 {
        return Err(MongoError::config("right limit must be at least 1"));
    }

    let joined = joined_field(right_collection);

    let mut pipeline = Pipeline::new().with(Stage::matching(query.filter().clone()));
    if let Some(sort) = query.sort() {
        pipeline.push(Stage::sort(sort.clone()));
    }

    let correlation = Filter::expr_eq(
        format!("${right_join_field}"),
        format!("$${LEFT_JOIN_VALUE_VAR}"),
    );
    let right_match = if query.right_filter().is_empty() {
        correlation
    } else {
        Filter::and([query.right_filter().clone(), correlation])
    };

    let mut right_pipeline = vec![Stage::matching(right_match)];
    if let Some(projection) = query.right_projection() {
        right_pipeline.push(Stage::project(projection.clone()));
    }
    right_pipeline.push(Stage::limit(query.right_limit()));

    pipeline.push(Stage::lookup(
        right_collection,
        doc! { LEFT_JOIN_VALUE_VAR: format!("${left_join_field}") },
        right_pipeline,
        joined.as_str(),
    ));

    if query.merge_right_objects_to_left() {
        let first_joined = Bson::Document(doc! { "$first": format!("${joined}") });
        pipeline.push(Stage::replace_with(doc! {
            "$mergeObjects": ["$$ROOT", first_joined],
        }));
        pipeline.push(Stage::project(Projection::exclude([joined.as_str()])));
    }

    if let Some(projection) = query.projection() {
        pipeline.push(Stage::project(projection.clone()));
    }
    push_pagination(&mut pipeline, query);

    Ok(pipeline)
}

fn push_pagination<C>(pipeline: &mut Pipeline, query: &MongoQuery<'_, C>) {
    if let Some(skip) = query.skip() {
        pipeline.push(Stage::skip(skip));
    }
    if let Some(limit) = query.limit() {
        pipeline.push(Stage::limit(limit));
    }
}

fn check_group_fields<C>(query: &MongoQuery<'_, C>) -> MongoResult<()> {
    if query.group_fields().iter().any(|field| field.trim().is_empty()) {
        return Err(MongoError::config("group fields cannot be blank"));
    }
    Ok(())
}
