//! Integration tests for pipeline assembly.
//!
//! These tests verify the stages each operation sends, without a server:
//! - Count planning with and without grouping
//! - Group default projection and pagination
//! - Left outer join correlation and merge
//! - Rendering of assembled pipelines

use pretty_assertions::assert_eq;
use quarry_mongodb::pipeline::{
    CountPlan, count_plan, find_options, group_pipeline, left_outer_join_pipeline,
};
use quarry_mongodb::render::render;
use quarry_mongodb::{Filter, FilterBuilder, MongoQuery, Projection, Sort, doc};

/// Stand-in for a collection handle; assembly never touches it.
struct Sims;

#[test]
fn test_ungrouped_count_uses_filter_only() {
    let sims = Sims;
    let query = MongoQuery::builder(&sims)
        .filter(Filter::eq("status", "A"))
        .sort(Sort::ascending("iccid"))
        .page(3, 20)
        .build();

    assert_eq!(
        count_plan(&query).unwrap(),
        CountPlan::Documents(doc! { "status": "A" })
    );
}

#[test]
fn test_grouped_count_pipeline() {
    let sims = Sims;
    let query = MongoQuery::builder(&sims)
        .filter(Filter::gte("flow_used", 100))
        .group_fields(["operator", "status"])
        .build();

    let CountPlan::Groups(pipeline) = count_plan(&query).unwrap() else {
        panic!("grouped query must count through a pipeline");
    };
    assert_eq!(
        pipeline.to_documents(),
        vec![
            doc! { "$match": { "flow_used": { "$gte": 100 } } },
            doc! { "$group": { "_id": { "operator": "$operator", "status": "$status" } } },
            doc! { "$count": "__totalGroups" },
        ]
    );
}

#[test]
fn test_group_default_projection_flattens_key() {
    let sims = Sims;
    let query = MongoQuery::builder(&sims)
        .group_field("status")
        .total_name("n")
        .build();

    assert_eq!(
        group_pipeline(&query).unwrap().to_documents(),
        vec![
            doc! { "$match": {} },
            doc! { "$group": { "_id": { "status": "$status" }, "n": { "$sum": 1 } } },
            doc! { "$project": { "_id": 0, "status": "$_id.status", "n": 1 } },
        ]
    );
}

#[test]
fn test_group_with_sort_and_page() {
    let sims = Sims;
    let query = MongoQuery::builder(&sims)
        .filter(
            FilterBuilder::new()
                .eq("operator", "cmcc")
                .exists("iccid", true)
                .build(),
        )
        .group_fields(["area"])
        .sort(Sort::descending("area"))
        .page(2, 5)
        .build();

    let pipeline = group_pipeline(&query).unwrap();
    assert_eq!(
        pipeline.stage_names(),
        vec!["$match", "$group", "$project", "$sort", "$skip", "$limit"]
    );
    assert_eq!(
        pipeline.to_documents()[0],
        doc! { "$match": { "$and": [
            { "operator": "cmcc" },
            { "iccid": { "$exists": true } },
        ] } }
    );
    assert_eq!(pipeline.to_documents()[4], doc! { "$skip": 5 });
    assert_eq!(pipeline.to_documents()[5], doc! { "$limit": 5 });
}

#[test]
fn test_explicit_group_projection_replaces_default() {
    let sims = Sims;
    let query = MongoQuery::builder(&sims)
        .group_field("status")
        .total_name("n")
        .projection(Projection::include(["n"]))
        .build();

    assert_eq!(
        group_pipeline(&query).unwrap().to_documents()[2],
        doc! { "$project": { "n": 1 } }
    );
}

#[test]
fn test_successive_pages_cover_sorted_order() {
    let sims = Sims;
    let page_size = 4;
    let mut covered = Vec::new();
    for page in 1..=3 {
        let query = MongoQuery::builder(&sims)
            .sort(Sort::ascending("iccid"))
            .page(page, page_size)
            .build();
        let options = find_options(&query);
        assert_eq!(options.sort, Some(doc! { "iccid": 1 }));
        let skip = options.skip.unwrap();
        let limit = options.limit.unwrap() as u64;
        covered.extend(skip..skip + limit);
    }
    assert_eq!(covered, (0..12).collect::<Vec<u64>>());
}

#[test]
fn test_left_outer_join_merge_shape() {
    let sims = Sims;
    let query = MongoQuery::builder(&sims)
        .filter(Filter::eq("status", "active"))
        .right_collection_name("device")
        .left_join_field("iccid")
        .right_join_field("sim_iccid")
        .merge_right_objects_to_left(true)
        .build();

    assert_eq!(
        left_outer_join_pipeline(&query).unwrap().to_documents(),
        vec![
            doc! { "$match": { "status": "active" } },
            doc! { "$lookup": {
                "from": "device",
                "let": { "left_join_value": "$iccid" },
                "pipeline": [
                    { "$match": { "$expr": { "$eq": ["$sim_iccid", "$$left_join_value"] } } },
                    { "$limit": 1 },
                ],
                "as": "device__datas",
            } },
            doc! { "$replaceWith": {
                "$mergeObjects": ["$$ROOT", { "$first": "$device__datas" }],
            } },
            doc! { "$project": { "device__datas": 0 } },
        ]
    );
}

#[test]
fn test_left_outer_join_keeps_embedded_array_without_merge() {
    let sims = Sims;
    let query = MongoQuery::builder(&sims)
        .right_collection_name("device")
        .left_join_field("iccid")
        .right_join_field("sim_iccid")
        .right_filter(Filter::eq("online", true))
        .right_projection(Projection::include(["sim_iccid", "model"]))
        .right_limit(3)
        .build();

    let stages = left_outer_join_pipeline(&query).unwrap().to_documents();
    assert_eq!(stages.len(), 2);
    assert_eq!(
        stages[1],
        doc! { "$lookup": {
            "from": "device",
            "let": { "left_join_value": "$iccid" },
            "pipeline": [
                { "$match": { "$and": [
                    { "online": true },
                    { "$expr": { "$eq": ["$sim_iccid", "$$left_join_value"] } },
                ] } },
                { "$project": { "sim_iccid": 1, "model": 1 } },
                { "$limit": 3 },
            ],
            "as": "device__datas",
        } }
    );
}

#[test]
fn test_left_outer_join_requires_join_fields() {
    let sims = Sims;
    let query = MongoQuery::builder(&sims)
        .right_collection_name("device")
        .left_join_field("iccid")
        .build();

    let err = left_outer_join_pipeline(&query).unwrap_err();
    assert!(err.is_config_error());
}

#[test]
fn test_rendered_join_is_console_ready() {
    let sims = Sims;
    let query = MongoQuery::builder(&sims)
        .right_collection_name("device")
        .left_join_field("iccid")
        .right_join_field("sim_iccid")
        .limit(10)
        .build();

    let rendered = render(&left_outer_join_pipeline(&query).unwrap());
    assert!(rendered.starts_with(r#"[{"$match": {}},{"$lookup": {"from": "device""#));
    assert!(rendered.ends_with(r#"{"$limit": 10}]"#));
    assert!(rendered.contains(r#""$$left_join_value""#));
}
