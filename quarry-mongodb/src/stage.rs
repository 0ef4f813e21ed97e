//! Typed aggregation pipeline stages.
//!
//! A [`Pipeline`] is an ordered list of [`Stage`]s. Each stage lowers to one
//! stage document; nothing is executed here.

use bson::{Bson, Document, doc};

use crate::filter::Filter;
use crate::projection::{Projection, Sort};

/// Group accumulator.
#[derive(Debug, Clone, PartialEq)]
pub enum Accumulator {
    /// `$sum`
    Sum(Bson),
    /// `$avg`
    Avg(Bson),
    /// `$min`
    Min(Bson),
    /// `$max`
    Max(Bson),
    /// `$first`
    First(Bson),
    /// `$last`
    Last(Bson),
    /// `$push` (collect into array)
    Push(Bson),
    /// `$addToSet` (collect unique values)
    AddToSet(Bson),
}

impl Accumulator {
    /// Count of grouped documents, `{ $sum: 1 }`.
    pub fn count() -> Self {
        Self::Sum(Bson::Int32(1))
    }

    /// The accumulator operator name.
    pub fn operator(&self) -> &'static str {
        match self {
            Self::Sum(_) => "$sum",
            Self::Avg(_) => "$avg",
            Self::Min(_) => "$min",
            Self::Max(_) => "$max",
            Self::First(_) => "$first",
            Self::Last(_) => "$last",
            Self::Push(_) => "$push",
            Self::AddToSet(_) => "$addToSet",
        }
    }

    fn expression(&self) -> &Bson {
        match self {
            Self::Sum(e)
            | Self::Avg(e)
            | Self::Min(e)
            | Self::Max(e)
            | Self::First(e)
            | Self::Last(e)
            | Self::Push(e)
            | Self::AddToSet(e) => e,
        }
    }

    /// Lower to `{ <operator>: <expression> }`.
    pub fn to_document(&self) -> Document {
        doc! { self.operator(): self.expression().clone() }
    }
}

/// One aggregation stage.
#[derive(Debug, Clone, PartialEq)]
pub enum Stage {
    /// `$match`
    Match(Filter),
    /// `$group` with a key expression and named accumulators.
    Group {
        /// Group key (`_id`).
        id: Bson,
        /// Output field name and accumulator, in order.
        accumulators: Vec<(String, Accumulator)>,
    },
    /// `$project`
    Project(Projection),
    /// `$sort`
    Sort(Sort),
    /// `$skip`
    Skip(u64),
    /// `$limit`
    Limit(u64),
    /// `$count` into the named field.
    Count(String),
    /// `$lookup` with a correlated sub-pipeline.
    Lookup {
        /// Joined collection.
        from: String,
        /// Variables bound from the outer document.
        let_vars: Document,
        /// Sub-pipeline run against `from`.
        pipeline: Vec<Stage>,
        /// Output array field.
        as_field: String,
    },
    /// `$replaceWith`
    ReplaceWith(Bson),
    /// A stage document passed through untouched.
    Raw(Document),
}

impl Stage {
    /// `$match` stage.
    pub fn matching(filter: Filter) -> Self {
        Self::Match(filter)
    }

    /// `$group` keyed by `{ field: "$field", ... }` in the given order.
    pub fn group_by<S: AsRef<str>>(
        fields: &[S],
        accumulators: impl IntoIterator<Item = (String, Accumulator)>,
    ) -> Self {
        Self::group_with_aliases(
            fields
                .iter()
                .map(|field| (field.as_ref().to_string(), format!("${}", field.as_ref()))),
            accumulators,
        )
    }

    /// `$group` keyed by `{ alias: expression, ... }`.
    ///
    /// `group_with_aliases([("customer", "$device_customer_name")], [])`
    /// groups on `{ _id: { customer: "$device_customer_name" } }`.
    pub fn group_with_aliases<K, V>(
        aliases: impl IntoIterator<Item = (K, V)>,
        accumulators: impl IntoIterator<Item = (String, Accumulator)>,
    ) -> Self
    where
        K: Into<String>,
        V: Into<Bson>,
    {
        let mut id = Document::new();
        for (alias, expression) in aliases {
            let alias: String = alias.into();
            let expression: Bson = expression.into();
            id.insert(alias, expression);
        }
        Self::Group {
            id: Bson::Document(id),
            accumulators: accumulators.into_iter().collect(),
        }
    }

    /// `$project` stage.
    pub fn project(projection: Projection) -> Self {
        Self::Project(projection)
    }

    /// `$sort` stage.
    pub fn sort(sort: Sort) -> Self {
        Self::Sort(sort)
    }

    /// `$skip` stage.
    pub fn skip(n: u64) -> Self {
        Self::Skip(n)
    }

    /// `$limit` stage.
    pub fn limit(n: u64) -> Self {
        Self::Limit(n)
    }

    /// `$count` stage.
    pub fn count(field: impl Into<String>) -> Self {
        Self::Count(field.into())
    }

    /// `$lookup` stage with a sub-pipeline.
    pub fn lookup(
        from: impl Into<String>,
        let_vars: Document,
        pipeline: Vec<Stage>,
        as_field: impl Into<String>,
    ) -> Self {
        Self::Lookup {
            from: from.into(),
            let_vars,
            pipeline,
            as_field: as_field.into(),
        }
    }

    /// `$replaceWith` stage.
    pub fn replace_with(expression: impl Into<Bson>) -> Self {
        Self::ReplaceWith(expression.into())
    }

    /// The stage operator name, e.g. `$match`.
    pub fn name(&self) -> &str {
        match self {
            Self::Match(_) => "$match",
            Self::Group { .. } => "$group",
            Self::Project(_) => "$project",
            Self::Sort(_) => "$sort",
            Self::Skip(_) => "$skip",
            Self::Limit(_) => "$limit",
            Self::Count(_) => "$count",
            Self::Lookup { .. } => "$lookup",
            Self::ReplaceWith(_) => "$replaceWith",
            Self::Raw(raw) => raw.keys().next().map(String::as_str).unwrap_or(""),
        }
    }

    /// Lower to a stage document.
    pub fn to_document(&self) -> Document {
        match self {
            Self::Match(filter) => doc! { "$match": filter.to_document() },
            Self::Group { id, accumulators } => {
                let mut group = doc! { "_id": id.clone() };
                for (name, accumulator) in accumulators {
                    group.insert(name.as_str(), accumulator.to_document());
                }
                doc! { "$group": group }
            }
            Self::Project(projection) => doc! { "$project": projection.to_document() },
            Self::Sort(sort) => doc! { "$sort": sort.to_document() },
            Self::Skip(n) => doc! { "$skip": count_value(*n) },
            Self::Limit(n) => doc! { "$limit": count_value(*n) },
            Self::Count(field) => doc! { "$count": field.as_str() },
            Self::Lookup {
                from,
                let_vars,
                pipeline,
                as_field,
            } => {
                let mut lookup = doc! { "from": from.as_str() };
                if !let_vars.is_empty() {
                    lookup.insert("let", let_vars.clone());
                }
                let stages: Vec<Bson> = pipeline
                    .iter()
                    .map(|stage| Bson::Document(stage.to_document()))
                    .collect();
                lookup.insert("pipeline", stages);
                lookup.insert("as", as_field.as_str());
                doc! { "$lookup": lookup }
            }
            Self::ReplaceWith(expression) => doc! { "$replaceWith": expression.clone() },
            Self::Raw(raw) => raw.clone(),
        }
    }
}

/// `$skip` / `$limit` argument: Int32 when it fits, Int64 otherwise.
fn count_value(n: u64) -> Bson {
    match i32::try_from(n) {
        Ok(small) => Bson::Int32(small),
        Err(_) => Bson::Int64(i64::try_from(n).unwrap_or(i64::MAX)),
    }
}

/// An ordered, assembled aggregation pipeline.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Pipeline {
    stages: Vec<Stage>,
}

impl Pipeline {
    /// Create an empty pipeline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a stage.
    pub fn push(&mut self, stage: Stage) {
        self.stages.push(stage);
    }

    /// Append a stage, builder style.
    pub fn with(mut self, stage: Stage) -> Self {
        self.stages.push(stage);
        self
    }

    /// The stages, in execution order.
    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// Stage operator names, in order.
    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(Stage::name).collect()
    }

    /// Number of stages.
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Whether the pipeline has no stages.
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Lower every stage, for the driver.
    pub fn to_documents(&self) -> Vec<Document> {
        self.stages.iter().map(Stage::to_document).collect()
    }
}

impl From<Vec<Stage>> for Pipeline {
    fn from(stages: Vec<Stage>) -> Self {
        Self { stages }
    }
}

impl IntoIterator for Pipeline {
    type Item = Stage;
    type IntoIter = std::vec::IntoIter<Stage>;

    fn into_iter(self) -> Self::IntoIter {
        self.stages.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_group_by_fields_in_order() {
        let stage = Stage::group_by(&["b", "a"], [("n".to_string(), Accumulator::count())]);
        assert_eq!(
            stage.to_document(),
            doc! { "$group": { "_id": { "b": "$b", "a": "$a" }, "n": { "$sum": 1 } } }
        );
    }

    #[test]
    fn test_group_with_aliases() {
        let stage = Stage::group_with_aliases(
            [("customer", "$device_customer_name"), ("status", "$sim_status")],
            [],
        );
        assert_eq!(
            stage.to_document(),
            doc! { "$group": { "_id": {
                "customer": "$device_customer_name",
                "status": "$sim_status",
            } } }
        );
    }

    #[test]
    fn test_simple_stages() {
        assert_eq!(Stage::skip(20).to_document(), doc! { "$skip": 20 });
        assert_eq!(Stage::limit(10).to_document(), doc! { "$limit": 10 });
        assert_eq!(
            Stage::skip(5_000_000_000).to_document(),
            doc! { "$skip": 5_000_000_000_i64 }
        );
        assert_eq!(
            Stage::count("__totalGroups").to_document(),
            doc! { "$count": "__totalGroups" }
        );
        assert_eq!(
            Stage::matching(Filter::Empty).to_document(),
            doc! { "$match": {} }
        );
    }

    #[test]
    fn test_lookup_omits_empty_let() {
        let stage = Stage::lookup("device", doc! {}, vec![Stage::limit(1)], "device__datas");
        assert_eq!(
            stage.to_document(),
            doc! { "$lookup": {
                "from": "device",
                "pipeline": [ { "$limit": 1 } ],
                "as": "device__datas",
            } }
        );
    }

    #[test]
    fn test_accumulators() {
        assert_eq!(
            Accumulator::Avg(Bson::String("$traffic".into())).to_document(),
            doc! { "$avg": "$traffic" }
        );
        assert_eq!(Accumulator::AddToSet(Bson::Null).operator(), "$addToSet");
    }

    #[test]
    fn test_pipeline_names_and_documents() {
        let pipeline = Pipeline::new()
            .with(Stage::matching(Filter::eq("a", 1)))
            .with(Stage::sort(Sort::ascending("a")))
            .with(Stage::Raw(doc! { "$sample": { "size": 3 } }));
        assert_eq!(pipeline.stage_names(), vec!["$match", "$sort", "$sample"]);
        assert_eq!(pipeline.len(), 3);
        assert_eq!(pipeline.to_documents()[1], doc! { "$sort": { "a": 1 } });
    }
}
