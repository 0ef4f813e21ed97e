//! Filter expressions.
//!
//! A [`Filter`] is a tagged predicate that lowers to the document form the
//! store understands. The assembler never looks inside one; it only places
//! the lowered document into `$match` stages or find commands.
//!
//! # Example
//!
//! ```rust
//! use quarry_mongodb::filter::{Filter, FilterBuilder};
//!
//! let filter = FilterBuilder::new()
//!     .eq("sim_status", "active")
//!     .gte("traffic", 100)
//!     .regex("sim_msisdn", "^1064")
//!     .build();
//!
//! assert!(filter.to_document().contains_key("$and"));
//! assert!(Filter::default().to_document().is_empty());
//! ```

use bson::{Bson, Document, doc, oid::ObjectId};

/// Comparison operators for single-field predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    /// Equal.
    Eq,
    /// Not equal.
    Ne,
    /// Greater than.
    Gt,
    /// Greater than or equal.
    Gte,
    /// Less than.
    Lt,
    /// Less than or equal.
    Lte,
}

impl CompareOp {
    /// The query operator name.
    pub fn operator(self) -> &'static str {
        match self {
            Self::Eq => "$eq",
            Self::Ne => "$ne",
            Self::Gt => "$gt",
            Self::Gte => "$gte",
            Self::Lt => "$lt",
            Self::Lte => "$lte",
        }
    }
}

/// A boolean predicate over documents.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Filter {
    /// Matches every document.
    #[default]
    Empty,
    /// `field <op> value`.
    Compare {
        /// Field path.
        field: String,
        /// Operator.
        op: CompareOp,
        /// Operand.
        value: Bson,
    },
    /// Membership in (or absence from) a set of values.
    In {
        /// Field path.
        field: String,
        /// Candidate values.
        values: Vec<Bson>,
        /// `$nin` instead of `$in`.
        negated: bool,
    },
    /// Field presence check.
    Exists {
        /// Field path.
        field: String,
        /// Whether the field must exist.
        exists: bool,
    },
    /// Regular expression match.
    Regex {
        /// Field path.
        field: String,
        /// Pattern.
        pattern: String,
        /// Regex options such as `i`.
        options: Option<String>,
    },
    /// All children must match.
    And(Vec<Filter>),
    /// At least one child must match.
    Or(Vec<Filter>),
    /// No child may match.
    Nor(Vec<Filter>),
    /// Aggregation expression evaluated per document (`$expr`).
    Expr(Bson),
    /// A filter document passed through untouched.
    Raw(Document),
}

impl Filter {
    /// Match everything.
    pub fn empty() -> Self {
        Self::Empty
    }

    fn compare(field: impl Into<String>, op: CompareOp, value: impl Into<Bson>) -> Self {
        Self::Compare {
            field: field.into(),
            op,
            value: value.into(),
        }
    }

    /// `field == value`.
    pub fn eq(field: impl Into<String>, value: impl Into<Bson>) -> Self {
        Self::compare(field, CompareOp::Eq, value)
    }

    /// `field != value`.
    pub fn ne(field: impl Into<String>, value: impl Into<Bson>) -> Self {
        Self::compare(field, CompareOp::Ne, value)
    }

    /// `field > value`.
    pub fn gt(field: impl Into<String>, value: impl Into<Bson>) -> Self {
        Self::compare(field, CompareOp::Gt, value)
    }

    /// `field >= value`.
    pub fn gte(field: impl Into<String>, value: impl Into<Bson>) -> Self {
        Self::compare(field, CompareOp::Gte, value)
    }

    /// `field < value`.
    pub fn lt(field: impl Into<String>, value: impl Into<Bson>) -> Self {
        Self::compare(field, CompareOp::Lt, value)
    }

    /// `field <= value`.
    pub fn lte(field: impl Into<String>, value: impl Into<Bson>) -> Self {
        Self::compare(field, CompareOp::Lte, value)
    }

    /// `field` is one of `values`.
    pub fn in_array<V: Into<Bson>>(field: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self {
        Self::In {
            field: field.into(),
            values: values.into_iter().map(Into::into).collect(),
            negated: false,
        }
    }

    /// `field` is none of `values`.
    pub fn not_in<V: Into<Bson>>(field: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self {
        Self::In {
            field: field.into(),
            values: values.into_iter().map(Into::into).collect(),
            negated: true,
        }
    }

    /// `field` exists (or not).
    pub fn exists(field: impl Into<String>, exists: bool) -> Self {
        Self::Exists {
            field: field.into(),
            exists,
        }
    }

    /// `field` matches `pattern`.
    pub fn regex(field: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::Regex {
            field: field.into(),
            pattern: pattern.into(),
            options: None,
        }
    }

    /// `field` matches `pattern` with regex options.
    pub fn regex_with_options(
        field: impl Into<String>,
        pattern: impl Into<String>,
        options: impl Into<String>,
    ) -> Self {
        Self::Regex {
            field: field.into(),
            pattern: pattern.into(),
            options: Some(options.into()),
        }
    }

    /// `_id == id`.
    pub fn by_id(id: ObjectId) -> Self {
        Self::eq("_id", id)
    }

    /// Conjunction.
    pub fn and(filters: impl IntoIterator<Item = Filter>) -> Self {
        Self::And(filters.into_iter().collect())
    }

    /// Disjunction.
    pub fn or(filters: impl IntoIterator<Item = Filter>) -> Self {
        Self::Or(filters.into_iter().collect())
    }

    /// Negated disjunction.
    pub fn nor(filters: impl IntoIterator<Item = Filter>) -> Self {
        Self::Nor(filters.into_iter().collect())
    }

    /// Aggregation expression predicate.
    pub fn expr(expression: impl Into<Bson>) -> Self {
        Self::Expr(expression.into())
    }

    /// Expression equality, `{ $expr: { $eq: [left, right] } }`.
    ///
    /// Operands are expressions, so `"$field"` refers to a field and
    /// `"$$name"` to a variable.
    pub fn expr_eq(left: impl Into<Bson>, right: impl Into<Bson>) -> Self {
        let left: Bson = left.into();
        let right: Bson = right.into();
        Self::Expr(Bson::Document(doc! { "$eq": [left, right] }))
    }

    /// Pass a filter document through untouched.
    pub fn raw(document: Document) -> Self {
        Self::Raw(document)
    }

    /// Whether this filter matches everything without constraint.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Empty => true,
            Self::Raw(doc) => doc.is_empty(),
            _ => false,
        }
    }

    /// Lower to a filter document.
    pub fn to_document(&self) -> Document {
        match self {
            Self::Empty => Document::new(),
            Self::Compare {
                field,
                op: CompareOp::Eq,
                value,
            } => doc! { field.as_str(): value.clone() },
            Self::Compare { field, op, value } => {
                doc! { field.as_str(): { op.operator(): value.clone() } }
            }
            Self::In {
                field,
                values,
                negated,
            } => {
                let op = if *negated { "$nin" } else { "$in" };
                doc! { field.as_str(): { op: values.clone() } }
            }
            Self::Exists { field, exists } => doc! { field.as_str(): { "$exists": *exists } },
            Self::Regex {
                field,
                pattern,
                options,
            } => {
                let mut condition = doc! { "$regex": pattern.as_str() };
                if let Some(options) = options {
                    condition.insert("$options", options.as_str());
                }
                doc! { field.as_str(): condition }
            }
            Self::And(children) => Self::combine("$and", children),
            Self::Or(children) => Self::combine("$or", children),
            Self::Nor(children) => Self::combine("$nor", children),
            Self::Expr(expression) => doc! { "$expr": expression.clone() },
            Self::Raw(document) => document.clone(),
        }
    }

    fn combine(operator: &str, children: &[Filter]) -> Document {
        if children.is_empty() {
            return Document::new();
        }
        let lowered: Vec<Bson> = children
            .iter()
            .map(|child| Bson::Document(child.to_document()))
            .collect();
        doc! { operator: lowered }
    }
}

impl From<Document> for Filter {
    fn from(document: Document) -> Self {
        Self::Raw(document)
    }
}

/// Fluent builder that collects conditions into a conjunction.
///
/// Unlike inserting keys into one document, repeated conditions on the same
/// field are all kept.
#[derive(Debug, Clone, Default)]
pub struct FilterBuilder {
    conditions: Vec<Filter>,
}

impl FilterBuilder {
    /// Create a new empty filter builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an arbitrary condition.
    pub fn filter(mut self, filter: Filter) -> Self {
        if !filter.is_empty() {
            self.conditions.push(filter);
        }
        self
    }

    /// Add an equality condition.
    pub fn eq(self, field: &str, value: impl Into<Bson>) -> Self {
        self.filter(Filter::eq(field, value))
    }

    /// Add a not-equal condition.
    pub fn ne(self, field: &str, value: impl Into<Bson>) -> Self {
        self.filter(Filter::ne(field, value))
    }

    /// Add a greater-than condition.
    pub fn gt(self, field: &str, value: impl Into<Bson>) -> Self {
        self.filter(Filter::gt(field, value))
    }

    /// Add a greater-than-or-equal condition.
    pub fn gte(self, field: &str, value: impl Into<Bson>) -> Self {
        self.filter(Filter::gte(field, value))
    }

    /// Add a less-than condition.
    pub fn lt(self, field: &str, value: impl Into<Bson>) -> Self {
        self.filter(Filter::lt(field, value))
    }

    /// Add a less-than-or-equal condition.
    pub fn lte(self, field: &str, value: impl Into<Bson>) -> Self {
        self.filter(Filter::lte(field, value))
    }

    /// Add an "in" condition (value in array).
    pub fn in_array(self, field: &str, values: Vec<impl Into<Bson>>) -> Self {
        self.filter(Filter::in_array(field, values))
    }

    /// Add a "not in" condition.
    pub fn not_in(self, field: &str, values: Vec<impl Into<Bson>>) -> Self {
        self.filter(Filter::not_in(field, values))
    }

    /// Add a regex condition.
    pub fn regex(self, field: &str, pattern: &str) -> Self {
        self.filter(Filter::regex(field, pattern))
    }

    /// Add an exists condition.
    pub fn exists(self, field: &str, exists: bool) -> Self {
        self.filter(Filter::exists(field, exists))
    }

    /// Add a blank-or-missing check: absent, `null`, or whitespace only.
    pub fn blank(self, field: &str) -> Self {
        self.filter(Filter::or([
            Filter::exists(field, false),
            Filter::eq(field, Bson::Null),
            Filter::regex(field, r"^\s*$"),
        ]))
    }

    /// Build the filter. No conditions match everything, one condition is
    /// returned as is.
    pub fn build(mut self) -> Filter {
        match self.conditions.len() {
            0 => Filter::Empty,
            1 => self.conditions.remove(0),
            _ => Filter::And(self.conditions),
        }
    }

    /// Check if no condition was added.
    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_empty_filter_matches_everything() {
        assert!(Filter::default().is_empty());
        assert_eq!(Filter::empty().to_document(), doc! {});
        assert_eq!(Filter::and(vec![]).to_document(), doc! {});
    }

    #[test]
    fn test_equality_is_implicit() {
        assert_eq!(
            Filter::eq("sim_status", "active").to_document(),
            doc! { "sim_status": "active" }
        );
    }

    #[test]
    fn test_comparisons_use_operators() {
        assert_eq!(
            Filter::gte("traffic_time", 10).to_document(),
            doc! { "traffic_time": { "$gte": 10 } }
        );
        assert_eq!(
            Filter::ne("status", "B").to_document(),
            doc! { "status": { "$ne": "B" } }
        );
    }

    #[test]
    fn test_in_and_not_in() {
        assert_eq!(
            Filter::in_array("status", ["A", "B"]).to_document(),
            doc! { "status": { "$in": ["A", "B"] } }
        );
        assert_eq!(
            Filter::not_in("status", [1, 2]).to_document(),
            doc! { "status": { "$nin": [1, 2] } }
        );
    }

    #[test]
    fn test_regex_with_options() {
        assert_eq!(
            Filter::regex_with_options("name", "^al", "i").to_document(),
            doc! { "name": { "$regex": "^al", "$options": "i" } }
        );
    }

    #[test]
    fn test_logical_combinators() {
        let filter = Filter::and([Filter::gte("t", 1), Filter::lt("t", 5)]);
        assert_eq!(
            filter.to_document(),
            doc! { "$and": [ { "t": { "$gte": 1 } }, { "t": { "$lt": 5 } } ] }
        );

        let filter = Filter::or([Filter::exists("a", false), Filter::eq("a", Bson::Null)]);
        assert_eq!(
            filter.to_document(),
            doc! { "$or": [ { "a": { "$exists": false } }, { "a": null } ] }
        );
    }

    #[test]
    fn test_expr_eq() {
        assert_eq!(
            Filter::expr_eq("$device_id", "$$left").to_document(),
            doc! { "$expr": { "$eq": ["$device_id", "$$left"] } }
        );
    }

    #[test]
    fn test_raw_passthrough() {
        let raw = doc! { "$text": { "$search": "hello" } };
        assert_eq!(Filter::from(raw.clone()).to_document(), raw);
        assert!(Filter::raw(doc! {}).is_empty());
    }

    #[test]
    fn test_builder_keeps_repeated_fields() {
        let filter = FilterBuilder::new().gte("age", 18).lt("age", 65).build();
        assert_eq!(
            filter.to_document(),
            doc! { "$and": [ { "age": { "$gte": 18 } }, { "age": { "$lt": 65 } } ] }
        );
    }

    #[test]
    fn test_builder_single_condition_and_empty() {
        assert_eq!(FilterBuilder::new().eq("a", 1).build(), Filter::eq("a", 1));
        assert_eq!(FilterBuilder::new().build(), Filter::Empty);
        assert!(FilterBuilder::new().filter(Filter::Empty).is_empty());
    }

    #[test]
    fn test_builder_blank() {
        let filter = FilterBuilder::new().blank("sim_msisdn").build();
        assert_eq!(
            filter.to_document(),
            doc! { "$or": [
                { "sim_msisdn": { "$exists": false } },
                { "sim_msisdn": null },
                { "sim_msisdn": { "$regex": r"^\s*$" } },
            ] }
        );
    }

    #[test]
    fn test_by_id() {
        let oid = ObjectId::new();
        assert_eq!(Filter::by_id(oid).to_document(), doc! { "_id": oid });
    }
}
