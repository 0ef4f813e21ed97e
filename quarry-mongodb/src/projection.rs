//! Projection and sort expressions.

use bson::{Bson, Document};

/// Field selection for query results and `$project` stages.
#[derive(Debug, Clone, PartialEq)]
pub enum Projection {
    /// Keep only these fields (plus `_id` unless excluded).
    Include(Vec<String>),
    /// Drop these fields.
    Exclude(Vec<String>),
    /// Drop `_id`.
    ExcludeId,
    /// Emit `field` computed from an aggregation expression.
    Computed {
        /// Output field name.
        field: String,
        /// Expression, e.g. `"$_id.status"`.
        expression: Bson,
    },
    /// Several projections merged in order; later keys replace earlier ones.
    Fields(Vec<Projection>),
    /// A projection document passed through untouched.
    Raw(Document),
}

impl Projection {
    /// Include the given fields.
    pub fn include<S: Into<String>>(fields: impl IntoIterator<Item = S>) -> Self {
        Self::Include(fields.into_iter().map(Into::into).collect())
    }

    /// Exclude the given fields.
    pub fn exclude<S: Into<String>>(fields: impl IntoIterator<Item = S>) -> Self {
        Self::Exclude(fields.into_iter().map(Into::into).collect())
    }

    /// Exclude `_id`.
    pub fn exclude_id() -> Self {
        Self::ExcludeId
    }

    /// Computed field.
    pub fn computed(field: impl Into<String>, expression: impl Into<Bson>) -> Self {
        Self::Computed {
            field: field.into(),
            expression: expression.into(),
        }
    }

    /// Merge several projections.
    pub fn fields(projections: impl IntoIterator<Item = Projection>) -> Self {
        Self::Fields(projections.into_iter().collect())
    }

    /// Lower to a projection document.
    pub fn to_document(&self) -> Document {
        let mut document = Document::new();
        self.write_into(&mut document);
        document
    }

    fn write_into(&self, document: &mut Document) {
        match self {
            Self::Include(fields) => {
                for field in fields {
                    document.insert(field.as_str(), 1);
                }
            }
            Self::Exclude(fields) => {
                for field in fields {
                    document.insert(field.as_str(), 0);
                }
            }
            Self::ExcludeId => {
                document.insert("_id", 0);
            }
            Self::Computed { field, expression } => {
                document.insert(field.as_str(), expression.clone());
            }
            Self::Fields(projections) => {
                for projection in projections {
                    projection.write_into(document);
                }
            }
            Self::Raw(raw) => {
                for (key, value) in raw {
                    document.insert(key.as_str(), value.clone());
                }
            }
        }
    }
}

impl From<Document> for Projection {
    fn from(document: Document) -> Self {
        Self::Raw(document)
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    /// Ascending order.
    #[default]
    Ascending,
    /// Descending order.
    Descending,
}

impl SortDirection {
    /// Numeric form used by the store.
    pub fn as_i32(self) -> i32 {
        match self {
            Self::Ascending => 1,
            Self::Descending => -1,
        }
    }
}

/// Sort specification.
#[derive(Debug, Clone, PartialEq)]
pub enum Sort {
    /// Field/direction pairs, in order.
    Keys(Vec<(String, SortDirection)>),
    /// Sort document passed through unchanged, e.g. `{ score: { $meta: "textScore" } }`.
    Raw(Document),
}

impl Default for Sort {
    fn default() -> Self {
        Self::Keys(Vec::new())
    }
}

impl Sort {
    /// Start with an ascending key.
    pub fn ascending(field: impl Into<String>) -> Self {
        Self::default().then_ascending(field)
    }

    /// Start with a descending key.
    pub fn descending(field: impl Into<String>) -> Self {
        Self::default().then_descending(field)
    }

    /// Append an ascending key.
    pub fn then_ascending(self, field: impl Into<String>) -> Self {
        self.then(field, SortDirection::Ascending)
    }

    /// Append a descending key.
    pub fn then_descending(self, field: impl Into<String>) -> Self {
        self.then(field, SortDirection::Descending)
    }

    /// Append a key.
    pub fn then(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        match &mut self {
            Self::Keys(keys) => keys.push((field.into(), direction)),
            Self::Raw(document) => {
                document.insert(field.into(), direction.as_i32());
            }
        }
        self
    }

    /// Whether no key was given.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Keys(keys) => keys.is_empty(),
            Self::Raw(document) => document.is_empty(),
        }
    }

    /// Lower to a sort document.
    pub fn to_document(&self) -> Document {
        match self {
            Self::Keys(keys) => {
                let mut document = Document::new();
                for (field, direction) in keys {
                    document.insert(field.as_str(), direction.as_i32());
                }
                document
            }
            Self::Raw(document) => document.clone(),
        }
    }
}

impl From<Document> for Sort {
    fn from(document: Document) -> Self {
        Self::Raw(document)
    }
}
