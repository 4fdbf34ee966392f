//! Query options and sort order.

use std::collections::BTreeSet;

/// Paging and projection options for one logical query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryOptions {
    /// Maximum number of results to return.
    pub limit: usize,
    /// Number of leading results to skip.
    pub start: usize,
    /// Fields the caller wants populated on the results.
    pub fields: BTreeSet<String>,
}

impl QueryOptions {
    /// Options returning at most `limit` results from the beginning.
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            start: 0,
            fields: BTreeSet::new(),
        }
    }

    pub fn with_start(mut self, start: usize) -> Self {
        self.start = start;
        self
    }

    pub fn with_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Replace the requested fields with the result of `filter`.
    pub fn filter_fields(mut self, filter: impl FnOnce(&Self) -> BTreeSet<String>) -> Self {
        self.fields = filter(&self);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }
}

/// One key of a query's sort order.
///
/// Paged reads rely on the full sort order being total, so the last key
/// should be a unique field such as the numeric id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortField {
    pub field: String,
    pub order: SortOrder,
    /// Type to assume when the field is missing from the index mapping.
    pub unmapped_type: Option<String>,
}

impl SortField {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            order: SortOrder::Asc,
            unmapped_type: None,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            order: SortOrder::Desc,
            unmapped_type: None,
        }
    }

    pub fn with_unmapped_type(mut self, unmapped_type: impl Into<String>) -> Self {
        self.unmapped_type = Some(unmapped_type.into());
        self
    }
}
