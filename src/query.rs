//! Query evaluation: filtering, sorting, and pagination.
//!
//! A query runs in three stages over the full entity set: every filter
//! expression must match (logical AND), the survivors are sorted by the
//! requested field list, and the sorted set is sliced by offset/limit.
//! Cursors are plain stringified offsets, not opaque tokens.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::entity::Entity;
use crate::error::CatalogError;
use crate::field;

/// Number of items returned when a query does not set a limit.
pub const DEFAULT_LIMIT: usize = 20;

/// Comparison operator of a filter expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOp {
    /// `field=value`: the resolved field equals (or, for sequences,
    /// contains) the value.
    Eq,
    /// `field!=value`: exact negation of [`FilterOp::Eq`], including when
    /// the field does not resolve.
    NotEq,
}

/// A single parsed filter expression.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    /// Dotted field path, e.g. `spec.owner`.
    pub field: String,
    /// Comparison operator.
    pub op: FilterOp,
    /// Value to compare against, as given.
    pub value: String,
}

impl Filter {
    /// Parses `field=value` or `field!=value`.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::InvalidFilter`] when the expression has no
    /// operator or an empty field path.
    pub fn parse(expr: &str) -> Result<Self, CatalogError> {
        // `!=` first: splitting on `=` alone would misread it.
        let (field, op, value) = if let Some((field, value)) = expr.split_once("!=") {
            (field, FilterOp::NotEq, value)
        } else if let Some((field, value)) = expr.split_once('=') {
            (field, FilterOp::Eq, value)
        } else {
            return Err(CatalogError::InvalidFilter {
                expr: expr.to_string(),
                reason: "expected 'field=value' or 'field!=value'",
            });
        };

        if field.is_empty() {
            return Err(CatalogError::InvalidFilter {
                expr: expr.to_string(),
                reason: "field path is empty",
            });
        }

        Ok(Self {
            field: field.to_string(),
            op,
            value: value.to_string(),
        })
    }

    /// Whether this filter accepts the entity.
    #[must_use]
    pub fn matches(&self, entity: &Entity) -> bool {
        let hit = field::resolve(entity, &self.field)
            .is_some_and(|resolved| resolved.matches(&self.value));
        match self.op {
            FilterOp::Eq => hit,
            FilterOp::NotEq => !hit,
        }
    }
}

/// Sort direction for one field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    /// Ascending (the default).
    Asc,
    /// Descending.
    Desc,
}

/// One field of an ordered sort specification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortField {
    /// Dotted field path to sort on.
    pub field: String,
    /// Direction.
    pub order: SortOrder,
}

impl SortField {
    /// Ascending sort on the given field.
    #[must_use]
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            order: SortOrder::Asc,
        }
    }

    /// Descending sort on the given field.
    #[must_use]
    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            order: SortOrder::Desc,
        }
    }
}

/// A full query: filters, sort fields, and pagination window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuerySpec {
    /// Filter expressions, combined with logical AND.
    #[serde(default)]
    pub filters: Vec<Filter>,
    /// Ordered sort field list; empty means index order.
    #[serde(default)]
    pub sorts: Vec<SortField>,
    /// Number of leading items to skip.
    #[serde(default)]
    pub offset: usize,
    /// Page size; defaults to [`DEFAULT_LIMIT`].
    pub limit: usize,
}

impl Default for QuerySpec {
    fn default() -> Self {
        Self {
            filters: Vec::new(),
            sorts: Vec::new(),
            offset: 0,
            limit: DEFAULT_LIMIT,
        }
    }
}

impl QuerySpec {
    /// An unfiltered query with default pagination.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a parsed filter.
    #[must_use]
    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    /// Parses and adds a raw `field=value` / `field!=value` expression.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::InvalidFilter`] for a malformed expression.
    pub fn with_raw_filter(self, expr: &str) -> Result<Self, CatalogError> {
        Ok(self.with_filter(Filter::parse(expr)?))
    }

    /// Adds a sort field (applied after any previously added fields).
    #[must_use]
    pub fn with_sort(mut self, sort: SortField) -> Self {
        self.sorts.push(sort);
        self
    }

    /// Sets the pagination offset.
    #[must_use]
    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    /// Sets the page size.
    #[must_use]
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }
}

/// Cursors for navigating adjacent pages.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    /// Offset of the next page, present only when more items remain.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
    /// Offset of the previous page, present only when `offset > 0`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prev_cursor: Option<String>,
}

/// Result of a query: one page of items plus the full-set count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResponse {
    /// The requested page, filtered and sorted.
    pub items: Vec<Entity>,
    /// Size of the whole filtered set, before pagination.
    pub total_items: usize,
    /// Page navigation cursors.
    pub page_info: PageInfo,
}

/// Case-insensitive ordering with a raw-byte tiebreak, standing in for
/// locale-aware comparison.
fn collate(a: &str, b: &str) -> Ordering {
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| a.cmp(b))
}

fn compare(a: &Entity, b: &Entity, sorts: &[SortField]) -> Ordering {
    for sort in sorts {
        let left = field::resolve(a, &sort.field).map_or_else(String::new, |v| v.sort_form());
        let right = field::resolve(b, &sort.field).map_or_else(String::new, |v| v.sort_form());
        let ordering = match sort.order {
            SortOrder::Asc => collate(&left, &right),
            SortOrder::Desc => collate(&right, &left),
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

/// Runs a query over the given entities, which arrive in index order.
pub(crate) fn evaluate<'a, I>(entities: I, spec: &QuerySpec) -> QueryResponse
where
    I: Iterator<Item = &'a Entity>,
{
    let mut matched: Vec<&Entity> = entities
        .filter(|entity| spec.filters.iter().all(|f| f.matches(entity)))
        .collect();

    if !spec.sorts.is_empty() {
        matched.sort_by(|a, b| compare(a, b, &spec.sorts));
    }

    let total_items = matched.len();
    let start = spec.offset.min(total_items);
    let end = start.saturating_add(spec.limit).min(total_items);

    let items: Vec<Entity> = matched[start..end].iter().map(|e| (*e).clone()).collect();

    let next_cursor = if spec.offset.saturating_add(spec.limit) < total_items {
        Some((spec.offset.saturating_add(spec.limit)).to_string())
    } else {
        None
    };
    let prev_cursor = if spec.offset > 0 {
        Some(spec.offset.saturating_sub(spec.limit).to_string())
    } else {
        None
    };

    QueryResponse {
        items,
        total_items,
        page_info: PageInfo {
            next_cursor,
            prev_cursor,
        },
    }
}
