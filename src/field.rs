//! Dotted-path field resolution.
//!
//! Filters, sorts, and facets all address entity data through dotted paths
//! like `kind`, `metadata.tags`, or `spec.owner`. Resolution walks the path
//! one segment at a time; any absent segment, or a segment that descends
//! through a non-mapping, resolves to nothing.

use serde_json::Value;

use crate::entity::Entity;

/// A resolved field, coerced to string form.
///
/// Sequences stay distinguishable from scalars because matching and facet
/// counting treat them element-wise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    /// A single value in string form.
    Scalar(String),
    /// An ordered sequence of values in string form.
    Seq(Vec<String>),
}

impl FieldValue {
    /// The string form used for sort comparisons. Sequences join their
    /// elements with `,` so the comparator stays total.
    #[must_use]
    pub fn sort_form(&self) -> String {
        match self {
            Self::Scalar(s) => s.clone(),
            Self::Seq(items) => items.join(","),
        }
    }

    /// True if any resolved value equals `needle` (element match for
    /// sequences, whole-value match for scalars).
    #[must_use]
    pub fn matches(&self, needle: &str) -> bool {
        match self {
            Self::Scalar(s) => s == needle,
            Self::Seq(items) => items.iter().any(|item| item == needle),
        }
    }
}

/// Resolves a dotted path against an entity.
///
/// The first segment selects the root: `kind` (lowercased), `metadata`, or
/// `spec`. Returns `None` when the path does not resolve to a scalar or
/// sequence value.
#[must_use]
pub fn resolve(entity: &Entity, path: &str) -> Option<FieldValue> {
    let mut segments = path.split('.');
    let root = segments.next()?;
    let rest: Vec<&str> = segments.collect();

    match root {
        "kind" if rest.is_empty() => Some(FieldValue::Scalar(entity.kind.to_ascii_lowercase())),
        "metadata" => resolve_metadata(entity, &rest),
        "spec" => resolve_json(&Value::Object(entity.spec.clone()), &rest),
        _ => None,
    }
}

fn resolve_metadata(entity: &Entity, segments: &[&str]) -> Option<FieldValue> {
    let meta = &entity.metadata;
    let (field, rest) = segments.split_first()?;

    let scalar = |value: Option<&str>| -> Option<FieldValue> {
        if rest.is_empty() {
            value.map(|s| FieldValue::Scalar(s.to_string()))
        } else {
            None
        }
    };

    match *field {
        "name" => scalar(Some(&meta.name)),
        "namespace" => scalar(Some(entity.namespace())),
        "uid" => scalar(meta.uid.as_deref()),
        "etag" => scalar(meta.etag.as_deref()),
        "title" => scalar(meta.title.as_deref()),
        "description" => scalar(meta.description.as_deref()),
        "tags" if rest.is_empty() => Some(FieldValue::Seq(meta.tags.clone())),
        "labels" => resolve_string_map(&meta.labels, rest),
        "annotations" => resolve_string_map(&meta.annotations, rest),
        _ => None,
    }
}

fn resolve_string_map(
    map: &std::collections::BTreeMap<String, String>,
    segments: &[&str],
) -> Option<FieldValue> {
    // Exactly one more segment selects a key; the mapping itself has no
    // scalar form and deeper paths cannot resolve through a string.
    match segments {
        [key] => map.get(*key).map(|v| FieldValue::Scalar(v.clone())),
        _ => None,
    }
}

fn resolve_json(root: &Value, segments: &[&str]) -> Option<FieldValue> {
    let mut current = root;
    for segment in segments {
        current = current.as_object()?.get(*segment)?;
    }
    leaf_value(current)
}

fn leaf_value(value: &Value) -> Option<FieldValue> {
    match value {
        Value::Null | Value::Object(_) => None,
        Value::Bool(b) => Some(FieldValue::Scalar(b.to_string())),
        Value::Number(n) => Some(FieldValue::Scalar(n.to_string())),
        Value::String(s) => Some(FieldValue::Scalar(s.clone())),
        Value::Array(items) => Some(FieldValue::Seq(
            items.iter().filter_map(scalar_form).collect(),
        )),
    }
}

fn scalar_form(value: &Value) -> Option<String> {
    match value {
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) => Some(s.clone()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}
