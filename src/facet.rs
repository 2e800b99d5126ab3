//! Value-frequency facets.
//!
//! A facet breaks the entity set down by the distinct values of one field:
//! sequence-valued fields count once per element, scalars once per entity,
//! and entities where the field does not resolve are skipped.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::entity::Entity;
use crate::field::{self, FieldValue};

/// One distinct value of a faceted field and how often it occurs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FacetBucket {
    /// The value in string form.
    pub value: String,
    /// Number of (entity, value) occurrences.
    pub count: usize,
}

/// Computes facets for the requested fields over the given entities.
///
/// Buckets within each field are ordered by descending count, ties by
/// ascending value, so the output is deterministic for a given store state.
pub(crate) fn compute<'a, I, S>(entities: I, fields: &[S]) -> BTreeMap<String, Vec<FacetBucket>>
where
    I: Iterator<Item = &'a Entity>,
    S: AsRef<str>,
{
    let mut counts: HashMap<&str, HashMap<String, usize>> = fields
        .iter()
        .map(|f| (f.as_ref(), HashMap::new()))
        .collect();

    for entity in entities {
        for (field_path, buckets) in &mut counts {
            match field::resolve(entity, field_path) {
                Some(FieldValue::Scalar(value)) => {
                    *buckets.entry(value).or_insert(0) += 1;
                }
                Some(FieldValue::Seq(items)) => {
                    for item in items {
                        *buckets.entry(item).or_insert(0) += 1;
                    }
                }
                None => {}
            }
        }
    }

    counts
        .into_iter()
        .map(|(field_path, buckets)| {
            let mut buckets: Vec<FacetBucket> = buckets
                .into_iter()
                .map(|(value, count)| FacetBucket { value, count })
                .collect();
            buckets.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.value.cmp(&b.value)));
            (field_path.to_string(), buckets)
        })
        .collect()
}
