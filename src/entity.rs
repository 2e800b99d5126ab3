//! Entity types and identity management.
//!
//! Everything in the catalog hangs off a stable entity identity: the
//! canonical reference `lowercase(kind):namespace/name`. The store keys its
//! indices by that reference, so the formatting and parsing rules here are
//! load-bearing for every lookup and for the persisted snapshot.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CatalogError;

/// Namespace assigned when an entity is upserted without one.
pub const DEFAULT_NAMESPACE: &str = "default";

/// Descriptive and identifying metadata carried by every entity.
///
/// `name` is the only required field. `uid` and `etag` are assigned by the
/// store: callers normally leave them empty and read them back from the
/// upsert result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityMeta {
    /// Namespace half of the identity; defaulted to `"default"` on upsert.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    /// Name half of the identity; unique within kind + namespace.
    pub name: String,

    /// Opaque store-assigned identifier, stable across updates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,

    /// Opaque change token, regenerated on every mutation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,

    /// Human-readable display title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// Free-form description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Ordered tag list; filters treat this as a sequence field.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,

    /// String-to-string label mapping.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,

    /// String-to-string annotation mapping.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

/// A structured record managed by the catalog.
///
/// `spec` is an open mapping the store never interprets beyond dotted-path
/// lookups, so it stays as raw [`serde_json`] values.
///
/// # Examples
///
/// ```
/// use entity_catalog::Entity;
///
/// let entity = Entity::new("Component", "svc-a");
/// assert_eq!(entity.reference().to_string(), "component:default/svc-a");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Case-insensitive kind, e.g. `"component"` or `"api"`.
    pub kind: String,

    /// Identity and descriptive metadata.
    pub metadata: EntityMeta,

    /// Caller-defined open mapping, opaque except for dotted-path lookups.
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub spec: serde_json::Map<String, serde_json::Value>,
}

impl Entity {
    /// Creates a minimal entity with the given kind and name.
    #[must_use]
    pub fn new(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            metadata: EntityMeta {
                name: name.into(),
                ..EntityMeta::default()
            },
            spec: serde_json::Map::new(),
        }
    }

    /// Sets a single `spec` field, replacing any previous value.
    #[must_use]
    pub fn with_spec(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.spec.insert(key.into(), value.into());
        self
    }

    /// The entity's namespace, falling back to [`DEFAULT_NAMESPACE`].
    #[must_use]
    pub fn namespace(&self) -> &str {
        self.metadata
            .namespace
            .as_deref()
            .filter(|ns| !ns.is_empty())
            .unwrap_or(DEFAULT_NAMESPACE)
    }

    /// Computes the canonical reference for this entity.
    #[must_use]
    pub fn reference(&self) -> EntityRef {
        EntityRef::new(&self.kind, self.namespace(), &self.metadata.name)
    }
}

/// The canonical identity of an entity: `lowercase(kind):namespace/name`.
///
/// At most one entity exists per reference at any time; upserting to an
/// occupied reference replaces the previous entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EntityRef {
    kind: String,
    namespace: String,
    name: String,
}

impl EntityRef {
    /// Builds a reference from its parts. The kind is lowercased; an empty
    /// namespace falls back to [`DEFAULT_NAMESPACE`].
    #[must_use]
    pub fn new(kind: &str, namespace: &str, name: &str) -> Self {
        let namespace = if namespace.is_empty() {
            DEFAULT_NAMESPACE
        } else {
            namespace
        };
        Self {
            kind: kind.to_ascii_lowercase(),
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }

    /// The lowercased kind component.
    #[must_use]
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// The namespace component.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// The name component.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}/{}", self.kind, self.namespace, self.name)
    }
}

impl FromStr for EntityRef {
    type Err = CatalogError;

    /// Parses `kind:namespace/name`. The namespace segment may be omitted
    /// (`kind:name`), in which case it defaults.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, rest) = s
            .split_once(':')
            .ok_or_else(|| CatalogError::InvalidReference {
                value: s.to_string(),
                reason: "expected 'kind:namespace/name'",
            })?;
        if kind.is_empty() || rest.is_empty() {
            return Err(CatalogError::InvalidReference {
                value: s.to_string(),
                reason: "empty kind or name",
            });
        }
        let (namespace, name) = match rest.split_once('/') {
            Some((ns, name)) => (ns, name),
            None => ("", rest),
        };
        if name.is_empty() {
            return Err(CatalogError::InvalidReference {
                value: s.to_string(),
                reason: "empty name",
            });
        }
        Ok(Self::new(kind, namespace, name))
    }
}

impl TryFrom<String> for EntityRef {
    type Error = CatalogError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<EntityRef> for String {
    fn from(r: EntityRef) -> Self {
        r.to_string()
    }
}

/// An entity paired with the key of the location that produced it.
///
/// This is the unit the store indexes and persists. The location key has no
/// referential-integrity link to [`Location::id`]; a dangling key is allowed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    /// The indexed entity.
    pub entity: Entity,

    /// Key of the ingestion source that produced this entity, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location_key: Option<String>,
}

/// A source descriptor for an ingestion mechanism.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    /// Store-assigned unique identifier.
    pub id: String,

    /// Ingestion mechanism, e.g. `"file"` or `"url"`.
    #[serde(rename = "type")]
    pub location_type: String,

    /// Where the source points.
    pub target: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_lowercases_kind_and_defaults_namespace() {
        let entity = Entity::new("Component", "svc-a");
        let r = entity.reference();
        assert_eq!(r.kind(), "component");
        assert_eq!(r.namespace(), "default");
        assert_eq!(r.name(), "svc-a");
        assert_eq!(r.to_string(), "component:default/svc-a");
    }

    #[test]
    fn test_reference_keeps_explicit_namespace() {
        let mut entity = Entity::new("API", "payments");
        entity.metadata.namespace = Some("prod".to_string());
        assert_eq!(entity.reference().to_string(), "api:prod/payments");
    }

    #[test]
    fn test_empty_namespace_treated_as_absent() {
        let mut entity = Entity::new("Component", "svc-a");
        entity.metadata.namespace = Some(String::new());
        assert_eq!(entity.namespace(), "default");
    }

    #[test]
    fn test_reference_parse_round_trip() {
        let r: EntityRef = "component:prod/svc-a".parse().unwrap();
        assert_eq!(r, EntityRef::new("Component", "prod", "svc-a"));
        assert_eq!(r.to_string(), "component:prod/svc-a");
    }

    #[test]
    fn test_reference_parse_without_namespace() {
        let r: EntityRef = "api:gateway".parse().unwrap();
        assert_eq!(r.namespace(), "default");
        assert_eq!(r.name(), "gateway");
    }

    #[test]
    fn test_reference_parse_rejects_malformed() {
        assert!("no-colon".parse::<EntityRef>().is_err());
        assert!(":ns/name".parse::<EntityRef>().is_err());
        assert!("kind:ns/".parse::<EntityRef>().is_err());
    }

    #[test]
    fn test_envelope_serialization_layout() {
        let envelope = Envelope {
            entity: Entity::new("Component", "svc-a").with_spec("owner", "team-x"),
            location_key: Some("file:catalog.yaml".to_string()),
        };
        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["locationKey"], "file:catalog.yaml");
        assert_eq!(json["entity"]["spec"]["owner"], "team-x");
        // Unset optional metadata must not appear in the persisted form.
        assert!(json["entity"]["metadata"].get("uid").is_none());

        let back: Envelope = serde_json::from_value(json).unwrap();
        assert_eq!(back, envelope);
    }

    #[test]
    fn test_location_serializes_type_field() {
        let location = Location {
            id: "loc-1".to_string(),
            location_type: "url".to_string(),
            target: "https://example.com/catalog.yaml".to_string(),
        };
        let json = serde_json::to_value(&location).unwrap();
        assert_eq!(json["type"], "url");
        let back: Location = serde_json::from_value(json).unwrap();
        assert_eq!(back, location);
    }
}
