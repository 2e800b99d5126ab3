//! # entity-catalog
//!
//! An in-process, indexed object store for structured "entity" records. The
//! store answers filtered/sorted/paginated queries, computes value-frequency
//! facets, and persists its full state to a single snapshot file on a
//! debounced schedule.
//!
//! ## Core Concepts
//!
//! - **Entity**: a structured record, `kind` + `metadata` + open `spec`
//! - **Reference**: the canonical identity `lowercase(kind):namespace/name`
//! - **Envelope**: an entity paired with its originating location key, the
//!   unit actually indexed and persisted
//! - **Location**: a descriptor of the external source that produced a set
//!   of entities
//! - **Facet**: a value-frequency breakdown across a dotted field path
//!
//! ## Usage
//!
//! ```
//! use entity_catalog::{CatalogStore, Entity, QuerySpec, SortField};
//!
//! let store = CatalogStore::in_memory();
//! store
//!     .upsert(
//!         Entity::new("Component", "svc-a")
//!             .with_spec("owner", "team-x")
//!             .with_spec("lifecycle", "production"),
//!         None,
//!     )
//!     .unwrap();
//!
//! let spec = QuerySpec::new()
//!     .with_raw_filter("spec.owner=team-x")
//!     .unwrap()
//!     .with_sort(SortField::asc("metadata.name"));
//! let page = store.query(&spec).unwrap();
//! assert_eq!(page.total_items, 1);
//! ```
//!
//! The store is designed for single-owner, cooperative access: hosts that
//! embed it in a multi-task runtime serialize their own calls. The only
//! background activity is the debounced snapshot flush.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod entity;
pub mod error;
pub mod facet;
pub mod field;
pub mod query;
pub mod store;

mod snapshot;

// Re-export primary types at crate root for convenience
pub use entity::{Entity, EntityMeta, EntityRef, Envelope, Location, DEFAULT_NAMESPACE};
pub use error::CatalogError;
pub use facet::FacetBucket;
pub use field::FieldValue;
pub use query::{
    Filter, FilterOp, PageInfo, QueryResponse, QuerySpec, SortField, SortOrder, DEFAULT_LIMIT,
};
pub use store::{CatalogStore, StoreConfig, StoreStatus};
