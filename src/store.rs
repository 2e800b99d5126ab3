//! The catalog store: indices, mutation, and flush scheduling.
//!
//! One [`CatalogStore`] owns the canonical envelope set plus its lookup
//! indices, scoped to the instance so independent stores (e.g. in tests)
//! never share state. All operations are synchronous; the only background
//! activity is the debounced snapshot flush, which a mutation arms and a
//! later mutation re-arms. The internal lock exists so the flush thread can
//! read a consistent state, not as a multi-writer contract — hosts serialize
//! their own access.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::thread::JoinHandle;
use std::time::Duration;

use chrono::Utc;
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entity::{Entity, EntityRef, Envelope, Location};
use crate::error::CatalogError;
use crate::facet::{self, FacetBucket};
use crate::query::{self, QueryResponse, QuerySpec};
use crate::snapshot::{self, Snapshot};

fn lock_err(context: &'static str) -> CatalogError {
    CatalogError::Internal(format!("poisoned lock: {context}"))
}

/// Construction-time options for a [`CatalogStore`].
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Snapshot file path. `None` runs the store purely in memory with no
    /// filesystem access at all.
    pub snapshot_path: Option<PathBuf>,

    /// How long a mutation burst may extend before the snapshot is written.
    pub flush_delay: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            snapshot_path: None,
            flush_delay: Duration::from_secs(1),
        }
    }
}

impl StoreConfig {
    /// Config persisting to the given snapshot file.
    #[must_use]
    pub fn persistent(path: impl Into<PathBuf>) -> Self {
        Self {
            snapshot_path: Some(path.into()),
            ..Self::default()
        }
    }

    /// Overrides the debounce window.
    #[must_use]
    pub fn with_flush_delay(mut self, delay: Duration) -> Self {
        self.flush_delay = delay;
        self
    }
}

/// Flush health, answering whether unpersisted state exists and why the last
/// write failed, if it did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStatus {
    /// True while mutations await a successful flush.
    pub dirty: bool,
    /// Message of the most recent failed flush, cleared on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_flush_error: Option<String>,
}

#[derive(Debug, Default)]
struct CatalogState {
    by_ref: BTreeMap<EntityRef, Envelope>,
    by_uid: HashMap<String, EntityRef>,
    locations: BTreeMap<String, Location>,
    dirty: bool,
    last_flush_error: Option<String>,
}

impl CatalogState {
    fn restore(snapshot: Snapshot) -> Self {
        let mut state = Self::default();
        for envelope in snapshot.entities {
            let reference = envelope.entity.reference();
            if let Some(uid) = envelope.entity.metadata.uid.clone() {
                state.by_uid.insert(uid, reference.clone());
            }
            state.by_ref.insert(reference, envelope);
        }
        for location in snapshot.locations {
            state.locations.insert(location.id.clone(), location);
        }
        state
    }

    fn to_snapshot(&self) -> Snapshot {
        Snapshot {
            saved_at: Some(Utc::now()),
            entities: self.by_ref.values().cloned().collect(),
            locations: self.locations.values().cloned().collect(),
        }
    }
}

/// Builds the snapshot under the write lock, then performs the file write
/// outside it. On failure the dirty flag is restored so the next flush
/// retries, and the error is recorded for [`CatalogStore::status`].
fn write_state(
    state: &RwLock<CatalogState>,
    path: &Path,
    force: bool,
) -> Result<(), CatalogError> {
    let document = {
        let mut guard = state.write().map_err(|_| lock_err("store.flush"))?;
        if !force && !guard.dirty {
            return Ok(());
        }
        guard.dirty = false;
        guard.to_snapshot()
    };

    match snapshot::write(path, &document) {
        Ok(()) => {
            if let Ok(mut guard) = state.write() {
                guard.last_flush_error = None;
            }
            tracing::debug!(
                path = %path.display(),
                entities = document.entities.len(),
                locations = document.locations.len(),
                "snapshot flushed"
            );
            Ok(())
        }
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "snapshot write failed");
            if let Ok(mut guard) = state.write() {
                guard.dirty = true;
                guard.last_flush_error = Some(err.to_string());
            }
            Err(err)
        }
    }
}

enum FlushMsg {
    Arm,
    Shutdown,
}

/// Handle to the background debounce thread. Each `Arm` restarts the delay
/// window; only an undisturbed timeout writes the snapshot, so a burst of
/// mutations collapses into one write.
struct Flusher {
    tx: Sender<FlushMsg>,
    handle: Option<JoinHandle<()>>,
}

impl Flusher {
    fn spawn(state: Arc<RwLock<CatalogState>>, path: PathBuf, delay: Duration) -> Self {
        let (tx, rx) = unbounded();
        let handle = std::thread::spawn(move || Self::run(&state, &path, delay, &rx));
        Self {
            tx,
            handle: Some(handle),
        }
    }

    fn run(state: &RwLock<CatalogState>, path: &Path, delay: Duration, rx: &Receiver<FlushMsg>) {
        loop {
            // Idle until the first arm.
            match rx.recv() {
                Ok(FlushMsg::Arm) => {}
                Ok(FlushMsg::Shutdown) | Err(_) => return,
            }
            // Debounce window: every further arm restarts the wait.
            loop {
                match rx.recv_timeout(delay) {
                    Ok(FlushMsg::Arm) => {}
                    Ok(FlushMsg::Shutdown) => return,
                    Err(RecvTimeoutError::Timeout) => {
                        // Failures are logged and recorded by write_state;
                        // the dirty flag stays set for the next attempt.
                        let _ = write_state(state, path, false);
                        break;
                    }
                    Err(RecvTimeoutError::Disconnected) => return,
                }
            }
        }
    }

    fn arm(&self) {
        let _ = self.tx.send(FlushMsg::Arm);
    }

    fn shutdown(mut self) {
        let _ = self.tx.send(FlushMsg::Shutdown);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// In-process indexed entity catalog.
///
/// # Examples
///
/// ```
/// use entity_catalog::{CatalogStore, Entity, QuerySpec};
///
/// let store = CatalogStore::in_memory();
/// store
///     .upsert(
///         Entity::new("Component", "svc-a").with_spec("owner", "team-x"),
///         None,
///     )
///     .unwrap();
///
/// let spec = QuerySpec::new().with_raw_filter("spec.owner=team-x").unwrap();
/// let page = store.query(&spec).unwrap();
/// assert_eq!(page.total_items, 1);
/// ```
pub struct CatalogStore {
    state: Arc<RwLock<CatalogState>>,
    snapshot_path: Option<PathBuf>,
    flusher: Option<Flusher>,
}

impl CatalogStore {
    /// Opens a store with the given configuration, loading the snapshot if
    /// one exists.
    ///
    /// A missing snapshot file means an empty store. An unreadable or
    /// unparsable snapshot is logged and likewise treated as empty: startup
    /// is never fatal on a bad snapshot.
    #[must_use]
    pub fn open(config: StoreConfig) -> Self {
        let mut state = CatalogState::default();
        if let Some(path) = &config.snapshot_path {
            match snapshot::read(path) {
                Ok(Some(document)) => {
                    state = CatalogState::restore(document);
                    tracing::debug!(
                        path = %path.display(),
                        entities = state.by_ref.len(),
                        "snapshot loaded"
                    );
                }
                Ok(None) => {
                    tracing::debug!(path = %path.display(), "no snapshot found, starting empty");
                }
                Err(err) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %err,
                        "snapshot unreadable, starting empty"
                    );
                }
            }
        }

        let state = Arc::new(RwLock::new(state));
        let flusher = config
            .snapshot_path
            .clone()
            .map(|path| Flusher::spawn(Arc::clone(&state), path, config.flush_delay));

        Self {
            state,
            snapshot_path: config.snapshot_path,
            flusher,
        }
    }

    /// A store with no persistence target. Never touches the filesystem.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::open(StoreConfig::default())
    }

    /// Inserts or replaces the entity at its canonical reference.
    ///
    /// The namespace is defaulted, a `uid` is carried over from any entity
    /// previously at the reference (unless the caller supplies one), and a
    /// fresh `etag` is assigned unconditionally. Returns the finalized
    /// entity with all generated fields populated.
    ///
    /// # Errors
    ///
    /// [`CatalogError::MissingField`] when `kind` or `metadata.name` is
    /// empty; nothing is indexed in that case.
    pub fn upsert(
        &self,
        mut entity: Entity,
        location_key: Option<&str>,
    ) -> Result<Entity, CatalogError> {
        if entity.kind.trim().is_empty() {
            return Err(CatalogError::MissingField { field: "kind" });
        }
        if entity.metadata.name.trim().is_empty() {
            return Err(CatalogError::MissingField {
                field: "metadata.name",
            });
        }

        entity.metadata.namespace = Some(entity.namespace().to_string());
        let reference = entity.reference();

        let mut guard = self.state.write().map_err(|_| lock_err("store.upsert"))?;

        let previous_uid = guard
            .by_ref
            .get(&reference)
            .and_then(|env| env.entity.metadata.uid.clone());

        let uid = entity
            .metadata
            .uid
            .clone()
            .filter(|uid| !uid.is_empty())
            .or(previous_uid.clone())
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        entity.metadata.uid = Some(uid.clone());
        entity.metadata.etag = Some(Uuid::new_v4().simple().to_string());

        // Replacing an envelope whose uid differs must evict the stale uid
        // index entry, or a dead uid would keep resolving.
        if let Some(old_uid) = previous_uid {
            if old_uid != uid {
                guard.by_uid.remove(&old_uid);
            }
        }

        guard.by_uid.insert(uid, reference.clone());
        guard.by_ref.insert(
            reference,
            Envelope {
                entity: entity.clone(),
                location_key: location_key.map(str::to_string),
            },
        );
        self.mark_dirty(&mut guard);
        drop(guard);

        self.arm_flush();
        Ok(entity)
    }

    /// Removes the entity at the reference. Returns whether anything was
    /// removed; removing an unknown reference is not an error.
    pub fn remove(&self, reference: &EntityRef) -> Result<bool, CatalogError> {
        let mut guard = self.state.write().map_err(|_| lock_err("store.remove"))?;
        let Some(envelope) = guard.by_ref.remove(reference) else {
            return Ok(false);
        };
        if let Some(uid) = &envelope.entity.metadata.uid {
            guard.by_uid.remove(uid);
        }
        self.mark_dirty(&mut guard);
        drop(guard);

        self.arm_flush();
        Ok(true)
    }

    /// Bulk-removes every entity produced by the given location key and
    /// returns the count. Used when a sync source reports a smaller entity
    /// set and orphans must be purged.
    pub fn remove_by_location(&self, location_key: &str) -> Result<usize, CatalogError> {
        let mut guard = self
            .state
            .write()
            .map_err(|_| lock_err("store.remove_by_location"))?;

        let doomed: Vec<EntityRef> = guard
            .by_ref
            .iter()
            .filter(|(_, env)| env.location_key.as_deref() == Some(location_key))
            .map(|(reference, _)| reference.clone())
            .collect();

        for reference in &doomed {
            if let Some(envelope) = guard.by_ref.remove(reference) {
                if let Some(uid) = &envelope.entity.metadata.uid {
                    guard.by_uid.remove(uid);
                }
            }
        }

        if !doomed.is_empty() {
            self.mark_dirty(&mut guard);
        }
        drop(guard);

        // Arm regardless of count; a clean state makes the flush a no-op.
        self.arm_flush();
        Ok(doomed.len())
    }

    /// O(1) lookup by canonical reference.
    pub fn get_by_ref(&self, reference: &EntityRef) -> Result<Option<Entity>, CatalogError> {
        let guard = self.state.read().map_err(|_| lock_err("store.get_by_ref"))?;
        Ok(guard.by_ref.get(reference).map(|env| env.entity.clone()))
    }

    /// O(1) lookup by store-assigned uid.
    pub fn get_by_uid(&self, uid: &str) -> Result<Option<Entity>, CatalogError> {
        let guard = self.state.read().map_err(|_| lock_err("store.get_by_uid"))?;
        Ok(guard
            .by_uid
            .get(uid)
            .and_then(|reference| guard.by_ref.get(reference))
            .map(|env| env.entity.clone()))
    }

    /// O(1) lookup by identity parts.
    pub fn get_by_name(
        &self,
        kind: &str,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Entity>, CatalogError> {
        self.get_by_ref(&EntityRef::new(kind, namespace, name))
    }

    /// Full snapshot of the current entity set, in reference order. This is
    /// the bulk-read boundary for external indexers.
    pub fn all_entities(&self) -> Result<Vec<Entity>, CatalogError> {
        let guard = self
            .state
            .read()
            .map_err(|_| lock_err("store.all_entities"))?;
        Ok(guard.by_ref.values().map(|env| env.entity.clone()).collect())
    }

    /// Evaluates a filtered, sorted, paginated query.
    pub fn query(&self, spec: &QuerySpec) -> Result<QueryResponse, CatalogError> {
        let guard = self.state.read().map_err(|_| lock_err("store.query"))?;
        Ok(query::evaluate(
            guard.by_ref.values().map(|env| &env.entity),
            spec,
        ))
    }

    /// Computes value-frequency facets for the requested fields.
    pub fn facets<S: AsRef<str>>(
        &self,
        fields: &[S],
    ) -> Result<BTreeMap<String, Vec<FacetBucket>>, CatalogError> {
        let guard = self.state.read().map_err(|_| lock_err("store.facets"))?;
        Ok(facet::compute(
            guard.by_ref.values().map(|env| &env.entity),
            fields,
        ))
    }

    /// Registers a location and returns it with its assigned id.
    pub fn add_location(
        &self,
        location_type: &str,
        target: &str,
    ) -> Result<Location, CatalogError> {
        let location = Location {
            id: Uuid::new_v4().to_string(),
            location_type: location_type.to_string(),
            target: target.to_string(),
        };

        let mut guard = self
            .state
            .write()
            .map_err(|_| lock_err("store.add_location"))?;
        guard.locations.insert(location.id.clone(), location.clone());
        self.mark_dirty(&mut guard);
        drop(guard);

        self.arm_flush();
        Ok(location)
    }

    /// Looks up a location by id.
    pub fn get_location(&self, id: &str) -> Result<Option<Location>, CatalogError> {
        let guard = self
            .state
            .read()
            .map_err(|_| lock_err("store.get_location"))?;
        Ok(guard.locations.get(id).cloned())
    }

    /// All registered locations, in id order.
    pub fn locations(&self) -> Result<Vec<Location>, CatalogError> {
        let guard = self.state.read().map_err(|_| lock_err("store.locations"))?;
        Ok(guard.locations.values().cloned().collect())
    }

    /// Removes a location by id. Entities carrying its key are untouched; a
    /// dangling location key is permitted.
    pub fn remove_location(&self, id: &str) -> Result<bool, CatalogError> {
        let mut guard = self
            .state
            .write()
            .map_err(|_| lock_err("store.remove_location"))?;
        let removed = guard.locations.remove(id).is_some();
        if removed {
            self.mark_dirty(&mut guard);
        }
        drop(guard);

        if removed {
            self.arm_flush();
        }
        Ok(removed)
    }

    /// Current flush health.
    pub fn status(&self) -> Result<StoreStatus, CatalogError> {
        let guard = self.state.read().map_err(|_| lock_err("store.status"))?;
        Ok(StoreStatus {
            dirty: guard.dirty,
            last_flush_error: guard.last_flush_error.clone(),
        })
    }

    /// Writes the snapshot immediately on the caller's thread, regardless of
    /// the debounce window. A no-op without a persistence target.
    ///
    /// # Errors
    ///
    /// Propagates the write failure; the store stays usable and dirty.
    pub fn flush_now(&self) -> Result<(), CatalogError> {
        match &self.snapshot_path {
            Some(path) => write_state(&self.state, path, true),
            None => Ok(()),
        }
    }

    /// Stops the flush thread and performs one final synchronous flush.
    ///
    /// # Errors
    ///
    /// Propagates the final write failure after the flusher has stopped.
    pub fn close(mut self) -> Result<(), CatalogError> {
        if let Some(flusher) = self.flusher.take() {
            flusher.shutdown();
        }
        self.flush_now()
    }

    fn mark_dirty(&self, guard: &mut CatalogState) {
        // In-memory stores have nothing to flush and never report dirty.
        if self.snapshot_path.is_some() {
            guard.dirty = true;
        }
    }

    fn arm_flush(&self) {
        if let Some(flusher) = &self.flusher {
            flusher.arm();
        }
    }
}

impl Drop for CatalogStore {
    fn drop(&mut self) {
        // Dropping without close() stops the thread but skips the final
        // flush; unpersisted deltas are lost, matching the crash contract.
        if let Some(flusher) = self.flusher.take() {
            flusher.shutdown();
        }
    }
}
