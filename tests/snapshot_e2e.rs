//! End-to-end persistence tests: snapshot round-trips, tolerant startup,
//! debounce behavior, and flush-failure handling.

use std::fs;
use std::time::Duration;

use entity_catalog::{CatalogStore, Entity, QuerySpec, StoreConfig};

fn component(name: &str, owner: &str) -> Entity {
    Entity::new("Component", name).with_spec("owner", owner)
}

#[test]
fn snapshot_round_trip_reproduces_state_field_for_field() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("catalog.json");

    let store = CatalogStore::open(StoreConfig::persistent(&path));
    let location = store.add_location("file", "./catalog.yaml").unwrap();

    let mut rich = Entity::new("Component", "svc-a").with_spec("owner", "team-x");
    rich.metadata.namespace = Some("prod".to_string());
    rich.metadata.title = Some("Service A".to_string());
    rich.metadata.tags = vec!["java".to_string(), "backend".to_string()];
    rich.metadata
        .labels
        .insert("tier".to_string(), "1".to_string());
    rich.metadata
        .annotations
        .insert("origin".to_string(), "sync".to_string());

    store.upsert(rich, Some(&location.id)).unwrap();
    store.upsert(component("svc-b", "team-y"), None).unwrap();
    store.flush_now().unwrap();

    let reopened = CatalogStore::open(StoreConfig::persistent(&path));
    assert_eq!(
        reopened.all_entities().unwrap(),
        store.all_entities().unwrap()
    );
    assert_eq!(reopened.locations().unwrap(), store.locations().unwrap());

    // uid and etag survive the round trip and the uid index is rebuilt.
    let original = store
        .get_by_name("component", "prod", "svc-a")
        .unwrap()
        .unwrap();
    let restored = reopened
        .get_by_name("component", "prod", "svc-a")
        .unwrap()
        .unwrap();
    assert_eq!(restored.metadata.uid, original.metadata.uid);
    assert_eq!(restored.metadata.etag, original.metadata.etag);
    assert!(reopened
        .get_by_uid(original.metadata.uid.as_deref().unwrap())
        .unwrap()
        .is_some());
}

#[test]
fn snapshot_file_is_human_readable_json() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("catalog.json");

    let store = CatalogStore::open(StoreConfig::persistent(&path));
    store
        .upsert(component("svc-a", "team-x"), Some("source-a"))
        .unwrap();
    store.add_location("url", "https://x/catalog.yaml").unwrap();
    store.flush_now().unwrap();

    let raw = fs::read_to_string(&path).unwrap();
    let doc: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert!(doc["savedAt"].is_string());
    assert_eq!(doc["entities"].as_array().unwrap().len(), 1);
    assert_eq!(doc["entities"][0]["locationKey"], "source-a");
    assert_eq!(doc["locations"].as_array().unwrap().len(), 1);
    // Pretty-printed, not a single line.
    assert!(raw.lines().count() > 1);
}

#[test]
fn missing_snapshot_file_starts_empty() {
    let dir = tempfile::tempdir().unwrap();
    let store = CatalogStore::open(StoreConfig::persistent(dir.path().join("absent.json")));
    assert!(store.all_entities().unwrap().is_empty());
    assert!(store.locations().unwrap().is_empty());
}

#[test]
fn corrupt_snapshot_is_not_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("catalog.json");
    fs::write(&path, "definitely { not json").unwrap();

    let store = CatalogStore::open(StoreConfig::persistent(&path));
    assert!(store.all_entities().unwrap().is_empty());

    // The store is fully usable and the next flush replaces the bad file.
    store.upsert(component("svc-a", "team-x"), None).unwrap();
    store.flush_now().unwrap();

    let reopened = CatalogStore::open(StoreConfig::persistent(&path));
    assert_eq!(reopened.all_entities().unwrap().len(), 1);
}

#[test]
fn debounce_collapses_bursty_mutations_into_one_write() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("catalog.json");

    let store = CatalogStore::open(
        StoreConfig::persistent(&path).with_flush_delay(Duration::from_millis(500)),
    );
    for i in 0..10 {
        store
            .upsert(component(&format!("svc-{i}"), "team-x"), None)
            .unwrap();
    }

    // Mutations never write synchronously; the window is still open.
    assert!(!path.exists());

    std::thread::sleep(Duration::from_millis(1500));
    let doc: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(doc["entities"].as_array().unwrap().len(), 10);

    assert!(!store.status().unwrap().dirty);
}

#[test]
fn close_performs_a_final_flush_before_the_window_elapses() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("catalog.json");

    let store = CatalogStore::open(
        StoreConfig::persistent(&path).with_flush_delay(Duration::from_secs(60)),
    );
    store.upsert(component("svc-a", "team-x"), None).unwrap();
    store.close().unwrap();

    let reopened = CatalogStore::open(StoreConfig::persistent(&path));
    assert_eq!(reopened.all_entities().unwrap().len(), 1);
}

#[test]
fn dropping_without_close_loses_only_the_unflushed_delta() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("catalog.json");

    {
        let store = CatalogStore::open(
            StoreConfig::persistent(&path).with_flush_delay(Duration::from_secs(60)),
        );
        store.upsert(component("flushed", "team-x"), None).unwrap();
        store.flush_now().unwrap();
        store.upsert(component("unflushed", "team-x"), None).unwrap();
        // Dropped with the debounce window still open.
    }

    let reopened = CatalogStore::open(StoreConfig::persistent(&path));
    let names: Vec<String> = reopened
        .all_entities()
        .unwrap()
        .into_iter()
        .map(|e| e.metadata.name)
        .collect();
    assert_eq!(names, vec!["flushed".to_string()]);
}

#[test]
fn write_failure_keeps_store_usable_and_dirty() {
    let dir = tempfile::tempdir().unwrap();
    // A regular file where a parent directory is needed makes every write fail.
    let blocker = dir.path().join("blocker");
    fs::write(&blocker, "in the way").unwrap();
    let path = blocker.join("catalog.json");

    let store = CatalogStore::open(
        StoreConfig::persistent(&path).with_flush_delay(Duration::from_secs(60)),
    );
    store.upsert(component("svc-a", "team-x"), None).unwrap();

    assert!(store.flush_now().is_err());

    // The in-memory state stays authoritative and the failure is observable.
    let status = store.status().unwrap();
    assert!(status.dirty);
    assert!(status.last_flush_error.is_some());

    let page = store.query(&QuerySpec::new()).unwrap();
    assert_eq!(page.total_items, 1);
    store.upsert(component("svc-b", "team-y"), None).unwrap();
    assert_eq!(store.all_entities().unwrap().len(), 2);
}

#[test]
fn remove_and_remove_by_location_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("catalog.json");

    let store = CatalogStore::open(StoreConfig::persistent(&path));
    let kept = store.upsert(component("kept", "team-x"), None).unwrap();
    store
        .upsert(component("synced-1", "team-x"), Some("source-a"))
        .unwrap();
    store
        .upsert(component("synced-2", "team-x"), Some("source-a"))
        .unwrap();
    let doomed = store.upsert(component("doomed", "team-x"), None).unwrap();

    assert_eq!(store.remove_by_location("source-a").unwrap(), 2);
    assert!(store.remove(&doomed.reference()).unwrap());
    store.flush_now().unwrap();

    let reopened = CatalogStore::open(StoreConfig::persistent(&path));
    let entities = reopened.all_entities().unwrap();
    assert_eq!(entities.len(), 1);
    assert_eq!(entities[0].metadata.uid, kept.metadata.uid);
}
