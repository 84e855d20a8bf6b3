use super::*;
use crate::reconcile::{Status, StatusCandidate, StatusSource};
use crate::topology::{EntityKind, Topology, TopologyEntry};
use chrono::{DateTime, TimeZone, Utc};
use serde_json::json;
use std::sync::Arc;
use std::thread;

fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).unwrap()
}

fn tile(id: &str, walls: &[&str], segments: &[&str]) -> TopologyEntry {
    TopologyEntry {
        id: id.to_string(),
        kind: EntityKind::Tile,
        walls: walls.iter().map(|s| s.to_string()).collect(),
        segments: segments.iter().map(|s| s.to_string()).collect(),
    }
}

fn create_store() -> EntityStore {
    let topology = Topology::from_entries(vec![
        tile("A01", &["West"], &["Seg1"]),
        tile("A02", &["West"], &["Seg2"]),
        tile("B01", &["East"], &["Seg1"]),
    ])
    .unwrap();
    EntityStore::from_topology(&topology)
}

#[test]
fn test_entities_created_from_topology() {
    let store = create_store();
    assert_eq!(store.len(), 3);

    let entity = store.get("A01").unwrap();
    assert_eq!(entity.kind, EntityKind::Tile);
    assert_eq!(entity.status.value, Status::Unknown);
    assert!(entity.status.observed_at.is_none());
    assert!(entity.fields.is_empty());
    assert!(entity.last_received.is_none());
    assert!(entity.walls.contains("West"));
    assert!(entity.segments.contains("Seg1"));
}

#[test]
fn test_merge_keeps_earlier_fields() {
    let store = create_store();

    store
        .merge("A01", EntityUpdate::new().with_field("cpuLoad", json!(50)), at(1))
        .unwrap();
    store
        .merge("A01", EntityUpdate::new().with_field("cpuTemp", json!(60)), at(2))
        .unwrap();

    let entity = store.get("A01").unwrap();
    assert_eq!(entity.fields.len(), 2);
    assert_eq!(entity.field("cpuLoad"), Some(&json!(50)));
    assert_eq!(entity.field("cpuTemp"), Some(&json!(60)));
    assert_eq!(entity.fields["cpuLoad"].observed_at, at(1));
    assert_eq!(entity.fields["cpuTemp"].observed_at, at(2));
}

#[test]
fn test_merge_overwrites_same_field() {
    let store = create_store();

    store
        .merge("A01", EntityUpdate::new().with_field("power", json!("5W")), at(1))
        .unwrap();
    store
        .merge("A01", EntityUpdate::new().with_field("power", json!("7W")), at(2))
        .unwrap();

    let entity = store.get("A01").unwrap();
    assert_eq!(entity.field("power"), Some(&json!("7W")));
    assert_eq!(entity.fields["power"].observed_at, at(2));
}

#[test]
fn test_stale_status_discarded() {
    let store = create_store();

    let first = store
        .merge(
            "A01",
            EntityUpdate::status_only(StatusCandidate::new(Status::Faulty, StatusSource::Telemetry)),
            at(100),
        )
        .unwrap();
    assert!(first.status_applied);

    let second = store
        .merge(
            "A01",
            EntityUpdate::status_only(StatusCandidate::new(Status::Working, StatusSource::Probe)),
            at(50),
        )
        .unwrap();
    assert!(!second.status_applied);

    let entity = store.get("A01").unwrap();
    assert_eq!(entity.status.value, Status::Faulty);
    assert_eq!(entity.status.observed_at, Some(at(100)));
    assert_eq!(entity.status.source, Some(StatusSource::Telemetry));
}

#[test]
fn test_stale_status_still_merges_fields() {
    let store = create_store();
    store
        .set_manual_status("A01", Status::Deactivated, at(100))
        .unwrap();

    let outcome = store
        .merge(
            "A01",
            EntityUpdate::new()
                .with_field("cpuLoad", json!(12))
                .with_status(StatusCandidate::new(Status::Working, StatusSource::Telemetry)),
            at(40),
        )
        .unwrap();

    assert_eq!(outcome.fields_updated, 1);
    assert!(!outcome.status_applied);

    let entity = store.get("A01").unwrap();
    assert_eq!(entity.status.value, Status::Deactivated);
    assert_eq!(entity.field("cpuLoad"), Some(&json!(12)));
}

#[test]
fn test_last_received_never_moves_backwards() {
    let store = create_store();

    store
        .merge("A01", EntityUpdate::new().with_field("x", json!(1)), at(100))
        .unwrap();
    store
        .merge("A01", EntityUpdate::new().with_field("y", json!(2)), at(50))
        .unwrap();

    assert_eq!(store.get("A01").unwrap().last_received, Some(at(100)));
}

#[test]
fn test_merge_unknown_entity_rejected() {
    let store = create_store();

    let result = store.merge("Z99", EntityUpdate::new().with_field("x", json!(1)), at(1));

    assert_eq!(result, Err(StoreError::NoSuchEntity("Z99".to_string())));
    assert!(store.get("Z99").is_none());
    assert_eq!(store.all().len(), 3);
    assert!(store.all().iter().all(|e| e.id != "Z99"));
}

#[test]
fn test_all_sorted_by_id() {
    let store = create_store();
    let ids: Vec<String> = store.all().into_iter().map(|e| e.id).collect();
    assert_eq!(ids, vec!["A01", "A02", "B01"]);
    assert_eq!(store.ids(), ids);
}

#[test]
fn test_group_indices() {
    let store = create_store();

    let walls = store.group_index(GroupType::Walls);
    assert_eq!(walls.keys().collect::<Vec<_>>(), vec!["East", "West"]);
    assert_eq!(walls["West"], vec!["A01".to_string(), "A02".to_string()]);

    let segments = store.group_index(GroupType::Segments);
    assert_eq!(segments["Seg1"], vec!["A01".to_string(), "B01".to_string()]);
    assert_eq!(segments["Seg2"], vec!["A02".to_string()]);
}

#[test]
fn test_merge_outcome_reports_what_applied() {
    let store = create_store();

    let outcome = store
        .merge(
            "B01",
            EntityUpdate::new()
                .with_field("cpuLoad", json!(3))
                .with_field("cpuTemp", json!(41))
                .with_status(StatusCandidate::new(Status::Working, StatusSource::Telemetry)),
            at(5),
        )
        .unwrap();
    assert_eq!(
        outcome,
        MergeOutcome {
            fields_updated: 2,
            status_applied: true,
        }
    );

    let stale = store
        .merge(
            "B01",
            EntityUpdate::status_only(StatusCandidate::new(Status::Faulty, StatusSource::Probe)),
            at(4),
        )
        .unwrap();
    assert_eq!(stale.fields_updated, 0);
    assert!(!stale.status_applied);
    assert_eq!(store.get("B01").unwrap().status.value, Status::Working);
}

#[test]
fn test_experiment_status() {
    let store = create_store();
    assert!(!store.experiment().active);

    store.set_experiment(ExperimentStatus {
        active: true,
        message: "beamforming run".to_string(),
        observed_at: Some(at(9)),
    });

    let experiment = store.experiment();
    assert!(experiment.active);
    assert_eq!(experiment.message, "beamforming run");
}

#[test]
fn test_concurrent_merges_distinct_entities() {
    let store = Arc::new(create_store());
    let mut handles = vec![];

    for (i, id) in ["A01", "A02", "B01"].into_iter().enumerate() {
        let store_clone = Arc::clone(&store);
        let handle = thread::spawn(move || {
            for n in 0..100 {
                store_clone
                    .merge(id, EntityUpdate::new().with_field("n", json!(n)), at(i as i64))
                    .unwrap();
            }
        });
        handles.push(handle);
    }

    for handle in handles {
        handle.join().unwrap();
    }

    for id in ["A01", "A02", "B01"] {
        assert_eq!(store.get(id).unwrap().field("n"), Some(&json!(99)));
    }
}

#[test]
fn test_concurrent_merges_same_entity() {
    let store = Arc::new(create_store());
    let mut handles = vec![];

    // 10 threads, each writing a different field of the same entity
    for i in 0..10 {
        let store_clone = Arc::clone(&store);
        let handle = thread::spawn(move || {
            let field = format!("field_{}", i);
            store_clone
                .merge("A01", EntityUpdate::new().with_field(field, json!(i)), at(i))
                .unwrap();
        });
        handles.push(handle);
    }

    for handle in handles {
        handle.join().unwrap();
    }

    let entity = store.get("A01").unwrap();
    assert_eq!(entity.fields.len(), 10);
    assert_eq!(entity.last_received, Some(at(9)));
}

#[test]
fn test_concurrent_status_updates_keep_newest() {
    let store = Arc::new(create_store());
    let mut handles = vec![];

    for i in 0..20 {
        let store_clone = Arc::clone(&store);
        let handle = thread::spawn(move || {
            let value = if i == 19 { Status::Faulty } else { Status::Working };
            store_clone
                .merge(
                    "A02",
                    EntityUpdate::status_only(StatusCandidate::new(value, StatusSource::Probe)),
                    at(i),
                )
                .unwrap();
        });
        handles.push(handle);
    }

    for handle in handles {
        handle.join().unwrap();
    }

    let entity = store.get("A02").unwrap();
    assert_eq!(entity.status.value, Status::Faulty);
    assert_eq!(entity.status.observed_at, Some(at(19)));
}
