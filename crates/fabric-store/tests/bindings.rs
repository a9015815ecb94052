//! Binding table behavior against a real SQLite file.

use fabric_store::{BindingStore, Database, DatabaseConfig};
use fabric_types::{SegmentId, VlanId};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

async fn open_store() -> (TempDir, BindingStore) {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::connect(&DatabaseConfig::with_path(dir.path().join("fabric.db")))
        .await
        .unwrap();
    (dir, BindingStore::new(db))
}

fn vlan(id: u32) -> VlanId {
    VlanId::new(id).unwrap()
}

fn seg(id: u32) -> SegmentId {
    SegmentId::new(id).unwrap()
}

#[tokio::test]
async fn test_upsert_is_idempotent() {
    let (_dir, store) = open_store().await;

    assert!(store
        .upsert_l2("10.0.0.1", "subnet-a", vlan(100), seg(10000))
        .await
        .unwrap());
    // Second port of the same subnet on the same switch shares the row
    assert!(!store
        .upsert_l2("10.0.0.1", "subnet-a", vlan(101), seg(10001))
        .await
        .unwrap());

    let bindings = store.list().await.unwrap();
    assert_eq!(bindings.len(), 1);
    assert_eq!(bindings[0].vlan_id, vlan(100));
    assert_eq!(bindings[0].l2_segment_id, seg(10000));
    assert!(!bindings[0].is_l2_configured);
    assert_eq!(bindings[0].router_id, None);
}

#[tokio::test]
async fn test_concurrent_upserts_create_one_row() {
    let (_dir, store) = open_store().await;

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let store = store.clone();
        tasks.push(tokio::spawn(async move {
            store
                .upsert_l2("10.0.0.1", "subnet-a", vlan(100), seg(10000))
                .await
                .unwrap()
        }));
    }
    let mut created = 0;
    for task in tasks {
        if task.await.unwrap() {
            created += 1;
        }
    }
    assert_eq!(created, 1);
    assert_eq!(store.list().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_mark_l2_configured_flips_once() {
    let (_dir, store) = open_store().await;
    store
        .upsert_l2("10.0.0.1", "subnet-a", vlan(100), seg(10000))
        .await
        .unwrap();

    assert!(store.mark_l2_configured("10.0.0.1", "subnet-a").await.unwrap());
    assert!(!store.mark_l2_configured("10.0.0.1", "subnet-a").await.unwrap());
    let binding = store.get("10.0.0.1", "subnet-a").await.unwrap().unwrap();
    assert!(binding.is_l2_configured);

    // Unknown binding
    assert!(!store.mark_l2_configured("10.0.0.9", "subnet-a").await.unwrap());
}

#[tokio::test]
async fn test_attach_and_detach_router() {
    let (_dir, store) = open_store().await;
    store
        .upsert_l2("10.0.0.1", "subnet-a", vlan(100), seg(10000))
        .await
        .unwrap();

    assert!(store
        .attach_router("10.0.0.1", "subnet-a", "router-1", seg(100))
        .await
        .unwrap());
    let binding = store.get("10.0.0.1", "subnet-a").await.unwrap().unwrap();
    assert!(binding.is_attached_to("router-1"));
    assert_eq!(binding.l3_segment_id, Some(seg(100)));

    assert_eq!(
        store
            .router_bindings_on_switch("10.0.0.1", "router-1")
            .await
            .unwrap()
            .len(),
        1
    );

    assert!(store.detach_router("10.0.0.1", "subnet-a").await.unwrap());
    let binding = store.get("10.0.0.1", "subnet-a").await.unwrap().unwrap();
    assert_eq!(binding.router_id, None);
    assert_eq!(binding.l3_segment_id, None);
    assert!(store
        .router_bindings_on_switch("10.0.0.1", "router-1")
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_find_by_switch_and_remove() {
    let (_dir, store) = open_store().await;
    store
        .upsert_l2("10.0.0.2", "subnet-a", vlan(100), seg(10000))
        .await
        .unwrap();
    store
        .upsert_l2("10.0.0.1", "subnet-a", vlan(100), seg(10000))
        .await
        .unwrap();
    store
        .upsert_l2("10.0.0.1", "subnet-b", vlan(200), seg(10001))
        .await
        .unwrap();

    let switches: Vec<String> = store
        .find_by_switch("subnet-a")
        .await
        .unwrap()
        .into_iter()
        .map(|b| b.switch_ip)
        .collect();
    assert_eq!(switches, vec!["10.0.0.1", "10.0.0.2"]);

    assert!(store.remove_if_unused("10.0.0.1", "subnet-a").await.unwrap());
    assert!(!store.remove_if_unused("10.0.0.1", "subnet-a").await.unwrap());
    assert_eq!(store.find_by_switch("subnet-a").await.unwrap().len(), 1);
    assert_eq!(store.find_by_switch("subnet-b").await.unwrap().len(), 1);
}
