//! Overlay and external network segments.

mod common;

use common::*;
use fabric_types::{SegmentId, SegmentType};
use fabricsyncd::{NetworkSegment, SyncError};
use pretty_assertions::assert_eq;

fn external(physnet: Option<&str>, segmentation_id: Option<u32>) -> NetworkSegment {
    NetworkSegment {
        network_id: "ext".to_string(),
        segment_type: SegmentType::ExternalNet,
        physical_network: physnet.map(str::to_string),
        segmentation_id,
    }
}

#[tokio::test]
async fn test_tenant_segments_come_from_l2_pool() {
    let h = harness().await;
    let driver = &h.sync.segments;

    let id = driver.allocate_tenant_segment("n1").await.unwrap();
    assert!((10000..=10009).contains(&id.as_u32()));
    assert_eq!(driver.allocate_tenant_segment("n1").await.unwrap(), id);

    assert!(driver.release_segment("n1", id).await.unwrap());
    assert_eq!(h.sync.stores.l2.find_by_owner("n1").await.unwrap(), None);
}

#[tokio::test]
async fn test_provider_segment_reservation() {
    let h = harness().await;
    let driver = &h.sync.segments;

    let id = driver
        .reserve_provider_segment("n1", Some(10005))
        .await
        .unwrap();
    assert_eq!(id, SegmentId::new(10005).unwrap());
    assert_eq!(h.sync.stores.l2.find_by_owner("n1").await.unwrap(), Some(id));

    assert!(matches!(
        driver.reserve_provider_segment("n2", Some(10005)).await,
        Err(SyncError::Conflict { .. })
    ));
    assert!(matches!(
        driver.reserve_provider_segment("n3", Some(100)).await,
        Err(SyncError::InvalidSegment { .. })
    ));

    // Outside the configured ranges but within the overlay space
    let outside = driver
        .reserve_provider_segment("n4", Some(50000))
        .await
        .unwrap();
    assert!(driver.release_segment("n4", outside).await.unwrap());
    assert_eq!(h.sync.stores.l2.stats().await.unwrap().total, 10);

    let any = driver.reserve_provider_segment("n5", None).await.unwrap();
    assert!((10000..=10009).contains(&any.as_u32()));
}

#[tokio::test]
async fn test_external_segment_validation() {
    let config = format!(
        "{}\n[external_networks]\nallowed_physnets = [\"P\"]\n",
        CONFIG
    );
    let h = harness_with(&config, FakeOrchestrator::default()).await;
    let driver = &h.sync.segments;

    driver.validate_external_segment(&external(Some("P"), None)).unwrap();
    assert!(driver
        .validate_external_segment(&external(None, None))
        .is_err());
    assert!(driver
        .validate_external_segment(&external(Some("Q"), None))
        .is_err());
    assert!(driver
        .validate_external_segment(&external(Some("P"), Some(7)))
        .is_err());

    let mut overlay = external(Some("P"), None);
    overlay.segment_type = SegmentType::TenantOverlay;
    assert!(driver.validate_external_segment(&overlay).is_err());
}

#[tokio::test]
async fn test_any_physnet_when_unrestricted() {
    let h = harness().await;
    h.sync
        .segments
        .validate_external_segment(&external(Some("anything"), None))
        .unwrap();
}
