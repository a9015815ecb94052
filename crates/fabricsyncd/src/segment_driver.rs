//! Overlay and external network segment types.

use fabric_store::SegmentAllocator;
use fabric_types::{PoolBounds, SegmentId, SegmentType};
use tracing::info;

use crate::error::{SyncError, SyncResult};
use crate::orchestrator::NetworkSegment;

/// Segment handling for tenant overlay and external networks.
///
/// Tenant overlay networks draw their segment from the L2 pool, owned by
/// the network id. External networks carry no segment id; they are only
/// validated.
pub struct OverlaySegmentDriver {
    l2: SegmentAllocator,
    allowed_external_physnets: Vec<String>,
}

impl OverlaySegmentDriver {
    pub fn new(l2: SegmentAllocator, allowed_external_physnets: Vec<String>) -> Self {
        Self {
            l2,
            allowed_external_physnets,
        }
    }

    /// Allocates a segment for a tenant network.
    pub async fn allocate_tenant_segment(&self, network_id: &str) -> SyncResult<SegmentId> {
        let id = self.l2.allocate(network_id).await?;
        info!("Allocated segment {} for network {}", id, network_id);
        Ok(id)
    }

    /// Claims the requested segment of a provider network, or any free one
    /// if none was requested.
    pub async fn reserve_provider_segment(
        &self,
        network_id: &str,
        segmentation_id: Option<u32>,
    ) -> SyncResult<SegmentId> {
        let Some(requested) = segmentation_id else {
            return self.allocate_tenant_segment(network_id).await;
        };

        let bounds = PoolBounds::L2_SEGMENT;
        if requested < bounds.min || requested > bounds.max {
            return Err(SyncError::invalid_segment(format!(
                "segmentation id {} outside {}:{}",
                requested, bounds.min, bounds.max
            )));
        }
        let id = SegmentId::new(requested).map_err(|e| SyncError::invalid_segment(e.to_string()))?;
        self.l2.reserve(id, network_id).await?;
        info!("Reserved segment {} for network {}", id, network_id);
        Ok(id)
    }

    /// Returns a network's segment to the pool. Returns false if the
    /// segment was not allocated.
    pub async fn release_segment(&self, network_id: &str, id: SegmentId) -> SyncResult<bool> {
        let released = self.l2.release_id(id).await?;
        if released {
            info!("Released segment {} of network {}", id, network_id);
        }
        Ok(released)
    }

    /// Checks an external network's provider attributes.
    pub fn validate_external_segment(&self, segment: &NetworkSegment) -> SyncResult<()> {
        if segment.segment_type != SegmentType::ExternalNet {
            return Err(SyncError::invalid_segment(format!(
                "{} is not an external network segment",
                segment.segment_type
            )));
        }
        let physnet = match segment.physical_network.as_deref() {
            Some(p) if !p.is_empty() => p,
            _ => {
                return Err(SyncError::invalid_segment(
                    "physical_network required for external network",
                ))
            }
        };
        if !self.allowed_external_physnets.is_empty()
            && !self.allowed_external_physnets.iter().any(|p| p == physnet)
        {
            return Err(SyncError::invalid_segment(format!(
                "physical_network '{}' unknown for external network",
                physnet
            )));
        }
        if segment.segmentation_id.is_some() {
            return Err(SyncError::invalid_segment(
                "segmentation_id prohibited for external network",
            ));
        }
        Ok(())
    }
}
