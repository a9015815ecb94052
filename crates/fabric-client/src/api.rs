//! The switch configuration seam.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::FabricResult;
use crate::request::{L2Request, VrfRequest};

/// Pushes and retracts switch configuration on the fabric controller.
///
/// Every call targets one switch and expresses an idempotent intent: a
/// repeated push of the same request leaves the switch unchanged.
#[async_trait]
pub trait FabricApi: Send + Sync {
    /// Configures the VLAN/segment mapping and gateway on a switch.
    async fn push_l2(&self, request: &L2Request) -> FabricResult<()>;

    /// Removes the VLAN/segment mapping from a switch.
    async fn retract_l2(&self, request: &L2Request) -> FabricResult<()>;

    /// Creates a VRF or attaches an interface to it, per `request.mode`.
    async fn push_vrf(&self, request: &VrfRequest) -> FabricResult<()>;

    /// Deletes a VRF or detaches an interface from it, per `request.mode`.
    async fn retract_vrf(&self, request: &VrfRequest) -> FabricResult<()>;
}

#[async_trait]
impl<T: FabricApi + ?Sized> FabricApi for Arc<T> {
    async fn push_l2(&self, request: &L2Request) -> FabricResult<()> {
        (**self).push_l2(request).await
    }

    async fn retract_l2(&self, request: &L2Request) -> FabricResult<()> {
        (**self).retract_l2(request).await
    }

    async fn push_vrf(&self, request: &VrfRequest) -> FabricResult<()> {
        (**self).push_vrf(request).await
    }

    async fn retract_vrf(&self, request: &VrfRequest) -> FabricResult<()> {
        (**self).retract_vrf(request).await
    }
}
