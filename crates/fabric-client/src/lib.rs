//! Fabric controller client.
//!
//! Switch configuration is expressed as immutable request values
//! ([`L2Request`], [`VrfRequest`]) handed to a [`FabricApi`]. The REST
//! implementation resolves the switch by IP, retries idempotent verbs on
//! transport failures, and can run in dry-run mode where nothing is sent.

pub mod api;
pub mod error;
pub mod request;
pub mod rest;
pub mod retry;

pub use api::FabricApi;
pub use error::{FabricError, FabricResult};
pub use request::{L2Request, VrfMode, VrfRequest};
pub use rest::{FabricConfig, RestFabricClient};
pub use retry::RetryPolicy;
