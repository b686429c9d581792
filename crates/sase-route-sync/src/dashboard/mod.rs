//! Meraki Dashboard integration

pub mod client;
pub mod models;

pub use client::{MerakiConnector, MerakiDashboardClient};
pub use models::{DeviceStatus, ExportedSubnet, Network, VpnPeer, VpnStatus};

use crate::secrets::ApiKey;
use crate::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Read-only dashboard queries used by a sync cycle.
///
/// Every call returns all pages for the organization.
#[async_trait]
pub trait DashboardClient: Send + Sync {
    /// Site-to-site VPN status of every appliance network
    async fn vpn_statuses(&self, org_id: &str) -> Result<Vec<VpnStatus>>;

    /// All networks of the organization
    async fn networks(&self, org_id: &str) -> Result<Vec<Network>>;

    /// Status of every device in the organization
    async fn device_statuses(&self, org_id: &str) -> Result<Vec<DeviceStatus>>;
}

/// Builds a dashboard client once the API key is known
pub trait DashboardConnector: Send + Sync {
    fn connect(&self, api_key: ApiKey) -> Result<Arc<dyn DashboardClient>>;
}
