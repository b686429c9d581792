//! Route discovery
//!
//! Reads the organization's VPN topology and collects, per hub appliance,
//! the subnets its spokes export.

use crate::dashboard::{DashboardClient, Network, VpnStatus};
use crate::model::RouteSet;
use crate::{Result, RouteSyncError};
use ipnet::IpNet;
use std::sync::Arc;

/// Discovers hub networks and the routes advertised to them
pub struct RouteDiscovery {
    dashboard: Arc<dyn DashboardClient>,
}

impl RouteDiscovery {
    pub fn new(dashboard: Arc<dyn DashboardClient>) -> Self {
        Self { dashboard }
    }

    /// Resolve the dashboard network ids of both appliances from their tags
    pub async fn locate_networks(
        &self,
        org_id: &str,
        primary_tag: &str,
        secondary_tag: &str,
    ) -> Result<(String, String)> {
        let networks = self.dashboard.networks(org_id).await?;
        let primary = find_tagged(&networks, primary_tag)?;
        let secondary = find_tagged(&networks, secondary_tag)?;
        tracing::info!(
            "Meraki Dashboard: {} is network {}, {} is network {}",
            primary_tag, primary, secondary_tag, secondary
        );
        Ok((primary, secondary))
    }

    /// Collect the routes exported by spokes of each hub.
    ///
    /// A spoke belongs to the hub listed first among its VPN peers.
    pub async fn discover(
        &self,
        org_id: &str,
        primary_network: &str,
        secondary_network: &str,
    ) -> Result<(RouteSet, RouteSet)> {
        let statuses = self.dashboard.vpn_statuses(org_id).await?;

        let mut primary = RouteSet::new();
        let mut secondary = RouteSet::new();

        for status in &statuses {
            let hub = status
                .is_spoke()
                .then(|| status.primary_peer())
                .flatten()
                .map(|peer| peer.network_id.as_str());

            let target = match hub {
                Some(id) if id == primary_network => &mut primary,
                Some(id) if id == secondary_network => &mut secondary,
                _ => {
                    tracing::info!(
                        "Meraki Dashboard: no hub routes from network {} ({})",
                        status.network_id, status.vpn_mode
                    );
                    continue;
                }
            };
            collect_subnets(status, target);
        }

        tracing::info!(
            "Meraki Dashboard: discovered {} routes for {} and {} routes for {}",
            primary.len(), primary_network, secondary.len(), secondary_network
        );
        Ok((primary, secondary))
    }
}

fn find_tagged(networks: &[Network], tag: &str) -> Result<String> {
    let mut tagged = networks.iter().filter(|n| n.has_tag(tag));
    let network = tagged
        .next()
        .ok_or_else(|| RouteSyncError::NetworkNotFound(tag.to_string()))?;
    if tagged.next().is_some() {
        tracing::warn!("Meraki Dashboard: several networks tagged {}, using {}", tag, network.id);
    }
    Ok(network.id.clone())
}

fn collect_subnets(status: &VpnStatus, routes: &mut RouteSet) {
    for exported in &status.exported_subnets {
        match exported.subnet.parse::<IpNet>() {
            Ok(prefix) => {
                routes.insert(prefix.trunc());
            }
            Err(e) => tracing::warn!(
                "Meraki Dashboard: skipping subnet {:?} from network {}: {}",
                exported.subnet, status.network_id, e
            ),
        }
    }
}
