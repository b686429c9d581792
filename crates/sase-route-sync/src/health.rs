//! Appliance health
//!
//! An appliance is online only when the dashboard reports its device online
//! and its EC2 instance is running. The compute plane has the last word: no
//! running instance means offline whatever the dashboard says.

use crate::cloud::{ComputeClient, InstanceState};
use crate::dashboard::DashboardClient;
use crate::model::Health;
use crate::{Result, RouteSyncError};
use std::sync::Arc;

/// Result of looking up an appliance's EC2 instance by tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstanceLookup {
    Running(String),
    /// Tagged instances exist but none is running
    NotRunning,
    /// No instance carries the tag
    Missing,
}

impl InstanceLookup {
    pub fn instance_id(&self) -> Option<&str> {
        match self {
            Self::Running(id) => Some(id),
            _ => None,
        }
    }
}

/// Evaluates appliance health from dashboard and EC2 state
pub struct HealthEvaluator {
    dashboard: Arc<dyn DashboardClient>,
    compute: Arc<dyn ComputeClient>,
}

impl HealthEvaluator {
    pub fn new(dashboard: Arc<dyn DashboardClient>, compute: Arc<dyn ComputeClient>) -> Self {
        Self { dashboard, compute }
    }

    /// Find the first running instance tagged `tag_key=tag`
    pub async fn locate_instance(&self, tag_key: &str, tag: &str) -> Result<InstanceLookup> {
        tracing::info!("AWS EC2: checking for vMX instances with instance tag {}", tag);

        let reservations = self.compute.describe_instances_by_tag(tag_key, tag).await?;
        let mut found = false;

        for instance in reservations.iter().flat_map(|r| r.instances.iter()) {
            found = true;
            if instance.state == InstanceState::Running {
                return Ok(InstanceLookup::Running(instance.instance_id.clone()));
            }
            tracing::info!(
                "AWS EC2: vMX instance {} found with instance tag {} but {}",
                instance.instance_id, tag, instance.state
            );
        }

        Ok(if found {
            InstanceLookup::NotRunning
        } else {
            InstanceLookup::Missing
        })
    }

    /// Combine dashboard device status and EC2 instance state
    pub async fn evaluate(
        &self,
        org_id: &str,
        network_id: &str,
        instance_id: Option<&str>,
    ) -> Result<Health> {
        tracing::info!(
            "Checking vMX status for network {} and instance {}",
            network_id,
            instance_id.unwrap_or("<none>")
        );

        let statuses = self.dashboard.device_statuses(org_id).await?;
        let device = statuses
            .iter()
            .find(|d| d.network_id.as_deref() == Some(network_id))
            .ok_or_else(|| RouteSyncError::DeviceStatusNotFound(network_id.to_string()))?;

        let Some(instance_id) = instance_id else {
            tracing::info!("No running instance for network {}, treating as offline", network_id);
            return Ok(Health::Offline);
        };

        let instance_state = self.compute.instance_state(instance_id).await?;
        let running = instance_state == Some(InstanceState::Running);

        let health = if device.is_online() && running {
            Health::Online
        } else {
            Health::Offline
        };

        tracing::debug!(
            "network {}: dashboard {}, instance {:?} -> {}",
            network_id, device.status, instance_state, health
        );
        Ok(health)
    }
}
