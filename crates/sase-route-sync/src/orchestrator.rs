//! Route sync cycle
//!
//! One cycle: locate both appliances, discover their routes, evaluate their
//! health, decide ownership, then reconcile the transit table before the
//! VPC table for each owner. Reads all finish before the first write.

use crate::cloud::{ComputeClient, LocalRouteTable, TransitRouteTable};
use crate::config::RouteSyncConfig;
use crate::dashboard::DashboardClient;
use crate::discovery::RouteDiscovery;
use crate::failover::{FailoverDecision, FailoverPolicy, OwnershipPlan};
use crate::health::{HealthEvaluator, InstanceLookup};
use crate::model::{Appliance, ApplianceSlot, Health};
use crate::reconcile::{LocalRouteReconciler, ReconcileReport, TransitRouteReconciler};
use crate::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::Instrument;
use uuid::Uuid;

/// AWS backends used by a cycle
#[derive(Clone)]
pub struct CloudBackends {
    pub compute: Arc<dyn ComputeClient>,
    pub transit: Arc<dyn TransitRouteTable>,
    pub local: Arc<dyn LocalRouteTable>,
}

impl CloudBackends {
    pub fn new(
        compute: Arc<dyn ComputeClient>,
        transit: Arc<dyn TransitRouteTable>,
        local: Arc<dyn LocalRouteTable>,
    ) -> Self {
        Self { compute, transit, local }
    }

    /// Use one backend for all three roles
    pub fn shared<T>(cloud: Arc<T>) -> Self
    where
        T: ComputeClient + TransitRouteTable + LocalRouteTable + 'static,
    {
        Self {
            compute: cloud.clone(),
            transit: cloud.clone(),
            local: cloud,
        }
    }
}

/// Reconciliation of one owner's routes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OwnerReconciliation {
    pub owner: ApplianceSlot,
    pub transit: ReconcileReport,
    pub local: ReconcileReport,
}

/// Outcome of one completed cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleReport {
    pub cycle_id: Uuid,
    pub org_id: String,
    pub region: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub appliances: Vec<Appliance>,
    pub decision: FailoverDecision,
    pub reconciliations: Vec<OwnerReconciliation>,
}

impl CycleReport {
    /// Routes created or replaced across both tables
    pub fn changed_routes(&self) -> usize {
        self.reconciliations
            .iter()
            .flat_map(|r| [&r.transit, &r.local])
            .map(|r| r.created.len() + r.replaced.len())
            .sum()
    }

    /// Prefixes that could not be converged
    pub fn failed_routes(&self) -> usize {
        self.reconciliations
            .iter()
            .flat_map(|r| [&r.transit, &r.local])
            .map(|r| r.failed.len())
            .sum()
    }

    pub fn appliance(&self, slot: ApplianceSlot) -> Option<&Appliance> {
        self.appliances.iter().find(|a| a.slot == slot)
    }
}

/// Runs route sync cycles for one deployment
pub struct RouteSyncOrchestrator {
    config: Arc<RouteSyncConfig>,
    discovery: RouteDiscovery,
    health: HealthEvaluator,
    transit: TransitRouteReconciler,
    local: LocalRouteReconciler,
}

impl RouteSyncOrchestrator {
    pub fn new(
        config: Arc<RouteSyncConfig>,
        dashboard: Arc<dyn DashboardClient>,
        backends: CloudBackends,
    ) -> Self {
        Self {
            config,
            discovery: RouteDiscovery::new(dashboard.clone()),
            health: HealthEvaluator::new(dashboard, backends.compute),
            transit: TransitRouteReconciler::new(backends.transit),
            local: LocalRouteReconciler::new(backends.local),
        }
    }

    /// Run one cycle to completion
    pub async fn run_cycle(&self) -> Result<CycleReport> {
        let cycle_id = Uuid::new_v4();
        let span = tracing::info_span!(
            "route_sync_cycle",
            %cycle_id,
            org_id = %self.config.org_id,
            region = %self.config.region
        );
        self.run(cycle_id).instrument(span).await
    }

    async fn run(&self, cycle_id: Uuid) -> Result<CycleReport> {
        let started_at = Utc::now();
        let config = &self.config;

        let primary_instance = self.locate_instance(ApplianceSlot::Primary).await?;
        let secondary_instance = self.locate_instance(ApplianceSlot::Secondary).await?;

        let (primary_network, secondary_network) = self
            .discovery
            .locate_networks(
                &config.org_id,
                config.tag(ApplianceSlot::Primary),
                config.tag(ApplianceSlot::Secondary),
            )
            .await?;

        let (primary_routes, secondary_routes) = self
            .discovery
            .discover(&config.org_id, &primary_network, &secondary_network)
            .await?;

        let primary_health = self
            .health
            .evaluate(&config.org_id, &primary_network, primary_instance.instance_id())
            .await?;
        let secondary_health = self
            .health
            .evaluate(&config.org_id, &secondary_network, secondary_instance.instance_id())
            .await?;

        let appliances = vec![
            self.appliance(ApplianceSlot::Primary, primary_network, &primary_instance, primary_health),
            self.appliance(ApplianceSlot::Secondary, secondary_network, &secondary_instance, secondary_health),
        ];

        let plan = FailoverPolicy::decide(
            (&primary_routes, primary_health),
            (&secondary_routes, secondary_health),
        );

        let reconciliations = self.apply(&plan, &appliances).await?;

        let report = CycleReport {
            cycle_id,
            org_id: config.org_id.clone(),
            region: config.region.clone(),
            started_at,
            finished_at: Utc::now(),
            appliances,
            decision: plan.decision,
            reconciliations,
        };

        match serde_json::to_string(&report) {
            Ok(json) => tracing::info!("Route sync cycle complete: {}", json),
            Err(e) => tracing::warn!("Route sync cycle complete, report not serializable: {}", e),
        }
        Ok(report)
    }

    async fn locate_instance(&self, slot: ApplianceSlot) -> Result<InstanceLookup> {
        self.health
            .locate_instance(&self.config.instance_tag_key, self.config.tag(slot))
            .await
    }

    fn appliance(&self, slot: ApplianceSlot, network_id: String, instance: &InstanceLookup, health: Health) -> Appliance {
        Appliance {
            slot,
            tag: self.config.tag(slot).to_string(),
            network_id,
            instance_id: instance.instance_id().map(str::to_string),
            health,
        }
    }

    /// Reconcile each owner's routes.
    ///
    /// Owners are online appliances, and an appliance is only online with a
    /// running instance, so every owner resolves to an instance id.
    async fn apply(&self, plan: &OwnershipPlan, appliances: &[Appliance]) -> Result<Vec<OwnerReconciliation>> {
        let mut reconciliations = Vec::new();
        if plan.is_hold() {
            return Ok(reconciliations);
        }

        let owners = plan.assignments.iter().filter_map(|assignment| {
            appliances
                .iter()
                .find(|a| a.slot == assignment.owner && a.health.is_online())
                .and_then(|a| a.instance_id.as_deref())
                .map(|instance_id| (assignment, instance_id))
        });

        for (assignment, instance_id) in owners {
            if assignment.routes.is_empty() {
                tracing::info!("No routes assigned to {}, skipping", assignment.owner);
                continue;
            }

            let transit = self
                .transit
                .reconcile(
                    &assignment.routes,
                    &self.config.transit_route_table_id,
                    &self.config.transit_attachment_id,
                )
                .await?;

            tracing::info!("VPC RT Update: updating VPC route table for {}", assignment.owner);
            let local = self
                .local
                .reconcile(&assignment.routes, &self.config.local_route_table_id, instance_id)
                .await?;

            reconciliations.push(OwnerReconciliation {
                owner: assignment.owner,
                transit,
                local,
            });
        }

        Ok(reconciliations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloud::InstanceState;
    use crate::memory::{InMemoryCloud, InMemoryDashboard};
    use crate::model::RouteTarget;
    use crate::RouteSyncError;

    fn config() -> Arc<RouteSyncConfig> {
        Arc::new(RouteSyncConfig {
            org_id: "1".into(),
            transit_route_table_id: "tgw-rtb-1".into(),
            transit_attachment_id: "tgw-attach-1".into(),
            local_route_table_id: "rtb-1".into(),
            primary_tag: "vmx1".into(),
            secondary_tag: "vmx2".into(),
            region: "us-east-1".into(),
            secret_name: "MerakiAPIKey".into(),
            instance_tag_key: "MerakiTag".into(),
            dashboard_url: "http://127.0.0.1".into(),
        })
    }

    #[tokio::test]
    async fn test_cycle_reports_appliances() {
        let dashboard = InMemoryDashboard::new()
            .with_network("N_1", &["vmx1"])
            .with_network("N_2", &["vmx2"])
            .with_hub("N_1", "online")
            .with_hub("N_2", "offline")
            .with_spoke("N_s", &["N_2"], &["10.2.0.0/16"]);
        let cloud = InMemoryCloud::new()
            .with_instance("MerakiTag", "vmx1", "i-a", InstanceState::Running)
            .with_transit_table("tgw-rtb-1")
            .with_local_table("rtb-1");

        let orchestrator =
            RouteSyncOrchestrator::new(config(), Arc::new(dashboard), CloudBackends::shared(Arc::new(cloud)));
        let report = orchestrator.run_cycle().await.unwrap();

        let secondary = report.appliance(ApplianceSlot::Secondary).unwrap();
        assert_eq!(secondary.health, Health::Offline);
        assert_eq!(secondary.instance_id, None);
        assert_eq!(
            report.decision,
            FailoverDecision::Consolidate { survivor: ApplianceSlot::Primary }
        );
        assert_eq!(report.changed_routes(), 2);
        assert_eq!(report.failed_routes(), 0);
    }

    #[tokio::test]
    async fn test_unknown_network_aborts_before_writes() {
        let dashboard = InMemoryDashboard::new().with_network("N_1", &["vmx1"]);
        let cloud = InMemoryCloud::new()
            .with_instance("MerakiTag", "vmx1", "i-a", InstanceState::Running)
            .with_transit_table("tgw-rtb-1")
            .with_local_table("rtb-1");

        let orchestrator = RouteSyncOrchestrator::new(
            config(),
            Arc::new(dashboard),
            CloudBackends::shared(Arc::new(cloud.clone())),
        );
        let err = orchestrator.run_cycle().await.unwrap_err();

        assert!(matches!(err, RouteSyncError::NetworkNotFound(_)));
        assert!(cloud.mutations().is_empty());
    }

    #[tokio::test]
    async fn test_owner_resolves_to_running_instance() {
        let dashboard = InMemoryDashboard::new()
            .with_network("N_1", &["vmx1"])
            .with_network("N_2", &["vmx2"])
            .with_hub("N_1", "online")
            .with_hub("N_2", "online")
            .with_spoke("N_s1", &["N_1"], &["10.1.0.0/16"])
            .with_spoke("N_s2", &["N_2"], &["10.2.0.0/16"]);
        let cloud = InMemoryCloud::new()
            .with_instance("MerakiTag", "vmx2", "i-b", InstanceState::Running)
            .with_transit_table("tgw-rtb-1")
            .with_local_table("rtb-1");

        let orchestrator = RouteSyncOrchestrator::new(
            config(),
            Arc::new(dashboard),
            CloudBackends::shared(Arc::new(cloud.clone())),
        );
        let report = orchestrator.run_cycle().await.unwrap();

        assert_eq!(
            report.decision,
            FailoverDecision::Consolidate { survivor: ApplianceSlot::Secondary }
        );
        assert_eq!(report.reconciliations.len(), 1);
        assert_eq!(report.reconciliations[0].local.target, "i-b");
        assert_eq!(
            cloud.local_target("rtb-1", "10.1.0.0/16"),
            Some(RouteTarget::Instance("i-b".into()))
        );
        assert_eq!(report.org_id, "1");
        assert_eq!(report.region, "us-east-1");
        assert_eq!(report.appliance(ApplianceSlot::Primary).unwrap().tag, "vmx1");
    }
}
