//! SD-WAN VPC route table, converging on the owning instance

use super::ReconcileReport;
use crate::cloud::LocalRouteTable;
use crate::model::RouteSet;
use crate::{Result, RouteSyncError};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Points every owned prefix at the owning vMX instance
pub struct LocalRouteReconciler {
    table: Arc<dyn LocalRouteTable>,
}

impl LocalRouteReconciler {
    pub fn new(table: Arc<dyn LocalRouteTable>) -> Self {
        Self { table }
    }

    /// Route `routes` to `instance_id`.
    ///
    /// Prefixes already pointing at the instance are left alone. A missing
    /// prefix is created; if another target holds it, the route is replaced.
    /// Any other failure is recorded for that prefix and the rest continue.
    pub async fn reconcile(
        &self,
        routes: &RouteSet,
        route_table_id: &str,
        instance_id: &str,
    ) -> Result<ReconcileReport> {
        let mut report = ReconcileReport::new(route_table_id, instance_id);

        let entries = self
            .table
            .routes(route_table_id)
            .await?
            .ok_or_else(|| RouteSyncError::RouteTableNotFound(route_table_id.to_string()))?;

        let current: BTreeSet<_> = entries
            .iter()
            .filter(|e| e.targets_instance(instance_id))
            .map(|e| e.destination)
            .collect();

        let (unchanged, pending): (Vec<_>, Vec<_>) =
            routes.iter().copied().partition(|d| current.contains(d));
        report.unchanged = unchanged;

        if pending.is_empty() {
            tracing::info!("VPC RT: no new routes for {}", instance_id);
            return Ok(report);
        }
        tracing::info!(
            "VPC RT: {} new routes for {}: {:?}",
            pending.len(),
            instance_id,
            pending.iter().map(|p| p.to_string()).collect::<Vec<_>>()
        );

        for destination in pending {
            let created = self
                .table
                .create_route(route_table_id, &destination, instance_id)
                .await;

            match created {
                Ok(()) => report.created.push(destination),
                Err(e) if e.is_route_already_exists() => {
                    tracing::info!(
                        "VPC RT: route {} held by another target, replacing with {}",
                        destination, instance_id
                    );
                    match self
                        .table
                        .replace_route(route_table_id, &destination, instance_id)
                        .await
                    {
                        Ok(()) => report.replaced.push(destination),
                        Err(e) => {
                            tracing::warn!("VPC RT: replacing route {} failed due to {}", destination, e.code);
                            report.fail(destination, e);
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!("VPC RT: adding route {} failed due to {}", destination, e.code);
                    report.fail(destination, e);
                }
            }
        }

        Ok(report)
    }
}
