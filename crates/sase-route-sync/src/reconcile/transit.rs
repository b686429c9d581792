//! Transit gateway route table, additive only

use super::ReconcileReport;
use crate::cloud::TransitRouteTable;
use crate::model::RouteSet;
use crate::Result;
use std::sync::Arc;

/// Ensures every advertised prefix reaches the SD-WAN VPC attachment
pub struct TransitRouteReconciler {
    table: Arc<dyn TransitRouteTable>,
}

impl TransitRouteReconciler {
    pub fn new(table: Arc<dyn TransitRouteTable>) -> Self {
        Self { table }
    }

    /// Create each missing prefix pointing at `attachment_id`.
    ///
    /// Existing entries are left alone whatever they point at. A search
    /// failure aborts; a create failure only fails that prefix.
    pub async fn reconcile(
        &self,
        routes: &RouteSet,
        route_table_id: &str,
        attachment_id: &str,
    ) -> Result<ReconcileReport> {
        let mut report = ReconcileReport::new(route_table_id, attachment_id);

        for destination in routes {
            let existing = self.table.search_exact(route_table_id, destination).await?;
            if !existing.is_empty() {
                tracing::info!(
                    "Transit Gateway RT: no update, route {} exists, skipping update",
                    destination
                );
                report.unchanged.push(*destination);
                continue;
            }

            tracing::info!("Transit Gateway RT: new route, adding route {}", destination);
            match self
                .table
                .create_route(route_table_id, destination, attachment_id)
                .await
            {
                Ok(()) => report.created.push(*destination),
                Err(e) => {
                    tracing::warn!("Transit Gateway RT: adding route {} failed: {}", destination, e);
                    report.fail(*destination, e);
                }
            }
        }

        Ok(report)
    }
}
