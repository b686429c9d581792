//! Route table reconciliation
//!
//! Both reconcilers read before they write, so rerunning an interrupted
//! cycle converges without cleanup. Neither prunes routes that are no
//! longer advertised.

pub mod local;
pub mod transit;

pub use local::LocalRouteReconciler;
pub use transit::TransitRouteReconciler;

use ipnet::IpNet;
use serde::{Deserialize, Serialize};

/// A prefix the reconciler could not converge
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedRoute {
    pub destination: IpNet,
    pub error: String,
}

/// What one reconciliation pass did to one table
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileReport {
    pub route_table_id: String,
    pub target: String,
    pub created: Vec<IpNet>,
    pub replaced: Vec<IpNet>,
    pub unchanged: Vec<IpNet>,
    pub failed: Vec<FailedRoute>,
}

impl ReconcileReport {
    pub fn new(route_table_id: &str, target: &str) -> Self {
        Self {
            route_table_id: route_table_id.to_string(),
            target: target.to_string(),
            ..Default::default()
        }
    }

    /// True when the table already matched
    pub fn is_noop(&self) -> bool {
        self.created.is_empty() && self.replaced.is_empty() && self.failed.is_empty()
    }

    fn fail(&mut self, destination: IpNet, error: impl ToString) {
        self.failed.push(FailedRoute {
            destination,
            error: error.to_string(),
        });
    }
}
