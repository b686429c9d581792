//! OpenSASE Route Sync
//!
//! Keeps the hub transit route table and the SD-WAN VPC route table in step
//! with the subnets advertised to a redundant pair of vMX appliances, and
//! moves route ownership to the surviving appliance when one fails.
//!
//! # Cycle
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                        Route Sync Cycle                          │
//! ├──────────────────────────────────────────────────────────────────┤
//! │                                                                  │
//! │   Dashboard ──► RouteDiscovery ──┐                               │
//! │                                  ├──► FailoverPolicy             │
//! │   Dashboard ─┐                   │          │                    │
//! │   Compute  ──┴► HealthEvaluator ─┘          ▼                    │
//! │                                    ┌─────────────────┐           │
//! │                                    │  OwnershipPlan  │           │
//! │                                    └────────┬────────┘           │
//! │                          ┌──────────────────┴───────────┐        │
//! │                          ▼                              ▼        │
//! │               TransitRouteReconciler       LocalRouteReconciler  │
//! │                 (additive, TGW RT)        (converging, VPC RT)   │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every backend is reached through a trait so the cycle can run against
//! the in-memory backends in [`memory`].

pub mod cloud;
pub mod config;
pub mod dashboard;
pub mod discovery;
pub mod failover;
pub mod health;
pub mod invocation;
pub mod memory;
pub mod model;
pub mod orchestrator;
pub mod reconcile;
pub mod secrets;
pub mod telemetry;

pub use cloud::{CloudError, ComputeClient, LocalRouteTable, TransitRouteTable};
pub use config::RouteSyncConfig;
pub use dashboard::{DashboardClient, DashboardConnector, MerakiDashboardClient};
pub use failover::{FailoverDecision, FailoverPolicy, OwnershipPlan};
pub use invocation::{LifecycleResponder, RouteSyncHandler, TriggerEvent};
pub use model::{Appliance, ApplianceSlot, Health, RouteSet, RouteTableEntry, RouteTarget};
pub use orchestrator::{CloudBackends, CycleReport, RouteSyncOrchestrator};
pub use reconcile::ReconcileReport;
pub use secrets::{ApiKey, SecretStore};

use thiserror::Error;

// =============================================================================
// Errors
// =============================================================================

/// Route sync errors
#[derive(Debug, Error)]
pub enum RouteSyncError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Secret {name} could not be fetched: {code}")]
    Secret {
        name: String,
        code: secrets::SecretErrorCode,
    },

    #[error("Secret format error: {0}")]
    SecretFormat(String),

    #[error("No dashboard network tagged {0}")]
    NetworkNotFound(String),

    #[error("No dashboard device status for network {0}")]
    DeviceStatusNotFound(String),

    #[error("Route table not found: {0}")]
    RouteTableNotFound(String),

    #[error("Dashboard API error: {0}")]
    Dashboard(String),

    #[error("Cloud API error: {0}")]
    Cloud(#[from] CloudError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Lifecycle response error: {0}")]
    Lifecycle(String),
}

pub type Result<T> = std::result::Result<T, RouteSyncError>;
