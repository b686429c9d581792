//! AWS compute and route table backends
//!
//! The EC2 and Transit Gateway APIs are reached through these traits. Each
//! method is one blocking round trip against the provider; implementations
//! must not retry or cache.

use crate::model::RouteTableEntry;
use async_trait::async_trait;
use ipnet::IpNet;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Error code EC2 returns when a route for the destination already exists
pub const ROUTE_ALREADY_EXISTS: &str = "RouteAlreadyExists";

/// Error reported by a cloud API call
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{code}: {message}")]
pub struct CloudError {
    /// Provider error code, e.g. `RouteAlreadyExists`
    pub code: String,
    pub message: String,
}

impl CloudError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn is_route_already_exists(&self) -> bool {
        self.code == ROUTE_ALREADY_EXISTS
    }
}

/// EC2 instance lifecycle state
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InstanceState {
    Pending,
    Running,
    ShuttingDown,
    Terminated,
    Stopping,
    Stopped,
}

impl fmt::Display for InstanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::ShuttingDown => "shutting-down",
            Self::Terminated => "terminated",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// Instance as returned by a tag lookup
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instance {
    pub instance_id: String,
    pub state: InstanceState,
}

/// Group of instances launched together
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub instances: Vec<Instance>,
}

/// EC2 instance queries
#[async_trait]
pub trait ComputeClient: Send + Sync {
    /// Reservations holding instances tagged `tag_key=tag_value`
    async fn describe_instances_by_tag(
        &self,
        tag_key: &str,
        tag_value: &str,
    ) -> Result<Vec<Reservation>, CloudError>;

    /// Current state of one instance, `None` if EC2 reports no status for it
    async fn instance_state(&self, instance_id: &str) -> Result<Option<InstanceState>, CloudError>;
}

/// Transit gateway route table operations
#[async_trait]
pub trait TransitRouteTable: Send + Sync {
    /// Routes whose destination exactly matches `destination`
    async fn search_exact(
        &self,
        route_table_id: &str,
        destination: &IpNet,
    ) -> Result<Vec<RouteTableEntry>, CloudError>;

    async fn create_route(
        &self,
        route_table_id: &str,
        destination: &IpNet,
        attachment_id: &str,
    ) -> Result<(), CloudError>;
}

/// VPC route table operations
#[async_trait]
pub trait LocalRouteTable: Send + Sync {
    /// All routes of the table, `None` if the table does not exist
    async fn routes(&self, route_table_id: &str) -> Result<Option<Vec<RouteTableEntry>>, CloudError>;

    /// Fails with `RouteAlreadyExists` if any route for `destination` exists
    async fn create_route(
        &self,
        route_table_id: &str,
        destination: &IpNet,
        instance_id: &str,
    ) -> Result<(), CloudError>;

    async fn replace_route(
        &self,
        route_table_id: &str,
        destination: &IpNet,
        instance_id: &str,
    ) -> Result<(), CloudError>;
}
