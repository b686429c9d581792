//! In-memory backends
//!
//! Dashboard, cloud, secret store and lifecycle responder that keep their
//! state in process. The cloud backend records every mutation call so a
//! caller can assert on exactly what a cycle attempted.

use crate::cloud::{
    CloudError, ComputeClient, Instance, InstanceState, LocalRouteTable, Reservation,
    TransitRouteTable, ROUTE_ALREADY_EXISTS,
};
use crate::dashboard::{
    DashboardClient, DashboardConnector, DeviceStatus, ExportedSubnet, Network, VpnPeer, VpnStatus,
};
use crate::invocation::{LifecycleRequest, LifecycleResponder, ResponseStatus};
use crate::model::{RouteTableEntry, RouteTarget};
use crate::secrets::{ApiKey, SecretErrorCode, SecretStore, SecretStoreError, SecretValue};
use crate::{Result, RouteSyncError};
use async_trait::async_trait;
use ipnet::IpNet;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

// =============================================================================
// Dashboard
// =============================================================================

#[derive(Default)]
struct DashboardState {
    vpn_statuses: Vec<VpnStatus>,
    networks: Vec<Network>,
    device_statuses: Vec<DeviceStatus>,
    unavailable: bool,
}

/// Dashboard holding a fixed organization
#[derive(Clone, Default)]
pub struct InMemoryDashboard {
    state: Arc<RwLock<DashboardState>>,
}

impl InMemoryDashboard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a network carrying `tags`
    pub fn with_network(self, id: &str, tags: &[&str]) -> Self {
        self.state.write().networks.push(Network {
            id: id.into(),
            name: id.into(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
        });
        self
    }

    /// Add a hub appliance network with its device status
    pub fn with_hub(self, network_id: &str, status: &str) -> Self {
        {
            let mut state = self.state.write();
            state.vpn_statuses.push(VpnStatus {
                network_id: network_id.into(),
                network_name: None,
                device_serial: None,
                device_status: Some(status.into()),
                vpn_mode: "hub".into(),
                exported_subnets: Vec::new(),
                meraki_vpn_peers: Vec::new(),
            });
        }
        self.with_device_status(network_id, status)
    }

    /// Add a spoke exporting `subnets` with `peers` in hub priority order
    pub fn with_spoke(self, network_id: &str, peers: &[&str], subnets: &[&str]) -> Self {
        self.state.write().vpn_statuses.push(VpnStatus {
            network_id: network_id.into(),
            network_name: None,
            device_serial: None,
            device_status: Some("online".into()),
            vpn_mode: "spoke".into(),
            exported_subnets: subnets
                .iter()
                .map(|s| ExportedSubnet {
                    subnet: s.to_string(),
                    name: None,
                })
                .collect(),
            meraki_vpn_peers: peers
                .iter()
                .map(|p| VpnPeer {
                    network_id: p.to_string(),
                    network_name: None,
                    reachability: Some("reachable".into()),
                })
                .collect(),
        });
        self
    }

    pub fn with_device_status(self, network_id: &str, status: &str) -> Self {
        self.set_device_status(network_id, status);
        self
    }

    /// Replace the device status of a network
    pub fn set_device_status(&self, network_id: &str, status: &str) {
        let mut state = self.state.write();
        state
            .device_statuses
            .retain(|d| d.network_id.as_deref() != Some(network_id));
        state.device_statuses.push(DeviceStatus {
            name: None,
            serial: format!("Q2XX-{}", network_id),
            network_id: Some(network_id.into()),
            status: status.into(),
            product_type: Some("appliance".into()),
        });
    }

    /// Make every query fail
    pub fn set_unavailable(&self, unavailable: bool) {
        self.state.write().unavailable = unavailable;
    }

    fn check_available(&self) -> Result<()> {
        if self.state.read().unavailable {
            return Err(RouteSyncError::Dashboard("503 Service Unavailable".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl DashboardClient for InMemoryDashboard {
    async fn vpn_statuses(&self, _org_id: &str) -> Result<Vec<VpnStatus>> {
        self.check_available()?;
        Ok(self.state.read().vpn_statuses.clone())
    }

    async fn networks(&self, _org_id: &str) -> Result<Vec<Network>> {
        self.check_available()?;
        Ok(self.state.read().networks.clone())
    }

    async fn device_statuses(&self, _org_id: &str) -> Result<Vec<DeviceStatus>> {
        self.check_available()?;
        Ok(self.state.read().device_statuses.clone())
    }
}

impl DashboardConnector for InMemoryDashboard {
    fn connect(&self, _api_key: ApiKey) -> Result<Arc<dyn DashboardClient>> {
        Ok(Arc::new(self.clone()))
    }
}

// =============================================================================
// Cloud
// =============================================================================

/// A mutation call made against the in-memory cloud, successful or not
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Mutation {
    TransitCreate { destination: IpNet, attachment_id: String },
    LocalCreate { destination: IpNet, instance_id: String },
    LocalReplace { destination: IpNet, instance_id: String },
}

#[derive(Default)]
struct CloudState {
    reservations: HashMap<(String, String), Vec<Reservation>>,
    instance_states: HashMap<String, InstanceState>,
    transit: HashMap<String, Vec<RouteTableEntry>>,
    local: HashMap<String, Vec<RouteTableEntry>>,
    create_failures: HashMap<IpNet, CloudError>,
    mutations: Vec<Mutation>,
}

/// EC2, transit gateway and VPC route tables in one store
#[derive(Clone, Default)]
pub struct InMemoryCloud {
    state: Arc<RwLock<CloudState>>,
}

impl InMemoryCloud {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an instance tagged `tag_key=tag_value` in its own reservation
    pub fn with_instance(self, tag_key: &str, tag_value: &str, instance_id: &str, state: InstanceState) -> Self {
        {
            let mut cloud = self.state.write();
            cloud
                .reservations
                .entry((tag_key.to_string(), tag_value.to_string()))
                .or_default()
                .push(Reservation {
                    instances: vec![Instance {
                        instance_id: instance_id.into(),
                        state,
                    }],
                });
            cloud.instance_states.insert(instance_id.into(), state);
        }
        self
    }

    pub fn with_transit_table(self, route_table_id: &str) -> Self {
        self.state.write().transit.entry(route_table_id.into()).or_default();
        self
    }

    pub fn with_local_table(self, route_table_id: &str) -> Self {
        self.state.write().local.entry(route_table_id.into()).or_default();
        self
    }

    pub fn with_transit_route(self, route_table_id: &str, destination: &str, attachment_id: &str) -> Self {
        let entry = RouteTableEntry::new(parse(destination), RouteTarget::Attachment(attachment_id.into()));
        self.state
            .write()
            .transit
            .entry(route_table_id.into())
            .or_default()
            .push(entry);
        self
    }

    pub fn with_local_route(self, route_table_id: &str, destination: &str, target: RouteTarget) -> Self {
        let entry = RouteTableEntry::new(parse(destination), target);
        self.state
            .write()
            .local
            .entry(route_table_id.into())
            .or_default()
            .push(entry);
        self
    }

    /// Fail every create for `destination` with `error`
    pub fn fail_create(self, destination: &str, error: CloudError) -> Self {
        self.state.write().create_failures.insert(parse(destination), error);
        self
    }

    pub fn set_instance_state(&self, instance_id: &str, state: InstanceState) {
        let mut cloud = self.state.write();
        cloud.instance_states.insert(instance_id.into(), state);
        for reservations in cloud.reservations.values_mut() {
            for instance in reservations.iter_mut().flat_map(|r| r.instances.iter_mut()) {
                if instance.instance_id == instance_id {
                    instance.state = state;
                }
            }
        }
    }

    pub fn transit_routes(&self, route_table_id: &str) -> Vec<RouteTableEntry> {
        self.state.read().transit.get(route_table_id).cloned().unwrap_or_default()
    }

    pub fn local_routes(&self, route_table_id: &str) -> Vec<RouteTableEntry> {
        self.state.read().local.get(route_table_id).cloned().unwrap_or_default()
    }

    /// Target of the local route for `destination`
    pub fn local_target(&self, route_table_id: &str, destination: &str) -> Option<RouteTarget> {
        let destination = parse(destination);
        self.local_routes(route_table_id)
            .into_iter()
            .find(|e| e.destination == destination)
            .map(|e| e.target)
    }

    pub fn mutations(&self) -> Vec<Mutation> {
        self.state.read().mutations.clone()
    }

    pub fn clear_mutations(&self) {
        self.state.write().mutations.clear();
    }
}

/// Fixture literals only; panics on a malformed prefix
fn parse(destination: &str) -> IpNet {
    destination
        .parse()
        .unwrap_or_else(|e| panic!("invalid destination {}: {}", destination, e))
}

fn table_not_found(route_table_id: &str) -> CloudError {
    CloudError::new(
        "InvalidRouteTableID.NotFound",
        format!("The routeTable ID '{}' does not exist", route_table_id),
    )
}

#[async_trait]
impl ComputeClient for InMemoryCloud {
    async fn describe_instances_by_tag(
        &self,
        tag_key: &str,
        tag_value: &str,
    ) -> std::result::Result<Vec<Reservation>, CloudError> {
        Ok(self
            .state
            .read()
            .reservations
            .get(&(tag_key.to_string(), tag_value.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    async fn instance_state(&self, instance_id: &str) -> std::result::Result<Option<InstanceState>, CloudError> {
        Ok(self.state.read().instance_states.get(instance_id).copied())
    }
}

#[async_trait]
impl TransitRouteTable for InMemoryCloud {
    async fn search_exact(
        &self,
        route_table_id: &str,
        destination: &IpNet,
    ) -> std::result::Result<Vec<RouteTableEntry>, CloudError> {
        let cloud = self.state.read();
        let table = cloud
            .transit
            .get(route_table_id)
            .ok_or_else(|| table_not_found(route_table_id))?;
        Ok(table.iter().filter(|e| e.destination == *destination).cloned().collect())
    }

    async fn create_route(
        &self,
        route_table_id: &str,
        destination: &IpNet,
        attachment_id: &str,
    ) -> std::result::Result<(), CloudError> {
        let mut cloud = self.state.write();
        cloud.mutations.push(Mutation::TransitCreate {
            destination: *destination,
            attachment_id: attachment_id.into(),
        });
        if let Some(err) = cloud.create_failures.get(destination) {
            return Err(err.clone());
        }
        let table = cloud
            .transit
            .get_mut(route_table_id)
            .ok_or_else(|| table_not_found(route_table_id))?;
        if table.iter().any(|e| e.destination == *destination) {
            return Err(CloudError::new(ROUTE_ALREADY_EXISTS, format!("Route {} already exists", destination)));
        }
        table.push(RouteTableEntry::new(*destination, RouteTarget::Attachment(attachment_id.into())));
        Ok(())
    }
}

#[async_trait]
impl LocalRouteTable for InMemoryCloud {
    async fn routes(&self, route_table_id: &str) -> std::result::Result<Option<Vec<RouteTableEntry>>, CloudError> {
        Ok(self.state.read().local.get(route_table_id).cloned())
    }

    async fn create_route(
        &self,
        route_table_id: &str,
        destination: &IpNet,
        instance_id: &str,
    ) -> std::result::Result<(), CloudError> {
        let mut cloud = self.state.write();
        cloud.mutations.push(Mutation::LocalCreate {
            destination: *destination,
            instance_id: instance_id.into(),
        });
        if let Some(err) = cloud.create_failures.get(destination) {
            return Err(err.clone());
        }
        let table = cloud
            .local
            .get_mut(route_table_id)
            .ok_or_else(|| table_not_found(route_table_id))?;
        if table.iter().any(|e| e.destination == *destination) {
            return Err(CloudError::new(
                ROUTE_ALREADY_EXISTS,
                format!("The route identified by {} already exists.", destination),
            ));
        }
        table.push(RouteTableEntry::new(*destination, RouteTarget::Instance(instance_id.into())));
        Ok(())
    }

    async fn replace_route(
        &self,
        route_table_id: &str,
        destination: &IpNet,
        instance_id: &str,
    ) -> std::result::Result<(), CloudError> {
        let mut cloud = self.state.write();
        cloud.mutations.push(Mutation::LocalReplace {
            destination: *destination,
            instance_id: instance_id.into(),
        });
        let table = cloud
            .local
            .get_mut(route_table_id)
            .ok_or_else(|| table_not_found(route_table_id))?;
        let entry = table
            .iter_mut()
            .find(|e| e.destination == *destination)
            .ok_or_else(|| {
                CloudError::new("InvalidRoute.NotFound", format!("no route with destination {}", destination))
            })?;
        entry.target = RouteTarget::Instance(instance_id.into());
        Ok(())
    }
}

// =============================================================================
// Secrets and lifecycle responses
// =============================================================================

/// Secret store with fixed contents
#[derive(Default)]
pub struct StaticSecretStore {
    secrets: HashMap<String, SecretValue>,
    errors: HashMap<String, SecretStoreError>,
}

impl StaticSecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_secret(mut self, name: &str, value: SecretValue) -> Self {
        self.secrets.insert(name.into(), value);
        self
    }

    /// Store a JSON document holding `key` under `name`
    pub fn with_dashboard_key(self, name: &str, key: &str) -> Self {
        let doc = serde_json::json!({ "merakiapikey": key }).to_string();
        self.with_secret(name, SecretValue::String(doc))
    }

    pub fn with_error(mut self, name: &str, code: &str, message: &str) -> Self {
        self.errors.insert(
            name.into(),
            SecretStoreError {
                code: SecretErrorCode::from_code(code),
                message: message.into(),
            },
        );
        self
    }
}

#[async_trait]
impl SecretStore for StaticSecretStore {
    async fn get_secret_value(&self, name: &str) -> std::result::Result<SecretValue, SecretStoreError> {
        if let Some(err) = self.errors.get(name) {
            return Err(err.clone());
        }
        self.secrets.get(name).cloned().ok_or_else(|| SecretStoreError {
            code: SecretErrorCode::ResourceNotFound,
            message: format!("Secrets Manager can't find the specified secret {}", name),
        })
    }
}

/// A lifecycle response as recorded by [`RecordingResponder`]
#[derive(Clone, Debug)]
pub struct RecordedResponse {
    pub request_id: String,
    pub status: ResponseStatus,
    pub reason: String,
}

/// Responder that keeps every response instead of sending it
#[derive(Clone, Default)]
pub struct RecordingResponder {
    responses: Arc<RwLock<Vec<RecordedResponse>>>,
}

impl RecordingResponder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn responses(&self) -> Vec<RecordedResponse> {
        self.responses.read().clone()
    }
}

#[async_trait]
impl LifecycleResponder for RecordingResponder {
    async fn respond(&self, request: &LifecycleRequest, status: ResponseStatus, reason: &str) -> Result<()> {
        self.responses.write().push(RecordedResponse {
            request_id: request.request_id.clone(),
            status,
            reason: reason.into(),
        });
        Ok(())
    }
}
