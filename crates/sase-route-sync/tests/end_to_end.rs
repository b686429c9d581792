//! Full cycles against the in-memory backends

use sase_route_sync::cloud::{CloudError, InstanceState};
use sase_route_sync::memory::{InMemoryCloud, InMemoryDashboard, Mutation};
use sase_route_sync::{
    ApplianceSlot, CloudBackends, FailoverDecision, RouteSyncConfig, RouteSyncError,
    RouteSyncOrchestrator, RouteTarget,
};
use std::sync::Arc;

const TGW_RT: &str = "tgw-rtb-0a1";
const TGW_ATTACH: &str = "tgw-attach-0b2";
const VPC_RT: &str = "rtb-0c3";

struct Deployment {
    dashboard: InMemoryDashboard,
    cloud: InMemoryCloud,
    orchestrator: RouteSyncOrchestrator,
}

fn config() -> Arc<RouteSyncConfig> {
    Arc::new(RouteSyncConfig {
        org_id: "549236".into(),
        transit_route_table_id: TGW_RT.into(),
        transit_attachment_id: TGW_ATTACH.into(),
        local_route_table_id: VPC_RT.into(),
        primary_tag: "vmx1".into(),
        secondary_tag: "vmx2".into(),
        region: "us-east-1".into(),
        secret_name: "MerakiAPIKey".into(),
        instance_tag_key: "MerakiTag".into(),
        dashboard_url: "http://127.0.0.1".into(),
    })
}

/// Two hubs, one spoke each, instances i-a and i-b
fn deployment(vmx1: (&str, InstanceState), vmx2: (&str, InstanceState)) -> Deployment {
    deployment_with(vmx1, vmx2, InMemoryCloud::new())
}

fn deployment_with(
    vmx1: (&str, InstanceState),
    vmx2: (&str, InstanceState),
    cloud: InMemoryCloud,
) -> Deployment {
    let dashboard = InMemoryDashboard::new()
        .with_network("N_hub1", &["vmx1"])
        .with_network("N_hub2", &["vmx2"])
        .with_network("N_branch1", &["branch"])
        .with_network("N_branch2", &["branch"])
        .with_hub("N_hub1", vmx1.0)
        .with_hub("N_hub2", vmx2.0)
        .with_spoke("N_branch1", &["N_hub1", "N_hub2"], &["10.1.0.0/16"])
        .with_spoke("N_branch2", &["N_hub2", "N_hub1"], &["10.2.0.0/16"]);

    let cloud = cloud
        .with_instance("MerakiTag", "vmx1", "i-a", vmx1.1)
        .with_instance("MerakiTag", "vmx2", "i-b", vmx2.1)
        .with_transit_table(TGW_RT)
        .with_local_table(VPC_RT)
        .with_local_route(VPC_RT, "10.100.0.0/16", RouteTarget::Gateway("local".into()));

    let orchestrator = RouteSyncOrchestrator::new(
        config(),
        Arc::new(dashboard.clone()),
        CloudBackends::shared(Arc::new(cloud.clone())),
    );

    Deployment {
        dashboard,
        cloud,
        orchestrator,
    }
}

fn instance(id: &str) -> Option<RouteTarget> {
    Some(RouteTarget::Instance(id.into()))
}

fn transit_destinations(cloud: &InMemoryCloud) -> Vec<String> {
    let mut routes: Vec<_> = cloud
        .transit_routes(TGW_RT)
        .into_iter()
        .inspect(|e| assert_eq!(e.target, RouteTarget::Attachment(TGW_ATTACH.into())))
        .map(|e| e.destination.to_string())
        .collect();
    routes.sort();
    routes
}

#[tokio::test]
async fn both_online_each_appliance_serves_its_own_routes() {
    let d = deployment(("online", InstanceState::Running), ("online", InstanceState::Running));

    let report = d.orchestrator.run_cycle().await.unwrap();

    assert_eq!(report.decision, FailoverDecision::Split);
    assert_eq!(d.cloud.local_target(VPC_RT, "10.1.0.0/16"), instance("i-a"));
    assert_eq!(d.cloud.local_target(VPC_RT, "10.2.0.0/16"), instance("i-b"));
    assert_eq!(transit_destinations(&d.cloud), vec!["10.1.0.0/16", "10.2.0.0/16"]);
    assert_eq!(
        d.cloud.local_target(VPC_RT, "10.100.0.0/16"),
        Some(RouteTarget::Gateway("local".into()))
    );
}

#[tokio::test]
async fn secondary_offline_consolidates_on_primary() {
    let d = deployment(("online", InstanceState::Running), ("offline", InstanceState::Running));

    let report = d.orchestrator.run_cycle().await.unwrap();

    assert_eq!(
        report.decision,
        FailoverDecision::Consolidate { survivor: ApplianceSlot::Primary }
    );
    assert_eq!(d.cloud.local_target(VPC_RT, "10.1.0.0/16"), instance("i-a"));
    assert_eq!(d.cloud.local_target(VPC_RT, "10.2.0.0/16"), instance("i-a"));
    assert_eq!(transit_destinations(&d.cloud), vec!["10.1.0.0/16", "10.2.0.0/16"]);
}

#[tokio::test]
async fn stopped_primary_instance_moves_routes_to_secondary() {
    let d = deployment(("online", InstanceState::Stopped), ("online", InstanceState::Running));

    let report = d.orchestrator.run_cycle().await.unwrap();

    assert_eq!(
        report.decision,
        FailoverDecision::Consolidate { survivor: ApplianceSlot::Secondary }
    );
    assert_eq!(report.appliance(ApplianceSlot::Primary).unwrap().instance_id, None);
    assert_eq!(d.cloud.local_target(VPC_RT, "10.1.0.0/16"), instance("i-b"));
    assert_eq!(d.cloud.local_target(VPC_RT, "10.2.0.0/16"), instance("i-b"));
}

#[tokio::test]
async fn both_offline_mutates_nothing() {
    let d = deployment(("offline", InstanceState::Running), ("online", InstanceState::Stopped));

    let report = d.orchestrator.run_cycle().await.unwrap();

    assert_eq!(report.decision, FailoverDecision::Hold);
    assert!(report.reconciliations.is_empty());
    assert!(d.cloud.mutations().is_empty());
    assert!(d.cloud.transit_routes(TGW_RT).is_empty());
}

#[tokio::test]
async fn rerun_makes_no_further_calls() {
    let d = deployment(("online", InstanceState::Running), ("online", InstanceState::Running));

    d.orchestrator.run_cycle().await.unwrap();
    let after_first = d.cloud.local_routes(VPC_RT);
    d.cloud.clear_mutations();

    let report = d.orchestrator.run_cycle().await.unwrap();

    assert!(d.cloud.mutations().is_empty());
    assert_eq!(report.changed_routes(), 0);
    assert_eq!(d.cloud.local_routes(VPC_RT), after_first);
}

#[tokio::test]
async fn failback_replaces_routes_but_transit_stays() {
    let d = deployment(("online", InstanceState::Running), ("offline", InstanceState::Running));
    d.orchestrator.run_cycle().await.unwrap();
    assert_eq!(d.cloud.local_target(VPC_RT, "10.2.0.0/16"), instance("i-a"));
    d.cloud.clear_mutations();

    d.dashboard.set_device_status("N_hub2", "online");
    let report = d.orchestrator.run_cycle().await.unwrap();

    assert_eq!(report.decision, FailoverDecision::Split);
    assert_eq!(d.cloud.local_target(VPC_RT, "10.2.0.0/16"), instance("i-b"));
    assert_eq!(
        d.cloud.mutations(),
        vec![
            Mutation::LocalCreate { destination: "10.2.0.0/16".parse().unwrap(), instance_id: "i-b".into() },
            Mutation::LocalReplace { destination: "10.2.0.0/16".parse().unwrap(), instance_id: "i-b".into() },
        ]
    );
}

#[tokio::test]
async fn instance_stopping_between_cycles_fails_over() {
    let d = deployment(("online", InstanceState::Running), ("online", InstanceState::Running));
    d.orchestrator.run_cycle().await.unwrap();
    assert_eq!(d.cloud.local_target(VPC_RT, "10.2.0.0/16"), instance("i-b"));
    d.cloud.clear_mutations();

    d.cloud.set_instance_state("i-b", InstanceState::Stopped);
    let report = d.orchestrator.run_cycle().await.unwrap();

    assert_eq!(
        report.decision,
        FailoverDecision::Consolidate { survivor: ApplianceSlot::Primary }
    );
    assert_eq!(report.appliance(ApplianceSlot::Secondary).unwrap().instance_id, None);
    assert_eq!(d.cloud.local_target(VPC_RT, "10.1.0.0/16"), instance("i-a"));
    assert_eq!(d.cloud.local_target(VPC_RT, "10.2.0.0/16"), instance("i-a"));
    assert_eq!(
        d.cloud.mutations(),
        vec![
            Mutation::LocalCreate { destination: "10.2.0.0/16".parse().unwrap(), instance_id: "i-a".into() },
            Mutation::LocalReplace { destination: "10.2.0.0/16".parse().unwrap(), instance_id: "i-a".into() },
        ]
    );
    assert_eq!(report.region, "us-east-1");
}

#[tokio::test]
async fn failing_route_does_not_block_the_rest() {
    let cloud = InMemoryCloud::new().fail_create(
        "10.1.0.0/16",
        CloudError::new("RouteLimitExceeded", "route table is full"),
    );
    let d = deployment_with(("online", InstanceState::Running), ("offline", InstanceState::Running), cloud);

    let report = d.orchestrator.run_cycle().await.unwrap();

    assert_eq!(report.failed_routes(), 2, "transit and local create for 10.1.0.0/16");
    assert_eq!(d.cloud.local_target(VPC_RT, "10.1.0.0/16"), None);
    assert_eq!(d.cloud.local_target(VPC_RT, "10.2.0.0/16"), instance("i-a"));
}

#[tokio::test]
async fn dashboard_outage_aborts_the_cycle() {
    let d = deployment(("online", InstanceState::Running), ("online", InstanceState::Running));
    d.dashboard.set_unavailable(true);

    let err = d.orchestrator.run_cycle().await.unwrap_err();

    assert!(matches!(err, RouteSyncError::Dashboard(_)));
    assert!(d.cloud.mutations().is_empty());
}
