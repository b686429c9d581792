//! Failover Policy
//!
//! Decides which appliance owns which routes for the current cycle.
//!
//! | Primary | Secondary | Decision |
//! |---------|-----------|----------|
//! | online  | online    | Split: each owns its own routes |
//! | online  | offline   | Consolidate on primary |
//! | offline | online    | Consolidate on secondary |
//! | offline | offline   | Hold: no route table is touched |

use crate::model::{ApplianceSlot, Health, RouteSet};
use ipnet::IpNet;
use serde::{Deserialize, Serialize};

/// Outcome of the policy for one cycle
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailoverDecision {
    /// Both online, each appliance serves the routes advertised to it
    Split,
    /// One survivor serves every advertised route
    Consolidate { survivor: ApplianceSlot },
    /// Both offline, routes stay as last known good
    Hold,
}

/// Routes assigned to one owning appliance
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    pub owner: ApplianceSlot,
    pub routes: RouteSet,
}

/// Authoritative ownership for one cycle. Assignments never share a prefix.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnershipPlan {
    pub decision: FailoverDecision,
    pub assignments: Vec<Assignment>,
}

impl OwnershipPlan {
    /// Owner of `prefix`, `None` if unowned this cycle
    pub fn owner_of(&self, prefix: &IpNet) -> Option<ApplianceSlot> {
        self.assignments
            .iter()
            .find(|a| a.routes.contains(prefix))
            .map(|a| a.owner)
    }

    /// True when no route table may be mutated
    pub fn is_hold(&self) -> bool {
        self.decision == FailoverDecision::Hold
    }
}

/// Pair failover policy
pub struct FailoverPolicy;

impl FailoverPolicy {
    /// Decide ownership from both appliances' routes and health.
    ///
    /// In a split, a prefix advertised to both appliances stays with the
    /// primary so that every prefix has exactly one owner.
    pub fn decide(
        primary: (&RouteSet, Health),
        secondary: (&RouteSet, Health),
    ) -> OwnershipPlan {
        let (primary_routes, primary_health) = primary;
        let (secondary_routes, secondary_health) = secondary;

        match (primary_health, secondary_health) {
            (Health::Online, Health::Online) => {
                tracing::info!("vMX Status: vMX1 and vMX2 are both online");
                OwnershipPlan {
                    decision: FailoverDecision::Split,
                    assignments: vec![
                        Assignment {
                            owner: ApplianceSlot::Primary,
                            routes: primary_routes.clone(),
                        },
                        Assignment {
                            owner: ApplianceSlot::Secondary,
                            routes: secondary_routes.difference(primary_routes),
                        },
                    ],
                }
            }
            (Health::Online, Health::Offline) => {
                Self::consolidate(ApplianceSlot::Primary, primary_routes, secondary_routes)
            }
            (Health::Offline, Health::Online) => {
                Self::consolidate(ApplianceSlot::Secondary, primary_routes, secondary_routes)
            }
            (Health::Offline, Health::Offline) => {
                tracing::warn!("vMX Status: vMX1 and vMX2 are BOTH offline, leaving route tables untouched");
                OwnershipPlan {
                    decision: FailoverDecision::Hold,
                    assignments: Vec::new(),
                }
            }
        }
    }

    fn consolidate(survivor: ApplianceSlot, primary: &RouteSet, secondary: &RouteSet) -> OwnershipPlan {
        tracing::info!(
            "vMX Status: {} online and {} offline, moving all routes to {}",
            survivor,
            survivor.peer(),
            survivor
        );
        OwnershipPlan {
            decision: FailoverDecision::Consolidate { survivor },
            assignments: vec![Assignment {
                owner: survivor,
                routes: primary.union(secondary),
            }],
        }
    }
}
