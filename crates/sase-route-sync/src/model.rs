//! Appliances, route sets and route table entries

use ipnet::IpNet;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Position of an appliance within the redundant pair
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ApplianceSlot {
    /// vMX1
    Primary,
    /// vMX2
    Secondary,
}

impl ApplianceSlot {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Primary => "vMX1",
            Self::Secondary => "vMX2",
        }
    }

    /// The other appliance of the pair
    pub fn peer(&self) -> Self {
        match self {
            Self::Primary => Self::Secondary,
            Self::Secondary => Self::Primary,
        }
    }
}

impl fmt::Display for ApplianceSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operational status of an appliance
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Health {
    Online,
    Offline,
}

impl Health {
    pub fn is_online(&self) -> bool {
        *self == Self::Online
    }
}

impl fmt::Display for Health {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Online => f.write_str("online"),
            Self::Offline => f.write_str("offline"),
        }
    }
}

/// One appliance as resolved for the current cycle
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Appliance {
    pub slot: ApplianceSlot,
    /// Tag shared by the dashboard network and the EC2 instance
    pub tag: String,
    /// Dashboard network id
    pub network_id: String,
    /// EC2 instance id, if a running instance was found
    pub instance_id: Option<String>,
    pub health: Health,
}

/// Deduplicated destination prefixes owned by one appliance for one cycle
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteSet {
    prefixes: BTreeSet<IpNet>,
}

impl RouteSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a prefix, returns false if it was already present
    pub fn insert(&mut self, prefix: IpNet) -> bool {
        self.prefixes.insert(prefix)
    }

    pub fn contains(&self, prefix: &IpNet) -> bool {
        self.prefixes.contains(prefix)
    }

    pub fn len(&self) -> usize {
        self.prefixes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prefixes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &IpNet> {
        self.prefixes.iter()
    }

    pub fn union(&self, other: &RouteSet) -> RouteSet {
        self.prefixes.union(&other.prefixes).copied().collect()
    }

    pub fn difference(&self, other: &RouteSet) -> RouteSet {
        self.prefixes.difference(&other.prefixes).copied().collect()
    }
}

impl FromIterator<IpNet> for RouteSet {
    fn from_iter<I: IntoIterator<Item = IpNet>>(iter: I) -> Self {
        Self {
            prefixes: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a RouteSet {
    type Item = &'a IpNet;
    type IntoIter = std::collections::btree_set::Iter<'a, IpNet>;

    fn into_iter(self) -> Self::IntoIter {
        self.prefixes.iter()
    }
}

impl fmt::Display for RouteSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined = self
            .prefixes
            .iter()
            .map(|p| p.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        write!(f, "[{}]", joined)
    }
}

/// Where a route table entry sends traffic
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RouteTarget {
    /// Transit gateway attachment
    Attachment(String),
    /// EC2 instance
    Instance(String),
    /// Any other next hop (local, igw-, nat-, ...)
    Gateway(String),
}

impl fmt::Display for RouteTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Attachment(id) | Self::Instance(id) | Self::Gateway(id) => f.write_str(id),
        }
    }
}

/// A route as currently present in a route table
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteTableEntry {
    pub destination: IpNet,
    pub target: RouteTarget,
}

impl RouteTableEntry {
    pub fn new(destination: IpNet, target: RouteTarget) -> Self {
        Self { destination, target }
    }

    pub fn targets_instance(&self, instance_id: &str) -> bool {
        matches!(&self.target, RouteTarget::Instance(id) if id == instance_id)
    }
}
