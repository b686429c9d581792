//! Dashboard API models

use serde::{Deserialize, Serialize};

/// VPN mode value for spoke networks
pub const VPN_MODE_SPOKE: &str = "spoke";

/// Site-to-site VPN status of one appliance network
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VpnStatus {
    pub network_id: String,
    #[serde(default)]
    pub network_name: Option<String>,
    #[serde(default)]
    pub device_serial: Option<String>,
    #[serde(default)]
    pub device_status: Option<String>,
    pub vpn_mode: String,
    #[serde(default)]
    pub exported_subnets: Vec<ExportedSubnet>,
    #[serde(default)]
    pub meraki_vpn_peers: Vec<VpnPeer>,
}

impl VpnStatus {
    pub fn is_spoke(&self) -> bool {
        self.vpn_mode == VPN_MODE_SPOKE
    }

    /// Hub the spoke prefers; the dashboard lists peers in hub priority order
    pub fn primary_peer(&self) -> Option<&VpnPeer> {
        self.meraki_vpn_peers.first()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportedSubnet {
    pub subnet: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VpnPeer {
    pub network_id: String,
    #[serde(default)]
    pub network_name: Option<String>,
    #[serde(default)]
    pub reachability: Option<String>,
}

/// Dashboard network
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Network {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl Network {
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t.eq_ignore_ascii_case(tag))
    }
}

/// Device status as reported by the dashboard
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceStatus {
    #[serde(default)]
    pub name: Option<String>,
    pub serial: String,
    #[serde(default)]
    pub network_id: Option<String>,
    pub status: String,
    #[serde(default)]
    pub product_type: Option<String>,
}

impl DeviceStatus {
    pub fn is_online(&self) -> bool {
        self.status == "online"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vpn_status_deserialize() {
        let json = r#"{
            "networkId": "N_spoke1",
            "networkName": "Branch 1",
            "deviceSerial": "Q2XX-AAAA-0001",
            "deviceStatus": "online",
            "uplinks": [{"interface": "wan1", "publicIp": "198.51.100.10"}],
            "vpnMode": "spoke",
            "exportedSubnets": [{"subnet": "10.1.0.0/16", "name": "lan"}],
            "merakiVpnPeers": [
                {"networkId": "N_hub1", "networkName": "vMX1", "reachability": "reachable"},
                {"networkId": "N_hub2", "networkName": "vMX2", "reachability": "reachable"}
            ],
            "thirdPartyVpnPeers": []
        }"#;
        let status: VpnStatus = serde_json::from_str(json).unwrap();
        assert!(status.is_spoke());
        assert_eq!(status.primary_peer().unwrap().network_id, "N_hub1");
        assert_eq!(status.exported_subnets[0].subnet, "10.1.0.0/16");
    }

    #[test]
    fn test_network_tag_match_is_exact() {
        let network = Network {
            id: "N_1".into(),
            name: "vMX1".into(),
            tags: vec!["VMX1".into(), "aws".into()],
        };
        assert!(network.has_tag("vmx1"));
        assert!(!network.has_tag("vmx"));
    }
}
