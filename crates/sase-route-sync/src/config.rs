//! Route Sync Configuration

use crate::{ApplianceSlot, Result, RouteSyncError};
use serde::{Deserialize, Serialize};

/// Default Secrets Manager secret holding the dashboard API key
pub const DEFAULT_SECRET_NAME: &str = "MerakiAPIKey";
/// Default EC2 tag key used to find the vMX instances
pub const DEFAULT_INSTANCE_TAG_KEY: &str = "MerakiTag";
/// Default dashboard API base URL
pub const DEFAULT_DASHBOARD_URL: &str = "https://api.meraki.com/api/v1";

/// Immutable configuration for one route sync deployment.
///
/// Built once at startup and shared with every component.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteSyncConfig {
    /// Dashboard organization id
    pub org_id: String,
    /// Transit gateway route table id
    pub transit_route_table_id: String,
    /// Transit gateway attachment id of the SD-WAN VPC
    pub transit_attachment_id: String,
    /// SD-WAN VPC route table id
    pub local_route_table_id: String,
    /// Tag of the first appliance
    pub primary_tag: String,
    /// Tag of the second appliance
    pub secondary_tag: String,
    /// AWS region
    pub region: String,
    #[serde(default = "default_secret_name")]
    pub secret_name: String,
    #[serde(default = "default_instance_tag_key")]
    pub instance_tag_key: String,
    #[serde(default = "default_dashboard_url")]
    pub dashboard_url: String,
}

fn default_secret_name() -> String {
    DEFAULT_SECRET_NAME.into()
}

fn default_instance_tag_key() -> String {
    DEFAULT_INSTANCE_TAG_KEY.into()
}

fn default_dashboard_url() -> String {
    DEFAULT_DASHBOARD_URL.into()
}

impl RouteSyncConfig {
    /// Load from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key).ok_or_else(|| RouteSyncError::Config(format!("{} is not set", key)))
        };

        let config = Self {
            org_id: required("MERAKI_ORG_ID")?,
            transit_route_table_id: required("TGW_RT_ID")?,
            transit_attachment_id: required("TGW_ATTACH_ID")?,
            local_route_table_id: required("RT_ID")?,
            primary_tag: required("vMX1Tag")?,
            secondary_tag: required("vMX2Tag")?,
            region: required("AWS_REGION")?,
            secret_name: lookup("MERAKI_SECRET_NAME").unwrap_or_else(default_secret_name),
            instance_tag_key: lookup("INSTANCE_TAG_KEY").unwrap_or_else(default_instance_tag_key),
            dashboard_url: lookup("MERAKI_BASE_URL").unwrap_or_else(default_dashboard_url),
        };
        config.validate()?;
        Ok(config)
    }

    /// Load from a JSON file
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| RouteSyncError::Config(format!("{}: {}", path, e)))?;
        let config: Self = serde_json::from_str(&content)
            .map_err(|e| RouteSyncError::Config(format!("{}: {}", path, e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject empty identifiers and an ambiguous appliance pair
    pub fn validate(&self) -> Result<()> {
        let fields = [
            ("org_id", &self.org_id),
            ("transit_route_table_id", &self.transit_route_table_id),
            ("transit_attachment_id", &self.transit_attachment_id),
            ("local_route_table_id", &self.local_route_table_id),
            ("primary_tag", &self.primary_tag),
            ("secondary_tag", &self.secondary_tag),
            ("region", &self.region),
            ("secret_name", &self.secret_name),
            ("instance_tag_key", &self.instance_tag_key),
            ("dashboard_url", &self.dashboard_url),
        ];
        for (name, value) in fields {
            if value.trim().is_empty() {
                return Err(RouteSyncError::Config(format!("{} must not be empty", name)));
            }
        }
        if self.primary_tag.eq_ignore_ascii_case(&self.secondary_tag) {
            return Err(RouteSyncError::Config(
                "appliance tags must differ".to_string(),
            ));
        }
        Ok(())
    }

    /// Tag for an appliance slot
    pub fn tag(&self, slot: ApplianceSlot) -> &str {
        match slot {
            ApplianceSlot::Primary => &self.primary_tag,
            ApplianceSlot::Secondary => &self.secondary_tag,
        }
    }
}
