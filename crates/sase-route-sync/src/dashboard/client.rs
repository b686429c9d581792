//! Meraki Dashboard API Client
//!
//! REST wrapper for the handful of organization-wide queries a sync cycle
//! needs. List endpoints are paginated with `perPage` and an RFC 8288
//! `Link` header; every call follows `rel=next` until exhausted.

use super::models::{DeviceStatus, Network, VpnStatus};
use super::{DashboardClient, DashboardConnector};
use crate::secrets::ApiKey;
use crate::{Result, RouteSyncError};
use async_trait::async_trait;
use reqwest::header::LINK;
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::debug;

const VPN_STATUSES_PER_PAGE: u32 = 300;
const NETWORKS_PER_PAGE: u32 = 100_000;
const DEVICE_STATUSES_PER_PAGE: u32 = 1000;

/// Meraki Dashboard API client
pub struct MerakiDashboardClient {
    /// API base URL
    base_url: String,
    /// HTTP client
    client: Client,
    /// API key
    api_key: ApiKey,
}

impl MerakiDashboardClient {
    /// Create new dashboard client
    pub fn new(base_url: &str, api_key: ApiKey) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: Client::new(),
            api_key,
        }
    }

    /// GET every page of a list endpoint
    async fn get_all<T: DeserializeOwned>(&self, path: &str, per_page: u32) -> Result<Vec<T>> {
        let mut url = format!("{}{}?perPage={}", self.base_url, path, per_page);
        let mut items = Vec::new();

        loop {
            debug!("GET {}", url);

            let response = self
                .client
                .get(&url)
                .bearer_auth(self.api_key.expose())
                .send()
                .await?;

            if !response.status().is_success() {
                let status = response.status();
                let text = response.text().await.unwrap_or_default();
                return Err(RouteSyncError::Dashboard(format!("{}: {}", status, text)));
            }

            let next = response
                .headers()
                .get(LINK)
                .and_then(|v| v.to_str().ok())
                .and_then(next_link);

            let page: Vec<T> = response
                .json()
                .await
                .map_err(|e| RouteSyncError::Dashboard(e.to_string()))?;
            items.extend(page);

            match next {
                Some(next) if next != url => url = next,
                _ => break,
            }
        }

        Ok(items)
    }
}

#[async_trait]
impl DashboardClient for MerakiDashboardClient {
    async fn vpn_statuses(&self, org_id: &str) -> Result<Vec<VpnStatus>> {
        self.get_all(
            &format!("/organizations/{}/appliance/vpn/statuses", org_id),
            VPN_STATUSES_PER_PAGE,
        )
        .await
    }

    async fn networks(&self, org_id: &str) -> Result<Vec<Network>> {
        self.get_all(&format!("/organizations/{}/networks", org_id), NETWORKS_PER_PAGE)
            .await
    }

    async fn device_statuses(&self, org_id: &str) -> Result<Vec<DeviceStatus>> {
        self.get_all(
            &format!("/organizations/{}/devices/statuses", org_id),
            DEVICE_STATUSES_PER_PAGE,
        )
        .await
    }
}

/// Connects [`MerakiDashboardClient`]s to a fixed base URL
pub struct MerakiConnector {
    base_url: String,
}

impl MerakiConnector {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.to_string(),
        }
    }
}

impl DashboardConnector for MerakiConnector {
    fn connect(&self, api_key: ApiKey) -> Result<Arc<dyn DashboardClient>> {
        Ok(Arc::new(MerakiDashboardClient::new(&self.base_url, api_key)))
    }
}

/// Extract the `rel=next` target from a `Link` header
fn next_link(header: &str) -> Option<String> {
    header.split(',').find_map(|part| {
        let mut pieces = part.split(';');
        let target = pieces.next()?.trim();
        let is_next = pieces.any(|p| {
            let p = p.trim();
            p == "rel=next" || p == "rel=\"next\""
        });
        if !is_next {
            return None;
        }
        target
            .strip_prefix('<')
            .and_then(|t| t.strip_suffix('>'))
            .map(str::to_string)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path, query_param, query_param_is_missing};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_next_link() {
        let header = "<https://api.meraki.com/api/v1/x?startingAfter=a>; rel=first, \
                      <https://api.meraki.com/api/v1/x?startingAfter=b>; rel=next, \
                      <https://api.meraki.com/api/v1/x?endingBefore=z>; rel=last";
        assert_eq!(
            next_link(header).as_deref(),
            Some("https://api.meraki.com/api/v1/x?startingAfter=b")
        );
        assert_eq!(next_link("<https://a/b>; rel=\"next\"").as_deref(), Some("https://a/b"));
        assert_eq!(next_link("<https://a/b>; rel=prev"), None);
    }

    #[tokio::test]
    async fn test_networks_follow_pagination() {
        let server = MockServer::start().await;
        let next = format!(
            "<{}/organizations/42/networks?perPage=100000&startingAfter=N_1>; rel=next",
            server.uri()
        );

        Mock::given(method("GET"))
            .and(path("/organizations/42/networks"))
            .and(query_param_is_missing("startingAfter"))
            .and(header("Authorization", "Bearer secret-key"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("Link", next.as_str())
                    .set_body_json(serde_json::json!([
                        {"id": "N_1", "name": "vMX1", "tags": ["vmx1"]}
                    ])),
            )
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/organizations/42/networks"))
            .and(query_param("startingAfter", "N_1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"id": "N_2", "name": "vMX2", "tags": ["vmx2"]}
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let client = MerakiDashboardClient::new(&server.uri(), ApiKey::new("secret-key"));
        let networks = client.networks("42").await.unwrap();

        assert_eq!(networks.len(), 2);
        assert_eq!(networks[1].id, "N_2");
    }

    #[tokio::test]
    async fn test_error_status_is_dashboard_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/organizations/42/devices/statuses"))
            .respond_with(ResponseTemplate::new(401).set_body_string("Invalid API key"))
            .mount(&server)
            .await;

        let client = MerakiDashboardClient::new(&server.uri(), ApiKey::new("bad"));
        let err = client.device_statuses("42").await.unwrap_err();

        match err {
            RouteSyncError::Dashboard(msg) => assert!(msg.contains("401")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_connector_builds_client() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/organizations/7/appliance/vpn/statuses"))
            .and(query_param("perPage", "300"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"networkId": "N_s", "vpnMode": "spoke",
                 "exportedSubnets": [{"subnet": "10.9.0.0/16"}],
                 "merakiVpnPeers": [{"networkId": "N_hub"}]}
            ])))
            .mount(&server)
            .await;

        let client = MerakiConnector::new(&format!("{}/", server.uri()))
            .connect(ApiKey::new("k"))
            .unwrap();
        let statuses = client.vpn_statuses("7").await.unwrap();
        assert_eq!(statuses.len(), 1);
        assert!(statuses[0].is_spoke());
    }
}
