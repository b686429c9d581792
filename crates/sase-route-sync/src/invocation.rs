//! Invocation handling
//!
//! The handler runs the same cycle for every trigger. Stack lifecycle
//! events (Create/Update/Delete) additionally get a SUCCESS or FAILED
//! response sent to their pre-signed `ResponseURL`; scheduled and instance
//! state-change events do not.

use crate::config::RouteSyncConfig;
use crate::dashboard::DashboardConnector;
use crate::orchestrator::{CloudBackends, CycleReport, RouteSyncOrchestrator};
use crate::secrets::{fetch_dashboard_key, SecretStore};
use crate::{Result, RouteSyncError};
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// Stack lifecycle request type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestType {
    Create,
    Update,
    Delete,
}

/// Stack lifecycle event awaiting a response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LifecycleRequest {
    /// `None` only for an event whose request type could not be read
    pub request_type: Option<RequestType>,
    #[serde(rename = "ResponseURL")]
    pub response_url: String,
    pub stack_id: String,
    pub request_id: String,
    pub logical_resource_id: String,
    #[serde(default)]
    pub physical_resource_id: Option<String>,
}

/// What started this invocation
#[derive(Debug, Clone)]
pub enum TriggerEvent {
    /// Stack create/update/delete, must be acknowledged
    Lifecycle(LifecycleRequest),
    /// Lifecycle event that failed to parse. Still acknowledged, as FAILED,
    /// using whatever fields could be read.
    MalformedLifecycle {
        request: LifecycleRequest,
        error: String,
    },
    /// Schedule or instance state change
    Scheduled(serde_json::Value),
}

impl TriggerEvent {
    /// Classify a raw event payload.
    ///
    /// Any payload carrying `RequestType` and a string `ResponseURL` is a
    /// lifecycle event.
    pub fn from_value(event: serde_json::Value) -> Self {
        let has_response_url = event.get("ResponseURL").and_then(Value::as_str).is_some();
        if event.get("RequestType").is_none() || !has_response_url {
            return Self::Scheduled(event);
        }
        match serde_json::from_value::<LifecycleRequest>(event.clone()) {
            Ok(request) if request.request_type.is_some() => Self::Lifecycle(request),
            Ok(request) => Self::MalformedLifecycle {
                request,
                error: "RequestType is null".to_string(),
            },
            Err(e) => Self::MalformedLifecycle {
                request: LifecycleRequest::salvage(&event),
                error: e.to_string(),
            },
        }
    }

    /// The request to acknowledge, if any
    pub fn lifecycle(&self) -> Option<&LifecycleRequest> {
        match self {
            Self::Lifecycle(request) | Self::MalformedLifecycle { request, .. } => Some(request),
            Self::Scheduled(_) => None,
        }
    }
}

impl LifecycleRequest {
    /// Read what can be read from a lifecycle event that failed to parse
    fn salvage(event: &Value) -> Self {
        let field = |name: &str| event.get(name).and_then(Value::as_str).map(str::to_string);
        Self {
            request_type: event
                .get("RequestType")
                .cloned()
                .and_then(|v| serde_json::from_value(v).ok()),
            response_url: field("ResponseURL").unwrap_or_default(),
            stack_id: field("StackId").unwrap_or_default(),
            request_id: field("RequestId").unwrap_or_default(),
            logical_resource_id: field("LogicalResourceId").unwrap_or_default(),
            physical_resource_id: field("PhysicalResourceId"),
        }
    }
}

/// Lifecycle response status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ResponseStatus {
    Success,
    Failed,
}

/// Sends lifecycle responses back to the provisioning system
#[async_trait]
pub trait LifecycleResponder: Send + Sync {
    async fn respond(&self, request: &LifecycleRequest, status: ResponseStatus, reason: &str) -> Result<()>;
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct ResponseDocument<'a> {
    status: ResponseStatus,
    reason: &'a str,
    physical_resource_id: &'a str,
    stack_id: &'a str,
    request_id: &'a str,
    logical_resource_id: &'a str,
    no_echo: bool,
    data: serde_json::Value,
}

/// PUTs the response document to the request's `ResponseURL`
pub struct HttpLifecycleResponder {
    client: Client,
}

impl HttpLifecycleResponder {
    pub fn new() -> Self {
        Self { client: Client::new() }
    }
}

impl Default for HttpLifecycleResponder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LifecycleResponder for HttpLifecycleResponder {
    async fn respond(&self, request: &LifecycleRequest, status: ResponseStatus, reason: &str) -> Result<()> {
        let document = ResponseDocument {
            status,
            reason,
            physical_resource_id: request
                .physical_resource_id
                .as_deref()
                .unwrap_or(&request.logical_resource_id),
            stack_id: &request.stack_id,
            request_id: &request.request_id,
            logical_resource_id: &request.logical_resource_id,
            no_echo: false,
            data: serde_json::json!({}),
        };
        let body = serde_json::to_vec(&document)
            .map_err(|e| RouteSyncError::Lifecycle(e.to_string()))?;

        tracing::debug!("PUT lifecycle response {:?} for {}", status, request.request_id);
        // The pre-signed URL is signed without a content type
        let response = self
            .client
            .put(&request.response_url)
            .header(CONTENT_TYPE, "")
            .body(body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(RouteSyncError::Lifecycle(format!(
                "response upload returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}

/// Entry point wiring secrets, dashboard and cloud backends into a cycle
pub struct RouteSyncHandler {
    config: Arc<RouteSyncConfig>,
    secrets: Arc<dyn SecretStore>,
    dashboard: Arc<dyn DashboardConnector>,
    backends: CloudBackends,
    responder: Arc<dyn LifecycleResponder>,
}

impl RouteSyncHandler {
    pub fn new(
        config: Arc<RouteSyncConfig>,
        secrets: Arc<dyn SecretStore>,
        dashboard: Arc<dyn DashboardConnector>,
        backends: CloudBackends,
        responder: Arc<dyn LifecycleResponder>,
    ) -> Self {
        Self {
            config,
            secrets,
            dashboard,
            backends,
            responder,
        }
    }

    /// Run one cycle for `event` and acknowledge it if it is a lifecycle event.
    ///
    /// A lifecycle event that fails to parse still runs the cycle and is
    /// acknowledged as FAILED. The cycle outcome is returned as is; a failed
    /// acknowledgment is only logged.
    pub async fn handle(&self, event: serde_json::Value) -> Result<CycleReport> {
        tracing::info!("Executed on event {}", event);
        let trigger = TriggerEvent::from_value(event);
        if let TriggerEvent::MalformedLifecycle { error, .. } = &trigger {
            tracing::error!("Malformed lifecycle event, will acknowledge as FAILED: {}", error);
        }

        let outcome = self.run_cycle().await;
        match &outcome {
            Ok(report) => tracing::info!(
                "Route sync cycle {} finished: {} routes changed, {} failed",
                report.cycle_id,
                report.changed_routes(),
                report.failed_routes()
            ),
            Err(e) => tracing::error!("Route sync cycle failed: {}", e),
        }

        if let Some(request) = trigger.lifecycle() {
            let (status, reason) = match (&trigger, &outcome) {
                (TriggerEvent::MalformedLifecycle { error, .. }, _) => {
                    (ResponseStatus::Failed, format!("malformed lifecycle event: {}", error))
                }
                (_, Ok(report)) => (ResponseStatus::Success, format!("route sync cycle {} completed", report.cycle_id)),
                (_, Err(e)) => (ResponseStatus::Failed, e.to_string()),
            };
            if let Err(e) = self.responder.respond(request, status, &reason).await {
                tracing::error!(
                    "Lifecycle response for {:?} request {} failed: {}",
                    request.request_type, request.request_id, e
                );
            }
        }

        outcome
    }

    async fn run_cycle(&self) -> Result<CycleReport> {
        let api_key = fetch_dashboard_key(self.secrets.as_ref(), &self.config.secret_name).await?;
        let dashboard = self.dashboard.connect(api_key)?;
        RouteSyncOrchestrator::new(self.config.clone(), dashboard, self.backends.clone())
            .run_cycle()
            .await
    }
}
