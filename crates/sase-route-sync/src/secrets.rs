//! Dashboard API key retrieval

use crate::{Result, RouteSyncError};
use async_trait::async_trait;
use serde::Deserialize;
use std::fmt;

/// Secret payload as stored by the provider
#[derive(Clone, PartialEq, Eq)]
pub enum SecretValue {
    String(String),
    Binary(Vec<u8>),
}

impl fmt::Debug for SecretValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(_) => f.write_str("SecretValue::String(<redacted>)"),
            Self::Binary(b) => write!(f, "SecretValue::Binary({} bytes)", b.len()),
        }
    }
}

/// Provider error categories for secret lookups
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SecretErrorCode {
    ResourceNotFound,
    InvalidRequest,
    InvalidParameter,
    Other(String),
}

impl SecretErrorCode {
    /// Classify a Secrets Manager error code
    pub fn from_code(code: &str) -> Self {
        match code {
            "ResourceNotFoundException" => Self::ResourceNotFound,
            "InvalidRequestException" => Self::InvalidRequest,
            "InvalidParameterException" => Self::InvalidParameter,
            other => Self::Other(other.to_string()),
        }
    }
}

impl fmt::Display for SecretErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ResourceNotFound => f.write_str("ResourceNotFoundException"),
            Self::InvalidRequest => f.write_str("InvalidRequestException"),
            Self::InvalidParameter => f.write_str("InvalidParameterException"),
            Self::Other(code) => f.write_str(code),
        }
    }
}

/// Secret lookup failure
#[derive(Clone, Debug, thiserror::Error)]
#[error("{code}: {message}")]
pub struct SecretStoreError {
    pub code: SecretErrorCode,
    pub message: String,
}

/// Secret store (AWS Secrets Manager)
#[async_trait]
pub trait SecretStore: Send + Sync {
    async fn get_secret_value(&self, name: &str) -> std::result::Result<SecretValue, SecretStoreError>;
}

/// Dashboard API key
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(<redacted>)")
    }
}

#[derive(Deserialize)]
struct KeyDocument {
    merakiapikey: String,
}

/// Fetch the dashboard API key stored under `name`.
///
/// A string secret is a JSON document with a `merakiapikey` field; a binary
/// secret is the raw key.
pub async fn fetch_dashboard_key(store: &dyn SecretStore, name: &str) -> Result<ApiKey> {
    let value = match store.get_secret_value(name).await {
        Ok(value) => value,
        Err(e) => {
            match &e.code {
                SecretErrorCode::ResourceNotFound => {
                    tracing::error!("The requested secret {} was not found", name)
                }
                SecretErrorCode::InvalidRequest => {
                    tracing::error!("The request was invalid due to {}", e.message)
                }
                SecretErrorCode::InvalidParameter => {
                    tracing::error!("The request had invalid params: {}", e.message)
                }
                SecretErrorCode::Other(code) => {
                    tracing::error!("Secret {} fetch failed with {}: {}", name, code, e.message)
                }
            }
            return Err(RouteSyncError::Secret {
                name: name.to_string(),
                code: e.code,
            });
        }
    };

    let key = match value {
        SecretValue::String(text) => {
            let doc: KeyDocument = serde_json::from_str(&text)
                .map_err(|e| RouteSyncError::SecretFormat(format!("{}: {}", name, e)))?;
            doc.merakiapikey
        }
        SecretValue::Binary(bytes) => String::from_utf8(bytes)
            .map_err(|e| RouteSyncError::SecretFormat(format!("{}: {}", name, e)))?,
    };

    let key = key.trim().to_string();
    if key.is_empty() {
        return Err(RouteSyncError::SecretFormat(format!("{}: empty API key", name)));
    }
    Ok(ApiKey(key))
}
