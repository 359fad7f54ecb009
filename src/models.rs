use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Identity produced by a login driver. Never mutated by the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserModel {
    pub id: String,
    #[serde(default)]
    pub mappings: BTreeMap<String, String>,
}

impl UserModel {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            mappings: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_mapping(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.mappings.insert(key.into(), value.into());
        self
    }
}

/// Plaintext sealed inside the session cookie
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionPayload {
    pub id: String,
    pub provider: String,
    /// Absolute expiry in epoch seconds
    pub expires_at: i64,
    pub user: UserModel,
    pub csrf_token: String,
}

/// Short-lived state carried across a login round trip
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginState {
    pub provider: String,
    pub return_url: Option<String>,
    pub nonce: String,
}

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
}

/// Body of `GET /auth/session`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInformation {
    pub state: SessionState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Authenticated,
    Anonymous,
}
