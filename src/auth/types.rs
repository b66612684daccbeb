// Authentication types

use serde::{Deserialize, Serialize};

/// Name of the credential field in auth responses
pub const TOKEN_FIELD: &str = "userToken";

/// Credential together with the store generation it was read at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialSnapshot {
    pub token: Option<String>,
    pub epoch: u64,
}

/// Login request body
#[derive(Serialize)]
pub struct LoginRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

/// Registration request body
#[derive(Debug, Clone, Serialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

/// Login / register response
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub user_token: Option<String>,
    #[serde(default)]
    pub user: Option<serde_json::Value>,
}

/// Refresh endpoint response
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    pub user_token: Option<String>,
}

/// Shorten a credential for log output
pub fn token_prefix(token: &str) -> &str {
    let end = token
        .char_indices()
        .nth(8)
        .map(|(i, _)| i)
        .unwrap_or(token.len());
    &token[..end]
}
