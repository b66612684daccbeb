// Token refresh logic

use async_trait::async_trait;
use reqwest::header::HeaderValue;
use reqwest::{Client, Url};

use super::types::{token_prefix, RefreshResponse, TOKEN_FIELD};
use crate::error::{transport_error_kind, RefreshError};

/// Exchanges the current session for a new bearer credential
#[async_trait]
pub trait Refresher: Send + Sync {
    async fn refresh(&self) -> Result<String, RefreshError>;
}

/// Refresher that calls the backend refresh endpoint
///
/// The endpoint is cookie-authenticated, so the client must share its cookie
/// jar with the client used for login.
pub struct HttpRefresher {
    client: Client,
    url: Url,
}

impl HttpRefresher {
    pub fn new(client: Client, url: Url) -> Self {
        Self { client, url }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl Refresher for HttpRefresher {
    async fn refresh(&self) -> Result<String, RefreshError> {
        tracing::info!("Refreshing session credential...");

        let response = self
            .client
            .post(self.url.clone())
            .header("Content-Type", "application/json")
            .body("{}")
            .send()
            .await
            .map_err(|e| {
                tracing::error!(
                    error_kind = transport_error_kind(&e),
                    error = %e,
                    url = %self.url,
                    "Refresh request failed"
                );
                RefreshError::Transport(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(
                "Session refresh failed: status={}, body={}",
                status,
                body
            );
            return Err(RefreshError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| RefreshError::Transport(e.to_string()))?;

        let data: RefreshResponse =
            serde_json::from_str(&body).map_err(|e| RefreshError::Malformed(e.to_string()))?;

        let token = match data.user_token {
            Some(token) if !token.is_empty() => token,
            _ => return Err(RefreshError::MissingToken(TOKEN_FIELD.to_string())),
        };

        // A credential that cannot be sent would leave every request untagged
        if HeaderValue::from_str(&format!("Bearer {}", token)).is_err() {
            tracing::error!("Refreshed {} is not a valid header value", TOKEN_FIELD);
            return Err(RefreshError::Malformed(format!(
                "{} is not a valid header value",
                TOKEN_FIELD
            )));
        }

        tracing::info!("Session credential refreshed ({}...)", token_prefix(&token));

        Ok(token)
    }
}
