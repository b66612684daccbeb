use anyhow::Context;
use reqwest::{Client, Method, Request, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use crate::auth::{
    AuthResponse, CredentialStore, HttpRefresher, LoginRequest, RefreshCoordinator, RefreshLease,
    RefreshTurn, Refresher, RegisterRequest, RequestTagger, SessionTeardown, TOKEN_FIELD,
};
use crate::config::{AuthEndpoints, Config};
use crate::error::{transport_error_kind, GatewayError, RefreshError, Result};

/// HTTP client for the Quizzard API
///
/// Tags every request with the session credential. A 401 on an ordinary
/// endpoint refreshes the credential once (shared by all concurrent
/// failures) and replays the request a single time.
pub struct GatewayClient {
    /// Shared HTTP client with connection pooling and cookie store
    client: Client,

    /// Base URL, always ending in '/'
    base_url: Url,

    endpoints: AuthEndpoints,

    store: Arc<CredentialStore>,
    tagger: RequestTagger,
    coordinator: RefreshCoordinator,
    refresher: Arc<dyn Refresher>,
    teardown: Arc<dyn SessionTeardown>,
}

impl GatewayClient {
    pub fn new(
        client: Client,
        base_url: Url,
        endpoints: AuthEndpoints,
        store: Arc<CredentialStore>,
        refresher: Arc<dyn Refresher>,
        teardown: Arc<dyn SessionTeardown>,
    ) -> Self {
        Self {
            client,
            base_url,
            endpoints,
            tagger: RequestTagger::new(store.clone()),
            store,
            coordinator: RefreshCoordinator::new(),
            refresher,
            teardown,
        }
    }

    /// Create a gateway from configuration, refreshing via the backend endpoint
    pub fn from_config(
        config: &Config,
        store: Arc<CredentialStore>,
        teardown: Arc<dyn SessionTeardown>,
    ) -> anyhow::Result<Self> {
        let client = Client::builder()
            .cookie_store(true)
            .pool_max_idle_per_host(config.http_max_connections)
            .connect_timeout(Duration::from_secs(config.http_connect_timeout))
            .timeout(Duration::from_secs(config.http_request_timeout))
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = config.parsed_base_url()?;
        let refresh_url = join_path(&base_url, &config.endpoints.refresh)?;
        let refresher = Arc::new(HttpRefresher::new(client.clone(), refresh_url));

        Ok(Self::new(
            client,
            base_url,
            config.endpoints.clone(),
            store,
            refresher,
            teardown,
        ))
    }

    /// Replace the refresh collaborator
    pub fn with_refresher(mut self, refresher: Arc<dyn Refresher>) -> Self {
        self.refresher = refresher;
        self
    }

    pub fn credential_store(&self) -> &Arc<CredentialStore> {
        &self.store
    }

    pub fn coordinator(&self) -> &RefreshCoordinator {
        &self.coordinator
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn is_authenticated(&self) -> bool {
        !self.store.is_empty()
    }

    /// Absolute URL for an API path
    pub fn url(&self, path: &str) -> Result<Url> {
        join_path(&self.base_url, path).map_err(|e| GatewayError::ConfigError(e.to_string()))
    }

    /// Start building a request against the API
    pub fn request(&self, method: Method, path: &str) -> Result<RequestBuilder> {
        Ok(self.client.request(method, self.url(path)?))
    }

    /// Execute a request with credential tagging and refresh-on-401
    pub async fn execute(&self, mut request: Request) -> Result<Response> {
        let request_id = uuid::Uuid::new_v4().to_string()[..8].to_string();
        let method = request.method().clone();
        let url = request.url().clone();

        // Untagged copy for a possible replay
        let replay = request.try_clone();
        let sent = self.tagger.tag(&mut request);

        tracing::debug!(
            request_id = %request_id,
            method = %method,
            url = %url,
            authenticated = sent.token.is_some(),
            "Sending HTTP request"
        );

        let response = self.send(request, &request_id).await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return check_status(response, &request_id).await;
        }

        if self.endpoints.is_excluded(url.path()) {
            tracing::debug!(
                request_id = %request_id,
                "Received 401 from auth endpoint, not refreshing"
            );
            return Err(unauthorized(response).await);
        }

        let Some(mut replay) = replay else {
            tracing::warn!(
                request_id = %request_id,
                "Received 401 but request body is not replayable"
            );
            return Err(unauthorized(response).await);
        };
        drop(response);

        tracing::warn!(request_id = %request_id, "Received 401, recovering credential...");
        let token = self.recover(sent.epoch, &request_id).await?;

        RequestTagger::tag_with(&mut replay, &token);
        tracing::debug!(request_id = %request_id, "Replaying request with new credential");

        let response = self.send(replay, &request_id).await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            tracing::warn!(
                request_id = %request_id,
                url = %url,
                "Replayed request rejected again, giving up"
            );
            return Err(unauthorized(response).await);
        }

        check_status(response, &request_id).await
    }

    /// Obtain a credential newer than the one tagged at `sent_epoch`
    async fn recover(&self, sent_epoch: u64, request_id: &str) -> Result<String> {
        loop {
            match self.coordinator.begin(&self.store, sent_epoch) {
                RefreshTurn::Reuse(token) => {
                    tracing::debug!(
                        request_id = %request_id,
                        "Credential changed while request was in flight, reusing it"
                    );
                    return Ok(token);
                }

                RefreshTurn::Ended => {
                    return Err(GatewayError::AuthError(
                        "Session ended while request was in flight".to_string(),
                    ))
                }

                RefreshTurn::Wait(pending) => {
                    tracing::debug!(request_id = %request_id, "Waiting for in-flight refresh");
                    match pending.wait().await {
                        Ok(token) => return Ok(token),
                        // Leader cancelled before settling; the session is untouched
                        Err(RefreshError::Abandoned) => {
                            tracing::debug!(
                                request_id = %request_id,
                                "In-flight refresh abandoned, retrying recovery"
                            );
                        }
                        Err(err) => return Err(GatewayError::SessionExpired(err)),
                    }
                }

                RefreshTurn::Lead(lease) => return self.lead_refresh(lease, request_id).await,
            }
        }
    }

    /// Drive the refresh and settle every parked request with its outcome
    async fn lead_refresh(&self, lease: RefreshLease<'_>, request_id: &str) -> Result<String> {
        match self.refresher.refresh().await {
            Ok(token) => {
                if let Err(e) = self.store.set(&token) {
                    tracing::warn!("Failed to persist refreshed credential: {:#}", e);
                }
                let released = lease.resolve(&token);
                tracing::info!(
                    request_id = %request_id,
                    released,
                    "Credential refreshed"
                );
                Ok(token)
            }
            Err(err) => {
                if let Err(e) = self.store.clear() {
                    tracing::warn!("Failed to clear stored credential: {:#}", e);
                }
                let released = lease.reject(err.clone());
                tracing::error!(
                    request_id = %request_id,
                    released,
                    error = %err,
                    "Credential refresh failed, ending session"
                );
                self.teardown.end_session(&err);
                Err(GatewayError::SessionExpired(err))
            }
        }
    }

    async fn send(&self, request: Request, request_id: &str) -> Result<Response> {
        let url = request.url().clone();
        match self.client.execute(request).await {
            Ok(response) => {
                tracing::debug!(
                    request_id = %request_id,
                    status = %response.status(),
                    "Received HTTP response"
                );
                Ok(response)
            }
            Err(e) => {
                tracing::warn!(
                    request_id = %request_id,
                    error_kind = transport_error_kind(&e),
                    error = %e,
                    url = %url,
                    "HTTP request error"
                );
                Err(GatewayError::Transport(e))
            }
        }
    }

    /// GET `path` and decode the JSON response
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let request = self.request(Method::GET, path)?.build()?;
        let response = self.execute(request).await?;
        read_json(response).await
    }

    /// POST `body` as JSON to `path` and decode the JSON response
    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let request = self.request(Method::POST, path)?.json(body).build()?;
        let response = self.execute(request).await?;
        read_json(response).await
    }

    /// Send an arbitrary request; an empty response body decodes to `null`
    pub async fn send_json(&self, method: Method, path: &str, body: Option<&Value>) -> Result<Value> {
        let mut builder = self.request(method, path)?;
        if let Some(body) = body {
            builder = builder.json(body);
        }
        let response = self.execute(builder.build()?).await?;

        let text = response.text().await?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        let value = serde_json::from_str(&text).context("Failed to parse response JSON")?;
        Ok(value)
    }

    /// Log in and store the returned credential
    pub async fn login(&self, email: &str, password: &str) -> Result<AuthResponse> {
        tracing::info!("Logging in as {}", email);

        let auth: AuthResponse = self
            .post_json(&self.endpoints.login, &LoginRequest { email, password })
            .await?;

        let token = auth
            .user_token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                GatewayError::AuthError(format!("Login response does not contain {}", TOKEN_FIELD))
            })?;

        self.store
            .set(token)
            .context("Failed to persist session credential")?;

        tracing::info!("✅ Logged in");
        Ok(auth)
    }

    /// Create an account; stores the credential when the backend logs the user in
    pub async fn register(&self, request: &RegisterRequest) -> Result<AuthResponse> {
        tracing::info!("Registering {}", request.email);

        let auth: AuthResponse = self.post_json(&self.endpoints.register, request).await?;

        match auth.user_token.as_deref().filter(|t| !t.is_empty()) {
            Some(token) => {
                self.store
                    .set(token)
                    .context("Failed to persist session credential")?;
                tracing::info!("✅ Registered and logged in");
            }
            None => tracing::info!("✅ Registered; log in to start a session"),
        }

        Ok(auth)
    }

    /// End the session on the backend, then forget the credential regardless
    pub async fn logout(&self) -> Result<()> {
        if let Err(e) = self.notify_logout().await {
            tracing::warn!("Logout call failed, clearing local session anyway: {}", e);
        }

        self.store
            .clear()
            .context("Failed to clear stored credential")?;

        tracing::info!("👋 Logged out");
        Ok(())
    }

    /// Tell the backend the session is over. Never refreshes: an expired
    /// credential at logout is simply dropped.
    async fn notify_logout(&self) -> Result<()> {
        let request_id = uuid::Uuid::new_v4().to_string()[..8].to_string();
        let mut request = self.request(Method::POST, &self.endpoints.logout)?.build()?;
        self.tagger.tag(&mut request);

        let response = self.send(request, &request_id).await?;
        check_status(response, &request_id).await?;
        Ok(())
    }
}

/// Join an absolute API path onto the base URL, keeping the base path
fn join_path(base: &Url, path: &str) -> anyhow::Result<Url> {
    base.join(path.trim_start_matches('/'))
        .with_context(|| format!("Invalid API path: {}", path))
}

/// Pass successful responses through; turn anything else into `ApiError`
async fn check_status(response: Response, request_id: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let url = response.url().clone();
    let message = response.text().await.unwrap_or_default();
    tracing::warn!(
        request_id = %request_id,
        status = status.as_u16(),
        url = %url,
        response_body = %message,
        "HTTP request failed with error response"
    );

    Err(GatewayError::ApiError {
        status: status.as_u16(),
        message,
    })
}

async fn unauthorized(response: Response) -> GatewayError {
    let body = response.text().await.unwrap_or_default();
    if body.is_empty() {
        GatewayError::AuthError("401 Unauthorized".to_string())
    } else {
        GatewayError::AuthError(body)
    }
}

async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T> {
    let text = response.text().await?;
    let value = serde_json::from_str(&text).context("Failed to parse response JSON")?;
    Ok(value)
}
