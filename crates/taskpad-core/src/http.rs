use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use reqwest::Method;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use taskpad_wire::{RefreshRequest, RefreshResponse};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::error::ApiError;
use crate::session::{SessionKey, SessionStore};

pub const AUTHORIZATION: &str = "Authorization";

#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Value>,
    retried: bool,
    log_path: Option<String>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: Vec::new(),
            body: None,
            retried: false,
            log_path: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn json<T: Serialize>(mut self, body: &T) -> Result<Self, ApiError> {
        self.body = Some(serde_json::to_value(body)?);
        Ok(self)
    }

    /// Logs `shown` instead of the real path, for paths that embed
    /// one-time secrets.
    pub fn redact_path(mut self, shown: impl Into<String>) -> Self {
        self.log_path = Some(shown.into());
        self
    }

    pub fn log_path(&self) -> &str {
        self.log_path.as_deref().unwrap_or(&self.path)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn set_header(&mut self, name: &str, value: String) {
        self.headers.retain(|(key, _)| !key.eq_ignore_ascii_case(name));
        self.headers.push((name.to_string(), value));
    }

    pub fn bearer(&self) -> Option<&str> {
        self.header(AUTHORIZATION)
            .and_then(|value| value.strip_prefix("Bearer "))
    }

    pub fn is_retried(&self) -> bool {
        self.retried
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: String,
}

impl ApiResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    fn into_result(self) -> Result<Value, ApiError> {
        if !self.is_success() {
            return Err(ApiError::Http {
                status: self.status,
                body: self.body,
            });
        }
        if self.body.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&self.body)?)
    }
}

/// Moves one request over the wire. Implementations never interpret
/// status codes; transport-level failures map to `ApiError::Network`.
pub trait Transport: Send + Sync {
    fn dispatch(
        &self,
        request: &ApiRequest,
    ) -> impl Future<Output = Result<ApiResponse, ApiError>> + Send;
}

#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    base_url: String,
}

impl ReqwestTransport {
    pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed building HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn url_for(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

impl Transport for ReqwestTransport {
    fn dispatch(
        &self,
        request: &ApiRequest,
    ) -> impl Future<Output = Result<ApiResponse, ApiError>> + Send {
        async move {
            let url = self.url_for(&request.path);
            let shown = self.url_for(request.log_path());
            let mut builder = self
                .client
                .request(request.method.clone(), url.as_str())
                .header(reqwest::header::ACCEPT, "application/json");
            for (name, value) in &request.headers {
                builder = builder.header(name.as_str(), value.as_str());
            }
            if let Some(body) = &request.body {
                builder = builder
                    .header(reqwest::header::CONTENT_TYPE, "application/json")
                    .body(body.to_string());
            }

            let response = builder.send().await.map_err(|err| {
                // reqwest errors carry the full url; the span has the redacted one.
                let err = err.without_url();
                warn!(url = %shown, error = %err, "request failed before a response arrived");
                ApiError::Network(err.to_string())
            })?;
            let status = response.status().as_u16();
            let body = response
                .text()
                .await
                .map_err(|err| ApiError::Network(err.without_url().to_string()))?;
            debug!(method = %request.method, url = %shown, status, "received response");
            Ok(ApiResponse { status, body })
        }
    }
}

/// Performs the move to the login screen once the session is gone.
pub trait Navigator: Send + Sync {
    fn redirect_to_login(&self);
}

/// Attaches the stored bearer token to every request and recovers from an
/// expired access token with one refresh and one retry.
pub struct AuthenticatedHttpClient<T> {
    transport: T,
    store: Arc<dyn SessionStore>,
    navigator: Arc<dyn Navigator>,
    refresh_path: String,
    refresh_gate: Mutex<()>,
}

impl<T: Transport> AuthenticatedHttpClient<T> {
    pub fn new(
        transport: T,
        store: Arc<dyn SessionStore>,
        navigator: Arc<dyn Navigator>,
        refresh_path: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            store,
            navigator,
            refresh_path: refresh_path.into(),
            refresh_gate: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Returns the parsed body of a 2xx response.
    #[instrument(skip(self, request), fields(method = %request.method, path = %request.log_path()))]
    pub async fn send(&self, mut request: ApiRequest) -> Result<Value, ApiError> {
        let sent_with = self.attach_token(&mut request);
        let response = self.transport.dispatch(&request).await?;
        if response.status != 401 {
            return response.into_result();
        }

        if request.retried {
            warn!("retried request was rejected again");
            return Err(self.expire_session());
        }

        info!("access token rejected; refreshing");
        let token = self.refresh_after(sent_with.as_deref()).await?;

        request.retried = true;
        request.set_header(AUTHORIZATION, format!("Bearer {token}"));
        let response = self.transport.dispatch(&request).await?;
        if response.status == 401 {
            warn!("retried request was rejected again");
            return Err(self.expire_session());
        }
        response.into_result()
    }

    pub async fn send_json<R: DeserializeOwned>(&self, request: ApiRequest) -> Result<R, ApiError> {
        let value = self.send(request).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// For endpoints used before a session exists: no token, no refresh.
    #[instrument(skip(self, request), fields(method = %request.method, path = %request.log_path()))]
    pub async fn send_public(&self, request: ApiRequest) -> Result<Value, ApiError> {
        self.transport.dispatch(&request).await?.into_result()
    }

    pub async fn send_public_json<R: DeserializeOwned>(
        &self,
        request: ApiRequest,
    ) -> Result<R, ApiError> {
        let value = self.send_public(request).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Exchanges the stored refresh token for a new access token and
    /// persists it. A rotated refresh token is persisted too.
    #[instrument(skip(self))]
    pub async fn refresh(&self) -> Result<String, ApiError> {
        let refresh = self
            .store
            .get(SessionKey::RefreshToken)
            .ok_or(ApiError::AuthExpired)?;

        let request = ApiRequest::post(self.refresh_path.as_str()).json(&RefreshRequest { refresh })?;
        let response = self.transport.dispatch(&request).await?;
        let value = response.into_result()?;
        let fresh: RefreshResponse = serde_json::from_value(value)?;

        self.store.set(SessionKey::AccessToken, &fresh.access)?;
        if let Some(rotated) = &fresh.refresh {
            debug!("refresh token rotated");
            self.store.set(SessionKey::RefreshToken, rotated)?;
        }
        info!("access token refreshed");
        Ok(fresh.access)
    }

    // Single-flight: whoever waited on the gate while another request
    // refreshed reuses its outcome, a new token or an ended session. A
    // failed refresh ends the session before the gate is released.
    async fn refresh_after(&self, stale: Option<&str>) -> Result<String, ApiError> {
        let _gate = self.refresh_gate.lock().await;
        match self.store.get(SessionKey::AccessToken) {
            Some(current) if Some(current.as_str()) != stale => {
                debug!("access token already refreshed by a concurrent request");
                return Ok(current);
            }
            None if stale.is_some() => {
                debug!("session already ended by a concurrent request");
                return Err(ApiError::AuthExpired);
            }
            _ => {}
        }

        match self.refresh().await {
            Ok(token) => Ok(token),
            Err(err) => {
                warn!(error = %err, "token refresh failed");
                Err(self.expire_session())
            }
        }
    }

    fn attach_token(&self, request: &mut ApiRequest) -> Option<String> {
        let token = self.store.get(SessionKey::AccessToken)?;
        request.set_header(AUTHORIZATION, format!("Bearer {token}"));
        Some(token)
    }

    fn expire_session(&self) -> ApiError {
        if let Err(err) = self.store.clear() {
            warn!(error = %err, "failed clearing session after expiry");
        }
        self.navigator.redirect_to_login();
        ApiError::AuthExpired
    }
}
