//! Outbound request pipeline.
//!
//! Every call runs the same ordered stages:
//! 1. connectivity gate (offline fails before any network or token work)
//! 2. authorization (bearer from [`TokenStore`] unless allow-listed)
//! 3. dispatch
//! 4. unauthorized recovery (one refresh through [`RefreshCoordinator`],
//!    then exactly one retry per descriptor)
//! 5. classification of anything that is not a 2xx

use std::sync::Arc;

use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};
use reqwest::Method;
use serde::de::DeserializeOwned;
use uuid::Uuid;

use super::connectivity::Connectivity;
use super::transport::{HttpRequest, HttpResponse, Transport};
use crate::auth::refresh::RefreshCoordinator;
use crate::auth::store::TokenStore;
use crate::config::SessionConfig;
use crate::error::{classify, ApiError, Failure};

const REQUEST_ID_HEADER: &str = "x-request-id";
const UNAUTHORIZED: u16 = 401;

/// One logical outbound call.
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    pub method: Method,
    pub path: String,
    pub body: Option<serde_json::Value>,
    pub correlation_id: Uuid,
    pub started_at: DateTime<Utc>,
    /// Set once the call has been replayed after a refresh.
    pub retried: bool,
}

impl RequestDescriptor {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            correlation_id: Uuid::new_v4(),
            started_at: Utc::now(),
            retried: false,
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

    pub fn with_body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }
}

/// Successful (2xx) response.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub body: String,
    pub correlation_id: Uuid,
}

impl ApiResponse {
    /// Decode the body. A malformed success body is reported as a server
    /// message rather than a transport failure.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        serde_json::from_str(&self.body).map_err(|err| {
            tracing::debug!(
                correlation_id = %self.correlation_id,
                error = %err,
                "response body did not match expected shape"
            );
            ApiError::ServerMessage {
                status: Some(self.status),
                message: "Received an unexpected response from the server.".to_string(),
            }
        })
    }
}

/// Wraps every outbound call; see the module docs for the stage order.
pub struct RequestPipeline {
    config: SessionConfig,
    transport: Arc<dyn Transport>,
    connectivity: Arc<dyn Connectivity>,
    store: Arc<TokenStore>,
    coordinator: RefreshCoordinator,
}

impl RequestPipeline {
    pub fn new(
        config: SessionConfig,
        transport: Arc<dyn Transport>,
        connectivity: Arc<dyn Connectivity>,
        store: Arc<TokenStore>,
        coordinator: RefreshCoordinator,
    ) -> Self {
        Self {
            config,
            transport,
            connectivity,
            store,
            coordinator,
        }
    }

    /// Execute a call, refreshing and retrying once on a 401 from a
    /// protected endpoint.
    pub async fn execute(&self, mut descriptor: RequestDescriptor) -> Result<ApiResponse, ApiError> {
        if !self.connectivity.is_online().await {
            tracing::debug!(
                correlation_id = %descriptor.correlation_id,
                path = %descriptor.path,
                "offline; request not dispatched"
            );
            return Err(classify(&Failure::Offline));
        }

        let public = self.config.is_unauthenticated(&descriptor.path);
        let bearer = if public { None } else { self.store.bearer_header() };
        let sent_token = bearer.as_ref().and_then(access_token_from_bearer);
        let response = self.dispatch(&descriptor, bearer).await?;

        if response.status != UNAUTHORIZED || public || descriptor.retried {
            return self.finish(&descriptor, response);
        }

        tracing::debug!(
            correlation_id = %descriptor.correlation_id,
            path = %descriptor.path,
            "unauthorized; obtaining fresh token"
        );
        let fresh = self.coordinator.obtain_fresh_token(sent_token.as_deref()).await?;
        descriptor.retried = true;
        let bearer = bearer_value(&fresh)?;
        let response = self.dispatch(&descriptor, Some(bearer)).await?;
        self.finish(&descriptor, response)
    }

    /// Execute and decode a JSON body.
    pub async fn execute_json<T: DeserializeOwned>(
        &self,
        descriptor: RequestDescriptor,
    ) -> Result<T, ApiError> {
        self.execute(descriptor).await?.json()
    }

    async fn dispatch(
        &self,
        descriptor: &RequestDescriptor,
        bearer: Option<HeaderValue>,
    ) -> Result<HttpResponse, ApiError> {
        let mut headers = HeaderMap::new();
        if let Ok(value) = HeaderValue::from_str(&descriptor.correlation_id.to_string()) {
            headers.insert(HeaderName::from_static(REQUEST_ID_HEADER), value);
        }
        if let Some(bearer) = bearer {
            headers.insert(AUTHORIZATION, bearer);
        }
        let request = HttpRequest {
            method: descriptor.method.clone(),
            url: self.config.url_for(&descriptor.path),
            headers,
            body: descriptor.body.clone(),
        };

        let result = self.transport.send(request).await;
        let elapsed_ms = (Utc::now() - descriptor.started_at).num_milliseconds();
        match result {
            Ok(response) => {
                tracing::debug!(
                    correlation_id = %descriptor.correlation_id,
                    method = %descriptor.method,
                    path = %descriptor.path,
                    status = response.status,
                    retried = descriptor.retried,
                    elapsed_ms,
                    "request completed"
                );
                Ok(response)
            }
            Err(err) => {
                tracing::debug!(
                    correlation_id = %descriptor.correlation_id,
                    method = %descriptor.method,
                    path = %descriptor.path,
                    error = %err,
                    elapsed_ms,
                    "request failed without response"
                );
                Err(classify(&Failure::from(err)))
            }
        }
    }

    fn finish(
        &self,
        descriptor: &RequestDescriptor,
        response: HttpResponse,
    ) -> Result<ApiResponse, ApiError> {
        if response.is_success() {
            return Ok(ApiResponse {
                status: response.status,
                body: response.body,
                correlation_id: descriptor.correlation_id,
            });
        }
        Err(classify(&Failure::Response {
            status: response.status,
            body: response.body,
        }))
    }
}

fn bearer_value(token: &str) -> Result<HeaderValue, ApiError> {
    let mut value = HeaderValue::from_str(&format!("Bearer {token}")).map_err(|_| {
        tracing::warn!("refreshed access token is not a valid header value");
        ApiError::AuthExpired
    })?;
    value.set_sensitive(true);
    Ok(value)
}

fn access_token_from_bearer(value: &HeaderValue) -> Option<String> {
    value
        .to_str()
        .ok()
        .and_then(|raw| raw.strip_prefix("Bearer "))
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptors_get_unique_correlation_ids() {
        let a = RequestDescriptor::get("/households");
        let b = RequestDescriptor::get("/households");
        assert_ne!(a.correlation_id, b.correlation_id);
        assert!(!a.retried);
    }

    #[test]
    fn bearer_round_trips_token() {
        let value = bearer_value("abc.def.ghi").unwrap();
        assert_eq!(access_token_from_bearer(&value).as_deref(), Some("abc.def.ghi"));
    }

    #[test]
    fn malformed_success_body_is_server_message() {
        let response = ApiResponse {
            status: 200,
            body: "<html>".into(),
            correlation_id: Uuid::new_v4(),
        };
        let err = response.json::<serde_json::Value>().unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::ServerMessage);
    }
}
