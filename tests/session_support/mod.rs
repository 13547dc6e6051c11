#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use homebase::auth::{MemoryTokenPersistence, TokenPair, UnauthorizedObserver};
use homebase::client::SessionClient;
use homebase::config::SessionConfig;
use homebase::http::{AlwaysOnline, Connectivity, ReqwestTransport};
use serde_json::json;
use wiremock::{MockServer, ResponseTemplate};

/// JWT-shaped token whose `exp` is `secs` from now (negative for the past).
pub fn jwt_expiring_in(secs: i64) -> String {
    jwt_with_claims(json!({ "sub": "user-1", "exp": Utc::now().timestamp() + secs }))
}

pub fn jwt_with_claims(claims: serde_json::Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{header}.{payload}.sig")
}

pub fn pair(access: &str, refresh: Option<&str>) -> TokenPair {
    TokenPair::new(access, refresh.map(String::from))
}

pub fn bearer(token: &str) -> String {
    format!("Bearer {token}")
}

pub fn test_config(server: &MockServer) -> SessionConfig {
    SessionConfig::new(server.uri()).with_request_timeout(Duration::from_secs(5))
}

pub fn client_with(
    config: SessionConfig,
    persistence: Arc<MemoryTokenPersistence>,
    connectivity: Arc<dyn Connectivity>,
) -> SessionClient {
    let transport = ReqwestTransport::new(config.request_timeout()).expect("http client");
    SessionClient::with_parts(config, persistence, Arc::new(transport), connectivity)
}

pub fn client_for(server: &MockServer, persistence: Arc<MemoryTokenPersistence>) -> SessionClient {
    client_with(test_config(server), persistence, Arc::new(AlwaysOnline))
}

/// Client already logged in with `access`/`refresh`.
pub fn logged_in_client(server: &MockServer, access: &str, refresh: Option<&str>) -> SessionClient {
    let client = client_for(server, Arc::new(MemoryTokenPersistence::new()));
    client
        .session()
        .login(pair(access, refresh))
        .expect("login");
    client
}

pub fn refresh_success(access: &str, refresh: Option<&str>) -> ResponseTemplate {
    let mut data = json!({ "accessToken": access });
    if let Some(refresh) = refresh {
        data["refreshToken"] = json!(refresh);
    }
    ResponseTemplate::new(200).set_body_json(json!({ "success": true, "data": data }))
}

#[derive(Default)]
pub struct CountingObserver {
    calls: AtomicUsize,
}

impl CountingObserver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl UnauthorizedObserver for CountingObserver {
    fn on_unauthorized(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}
