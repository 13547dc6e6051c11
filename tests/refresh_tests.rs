//! Single-flight token refresh across concurrent requests.

mod session_support;

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use homebase::auth::MemoryTokenPersistence;
use homebase::error::ApiError;
use homebase::http::RequestDescriptor;
use homebase::session::SessionStatus;
use pretty_assertions::assert_eq;
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use session_support::{bearer, client_for, logged_in_client, pair, refresh_success, CountingObserver};

const CONCURRENT_REQUESTS: usize = 10;

async fn mount_protected(server: &MockServer, stale: &str, fresh: &str, fresh_hits: u64) {
    Mock::given(method("GET"))
        .and(path("/households"))
        .and(header("authorization", bearer(stale)))
        .respond_with(ResponseTemplate::new(401))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/households"))
        .and(header("authorization", bearer(fresh)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "id": 1 }])))
        .expect(fresh_hits)
        .mount(server)
        .await;
}

#[tokio::test]
async fn concurrent_401s_share_one_refresh() {
    let server = MockServer::start().await;
    mount_protected(&server, "old", "new", CONCURRENT_REQUESTS as u64).await;
    Mock::given(method("POST"))
        .and(path("/auth/refreshtoken"))
        .and(body_json(json!({ "refreshToken": "refresh-old" })))
        .respond_with(
            refresh_success("new", Some("refresh-new")).set_delay(Duration::from_millis(100)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let persistence = Arc::new(MemoryTokenPersistence::new());
    let client = client_for(&server, persistence.clone());
    client.session().login(pair("old", Some("refresh-old"))).unwrap();

    let pipeline = client.pipeline();
    let results = join_all(
        (0..CONCURRENT_REQUESTS).map(|_| pipeline.execute(RequestDescriptor::get("/households"))),
    )
    .await;

    for result in results {
        let response = result.expect("request retried with fresh token");
        assert_eq!(response.status, 200);
    }
    assert_eq!(client.coordinator().refresh_count(), 1);
    assert!(!client.coordinator().is_refreshing());
    assert_eq!(client.store().access_token().as_deref(), Some("new"));
    assert_eq!(
        persistence.snapshot().and_then(|pair| pair.refresh_token),
        Some("refresh-new".to_string())
    );
    assert_eq!(client.session().status(), SessionStatus::Authenticated);
}

#[tokio::test]
async fn failed_refresh_fails_everyone_and_notifies_once() {
    let server = MockServer::start().await;
    mount_protected(&server, "old", "new", 0).await;
    Mock::given(method("POST"))
        .and(path("/auth/refreshtoken"))
        .respond_with(ResponseTemplate::new(500).set_delay(Duration::from_millis(100)))
        .expect(1)
        .mount(&server)
        .await;

    let persistence = Arc::new(MemoryTokenPersistence::new());
    let client = client_for(&server, persistence.clone());
    client.session().login(pair("old", Some("refresh-old"))).unwrap();
    let observer = CountingObserver::new();
    client.coordinator().register(observer.clone());

    let pipeline = client.pipeline();
    let results = join_all(
        (0..CONCURRENT_REQUESTS).map(|_| pipeline.execute(RequestDescriptor::get("/households"))),
    )
    .await;

    for result in results {
        assert_eq!(result.unwrap_err(), ApiError::AuthExpired);
    }
    assert_eq!(observer.calls(), 1);
    assert!(client.store().is_empty());
    assert!(persistence.snapshot().is_none());
    assert_eq!(client.session().status(), SessionStatus::Unauthenticated);
}

#[tokio::test]
async fn unsuccessful_envelope_is_a_refresh_failure() {
    let server = MockServer::start().await;
    mount_protected(&server, "old", "new", 0).await;
    Mock::given(method("POST"))
        .and(path("/auth/refreshtoken"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": false,
            "message": "Refresh token revoked"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = logged_in_client(&server, "old", Some("refresh-old"));
    let observer = CountingObserver::new();
    client.coordinator().register(observer.clone());

    let err = client
        .pipeline()
        .execute(RequestDescriptor::get("/households"))
        .await
        .unwrap_err();

    assert_eq!(err, ApiError::AuthExpired);
    assert!(client.store().is_empty());
    assert_eq!(observer.calls(), 1);
}

#[tokio::test]
async fn missing_refresh_token_fails_without_network() {
    let server = MockServer::start().await;
    mount_protected(&server, "old", "new", 0).await;
    Mock::given(method("POST"))
        .and(path("/auth/refreshtoken"))
        .respond_with(refresh_success("new", None))
        .expect(0)
        .mount(&server)
        .await;

    let client = logged_in_client(&server, "old", None);
    let err = client
        .pipeline()
        .execute(RequestDescriptor::get("/households"))
        .await
        .unwrap_err();

    assert_eq!(err, ApiError::AuthExpired);
    assert_eq!(client.coordinator().refresh_count(), 0);
    assert_eq!(client.session().status(), SessionStatus::Unauthenticated);
}

#[tokio::test]
async fn refresh_without_rotation_keeps_refresh_token() {
    let server = MockServer::start().await;
    mount_protected(&server, "old", "new", 1).await;
    Mock::given(method("POST"))
        .and(path("/auth/refreshtoken"))
        .respond_with(refresh_success("new", None))
        .expect(1)
        .mount(&server)
        .await;

    let client = logged_in_client(&server, "old", Some("refresh-old"));
    client
        .pipeline()
        .execute(RequestDescriptor::get("/households"))
        .await
        .expect("retried request");

    let stored = client.store().get().expect("session kept");
    assert_eq!(stored.access_token, "new");
    assert_eq!(stored.refresh_token.as_deref(), Some("refresh-old"));
}

#[tokio::test]
async fn later_expiry_starts_a_new_cycle() {
    let server = MockServer::start().await;
    mount_protected(&server, "old", "new", 2).await;
    Mock::given(method("POST"))
        .and(path("/auth/refreshtoken"))
        .respond_with(refresh_success("new", Some("refresh-new")))
        .expect(2)
        .mount(&server)
        .await;

    let client = logged_in_client(&server, "old", Some("refresh-old"));
    client
        .pipeline()
        .execute(RequestDescriptor::get("/households"))
        .await
        .expect("first retry");

    // Logging in again puts the stale token back in the store.
    client.session().login(pair("old", Some("refresh-old"))).unwrap();
    client
        .pipeline()
        .execute(RequestDescriptor::get("/households"))
        .await
        .expect("second retry");

    assert_eq!(client.coordinator().refresh_count(), 2);
}
