//! Single-flight access-token refresh.
//!
//! The first caller that needs a new access token starts one refresh call;
//! every caller arriving while it runs is queued as a waiter and receives the
//! same outcome. The waiter queue is drained exactly once per cycle, so each
//! waiter gets a terminal result and failure observers fire once.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use reqwest::header::HeaderMap;
use reqwest::Method;
use serde::Serialize;
use tokio::sync::oneshot;

use super::api::{Envelope, TokenPayload};
use super::error::AuthError;
use super::store::TokenStore;
use super::token::TokenPair;
use crate::error::ApiError;
use crate::http::transport::{HttpRequest, Transport};

/// Notified when the session can no longer be refreshed.
pub trait UnauthorizedObserver: Send + Sync {
    fn on_unauthorized(&self);
}

/// Handle returned by [`RefreshCoordinator::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

type RefreshOutcome = Result<String, ApiError>;

#[derive(Default)]
struct RefreshState {
    in_progress: bool,
    waiters: Vec<oneshot::Sender<RefreshOutcome>>,
}

struct Inner {
    transport: Arc<dyn Transport>,
    store: Arc<TokenStore>,
    refresh_url: String,
    state: Mutex<RefreshState>,
    observers: Mutex<Vec<(ObserverId, Arc<dyn UnauthorizedObserver>)>>,
    next_observer_id: AtomicU64,
    refresh_calls: AtomicUsize,
}

/// Coordinates refreshes of the access token held in [`TokenStore`].
///
/// Cheap to clone; clones share the same in-progress flag and waiter queue.
#[derive(Clone)]
pub struct RefreshCoordinator {
    inner: Arc<Inner>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

impl RefreshCoordinator {
    pub fn new(
        transport: Arc<dyn Transport>,
        store: Arc<TokenStore>,
        refresh_url: impl Into<String>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                transport,
                store,
                refresh_url: refresh_url.into(),
                state: Mutex::new(RefreshState::default()),
                observers: Mutex::new(Vec::new()),
                next_observer_id: AtomicU64::new(1),
                refresh_calls: AtomicUsize::new(0),
            }),
        }
    }

    /// Register an observer for unrecoverable refresh failures.
    pub fn register(&self, observer: Arc<dyn UnauthorizedObserver>) -> ObserverId {
        let id = ObserverId(self.inner.next_observer_id.fetch_add(1, Ordering::Relaxed));
        self.inner
            .observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, observer));
        id
    }

    /// Remove a registered observer. Returns false if it was not registered.
    pub fn unregister(&self, id: ObserverId) -> bool {
        let mut observers = self
            .inner
            .observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let before = observers.len();
        observers.retain(|(existing, _)| *existing != id);
        observers.len() != before
    }

    /// Number of refresh calls sent to the network so far.
    pub fn refresh_count(&self) -> usize {
        self.inner.refresh_calls.load(Ordering::SeqCst)
    }

    /// Whether a refresh cycle is currently running.
    pub fn is_refreshing(&self) -> bool {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .in_progress
    }

    /// Obtain an access token newer than `rejected`.
    ///
    /// `rejected` is the token the caller's request was sent with, if any.
    /// When the store has already moved past it (a refresh settled after the
    /// request left), the current token is returned without a network call,
    /// or `AuthExpired` if the session was torn down meanwhile. Otherwise the
    /// caller starts or joins the single in-flight refresh.
    pub async fn obtain_fresh_token(&self, rejected: Option<&str>) -> Result<String, ApiError> {
        let receiver = {
            let mut state = self.inner.state.lock().unwrap_or_else(PoisonError::into_inner);
            if !state.in_progress {
                if let Some(rejected) = rejected {
                    match self.inner.store.access_token() {
                        Some(current) if current != rejected => {
                            tracing::debug!("token already refreshed; skipping refresh");
                            return Ok(current);
                        }
                        None => {
                            tracing::debug!("session already cleared; not refreshing");
                            return Err(ApiError::AuthExpired);
                        }
                        Some(_) => {}
                    }
                }
            }

            let (sender, receiver) = oneshot::channel();
            state.waiters.push(sender);
            if state.in_progress {
                tracing::debug!(waiters = state.waiters.len(), "joining in-flight refresh");
            } else {
                state.in_progress = true;
                let coordinator = self.clone();
                // Spawned so that no caller going away can cancel the cycle.
                tokio::spawn(async move { coordinator.run_cycle().await });
            }
            receiver
        };

        receiver.await.unwrap_or(Err(ApiError::AuthExpired))
    }

    async fn run_cycle(self) {
        let result = self.refresh_once().await;

        if let Err(err) = &result {
            tracing::warn!(error = %err, "token refresh failed; clearing session");
            if let Err(clear_err) = self.inner.store.clear() {
                tracing::warn!(error = %clear_err, "failed to clear persisted tokens");
            }
        }

        let waiters = {
            let mut state = self.inner.state.lock().unwrap_or_else(PoisonError::into_inner);
            state.in_progress = false;
            std::mem::take(&mut state.waiters)
        };

        let outcome: RefreshOutcome = result.map_err(|_| ApiError::AuthExpired);
        tracing::debug!(waiters = waiters.len(), ok = outcome.is_ok(), "refresh settled");
        for waiter in waiters {
            // A waiter whose caller went away has nobody to tell.
            let _ = waiter.send(outcome.clone());
        }

        if outcome.is_err() {
            self.notify_unauthorized();
        }
    }

    async fn refresh_once(&self) -> Result<String, AuthError> {
        let refresh_token = self
            .inner
            .store
            .refresh_token()
            .ok_or(AuthError::NoRefreshToken)?;

        self.inner.refresh_calls.fetch_add(1, Ordering::SeqCst);
        let body = serde_json::to_value(RefreshRequest {
            refresh_token: &refresh_token,
        })?;
        let request = HttpRequest {
            method: Method::POST,
            url: self.inner.refresh_url.clone(),
            headers: HeaderMap::new(),
            body: Some(body),
        };
        let response = self
            .inner
            .transport
            .send(request)
            .await
            .map_err(|err| AuthError::RefreshRejected(err.to_string()))?;
        if !response.is_success() {
            return Err(AuthError::RefreshRejected(format!(
                "refresh endpoint returned status {}",
                response.status
            )));
        }

        let envelope: Envelope<TokenPayload> = serde_json::from_str(&response.body)
            .map_err(|err| AuthError::InvalidResponse(err.to_string()))?;
        let payload = envelope.into_data().map_err(AuthError::RefreshRejected)?;
        let pair = TokenPair::new(
            payload.access_token,
            payload.refresh_token.or(Some(refresh_token)),
        );
        let access_token = pair.access_token.clone();
        self.inner.store.set(Some(pair))?;
        tracing::info!("access token refreshed");
        Ok(access_token)
    }

    fn notify_unauthorized(&self) {
        let observers: Vec<_> = self
            .inner
            .observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, observer)| observer.clone())
            .collect();
        for observer in observers {
            observer.on_unauthorized();
        }
    }
}
