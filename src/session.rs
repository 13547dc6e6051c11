//! Application authentication state machine.
//!
//! Transitions:
//! - `Checking` → `Authenticated` | `Unauthenticated` (cold start)
//! - `Authenticated` → `Unauthenticated` (logout, refresh failure)
//! - `Unauthenticated` → `Authenticated` (login, successful refresh)
//!
//! Nothing ever re-enters `Checking`.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use strum::Display;
use tokio::sync::watch;

use crate::auth::error::AuthError;
use crate::auth::refresh::{ObserverId, RefreshCoordinator, UnauthorizedObserver};
use crate::auth::store::TokenStore;
use crate::auth::token::{is_access_token_fresh, TokenPair};

/// Externally observable authentication status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum SessionStatus {
    /// Startup; persisted tokens have not been evaluated yet.
    Checking,
    Authenticated,
    Unauthenticated,
}

/// State shared with the refresh coordinator's unauthorized hook.
struct SessionShared {
    store: Arc<TokenStore>,
    status_tx: watch::Sender<SessionStatus>,
}

impl SessionShared {
    fn transition(&self, next: SessionStatus) -> bool {
        self.status_tx.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            if next == SessionStatus::Checking {
                tracing::warn!(from = %current, "ignoring transition back to Checking");
                return false;
            }
            tracing::info!(from = %current, to = %next, "session status changed");
            *current = next;
            true
        })
    }

    fn logout(&self) {
        if let Err(err) = self.store.clear() {
            tracing::warn!(error = %err, "failed to clear persisted tokens on logout");
        }
        self.transition(SessionStatus::Unauthenticated);
    }
}

impl UnauthorizedObserver for SessionShared {
    fn on_unauthorized(&self) {
        self.logout();
    }
}

/// Sole writer of [`SessionStatus`].
///
/// On construction it registers itself with the [`RefreshCoordinator`] so an
/// unrecoverable refresh failure logs the user out; the registration is
/// removed on drop.
///
/// # Example
///
/// ```ignore
/// let session = client.session();
/// let mut status = session.subscribe();
/// session.bootstrap().await;
/// while status.changed().await.is_ok() {
///     route_for(*status.borrow());
/// }
/// ```
pub struct SessionBootstrapper {
    shared: Arc<SessionShared>,
    coordinator: RefreshCoordinator,
    expiry_margin: chrono::Duration,
    observer_id: ObserverId,
}

impl SessionBootstrapper {
    pub fn new(
        store: Arc<TokenStore>,
        coordinator: RefreshCoordinator,
        expiry_margin: Duration,
    ) -> Self {
        let (status_tx, _) = watch::channel(SessionStatus::Checking);
        let shared = Arc::new(SessionShared { store, status_tx });
        let observer_id = coordinator.register(shared.clone());
        Self {
            shared,
            coordinator,
            expiry_margin: chrono::Duration::from_std(expiry_margin)
                .unwrap_or_else(|_| chrono::Duration::zero()),
            observer_id,
        }
    }

    pub fn status(&self) -> SessionStatus {
        *self.shared.status_tx.borrow()
    }

    /// Subscribe to status changes.
    ///
    /// Callers can `.changed().await` on the returned receiver to be notified
    /// whenever the status moves.
    pub fn subscribe(&self) -> watch::Receiver<SessionStatus> {
        self.shared.status_tx.subscribe()
    }

    /// Cold-start evaluation of persisted tokens.
    ///
    /// Never fails: unreadable storage or a failed refresh both end in
    /// `Unauthenticated`. Once out of `Checking` this behaves like
    /// [`check_session`](Self::check_session).
    pub async fn bootstrap(&self) -> SessionStatus {
        if self.status() != SessionStatus::Checking {
            return self.check_session().await;
        }

        let persisted = match self.shared.store.load_persisted() {
            Ok(pair) => pair,
            Err(err) => {
                tracing::warn!(error = %err, "could not read persisted session");
                None
            }
        };
        let Some(pair) = persisted else {
            tracing::debug!("no persisted session");
            return self.settle(false);
        };
        if let Err(err) = self.shared.store.restore(pair) {
            tracing::warn!(error = %err, "persisted session is unusable");
            self.discard();
            return self.settle(false);
        }

        let valid = self.validate_current().await;
        self.settle(valid)
    }

    /// Re-validate the current access token, refreshing it if it has
    /// expired. Does not pass through `Checking`.
    pub async fn check_session(&self) -> SessionStatus {
        let valid = self.validate_current().await;
        self.settle(valid)
    }

    /// Adopt a freshly issued pair and become `Authenticated`.
    pub fn login(&self, pair: TokenPair) -> Result<(), AuthError> {
        if pair.access_token.trim().is_empty() {
            return Err(AuthError::NotLoggedIn);
        }
        self.shared.store.set(Some(pair))?;
        self.shared.transition(SessionStatus::Authenticated);
        Ok(())
    }

    /// Clear the session and become `Unauthenticated`.
    pub fn logout(&self) {
        self.shared.logout();
    }

    async fn validate_current(&self) -> bool {
        let Some(pair) = self.shared.store.get() else {
            return false;
        };
        if is_access_token_fresh(&pair.access_token, self.expiry_margin, Utc::now()) {
            tracing::debug!("access token still valid locally");
            return true;
        }
        if pair.refresh_token.is_none() {
            tracing::debug!("access token expired and no refresh token");
            self.discard();
            return false;
        }
        match self.coordinator.obtain_fresh_token(None).await {
            Ok(_) => true,
            Err(err) => {
                tracing::debug!(error = %err, "session refresh failed");
                false
            }
        }
    }

    fn settle(&self, valid: bool) -> SessionStatus {
        let next = if valid {
            SessionStatus::Authenticated
        } else {
            SessionStatus::Unauthenticated
        };
        self.shared.transition(next);
        self.status()
    }

    fn discard(&self) {
        if let Err(err) = self.shared.store.clear() {
            tracing::warn!(error = %err, "failed to clear persisted tokens");
        }
    }
}

impl Drop for SessionBootstrapper {
    fn drop(&mut self) {
        self.coordinator.unregister(self.observer_id);
    }
}
