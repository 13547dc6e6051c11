use std::fmt;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::AuthError;

/// Access/refresh token pair held by [`TokenStore`](super::TokenStore).
///
/// # Example
/// ```
/// use homebase::auth::TokenPair;
///
/// let pair = TokenPair::new("access", Some("refresh".to_string()));
/// assert_eq!(pair.refresh_token.as_deref(), Some("refresh"));
/// ```
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

impl TokenPair {
    pub fn new(access_token: impl Into<String>, refresh_token: Option<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token,
        }
    }
}

impl fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenPair")
            .field("access_token", &"..")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| ".."))
            .finish()
    }
}

/// Read the `exp` claim of a JWT-like access token.
///
/// The signature is not checked. The result is only a hint for deciding
/// whether to try the token locally; the backend still validates every call.
pub fn access_token_expiry(token: &str) -> Result<DateTime<Utc>, AuthError> {
    let mut parts = token.split('.');
    let _header = parts
        .next()
        .filter(|part| !part.is_empty())
        .ok_or_else(|| AuthError::InvalidToken("missing JWT header".into()))?;
    let payload = parts
        .next()
        .ok_or_else(|| AuthError::InvalidToken("missing JWT payload".into()))?;
    let decoded = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|_| AuthError::InvalidToken("payload is not base64url".into()))?;
    let claims: Value = serde_json::from_slice(&decoded)
        .map_err(|_| AuthError::InvalidToken("payload is not JSON".into()))?;
    let exp = claims
        .get("exp")
        .and_then(|exp| exp.as_i64().or_else(|| exp.as_f64().map(|f| f as i64)))
        .ok_or_else(|| AuthError::InvalidToken("missing exp claim".into()))?;
    DateTime::<Utc>::from_timestamp(exp, 0)
        .ok_or_else(|| AuthError::InvalidToken(format!("exp out of range: {exp}")))
}

/// True when the token's expiry lies more than `margin` after `now`.
/// Undecodable tokens are treated as expired.
pub fn is_access_token_fresh(token: &str, margin: Duration, now: DateTime<Utc>) -> bool {
    match access_token_expiry(token) {
        Ok(expires_at) => expires_at - margin > now,
        Err(err) => {
            tracing::debug!(error = %err, "access token expiry unreadable");
            false
        }
    }
}
