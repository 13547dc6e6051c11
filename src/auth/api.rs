//! OTP login endpoints.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;

use super::token::TokenPair;
use crate::error::ApiError;
use crate::http::pipeline::{RequestDescriptor, RequestPipeline};

pub const SEND_OTP_PATH: &str = "/auth/sendotp";
pub const VERIFY_OTP_PATH: &str = "/auth/verifyotp";
pub const REFRESH_TOKEN_PATH: &str = "/auth/refreshtoken";

/// Response wrapper used by the auth endpoints.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct Envelope<T> {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    pub data: Option<T>,
}

impl<T> Envelope<T> {
    /// The payload of a successful envelope, or the reason it is unusable.
    pub fn into_data(self) -> Result<T, String> {
        if !self.success {
            return Err(self
                .message
                .unwrap_or_else(|| "request was not successful".to_string()));
        }
        self.data
            .ok_or_else(|| "response is missing data".to_string())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TokenPayload {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// Client for the unauthenticated OTP endpoints.
///
/// Both calls go through [`RequestPipeline`]; their paths are on the
/// allow-list, so no bearer header is attached and a 401 never triggers a
/// refresh.
#[derive(Clone)]
pub struct AuthApi {
    pipeline: Arc<RequestPipeline>,
}

impl AuthApi {
    pub fn new(pipeline: Arc<RequestPipeline>) -> Self {
        Self { pipeline }
    }

    /// Send (or resend) an OTP to `phone`. Returns the server's message.
    pub async fn send_otp(&self, phone: &str) -> Result<String, ApiError> {
        let body = json!({ "phone": phone });
        let envelope: Envelope<serde_json::Value> = self.call(SEND_OTP_PATH, body).await?;
        match (envelope.success, envelope.message) {
            (true, message) => Ok(message.unwrap_or_else(|| "OTP sent".to_string())),
            (false, message) => Err(ApiError::ServerMessage {
                status: None,
                message: message.unwrap_or_else(|| "Could not send OTP".to_string()),
            }),
        }
    }

    /// Exchange an OTP for a token pair. The caller decides whether to log in
    /// with it.
    pub async fn verify_otp(&self, phone: &str, otp: &str) -> Result<TokenPair, ApiError> {
        let body = json!({ "phone": phone, "otp": otp });
        let envelope: Envelope<TokenPayload> = self.call(VERIFY_OTP_PATH, body).await?;
        let payload = envelope_ok(envelope)?;
        Ok(TokenPair::new(payload.access_token, payload.refresh_token))
    }

    async fn call<T: DeserializeOwned>(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> Result<Envelope<T>, ApiError> {
        let descriptor = RequestDescriptor::post(path).with_body(body);
        self.pipeline.execute_json(descriptor).await
    }
}

fn envelope_ok<T>(envelope: Envelope<T>) -> Result<T, ApiError> {
    envelope
        .into_data()
        .map_err(|message| ApiError::ServerMessage {
            status: None,
            message,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn successful_envelope_yields_data() {
        let envelope: Envelope<TokenPayload> = serde_json::from_str(
            r#"{"success":true,"data":{"accessToken":"a","refreshToken":"r"}}"#,
        )
        .unwrap();
        let payload = envelope.into_data().unwrap();
        assert_eq!(payload.access_token, "a");
        assert_eq!(payload.refresh_token.as_deref(), Some("r"));
    }

    #[test]
    fn unsuccessful_envelope_yields_message() {
        let envelope: Envelope<TokenPayload> =
            serde_json::from_str(r#"{"success":false,"message":"Invalid OTP"}"#).unwrap();
        assert_eq!(envelope.into_data().unwrap_err(), "Invalid OTP");
    }

    #[test]
    fn missing_success_flag_is_unsuccessful() {
        let envelope: Envelope<TokenPayload> =
            serde_json::from_str(r#"{"data":{"accessToken":"a"}}"#).unwrap();
        assert!(envelope.into_data().is_err());
    }
}
