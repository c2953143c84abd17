use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::auth::{request_timestamp, RequestSigner, Session, SignableRequest};
use crate::config::{ApiConfig, Location};

/// Errors from the token endpoint.
///
/// Any of these aborts the current cycle; the scraper retries with a fresh
/// authorization on the next one.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("token request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// Token endpoint answered with a non-2xx status
    #[error("token endpoint returned status {0}")]
    HttpStatus(u16),
    /// Token request payload could not be serialized
    #[error("failed to encode token request: {0}")]
    Encode(#[from] serde_json::Error),
    /// 2xx response whose body is not a session object
    #[error("malformed token response: {0}")]
    MalformedResponse(String),
}

/// Issues sessions for an identity+location pair.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn request_session(
        &self,
        identity: &str,
        location: &Location,
    ) -> Result<Session, AuthError>;
}

/// Wire shape of the token request body. Field names belong to the upstream
/// API, not to this crate's vocabulary.
#[derive(Serialize)]
struct TokenRequest<'a> {
    client_id: &'a str,
    device_uid: &'a str,
    location: LocationPayload<'a>,
}

#[derive(Serialize)]
struct LocationPayload<'a> {
    name: &'a str,
    city: &'a str,
    country: &'a str,
    loc_accuracy: f64,
    loc_coordinates: Coordinates,
}

#[derive(Serialize)]
struct Coordinates {
    lat: f64,
    lng: f64,
}

/// [`AuthProvider`] over HTTP: a signed `POST {base}/users`.
pub struct HttpAuthProvider {
    client: reqwest::Client,
    config: ApiConfig,
    signer: Arc<dyn RequestSigner>,
}

impl HttpAuthProvider {
    pub fn new(client: reqwest::Client, config: ApiConfig, signer: Arc<dyn RequestSigner>) -> Self {
        Self {
            client,
            config,
            signer,
        }
    }
}

#[async_trait]
impl AuthProvider for HttpAuthProvider {
    async fn request_session(
        &self,
        identity: &str,
        location: &Location,
    ) -> Result<Session, AuthError> {
        let payload = TokenRequest {
            client_id: &self.config.client_id,
            device_uid: identity,
            location: LocationPayload {
                name: &location.name,
                city: &location.name,
                country: &location.country_code,
                loc_accuracy: location.accuracy,
                loc_coordinates: Coordinates {
                    lat: location.latitude,
                    lng: location.longitude,
                },
            },
        };
        // Serialized once so the signed body and the sent body are identical
        // bytes.
        let body = serde_json::to_string(&payload)?;

        let url = self.config.endpoint(&["users"]);
        let timestamp = request_timestamp();
        let signature = self.signer.sign(&SignableRequest {
            method: "POST",
            url: &url,
            token: None,
            timestamp: &timestamp,
            body: &body,
        });

        let response = self
            .client
            .post(url)
            .header("User-Agent", self.config.user_agent())
            .header("Content-Type", "application/json; charset=utf-8")
            .header("X-Client-Type", self.config.client_type())
            .header("X-Api-Version", "0.2")
            .header("X-Timestamp", &timestamp)
            .header("X-Authorization", format!("HMAC {signature}"))
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(status = status.as_u16(), "token request rejected");
            return Err(AuthError::HttpStatus(status.as_u16()));
        }

        let text = response.text().await?;
        serde_json::from_str(&text).map_err(|e| AuthError::MalformedResponse(e.to_string()))
    }
}
