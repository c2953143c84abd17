use chrono::Utc;
use secrecy::SecretString;
use serde::Deserialize;

/// A token expiring within this window is refreshed up front, so it cannot
/// lapse in the middle of a cycle's fetch fan-out.
const EXPIRY_MARGIN_SECS: i64 = 5;

/// An issued session: the bearer token plus its expiration.
///
/// Sessions are exclusively owned by their scraper instance and replaced
/// wholesale on refresh; no field is ever mutated in place. The raw response
/// fields the crate does not interpret are preserved in `extra`.
#[derive(Debug, Deserialize)]
pub struct Session {
    pub access_token: SecretString,
    /// Unix seconds after which `access_token` stops working.
    pub expiration_date: i64,
    #[serde(default)]
    pub refresh_token: Option<SecretString>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub distinct_id: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Session {
    /// True when the token is absent-in-effect: expired, or expiring within
    /// the safety margin.
    pub fn needs_refresh(&self) -> bool {
        Utc::now().timestamp() + EXPIRY_MARGIN_SECS >= self.expiration_date
    }
}
