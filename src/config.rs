//! Construction-time configuration for scraper instances and collaborators.
//!
//! There is no config file and no process-wide configuration state: every
//! value is passed in explicitly when an instance or collaborator is built.
//! Invalid input fails here, at construction, never during a poll cycle.
use serde::Serialize;
use thiserror::Error;
use url::Url;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("identity must not be empty")]
    EmptyIdentity,

    #[error("latitude {0} is out of range (-90..=90)")]
    InvalidLatitude(f64),

    #[error("longitude {0} is out of range (-180..=180)")]
    InvalidLongitude(f64),

    #[error("invalid API base URL: {0}")]
    InvalidBaseUrl(String),
}

// ============================================================================
// Location
// ============================================================================

/// The geographic context under which feeds are requested.
///
/// `latitude` and `longitude` are required and validated when a scraper is
/// constructed. `name` is used for logging and the token payload;
/// `country_code` and `accuracy` have no visible effect on results but are
/// still sent because the upstream API expects them.
#[derive(Debug, Clone, Serialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
    pub name: String,
    pub country_code: String,
    pub accuracy: f64,
}

impl Location {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            name: String::new(),
            country_code: "DE".to_string(),
            accuracy: 0.0,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_country_code(mut self, country_code: impl Into<String>) -> Self {
        self.country_code = country_code.into();
        self
    }

    pub fn with_accuracy(mut self, accuracy: f64) -> Self {
        self.accuracy = accuracy;
        self
    }

    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if !self.latitude.is_finite() || self.latitude.abs() > 90.0 {
            return Err(ConfigError::InvalidLatitude(self.latitude));
        }
        if !self.longitude.is_finite() || self.longitude.abs() > 180.0 {
            return Err(ConfigError::InvalidLongitude(self.longitude));
        }
        Ok(())
    }

    /// Short textual description for log lines.
    pub fn label(&self) -> String {
        let name = if self.name.is_empty() {
            "scraper"
        } else {
            self.name.as_str()
        };
        format!("{} ({}, {})", name, self.latitude, self.longitude)
    }
}

// ============================================================================
// Poll Configuration
// ============================================================================

/// Tuning knobs for the adaptive polling loop.
///
/// All fields are fixed for the lifetime of an instance except
/// `interval_secs`, which the overlap controller adjusts in place: when the
/// overlap between consecutive batches drops below `min_overlap` the interval
/// shrinks by `min_overlap_step`, and when it exceeds `max_overlap` the
/// interval grows by `max_overlap_step`. The interval never goes below zero.
///
/// `windup_delay_secs` is a one-time delay before the first cycle after
/// `start()`; it is never used for reschedules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    pub interval_secs: u64,
    pub min_overlap: usize,
    pub max_overlap: usize,
    pub min_overlap_step: u64,
    pub max_overlap_step: u64,
    pub windup_delay_secs: u64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_secs: 60,
            min_overlap: 3,
            max_overlap: 10,
            min_overlap_step: 30,
            max_overlap_step: 30,
            windup_delay_secs: 0,
        }
    }
}

// ============================================================================
// API Configuration
// ============================================================================

/// Explicit configuration for the HTTP collaborators.
///
/// The signing secret is deliberately not part of this struct; it belongs to
/// the [`RequestSigner`](crate::auth::RequestSigner) implementation.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    base_url: Url,
    pub client_id: String,
    pub client_version: String,
}

impl ApiConfig {
    /// Validates and stores the API base URL (e.g. `https://api.example.com/v2`).
    pub fn new(
        base_url: &str,
        client_id: impl Into<String>,
        client_version: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        let parsed =
            Url::parse(base_url).map_err(|e| ConfigError::InvalidBaseUrl(e.to_string()))?;
        if parsed.cannot_be_a_base() || parsed.host_str().is_none() {
            return Err(ConfigError::InvalidBaseUrl(format!(
                "{base_url} has no host"
            )));
        }
        Ok(Self {
            base_url: parsed,
            client_id: client_id.into(),
            client_version: client_version.into(),
        })
    }

    /// Builds an absolute endpoint URL from path segments.
    pub(crate) fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub(crate) fn user_agent(&self) -> String {
        format!(
            "FeedClient/{} Dalvik/2.1.0 (Linux; U; Android 5.1.1; )",
            self.client_version
        )
    }

    pub(crate) fn client_type(&self) -> String {
        format!("android_{}", self.client_version)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_defaults() {
        let location = Location::new(52.52, 13.405);
        assert_eq!(location.latitude, 52.52);
        assert_eq!(location.longitude, 13.405);
        assert_eq!(location.name, "");
        assert_eq!(location.country_code, "DE");
        assert_eq!(location.accuracy, 0.0);
    }

    #[test]
    fn test_location_builder() {
        let location = Location::new(48.137, 11.575)
            .with_name("Munich")
            .with_country_code("AT")
            .with_accuracy(10.0);
        assert_eq!(location.name, "Munich");
        assert_eq!(location.country_code, "AT");
        assert_eq!(location.accuracy, 10.0);
    }

    #[test]
    fn test_location_validation() {
        assert!(Location::new(52.52, 13.405).validate().is_ok());
        assert!(Location::new(90.0, -180.0).validate().is_ok());
        assert!(matches!(
            Location::new(91.0, 13.405).validate(),
            Err(ConfigError::InvalidLatitude(_))
        ));
        assert!(matches!(
            Location::new(52.52, 181.0).validate(),
            Err(ConfigError::InvalidLongitude(_))
        ));
        assert!(matches!(
            Location::new(f64::NAN, 13.405).validate(),
            Err(ConfigError::InvalidLatitude(_))
        ));
    }

    #[test]
    fn test_location_label() {
        let unnamed = Location::new(1.0, 2.0);
        assert_eq!(unnamed.label(), "scraper (1, 2)");

        let named = Location::new(1.0, 2.0).with_name("Berlin");
        assert_eq!(named.label(), "Berlin (1, 2)");
    }

    #[test]
    fn test_poll_config_defaults() {
        let config = PollConfig::default();
        assert_eq!(config.interval_secs, 60);
        assert_eq!(config.min_overlap, 3);
        assert_eq!(config.max_overlap, 10);
        assert_eq!(config.min_overlap_step, 30);
        assert_eq!(config.max_overlap_step, 30);
        assert_eq!(config.windup_delay_secs, 0);
    }

    #[test]
    fn test_api_config_rejects_bad_base_url() {
        assert!(ApiConfig::new("not a url", "client", "1.0").is_err());
        assert!(ApiConfig::new("data:text/plain,nope", "client", "1.0").is_err());
        assert!(ApiConfig::new("https://api.example.com/v2", "client", "1.0").is_ok());
    }

    #[test]
    fn test_api_config_endpoint_joins_segments() {
        let config = ApiConfig::new("https://api.example.com/v2", "client", "1.0").unwrap();
        assert_eq!(
            config.endpoint(&["posts", "abc"]).as_str(),
            "https://api.example.com/v2/posts/abc"
        );

        // A trailing slash on the base must not produce a double slash.
        let config = ApiConfig::new("https://api.example.com/v2/", "client", "1.0").unwrap();
        assert_eq!(
            config.endpoint(&["users"]).as_str(),
            "https://api.example.com/v2/users"
        );
    }

    #[test]
    fn test_api_config_client_headers() {
        let config = ApiConfig::new("https://api.example.com", "client", "9.9.9").unwrap();
        assert_eq!(config.client_type(), "android_9.9.9");
        assert!(config.user_agent().starts_with("FeedClient/9.9.9"));
    }
}
