use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha1::Sha1;
use url::Url;

type HmacSha1 = Hmac<Sha1>;

/// Everything the signer is allowed to see about an outgoing request.
///
/// The transport must feed the signer the exact values that go on the wire:
/// the full URL (including query), the current bearer token (empty for token
/// requests), the `X-Timestamp` header value, and the serialized body.
#[derive(Debug, Clone, Copy)]
pub struct SignableRequest<'a> {
    pub method: &'a str,
    pub url: &'a Url,
    pub token: Option<&'a str>,
    pub timestamp: &'a str,
    pub body: &'a str,
}

/// Produces the `X-Authorization` signature for a request.
///
/// Kept behind a trait so the HTTP collaborators never hard-code the
/// algorithm; swapping the upstream's signing scheme means swapping this one
/// implementation.
pub trait RequestSigner: Send + Sync {
    fn sign(&self, request: &SignableRequest<'_>) -> String;
}

/// HMAC-SHA1 over the upstream's canonical request string, uppercase hex.
pub struct HmacSigner {
    secret: SecretString,
}

impl HmacSigner {
    pub fn new(secret: SecretString) -> Self {
        Self { secret }
    }

    /// Canonical string: `METHOD%host%443%path/%token%timestamp%query%body`.
    ///
    /// The trailing slash after the path and the fixed port literal are part
    /// of the upstream contract, not an accident.
    fn canonical_string(request: &SignableRequest<'_>) -> String {
        format!(
            "{}%{}%{}%{}/%{}%{}%{}%{}",
            request.method.to_uppercase(),
            request.url.host_str().unwrap_or_default(),
            443,
            request.url.path(),
            request.token.unwrap_or_default(),
            request.timestamp,
            request.url.query().unwrap_or_default(),
            request.body,
        )
    }
}

impl std::fmt::Debug for HmacSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HmacSigner")
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

impl RequestSigner for HmacSigner {
    fn sign(&self, request: &SignableRequest<'_>) -> String {
        hmac_sha1_hex(
            self.secret.expose_secret().as_bytes(),
            Self::canonical_string(request).as_bytes(),
        )
    }
}

fn hmac_sha1_hex(key: &[u8], message: &[u8]) -> String {
    // HMAC accepts keys of arbitrary length, so this cannot fail.
    let mut mac = HmacSha1::new_from_slice(key).expect("HMAC key of any length is valid");
    mac.update(message);
    let digest = mac.finalize().into_bytes();

    let mut hex = String::with_capacity(digest.len() * 2);
    for byte in digest {
        hex.push_str(&format!("{byte:02X}"));
    }
    hex
}

/// Second-precision ISO-8601 timestamp for the `X-Timestamp` header.
///
/// The upstream rejects fractional seconds, hence the explicit format instead
/// of `to_rfc3339`.
pub(crate) fn request_timestamp() -> String {
    chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request<'a>(url: &'a Url, token: Option<&'a str>) -> SignableRequest<'a> {
        SignableRequest {
            method: "GET",
            url,
            token,
            timestamp: "2024-05-01T12:00:00Z",
            body: "",
        }
    }

    // RFC 2202 test case 2 for HMAC-SHA1.
    #[test]
    fn test_hmac_sha1_known_vector() {
        let digest = hmac_sha1_hex(b"Jefe", b"what do ya want for nothing?");
        assert_eq!(digest, "EFFCDF6AE5EB2FA2D27416D5F184DF9C259A7C79");
    }

    #[test]
    fn test_canonical_string_layout() {
        let url = Url::parse("https://api.example.com/v2/posts/location?lat=1&lng=2").unwrap();
        let request = SignableRequest {
            method: "get",
            url: &url,
            token: Some("tok"),
            timestamp: "2024-05-01T12:00:00Z",
            body: "{}",
        };
        assert_eq!(
            HmacSigner::canonical_string(&request),
            "GET%api.example.com%443%/v2/posts/location/%tok%2024-05-01T12:00:00Z%lat=1&lng=2%{}"
        );
    }

    #[test]
    fn test_canonical_string_empty_parts() {
        let url = Url::parse("https://api.example.com/v2/users").unwrap();
        let request = SignableRequest {
            method: "POST",
            url: &url,
            token: None,
            timestamp: "ts",
            body: "body",
        };
        assert_eq!(
            HmacSigner::canonical_string(&request),
            "POST%api.example.com%443%/v2/users/%%ts%%body"
        );
    }

    #[test]
    fn test_sign_is_deterministic_and_hex_uppercase() {
        let signer = HmacSigner::new(SecretString::from("secret"));
        let url = Url::parse("https://api.example.com/v2/users").unwrap();
        let request = request(&url, None);

        let first = signer.sign(&request);
        let second = signer.sign(&request);
        assert_eq!(first, second);
        assert_eq!(first.len(), 40); // SHA-1 digest, hex encoded
        assert!(first
            .chars()
            .all(|c| c.is_ascii_digit() || c.is_ascii_uppercase()));
    }

    #[test]
    fn test_sign_varies_with_token() {
        let signer = HmacSigner::new(SecretString::from("secret"));
        let url = Url::parse("https://api.example.com/v2/users").unwrap();

        let anonymous = signer.sign(&request(&url, None));
        let authorized = signer.sign(&request(&url, Some("tok")));
        assert_ne!(anonymous, authorized);
    }

    #[test]
    fn test_debug_masks_secret() {
        let signer = HmacSigner::new(SecretString::from("super-secret"));
        let output = format!("{signer:?}");
        assert!(!output.contains("super-secret"));
        assert!(output.contains("[REDACTED]"));
    }

    #[test]
    fn test_request_timestamp_shape() {
        let timestamp = request_timestamp();
        assert_eq!(timestamp.len(), 20);
        assert!(timestamp.ends_with('Z'));
        assert!(!timestamp.contains('.'));
    }
}
