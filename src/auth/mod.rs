//! Authorization: request signing and session acquisition.
//!
//! The feed API hands out short-lived sessions per identity+location. This
//! module owns that boundary:
//!
//! - [`RequestSigner`] / [`HmacSigner`] - keyed-hash signing of outgoing
//!   requests; the exact algorithm stays pluggable behind the trait
//! - [`Session`] - an access token plus its expiration, replaced wholesale
//!   on every refresh
//! - [`AuthProvider`] / [`HttpAuthProvider`] - the token endpoint client
//!
//! The polling engine only ever calls [`AuthProvider::request_session`]; when
//! and whether to refresh is decided by the cycle engine via
//! [`Session::needs_refresh`].

mod provider;
mod session;
mod signer;

pub use provider::{AuthError, AuthProvider, HttpAuthProvider};
pub use session::Session;
pub use signer::{HmacSigner, RequestSigner, SignableRequest};

pub(crate) use signer::request_timestamp;
