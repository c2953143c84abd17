use std::sync::Arc;

use thiserror::Error;

use crate::auth::{AuthError, AuthProvider, Session};
use crate::config::{Location, PollConfig};
use crate::feed::{FetchError, Item};
use crate::scraper::{lock, CycleContext, SubscriberList};

/// Why a cycle was abandoned. Either way the instance stays alive and
/// reschedules itself; only `stop()` ends the loop.
#[derive(Debug, Error)]
pub enum CycleError {
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Fetch(#[from] FetchError),
}

/// The shared authorize → fetch → publish engine.
///
/// Both scraper variants compose one of these instead of inheriting from a
/// common base: the variant supplies the fetch, `CycleCore` supplies
/// everything around it. Owned by a single driver task (or guarded by an
/// async mutex), so the session needs no synchronization of its own.
pub(crate) struct CycleCore {
    identity: String,
    location: Location,
    auth: Arc<dyn AuthProvider>,
    session: Option<Session>,
    subscribers: SubscriberList,
}

impl CycleCore {
    pub(crate) fn new(
        identity: String,
        location: Location,
        auth: Arc<dyn AuthProvider>,
        subscribers: SubscriberList,
    ) -> Self {
        Self {
            identity,
            location,
            auth,
            session: None,
            subscribers,
        }
    }

    /// Ensures a usable session: the current one is reused unless it is
    /// absent or about to expire, in which case a replacement is requested
    /// and swapped in wholesale.
    pub(crate) async fn authorize(&mut self) -> Result<&Session, AuthError> {
        let session = match self.session.take() {
            Some(session) if !session.needs_refresh() => session,
            _ => {
                tracing::info!(
                    identity = %self.identity,
                    location = %self.location.label(),
                    "requesting new session token"
                );
                let fresh = self
                    .auth
                    .request_session(&self.identity, &self.location)
                    .await?;
                tracing::info!(
                    identity = %self.identity,
                    expiration = fresh.expiration_date,
                    "acquired session token"
                );
                fresh
            }
        };
        Ok(self.session.insert(session))
    }

    /// Hands `batch` to every subscriber in registration order.
    ///
    /// The list is snapshotted up front, so registrations made while a cycle
    /// runs take effect from the next cycle. Failures are logged and
    /// swallowed; one broken sink must not starve the others or fail the
    /// cycle.
    pub(crate) fn publish(&self, batch: &[Item], config: PollConfig, requested: Option<&[String]>) {
        let subscribers = lock(&self.subscribers).clone();
        let context = CycleContext {
            identity: &self.identity,
            location: &self.location,
            config,
            requested,
        };
        for (index, subscriber) in subscribers.iter().enumerate() {
            if let Err(error) = subscriber.on_batch(batch, &context) {
                tracing::warn!(
                    identity = %self.identity,
                    subscriber = index,
                    error = %error,
                    "subscriber failed, continuing with the rest"
                );
            }
        }
    }
}
