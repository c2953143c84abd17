//! The polling core: cycle engine, scraper variants, and the subscriber seam.
//!
//! One **cycle** is authorize → fetch → publish → reschedule. The two
//! variants share the engine and differ only in how they fetch:
//!
//! - [`PollingScraper`] - timer-driven; fans out over all feed channels,
//!   merges and dedupes them, and tunes its own polling interval from the
//!   overlap between consecutive batches
//! - [`ItemEnricher`] - externally triggered; fetches per-item detail for a
//!   caller-supplied id set, tolerating individual items having disappeared
//!
//! Subscribers receive every resulting batch in registration order. A
//! subscriber failure is logged and isolated: it never fails the cycle and
//! never blocks the remaining subscribers.

mod cycle;
mod enricher;
mod poller;
mod state;

pub use cycle::CycleError;
pub use enricher::{EnrichedBatch, ItemEnricher};
pub use poller::PollingScraper;
pub use state::ScraperState;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::config::{Location, PollConfig};
use crate::feed::Item;

/// Read-only view of the instance handed to subscribers with every batch.
#[derive(Debug, Clone)]
pub struct CycleContext<'a> {
    pub identity: &'a str,
    pub location: &'a Location,
    /// Snapshot of the poll configuration when the batch was published.
    pub config: PollConfig,
    /// The ids the cycle was asked to fetch; `None` for channel polling
    /// cycles, where the batch is whatever the feed returned.
    pub requested: Option<&'a [String]>,
}

/// A sink for cycle results.
///
/// Invoked synchronously, in registration order, once per cycle. The cycle
/// does not wait for any follow-up work a subscriber kicks off; returning an
/// error only produces a warning in the log.
pub trait Subscriber: Send + Sync {
    fn on_batch(&self, batch: &[Item], context: &CycleContext<'_>) -> anyhow::Result<()>;
}

/// Plain closures can subscribe directly.
impl<F> Subscriber for F
where
    F: Fn(&[Item], &CycleContext<'_>) -> anyhow::Result<()> + Send + Sync,
{
    fn on_batch(&self, batch: &[Item], context: &CycleContext<'_>) -> anyhow::Result<()> {
        self(batch, context)
    }
}

pub(crate) type SubscriberList = Arc<Mutex<Vec<Arc<dyn Subscriber>>>>;

/// Lock that shrugs off poisoning: a subscriber panicking on another thread
/// must not take the whole scraper down with it.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
