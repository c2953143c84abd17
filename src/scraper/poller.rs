use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use secrecy::ExposeSecret;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::auth::AuthProvider;
use crate::config::{ConfigError, Location, PollConfig};
use crate::feed::{Batch, Channel, FeedApi, FetchError, Item};
use crate::scraper::cycle::{CycleCore, CycleError};
use crate::scraper::state::{ScraperState, StateCell};
use crate::scraper::{lock, Subscriber, SubscriberList};

/// A timer-driven scraper for one identity+location pair.
///
/// Every cycle fans out over all feed channels, merges and dedupes the
/// results, publishes the batch, and adapts its own polling interval from
/// the overlap with the previous batch: lots of unseen items means the feed
/// moves faster than we poll, so the interval shrinks; heavy overlap means
/// we poll too eagerly, so it grows.
///
/// `start()` spawns a single driver task that owns all cycle state; there is
/// never more than one in-flight cycle per instance. `stop()` is cooperative
/// and takes effect at the next decision point: a running cycle always
/// completes. Dropping the scraper requests a stop the same way.
pub struct PollingScraper {
    shared: Arc<Shared>,
    auth: Arc<dyn AuthProvider>,
    feed: Arc<dyn FeedApi>,
    driver: Mutex<Option<JoinHandle<()>>>,
}

struct Shared {
    identity: String,
    location: Location,
    config: Mutex<PollConfig>,
    subscribers: SubscriberList,
    state: StateCell,
    stop: Mutex<Option<watch::Sender<bool>>>,
}

impl Shared {
    fn config_snapshot(&self) -> PollConfig {
        *lock(&self.config)
    }
}

impl PollingScraper {
    pub fn new(
        identity: impl Into<String>,
        location: Location,
        config: PollConfig,
        auth: Arc<dyn AuthProvider>,
        feed: Arc<dyn FeedApi>,
    ) -> Result<Self, ConfigError> {
        let identity = identity.into();
        if identity.is_empty() {
            return Err(ConfigError::EmptyIdentity);
        }
        location.validate()?;

        Ok(Self {
            shared: Arc::new(Shared {
                identity,
                location,
                config: Mutex::new(config),
                subscribers: Arc::new(Mutex::new(Vec::new())),
                state: StateCell::new(),
                stop: Mutex::new(None),
            }),
            auth,
            feed,
            driver: Mutex::new(None),
        })
    }

    pub fn identity(&self) -> &str {
        &self.shared.identity
    }

    pub fn location(&self) -> &Location {
        &self.shared.location
    }

    pub fn state(&self) -> ScraperState {
        self.shared.state.get()
    }

    /// Current configuration, including the live (possibly adapted) interval.
    pub fn config(&self) -> PollConfig {
        self.shared.config_snapshot()
    }

    /// Registers a sink for future batches. Takes effect from the next
    /// cycle; there is no unsubscribe.
    pub fn subscribe(&self, subscriber: impl Subscriber + 'static) {
        lock(&self.shared.subscribers).push(Arc::new(subscriber));
    }

    /// Schedules the first cycle after the windup delay.
    ///
    /// Idempotent while a driver is live: calling `start()` again before the
    /// pending timer fires (or while cycles are running) does nothing. After
    /// a stop has been observed, `start()` spawns a fresh driver and the
    /// windup delay applies again.
    pub fn start(&self) {
        let mut driver = lock(&self.driver);
        if driver.as_ref().is_some_and(|handle| !handle.is_finished()) {
            tracing::debug!(
                identity = %self.shared.identity,
                "start() ignored, scraper is already scheduled"
            );
            return;
        }

        let (stop_tx, stop_rx) = watch::channel(false);
        *lock(&self.shared.stop) = Some(stop_tx);
        self.shared.state.set(ScraperState::WindupScheduled);
        tracing::info!(
            identity = %self.shared.identity,
            location = %self.shared.location.label(),
            windup_secs = self.shared.config_snapshot().windup_delay_secs,
            "starting scraper"
        );

        *driver = Some(tokio::spawn(run_driver(
            Arc::clone(&self.shared),
            Arc::clone(&self.auth),
            Arc::clone(&self.feed),
            stop_rx,
        )));
    }

    /// Requests termination at the next decision point. An in-flight cycle
    /// runs to completion (or failure) first; a pending timer is cancelled.
    pub fn stop(&self) {
        if let Some(stop_tx) = lock(&self.shared.stop).as_ref() {
            tracing::info!(identity = %self.shared.identity, "stop requested");
            let _ = stop_tx.send(true);
        }
    }
}

impl Drop for PollingScraper {
    fn drop(&mut self) {
        // The driver holds its own Arc<Shared>; ask it to wind down rather
        // than leaving a detached task polling forever.
        self.stop();
    }
}

/// Per-cycle fetch state owned by the driver task.
struct PollCycle {
    feed: Arc<dyn FeedApi>,
    location: Location,
    previous: Option<Batch>,
}

impl PollCycle {
    /// Fans out over all three channels concurrently. The cycle fails on the
    /// first channel error and partial results are discarded; a batch is
    /// only ever the complete merged view.
    async fn fetch(&self, token: &str) -> Result<Batch, FetchError> {
        let (recent, popular, discussed) = tokio::try_join!(
            self.feed.fetch_all(token, Channel::Recent, &self.location),
            self.feed.fetch_all(token, Channel::Popular, &self.location),
            self.feed.fetch_all(token, Channel::Discussed, &self.location),
        )?;
        Ok(merge_unique([recent, popular, discussed]))
    }
}

async fn run_driver(
    shared: Arc<Shared>,
    auth: Arc<dyn AuthProvider>,
    feed: Arc<dyn FeedApi>,
    mut stop_rx: watch::Receiver<bool>,
) {
    let mut core = CycleCore::new(
        shared.identity.clone(),
        shared.location.clone(),
        auth,
        Arc::clone(&shared.subscribers),
    );
    let mut poll = PollCycle {
        feed,
        location: shared.location.clone(),
        previous: None,
    };

    // The windup delay applies to this first wait only; every later wait
    // uses the live interval.
    let windup = Duration::from_secs(shared.config_snapshot().windup_delay_secs);
    if wait_or_stopped(&mut stop_rx, windup).await {
        finish(&shared, "stopped before the first cycle");
        return;
    }

    loop {
        shared.state.set(ScraperState::CycleRunning);
        if let Err(error) = run_cycle(&mut core, &mut poll, &shared).await {
            tracing::warn!(
                identity = %shared.identity,
                error = %error,
                "cycle failed, retrying after the current interval"
            );
        }

        if *stop_rx.borrow() {
            finish(&shared, "stopped after finishing the in-flight cycle");
            return;
        }

        shared.state.set(ScraperState::CycleScheduled);
        let interval = Duration::from_secs(shared.config_snapshot().interval_secs);
        if wait_or_stopped(&mut stop_rx, interval).await {
            finish(&shared, "stopped while waiting for the next cycle");
            return;
        }
    }
}

/// One full cycle: authorize, fan out, publish, adapt the interval.
///
/// On failure the interval is left untouched, so the reschedule after a
/// failed cycle is a uniform backoff at the pre-failure cadence.
async fn run_cycle(
    core: &mut CycleCore,
    poll: &mut PollCycle,
    shared: &Shared,
) -> Result<(), CycleError> {
    let token = core
        .authorize()
        .await?
        .access_token
        .expose_secret()
        .to_owned();
    let batch = poll.fetch(&token).await?;
    tracing::debug!(
        identity = %shared.identity,
        items = batch.len(),
        "scraped merged batch"
    );

    core.publish(&batch, shared.config_snapshot(), None);

    if let Some(previous) = &poll.previous {
        let overlap = overlap_count(&batch, previous);
        adapt_interval(&mut lock(&shared.config), overlap, &shared.identity);
    }
    poll.previous = Some(batch);
    Ok(())
}

fn finish(shared: &Shared, reason: &'static str) {
    shared.state.set(ScraperState::Stopped);
    tracing::info!(identity = %shared.identity, reason, "scraper stopped");
}

/// Sleeps for `delay` unless a stop request arrives first. Returns true when
/// the driver should wind down.
async fn wait_or_stopped(stop_rx: &mut watch::Receiver<bool>, delay: Duration) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(delay) => *stop_rx.borrow(),
        result = stop_rx.changed() => match result {
            Ok(()) => *stop_rx.borrow(),
            // Sender gone: nobody is left to observe this instance.
            Err(_) => true,
        },
    }
}

/// Concatenates the channel batches in merge order and keeps the first
/// occurrence of every id.
fn merge_unique(channels: [Vec<Item>; 3]) -> Batch {
    let total = channels.iter().map(Vec::len).sum();
    let mut seen = HashSet::with_capacity(total);
    let mut merged = Vec::with_capacity(total);
    for item in channels.into_iter().flatten() {
        if seen.insert(item.id.clone()) {
            merged.push(item);
        }
    }
    merged
}

/// Number of ids shared between the new batch and the previous one.
fn overlap_count(new_batch: &[Item], previous: &[Item]) -> usize {
    let old_ids: HashSet<&str> = previous.iter().map(|item| item.id.as_str()).collect();
    new_batch
        .iter()
        .filter(|item| old_ids.contains(item.id.as_str()))
        .count()
}

/// Applies the overlap thresholds to the live interval.
///
/// Both comparisons run unconditionally: with a configuration where
/// `min_overlap > max_overlap` the two adjustments can both fire in one
/// cycle. The adjustments accumulate on a signed intermediate and the result
/// is clamped to zero once at the end.
fn adapt_interval(config: &mut PollConfig, overlap: usize, identity: &str) {
    let old = config.interval_secs;
    let mut next = old as i64;
    if overlap < config.min_overlap {
        next -= config.min_overlap_step as i64;
    }
    if overlap > config.max_overlap {
        next += config.max_overlap_step as i64;
    }
    config.interval_secs = next.max(0) as u64;

    if config.interval_secs == old {
        tracing::debug!(identity = %identity, overlap, interval_secs = old, "poll interval unchanged");
    } else {
        tracing::info!(
            identity = %identity,
            overlap,
            from_secs = old,
            to_secs = config.interval_secs,
            "adjusted poll interval"
        );
    }
}
