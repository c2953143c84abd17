use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use secrecy::ExposeSecret;

use crate::auth::AuthProvider;
use crate::config::{ConfigError, Location, PollConfig};
use crate::feed::{Batch, FeedApi, FetchError};
use crate::scraper::cycle::{CycleCore, CycleError};
use crate::scraper::{lock, Subscriber, SubscriberList};

/// Pause between chained cycles in [`ItemEnricher::drain`].
const DRAIN_DELAY: Duration = Duration::from_millis(100);

/// The outcome of one enrichment cycle: the items that could be fetched,
/// paired with the id list the caller asked for so it can reconcile the two.
#[derive(Debug)]
pub struct EnrichedBatch {
    pub requested: Vec<String>,
    pub items: Batch,
}

/// An externally-triggered scraper that fetches per-item detail (full
/// payload plus nested replies) for previously-seen items.
///
/// Unlike [`PollingScraper`](crate::scraper::PollingScraper) there is no
/// timer of its own: the caller decides when a cycle runs, either one-shot
/// via [`enrich`](Self::enrich) or chained via [`drain`](Self::drain). Items
/// that have disappeared upstream are silently dropped from the result; any
/// other per-item failure fails the whole cycle, since a partial enrichment
/// is not meaningful to the caller.
pub struct ItemEnricher {
    identity: String,
    config: PollConfig,
    feed: Arc<dyn FeedApi>,
    subscribers: SubscriberList,
    // One cycle at a time per instance; the async mutex also guards the
    // session owned by the core.
    core: tokio::sync::Mutex<CycleCore>,
    stop: AtomicBool,
}

impl ItemEnricher {
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

        let subscribers: SubscriberList = Arc::new(Mutex::new(Vec::new()));
        let core = CycleCore::new(
            identity.clone(),
            location,
            auth,
            Arc::clone(&subscribers),
        );
        Ok(Self {
            identity,
            config,
            feed,
            subscribers,
            core: tokio::sync::Mutex::new(core),
            stop: AtomicBool::new(false),
        })
    }

    /// Registers a sink for future batches, like on the polling scraper.
    pub fn subscribe(&self, subscriber: impl Subscriber + 'static) {
        lock(&self.subscribers).push(Arc::new(subscriber));
    }

    /// Requests that a running [`drain`](Self::drain) chain ends before its
    /// next cycle. In-flight fetches complete first.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    /// Runs one enrichment cycle for `ids`.
    ///
    /// Ids whose item has disappeared are dropped from the output, never
    /// reported as an error. The caller owns the decision when (and whether) to invoke the
    /// next cycle, e.g. to gate it on state the enricher cannot see.
    pub async fn enrich(&self, ids: &[String]) -> Result<EnrichedBatch, CycleError> {
        let mut core = self.core.lock().await;
        let token = core
            .authorize()
            .await?
            .access_token
            .expose_secret()
            .to_owned();
        let items = self.fetch(&token, ids).await?;
        tracing::debug!(
            identity = %self.identity,
            requested = ids.len(),
            fetched = items.len(),
            "enrichment cycle complete"
        );

        core.publish(&items, self.config, Some(ids));
        Ok(EnrichedBatch {
            requested: ids.to_vec(),
            items,
        })
    }

    /// Chained mode: keeps re-running the identical enrichment after a short
    /// fixed delay until [`stop`](Self::stop) is called.
    ///
    /// Cycle failures are logged and the chain continues; like the polling
    /// scraper, only an explicit stop ends the loop.
    pub async fn drain(&self, ids: Vec<String>) {
        self.stop.store(false, Ordering::Release);
        loop {
            if self.stop.load(Ordering::Acquire) {
                tracing::info!(identity = %self.identity, "enricher stopped");
                return;
            }
            if let Err(error) = self.enrich(&ids).await {
                tracing::warn!(
                    identity = %self.identity,
                    error = %error,
                    "enrichment cycle failed, retrying after the drain delay"
                );
            }
            tokio::time::sleep(DRAIN_DELAY).await;
        }
    }

    /// Fans out one detail fetch per id. All-or-nothing apart from the
    /// documented not-found exception: the first transport failure cancels
    /// the remaining fetches and fails the cycle.
    async fn fetch(&self, token: &str, ids: &[String]) -> Result<Batch, FetchError> {
        let fetches = ids.iter().map(|id| self.feed.fetch_one(token, id));
        let results = futures::future::try_join_all(fetches).await?;
        Ok(results.into_iter().flatten().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::AtomicUsize;

    use async_trait::async_trait;
    use chrono::Utc;
    use secrecy::SecretString;

    use crate::auth::{AuthError, Session};
    use crate::feed::{Channel, Item};
    use crate::scraper::CycleContext;

    struct StaticAuth;

    #[async_trait]
    impl AuthProvider for StaticAuth {
        async fn request_session(
            &self,
            _identity: &str,
            _location: &Location,
        ) -> Result<Session, AuthError> {
            Ok(Session {
                access_token: SecretString::from("token"),
                expiration_date: Utc::now().timestamp() + 3600,
                refresh_token: None,
                expires_in: None,
                distinct_id: None,
                extra: serde_json::Map::new(),
            })
        }
    }

    /// Serves a fixed id → item map; unknown ids are "gone", and ids in
    /// `failing` produce transport errors.
    struct MapFeed {
        known: HashMap<String, Item>,
        failing: Vec<String>,
    }

    impl MapFeed {
        fn with_items(ids: &[&str]) -> Self {
            let known = ids
                .iter()
                .map(|id| {
                    (
                        id.to_string(),
                        Item {
                            id: id.to_string(),
                            payload: serde_json::Map::new(),
                        },
                    )
                })
                .collect();
            Self {
                known,
                failing: Vec::new(),
            }
        }
    }

    #[async_trait]
    impl FeedApi for MapFeed {
        async fn fetch_page(
            &self,
            _token: &str,
            _channel: Channel,
            _location: &Location,
            _after: Option<&str>,
        ) -> Result<Vec<Item>, FetchError> {
            Ok(Vec::new())
        }

        async fn fetch_one(&self, _token: &str, id: &str) -> Result<Option<Item>, FetchError> {
            if self.failing.iter().any(|f| f == id) {
                return Err(FetchError::HttpStatus(500));
            }
            Ok(self.known.get(id).cloned())
        }
    }

    fn enricher_with(feed: MapFeed) -> ItemEnricher {
        ItemEnricher::new(
            "device-abc",
            Location::new(52.52, 13.405),
            PollConfig::default(),
            Arc::new(StaticAuth),
            Arc::new(feed),
        )
        .unwrap()
    }

    fn requested(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|id| id.to_string()).collect()
    }

    #[tokio::test]
    async fn test_missing_items_are_dropped_not_errors() {
        let enricher = enricher_with(MapFeed::with_items(&["a", "c"]));

        let batch = enricher
            .enrich(&requested(&["a", "b", "c"]))
            .await
            .unwrap();

        let fetched: Vec<&str> = batch.items.iter().map(|item| item.id.as_str()).collect();
        assert_eq!(fetched, vec!["a", "c"]);
        assert_eq!(batch.requested, requested(&["a", "b", "c"]));
    }

    #[tokio::test]
    async fn test_transport_failure_fails_the_cycle() {
        let mut feed = MapFeed::with_items(&["a", "c"]);
        feed.failing.push("b".to_string());
        let enricher = enricher_with(feed);

        let error = enricher
            .enrich(&requested(&["a", "b", "c"]))
            .await
            .unwrap_err();
        assert!(matches!(
            error,
            CycleError::Fetch(FetchError::HttpStatus(500))
        ));
    }

    #[tokio::test]
    async fn test_publish_carries_requested_ids() {
        let enricher = enricher_with(MapFeed::with_items(&["a"]));
        let captured = Arc::new(Mutex::new(None));
        {
            let captured = Arc::clone(&captured);
            enricher.subscribe(
                move |batch: &[Item], context: &CycleContext<'_>| -> anyhow::Result<()> {
                    *captured.lock().unwrap() = Some((
                        batch.len(),
                        context.requested.map(<[String]>::to_vec),
                    ));
                    Ok(())
                },
            );
        }

        enricher.enrich(&requested(&["a", "b"])).await.unwrap();

        let (published, ids) = captured.lock().unwrap().clone().unwrap();
        assert_eq!(published, 1);
        assert_eq!(ids, Some(requested(&["a", "b"])));
    }

    #[tokio::test(start_paused = true)]
    async fn test_drain_repeats_until_stopped() {
        let enricher = Arc::new(enricher_with(MapFeed::with_items(&["a"])));
        let cycles = Arc::new(AtomicUsize::new(0));
        {
            let cycles = Arc::clone(&cycles);
            enricher.subscribe(
                move |_batch: &[Item], _context: &CycleContext<'_>| -> anyhow::Result<()> {
                    cycles.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                },
            );
        }

        let chain = tokio::spawn({
            let enricher = Arc::clone(&enricher);
            async move { enricher.drain(requested(&["a"])).await }
        });

        while cycles.load(Ordering::SeqCst) < 3 {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        enricher.stop();
        chain.await.unwrap();

        assert!(cycles.load(Ordering::SeqCst) >= 3);
    }
}
