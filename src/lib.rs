//! Adaptive polling client for a location-scoped feed API.
//!
//! `murmel` runs one polling agent per identity+location pair. Every cycle
//! it authorizes (reusing its session until shortly before expiry), fetches
//! all feed channels concurrently with pagination to exhaustion, merges and
//! dedupes the results into one batch, hands the batch to its subscribers,
//! and reschedules itself, tuning the polling interval from how much of the
//! batch it has already seen. A second variant, [`ItemEnricher`], uses the
//! same cycle engine to fetch per-item detail on demand instead of on a
//! timer.
//!
//! The crate owns the orchestration only. Request signing sits behind
//! [`RequestSigner`], transport behind [`FeedApi`] and [`AuthProvider`], and
//! whatever happens to the batches (storage, export, notification) behind
//! [`Subscriber`].
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use murmel::{
//!     ApiConfig, HmacSigner, HttpAuthProvider, HttpFeedClient, Location,
//!     PollConfig, PollingScraper,
//! };
//!
//! let config = ApiConfig::new("https://api.example.com/v2", CLIENT_ID, "4.48.0")?;
//! let signer = Arc::new(HmacSigner::new(secret));
//! let client = reqwest::Client::new();
//!
//! let scraper = PollingScraper::new(
//!     device_uid,
//!     Location::new(52.52, 13.405).with_name("Berlin"),
//!     PollConfig::default(),
//!     Arc::new(HttpAuthProvider::new(client.clone(), config.clone(), signer.clone())),
//!     Arc::new(HttpFeedClient::new(client, config, signer)),
//! )?;
//! scraper.subscribe(|batch: &[murmel::Item], _ctx: &murmel::CycleContext<'_>| {
//!     println!("{} items", batch.len());
//!     Ok(())
//! });
//! scraper.start();
//! ```

pub mod auth;
pub mod config;
pub mod feed;
pub mod scraper;

pub use auth::{
    AuthError, AuthProvider, HmacSigner, HttpAuthProvider, RequestSigner, Session,
    SignableRequest,
};
pub use config::{ApiConfig, ConfigError, Location, PollConfig};
pub use feed::{Batch, Channel, FeedApi, FetchError, HttpFeedClient, Item, PAGE_LIMIT};
pub use scraper::{
    CycleContext, CycleError, EnrichedBatch, ItemEnricher, PollingScraper, ScraperState,
    Subscriber,
};
