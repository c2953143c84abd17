//! Feed retrieval: channels, items, and the paging HTTP client.
//!
//! The scraper core only ever talks to [`FeedApi`]:
//!
//! - [`FeedApi::fetch_page`] - one signed page request for a channel
//! - [`FeedApi::fetch_all`] - pages a channel to exhaustion; the sole
//!   termination signal is a page strictly shorter than the requested limit,
//!   so the client keeps working if the server's maximum page size changes
//! - [`FeedApi::fetch_one`] - per-item detail, where a missing item is an
//!   explicit absence (`Ok(None)`), not an error
//!
//! [`HttpFeedClient`] is the production implementation; tests substitute
//! their own [`FeedApi`] doubles.

mod client;
mod types;

pub use client::{FeedApi, FetchError, HttpFeedClient, PAGE_LIMIT};
pub use types::{Batch, Channel, Item};
