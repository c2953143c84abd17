use std::fmt;

use serde::{Deserialize, Serialize};

/// One content unit returned by a channel or a single-item fetch.
///
/// The only field this crate interprets is the stable identifier; everything
/// else the server sent rides along verbatim in `payload` for subscribers to
/// pick apart.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item {
    #[serde(rename = "post_id")]
    pub id: String,
    #[serde(flatten)]
    pub payload: serde_json::Map<String, serde_json::Value>,
}

/// The deduplicated, ordered result of one cycle.
pub type Batch = Vec<Item>;

/// A named feed variant. All three are fetched and merged every polling
/// cycle so no item visible at the location is missed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Recent,
    Popular,
    Discussed,
}

impl Channel {
    /// Channels in merge order: on id collisions the earlier channel wins.
    pub const MERGE_ORDER: [Channel; 3] = [Channel::Recent, Channel::Popular, Channel::Discussed];

    /// URL path suffix; the unfiltered location feed has none.
    pub(crate) fn path_suffix(self) -> Option<&'static str> {
        match self {
            Channel::Recent => None,
            Channel::Popular => Some("popular"),
            Channel::Discussed => Some("discussed"),
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Channel::Recent => "recent",
            Channel::Popular => "popular",
            Channel::Discussed => "discussed",
        };
        f.write_str(name)
    }
}
