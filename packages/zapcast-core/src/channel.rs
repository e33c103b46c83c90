//! Channel identity and lookup.
//!
//! Channels are produced by playlist ingestion upstream of this crate and
//! are read-only here. The index exists so party reconciliation can turn a
//! broadcast channel id back into a loadable [`Channel`].

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Delivery format of a channel's stream URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    Hls,
    Dash,
    /// Direct progressive file or unknown container; handed to the player as-is.
    Direct,
}

impl StreamKind {
    /// Returns the kind as a short string identifier (e.g., "hls").
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Hls => "hls",
            Self::Dash => "dash",
            Self::Direct => "direct",
        }
    }

    /// Guesses the kind from a stream URL. Defaults to `Direct`.
    #[must_use]
    pub fn from_url(url: &str) -> Self {
        let path = url.split(['?', '#']).next().unwrap_or(url);
        if path.ends_with(".m3u8") || path.ends_with(".m3u") {
            Self::Hls
        } else if path.ends_with(".mpd") {
            Self::Dash
        } else {
            Self::Direct
        }
    }
}

/// Immutable channel identity as produced by playlist ingestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Channel {
    pub id: String,
    pub name: String,
    pub url: String,
    /// Playlist group/category label, if the playlist carried one.
    #[serde(default)]
    pub group: Option<String>,
    pub stream_type: StreamKind,
}

impl Channel {
    /// Builds a channel, deriving the stream kind from the URL.
    pub fn new(id: impl Into<String>, name: impl Into<String>, url: impl Into<String>) -> Self {
        let url = url.into();
        let stream_type = StreamKind::from_url(&url);
        Self {
            id: id.into(),
            name: name.into(),
            url,
            group: None,
            stream_type,
        }
    }
}

/// Thread-safe id-to-channel lookup table.
///
/// Populated from playlist ingestion; this is a low-level data structure,
/// orchestration lives in [`SlotManager`](crate::slots::SlotManager) and
/// [`PartySyncEngine`](crate::party::PartySyncEngine).
#[derive(Default)]
pub struct ChannelIndex {
    channels: DashMap<String, Arc<Channel>>,
}

impl ChannelIndex {
    /// Creates an empty index.
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    /// Inserts or replaces a channel, keyed by its id.
    pub fn insert(&self, channel: Channel) {
        self.channels.insert(channel.id.clone(), Arc::new(channel));
    }

    /// Retrieves a channel by its id.
    pub fn get(&self, id: &str) -> Option<Arc<Channel>> {
        self.channels.get(id).map(|r| Arc::clone(r.value()))
    }

    /// Returns the number of known channels.
    #[must_use]
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    /// Returns true when no channels have been ingested.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_kind_from_url_recognizes_manifests() {
        assert_eq!(StreamKind::from_url("http://a/live.m3u8"), StreamKind::Hls);
        assert_eq!(
            StreamKind::from_url("http://a/live.m3u8?token=x"),
            StreamKind::Hls
        );
        assert_eq!(StreamKind::from_url("http://a/live.mpd"), StreamKind::Dash);
        assert_eq!(StreamKind::from_url("http://a/live.ts"), StreamKind::Direct);
    }

    #[test]
    fn index_lookup_by_id() {
        let index = ChannelIndex::new();
        index.insert(Channel::new("news-1", "News One", "http://a/news.m3u8"));

        let found = index.get("news-1").expect("channel present");
        assert_eq!(found.name, "News One");
        assert_eq!(found.stream_type, StreamKind::Hls);
        assert!(index.get("missing").is_none());
    }
}
