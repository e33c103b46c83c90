//! Playback library and media sink abstractions.
//!
//! Decoding and demuxing are delegated to an external playback library; this
//! module defines the trait seams the orchestrator drives it through. Services
//! depend on these traits rather than concrete implementations, which keeps
//! session and watchdog logic testable with fakes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::channel::Channel;
use crate::slot::{SlotId, MULTIVIEW_SLOTS};

/// Errors from a single playback attempt.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StreamError {
    /// Fetch or load failed at the network layer.
    #[error("network failure: {0}")]
    Network(String),

    /// The sink reported an unsupported format or decode failure.
    #[error("media decode failure: {0}")]
    MediaDecode(String),

    /// The playback buffer was torn down while still registered with the sink.
    #[error("playback buffer removed mid-use: {0}")]
    BufferRace(String),
}

// ─────────────────────────────────────────────────────────────────────────────
// Profiles
// ─────────────────────────────────────────────────────────────────────────────

/// Named buffering/latency trade-off applied when constructing a player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum StreamProfile {
    #[default]
    Default,
    LowLatency,
    Stable,
}

impl StreamProfile {
    /// Returns the profile as a short string identifier (e.g., "low-latency").
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::LowLatency => "low-latency",
            Self::Stable => "stable",
        }
    }

    /// Returns the player tuning for this profile.
    #[must_use]
    pub const fn tuning(&self) -> PlayerTuning {
        match self {
            Self::Default => PlayerTuning {
                stash_buffer_kb: 384,
                live_sync_target_secs: 1.5,
                live_max_drift_secs: 3.0,
            },
            // Stash disabled: frames go to the sink as they arrive, and the
            // player chases the live edge aggressively.
            Self::LowLatency => PlayerTuning {
                stash_buffer_kb: 0,
                live_sync_target_secs: 0.5,
                live_max_drift_secs: 1.0,
            },
            Self::Stable => PlayerTuning {
                stash_buffer_kb: 1024,
                live_sync_target_secs: 3.0,
                live_max_drift_secs: 6.0,
            },
        }
    }
}

/// Concrete buffer/latency numbers handed to the playback library.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayerTuning {
    /// Stash buffer size in kilobytes; 0 disables stashing entirely.
    pub stash_buffer_kb: u32,
    /// Target distance from the live edge, in seconds.
    pub live_sync_target_secs: f64,
    /// Drift from the live edge tolerated before the player chases, in seconds.
    pub live_max_drift_secs: f64,
}

// ─────────────────────────────────────────────────────────────────────────────
// Player Events
// ─────────────────────────────────────────────────────────────────────────────

/// Coarse classification of a playback-library error callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerEventKind {
    /// Network-level failure while fetching segments.
    NetworkError,
    /// Demux/decode failure or media-element error.
    MediaError,
    /// Informational callback (level switches, recoverable hiccups).
    Info,
}

/// One playback-library callback, delivered as a typed event.
///
/// The library reports errors as `(type, detail)` pairs; sessions receive
/// them through an mpsc channel rather than registering closures.
#[derive(Debug, Clone)]
pub struct PlayerEvent {
    pub kind: PlayerEventKind,
    pub detail: String,
}

impl PlayerEvent {
    pub fn new(kind: PlayerEventKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }

    /// Recognizes the buffer-teardown race by message content.
    ///
    /// The playback library reports this as a media error whose detail names
    /// a SourceBuffer that has been removed from its media source. It is the
    /// one error class a session retries silently.
    #[must_use]
    pub fn is_buffer_race(&self) -> bool {
        self.kind == PlayerEventKind::MediaError
            && self.detail.contains("SourceBuffer")
            && self.detail.contains("removed")
    }

    /// Converts the event into the matching [`StreamError`].
    #[must_use]
    pub fn to_error(&self) -> StreamError {
        if self.is_buffer_race() {
            StreamError::BufferRace(self.detail.clone())
        } else {
            match self.kind {
                PlayerEventKind::NetworkError => StreamError::Network(self.detail.clone()),
                _ => StreamError::MediaDecode(self.detail.clone()),
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Sink & Backend Traits
// ─────────────────────────────────────────────────────────────────────────────

/// Non-blocking snapshot of a sink's playback state.
///
/// The watchdog compares successive snapshots to detect stalls, so reading
/// one must never touch the network or block.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SinkSnapshot {
    /// Decodable duration, once the sink has enough metadata. `None` while
    /// the stream is still opening.
    pub duration_secs: Option<f64>,
    /// Current playback position in seconds.
    pub position_secs: f64,
    pub paused: bool,
    pub seeking: bool,
    pub ended: bool,
    /// Decode error reported by the sink, if any.
    pub decode_error: Option<String>,
}

impl SinkSnapshot {
    /// True once the sink reports a usable decodable duration.
    ///
    /// Live sinks may report an infinite duration, which still counts; a
    /// NaN duration fails the comparison and does not.
    #[must_use]
    pub fn has_decodable_duration(&self) -> bool {
        matches!(self.duration_secs, Some(d) if d > 0.0)
    }
}

/// Trait for the video surface a session renders into.
///
/// One sink exists per slot, owned by the embedding frontend; sessions
/// borrow it for the duration of a playback attempt. Mute, pause and seek
/// are plain property writes on every supported embedding, so they are
/// synchronous; only `resume` awaits the sink (starting playback can be
/// rejected, e.g. by an autoplay policy).
#[async_trait]
pub trait MediaSink: Send + Sync {
    /// Sets the sink's mute flag. Only the audio arbiter calls this.
    fn set_muted(&self, muted: bool);

    /// Returns the sink's current mute flag.
    fn muted(&self) -> bool;

    /// Pauses rendering without releasing the source.
    fn pause(&self);

    /// Starts or resumes rendering.
    async fn resume(&self) -> Result<(), StreamError>;

    /// Jumps to the given position in seconds.
    fn seek(&self, position_secs: f64);

    /// Detaches the current source from the sink.
    ///
    /// Part of session teardown; must happen after the player is muted and
    /// before the player instance is destroyed.
    fn clear_source(&self);

    /// Reads the current playback state without blocking.
    fn snapshot(&self) -> SinkSnapshot;
}

/// Handle to one live playback-library instance.
///
/// Obtained from [`PlayerBackend::create`]; destroyed exactly once. A new
/// instance must never be attached to a sink until the prior handle's
/// `destroy` has completed.
#[async_trait]
pub trait PlayerHandle: Send + Sync {
    /// Begins loading the bound channel URL and resolves once playback has
    /// started (first frames rendered).
    async fn load(&self) -> Result<(), StreamError>;

    /// Releases the underlying player instance and detaches it from the sink.
    async fn destroy(self: Box<Self>);
}

/// Trait for constructing playback-library instances.
#[async_trait]
pub trait PlayerBackend: Send + Sync {
    /// Creates a player bound to `sink`, configured for `channel` under
    /// `tuning`. Library callbacks are delivered through `events`.
    async fn create(
        &self,
        channel: &Channel,
        sink: Arc<dyn MediaSink>,
        tuning: PlayerTuning,
        events: mpsc::UnboundedSender<PlayerEvent>,
    ) -> Result<Box<dyn PlayerHandle>, StreamError>;
}

/// The fixed set of per-slot sinks, one per playback surface.
///
/// Sinks are created once by the embedding frontend and never replaced;
/// slot/channel bindings come and go on top of them.
pub struct SlotSinks {
    single: Arc<dyn MediaSink>,
    multiview: [Arc<dyn MediaSink>; MULTIVIEW_SLOTS as usize],
}

impl SlotSinks {
    pub fn new(
        single: Arc<dyn MediaSink>,
        multiview: [Arc<dyn MediaSink>; MULTIVIEW_SLOTS as usize],
    ) -> Self {
        Self { single, multiview }
    }

    /// The sink bound to `slot`.
    pub fn get(&self, slot: SlotId) -> &Arc<dyn MediaSink> {
        match slot {
            SlotId::Single => &self.single,
            SlotId::Multiview(index) => &self.multiview[index as usize],
        }
    }

    /// All sinks in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (SlotId, &Arc<dyn MediaSink>)> {
        SlotId::ALL.iter().map(move |slot| (*slot, self.get(*slot)))
    }
}
