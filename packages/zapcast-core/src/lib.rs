//! Zapcast Core - shared library for Zapcast.
//!
//! This crate provides the core functionality for Zapcast, a live-stream
//! playback orchestrator with watch parties. It is designed to be used by
//! an embedding player frontend and by the standalone rendezvous server.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`runtime`]: Task spawning abstraction for async runtime independence
//! - [`events`]: Event system for real-time client communication
//! - [`player`]: Playback backend and media sink abstractions
//! - [`session`]: Per-slot stream sessions with serialized lifecycles
//! - [`monitor`]: Stall watchdog and escalating recovery
//! - [`slots`]: The five playback slots, view modes, and swap
//! - [`audio`]: Single-unmuted-slot audio arbitration
//! - [`party`]: Watch-party sync and the rendezvous transport
//! - [`chat`]: Party chat with optimistic rendering
//! - [`recording`]: Client for the external recorder
//! - [`api`]: The rendezvous server itself
//! - [`error`]: Centralized error types
//!
//! # Abstraction Traits
//!
//! The crate defines several traits to decouple core logic from
//! platform-specific implementations:
//!
//! - [`TaskSpawner`](runtime::TaskSpawner): Spawning background tasks
//! - [`EventEmitter`](events::EventEmitter): Emitting domain events
//! - [`PlayerBackend`](player::PlayerBackend) / [`MediaSink`](player::MediaSink): Driving actual playback
//! - [`PartyTransport`](party::PartyTransport): Talking to the rendezvous server
//!
//! Each trait has a default implementation suitable for production;
//! embedding frontends provide their own player bindings.

#![allow(missing_docs)]
#![warn(clippy::all)]

pub mod api;
pub mod audio;
pub mod channel;
pub mod chat;
pub mod config;
pub mod controller;
pub mod error;
pub mod events;
pub mod monitor;
pub mod party;
pub mod player;
pub mod probe;
pub mod recording;
pub mod runtime;
pub mod session;
pub mod slot;
pub mod slots;
pub mod util;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export commonly used types at the crate root
pub use channel::{Channel, ChannelIndex, StreamKind};
pub use config::{OrchestratorConfig, PartyConfig, RecoveryConfig};
pub use error::{ErrorCode, StreamResult, ZapcastError, ZapcastResult};
pub use events::{
    BroadcastEvent, BroadcastEventBridge, ChatEvent, EventEmitter, NoticeEvent, PartyEvent,
    SessionEvent,
};
pub use runtime::{TaskSpawner, TokioSpawner};
pub use slot::{SlotId, MULTIVIEW_SLOTS};
pub use util::{now_millis, now_seconds};

// Re-export playback types
pub use audio::AudioArbiter;
pub use monitor::HealthMonitor;
pub use player::{
    MediaSink, PlayerBackend, PlayerEvent, PlayerEventKind, PlayerHandle, SinkSnapshot, SlotSinks,
    StreamError, StreamProfile,
};
pub use session::{SessionStatus, StreamSession};
pub use slots::{SlotManager, SlotView, SwapOutcome, ViewMode};

// Re-export party types
pub use chat::ChatChannel;
pub use party::{
    ChatMessage, HttpPartyTransport, PartyMember, PartyMembership, PartyRole, PartyStateSnapshot,
    PartySyncEngine, PartyTransport, PlaybackUpdate,
};

// Re-export collaborator clients
pub use probe::{HttpStreamProbe, StreamProbe};
pub use recording::{HttpRecorder, Recorder, RecordingEntry};

// Re-export the composition root
pub use controller::{Collaborators, PlaybackController};

// Re-export API types
pub use api::{start_server, AppState, PartyRegistry, ServerError, ServerOptions};
