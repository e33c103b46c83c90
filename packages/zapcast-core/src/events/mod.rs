//! Event system for real-time frontend communication.
//!
//! This module provides:
//! - [`EventEmitter`] trait for domain services to emit events
//! - [`BroadcastEventBridge`] for frontend transport
//! - Event types for various domains (sessions, parties, chat, notices)
//!
//! The `ChatMessage` and `PartyMember` types are defined in [`crate::party`]
//! and referenced here.

mod bridge;
mod emitter;

pub use bridge::BroadcastEventBridge;
pub use emitter::{EventEmitter, LoggingEventEmitter, NoopEventEmitter};

use serde::Serialize;

use crate::party::{ChatMessage, PartyMember};
use crate::slot::SlotId;

/// Events broadcast to clients.
///
/// This enum categorizes all real-time events that can be sent to connected
/// clients. Each category has its own inner event type with specific variants.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "category", rename_all = "camelCase")]
pub enum BroadcastEvent {
    /// Events related to playback session lifecycle and recovery.
    Session(SessionEvent),

    /// Events related to watch-party membership and shared state.
    Party(PartyEvent),

    /// Events related to party chat.
    Chat(ChatEvent),

    /// User-facing notifications (toasts).
    Notice(NoticeEvent),
}

/// Events related to playback session state changes.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SessionEvent {
    /// A channel started loading on a slot.
    Loading {
        slot: SlotId,
        #[serde(rename = "channelId")]
        channel_id: String,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
    /// Playback started on a slot.
    Started {
        slot: SlotId,
        #[serde(rename = "channelId")]
        channel_id: String,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
    /// The watchdog found the slot stalled or in decode error.
    Stalled {
        slot: SlotId,
        #[serde(rename = "channelId")]
        channel_id: String,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
    /// A recovery reload was scheduled for a stalled slot.
    Recovering {
        slot: SlotId,
        #[serde(rename = "channelId")]
        channel_id: String,
        /// 1-based recovery attempt number.
        attempt: u32,
        #[serde(rename = "maxAttempts")]
        max_attempts: u32,
        /// Delay before the reload fires, in milliseconds.
        #[serde(rename = "delayMs")]
        delay_ms: u64,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
    /// Automatic recovery was exhausted; the session is left stopped.
    Failed {
        slot: SlotId,
        #[serde(rename = "channelId")]
        channel_id: String,
        #[serde(rename = "channelName")]
        channel_name: String,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
    /// A session was stopped and its player released.
    Stopped {
        slot: SlotId,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
}

/// Events related to watch-party state.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PartyEvent {
    /// A party was created locally; this client is the host.
    Created {
        code: String,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
    /// This client joined an existing party as a member.
    Joined {
        code: String,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
    /// This client left the party (loops already cancelled).
    Left {
        code: String,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
    /// Membership refresh produced a new roster.
    MembersUpdated {
        code: String,
        host: String,
        members: Vec<PartyMember>,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
    /// The host switched channels; local playback followed.
    ChannelSwitched {
        #[serde(rename = "channelId")]
        channel_id: String,
        #[serde(rename = "channelName")]
        channel_name: String,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
}

/// Events related to party chat.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ChatEvent {
    /// A message should be rendered.
    ///
    /// `local` is true for the sender's optimistic render, false for
    /// messages arriving via poll.
    Message {
        message: ChatMessage,
        local: bool,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
}

/// User-facing notifications.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum NoticeEvent {
    /// Auto-dismissing toast.
    Transient {
        text: String,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
    /// Notification that stays until dismissed (terminal failures).
    Persistent {
        text: String,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
}

// From implementations for converting inner events to BroadcastEvent
impl From<SessionEvent> for BroadcastEvent {
    fn from(event: SessionEvent) -> Self {
        BroadcastEvent::Session(event)
    }
}

impl From<PartyEvent> for BroadcastEvent {
    fn from(event: PartyEvent) -> Self {
        BroadcastEvent::Party(event)
    }
}

impl From<ChatEvent> for BroadcastEvent {
    fn from(event: ChatEvent) -> Self {
        BroadcastEvent::Chat(event)
    }
}

impl From<NoticeEvent> for BroadcastEvent {
    fn from(event: NoticeEvent) -> Self {
        BroadcastEvent::Notice(event)
    }
}
