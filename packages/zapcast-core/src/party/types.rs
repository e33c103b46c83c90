//! Domain types for watch-party state.
//!
//! These are the shapes shared between the sync engine, the chat channel,
//! the event system, and the rendezvous wire. Wire payloads use camelCase
//! field names; extra fields sent by the server (per-member activity
//! stamps) are ignored on deserialization.

use serde::{Deserialize, Serialize};

/// Characters the wire keeps of a username; both ends truncate to this.
pub const MAX_USERNAME_CHARS: usize = 50;

/// Characters the wire keeps of a chat message; both ends truncate to this.
pub const MAX_MESSAGE_CHARS: usize = 500;

/// Role of the local participant within a party.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartyRole {
    /// Created the party; broadcasts playback state.
    Host,
    /// Joined an existing party; reconciles against the host's state.
    Member,
}

impl PartyRole {
    /// Returns true for the host role.
    #[must_use]
    pub const fn is_host(&self) -> bool {
        matches!(self, Self::Host)
    }
}

/// One participant in a party roster.
///
/// Ids are assigned by the rendezvous server: `"host"` for the creator,
/// `"member_N"` for joiners.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartyMember {
    pub id: String,
    pub username: String,
}

/// The local participant's membership record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartyMembership {
    /// Upper-cased 6-character party code.
    pub code: String,
    /// Username as registered with the server (truncated to 50 chars).
    pub username: String,
    pub role: PartyRole,
}

/// Shared party state as fetched from the rendezvous server.
///
/// `join` responses omit `host`; it defaults to empty there and is filled
/// in by the first membership refresh.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartyStateSnapshot {
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub members: Vec<PartyMember>,
    /// Channel id the host is watching; empty until the host picks one.
    #[serde(default)]
    pub channel: String,
    #[serde(default)]
    pub playing: bool,
    #[serde(default)]
    pub current_time: f64,
}

/// Partial playback-state update pushed by the host.
///
/// Absent fields are left untouched by the server's merge.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub playing: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_time: Option<f64>,
}

/// A party chat message.
///
/// `id` is client-generated for the sender's optimistic render and never
/// round-trips through the server, which is why de-duplication keys on
/// content rather than id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub username: String,
    pub text: String,
    /// Unix timestamp as fractional seconds (server clock for polled
    /// messages, local clock for optimistic renders).
    pub timestamp: f64,
}

impl ChatMessage {
    /// Content key for optimistic-render de-duplication:
    /// `(username, text, timestamp truncated to whole seconds)`.
    #[must_use]
    pub fn dedup_key(&self) -> (String, String, i64) {
        (
            self.username.clone(),
            self.text.clone(),
            self.timestamp as i64,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_deserializes_wire_shape() {
        let json = r#"{
            "host": "alice",
            "members": [
                {"username": "alice", "id": "host", "timestamp": 1700000000.1},
                {"username": "bob", "id": "member_1", "timestamp": 1700000010.5}
            ],
            "channel": "news-1",
            "playing": true,
            "currentTime": 42.5
        }"#;

        let snapshot: PartyStateSnapshot = serde_json::from_str(json).expect("valid snapshot");
        assert_eq!(snapshot.host, "alice");
        assert_eq!(snapshot.members.len(), 2);
        assert_eq!(snapshot.members[1].id, "member_1");
        assert_eq!(snapshot.channel, "news-1");
        assert!(snapshot.playing);
        assert_eq!(snapshot.current_time, 42.5);
    }

    #[test]
    fn join_response_without_host_defaults_empty() {
        let json = r#"{"channel": "", "playing": false, "currentTime": 0, "members": []}"#;
        let snapshot: PartyStateSnapshot = serde_json::from_str(json).expect("valid join body");
        assert_eq!(snapshot.host, "");
        assert!(!snapshot.playing);
    }

    #[test]
    fn playback_update_skips_absent_fields() {
        let update = PlaybackUpdate {
            channel: Some("news-1".to_string()),
            playing: None,
            current_time: None,
        };
        let json = serde_json::to_string(&update).expect("serializable");
        assert_eq!(json, r#"{"channel":"news-1"}"#);
    }

    #[test]
    fn chat_message_id_never_serialized_when_absent() {
        let message = ChatMessage {
            id: None,
            username: "bob".to_string(),
            text: "hi".to_string(),
            timestamp: 1700000000.25,
        };
        let json = serde_json::to_string(&message).expect("serializable");
        assert!(!json.contains("\"id\""));
    }

    #[test]
    fn dedup_key_truncates_timestamp_to_seconds() {
        let a = ChatMessage {
            id: Some("local-1".to_string()),
            username: "bob".to_string(),
            text: "hi".to_string(),
            timestamp: 1700000000.25,
        };
        let b = ChatMessage {
            id: None,
            username: "bob".to_string(),
            text: "hi".to_string(),
            timestamp: 1700000000.93,
        };
        assert_eq!(a.dedup_key(), b.dedup_key());
    }
}
