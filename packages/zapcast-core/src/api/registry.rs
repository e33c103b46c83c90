//! In-memory party store for the rendezvous server.
//!
//! Parties stay alive as long as someone accesses them: every lookup
//! refreshes the record's touch stamp, and a record untouched for an hour
//! is dropped on its next lookup. Chat history is capped per party with
//! the oldest messages falling off first. Leaving never removes anyone
//! from the roster; it only refreshes the touch stamp, so an abandoned
//! party ages out on its own.

use dashmap::mapref::one::RefMut;
use dashmap::DashMap;
use rand::Rng;
use serde::Serialize;

use crate::party::{ChatMessage, PlaybackUpdate, MAX_MESSAGE_CHARS, MAX_USERNAME_CHARS};
use crate::util::{now_seconds, truncate_chars};

/// Seconds a party survives without any access.
pub const PARTY_TTL_SECS: f64 = 3600.0;

/// Messages retained per party.
pub const MESSAGE_HISTORY_LIMIT: usize = 100;

/// Length of a party code.
pub const CODE_LEN: usize = 6;

const CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Roster entry as stored and served. `timestamp` is the join stamp;
/// clients may ignore it.
#[derive(Debug, Clone, Serialize)]
pub struct RosterMember {
    pub username: String,
    pub id: String,
    pub timestamp: f64,
}

/// A party's shared state as handed to the HTTP layer.
#[derive(Debug, Clone)]
pub struct PartyView {
    pub host: String,
    pub members: Vec<RosterMember>,
    pub channel: String,
    pub playing: bool,
    pub current_time: f64,
}

/// Outcome of appending a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageOutcome {
    Stored,
    EmptyText,
    PartyNotFound,
}

#[derive(Debug)]
struct PartyRecord {
    host: String,
    members: Vec<RosterMember>,
    channel: String,
    playing: bool,
    current_time: f64,
    messages: Vec<ChatMessage>,
    /// Stamp of the last access; drives expiry.
    touched: f64,
}

impl PartyRecord {
    fn view(&self) -> PartyView {
        PartyView {
            host: self.host.clone(),
            members: self.members.clone(),
            channel: self.channel.clone(),
            playing: self.playing,
            current_time: self.current_time,
        }
    }
}

/// All live parties, keyed by code.
pub struct PartyRegistry {
    parties: DashMap<String, PartyRecord>,
}

impl PartyRegistry {
    pub fn new() -> Self {
        Self {
            parties: DashMap::new(),
        }
    }

    /// Number of stored parties, including idle ones not yet aged out.
    pub fn party_count(&self) -> usize {
        self.parties.len()
    }

    /// Creates a party hosted by `username` and returns its code.
    pub fn create(&self, username: &str) -> String {
        let username = normalize_username(username);
        let now = now_seconds();
        let code = loop {
            let candidate = random_code();
            if !self.parties.contains_key(&candidate) {
                break candidate;
            }
        };
        self.parties.insert(
            code.clone(),
            PartyRecord {
                host: username.clone(),
                members: vec![RosterMember {
                    username: username.clone(),
                    id: "host".to_string(),
                    timestamp: now,
                }],
                channel: String::new(),
                playing: false,
                current_time: 0.0,
                messages: Vec::new(),
                touched: now,
            },
        );
        log::info!("[Rendezvous] Created: {code} (host: {username})");
        code
    }

    /// Adds `username` to the roster and returns the state to adopt.
    ///
    /// Member ids are positional (`member_1`, `member_2`, ...) and never
    /// reused within a party.
    pub fn join(&self, code: &str, username: &str) -> Option<PartyView> {
        let username = normalize_username(username);
        let mut record = self.live(code)?;
        let id = format!("member_{}", record.members.len());
        record.members.push(RosterMember {
            username: username.clone(),
            id,
            timestamp: now_seconds(),
        });
        log::info!("[Rendezvous] Joined: {code} (user: {username})");
        Some(record.view())
    }

    /// The party's current shared state and roster.
    pub fn state(&self, code: &str) -> Option<PartyView> {
        self.live(code).map(|record| record.view())
    }

    /// Merges the present fields of `update` into the shared state.
    pub fn update(&self, code: &str, update: &PlaybackUpdate) -> Option<()> {
        let mut record = self.live(code)?;
        if let Some(channel) = &update.channel {
            record.channel = channel.clone();
        }
        if let Some(playing) = update.playing {
            record.playing = playing;
        }
        if let Some(current_time) = update.current_time {
            record.current_time = current_time;
        }
        log::debug!(
            "[Rendezvous] Updated: {code} - channel: {}, time: {:.1}s, playing: {}",
            record.channel,
            record.current_time,
            record.playing
        );
        Some(())
    }

    /// Messages with a timestamp strictly newer than `since`.
    pub fn messages_since(&self, code: &str, since: f64) -> Option<Vec<ChatMessage>> {
        let record = self.live(code)?;
        Some(
            record
                .messages
                .iter()
                .filter(|m| m.timestamp > since)
                .cloned()
                .collect(),
        )
    }

    /// Appends a message, dropping the oldest past the history cap.
    pub fn append_message(&self, code: &str, username: &str, text: &str) -> MessageOutcome {
        let Some(mut record) = self.live(code) else {
            return MessageOutcome::PartyNotFound;
        };
        let text = truncate_chars(text, MAX_MESSAGE_CHARS);
        if text.trim().is_empty() {
            return MessageOutcome::EmptyText;
        }
        let username = normalize_username(username);
        record.messages.push(ChatMessage {
            id: None,
            username,
            text,
            timestamp: now_seconds(),
        });
        let len = record.messages.len();
        if len > MESSAGE_HISTORY_LIMIT {
            record.messages.drain(..len - MESSAGE_HISTORY_LIMIT);
        }
        MessageOutcome::Stored
    }

    /// Marks a departure. Only refreshes the touch stamp: remaining
    /// members keep the party alive by polling, and a fully abandoned one
    /// ages out.
    pub fn leave(&self, code: &str) {
        if let Some(mut record) = self.parties.get_mut(code) {
            record.touched = now_seconds();
            log::info!("[Rendezvous] Left: {code}");
        }
    }

    /// Expiry-checked lookup; refreshes the touch stamp of a live party.
    fn live(&self, code: &str) -> Option<RefMut<'_, String, PartyRecord>> {
        let now = now_seconds();
        {
            let record = self.parties.get(code)?;
            if now - record.touched > PARTY_TTL_SECS {
                drop(record);
                self.parties.remove(code);
                log::info!("[Rendezvous] Expired: {code}");
                return None;
            }
        }
        let mut record = self.parties.get_mut(code)?;
        record.touched = now;
        Some(record)
    }

    #[cfg(test)]
    fn backdate(&self, code: &str, secs: f64) {
        if let Some(mut record) = self.parties.get_mut(code) {
            record.touched -= secs;
        }
    }
}

impl Default for PartyRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn random_code() -> String {
    let mut rng = rand::thread_rng();
    (0..CODE_LEN)
        .map(|_| {
            let idx = rng.gen_range(0..CODE_ALPHABET.len());
            CODE_ALPHABET[idx] as char
        })
        .collect()
}

fn normalize_username(username: &str) -> String {
    if username.is_empty() {
        "Anonymous".to_string()
    } else {
        truncate_chars(username, MAX_USERNAME_CHARS)
    }
}
