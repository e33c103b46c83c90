//! Orchestrator configuration.
//!
//! All timing knobs live here so tests can shrink intervals and production
//! embeddings can tune them without touching component code. Values are
//! validated once at controller construction.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::player::StreamProfile;

/// Configuration for stall detection and automatic recovery.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RecoveryConfig {
    /// Interval between watchdog liveness checks (milliseconds).
    pub watchdog_interval_ms: u64,

    /// Escalating delays before recovery reloads (milliseconds), indexed by
    /// attempt count and clamped to the last entry.
    pub delay_schedule_ms: Vec<u64>,

    /// Recovery attempts before a session is declared failed.
    pub max_attempts: u32,
}

impl RecoveryConfig {
    /// Returns the reload delay for a 0-based attempt index, clamping past
    /// the end of the schedule.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> u64 {
        let idx = (attempt as usize).min(self.delay_schedule_ms.len().saturating_sub(1));
        self.delay_schedule_ms.get(idx).copied().unwrap_or(0)
    }

    /// Validates the configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.watchdog_interval_ms == 0 {
            return Err("watchdog_interval_ms must be >= 1".to_string());
        }
        if self.delay_schedule_ms.is_empty() {
            return Err("delay_schedule_ms must not be empty".to_string());
        }
        if self.max_attempts == 0 {
            return Err("max_attempts must be >= 1".to_string());
        }
        Ok(())
    }
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            watchdog_interval_ms: 3_000,
            delay_schedule_ms: vec![5_000, 10_000, 20_000, 40_000, 60_000],
            max_attempts: 5,
        }
    }
}

/// Configuration for watch-party sync and chat loops.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PartyConfig {
    /// Base URL of the rendezvous server.
    pub server_url: String,

    /// Host broadcast interval (milliseconds).
    pub broadcast_interval_ms: u64,

    /// Member reconcile interval (milliseconds).
    pub reconcile_interval_ms: u64,

    /// Membership roster refresh interval (milliseconds).
    pub membership_interval_ms: u64,

    /// Chat poll interval (milliseconds).
    pub chat_poll_interval_ms: u64,

    /// Drift beyond which a member is forcibly seeked to the host position
    /// (seconds).
    pub drift_tolerance_secs: f64,
}

impl PartyConfig {
    /// Validates the configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.broadcast_interval_ms == 0
            || self.reconcile_interval_ms == 0
            || self.membership_interval_ms == 0
            || self.chat_poll_interval_ms == 0
        {
            return Err("party intervals must be >= 1 ms".to_string());
        }
        if !(self.drift_tolerance_secs > 0.0) {
            return Err("drift_tolerance_secs must be positive".to_string());
        }
        Ok(())
    }
}

impl Default for PartyConfig {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:8002".to_string(),
            broadcast_interval_ms: 100,
            reconcile_interval_ms: 100,
            membership_interval_ms: 1_000,
            chat_poll_interval_ms: 500,
            drift_tolerance_secs: 0.5,
        }
    }
}

/// Configuration for the playback orchestrator.
///
/// All fields have sensible defaults.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct OrchestratorConfig {
    /// Stall detection and recovery configuration.
    #[serde(default)]
    pub recovery: RecoveryConfig,

    /// Watch-party configuration.
    #[serde(default)]
    pub party: PartyConfig,

    /// When enabled, selecting a slot also routes audio to it.
    #[serde(default = "default_audio_follows_active")]
    pub audio_follows_active: bool,

    /// Global stream profile applied when a channel has no override.
    #[serde(default)]
    pub default_profile: StreamProfile,

    /// Per-channel profile overrides, keyed by channel id.
    #[serde(default)]
    pub profile_overrides: HashMap<String, StreamProfile>,

    /// Capacity of the event broadcast channel.
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

fn default_audio_follows_active() -> bool {
    true
}

fn default_event_channel_capacity() -> usize {
    100
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            recovery: RecoveryConfig::default(),
            party: PartyConfig::default(),
            audio_follows_active: default_audio_follows_active(),
            default_profile: StreamProfile::default(),
            profile_overrides: HashMap::new(),
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

impl OrchestratorConfig {
    /// Resolves the stream profile for a channel: per-channel override
    /// first, then the global default.
    #[must_use]
    pub fn profile_for(&self, channel_id: &str) -> StreamProfile {
        self.profile_overrides
            .get(channel_id)
            .copied()
            .unwrap_or(self.default_profile)
    }

    /// Validates the configuration values.
    pub fn validate(&self) -> Result<(), String> {
        self.recovery.validate()?;
        self.party.validate()?;
        if self.event_channel_capacity == 0 {
            return Err(
                "event_channel_capacity must be >= 1 (broadcast::channel panics on 0)".to_string(),
            );
        }
        Ok(())
    }
}
