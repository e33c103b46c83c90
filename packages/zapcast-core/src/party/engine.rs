//! Watch-party synchronization.
//!
//! A party has one host and any number of members. The host's loop pushes
//! its playback state to the rendezvous server on a fixed cadence and
//! never reads anyone else's state; member loops fetch that state and
//! reconcile local playback against it (channel follow, drift seek,
//! play/pause). A separate, slower loop refreshes the roster for display.
//! The one-directional flow is what keeps hosts and members from seeking
//! each other in circles.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::channel::ChannelIndex;
use crate::chat::ChatChannel;
use crate::config::PartyConfig;
use crate::error::{ZapcastError, ZapcastResult};
use crate::events::{EventEmitter, NoticeEvent, PartyEvent};
use crate::runtime::{TaskSpawner, TokioSpawner};
use crate::slot::SlotId;
use crate::slots::{SlotManager, ViewMode};
use crate::util::{now_millis, truncate_chars};

use super::transport::{PartyTransport, PartyTransportError};
use super::types::{
    PartyMember, PartyMembership, PartyRole, PartyStateSnapshot, PlaybackUpdate,
    MAX_USERNAME_CHARS,
};

/// Drives the local participant's side of a watch party.
///
/// Owns the sync loops and the party binding of the [`ChatChannel`];
/// `leave` cancels every loop before the server is notified, so no timer
/// ever fires against a departed party.
pub struct PartySyncEngine {
    transport: Arc<dyn PartyTransport>,
    slots: Arc<SlotManager>,
    channels: Arc<ChannelIndex>,
    chat: Arc<ChatChannel>,
    emitter: Arc<dyn EventEmitter>,
    spawner: TokioSpawner,
    config: PartyConfig,
    /// Serializes create/join/leave so two gestures cannot race the
    /// membership slot.
    op_lock: tokio::sync::Mutex<()>,
    active: Mutex<Option<ActiveParty>>,
}

struct ActiveParty {
    membership: PartyMembership,
    token: CancellationToken,
}

impl Drop for ActiveParty {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

impl PartySyncEngine {
    pub fn new(
        transport: Arc<dyn PartyTransport>,
        slots: Arc<SlotManager>,
        channels: Arc<ChannelIndex>,
        chat: Arc<ChatChannel>,
        emitter: Arc<dyn EventEmitter>,
        spawner: TokioSpawner,
        config: PartyConfig,
    ) -> Self {
        Self {
            transport,
            slots,
            channels,
            chat,
            emitter,
            spawner,
            config,
            op_lock: tokio::sync::Mutex::new(()),
            active: Mutex::new(None),
        }
    }

    /// The local participant's membership, if currently in a party.
    pub fn membership(&self) -> Option<PartyMembership> {
        self.active.lock().as_ref().map(|a| a.membership.clone())
    }

    pub fn in_party(&self) -> bool {
        self.active.lock().is_some()
    }

    /// Creates a party with this participant as host and starts the host
    /// broadcast and roster loops.
    pub async fn create(&self, username: &str) -> ZapcastResult<String> {
        let _guard = self.op_lock.lock().await;
        if self.in_party() {
            return Err(ZapcastError::PartyProtocol(
                "already in a party".to_string(),
            ));
        }

        let username = normalize_username(username);
        let code = self.transport.create(&username).await?;
        log::info!("[Party] Created party {code} as host");

        let membership = PartyMembership {
            code: code.clone(),
            username: username.clone(),
            role: PartyRole::Host,
        };
        self.start_loops(membership, None);
        self.chat.start(&code, &username);

        self.emitter.emit_party(PartyEvent::Created {
            code: code.clone(),
            timestamp: now_millis(),
        });
        self.emitter.emit_notice(NoticeEvent::Transient {
            text: format!("Party {code} created. Share the code to invite viewers."),
            timestamp: now_millis(),
        });
        Ok(code)
    }

    /// Joins an existing party as a member and starts the reconcile and
    /// roster loops.
    ///
    /// Returns the shared state at join time; the first reconcile tick
    /// adopts the host's channel shortly after.
    pub async fn join(&self, code: &str, username: &str) -> ZapcastResult<PartyStateSnapshot> {
        let _guard = self.op_lock.lock().await;
        if self.in_party() {
            return Err(ZapcastError::PartyProtocol(
                "already in a party".to_string(),
            ));
        }

        let code = normalize_code(code);
        if code.is_empty() {
            return Err(ZapcastError::InvalidRequest(
                "party code must not be empty".to_string(),
            ));
        }
        let username = normalize_username(username);

        let snapshot = match self.transport.join(&code, &username).await {
            Ok(snapshot) => snapshot,
            Err(PartyTransportError::Rejected(msg)) if msg == "Party not found" => {
                return Err(ZapcastError::PartyNotFound(code));
            }
            Err(e) => return Err(e.into()),
        };
        log::info!("[Party] Joined party {code} as {username}");

        // Seed the last-seen channel from local playback so the first tick
        // does not reload a channel we are already watching.
        let local_channel = self
            .slots
            .channel_at(SlotId::Single)
            .map(|c| c.id.clone());

        let membership = PartyMembership {
            code: code.clone(),
            username: username.clone(),
            role: PartyRole::Member,
        };
        self.start_loops(membership, local_channel);
        self.chat.start(&code, &username);

        self.emitter.emit_party(PartyEvent::Joined {
            code: code.clone(),
            timestamp: now_millis(),
        });
        self.emitter.emit_notice(NoticeEvent::Transient {
            text: format!("Joined party {code}"),
            timestamp: now_millis(),
        });
        Ok(snapshot)
    }

    /// Leaves the current party. A no-op when not in one.
    ///
    /// Loop cancellation happens before the server call; the departure
    /// always succeeds locally even when the notification fails.
    pub async fn leave(&self) -> ZapcastResult<()> {
        let _guard = self.op_lock.lock().await;
        let Some(active) = self.active.lock().take() else {
            return Ok(());
        };
        let code = active.membership.code.clone();

        active.token.cancel();
        self.chat.stop();

        if let Err(e) = self.transport.leave(&code).await {
            log::warn!("[Party] Leave notification for {code} failed: {e}");
        }
        log::info!("[Party] Left party {code}");

        self.emitter.emit_party(PartyEvent::Left {
            code: code.clone(),
            timestamp: now_millis(),
        });
        self.emitter.emit_notice(NoticeEvent::Transient {
            text: format!("Left party {code}"),
            timestamp: now_millis(),
        });
        Ok(())
    }

    fn start_loops(&self, membership: PartyMembership, last_channel: Option<String>) {
        let token = CancellationToken::new();

        match membership.role {
            PartyRole::Host => {
                let host = HostLoop {
                    transport: Arc::clone(&self.transport),
                    slots: Arc::clone(&self.slots),
                    code: membership.code.clone(),
                    interval_ms: self.config.broadcast_interval_ms,
                    token: token.child_token(),
                };
                self.spawner.spawn(host.run());
            }
            PartyRole::Member => {
                let member = MemberLoop {
                    transport: Arc::clone(&self.transport),
                    slots: Arc::clone(&self.slots),
                    channels: Arc::clone(&self.channels),
                    emitter: Arc::clone(&self.emitter),
                    code: membership.code.clone(),
                    interval_ms: self.config.reconcile_interval_ms,
                    tolerance_secs: self.config.drift_tolerance_secs,
                    token: token.child_token(),
                };
                self.spawner.spawn(member.run(last_channel));
            }
        }

        let roster = RosterLoop {
            transport: Arc::clone(&self.transport),
            emitter: Arc::clone(&self.emitter),
            code: membership.code.clone(),
            interval_ms: self.config.membership_interval_ms,
            token: token.child_token(),
        };
        self.spawner.spawn(roster.run());

        *self.active.lock() = Some(ActiveParty { membership, token });
    }
}

fn normalize_code(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}

fn normalize_username(username: &str) -> String {
    let trimmed = username.trim();
    if trimmed.is_empty() {
        "Anonymous".to_string()
    } else {
        truncate_chars(trimmed, MAX_USERNAME_CHARS)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Host Loop
// ─────────────────────────────────────────────────────────────────────────────

/// Pushes the host's playback state on a fixed cadence. Pure push; the
/// host never reads member state.
struct HostLoop {
    transport: Arc<dyn PartyTransport>,
    slots: Arc<SlotManager>,
    code: String,
    interval_ms: u64,
    token: CancellationToken,
}

impl HostLoop {
    async fn run(self) {
        let mut ticker = interval(Duration::from_millis(self.interval_ms));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = self.token.cancelled() => break,
                _ = ticker.tick() => {}
            }
            self.push_once().await;
        }
        log::debug!("[Party] Host loop for {} exited", self.code);
    }

    async fn push_once(&self) {
        // Nothing to broadcast until a channel is up on the single view.
        let Some(session) = self.slots.session_at(SlotId::Single) else {
            return;
        };
        let update = PlaybackUpdate {
            channel: Some(session.channel().id.clone()),
            playing: Some(!session.is_paused()),
            current_time: Some(session.position_secs()),
        };
        if let Err(e) = self.transport.post_update(&self.code, &update).await {
            log::debug!("[Party] Host state push failed: {e}");
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Member Loop
// ─────────────────────────────────────────────────────────────────────────────

/// Fetches shared state and reconciles local playback against it.
struct MemberLoop {
    transport: Arc<dyn PartyTransport>,
    slots: Arc<SlotManager>,
    channels: Arc<ChannelIndex>,
    emitter: Arc<dyn EventEmitter>,
    code: String,
    interval_ms: u64,
    tolerance_secs: f64,
    token: CancellationToken,
}

impl MemberLoop {
    async fn run(self, mut last_channel: Option<String>) {
        let mut ticker = interval(Duration::from_millis(self.interval_ms));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = self.token.cancelled() => break,
                _ = ticker.tick() => {}
            }
            self.reconcile_once(&mut last_channel).await;
        }
        log::debug!("[Party] Member loop for {} exited", self.code);
    }

    async fn reconcile_once(&self, last_channel: &mut Option<String>) {
        let snapshot = match self.transport.fetch_state(&self.code).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                log::debug!("[Party] State fetch failed: {e}");
                return;
            }
        };

        // Party reconciliation drives the single view only.
        if self.slots.view_mode() == ViewMode::Multiview {
            return;
        }

        if !snapshot.channel.is_empty() && last_channel.as_deref() != Some(&snapshot.channel) {
            self.follow_host_channel(&snapshot.channel).await;
            *last_channel = Some(snapshot.channel.clone());
            // Fresh load; position comparison waits for the next tick.
            return;
        }

        let Some(session) = self.slots.session_at(SlotId::Single) else {
            return;
        };
        if session.channel().id != snapshot.channel {
            // Locally deviated from the shared channel; leave it alone
            // until the host switches again.
            return;
        }

        let drift = (session.position_secs() - snapshot.current_time).abs();
        if drift > self.tolerance_secs {
            log::info!(
                "[Party] Forced seek: drifted {:.2}s from host (tolerance {:.1}s)",
                drift,
                self.tolerance_secs
            );
            session.seek(snapshot.current_time);
        }

        if snapshot.playing && session.is_paused() {
            if let Err(e) = session.resume().await {
                log::warn!("[Party] Resume to match host failed: {e}");
            }
        } else if !snapshot.playing && !session.is_paused() {
            session.pause();
        }
    }

    async fn follow_host_channel(&self, channel_id: &str) {
        let Some(channel) = self.channels.get(channel_id) else {
            log::warn!("[Party] Host switched to unknown channel {channel_id}");
            self.emitter.emit_notice(NoticeEvent::Transient {
                text: "Host switched to a channel missing from your playlist".to_string(),
                timestamp: now_millis(),
            });
            return;
        };
        let channel_name = channel.name.clone();
        log::info!("[Party] Following host to {channel_id} ({channel_name})");

        match self.slots.assign(channel, SlotId::Single).await {
            Ok(()) => {
                self.emitter.emit_party(PartyEvent::ChannelSwitched {
                    channel_id: channel_id.to_string(),
                    channel_name: channel_name.clone(),
                    timestamp: now_millis(),
                });
                self.emitter.emit_notice(NoticeEvent::Transient {
                    text: format!("Party host switched to {channel_name}"),
                    timestamp: now_millis(),
                });
            }
            // The assign already surfaced its own failure notice.
            Err(e) => log::warn!("[Party] Failed to follow host to {channel_id}: {e}"),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Roster Loop
// ─────────────────────────────────────────────────────────────────────────────

/// Refreshes the member list and host identity for display. Playback
/// reconciliation never depends on this loop.
struct RosterLoop {
    transport: Arc<dyn PartyTransport>,
    emitter: Arc<dyn EventEmitter>,
    code: String,
    interval_ms: u64,
    token: CancellationToken,
}

impl RosterLoop {
    async fn run(self) {
        let mut ticker = interval(Duration::from_millis(self.interval_ms));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        let mut last: Option<(String, Vec<PartyMember>)> = None;
        loop {
            tokio::select! {
                _ = self.token.cancelled() => break,
                _ = ticker.tick() => {}
            }
            self.refresh_once(&mut last).await;
        }
        log::debug!("[Party] Roster loop for {} exited", self.code);
    }

    async fn refresh_once(&self, last: &mut Option<(String, Vec<PartyMember>)>) {
        let snapshot = match self.transport.fetch_state(&self.code).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                log::debug!("[Party] Roster fetch failed: {e}");
                return;
            }
        };

        let roster = (snapshot.host, snapshot.members);
        if last.as_ref() == Some(&roster) {
            return;
        }
        *last = Some(roster.clone());

        self.emitter.emit_party(PartyEvent::MembersUpdated {
            code: self.code.clone(),
            host: roster.0,
            members: roster.1,
            timestamp: now_millis(),
        });
    }
}
