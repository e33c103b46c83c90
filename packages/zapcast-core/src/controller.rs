//! Composition root and public facade of the orchestrator.
//!
//! [`PlaybackController::new`] is the single place where the slot manager,
//! audio arbiter, party engine, chat, probe, and recorder are instantiated
//! and wired together. Everything downstream receives its dependencies as
//! arguments; nothing in this crate reaches for globals.
//!
//! UI and event-binding code drive the whole system through this facade.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use reqwest::Client;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

use crate::audio::AudioArbiter;
use crate::channel::ChannelIndex;
use crate::chat::ChatChannel;
use crate::config::OrchestratorConfig;
use crate::error::{ZapcastError, ZapcastResult};
use crate::events::{
    BroadcastEvent, BroadcastEventBridge, EventEmitter, NoticeEvent,
};
use crate::party::{
    HttpPartyTransport, PartyMembership, PartyStateSnapshot, PartySyncEngine, PartyTransport,
};
use crate::player::{PlayerBackend, SlotSinks};
use crate::probe::{HttpStreamProbe, StreamProbe};
use crate::recording::{HttpRecorder, Recorder, RecordingEntry};
use crate::runtime::{TaskSpawner, TokioSpawner};
use crate::slot::SlotId;
use crate::slots::{SlotManager, SlotView, SwapOutcome, ViewMode};
use crate::util::{now_millis, now_seconds};

/// Timeout for rendezvous, probe, and recorder requests.
const HTTP_TIMEOUT_SECS: u64 = 10;

/// External HTTP collaborators, injectable for tests.
pub struct Collaborators {
    pub party_transport: Arc<dyn PartyTransport>,
    pub probe: Arc<dyn StreamProbe>,
    pub recorder: Arc<dyn Recorder>,
}

impl Collaborators {
    /// Production collaborators on one pooled HTTP client.
    ///
    /// The recorder lives on the same host as the rendezvous server, so
    /// both speak to `party.server_url`.
    pub fn http(config: &OrchestratorConfig) -> ZapcastResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()
            .map_err(|e| ZapcastError::Internal(format!("failed to build HTTP client: {e}")))?;
        let base_url = config.party.server_url.clone();
        Ok(Self {
            party_transport: Arc::new(HttpPartyTransport::new(client.clone(), base_url.clone())),
            probe: Arc::new(HttpStreamProbe::new(client.clone())),
            recorder: Arc::new(HttpRecorder::new(client, base_url)),
        })
    }
}

/// Facade over slots, audio, parties, chat, and recording.
pub struct PlaybackController {
    config: Arc<OrchestratorConfig>,
    channels: Arc<ChannelIndex>,
    slots: Arc<SlotManager>,
    audio: Arc<AudioArbiter>,
    party: Arc<PartySyncEngine>,
    chat: Arc<ChatChannel>,
    probe: Arc<dyn StreamProbe>,
    recorder: Arc<dyn Recorder>,
    event_bridge: Arc<BroadcastEventBridge>,
    spawner: TokioSpawner,
    /// Start stamps of in-progress recordings, keyed by channel name.
    active_recordings: DashMap<String, u64>,
}

impl PlaybackController {
    /// Wires the orchestrator with production HTTP collaborators.
    ///
    /// The sinks and player backend come from the embedding frontend; the
    /// channel index is filled by playlist ingestion.
    pub fn new(
        config: OrchestratorConfig,
        channels: Arc<ChannelIndex>,
        sinks: Arc<SlotSinks>,
        backend: Arc<dyn PlayerBackend>,
    ) -> ZapcastResult<Arc<Self>> {
        let collaborators = Collaborators::http(&config)?;
        Self::with_collaborators(config, channels, sinks, backend, collaborators)
    }

    /// Wires the orchestrator with explicit collaborators.
    pub fn with_collaborators(
        config: OrchestratorConfig,
        channels: Arc<ChannelIndex>,
        sinks: Arc<SlotSinks>,
        backend: Arc<dyn PlayerBackend>,
        collaborators: Collaborators,
    ) -> ZapcastResult<Arc<Self>> {
        config.validate().map_err(ZapcastError::Configuration)?;
        let config = Arc::new(config);
        let spawner = TokioSpawner::current();

        let event_bridge = Arc::new(BroadcastEventBridge::new(config.event_channel_capacity));
        let emitter: Arc<dyn EventEmitter> = Arc::clone(&event_bridge) as Arc<dyn EventEmitter>;

        let audio = Arc::new(AudioArbiter::new(
            Arc::clone(&sinks),
            config.audio_follows_active,
        ));
        let slots = Arc::new(SlotManager::new(
            sinks,
            Arc::clone(&audio),
            backend,
            spawner.clone(),
            Arc::clone(&emitter),
            Arc::clone(&config),
        ));
        let chat = Arc::new(ChatChannel::new(
            Arc::clone(&collaborators.party_transport),
            Arc::clone(&emitter),
            spawner.clone(),
            config.party.chat_poll_interval_ms,
        ));
        let party = Arc::new(PartySyncEngine::new(
            Arc::clone(&collaborators.party_transport),
            Arc::clone(&slots),
            Arc::clone(&channels),
            Arc::clone(&chat),
            Arc::clone(&emitter),
            spawner.clone(),
            config.party.clone(),
        ));

        log::info!(
            "[Controller] Wired orchestrator (party server {})",
            config.party.server_url
        );
        Ok(Arc::new(Self {
            config,
            channels,
            slots,
            audio,
            party,
            chat,
            probe: collaborators.probe,
            recorder: collaborators.recorder,
            event_bridge,
            spawner,
            active_recordings: DashMap::new(),
        }))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────────────────────

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// The channel index backing assignments and party follows.
    pub fn channels(&self) -> &Arc<ChannelIndex> {
        &self.channels
    }

    /// Per-slot state in table order.
    pub fn slot_views(&self) -> Vec<SlotView> {
        self.slots.snapshot()
    }

    pub fn view_mode(&self) -> ViewMode {
        self.slots.view_mode()
    }

    pub fn audio_selection(&self) -> Option<SlotId> {
        self.audio.selection()
    }

    /// Subscribes to the orchestrator's event feed.
    pub fn subscribe(&self) -> broadcast::Receiver<BroadcastEvent> {
        self.event_bridge.subscribe()
    }

    /// The event feed as a `Stream`, for SSE/WebSocket delivery layers.
    pub fn event_stream(&self) -> BroadcastStream<BroadcastEvent> {
        self.event_bridge.subscribe_stream()
    }

    /// The bridge itself, for attaching a platform emitter.
    pub fn event_bridge(&self) -> &Arc<BroadcastEventBridge> {
        &self.event_bridge
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Slots & Audio
    // ─────────────────────────────────────────────────────────────────────────

    /// Assigns a channel to a slot and starts playback.
    ///
    /// A reachability probe runs concurrently with the load; its verdict
    /// is advisory and never blocks or cancels the assignment.
    pub async fn assign_channel(&self, channel_id: &str, slot: SlotId) -> ZapcastResult<()> {
        let Some(channel) = self.channels.get(channel_id) else {
            return Err(ZapcastError::InvalidRequest(format!(
                "unknown channel: {channel_id}"
            )));
        };
        self.spawn_probe(&channel.name, &channel.url);
        self.slots.assign(channel, slot).await
    }

    pub async fn clear_slot(&self, slot: SlotId) {
        self.slots.clear(slot).await;
    }

    /// Reloads the channel bound to `slot`; a user retry after terminal
    /// failure restarts the recovery budget.
    pub async fn reload_slot(&self, slot: SlotId) -> ZapcastResult<()> {
        self.slots.reload(slot).await
    }

    pub async fn swap_click(&self, slot: SlotId) -> ZapcastResult<SwapOutcome> {
        self.slots.swap_click(slot).await
    }

    pub async fn enter_multiview(&self) {
        self.slots.enter_multiview().await;
    }

    pub async fn exit_multiview(&self) -> ZapcastResult<()> {
        self.slots.exit_multiview().await
    }

    /// Routes audio to `slot`, or mutes everything with `None`.
    pub fn set_audio_slot(&self, slot: Option<SlotId>) {
        let slots = &self.slots;
        self.audio
            .set_audio_slot(slot, |s| slots.channel_at(s).is_some());
    }

    /// Toggles audio on `slot`; returns the resulting selection.
    pub fn toggle_audio_slot(&self, slot: SlotId) -> Option<SlotId> {
        let slots = &self.slots;
        self.audio
            .toggle_slot(slot, |s| slots.channel_at(s).is_some())
    }

    pub fn set_audio_follows_active(&self, enabled: bool) {
        self.audio.set_audio_follows_active(enabled);
    }

    fn spawn_probe(&self, channel_name: &str, url: &str) {
        let probe = Arc::clone(&self.probe);
        let emitter = self.emitter();
        let name = channel_name.to_string();
        let url = url.to_string();
        self.spawner.spawn(async move {
            if let Err(e) = probe.probe(&url).await {
                log::info!("[Probe] {e}");
                emitter.emit_notice(NoticeEvent::Transient {
                    text: format!("Stream check for {name} failed; loading anyway"),
                    timestamp: now_millis(),
                });
            }
        });
    }

    fn emitter(&self) -> Arc<dyn EventEmitter> {
        Arc::clone(&self.event_bridge) as Arc<dyn EventEmitter>
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Parties & Chat
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn create_party(&self, username: &str) -> ZapcastResult<String> {
        self.party.create(username).await
    }

    pub async fn join_party(
        &self,
        code: &str,
        username: &str,
    ) -> ZapcastResult<PartyStateSnapshot> {
        self.party.join(code, username).await
    }

    pub async fn leave_party(&self) -> ZapcastResult<()> {
        self.party.leave().await
    }

    pub fn party_membership(&self) -> Option<PartyMembership> {
        self.party.membership()
    }

    pub async fn send_chat_message(&self, text: &str) -> ZapcastResult<()> {
        self.chat.send(text).await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Recording
    // ─────────────────────────────────────────────────────────────────────────

    /// Starts recording a channel's stream via the external recorder.
    pub async fn start_recording(&self, channel_id: &str) -> ZapcastResult<String> {
        let Some(channel) = self.channels.get(channel_id) else {
            return Err(ZapcastError::InvalidRequest(format!(
                "unknown channel: {channel_id}"
            )));
        };

        let start_time = now_seconds() as u64;
        match self
            .recorder
            .start(&channel.name, &channel.url, start_time)
            .await
        {
            Ok(recording_id) => {
                self.active_recordings
                    .insert(channel.name.clone(), start_time);
                self.notice(format!("Recording {}", channel.name));
                Ok(recording_id)
            }
            Err(e) => {
                self.notice("Failed to start recording".to_string());
                Err(e)
            }
        }
    }

    /// Stops the recording started for `channel_id`.
    pub async fn stop_recording(&self, channel_id: &str) -> ZapcastResult<()> {
        let Some(channel) = self.channels.get(channel_id) else {
            return Err(ZapcastError::InvalidRequest(format!(
                "unknown channel: {channel_id}"
            )));
        };
        let Some((_, start_time)) = self.active_recordings.remove(&channel.name) else {
            return Err(ZapcastError::InvalidRequest(format!(
                "no active recording for {}",
                channel.name
            )));
        };

        let stop_time = now_seconds() as u64;
        let duration = stop_time.saturating_sub(start_time);
        match self.recorder.stop(&channel.name, stop_time, duration).await {
            Ok(()) => {
                self.notice("Recording saved".to_string());
                Ok(())
            }
            Err(e) => {
                self.notice("Failed to stop recording".to_string());
                Err(e)
            }
        }
    }

    pub async fn list_recordings(&self) -> ZapcastResult<Vec<RecordingEntry>> {
        match self.recorder.list().await {
            Ok(entries) => Ok(entries),
            Err(e) => {
                self.notice("Failed to fetch recordings".to_string());
                Err(e)
            }
        }
    }

    pub async fn delete_recording(&self, filename: &str) -> ZapcastResult<()> {
        match self.recorder.delete(filename).await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.notice("Failed to delete recording".to_string());
                Err(e)
            }
        }
    }

    fn notice(&self, text: String) {
        self.emitter().emit_notice(NoticeEvent::Transient {
            text,
            timestamp: now_millis(),
        });
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Shutdown
    // ─────────────────────────────────────────────────────────────────────────

    /// Leaves any party and stops every slot. Used on application exit.
    pub async fn shutdown(&self) {
        log::info!("[Controller] Shutting down");
        if self.party.in_party() {
            if let Err(e) = self.party.leave().await {
                log::warn!("[Controller] Party leave during shutdown failed: {e}");
            }
        }
        self.chat.stop();
        self.slots.stop_all().await;
        log::info!("[Controller] Shutdown complete");
    }
}
