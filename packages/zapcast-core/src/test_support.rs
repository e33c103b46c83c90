//! Shared test doubles for session, watchdog, slot, and party tests.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::channel::Channel;
use crate::events::{ChatEvent, EventEmitter, NoticeEvent, PartyEvent, SessionEvent};
use crate::party::transport::{PartyTransport, PartyTransportError, TransportResult};
use crate::party::{ChatMessage, PartyMember, PartyStateSnapshot, PlaybackUpdate};
use crate::player::{
    MediaSink, PlayerBackend, PlayerEvent, PlayerHandle, PlayerTuning, SinkSnapshot, SlotSinks,
    StreamError,
};

/// Test channel fixture.
pub fn test_channel(id: &str) -> Arc<Channel> {
    Arc::new(Channel::new(
        id,
        format!("Channel {id}"),
        format!("http://example.test/{id}.m3u8"),
    ))
}

/// Five fake sinks arranged as a [`SlotSinks`] table.
///
/// Returns the table plus the fakes in slot order (single first).
pub fn fake_sink_table() -> (Arc<SlotSinks>, Vec<Arc<FakeSink>>) {
    let fakes: Vec<Arc<FakeSink>> = (0..5).map(|_| FakeSink::new()).collect();
    let sinks = Arc::new(SlotSinks::new(
        fakes[0].clone(),
        [
            fakes[1].clone(),
            fakes[2].clone(),
            fakes[3].clone(),
            fakes[4].clone(),
        ],
    ));
    (sinks, fakes)
}

// ─────────────────────────────────────────────────────────────────────────────
// Sink
// ─────────────────────────────────────────────────────────────────────────────

/// In-memory sink recording mute/seek/clear calls.
#[derive(Default)]
pub struct FakeSink {
    pub snapshot: Mutex<SinkSnapshot>,
    muted: AtomicBool,
    pub clear_count: AtomicUsize,
    pub seeks: Mutex<Vec<f64>>,
}

impl FakeSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_position(&self, position_secs: f64) {
        self.snapshot.lock().position_secs = position_secs;
    }

    /// Puts the sink into a healthy live-playback shape at `position_secs`.
    pub fn set_live(&self, position_secs: f64) {
        let mut snap = self.snapshot.lock();
        snap.duration_secs = Some(f64::INFINITY);
        snap.position_secs = position_secs;
        snap.paused = false;
        snap.seeking = false;
    }
}

#[async_trait]
impl MediaSink for FakeSink {
    fn set_muted(&self, muted: bool) {
        self.muted.store(muted, Ordering::SeqCst);
    }

    fn muted(&self) -> bool {
        self.muted.load(Ordering::SeqCst)
    }

    fn pause(&self) {
        self.snapshot.lock().paused = true;
    }

    async fn resume(&self) -> Result<(), StreamError> {
        self.snapshot.lock().paused = false;
        Ok(())
    }

    fn seek(&self, position_secs: f64) {
        self.seeks.lock().push(position_secs);
        self.snapshot.lock().position_secs = position_secs;
    }

    fn clear_source(&self) {
        self.clear_count.fetch_add(1, Ordering::SeqCst);
    }

    fn snapshot(&self) -> SinkSnapshot {
        self.snapshot.lock().clone()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Player backend
// ─────────────────────────────────────────────────────────────────────────────

/// Scripted outcome for one `PlayerBackend::create` + `load` cycle.
#[derive(Clone)]
pub enum LoadScript {
    Succeed,
    Fail(StreamError),
}

/// Backend with scripted load outcomes that tracks instance exclusivity.
pub struct FakeBackend {
    scripts: Mutex<Vec<LoadScript>>,
    pub created: AtomicUsize,
    pub destroyed: AtomicUsize,
    pub live: AtomicUsize,
    pub max_live: AtomicUsize,
    pub last_events: Mutex<Option<mpsc::UnboundedSender<PlayerEvent>>>,
    weak: Weak<FakeBackend>,
}

impl FakeBackend {
    /// Backend where every load succeeds.
    pub fn always_ok() -> Arc<Self> {
        Self::scripted(Vec::new())
    }

    /// Backend replaying `scripts` in order, then succeeding.
    pub fn scripted(scripts: Vec<LoadScript>) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            scripts: Mutex::new(scripts),
            created: AtomicUsize::new(0),
            destroyed: AtomicUsize::new(0),
            live: AtomicUsize::new(0),
            max_live: AtomicUsize::new(0),
            last_events: Mutex::new(None),
            weak: weak.clone(),
        })
    }

    pub fn created_count(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn destroyed_count(&self) -> usize {
        self.destroyed.load(Ordering::SeqCst)
    }

    fn next_script(&self) -> LoadScript {
        let mut scripts = self.scripts.lock();
        if scripts.is_empty() {
            LoadScript::Succeed
        } else {
            scripts.remove(0)
        }
    }
}

pub struct FakeHandle {
    backend: Arc<FakeBackend>,
    script: LoadScript,
}

#[async_trait]
impl PlayerHandle for FakeHandle {
    async fn load(&self) -> Result<(), StreamError> {
        match &self.script {
            LoadScript::Succeed => Ok(()),
            LoadScript::Fail(e) => Err(e.clone()),
        }
    }

    async fn destroy(self: Box<Self>) {
        self.backend.destroyed.fetch_add(1, Ordering::SeqCst);
        self.backend.live.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl PlayerBackend for FakeBackend {
    async fn create(
        &self,
        _channel: &Channel,
        _sink: Arc<dyn MediaSink>,
        _tuning: PlayerTuning,
        events: mpsc::UnboundedSender<PlayerEvent>,
    ) -> Result<Box<dyn PlayerHandle>, StreamError> {
        let live = self.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_live.fetch_max(live, Ordering::SeqCst);
        self.created.fetch_add(1, Ordering::SeqCst);
        *self.last_events.lock() = Some(events);

        let backend = self.weak.upgrade().expect("backend alive for test");
        Ok(Box::new(FakeHandle {
            backend,
            script: self.next_script(),
        }))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Party transport
// ─────────────────────────────────────────────────────────────────────────────

/// In-memory rendezvous transport holding one scripted party.
///
/// Records every call so tests can assert which loops are still running.
/// Echoes of sent messages are injected explicitly via [`push_message`],
/// never automatically, so timestamp control stays with the test.
///
/// [`push_message`]: FakePartyTransport::push_message
#[derive(Default)]
pub struct FakePartyTransport {
    pub state: Mutex<PartyStateSnapshot>,
    messages: Mutex<Vec<ChatMessage>>,
    pub updates: Mutex<Vec<PlaybackUpdate>>,
    pub sent: Mutex<Vec<(String, String)>>,
    pub joins: Mutex<Vec<(String, String)>>,
    pub leaves: Mutex<Vec<String>>,
    pub created: AtomicUsize,
    pub state_fetches: AtomicUsize,
    pub message_fetches: AtomicUsize,
    pub fail_sends: AtomicBool,
    pub reject_joins: AtomicBool,
    /// When nonzero, `send_message` sleeps this long before completing.
    pub send_delay_ms: AtomicU64,
}

impl FakePartyTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Sets the shared playback state members will reconcile against.
    pub fn set_shared(&self, channel: &str, playing: bool, current_time: f64) {
        let mut state = self.state.lock();
        state.channel = channel.to_string();
        state.playing = playing;
        state.current_time = current_time;
    }

    pub fn set_roster(&self, host: &str, members: Vec<PartyMember>) {
        let mut state = self.state.lock();
        state.host = host.to_string();
        state.members = members;
    }

    /// Appends a message to the server-side history.
    pub fn push_message(&self, message: ChatMessage) {
        self.messages.lock().push(message);
    }
}

#[async_trait]
impl PartyTransport for FakePartyTransport {
    async fn create(&self, username: &str) -> TransportResult<String> {
        self.created.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock();
        state.host = username.to_string();
        state.members = vec![PartyMember {
            id: "host".to_string(),
            username: username.to_string(),
        }];
        Ok("AB12CD".to_string())
    }

    async fn join(&self, code: &str, username: &str) -> TransportResult<PartyStateSnapshot> {
        if self.reject_joins.load(Ordering::SeqCst) {
            return Err(PartyTransportError::Rejected("Party not found".to_string()));
        }
        self.joins
            .lock()
            .push((code.to_string(), username.to_string()));
        let mut state = self.state.lock();
        let id = format!("member_{}", state.members.len());
        state.members.push(PartyMember {
            id,
            username: username.to_string(),
        });
        let mut snapshot = state.clone();
        snapshot.host = String::new();
        Ok(snapshot)
    }

    async fn fetch_state(&self, _code: &str) -> TransportResult<PartyStateSnapshot> {
        self.state_fetches.fetch_add(1, Ordering::SeqCst);
        Ok(self.state.lock().clone())
    }

    async fn post_update(&self, _code: &str, update: &PlaybackUpdate) -> TransportResult<()> {
        self.updates.lock().push(update.clone());
        let mut state = self.state.lock();
        if let Some(channel) = &update.channel {
            state.channel = channel.clone();
        }
        if let Some(playing) = update.playing {
            state.playing = playing;
        }
        if let Some(current_time) = update.current_time {
            state.current_time = current_time;
        }
        Ok(())
    }

    async fn fetch_messages_since(
        &self,
        _code: &str,
        since: f64,
    ) -> TransportResult<Vec<ChatMessage>> {
        self.message_fetches.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .messages
            .lock()
            .iter()
            .filter(|m| m.timestamp > since)
            .cloned()
            .collect())
    }

    async fn send_message(&self, _code: &str, username: &str, text: &str) -> TransportResult<()> {
        let delay_ms = self.send_delay_ms.load(Ordering::SeqCst);
        if delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        }
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(PartyTransportError::Http("connection refused".to_string()));
        }
        self.sent
            .lock()
            .push((username.to_string(), text.to_string()));
        Ok(())
    }

    async fn leave(&self, code: &str) -> TransportResult<()> {
        self.leaves.lock().push(code.to_string());
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Emitter
// ─────────────────────────────────────────────────────────────────────────────

/// Emitter capturing every event for assertions.
#[derive(Default)]
pub struct RecordingEmitter {
    pub session_events: Mutex<Vec<SessionEvent>>,
    pub party_events: Mutex<Vec<PartyEvent>>,
    pub chat_events: Mutex<Vec<ChatEvent>>,
    pub notices: Mutex<Vec<NoticeEvent>>,
}

impl RecordingEmitter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn notice_texts(&self) -> Vec<String> {
        self.notices
            .lock()
            .iter()
            .map(|n| match n {
                NoticeEvent::Transient { text, .. } => text.clone(),
                NoticeEvent::Persistent { text, .. } => text.clone(),
            })
            .collect()
    }
}

impl EventEmitter for RecordingEmitter {
    fn emit_session(&self, event: SessionEvent) {
        self.session_events.lock().push(event);
    }

    fn emit_party(&self, event: PartyEvent) {
        self.party_events.lock().push(event);
    }

    fn emit_chat(&self, event: ChatEvent) {
        self.chat_events.lock().push(event);
    }

    fn emit_notice(&self, event: NoticeEvent) {
        self.notices.lock().push(event);
    }
}
