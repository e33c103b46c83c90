//! Playback session lifecycle.
//!
//! A [`StreamSession`] drives one playback attempt end-to-end against one
//! video sink: construct a player, load the channel URL, start rendering,
//! and tear everything down again. Sessions are exclusively owned by the
//! slot that created them and are replaced (never reused) when the slot's
//! channel changes.
//!
//! Lifecycle operations (`load`, `stop`, `reload`) are serialized by an
//! async mutex held across the whole operation, so teardown of a prior
//! player instance is always fully awaited before a new one is constructed.
//! Two live instances bound to the same sink cannot exist.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::channel::Channel;
use crate::events::{EventEmitter, SessionEvent};
use crate::player::{
    MediaSink, PlayerBackend, PlayerEvent, PlayerEventKind, PlayerHandle, SinkSnapshot,
    StreamError, StreamProfile,
};
use crate::runtime::{TaskSpawner, TokioSpawner};
use crate::slot::SlotId;
use crate::util::now_millis;

/// Observable state of one playback attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Loading,
    Playing,
    Stalled,
    Recovering,
    Failed,
    Stopped,
}

/// One playback attempt bound to a slot, a channel, and a sink.
pub struct StreamSession {
    slot: SlotId,
    channel: Arc<Channel>,
    profile: StreamProfile,
    sink: Arc<dyn MediaSink>,
    backend: Arc<dyn PlayerBackend>,
    spawner: TokioSpawner,
    emitter: Arc<dyn EventEmitter>,
    status: RwLock<SessionStatus>,
    /// Live player instance. Accessed only while `op_lock` is held; taken
    /// out of the mutex before any await so the guard never crosses one.
    player: Mutex<Option<Box<dyn PlayerHandle>>>,
    /// Serializes load/stop/reload end to end.
    op_lock: tokio::sync::Mutex<()>,
    /// Cancels the player-event listener of the current load attempt.
    listener_token: Mutex<Option<CancellationToken>>,
    /// One silent buffer-race reload is allowed per load attempt.
    buffer_retry_used: AtomicBool,
    /// Arbitrates the buffer-race auto-reload against watchdog recovery:
    /// whichever path claims the flag first runs, the other skips.
    recovering: AtomicBool,
    /// Set by `stop()`. A retired session never constructs another player,
    /// so a late recovery reload cannot race the slot's replacement
    /// session onto the same sink.
    retired: AtomicBool,
    weak: Weak<StreamSession>,
}

impl StreamSession {
    /// Creates a session bound to `slot` and `channel`. The session starts
    /// stopped; call [`load`](Self::load) to begin playback.
    pub fn new(
        slot: SlotId,
        channel: Arc<Channel>,
        profile: StreamProfile,
        sink: Arc<dyn MediaSink>,
        backend: Arc<dyn PlayerBackend>,
        spawner: TokioSpawner,
        emitter: Arc<dyn EventEmitter>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            slot,
            channel,
            profile,
            sink,
            backend,
            spawner,
            emitter,
            status: RwLock::new(SessionStatus::Stopped),
            player: Mutex::new(None),
            op_lock: tokio::sync::Mutex::new(()),
            listener_token: Mutex::new(None),
            buffer_retry_used: AtomicBool::new(false),
            recovering: AtomicBool::new(false),
            retired: AtomicBool::new(false),
            weak: weak.clone(),
        })
    }

    pub fn slot(&self) -> SlotId {
        self.slot
    }

    pub fn channel(&self) -> &Arc<Channel> {
        &self.channel
    }

    pub fn profile(&self) -> StreamProfile {
        self.profile
    }

    pub fn status(&self) -> SessionStatus {
        *self.status.read()
    }

    pub(crate) fn set_status(&self, status: SessionStatus) {
        *self.status.write() = status;
    }

    /// The sink this session renders into.
    pub fn sink(&self) -> &Arc<dyn MediaSink> {
        &self.sink
    }

    /// Non-blocking snapshot of the sink's playback state.
    pub fn sink_snapshot(&self) -> SinkSnapshot {
        self.sink.snapshot()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Recovery arbitration
    // ─────────────────────────────────────────────────────────────────────────

    /// Claims the per-session recovery flag. Returns false if another
    /// recovery path (watchdog or buffer-race reload) is already running.
    pub fn try_begin_recovery(&self) -> bool {
        !self.recovering.swap(true, Ordering::SeqCst)
    }

    /// Releases the recovery flag once a recovery reload has settled.
    pub fn end_recovery(&self) {
        self.recovering.store(false, Ordering::SeqCst);
    }

    /// True while a recovery reload is in flight.
    pub fn recovery_in_progress(&self) -> bool {
        self.recovering.load(Ordering::SeqCst)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Lifecycle
    // ─────────────────────────────────────────────────────────────────────────

    /// Loads the channel and starts playback.
    ///
    /// Any prior player instance is fully stopped and released (sink muted,
    /// source cleared, instance destroyed) before the new one is
    /// constructed. Resolves once playback has started.
    pub async fn load(&self) -> Result<(), StreamError> {
        let _guard = self.op_lock.lock().await;
        self.buffer_retry_used.store(false, Ordering::SeqCst);
        self.load_locked().await
    }

    /// Stops playback and releases the player, retiring the session for
    /// good. Safe to call repeatedly; calling it on a stopped session is a
    /// no-op.
    pub async fn stop(&self) {
        let _guard = self.op_lock.lock().await;
        self.retired.store(true, Ordering::SeqCst);
        self.stop_locked().await;
    }

    /// Equivalent to `stop()` followed by `load()` with the same channel and
    /// profile. Used both for user-initiated reloads and for recovery.
    pub async fn reload(&self) -> Result<(), StreamError> {
        let _guard = self.op_lock.lock().await;
        self.buffer_retry_used.store(false, Ordering::SeqCst);
        self.load_locked().await
    }

    /// Reload that keeps the buffer-race retry spent, so an automatic
    /// reload cannot re-arm itself into a retry loop.
    async fn reload_silent(&self) -> Result<(), StreamError> {
        let _guard = self.op_lock.lock().await;
        self.load_locked().await
    }

    async fn load_locked(&self) -> Result<(), StreamError> {
        if self.retired.load(Ordering::SeqCst) {
            log::debug!("[Session] {} load skipped, session retired", self.slot);
            return Ok(());
        }

        // Audio routing is owned by the arbiter; remember the sink's mute
        // state so a recovery reload does not silence a selected slot.
        let was_muted = self.sink.muted();
        self.teardown_locked().await;

        self.set_status(SessionStatus::Loading);
        self.emitter.emit_session(SessionEvent::Loading {
            slot: self.slot,
            channel_id: self.channel.id.clone(),
            timestamp: now_millis(),
        });

        let result = match self.start_player().await {
            Err(StreamError::BufferRace(detail))
                if !self.buffer_retry_used.swap(true, Ordering::SeqCst) =>
            {
                log::warn!(
                    "[Session] {} buffer torn down during load, retrying once: {}",
                    self.slot,
                    detail
                );
                self.teardown_locked().await;
                self.start_player().await
            }
            other => other,
        };

        match result {
            Ok(()) => {
                self.sink.set_muted(was_muted);
                self.set_status(SessionStatus::Playing);
                self.emitter.emit_session(SessionEvent::Started {
                    slot: self.slot,
                    channel_id: self.channel.id.clone(),
                    timestamp: now_millis(),
                });
                log::info!(
                    "[Session] {} playing {} ({})",
                    self.slot,
                    self.channel.name,
                    self.profile.as_str()
                );
                Ok(())
            }
            Err(e) => {
                self.teardown_locked().await;
                // A failed start may leave a half-attached source behind.
                self.sink.clear_source();
                self.set_status(SessionStatus::Stopped);
                log::warn!("[Session] {} load failed: {}", self.slot, e);
                Err(e)
            }
        }
    }

    /// Constructs a player, loads the URL, and starts rendering.
    async fn start_player(&self) -> Result<(), StreamError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = self
            .backend
            .create(&self.channel, Arc::clone(&self.sink), self.profile.tuning(), tx)
            .await?;

        if let Err(e) = handle.load().await {
            handle.destroy().await;
            return Err(e);
        }
        if let Err(e) = self.sink.resume().await {
            handle.destroy().await;
            return Err(e);
        }

        *self.player.lock() = Some(handle);
        self.spawn_event_listener(rx);
        Ok(())
    }

    async fn stop_locked(&self) {
        let had_player = self.player.lock().is_some();
        self.teardown_locked().await;

        let prior = {
            let mut status = self.status.write();
            std::mem::replace(&mut *status, SessionStatus::Stopped)
        };
        // Only the transition into Stopped is observable; repeated stops
        // stay silent.
        if had_player || prior != SessionStatus::Stopped {
            self.emitter.emit_session(SessionEvent::Stopped {
                slot: self.slot,
                timestamp: now_millis(),
            });
            log::info!("[Session] {} stopped", self.slot);
        }
    }

    /// Cancels the event listener, detaches the sink, and destroys the
    /// player instance. Always awaited to completion before a new player
    /// may be constructed.
    async fn teardown_locked(&self) {
        if let Some(token) = self.listener_token.lock().take() {
            token.cancel();
        }

        let handle = self.player.lock().take();
        if let Some(handle) = handle {
            self.sink.set_muted(true);
            self.sink.clear_source();
            handle.destroy().await;
        }
    }

    fn spawn_event_listener(&self, mut rx: mpsc::UnboundedReceiver<PlayerEvent>) {
        let token = CancellationToken::new();
        if let Some(old) = self.listener_token.lock().replace(token.clone()) {
            old.cancel();
        }

        let weak = self.weak.clone();
        self.spawner.spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    event = rx.recv() => {
                        let Some(event) = event else { break };
                        let Some(session) = weak.upgrade() else { break };
                        session.handle_player_event(event).await;
                    }
                }
            }
        });
    }

    /// Dispatches one playback-library callback.
    ///
    /// The buffer-teardown race gets one silent reload per load attempt;
    /// everything else is logged without touching session status, leaving
    /// stall handling to the watchdog.
    async fn handle_player_event(&self, event: PlayerEvent) {
        if event.is_buffer_race() {
            if self.buffer_retry_used.swap(true, Ordering::SeqCst) {
                log::warn!(
                    "[Session] {} buffer race after automatic retry was spent: {}",
                    self.slot,
                    event.detail
                );
                return;
            }
            if !self.try_begin_recovery() {
                log::debug!(
                    "[Session] {} buffer race ignored, recovery already in flight",
                    self.slot
                );
                return;
            }

            log::warn!(
                "[Session] {} buffer torn down mid-use, reloading silently",
                self.slot
            );
            let result = self.reload_silent().await;
            self.end_recovery();
            if let Err(e) = result {
                log::warn!("[Session] {} silent reload failed: {}", self.slot, e);
            }
            return;
        }

        match event.kind {
            PlayerEventKind::Info => {
                log::debug!("[Session] {} player: {}", self.slot, event.detail);
            }
            _ => {
                // Transient mid-playback errors do not change status; the
                // watchdog recovers the session if playback actually stalls.
                log::warn!(
                    "[Session] {} transient player error: {}",
                    self.slot,
                    event.detail
                );
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Playback control (party reconciliation)
    // ─────────────────────────────────────────────────────────────────────────

    /// Current playback position in seconds.
    pub fn position_secs(&self) -> f64 {
        self.sink.snapshot().position_secs
    }

    /// True while the sink is paused.
    pub fn is_paused(&self) -> bool {
        self.sink.snapshot().paused
    }

    /// Jumps to the given position.
    pub fn seek(&self, position_secs: f64) {
        self.sink.seek(position_secs);
    }

    /// Pauses rendering without releasing the player.
    pub fn pause(&self) {
        self.sink.pause();
    }

    /// Resumes rendering.
    pub async fn resume(&self) -> Result<(), StreamError> {
        self.sink.resume().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::NoopEventEmitter;
    use crate::test_support::{test_channel, FakeBackend, FakeSink, LoadScript};

    fn make_session(backend: Arc<FakeBackend>, sink: Arc<FakeSink>) -> Arc<StreamSession> {
        StreamSession::new(
            SlotId::Single,
            test_channel("ch-1"),
            StreamProfile::Default,
            sink,
            backend,
            TokioSpawner::current(),
            Arc::new(NoopEventEmitter),
        )
    }

    #[tokio::test]
    async fn load_success_reaches_playing() {
        let backend = FakeBackend::always_ok();
        let sink = FakeSink::new();
        let session = make_session(backend.clone(), sink.clone());

        session.load().await.expect("load succeeds");

        assert_eq!(session.status(), SessionStatus::Playing);
        assert_eq!(backend.created.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert!(!sink.snapshot().paused);
    }

    #[tokio::test]
    async fn stop_twice_matches_stop_once() {
        let backend = FakeBackend::always_ok();
        let sink = FakeSink::new();
        let session = make_session(backend.clone(), sink.clone());

        session.load().await.expect("load succeeds");
        session.stop().await;
        let destroyed_after_first = backend.destroyed.load(std::sync::atomic::Ordering::SeqCst);
        let status_after_first = session.status();

        session.stop().await;

        assert_eq!(session.status(), status_after_first);
        assert_eq!(
            backend.destroyed.load(std::sync::atomic::Ordering::SeqCst),
            destroyed_after_first
        );
        assert_eq!(session.status(), SessionStatus::Stopped);
    }

    #[tokio::test]
    async fn reload_releases_prior_instance_first() {
        let backend = FakeBackend::always_ok();
        let sink = FakeSink::new();
        let session = make_session(backend.clone(), sink.clone());

        session.load().await.expect("load succeeds");
        session.reload().await.expect("reload succeeds");
        session.reload().await.expect("reload succeeds");

        assert_eq!(backend.created.load(std::sync::atomic::Ordering::SeqCst), 3);
        assert_eq!(
            backend.destroyed.load(std::sync::atomic::Ordering::SeqCst),
            2
        );
        assert_eq!(backend.max_live.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn buffer_race_during_load_retries_once() {
        let backend = FakeBackend::scripted(vec![
            LoadScript::Fail(StreamError::BufferRace(
                "SourceBuffer has been removed".to_string(),
            )),
            LoadScript::Succeed,
        ]);
        let sink = FakeSink::new();
        let session = make_session(backend.clone(), sink.clone());

        session.load().await.expect("silent retry recovers");

        assert_eq!(session.status(), SessionStatus::Playing);
        assert_eq!(backend.created.load(std::sync::atomic::Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn second_buffer_race_in_same_attempt_is_fatal() {
        let backend = FakeBackend::scripted(vec![
            LoadScript::Fail(StreamError::BufferRace("SourceBuffer removed".to_string())),
            LoadScript::Fail(StreamError::BufferRace("SourceBuffer removed".to_string())),
        ]);
        let sink = FakeSink::new();
        let session = make_session(backend.clone(), sink.clone());

        let err = session.load().await.expect_err("second race is fatal");
        assert!(matches!(err, StreamError::BufferRace(_)));
        assert_eq!(session.status(), SessionStatus::Stopped);
    }

    #[tokio::test]
    async fn network_failure_propagates_without_retry() {
        let backend = FakeBackend::scripted(vec![LoadScript::Fail(StreamError::Network(
            "connection refused".to_string(),
        ))]);
        let sink = FakeSink::new();
        let session = make_session(backend.clone(), sink.clone());

        let err = session.load().await.expect_err("network error surfaces");
        assert!(matches!(err, StreamError::Network(_)));
        assert_eq!(backend.created.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn reload_preserves_unmuted_sink() {
        let backend = FakeBackend::always_ok();
        let sink = FakeSink::new();
        let session = make_session(backend.clone(), sink.clone());

        session.load().await.expect("load succeeds");
        sink.set_muted(false);

        session.reload().await.expect("reload succeeds");
        assert!(!sink.muted(), "audio-selected slot stays unmuted");

        sink.set_muted(true);
        session.reload().await.expect("reload succeeds");
        assert!(sink.muted(), "muted slot stays muted");
    }

    #[tokio::test]
    async fn recovery_flag_is_exclusive() {
        let backend = FakeBackend::always_ok();
        let sink = FakeSink::new();
        let session = make_session(backend, sink);

        assert!(session.try_begin_recovery());
        assert!(!session.try_begin_recovery());
        assert!(session.recovery_in_progress());

        session.end_recovery();
        assert!(session.try_begin_recovery());
        session.end_recovery();
    }
}
