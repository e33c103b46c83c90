//! Fixed playback slots and the gestures that rearrange them.
//!
//! The slot manager owns the five playback positions (one single view,
//! four multiview tiles) and routes every channel-selection gesture:
//! assigning a channel, clearing a tile, the two-phase tile swap, and the
//! single/multiview mode transition. It is the only place that creates
//! [`StreamSession`]s, and it pairs every session with a watchdog whose
//! lifetime it controls.
//!
//! Slot bindings live in a `DashMap` that is never held across an await;
//! per-slot ordering comes from one async mutex per slot held across the
//! whole assign/clear/swap operation. Cross-slot operations take slot
//! locks in table order.

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;

use crate::audio::AudioArbiter;
use crate::channel::Channel;
use crate::config::OrchestratorConfig;
use crate::error::{ZapcastError, ZapcastResult};
use crate::events::{EventEmitter, NoticeEvent};
use crate::monitor::HealthMonitor;
use crate::player::{PlayerBackend, SlotSinks};
use crate::runtime::TokioSpawner;
use crate::session::{SessionStatus, StreamSession};
use crate::slot::SlotId;
use crate::util::now_millis;

/// Which slot set is currently presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewMode {
    Single,
    Multiview,
}

/// Result of one click in the two-phase swap gesture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase", tag = "action")]
pub enum SwapOutcome {
    /// First click: the slot is marked and waits for a partner.
    Pending { slot: SlotId },
    /// Clicking the marked slot again backs out of the gesture.
    Cancelled,
    /// Second click on a different slot: bindings were exchanged.
    Committed { from: SlotId, to: SlotId },
}

/// Channel and play state of the single view, kept while multiview is up.
struct SavedSingleView {
    channel: Arc<Channel>,
    was_playing: bool,
}

struct SlotEntry {
    channel: Arc<Channel>,
    session: Arc<StreamSession>,
    monitor: HealthMonitor,
}

/// Serializable per-slot state for status reporting.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotView {
    pub slot: SlotId,
    pub channel: Option<Channel>,
    pub status: Option<SessionStatus>,
    pub audio: bool,
    pub recovery_attempts: u32,
}

pub struct SlotManager {
    entries: DashMap<SlotId, SlotEntry>,
    /// One lock per slot, indexed by `SlotId::index`, held across a whole
    /// assign/clear/swap so teardown and restart never interleave.
    op_locks: [tokio::sync::Mutex<()>; SlotId::ALL.len()],
    sinks: Arc<SlotSinks>,
    audio: Arc<AudioArbiter>,
    backend: Arc<dyn PlayerBackend>,
    spawner: TokioSpawner,
    emitter: Arc<dyn EventEmitter>,
    config: Arc<OrchestratorConfig>,
    mode: RwLock<ViewMode>,
    pending_swap: Mutex<Option<SlotId>>,
    saved_single: Mutex<Option<SavedSingleView>>,
}

impl SlotManager {
    pub fn new(
        sinks: Arc<SlotSinks>,
        audio: Arc<AudioArbiter>,
        backend: Arc<dyn PlayerBackend>,
        spawner: TokioSpawner,
        emitter: Arc<dyn EventEmitter>,
        config: Arc<OrchestratorConfig>,
    ) -> Self {
        Self {
            entries: DashMap::new(),
            op_locks: std::array::from_fn(|_| tokio::sync::Mutex::new(())),
            sinks,
            audio,
            backend,
            spawner,
            emitter,
            config,
            mode: RwLock::new(ViewMode::Single),
            pending_swap: Mutex::new(None),
            saved_single: Mutex::new(None),
        }
    }

    fn op_lock(&self, slot: SlotId) -> &tokio::sync::Mutex<()> {
        &self.op_locks[slot.index()]
    }

    fn occupied(&self) -> impl Fn(SlotId) -> bool + '_ {
        move |slot| self.entries.contains_key(&slot)
    }

    pub fn view_mode(&self) -> ViewMode {
        *self.mode.read()
    }

    /// The channel currently bound to `slot`.
    pub fn channel_at(&self, slot: SlotId) -> Option<Arc<Channel>> {
        self.entries.get(&slot).map(|e| Arc::clone(&e.channel))
    }

    /// The live session at `slot`, if any.
    pub fn session_at(&self, slot: SlotId) -> Option<Arc<StreamSession>> {
        self.entries.get(&slot).map(|e| Arc::clone(&e.session))
    }

    /// Per-slot state in table order, for status reporting.
    pub fn snapshot(&self) -> Vec<SlotView> {
        let selection = self.audio.selection();
        SlotId::ALL
            .iter()
            .map(|slot| {
                let entry = self.entries.get(slot);
                SlotView {
                    slot: *slot,
                    channel: entry.as_ref().map(|e| (*e.channel).clone()),
                    status: entry.as_ref().map(|e| e.session.status()),
                    audio: selection == Some(*slot),
                    recovery_attempts: entry.as_ref().map_or(0, |e| e.monitor.attempts()),
                }
            })
            .collect()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Assign / clear
    // ─────────────────────────────────────────────────────────────────────────

    /// Binds `channel` to `slot` and starts playback.
    ///
    /// An occupied slot is replaced: its monitor and session are fully
    /// stopped before the new session is constructed, and the watchdog
    /// attempt count starts over for the new channel. The audio invariant
    /// is re-applied afterward, so a freshly assigned multiview tile comes
    /// up muted unless it already held the selection.
    pub async fn assign(&self, channel: Arc<Channel>, slot: SlotId) -> ZapcastResult<()> {
        let _guard = self.op_lock(slot).lock().await;
        let result = self.start_session_locked(channel, slot).await;

        if slot == SlotId::Single && self.audio.audio_follows_active() {
            self.audio.set_audio_slot(Some(slot), self.occupied());
        } else {
            self.audio.enforce(self.occupied());
        }
        result
    }

    /// Stops and removes whatever `slot` holds. A cleared slot that held
    /// the audio selection leaves the system fully muted.
    pub async fn clear(&self, slot: SlotId) {
        let _guard = self.op_lock(slot).lock().await;
        self.stop_and_take_locked(slot).await;
        self.audio.enforce(self.occupied());
    }

    /// Reloads whatever `slot` currently plays, keeping its binding.
    ///
    /// A failed or stopped session is replaced by a fresh one, so a user
    /// retry after terminal failure starts the watchdog attempt budget
    /// over.
    pub async fn reload(&self, slot: SlotId) -> ZapcastResult<()> {
        let _guard = self.op_lock(slot).lock().await;
        let Some((channel, session)) = self
            .entries
            .get(&slot)
            .map(|e| (Arc::clone(&e.channel), Arc::clone(&e.session)))
        else {
            return Err(ZapcastError::SlotEmpty(slot.to_string()));
        };

        let result = match session.status() {
            SessionStatus::Failed | SessionStatus::Stopped => {
                self.start_session_locked(channel, slot).await
            }
            _ => session.reload().await.map_err(Into::into),
        };
        self.audio.enforce(self.occupied());
        result
    }

    /// Replaces the entry at `slot` with a fresh session for `channel` and
    /// loads it. No audio handling; callers re-apply the invariant.
    async fn start_session_locked(
        &self,
        channel: Arc<Channel>,
        slot: SlotId,
    ) -> ZapcastResult<()> {
        self.stop_and_take_locked(slot).await;

        let profile = self.config.profile_for(&channel.id);
        let session = StreamSession::new(
            slot,
            Arc::clone(&channel),
            profile,
            Arc::clone(self.sinks.get(slot)),
            Arc::clone(&self.backend),
            self.spawner.clone(),
            Arc::clone(&self.emitter),
        );
        let monitor = HealthMonitor::watch(
            Arc::clone(&session),
            self.config.recovery.clone(),
            &self.spawner,
            Arc::clone(&self.emitter),
        );
        self.entries.insert(
            slot,
            SlotEntry {
                channel: Arc::clone(&channel),
                session: Arc::clone(&session),
                monitor,
            },
        );

        if let Err(e) = session.load().await {
            // Binding stays so the user can retry the same channel.
            self.emitter.emit_notice(NoticeEvent::Transient {
                text: format!("Failed to load {}: {}", channel.name, e),
                timestamp: now_millis(),
            });
            return Err(e.into());
        }
        Ok(())
    }

    /// Detaches and fully stops the entry at `slot`, watchdog first.
    /// Returns the channel that was bound there.
    async fn stop_and_take_locked(&self, slot: SlotId) -> Option<Arc<Channel>> {
        let (_, entry) = self.entries.remove(&slot)?;
        entry.monitor.stop();
        entry.session.stop().await;
        Some(entry.channel)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Two-phase swap
    // ─────────────────────────────────────────────────────────────────────────

    /// One click of the swap gesture: marks a slot, cancels on a repeat
    /// click, or commits against a previously marked slot.
    pub async fn swap_click(&self, slot: SlotId) -> ZapcastResult<SwapOutcome> {
        let first = {
            let mut pending = self.pending_swap.lock();
            match pending.take() {
                None => {
                    *pending = Some(slot);
                    log::info!("[Slots] swap pending on {}", slot);
                    return Ok(SwapOutcome::Pending { slot });
                }
                Some(prior) if prior == slot => {
                    log::info!("[Slots] swap cancelled on {}", slot);
                    return Ok(SwapOutcome::Cancelled);
                }
                Some(prior) => prior,
            }
        };

        self.commit_swap(first, slot).await;
        Ok(SwapOutcome::Committed {
            from: first,
            to: slot,
        })
    }

    /// Exchanges the channel bindings of two slots and reloads both sides.
    /// A load failure on either side surfaces as a notice, not an error;
    /// the exchange itself always completes.
    async fn commit_swap(&self, a: SlotId, b: SlotId) {
        let (first, second) = if a.index() <= b.index() { (a, b) } else { (b, a) };
        let _guard_first = self.op_lock(first).lock().await;
        let _guard_second = self.op_lock(second).lock().await;

        let channel_a = self.stop_and_take_locked(a).await;
        let channel_b = self.stop_and_take_locked(b).await;
        log::info!(
            "[Slots] swapping {} ({:?}) and {} ({:?})",
            a,
            channel_a.as_ref().map(|c| c.name.as_str()),
            b,
            channel_b.as_ref().map(|c| c.name.as_str())
        );

        if let Some(channel) = channel_b {
            if self.start_session_locked(channel, a).await.is_err() {
                log::warn!("[Slots] swap reload failed on {}", a);
            }
        }
        if let Some(channel) = channel_a {
            if self.start_session_locked(channel, b).await.is_err() {
                log::warn!("[Slots] swap reload failed on {}", b);
            }
        }

        // The selection follows its channel to the other index.
        self.audio.remap_swap(a, b, self.occupied());
    }

    // ─────────────────────────────────────────────────────────────────────────
    // View mode
    // ─────────────────────────────────────────────────────────────────────────

    /// Switches to the multiview grid, stopping the single view after
    /// saving its channel and play state for a later restore.
    pub async fn enter_multiview(&self) {
        {
            let mut mode = self.mode.write();
            if *mode == ViewMode::Multiview {
                return;
            }
            *mode = ViewMode::Multiview;
        }
        self.pending_swap.lock().take();

        let _guard = self.op_lock(SlotId::Single).lock().await;
        let saved = self.entries.get(&SlotId::Single).map(|entry| {
            let status = entry.session.status();
            SavedSingleView {
                channel: Arc::clone(&entry.channel),
                was_playing: !matches!(status, SessionStatus::Stopped | SessionStatus::Failed)
                    && !entry.session.is_paused(),
            }
        });
        *self.saved_single.lock() = saved;

        self.stop_and_take_locked(SlotId::Single).await;
        self.audio.enforce(self.occupied());
        log::info!("[Slots] entered multiview");
    }

    /// Leaves the multiview grid, stopping every tile and restoring the
    /// saved single-view channel if it was playing when multiview began.
    pub async fn exit_multiview(&self) -> ZapcastResult<()> {
        {
            let mut mode = self.mode.write();
            if *mode == ViewMode::Single {
                return Ok(());
            }
            *mode = ViewMode::Single;
        }
        self.pending_swap.lock().take();

        for slot in SlotId::ALL.iter().filter(|s| s.is_multiview()) {
            let _guard = self.op_lock(*slot).lock().await;
            self.stop_and_take_locked(*slot).await;
        }
        log::info!("[Slots] exited multiview");

        match self.saved_single.lock().take() {
            Some(saved) if saved.was_playing => self.assign(saved.channel, SlotId::Single).await,
            _ => {
                self.audio.enforce(self.occupied());
                Ok(())
            }
        }
    }

    /// Stops everything; used on shutdown.
    pub async fn stop_all(&self) {
        for slot in SlotId::ALL {
            let _guard = self.op_lock(slot).lock().await;
            self.stop_and_take_locked(slot).await;
        }
        self.audio.enforce(self.occupied());
    }
}
