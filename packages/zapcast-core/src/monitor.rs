//! Per-session liveness watchdog.
//!
//! Each active [`StreamSession`] gets one [`HealthMonitor`]. A recurring
//! timer samples the sink and decides whether playback has silently died:
//! the sink reports a decodable duration, is neither paused nor seeking,
//! yet its position has not moved since the previous sample; or the sink
//! reports a decode error outright.
//!
//! On a stall the monitor runs a bounded recovery chain: wait out an
//! escalating delay, reload the session, and on a failed reload move
//! straight to the next (longer) delay without waiting for another
//! watchdog sample. Once the attempt budget is spent the session is
//! stopped, marked [`SessionStatus::Failed`], and left for explicit user
//! action. The monitor never outlives its session: the owning slot stops
//! it before stopping the session, and dropping the handle cancels the
//! watchdog task.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::config::RecoveryConfig;
use crate::events::{EventEmitter, NoticeEvent, SessionEvent};
use crate::runtime::{TaskSpawner, TokioSpawner};
use crate::session::{SessionStatus, StreamSession};
use crate::util::now_millis;

/// Handle to a running watchdog task.
pub struct HealthMonitor {
    token: CancellationToken,
    attempts: Arc<AtomicU32>,
}

impl HealthMonitor {
    /// Spawns a watchdog over `session` and returns its handle.
    pub fn watch(
        session: Arc<StreamSession>,
        config: RecoveryConfig,
        spawner: &TokioSpawner,
        emitter: Arc<dyn EventEmitter>,
    ) -> Self {
        let token = CancellationToken::new();
        let attempts = Arc::new(AtomicU32::new(0));
        let watch_loop = WatchLoop {
            session,
            config,
            emitter,
            token: token.clone(),
            attempts: Arc::clone(&attempts),
        };
        spawner.spawn(watch_loop.run());
        Self { token, attempts }
    }

    /// Recovery attempts spent so far. Resets only when the slot binds a
    /// new channel, which replaces the monitor wholesale.
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Cancels the watchdog, including any recovery delay it is parked on.
    pub fn stop(&self) {
        self.token.cancel();
    }
}

impl Drop for HealthMonitor {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

struct WatchLoop {
    session: Arc<StreamSession>,
    config: RecoveryConfig,
    emitter: Arc<dyn EventEmitter>,
    token: CancellationToken,
    attempts: Arc<AtomicU32>,
}

impl WatchLoop {
    async fn run(self) {
        let mut ticker = interval(Duration::from_millis(self.config.watchdog_interval_ms));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick of an interval completes immediately; consume it
        // so the first sample lands a full period after start.
        ticker.tick().await;

        let mut last_position: Option<f64> = None;
        loop {
            tokio::select! {
                _ = self.token.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let Some(reason) = self.sample_stall(&mut last_position) else {
                continue;
            };

            // One recovery at a time per session; the buffer-race reload
            // path claims the same flag.
            if !self.session.try_begin_recovery() {
                log::debug!(
                    "[Watchdog] {} stall sample dropped, recovery already in flight",
                    self.session.slot()
                );
                continue;
            }

            self.session.set_status(SessionStatus::Stalled);
            self.emitter.emit_session(SessionEvent::Stalled {
                slot: self.session.slot(),
                channel_id: self.session.channel().id.clone(),
                timestamp: now_millis(),
            });
            log::warn!(
                "[Watchdog] {} stalled on {}: {}",
                self.session.slot(),
                self.session.channel().name,
                reason
            );

            let recovered = self.recovery_chain().await;
            self.session.end_recovery();
            if !recovered {
                break;
            }
            last_position = None;
        }
    }

    /// Runs escalating reload attempts until one sticks or the budget is
    /// spent. Returns false when the session was failed or the monitor was
    /// cancelled mid-delay.
    async fn recovery_chain(&self) -> bool {
        loop {
            let spent = self.attempts.load(Ordering::SeqCst);
            if spent >= self.config.max_attempts {
                self.fail_session().await;
                return false;
            }

            let delay_ms = self.config.delay_for_attempt(spent);
            let attempt = spent + 1;
            self.attempts.store(attempt, Ordering::SeqCst);

            self.session.set_status(SessionStatus::Recovering);
            self.emitter.emit_session(SessionEvent::Recovering {
                slot: self.session.slot(),
                channel_id: self.session.channel().id.clone(),
                attempt,
                max_attempts: self.config.max_attempts,
                delay_ms,
                timestamp: now_millis(),
            });
            self.emitter.emit_notice(NoticeEvent::Transient {
                text: format!(
                    "Reconnecting to {} ({}/{})",
                    self.session.channel().name,
                    attempt,
                    self.config.max_attempts
                ),
                timestamp: now_millis(),
            });
            log::info!(
                "[Watchdog] {} reconnect {}/{} in {}ms",
                self.session.slot(),
                attempt,
                self.config.max_attempts,
                delay_ms
            );

            tokio::select! {
                _ = self.token.cancelled() => return false,
                _ = tokio::time::sleep(Duration::from_millis(delay_ms)) => {}
            }

            match self.session.reload().await {
                Ok(()) => {
                    log::info!(
                        "[Watchdog] {} recovered {} on attempt {}",
                        self.session.slot(),
                        self.session.channel().name,
                        attempt
                    );
                    return true;
                }
                Err(e) => {
                    log::warn!(
                        "[Watchdog] {} reconnect {}/{} failed: {}",
                        self.session.slot(),
                        attempt,
                        self.config.max_attempts,
                        e
                    );
                }
            }
        }
    }

    /// Attempt budget spent: stop the session for good and surface a
    /// terminal notice.
    async fn fail_session(&self) {
        self.session.stop().await;
        self.session.set_status(SessionStatus::Failed);
        self.emitter.emit_session(SessionEvent::Failed {
            slot: self.session.slot(),
            channel_id: self.session.channel().id.clone(),
            channel_name: self.session.channel().name.clone(),
            timestamp: now_millis(),
        });
        self.emitter.emit_notice(NoticeEvent::Persistent {
            text: format!(
                "{} is unavailable after {} reconnect attempts",
                self.session.channel().name,
                self.config.max_attempts
            ),
            timestamp: now_millis(),
        });
        log::error!(
            "[Watchdog] {} gave up on {} after {} attempts",
            self.session.slot(),
            self.session.channel().name,
            self.config.max_attempts
        );
    }

    /// Samples the sink and returns a stall description, or None while
    /// playback looks healthy.
    ///
    /// A stall needs two consecutive samples at the same position, so the
    /// first sample after (re)start only seeds the baseline. Paused and
    /// seeking sinks are skipped but still move the baseline, otherwise the
    /// sample right after a resume would compare against a stale position.
    fn sample_stall(&self, last_position: &mut Option<f64>) -> Option<String> {
        let snapshot = self.session.sink_snapshot();

        if let Some(error) = &snapshot.decode_error {
            return Some(format!("decode error: {error}"));
        }
        if !snapshot.has_decodable_duration() || snapshot.paused || snapshot.seeking {
            *last_position = Some(snapshot.position_secs);
            return None;
        }

        let frozen = matches!(*last_position, Some(p) if p == snapshot.position_secs);
        *last_position = Some(snapshot.position_secs);
        frozen.then(|| format!("position frozen at {:.3}s", snapshot.position_secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::player::{StreamError, StreamProfile};
    use crate::slot::SlotId;
    use crate::test_support::{test_channel, FakeBackend, FakeSink, LoadScript, RecordingEmitter};

    struct Harness {
        backend: Arc<FakeBackend>,
        sink: Arc<FakeSink>,
        session: Arc<StreamSession>,
        emitter: Arc<RecordingEmitter>,
    }

    async fn playing_session(backend: Arc<FakeBackend>) -> Harness {
        let sink = FakeSink::new();
        let emitter = Arc::new(RecordingEmitter::default());
        let session = StreamSession::new(
            SlotId::Single,
            test_channel("news"),
            StreamProfile::Default,
            sink.clone(),
            backend.clone(),
            TokioSpawner::current(),
            emitter.clone(),
        );
        session.load().await.expect("initial load succeeds");
        sink.set_live(42.0);
        Harness {
            backend,
            sink,
            session,
            emitter,
        }
    }

    fn created(h: &Harness) -> usize {
        h.backend.created.load(Ordering::SeqCst)
    }

    #[tokio::test(start_paused = true)]
    async fn frozen_position_triggers_reload_after_first_delay() {
        let h = playing_session(FakeBackend::always_ok()).await;
        let monitor = HealthMonitor::watch(
            h.session.clone(),
            RecoveryConfig::default(),
            &TokioSpawner::current(),
            h.emitter.clone(),
        );

        // Samples at 3s (baseline) and 6s (stall), reload lands at 11s.
        tokio::time::sleep(Duration::from_millis(12_000)).await;

        assert_eq!(created(&h), 2);
        assert_eq!(monitor.attempts(), 1);
        assert_eq!(h.session.status(), SessionStatus::Playing);
        let notices = h.emitter.notices.lock();
        assert!(matches!(
            &notices[0],
            NoticeEvent::Transient { text, .. } if text.contains("(1/5)")
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn advancing_position_is_left_alone() {
        let h = playing_session(FakeBackend::always_ok()).await;
        let _monitor = HealthMonitor::watch(
            h.session.clone(),
            RecoveryConfig::default(),
            &TokioSpawner::current(),
            h.emitter.clone(),
        );

        for step in 1..=10u64 {
            tokio::time::sleep(Duration::from_millis(3_000)).await;
            h.sink.set_position(42.0 + step as f64);
        }

        assert_eq!(created(&h), 1);
        assert!(h.emitter.notices.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn paused_sink_is_not_a_stall() {
        let h = playing_session(FakeBackend::always_ok()).await;
        h.sink.snapshot.lock().paused = true;
        let monitor = HealthMonitor::watch(
            h.session.clone(),
            RecoveryConfig::default(),
            &TokioSpawner::current(),
            h.emitter.clone(),
        );

        tokio::time::sleep(Duration::from_millis(60_000)).await;

        assert_eq!(created(&h), 1);
        assert_eq!(monitor.attempts(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn decode_error_triggers_recovery() {
        let h = playing_session(FakeBackend::always_ok()).await;
        h.sink.snapshot.lock().decode_error = Some("PIPELINE_ERROR_DECODE".to_string());
        let monitor = HealthMonitor::watch(
            h.session.clone(),
            RecoveryConfig::default(),
            &TokioSpawner::current(),
            h.emitter.clone(),
        );

        // First sample at 3s already carries the decode error; no baseline
        // needed. Reload lands at 8s.
        tokio::time::sleep(Duration::from_millis(9_000)).await;

        assert!(created(&h) >= 2);
        assert!(monitor.attempts() >= 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failing_reloads_escalate_then_fail_for_good() {
        let down = || LoadScript::Fail(StreamError::Network("origin down".to_string()));
        let scripts = vec![
            LoadScript::Succeed, // initial load
            down(),
            down(),
            down(),
            down(),
            down(),
        ];
        let h = playing_session(FakeBackend::scripted(scripts)).await;
        let monitor = HealthMonitor::watch(
            h.session.clone(),
            RecoveryConfig::default(),
            &TokioSpawner::current(),
            h.emitter.clone(),
        );

        // Stall at 6s, then delays 5+10+20+40+60s chained back to back.
        tokio::time::sleep(Duration::from_millis(200_000)).await;

        assert_eq!(h.session.status(), SessionStatus::Failed);
        assert_eq!(monitor.attempts(), 5);
        assert_eq!(created(&h), 6);

        {
            let notices = h.emitter.notices.lock();
            assert!(matches!(
                notices.last(),
                Some(NoticeEvent::Persistent { text, .. }) if text.contains("unavailable")
            ));
        }

        // The watchdog is done; nothing fires a sixth attempt.
        tokio::time::sleep(Duration::from_millis(400_000)).await;
        assert_eq!(created(&h), 6);
        assert_eq!(monitor.attempts(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_cancels_a_pending_recovery_delay() {
        let h = playing_session(FakeBackend::always_ok()).await;
        let monitor = HealthMonitor::watch(
            h.session.clone(),
            RecoveryConfig::default(),
            &TokioSpawner::current(),
            h.emitter.clone(),
        );

        // Let the stall be detected (6s) and park in the 5s delay.
        tokio::time::sleep(Duration::from_millis(8_000)).await;
        monitor.stop();
        tokio::time::sleep(Duration::from_millis(60_000)).await;

        assert_eq!(created(&h), 1);
        // The cancelled chain must release the recovery flag.
        assert!(h.session.try_begin_recovery());
        h.session.end_recovery();
    }

    #[tokio::test(start_paused = true)]
    async fn in_flight_recovery_blocks_watchdog_samples() {
        let h = playing_session(FakeBackend::always_ok()).await;
        assert!(h.session.try_begin_recovery());
        let monitor = HealthMonitor::watch(
            h.session.clone(),
            RecoveryConfig::default(),
            &TokioSpawner::current(),
            h.emitter.clone(),
        );

        tokio::time::sleep(Duration::from_millis(30_000)).await;
        assert_eq!(created(&h), 1);
        assert_eq!(monitor.attempts(), 0);

        h.session.end_recovery();
        tokio::time::sleep(Duration::from_millis(30_000)).await;
        assert!(created(&h) >= 2);
    }
}
