//! Party chat with optimistic local rendering.
//!
//! Outgoing messages render immediately through the event system and are
//! transmitted afterwards, so the sender never waits on round-trip latency
//! to see their own message. A background poll fetches messages newer than the
//! last-seen timestamp and drops server echoes of locally rendered
//! messages by content key (the client-generated message id never
//! round-trips).

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::{ZapcastError, ZapcastResult};
use crate::events::{ChatEvent, EventEmitter, NoticeEvent};
use crate::party::transport::PartyTransport;
use crate::party::{ChatMessage, MAX_MESSAGE_CHARS};
use crate::runtime::{TaskSpawner, TokioSpawner};
use crate::util::{now_millis, now_seconds, truncate_chars};

/// Chat for the currently joined party.
///
/// Inactive until [`start`](Self::start) binds it to a party; leaving the
/// party drops the binding, which resets the last-seen timestamp and the
/// de-duplication set for the next party.
pub struct ChatChannel {
    transport: Arc<dyn PartyTransport>,
    emitter: Arc<dyn EventEmitter>,
    spawner: TokioSpawner,
    poll_interval_ms: u64,
    active: Mutex<Option<ActiveChat>>,
}

struct ActiveChat {
    state: Arc<ChatState>,
    token: CancellationToken,
}

impl Drop for ActiveChat {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// State shared between `send` and the poll loop.
struct ChatState {
    code: String,
    username: String,
    last_seen: Mutex<f64>,
    /// Dedup keys of optimistic renders not yet echoed back by the server.
    rendered: Mutex<HashSet<(String, String, i64)>>,
    send_in_flight: AtomicBool,
}

impl ChatChannel {
    pub fn new(
        transport: Arc<dyn PartyTransport>,
        emitter: Arc<dyn EventEmitter>,
        spawner: TokioSpawner,
        poll_interval_ms: u64,
    ) -> Self {
        Self {
            transport,
            emitter,
            spawner,
            poll_interval_ms,
            active: Mutex::new(None),
        }
    }

    /// Binds the chat to a party and starts polling for messages.
    ///
    /// The last-seen timestamp starts at zero, so the first poll pulls the
    /// party's retained history.
    pub fn start(&self, code: &str, username: &str) {
        let state = Arc::new(ChatState {
            code: code.to_string(),
            username: username.to_string(),
            last_seen: Mutex::new(0.0),
            rendered: Mutex::new(HashSet::new()),
            send_in_flight: AtomicBool::new(false),
        });
        let token = CancellationToken::new();

        let mut active = self.active.lock();
        if active.is_some() {
            log::warn!("[Chat] Replacing an active chat binding for party {code}");
        }
        *active = Some(ActiveChat {
            state: Arc::clone(&state),
            token: token.clone(),
        });
        drop(active);

        let poll = PollLoop {
            transport: Arc::clone(&self.transport),
            emitter: Arc::clone(&self.emitter),
            state,
            interval_ms: self.poll_interval_ms,
            token,
        };
        self.spawner.spawn(poll.run());
        log::debug!("[Chat] Started message polling for party {code}");
    }

    /// Unbinds the chat and cancels the poll loop.
    pub fn stop(&self) {
        if let Some(active) = self.active.lock().take() {
            active.token.cancel();
            log::debug!("[Chat] Stopped message polling for party {}", active.state.code);
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.lock().is_some()
    }

    /// Sends a message to the party.
    ///
    /// Renders optimistically before transmitting. Whitespace-only input
    /// and sends overlapping an in-flight transmission are dropped
    /// silently, matching the send-button behavior this backs.
    pub async fn send(&self, text: &str) -> ZapcastResult<()> {
        let state = match &*self.active.lock() {
            Some(active) => Arc::clone(&active.state),
            None => {
                return Err(ZapcastError::PartyProtocol(
                    "not in a party".to_string(),
                ))
            }
        };

        let trimmed = text.trim();
        if trimmed.is_empty() {
            log::debug!("[Chat] Ignoring empty message");
            return Ok(());
        }
        let text = truncate_chars(trimmed, MAX_MESSAGE_CHARS);

        if state.send_in_flight.swap(true, Ordering::SeqCst) {
            log::debug!("[Chat] Send already in flight, dropping message");
            return Ok(());
        }

        let message = ChatMessage {
            id: Some(Uuid::new_v4().to_string()),
            username: state.username.clone(),
            text: text.clone(),
            timestamp: now_seconds(),
        };
        let key = message.dedup_key();
        state.rendered.lock().insert(key.clone());
        self.emitter.emit_chat(ChatEvent::Message {
            message,
            local: true,
            timestamp: now_millis(),
        });

        let result = self
            .transport
            .send_message(&state.code, &state.username, &text)
            .await;
        state.send_in_flight.store(false, Ordering::SeqCst);

        if let Err(e) = result {
            // The optimistic bubble stays; only the echo bookkeeping is
            // rolled back so a retry in the same second still renders.
            state.rendered.lock().remove(&key);
            log::warn!("[Chat] Failed to send message: {e}");
            self.emitter.emit_notice(NoticeEvent::Transient {
                text: "Failed to send chat message".to_string(),
                timestamp: now_millis(),
            });
            return Err(e.into());
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Poll Loop
// ─────────────────────────────────────────────────────────────────────────────

struct PollLoop {
    transport: Arc<dyn PartyTransport>,
    emitter: Arc<dyn EventEmitter>,
    state: Arc<ChatState>,
    interval_ms: u64,
    token: CancellationToken,
}

impl PollLoop {
    async fn run(self) {
        let mut ticker = interval(Duration::from_millis(self.interval_ms));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = self.token.cancelled() => break,
                _ = ticker.tick() => {}
            }
            self.poll_once().await;
        }
        log::debug!("[Chat] Poll loop for party {} exited", self.state.code);
    }

    async fn poll_once(&self) {
        let since = *self.state.last_seen.lock();
        let messages = match self
            .transport
            .fetch_messages_since(&self.state.code, since)
            .await
        {
            Ok(messages) => messages,
            Err(e) => {
                log::debug!("[Chat] Message poll failed: {e}");
                return;
            }
        };

        let mut newest = since;
        for message in messages {
            newest = newest.max(message.timestamp);
            if self.state.rendered.lock().remove(&message.dedup_key()) {
                log::trace!("[Chat] Skipping echo of locally rendered message");
                continue;
            }
            self.emitter.emit_chat(ChatEvent::Message {
                message,
                local: false,
                timestamp: now_millis(),
            });
        }

        // Last-seen only moves forward.
        let mut last_seen = self.state.last_seen.lock();
        if newest > *last_seen {
            *last_seen = newest;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FakePartyTransport, RecordingEmitter};
    use std::sync::atomic::Ordering;
    use tokio::time::{advance, sleep, Duration};

    fn chat_fixture() -> (ChatChannel, Arc<FakePartyTransport>, Arc<RecordingEmitter>) {
        let transport = FakePartyTransport::new();
        let emitter = RecordingEmitter::new();
        let chat = ChatChannel::new(
            transport.clone(),
            emitter.clone(),
            TokioSpawner::current(),
            500,
        );
        (chat, transport, emitter)
    }

    fn chat_texts(emitter: &RecordingEmitter) -> Vec<(String, bool)> {
        emitter
            .chat_events
            .lock()
            .iter()
            .map(|e| {
                let ChatEvent::Message { message, local, .. } = e;
                (message.text.clone(), *local)
            })
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn send_renders_optimistically_then_transmits() {
        let (chat, transport, emitter) = chat_fixture();
        chat.start("AB12CD", "bob");

        chat.send("hello party").await.expect("send succeeds");

        let events = emitter.chat_events.lock();
        assert_eq!(events.len(), 1);
        let ChatEvent::Message { message, local, .. } = &events[0];
        assert!(local);
        assert!(message.id.is_some());
        assert_eq!(message.username, "bob");
        drop(events);

        assert_eq!(
            *transport.sent.lock(),
            vec![("bob".to_string(), "hello party".to_string())]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn poll_skips_echo_of_local_message() {
        let (chat, transport, emitter) = chat_fixture();
        chat.start("AB12CD", "bob");

        chat.send("hello").await.expect("send succeeds");
        let optimistic_ts = {
            let events = emitter.chat_events.lock();
            let ChatEvent::Message { message, .. } = &events[0];
            message.timestamp
        };

        // Server echo lands with the same content key.
        transport.push_message(ChatMessage {
            id: None,
            username: "bob".to_string(),
            text: "hello".to_string(),
            timestamp: optimistic_ts,
        });
        // A genuinely remote message arrives alongside it.
        transport.push_message(ChatMessage {
            id: None,
            username: "alice".to_string(),
            text: "hi bob".to_string(),
            timestamp: optimistic_ts + 0.2,
        });

        sleep(Duration::from_millis(600)).await;

        assert_eq!(
            chat_texts(&emitter),
            vec![
                ("hello".to_string(), true),
                ("hi bob".to_string(), false),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn last_seen_never_regresses() {
        let (chat, transport, emitter) = chat_fixture();
        transport.push_message(ChatMessage {
            id: None,
            username: "alice".to_string(),
            text: "first".to_string(),
            timestamp: 20.0,
        });
        chat.start("AB12CD", "bob");

        sleep(Duration::from_millis(600)).await;
        assert_eq!(chat_texts(&emitter).len(), 1);

        // Older than last-seen: filtered out by the since cursor.
        transport.push_message(ChatMessage {
            id: None,
            username: "alice".to_string(),
            text: "stale".to_string(),
            timestamp: 15.0,
        });
        sleep(Duration::from_millis(500)).await;
        assert_eq!(chat_texts(&emitter).len(), 1);

        transport.push_message(ChatMessage {
            id: None,
            username: "alice".to_string(),
            text: "second".to_string(),
            timestamp: 25.0,
        });
        sleep(Duration::from_millis(500)).await;
        assert_eq!(chat_texts(&emitter).len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn overlapping_send_is_dropped() {
        let (chat, transport, emitter) = chat_fixture();
        chat.start("AB12CD", "bob");
        transport.send_delay_ms.store(5_000, Ordering::SeqCst);

        let chat = Arc::new(chat);
        let first = {
            let chat = Arc::clone(&chat);
            tokio::spawn(async move { chat.send("first").await })
        };
        tokio::task::yield_now().await;

        // Second send while the first is still on the wire.
        chat.send("second").await.expect("dropped send is ok");

        advance(Duration::from_millis(5_100)).await;
        first
            .await
            .expect("task joins")
            .expect("first send succeeds");

        assert_eq!(
            *transport.sent.lock(),
            vec![("bob".to_string(), "first".to_string())]
        );
        // Only the first message was rendered.
        assert_eq!(chat_texts(&emitter), vec![("first".to_string(), true)]);
    }

    #[tokio::test(start_paused = true)]
    async fn whitespace_only_message_is_ignored() {
        let (chat, transport, emitter) = chat_fixture();
        chat.start("AB12CD", "bob");

        chat.send("   \t ").await.expect("no-op send");

        assert!(transport.sent.lock().is_empty());
        assert!(emitter.chat_events.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn failed_send_keeps_render_and_surfaces_notice() {
        let (chat, transport, emitter) = chat_fixture();
        chat.start("AB12CD", "bob");
        transport.fail_sends.store(true, Ordering::SeqCst);

        let err = chat.send("doomed").await.expect_err("send fails");
        assert!(matches!(err, ZapcastError::Network(_)));

        assert_eq!(chat_texts(&emitter), vec![("doomed".to_string(), true)]);
        assert_eq!(
            emitter.notice_texts(),
            vec!["Failed to send chat message".to_string()]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn restart_resets_cursor_and_replays_history() {
        let (chat, transport, emitter) = chat_fixture();
        transport.push_message(ChatMessage {
            id: None,
            username: "alice".to_string(),
            text: "history".to_string(),
            timestamp: 10.0,
        });

        chat.start("AB12CD", "bob");
        sleep(Duration::from_millis(600)).await;
        assert_eq!(chat_texts(&emitter).len(), 1);

        chat.stop();
        assert!(!chat.is_active());

        // A fresh binding starts from zero and pulls history again.
        chat.start("EF34GH", "bob");
        sleep(Duration::from_millis(600)).await;
        assert_eq!(chat_texts(&emitter).len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn send_without_party_is_rejected() {
        let (chat, _transport, _emitter) = chat_fixture();
        let err = chat.send("hello").await.expect_err("no party bound");
        assert!(matches!(err, ZapcastError::PartyProtocol(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn stop_halts_polling() {
        let (chat, transport, _emitter) = chat_fixture();
        chat.start("AB12CD", "bob");
        sleep(Duration::from_millis(1_100)).await;
        let fetches = transport.message_fetches.load(Ordering::SeqCst);
        assert!(fetches >= 2);

        chat.stop();
        sleep(Duration::from_millis(2_000)).await;
        assert_eq!(transport.message_fetches.load(Ordering::SeqCst), fetches);
    }
}
