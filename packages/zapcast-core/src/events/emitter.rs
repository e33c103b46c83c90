//! Event emitter abstraction for decoupling services from transport.
//!
//! Services depend on the [`EventEmitter`] trait rather than concrete broadcast
//! channels, enabling testing and alternative transport implementations.

use super::{ChatEvent, NoticeEvent, PartyEvent, SessionEvent};

/// Trait for emitting domain events without knowledge of transport.
///
/// Services use this trait to emit events, decoupling them from the
/// specifics of how events are delivered to clients (WebSocket, SSE, a
/// desktop frontend, etc.). Emission never blocks and never fails the
/// emitting operation.
///
/// # Example
///
/// ```ignore
/// struct MyService {
///     emitter: Arc<dyn EventEmitter>,
/// }
///
/// impl MyService {
///     fn do_something(&self) {
///         self.emitter.emit_session(SessionEvent::Started { ... });
///     }
/// }
/// ```
pub trait EventEmitter: Send + Sync {
    /// Emits a playback session lifecycle event.
    fn emit_session(&self, event: SessionEvent);

    /// Emits a watch-party state event.
    fn emit_party(&self, event: PartyEvent);

    /// Emits a chat message event.
    fn emit_chat(&self, event: ChatEvent);

    /// Emits a user-facing notification.
    fn emit_notice(&self, event: NoticeEvent);
}

/// No-op emitter for headless operation or testing.
///
/// Events are silently discarded. Useful when driving the orchestrator
/// without any frontend attached.
pub struct NoopEventEmitter;

impl EventEmitter for NoopEventEmitter {
    fn emit_session(&self, _event: SessionEvent) {
        // No-op: no frontend attached
    }

    fn emit_party(&self, _event: PartyEvent) {
        // No-op
    }

    fn emit_chat(&self, _event: ChatEvent) {
        // No-op
    }

    fn emit_notice(&self, _event: NoticeEvent) {
        // No-op
    }
}

/// Logging emitter for debugging and development.
///
/// Logs all events at debug level. Useful for debugging event flow
/// or in development environments.
pub struct LoggingEventEmitter;

impl EventEmitter for LoggingEventEmitter {
    fn emit_session(&self, event: SessionEvent) {
        tracing::debug!(?event, "session_event");
    }

    fn emit_party(&self, event: PartyEvent) {
        tracing::debug!(?event, "party_event");
    }

    fn emit_chat(&self, event: ChatEvent) {
        tracing::debug!(?event, "chat_event");
    }

    fn emit_notice(&self, event: NoticeEvent) {
        tracing::debug!(?event, "notice_event");
    }
}
