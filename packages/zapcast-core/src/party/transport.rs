//! Client transport for the party rendezvous server.
//!
//! The engine and chat channel treat the transport as an injected trait
//! object so tests can script it. [`HttpPartyTransport`] is the production
//! implementation speaking the rendezvous JSON wire over a shared
//! `reqwest` client.

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::types::{ChatMessage, PartyStateSnapshot, PlaybackUpdate};

/// Errors from rendezvous server calls.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PartyTransportError {
    /// Request never completed (connect failure, timeout, bad URL).
    #[error("party server request failed: {0}")]
    Http(String),

    /// Server answered with a non-success status and an error message
    /// ("Party not found", "Empty message").
    #[error("party server rejected request: {0}")]
    Rejected(String),

    /// Server answered 200 but the body did not match the expected shape.
    #[error("malformed party server response: {0}")]
    MalformedResponse(String),
}

/// Result alias for rendezvous calls.
pub type TransportResult<T> = Result<T, PartyTransportError>;

/// Request/response operations against the party rendezvous server.
///
/// All calls are simple request/response; polling cadence and retry policy
/// live in the callers, not here.
#[async_trait]
pub trait PartyTransport: Send + Sync {
    /// Creates a party and returns its 6-character code.
    async fn create(&self, username: &str) -> TransportResult<String>;

    /// Joins an existing party, returning the shared state at join time.
    ///
    /// The returned snapshot has no `host`; the membership refresh fills
    /// that in.
    async fn join(&self, code: &str, username: &str) -> TransportResult<PartyStateSnapshot>;

    /// Fetches the party's current shared state and roster.
    async fn fetch_state(&self, code: &str) -> TransportResult<PartyStateSnapshot>;

    /// Merges the given fields into the party's shared playback state.
    async fn post_update(&self, code: &str, update: &PlaybackUpdate) -> TransportResult<()>;

    /// Fetches messages with a timestamp strictly newer than `since`.
    async fn fetch_messages_since(&self, code: &str, since: f64)
        -> TransportResult<Vec<ChatMessage>>;

    /// Appends a chat message to the party's history.
    async fn send_message(&self, code: &str, username: &str, text: &str) -> TransportResult<()>;

    /// Notifies the server that this participant left.
    ///
    /// Succeeds for unknown parties too; the server treats leave as
    /// idempotent.
    async fn leave(&self, code: &str) -> TransportResult<()>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Wire Bodies
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct CreatedBody {
    party_code: String,
}

#[derive(Deserialize)]
struct MessagesBody {
    messages: Vec<ChatMessage>,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
}

/// Marker for endpoints whose 200 body carries nothing beyond the success
/// flag.
#[derive(Deserialize)]
struct AckBody {}

#[derive(Serialize)]
struct UpdateBody<'a> {
    code: &'a str,
    #[serde(flatten)]
    update: &'a PlaybackUpdate,
}

#[derive(Serialize)]
struct SendMessageBody<'a> {
    code: &'a str,
    username: &'a str,
    text: &'a str,
}

/// Joins a base URL and a path without doubling or dropping the slash.
fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

// ─────────────────────────────────────────────────────────────────────────────
// HTTP Implementation
// ─────────────────────────────────────────────────────────────────────────────

/// Production transport speaking HTTP/JSON to the rendezvous server.
///
/// Holds a shared [`reqwest::Client`] so connections are pooled with the
/// other HTTP collaborators.
#[derive(Clone)]
pub struct HttpPartyTransport {
    client: Client,
    base_url: String,
}

impl HttpPartyTransport {
    /// Creates a transport against the given base URL (e.g.
    /// `http://127.0.0.1:8002`).
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }

    fn url(&self, path: &str) -> String {
        join_url(&self.base_url, path)
    }

    /// Decodes a response, mapping non-success statuses to
    /// [`PartyTransportError::Rejected`] with the server's error message.
    async fn decode<T: DeserializeOwned>(&self, response: Response) -> TransportResult<T> {
        let status = response.status();
        if !status.is_success() {
            let message = response
                .json::<ErrorBody>()
                .await
                .ok()
                .and_then(|body| body.error)
                .unwrap_or_else(|| format!("party server returned {status}"));
            return Err(PartyTransportError::Rejected(message));
        }
        response
            .json::<T>()
            .await
            .map_err(|e| PartyTransportError::MalformedResponse(e.to_string()))
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> TransportResult<T> {
        let response = self
            .client
            .get(self.url(path))
            .query(query)
            .send()
            .await
            .map_err(|e| PartyTransportError::Http(e.to_string()))?;
        self.decode(response).await
    }

    async fn post<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> TransportResult<T> {
        let response = self
            .client
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .map_err(|e| PartyTransportError::Http(e.to_string()))?;
        self.decode(response).await
    }
}

#[async_trait]
impl PartyTransport for HttpPartyTransport {
    async fn create(&self, username: &str) -> TransportResult<String> {
        let body: CreatedBody = self
            .get("/party/create", &[("username", username)])
            .await?;
        Ok(body.party_code)
    }

    async fn join(&self, code: &str, username: &str) -> TransportResult<PartyStateSnapshot> {
        self.get(
            "/party/join",
            &[("code", code), ("username", username)],
        )
        .await
    }

    async fn fetch_state(&self, code: &str) -> TransportResult<PartyStateSnapshot> {
        self.get("/party/state", &[("code", code)]).await
    }

    async fn post_update(&self, code: &str, update: &PlaybackUpdate) -> TransportResult<()> {
        let _: AckBody = self
            .post("/party/update", &UpdateBody { code, update })
            .await?;
        Ok(())
    }

    async fn fetch_messages_since(
        &self,
        code: &str,
        since: f64,
    ) -> TransportResult<Vec<ChatMessage>> {
        let since = since.to_string();
        let body: MessagesBody = self
            .get("/party/messages", &[("code", code), ("since", &since)])
            .await?;
        Ok(body.messages)
    }

    async fn send_message(&self, code: &str, username: &str, text: &str) -> TransportResult<()> {
        let _: AckBody = self
            .post(
                "/party/send-message",
                &SendMessageBody {
                    code,
                    username,
                    text,
                },
            )
            .await?;
        Ok(())
    }

    async fn leave(&self, code: &str) -> TransportResult<()> {
        let _: AckBody = self.get("/party/leave", &[("code", code)]).await?;
        Ok(())
    }
}
