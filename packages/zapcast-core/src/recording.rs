//! Client for the external recording collaborator.
//!
//! Recording runs out-of-process (a transcoder capturing the stream to
//! disk); this module only speaks its HTTP wire. Failures map to network
//! errors and are surfaced as transient notices upstream, never touching
//! playback.

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{ZapcastError, ZapcastResult};

/// One recorded file as reported by the collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordingEntry {
    pub filename: String,
    pub channel: String,
    /// File size in bytes.
    pub size: u64,
    /// Captured length in seconds.
    pub duration: u64,
    /// Unix timestamp (seconds) of the capture start.
    pub timestamp: i64,
}

/// Operations against the recording collaborator.
#[async_trait]
pub trait Recorder: Send + Sync {
    /// Starts capturing `url`, returning the collaborator's recording id.
    async fn start(&self, channel_name: &str, url: &str, start_time: u64)
        -> ZapcastResult<String>;

    /// Stops the capture for `channel_name`.
    async fn stop(&self, channel_name: &str, stop_time: u64, duration: u64) -> ZapcastResult<()>;

    /// Lists recorded files, newest first.
    async fn list(&self) -> ZapcastResult<Vec<RecordingEntry>>;

    /// Deletes a recorded file by name.
    async fn delete(&self, filename: &str) -> ZapcastResult<()>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Wire Bodies
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StartBody<'a> {
    channel_name: &'a str,
    url: &'a str,
    start_time: u64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StopBody<'a> {
    channel_name: &'a str,
    stop_time: u64,
    duration: u64,
}

#[derive(Serialize)]
struct DeleteBody<'a> {
    filename: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartedBody {
    recording_id: String,
}

#[derive(Deserialize)]
struct ListBody {
    recordings: Vec<RecordingEntry>,
}

#[derive(Deserialize)]
struct AckBody {}

// ─────────────────────────────────────────────────────────────────────────────
// HTTP Implementation
// ─────────────────────────────────────────────────────────────────────────────

/// Production recorder client on a shared `reqwest` client.
#[derive(Clone)]
pub struct HttpRecorder {
    client: Client,
    base_url: String,
}

impl HttpRecorder {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }

    async fn decode<T: DeserializeOwned>(&self, response: Response) -> ZapcastResult<T> {
        let status = response.status();
        if !status.is_success() {
            return Err(ZapcastError::Network(format!(
                "recorder returned {status}"
            )));
        }
        response
            .json::<T>()
            .await
            .map_err(|e| ZapcastError::Network(format!("recorder response: {e}")))
    }

    async fn post<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> ZapcastResult<T> {
        let response = self
            .client
            .post(format!("{}{path}", self.base_url))
            .json(body)
            .send()
            .await?;
        self.decode(response).await
    }
}

#[async_trait]
impl Recorder for HttpRecorder {
    async fn start(
        &self,
        channel_name: &str,
        url: &str,
        start_time: u64,
    ) -> ZapcastResult<String> {
        log::info!("[Recorder] Starting recording of {channel_name}");
        let body: StartedBody = self
            .post(
                "/recording/start",
                &StartBody {
                    channel_name,
                    url,
                    start_time,
                },
            )
            .await?;
        Ok(body.recording_id)
    }

    async fn stop(&self, channel_name: &str, stop_time: u64, duration: u64) -> ZapcastResult<()> {
        log::info!("[Recorder] Stopping recording of {channel_name} after {duration}s");
        let _: AckBody = self
            .post(
                "/recording/stop",
                &StopBody {
                    channel_name,
                    stop_time,
                    duration,
                },
            )
            .await?;
        Ok(())
    }

    async fn list(&self) -> ZapcastResult<Vec<RecordingEntry>> {
        let response = self
            .client
            .get(format!("{}/recording/list", self.base_url))
            .send()
            .await?;
        let body: ListBody = self.decode(response).await?;
        Ok(body.recordings)
    }

    async fn delete(&self, filename: &str) -> ZapcastResult<()> {
        log::info!("[Recorder] Deleting recording {filename}");
        let _: AckBody = self
            .post("/recording/delete", &DeleteBody { filename })
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_body_uses_camel_case_keys() {
        let body = StartBody {
            channel_name: "News One",
            url: "http://a/news.m3u8",
            start_time: 1_700_000_000,
        };
        let json = serde_json::to_string(&body).expect("serializable");
        assert_eq!(
            json,
            r#"{"channelName":"News One","url":"http://a/news.m3u8","startTime":1700000000}"#
        );
    }

    #[test]
    fn list_body_parses_wire_entries() {
        let json = r#"{"recordings":[
            {"filename":"rec_1700000000_News.ts","channel":"News One",
             "size":1048576,"duration":60,"timestamp":1700000000}
        ]}"#;
        let body: ListBody = serde_json::from_str(json).expect("valid list");
        assert_eq!(body.recordings.len(), 1);
        assert_eq!(body.recordings[0].filename, "rec_1700000000_News.ts");
        assert_eq!(body.recordings[0].size, 1_048_576);
    }
}
