//! Best-effort stream reachability probe.
//!
//! Probing is advisory: a failure surfaces as a notice while the load
//! proceeds regardless, because many live origins answer probes
//! inconsistently (geo blocks, token rotation, HEAD-hostile CDNs).

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

use crate::error::{ZapcastError, ZapcastResult};

/// Cap on how long a probe may hold a verdict back.
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Pre-flight reachability check for a stream URL.
#[async_trait]
pub trait StreamProbe: Send + Sync {
    /// Ok when the URL looks reachable, `ZapcastError::Validation`
    /// otherwise.
    async fn probe(&self, url: &str) -> ZapcastResult<()>;
}

/// Probe issuing a bounded-timeout GET and judging by HTTP status.
pub struct HttpStreamProbe {
    client: Client,
}

impl HttpStreamProbe {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl StreamProbe for HttpStreamProbe {
    async fn probe(&self, url: &str) -> ZapcastResult<()> {
        let response = self
            .client
            .get(url)
            .timeout(PROBE_TIMEOUT)
            .send()
            .await
            .map_err(|e| ZapcastError::Validation(format!("{url}: {e}")))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(ZapcastError::Validation(format!(
                "{url} answered {status}"
            )))
        }
    }
}
