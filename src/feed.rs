//! Decision feed client.
//!
//! Polls the feed's stream endpoint and forwards each non-empty batch to the
//! reconciler through a channel. The first poll asks for the full current
//! state (`startup=true`); later polls only return changes.

use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::config::SecureString;
use crate::error::BouncerError;
use crate::ingest::DecisionBatch;
use crate::signal::ShutdownToken;

const STREAM_PATH: &str = "v1/decisions/stream";
const API_KEY_HEADER: &str = "X-Api-Key";

/// Asynchronous source of decision batches
#[async_trait]
pub trait DecisionSource: Send {
    /// Fetch the next batch. Delivery is at-least-once.
    async fn poll(&mut self) -> Result<DecisionBatch, BouncerError>;
}

/// HTTP client for the decision stream endpoint
pub struct LapiClient {
    client: Client,
    base: Url,
    api_key: SecureString,
    startup: bool,
}

impl LapiClient {
    pub fn new(url: &str, api_key: SecureString, timeout: Duration) -> Result<Self, BouncerError> {
        // A base without a trailing slash would lose its last segment on join
        let normalized = if url.ends_with('/') {
            url.to_string()
        } else {
            format!("{}/", url)
        };
        let base = Url::parse(&normalized)
            .map_err(|e| BouncerError::Configuration(format!("invalid feed URL {}: {}", url, e)))?;
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(format!("edgeos-bouncer/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| BouncerError::Configuration(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base,
            api_key,
            startup: true,
        })
    }

    /// Stream URL for the next poll
    pub fn stream_url(&self) -> Result<Url, BouncerError> {
        let mut url = self
            .base
            .join(STREAM_PATH)
            .map_err(|e| BouncerError::Configuration(format!("invalid feed URL: {}", e)))?;
        url.query_pairs_mut()
            .append_pair("startup", if self.startup { "true" } else { "false" });
        Ok(url)
    }
}

#[async_trait]
impl DecisionSource for LapiClient {
    async fn poll(&mut self) -> Result<DecisionBatch, BouncerError> {
        let url = self.stream_url()?;
        let response = self
            .client
            .get(url)
            .header(API_KEY_HEADER, self.api_key.as_str())
            .send()
            .await?;

        let status = response.status();
        if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
            return Err(BouncerError::Configuration(format!(
                "decision feed rejected the API key (HTTP {})",
                status
            )));
        }
        if !status.is_success() {
            return Err(BouncerError::Feed(format!("HTTP {}", status)));
        }

        let batch = response
            .json::<Option<DecisionBatch>>()
            .await
            .map_err(|e| BouncerError::Feed(format!("invalid decision payload: {}", e)))?
            .unwrap_or_default();

        self.startup = false;
        Ok(batch)
    }
}

/// Poll `source` every `poll_interval` and forward batches to `tx`.
///
/// Returns when the token is cancelled, when the receiver is gone, or with
/// the error when the feed fails in a way retrying cannot fix. Dropping `tx`
/// on return tells the reconciler no more input will come.
pub async fn run_stream<S>(
    mut source: S,
    tx: mpsc::Sender<DecisionBatch>,
    token: ShutdownToken,
    poll_interval: Duration,
) -> Result<(), BouncerError>
where
    S: DecisionSource,
{
    let mut ticker = tokio::time::interval(poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => {
                info!("Decision stream stopping");
                return Ok(());
            }
            _ = ticker.tick() => {}
        }

        match source.poll().await {
            Ok(batch) if batch.is_empty() => debug!("No new decisions"),
            Ok(batch) => {
                info!(
                    "Received {} new and {} deleted decisions",
                    batch.new.len(),
                    batch.deleted.len()
                );
                if tx.send(batch).await.is_err() {
                    debug!("Reconciler gone, stopping decision stream");
                    return Ok(());
                }
            }
            Err(e) if e.is_fatal() => {
                error!("Decision stream failed: {}", e);
                return Err(e);
            }
            Err(e) => warn!("Decision poll failed, retrying in {:?}: {}", poll_interval, e),
        }
    }
}
