//! Run command implementation: the long-running bouncer.

use anyhow::{Context, Result};
use std::path::Path;
use tokio::sync::mpsc;
use tracing::info;

use super::{device_client, feed_client};
use crate::config::Config;
use crate::feed::run_stream;
use crate::lock::LockGuard;
use crate::reconciler::Reconciler;
use crate::signal::{spawn_signal_listener, ShutdownToken};

/// Decision batches buffered while a cycle is being applied
const DECISION_QUEUE: usize = 64;

/// Run the run command
pub async fn run(config_path: &Path) -> Result<()> {
    let config = Config::load(config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    let _lock = LockGuard::acquire(&config.lock_file)?;

    let token = ShutdownToken::new();
    let _signals = spawn_signal_listener(token.clone());

    let settings = config.engine_settings()?;
    let gateway = device_client(&config)?;
    let mut reconciler = Reconciler::bootstrap(gateway, settings)
        .await
        .context("Failed to load the address group from the device")?;

    let feed = feed_client(&config)?;
    let poll_interval = config.poll_interval()?;
    let (tx, rx) = mpsc::channel(DECISION_QUEUE);

    info!("Starting decision stream from {}", config.feed.url);
    let stream_token = token.clone();
    let stream =
        tokio::spawn(async move { run_stream(feed, tx, stream_token, poll_interval).await });

    reconciler.run(rx, token.clone()).await;

    // The reconciler may have stopped first; make sure the poller follows
    token.cancel();
    match stream.await {
        Ok(result) => result.context("Decision stream stopped"),
        Err(e) => Err(anyhow::anyhow!("Decision stream task failed: {}", e)),
    }
}
