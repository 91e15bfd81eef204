//! Sync command implementation: one-shot full resynchronization.

use anyhow::{Context, Result};
use std::path::Path;
use tracing::info;

use super::{device_client, feed_client};
use crate::config::Config;
use crate::feed::DecisionSource;
use crate::lock::LockGuard;
use crate::planner::UpdateStrategy;
use crate::reconciler::{CycleOutcome, Reconciler};
use crate::signal::{spawn_signal_listener, ShutdownToken};

/// Run the sync command
pub async fn run(replace_all: bool, config_path: &Path) -> Result<()> {
    let config = Config::load(config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    let _lock = LockGuard::acquire(&config.lock_file)?;

    let token = ShutdownToken::new();
    let _signals = spawn_signal_listener(token.clone());

    // The feed's startup delivery is the complete desired state
    let mut settings = config.engine_settings()?;
    settings.purge_on_start = true;

    let gateway = device_client(&config)?;
    let mut reconciler = Reconciler::bootstrap(gateway, settings)
        .await
        .context("Failed to load the address group from the device")?;

    let mut feed = feed_client(&config)?;
    let batch = feed
        .poll()
        .await
        .context("Failed to fetch current decisions")?;
    let report = reconciler.ingest(&batch);
    info!(
        "Feed holds {} banned IPv4 addresses ({} decisions ignored)",
        reconciler.desired().len(),
        report.ignored
    );

    let strategy = if replace_all {
        UpdateStrategy::ReplaceAll
    } else {
        UpdateStrategy::Patch
    };
    reconciler.request_resync(strategy);

    match reconciler.run_cycle(&token).await {
        CycleOutcome::Clean => {
            println!("[OK] Group already in sync ({} addresses)", reconciler.confirmed().len());
            Ok(())
        }
        CycleOutcome::Applied { deletes, sets } => {
            println!(
                "[OK] Group synchronized: {} addresses ({} delete and {} set calls)",
                reconciler.confirmed().len(),
                deletes,
                sets
            );
            Ok(())
        }
        CycleOutcome::Diverged { expected, actual } => anyhow::bail!(
            "Device holds {} addresses after sync, expected {}; run sync again",
            actual,
            expected
        ),
        CycleOutcome::Failed { applied, planned } => anyhow::bail!(
            "Sync failed after {} of {} update calls; run sync again",
            applied,
            planned
        ),
        CycleOutcome::Cancelled => anyhow::bail!("Sync interrupted; device partially updated"),
        CycleOutcome::Skipped => anyhow::bail!("Sync skipped while backing off"),
    }
}
