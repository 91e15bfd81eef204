//! Reconciliation engine.
//!
//! The [`Reconciler`] owns the desired address group, the last snapshot
//! confirmed on the device and the dirty flag. A single event loop
//! multiplexes decision batches, timer ticks and cancellation, so ingestion
//! and apply never interleave and at most one cycle is in flight.
//!
//! ```text
//! Idle -> Idle                                   (nothing to do)
//!      -> Applying -> Refreshing -> Idle
//!      -> Applying -> Failed                     (retry after backoff)
//!      -> Applying -> Refreshing -> Idle         (diverged, resync after backoff)
//! ```

use std::net::Ipv4Addr;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::address_set::{diff_additions, diff_removals, AddressGroup, AddressSet};
use crate::error::BouncerError;
use crate::gateway::{apply_payload, fetch_group, DeviceGateway};
use crate::ingest::{ingest, DecisionBatch, IngestReport};
use crate::planner::{plan, UpdateStrategy, DEFAULT_MAX_BATCH_SIZE};
use crate::signal::ShutdownToken;

/// Engine tuning, usually built by [`Config::engine_settings`](crate::config::Config::engine_settings)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    pub group: String,
    pub tick_interval: Duration,
    pub max_batch_size: usize,
    pub verify_after_apply: bool,
    pub resync_strategy: UpdateStrategy,
    pub purge_on_start: bool,
    pub max_backoff: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            group: String::new(),
            tick_interval: Duration::from_secs(5),
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            verify_after_apply: true,
            resync_strategy: UpdateStrategy::Patch,
            purge_on_start: false,
            max_backoff: Duration::from_secs(300),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcilerState {
    Idle,
    Applying,
    Refreshing,
    Failed,
}

/// Result of one tick's worth of work
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Nothing to apply
    Clean,
    /// Dirty, but still inside the retry backoff window
    Skipped,
    Applied { deletes: usize, sets: usize },
    /// Batch `applied` of `planned` failed; the next cycle starts from a refetch
    Failed { applied: usize, planned: usize },
    /// Every batch succeeded but the device does not hold what was applied;
    /// the resync waits out the backoff like a failed cycle
    Diverged { expected: usize, actual: usize },
    /// Cancellation arrived between two batches
    Cancelled,
}

/// Delay before retrying after `failures` consecutive failed cycles.
///
/// Starts at `base` and doubles, never exceeding `max`.
pub fn backoff_delay(base: Duration, failures: u32, max: Duration) -> Duration {
    if failures == 0 {
        return Duration::ZERO;
    }
    let factor = 1u32 << (failures - 1).min(16);
    base.saturating_mul(factor).min(max)
}

pub struct Reconciler<G> {
    gateway: G,
    settings: EngineSettings,
    desired: AddressGroup,
    confirmed: AddressSet,
    dirty: bool,
    state: ReconcilerState,
    /// Confirmed snapshot must be refetched before the next diff
    needs_refresh: bool,
    next_strategy: UpdateStrategy,
    consecutive_failures: u32,
    retry_at: Option<Instant>,
}

impl<G: DeviceGateway> Reconciler<G> {
    /// Build an engine from the device's current group contents.
    ///
    /// `current` seeds the confirmed snapshot and, unless
    /// `purge_on_start` is set, the desired state.
    pub fn new(gateway: G, settings: EngineSettings, current: AddressSet) -> Self {
        let desired = if settings.purge_on_start {
            AddressSet::new()
        } else {
            current.clone()
        };
        Self {
            gateway,
            desired: AddressGroup::new(settings.group.clone(), desired),
            settings,
            confirmed: current,
            dirty: false,
            state: ReconcilerState::Idle,
            needs_refresh: false,
            next_strategy: UpdateStrategy::Patch,
            consecutive_failures: 0,
            retry_at: None,
        }
    }

    /// Log in, fetch the target group and build the engine.
    ///
    /// A missing group is returned as [`BouncerError::Configuration`].
    pub async fn bootstrap(gateway: G, settings: EngineSettings) -> Result<Self, BouncerError> {
        gateway.login().await?;
        let current = fetch_group(&gateway, &settings.group).await?;
        info!(
            "Group {} holds {} addresses on the device",
            settings.group,
            current.len()
        );
        if settings.purge_on_start {
            info!("Desired state starts empty; the feed's startup delivery will rebuild it");
        }
        Ok(Self::new(gateway, settings, current))
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn desired(&self) -> &AddressSet {
        &self.desired.members
    }

    pub fn confirmed(&self) -> &AddressSet {
        &self.confirmed
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn state(&self) -> ReconcilerState {
        self.state
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Fold a decision batch into the desired state
    pub fn ingest(&mut self, batch: &DecisionBatch) -> IngestReport {
        let report = ingest(&mut self.desired.members, batch);
        if report.changed() {
            self.dirty = true;
            debug!(
                "Desired state changed: +{} -{} ({} ignored), now {} addresses",
                report.added,
                report.removed,
                report.ignored,
                self.desired.members.len()
            );
        }
        report
    }

    /// Force the next cycle to refetch the device and apply with `strategy`
    pub fn request_resync(&mut self, strategy: UpdateStrategy) {
        self.dirty = true;
        self.needs_refresh = true;
        self.next_strategy = strategy;
        self.retry_at = None;
    }

    /// One tick: compute the diff against the confirmed snapshot and apply it.
    pub async fn run_cycle(&mut self, token: &ShutdownToken) -> CycleOutcome {
        if !self.dirty {
            return CycleOutcome::Clean;
        }
        if let Some(at) = self.retry_at {
            if Instant::now() < at {
                return CycleOutcome::Skipped;
            }
        }

        if self.needs_refresh {
            self.state = ReconcilerState::Refreshing;
            match fetch_group(&self.gateway, &self.settings.group).await {
                Ok(actual) => {
                    debug!("Refetched group {}: {} addresses", self.settings.group, actual.len());
                    self.confirmed = actual;
                    self.needs_refresh = false;
                }
                Err(e) => return self.fail(e, 0, 0),
            }
        }

        let snapshot = self.desired.members.clone();
        self.dirty = false;

        let strategy = self.next_strategy;
        let plan = plan(
            &self.desired.name,
            &self.confirmed,
            &snapshot,
            strategy,
            self.settings.max_batch_size,
        );

        if plan.is_empty() {
            self.succeed();
            return CycleOutcome::Clean;
        }

        info!(
            "Updating group {} ({:?}): {} -> {} addresses in {} delete and {} set batches",
            self.desired.name,
            strategy,
            self.confirmed.len(),
            snapshot.len(),
            plan.deletes.len(),
            plan.sets.len()
        );

        self.state = ReconcilerState::Applying;
        for (done, payload) in plan.payloads().enumerate() {
            if token.is_cancelled() {
                warn!(
                    "Shutdown requested after {} of {} batches; device left partially updated",
                    done,
                    plan.len()
                );
                self.dirty = true;
                self.needs_refresh = true;
                self.state = ReconcilerState::Idle;
                return CycleOutcome::Cancelled;
            }
            if let Err(e) = apply_payload(&self.gateway, payload).await {
                return self.fail(e, done, plan.len());
            }
        }

        self.confirmed = snapshot;
        info!(
            "Group {} updated: {} addresses",
            self.desired.name,
            self.confirmed.len()
        );

        if self.settings.verify_after_apply {
            if let Some(outcome) = self.verify().await {
                return outcome;
            }
        }

        self.succeed();
        CycleOutcome::Applied {
            deletes: plan.deletes.len(),
            sets: plan.sets.len(),
        }
    }

    /// Compare the device with the confirmed snapshot after an apply
    async fn verify(&mut self) -> Option<CycleOutcome> {
        self.state = ReconcilerState::Refreshing;
        match fetch_group(&self.gateway, &self.settings.group).await {
            Ok(actual) if actual == self.confirmed => {
                debug!("Stored address count {}", actual.len());
                None
            }
            Ok(actual) => {
                let expected = self.confirmed.len();
                let (missing, extra) = describe_divergence(&self.confirmed, &actual);
                warn!(
                    "{} (missing {:?}, unexpected {:?}); resynchronizing",
                    BouncerError::Divergence {
                        expected,
                        actual: actual.len()
                    },
                    missing,
                    extra
                );
                let outcome = CycleOutcome::Diverged {
                    expected,
                    actual: actual.len(),
                };
                self.confirmed = actual;
                self.dirty = true;
                self.next_strategy = self.settings.resync_strategy;
                let delay = self.schedule_retry();
                debug!("Resync of group {} in {:?}", self.desired.name, delay);
                self.state = ReconcilerState::Idle;
                Some(outcome)
            }
            Err(e) => {
                warn!("Could not verify group after update: {}", e);
                self.needs_refresh = true;
                None
            }
        }
    }

    fn succeed(&mut self) {
        self.next_strategy = UpdateStrategy::Patch;
        self.consecutive_failures = 0;
        self.retry_at = None;
        self.state = ReconcilerState::Idle;
    }

    /// Count one more unsuccessful cycle and push the next attempt out
    fn schedule_retry(&mut self) -> Duration {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        let delay = backoff_delay(
            self.settings.tick_interval,
            self.consecutive_failures,
            self.settings.max_backoff,
        );
        self.retry_at = Some(Instant::now() + delay);
        delay
    }

    fn fail(&mut self, err: BouncerError, applied: usize, planned: usize) -> CycleOutcome {
        self.state = ReconcilerState::Failed;
        self.dirty = true;
        self.needs_refresh = true;
        let delay = self.schedule_retry();
        warn!(
            "Update of group {} failed after {} of {} batches: {}; retrying in {:?}",
            self.desired.name, applied, planned, err, delay
        );
        CycleOutcome::Failed { applied, planned }
    }

    /// Drive the engine until cancellation or until the decision stream ends.
    pub async fn run(&mut self, mut decisions: mpsc::Receiver<DecisionBatch>, token: ShutdownToken) {
        let mut ticker = tokio::time::interval(self.settings.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            "Reconciling group {} every {:?}",
            self.settings.group, self.settings.tick_interval
        );

        loop {
            if token.is_cancelled() {
                break;
            }
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                _ = ticker.tick() => {
                    self.run_cycle(&token).await;
                }
                batch = decisions.recv() => match batch {
                    Some(batch) => {
                        self.ingest(&batch);
                    }
                    None => {
                        info!("Decision stream closed, stopping reconciler");
                        break;
                    }
                },
            }
        }

        if self.dirty {
            warn!(
                "Stopping with unapplied changes to group {}",
                self.desired.name
            );
        }
        info!("Reconciler stopped");
    }
}

fn describe_divergence(expected: &AddressSet, actual: &AddressSet) -> (Vec<Ipv4Addr>, Vec<Ipv4Addr>) {
    (diff_removals(expected, actual), diff_additions(expected, actual))
}
