use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::MonitorSection;
use crate::registry::{ChannelRecord, ChannelRegistry, RegistryError};

use super::policy::LivenessPolicy;
use super::probe::ChannelProber;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),
    #[error("channel not found: {0}")]
    UnknownChannel(String),
}

pub type SchedulerResult<T> = Result<T, SchedulerError>;

/// Aggregate counts for one sweep over the channel population.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepSummary {
    pub checked: usize,
    pub online: usize,
    pub offline: usize,
}

/// Drives periodic re-validation of the channel registry.
///
/// One instance owns the sweep cadence for the whole process; the
/// in-flight flag lives here rather than in a global so tests and embed
/// scenarios can run isolated schedulers.
pub struct HealthScheduler {
    registry: ChannelRegistry,
    prober: Arc<dyn ChannelProber>,
    policy: LivenessPolicy,
    recheck_after: chrono::Duration,
    batch_size: usize,
    batch_pause: Duration,
    warmup: Duration,
    sweep_active: AtomicBool,
}

impl HealthScheduler {
    pub fn new(
        registry: ChannelRegistry,
        config: &MonitorSection,
        prober: Arc<dyn ChannelProber>,
    ) -> Self {
        Self {
            registry,
            prober,
            policy: LivenessPolicy::new(config.failure_threshold),
            recheck_after: chrono::Duration::hours(config.recheck_hours),
            batch_size: config.batch_size.max(1),
            batch_pause: Duration::from_secs(config.batch_pause_seconds),
            warmup: Duration::from_secs(config.warmup_seconds),
            sweep_active: AtomicBool::new(false),
        }
    }

    /// One full pass over channels due for re-check.
    ///
    /// Probes run concurrently within a fixed-size batch, batches are
    /// separated by a pause, and only one sweep may be in flight per
    /// scheduler: a concurrent invocation returns zero counts instead of
    /// queueing, so outbound load never doubles up. Probe failures are
    /// folded into the policy counters; only registry failures abort.
    pub async fn run_sweep(&self) -> SchedulerResult<SweepSummary> {
        if self
            .sweep_active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            warn!(target: "health_sweep", "sweep already in flight, skipping");
            return Ok(SweepSummary::default());
        }
        let _guard = SweepGuard(&self.sweep_active);

        let due = self.registry.channels_needing_check(self.recheck_after)?;
        if due.is_empty() {
            debug!(target: "health_sweep", "no channels due for re-check");
            return Ok(SweepSummary::default());
        }
        info!(target: "health_sweep", pending = due.len(), "starting sweep");

        let mut summary = SweepSummary::default();
        for (index, batch) in due.chunks(self.batch_size).enumerate() {
            if index > 0 {
                sleep(self.batch_pause).await;
            }
            let results = join_all(batch.iter().map(|channel| self.check_record(channel))).await;
            for result in results {
                let is_online = result?;
                summary.checked += 1;
                if is_online {
                    summary.online += 1;
                } else {
                    summary.offline += 1;
                }
            }
        }

        info!(
            target: "health_sweep",
            checked = summary.checked,
            online = summary.online,
            offline = summary.offline,
            "sweep finished"
        );
        Ok(summary)
    }

    /// On-demand re-check of a single channel, outside the sweep cadence.
    /// Deliberately ignores the sweep guard: it touches one record and a
    /// racing sweep write is last-wins, self-correcting on the next probe.
    pub async fn check_channel(&self, id: &str) -> SchedulerResult<bool> {
        let channel = self
            .registry
            .channel_by_id(id)?
            .ok_or_else(|| SchedulerError::UnknownChannel(id.to_string()))?;
        self.check_record(&channel).await
    }

    async fn check_record(&self, channel: &ChannelRecord) -> SchedulerResult<bool> {
        let outcome = self.prober.probe(&channel.source_url).await;
        if let Some(reason) = outcome.reason() {
            debug!(target: "health_sweep", channel = %channel.id, reason, "probe did not reach origin");
        }
        let health = self
            .policy
            .apply(&channel.health, outcome.is_reachable(), Utc::now());
        if health.is_online != channel.health.is_online {
            info!(
                target: "health_sweep",
                channel = %channel.id,
                online = health.is_online,
                failures = health.consecutive_failures,
                "channel status changed"
            );
        }
        self.registry.update_health(&channel.id, &health)?;
        Ok(health.is_online)
    }

    /// Background loop: one sweep after the warm-up delay, then one per
    /// `sweep_interval` on a fixed-rate timer. A tick that lands while a
    /// sweep is still running is absorbed by the in-flight guard and
    /// dropped; there is no makeup run. Sweep errors are logged and
    /// discarded here, on purpose: the next tick retries naturally.
    pub fn start(self: Arc<Self>, sweep_interval: Duration) -> SchedulerHandle {
        let scheduler = self;
        let (shutdown, mut signal) = watch::channel(false);
        let task = tokio::spawn(async move {
            tokio::select! {
                _ = sleep(scheduler.warmup) => {}
                _ = signal.changed() => return,
            }
            let mut ticker = interval(sweep_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match scheduler.run_sweep().await {
                            Ok(summary) => debug!(
                                target: "health_sweep",
                                checked = summary.checked,
                                "scheduled sweep completed"
                            ),
                            Err(err) => warn!(
                                target: "health_sweep",
                                error = %err,
                                "scheduled sweep failed, will retry on next tick"
                            ),
                        }
                    }
                    _ = signal.changed() => {
                        info!(target: "health_sweep", "scheduler stopping");
                        break;
                    }
                }
            }
        });
        SchedulerHandle { shutdown, task }
    }
}

/// Clears the in-flight flag even when a sweep aborts on a registry
/// error, so a failed sweep cannot wedge the scheduler.
struct SweepGuard<'a>(&'a AtomicBool);

impl Drop for SweepGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Handle to a running scheduler loop.
pub struct SchedulerHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Cancel the timer; a sweep already in progress runs to completion
    /// before the task exits.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        let _ = self.task.await;
    }
}
