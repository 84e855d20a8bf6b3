use super::{ProbeConfig, Reachability, ReachabilityProbe};
use crate::reconcile::{StatusCandidate, StatusSource};
use crate::state::{EntityStore, EntityUpdate};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{interval, sleep, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Summary of one probe round
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RoundReport {
    pub started_at: Option<DateTime<Utc>>,
    pub probed: usize,
    pub reachable: usize,
    pub unreachable: usize,
    pub ambiguous: usize,
    /// Results the store refused to merge
    pub rejected: usize,
}

/// What a trigger did
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RoundOutcome {
    Completed(RoundReport),
    /// Another round held the flag; nothing ran
    AlreadyRunning,
}

/// Proof that the caller owns the running round.
///
/// Dropping the guard marks the prober idle again, whether the round
/// finished, returned early, or unwound.
pub struct RoundGuard {
    running: Arc<AtomicBool>,
}

impl Drop for RoundGuard {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
    }
}

/// Single-flight, bounded-concurrency reachability sweeps
pub struct LivenessProber {
    store: Arc<EntityStore>,
    probe: Arc<dyn ReachabilityProbe>,
    config: ProbeConfig,
    running: Arc<AtomicBool>,
    rounds_completed: AtomicU64,
}

impl LivenessProber {
    pub fn new(store: Arc<EntityStore>, probe: Arc<dyn ReachabilityProbe>, config: ProbeConfig) -> Self {
        Self {
            store,
            probe,
            config,
            running: Arc::new(AtomicBool::new(false)),
            rounds_completed: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &ProbeConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn rounds_completed(&self) -> u64 {
        self.rounds_completed.load(Ordering::Relaxed)
    }

    /// Flip idle -> running. None if a round is already in flight.
    pub fn try_begin(&self) -> Option<RoundGuard> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RoundGuard {
                running: Arc::clone(&self.running),
            })
    }

    /// Run a round now unless one is already running
    pub async fn trigger(&self) -> RoundOutcome {
        self.trigger_at(Utc::now()).await
    }

    /// Same as `trigger` with an explicit round start time
    pub async fn trigger_at(&self, started_at: DateTime<Utc>) -> RoundOutcome {
        match self.try_begin() {
            Some(guard) => RoundOutcome::Completed(self.run_round(guard, started_at).await),
            None => {
                debug!("Probe round already running, trigger ignored");
                RoundOutcome::AlreadyRunning
            }
        }
    }

    /// Start a round in the background.
    ///
    /// The flag is taken before returning, so a second call made right after
    /// this one sees the round as running.
    pub fn spawn_round(self: &Arc<Self>) -> Option<JoinHandle<RoundReport>> {
        let guard = self.try_begin()?;
        let prober = Arc::clone(self);
        Some(tokio::spawn(async move {
            prober.run_round(guard, Utc::now()).await
        }))
    }

    /// Probe every eligible entity and merge the results.
    ///
    /// All results carry `started_at` as their observation time. Individual
    /// failures never abort the round.
    pub async fn run_round(&self, guard: RoundGuard, started_at: DateTime<Utc>) -> RoundReport {
        let targets: Vec<String> = self
            .store
            .all()
            .into_iter()
            .filter(|entity| self.config.probes_kind(entity.kind))
            .map(|entity| entity.id)
            .collect();

        info!(
            targets = targets.len(),
            max_concurrency = self.config.max_concurrency,
            "Starting probe round"
        );

        let timeout = Duration::from_millis(self.config.timeout_ms);
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrency.max(1)));
        let mut tasks = JoinSet::new();

        for entity_id in targets {
            let host = self.config.hostname_for(&entity_id);
            let probe = Arc::clone(&self.probe);
            let semaphore = Arc::clone(&semaphore);

            tasks.spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return (entity_id, Reachability::Ambiguous),
                };
                let result = tokio::time::timeout(timeout, probe.probe(&host, timeout))
                    .await
                    .unwrap_or(Reachability::Unreachable);
                (entity_id, result)
            });
        }

        let mut report = RoundReport {
            started_at: Some(started_at),
            ..Default::default()
        };

        while let Some(joined) = tasks.join_next().await {
            report.probed += 1;

            let (entity_id, result) = match joined {
                Ok(pair) => pair,
                Err(e) => {
                    warn!(error = %e, "Probe task failed");
                    report.ambiguous += 1;
                    continue;
                }
            };

            match result {
                Reachability::Reachable => report.reachable += 1,
                Reachability::Unreachable => report.unreachable += 1,
                Reachability::Ambiguous => report.ambiguous += 1,
            }

            let Some(status) = result.status() else {
                continue;
            };
            let update =
                EntityUpdate::status_only(StatusCandidate::new(status, StatusSource::Probe));
            if let Err(e) = self.store.merge(&entity_id, update, started_at) {
                warn!(entity_id = %entity_id, error = %e, "Probe result rejected");
                report.rejected += 1;
            }
        }

        self.rounds_completed.fetch_add(1, Ordering::Relaxed);
        drop(guard);

        info!(
            probed = report.probed,
            reachable = report.reachable,
            unreachable = report.unreachable,
            ambiguous = report.ambiguous,
            "Probe round complete"
        );

        report
    }

    /// Background loop: one delayed initial round, then one per interval.
    ///
    /// Each tick spawns its trigger, so a slow round never delays the timer;
    /// overlapping ticks fall through the single-flight check.
    pub async fn run_probe_loop(self: Arc<Self>) {
        if !self.config.enabled {
            info!("Liveness prober disabled, exiting loop");
            return;
        }

        info!(
            interval_seconds = self.config.interval_seconds,
            initial_delay_seconds = self.config.initial_delay_seconds,
            timeout_ms = self.config.timeout_ms,
            "Starting liveness prober"
        );

        sleep(Duration::from_secs(self.config.initial_delay_seconds)).await;

        let mut timer = interval(Duration::from_secs(self.config.interval_seconds.max(1)));
        timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            timer.tick().await;

            let prober = Arc::clone(&self);
            tokio::spawn(async move {
                if prober.trigger().await == RoundOutcome::AlreadyRunning {
                    debug!("Skipping scheduled probe round, previous round still running");
                }
            });
        }
    }
}
