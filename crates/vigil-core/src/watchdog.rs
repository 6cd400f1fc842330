// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Heartbeat-supervised worker that is restarted from scratch, forever.
//!
//! Each cycle runs the worker as a single-attempt activity whose heartbeat
//! timeout is the liveness window. Whatever the cycle ends with (the worker
//! returned, errored, went silent or hit its start-to-close ceiling) the
//! watchdog discards everything and starts a fresh cycle. Nothing carries
//! over between cycles except the counters in [`WatchdogStats`].
//!
//! Notification delivery, by contrast, retries the same payload until it is
//! accepted.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::retry::{
    ActivityContext, ActivityError, ActivityOptions, AttemptFailure, RetryPolicy, execute_activity,
};

/// Error type returned by supervised workers.
pub type WorkerError = Box<dyn std::error::Error + Send + Sync>;

/// A unit of work run under the watchdog.
///
/// `run` is called once per cycle and must build all of its state from
/// scratch; the watchdog never resumes a previous run.
#[async_trait]
pub trait Supervised: Send + Sync + 'static {
    /// Run one cycle, recording pulses on `ctx.heartbeat()` while healthy.
    async fn run(&self, ctx: ActivityContext) -> Result<(), WorkerError>;
}

/// Watchdog settings.
#[derive(Debug, Clone, PartialEq)]
pub struct WatchdogConfig {
    /// Period of the worker's pulses.
    pub pulse_interval: Duration,
    /// Pulses a [`HeartWorker`] emits before it goes silent.
    pub max_pulses: u32,
    /// Silence after which the worker is declared dead.
    pub liveness_window: Duration,
    /// Ceiling for a single cycle.
    pub start_to_close_timeout: Duration,
    /// Pause between cycles.
    pub restart_delay: Duration,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            pulse_interval: Duration::from_secs(1),
            max_pulses: 20,
            liveness_window: Duration::from_secs(5),
            start_to_close_timeout: Duration::from_secs(60 * 60),
            restart_delay: Duration::ZERO,
        }
    }
}

impl WatchdogConfig {
    /// Set the liveness window.
    pub fn with_liveness_window(mut self, window: Duration) -> Self {
        self.liveness_window = window;
        self
    }

    /// Set the pause between cycles.
    pub fn with_restart_delay(mut self, delay: Duration) -> Self {
        self.restart_delay = delay;
        self
    }

    /// Set the number of pulses before a [`HeartWorker`] goes silent.
    pub fn with_max_pulses(mut self, max_pulses: u32) -> Self {
        self.max_pulses = max_pulses;
        self
    }

    fn cycle_options(&self) -> ActivityOptions {
        ActivityOptions::default()
            .with_start_to_close_timeout(self.start_to_close_timeout)
            .with_heartbeat_timeout(Some(self.liveness_window))
            .with_retry_policy(RetryPolicy::single_attempt())
    }
}

/// Worker that pulses on a fixed period, then stops pulsing after
/// `max_pulses` while staying alive, simulating a hung process.
#[derive(Debug, Clone)]
pub struct HeartWorker {
    pulse_interval: Duration,
    max_pulses: u32,
}

impl HeartWorker {
    /// Worker using the pulse settings from `config`.
    pub fn new(config: &WatchdogConfig) -> Self {
        Self {
            pulse_interval: config.pulse_interval,
            max_pulses: config.max_pulses,
        }
    }
}

#[async_trait]
impl Supervised for HeartWorker {
    async fn run(&self, ctx: ActivityContext) -> Result<(), WorkerError> {
        let mut ticker = interval_at(Instant::now() + self.pulse_interval, self.pulse_interval);
        let mut ticks: u32 = 0;

        loop {
            ticker.tick().await;
            if ticks < self.max_pulses {
                ctx.heartbeat().record();
                debug!(tick = ticks, "Pulse");
            }
            ticks = ticks.saturating_add(1);
        }
    }
}

/// How a cycle ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CycleOutcome {
    /// The worker returned normally.
    Completed,
    /// The worker stopped pulsing for longer than the liveness window.
    Dead,
    /// The worker exceeded the start-to-close ceiling.
    TimedOut,
    /// The worker returned an error.
    Failed {
        /// Error text.
        error: String,
    },
}

/// Counters published after every cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchdogStats {
    /// Completed cycles.
    pub cycles: u64,
    /// Cycles that ended with a dead worker.
    pub dead_workers: u64,
    /// Outcome of the latest cycle.
    pub last_outcome: Option<CycleOutcome>,
}

/// Restarts a [`Supervised`] worker from a blank state after every cycle.
pub struct Watchdog<W> {
    worker: Arc<W>,
    config: WatchdogConfig,
    stats: watch::Sender<WatchdogStats>,
}

impl<W> std::fmt::Debug for Watchdog<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Watchdog")
            .field("config", &self.config)
            .field("stats", &*self.stats.borrow())
            .finish()
    }
}

impl<W: Supervised> Watchdog<W> {
    /// Create a watchdog for `worker`.
    pub fn new(worker: W, config: WatchdogConfig) -> Self {
        let (stats, _) = watch::channel(WatchdogStats::default());
        Self {
            worker: Arc::new(worker),
            config,
            stats,
        }
    }

    /// Observe cycle counters.
    pub fn subscribe(&self) -> watch::Receiver<WatchdogStats> {
        self.stats.subscribe()
    }

    /// Run cycles until `cancel` fires.
    pub async fn run(&self, cancel: CancellationToken) {
        info!(
            liveness_window_ms = self.config.liveness_window.as_millis() as u64,
            restart_delay_ms = self.config.restart_delay.as_millis() as u64,
            "Watchdog started"
        );

        let options = self.config.cycle_options();

        loop {
            let cycle = self.stats.borrow().cycles + 1;
            debug!(cycle, "Starting worker from a blank state");

            let result = execute_activity("supervised_worker", &options, &cancel, |ctx| {
                let worker = self.worker.clone();
                async move { worker.run(ctx).await }
            })
            .await;

            let outcome = match result {
                Ok(()) => CycleOutcome::Completed,
                Err(ActivityError::Cancelled { .. }) => break,
                Err(ActivityError::AttemptsExhausted { last, .. }) => match last {
                    AttemptFailure::HeartbeatTimeout => CycleOutcome::Dead,
                    AttemptFailure::TimedOut => CycleOutcome::TimedOut,
                    AttemptFailure::Failed(e) => CycleOutcome::Failed {
                        error: e.to_string(),
                    },
                },
            };

            match &outcome {
                CycleOutcome::Dead => warn!(cycle, "Worker stopped pulsing; restarting"),
                other => info!(cycle, outcome = ?other, "Worker cycle ended; restarting"),
            }

            self.stats.send_modify(|stats| {
                stats.cycles += 1;
                if outcome == CycleOutcome::Dead {
                    stats.dead_workers += 1;
                }
                stats.last_outcome = Some(outcome);
            });

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.config.restart_delay) => {}
            }
            // Keep a worker that returns immediately from starving the runtime.
            tokio::task::yield_now().await;
        }

        info!("Watchdog stopped");
    }

    /// Run on a background task.
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(cancel).await })
    }
}
