// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Metrics demo: a single long activity that ticks a counter and a gauge.
//!
//! Every tick adds one to `prom.ticks` and records the current Unix time on
//! `prom.last_tick`, both tagged with the configured label. The activity
//! ends on its own after `run_for`, or earlier on cancellation.

use std::convert::Infallible;
use std::time::Duration;

use chrono::Utc;
use opentelemetry::KeyValue;
use opentelemetry::metrics::Meter;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::time::{Instant, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::retry::{ActivityContext, ActivityError, ActivityOptions, execute_activity};

/// Fixed id of the demo instance.
pub const INSTANCE_ID: &str = "prom-workflow";

/// Settings for the metrics demo.
#[derive(Debug, Clone, PartialEq)]
pub struct PromConfig {
    /// Period between measurements.
    pub tick: Duration,
    /// How long the activity keeps emitting.
    pub run_for: Duration,
    /// Ceiling for one attempt.
    pub start_to_close: Duration,
    /// Value of the `prom_test_label` attribute.
    pub label: String,
}

impl Default for PromConfig {
    fn default() -> Self {
        Self {
            tick: Duration::from_secs(1),
            run_for: Duration::from_secs(60),
            start_to_close: Duration::from_secs(60 * 60),
            label: "foo".to_string(),
        }
    }
}

/// Progress of the demo, as reported by `GET /get-state`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromStats {
    /// Measurements emitted so far.
    pub ticks: u64,
    /// Whether the activity has returned.
    pub finished: bool,
}

/// The metrics-emitting activity and its progress channel.
pub struct PromWorkflow {
    config: PromConfig,
    meter: Meter,
    stats: watch::Sender<PromStats>,
}

impl std::fmt::Debug for PromWorkflow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PromWorkflow")
            .field("config", &self.config)
            .field("stats", &*self.stats.borrow())
            .finish_non_exhaustive()
    }
}

impl PromWorkflow {
    /// Demo emitting on `meter`.
    pub fn new(config: PromConfig, meter: Meter) -> Self {
        let (stats, _) = watch::channel(PromStats::default());
        Self {
            config,
            meter,
            stats,
        }
    }

    /// Demo emitting on the global meter.
    pub fn with_global_meter(config: PromConfig) -> Self {
        Self::new(config, opentelemetry::global::meter(crate::metrics::METER_NAME))
    }

    /// Observe progress.
    pub fn subscribe(&self) -> watch::Receiver<PromStats> {
        self.stats.subscribe()
    }

    /// Run the activity to completion. Returns the number of ticks of the
    /// attempt that succeeded.
    pub async fn run(self, cancel: CancellationToken) -> Result<u64, ActivityError<Infallible>> {
        let options =
            ActivityOptions::default().with_start_to_close_timeout(self.config.start_to_close);

        info!(instance_id = INSTANCE_ID, run_for = ?self.config.run_for, "Metrics demo started");
        let result = execute_activity("emit_metrics", &options, &cancel, |ctx| self.emit(ctx)).await;

        self.stats.send_modify(|stats| stats.finished = true);
        match &result {
            Ok(ticks) => info!(instance_id = INSTANCE_ID, ticks, "Metrics demo finished"),
            Err(e) => info!(instance_id = INSTANCE_ID, error = %e, "Metrics demo stopped"),
        }
        result
    }

    /// Spawn [`run`](Self::run) and return a progress receiver.
    pub fn spawn(self, cancel: CancellationToken) -> watch::Receiver<PromStats> {
        let stats = self.subscribe();
        tokio::spawn(self.run(cancel));
        stats
    }

    async fn emit(&self, ctx: ActivityContext) -> Result<u64, Infallible> {
        let attributes = [KeyValue::new("prom_test_label", self.config.label.clone())];
        let counter = self
            .meter
            .u64_counter("prom.ticks")
            .with_description("Ticks emitted by the metrics demo")
            .build();
        let gauge = self
            .meter
            .f64_gauge("prom.last_tick")
            .with_description("Unix time of the latest tick")
            .with_unit("s")
            .build();

        let mut ticker = interval_at(Instant::now() + self.config.tick, self.config.tick);
        let ender = tokio::time::sleep(self.config.run_for);
        tokio::pin!(ender);

        let mut ticks = 0u64;
        loop {
            tokio::select! {
                _ = &mut ender => break,
                _ = ticker.tick() => {
                    ticks += 1;
                    counter.add(1, &attributes);
                    gauge.record(Utc::now().timestamp() as f64, &attributes);
                    ctx.heartbeat().record();
                    self.stats.send_modify(|stats| stats.ticks += 1);
                    debug!(attempt = ctx.attempt(), ticks, "Metrics emitted");
                }
            }
        }
        Ok(ticks)
    }
}
