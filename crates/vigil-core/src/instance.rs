// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! The instance loop.
//!
//! One loop owns one aggregate. It blocks on a single `select!` over the
//! domain event channel, the deadline racer's token and (optionally) the
//! early-termination channel. Whichever terminal signal is observed first ends
//! the loop; nothing else ever decides that an instance is finished.
//!
//! Readers never go through the loop: every applied event republishes the
//! aggregate on a `watch` channel, so a query is answered from the latest
//! snapshot even while the loop is parked waiting for input.

use serde::Serialize;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info};

use crate::aggregate::{Aggregate, Termination};

/// Lifecycle state of an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceStatus {
    /// The loop is accepting events.
    Running,
    /// A terminal signal was observed; the instance no longer accepts events.
    Finished,
}

impl InstanceStatus {
    /// Lowercase name used in logs and status payloads.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Finished => "finished",
        }
    }
}

impl std::fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read-only view of an instance, published after every transition.
#[derive(Debug, Clone)]
pub struct InstanceSnapshot<A> {
    /// Aggregate after the last applied event.
    pub aggregate: A,
    /// Lifecycle state.
    pub status: InstanceStatus,
    /// Number of domain events applied so far.
    pub events_applied: u64,
    /// Set once the loop has exited.
    pub termination: Option<Termination>,
}

/// A single instance's selection loop.
pub struct InstanceLoop<A: Aggregate> {
    instance_id: String,
    aggregate: A,
    events: mpsc::Receiver<A::Event>,
    deadline: oneshot::Receiver<()>,
    terminate: Option<mpsc::Receiver<()>>,
    snapshot: watch::Sender<InstanceSnapshot<A>>,
    events_applied: u64,
}

impl<A: Aggregate> InstanceLoop<A> {
    /// Build a loop around its inputs.
    ///
    /// `deadline` is the racer's receiver. Pass `terminate: None` for variants
    /// without an early-termination gate. The returned receiver observes
    /// every published snapshot.
    pub fn new(
        instance_id: impl Into<String>,
        aggregate: A,
        events: mpsc::Receiver<A::Event>,
        deadline: oneshot::Receiver<()>,
        terminate: Option<mpsc::Receiver<()>>,
    ) -> (Self, watch::Receiver<InstanceSnapshot<A>>) {
        let (snapshot, rx) = watch::channel(InstanceSnapshot {
            aggregate: aggregate.clone(),
            status: InstanceStatus::Running,
            events_applied: 0,
            termination: None,
        });

        let instance_loop = Self {
            instance_id: instance_id.into(),
            aggregate,
            events,
            deadline,
            terminate,
            snapshot,
            events_applied: 0,
        };
        (instance_loop, rx)
    }

    /// Run until a terminal signal arrives.
    ///
    /// Returns the final aggregate (after [`Aggregate::finish`]) and the
    /// reason the loop exited. Exits exactly once.
    pub async fn run(mut self) -> (A, Termination) {
        let reason = loop {
            tokio::select! {
                Some(event) = self.events.recv() => {
                    self.aggregate = self.aggregate.clone().apply(event);
                    self.events_applied += 1;
                    debug!(
                        instance_id = %self.instance_id,
                        events_applied = self.events_applied,
                        "Applied event"
                    );
                    let aggregate = self.aggregate.clone();
                    let events_applied = self.events_applied;
                    self.snapshot.send_modify(|s| {
                        s.aggregate = aggregate;
                        s.events_applied = events_applied;
                    });
                }

                // A dropped racer only happens on runtime shutdown; treat it
                // as the deadline so the loop still exits once.
                _ = &mut self.deadline => break Termination::Timeout,

                _ = terminal_requested(&mut self.terminate) => break Termination::Deactivated,
            }
        };

        let aggregate = self.aggregate.finish(reason);
        let published = aggregate.clone();
        self.snapshot.send_modify(|s| {
            s.aggregate = published;
            s.status = InstanceStatus::Finished;
            s.termination = Some(reason);
        });

        info!(
            instance_id = %self.instance_id,
            reason = %reason,
            events_applied = self.events_applied,
            "Instance finished"
        );

        (aggregate, reason)
    }
}

/// Resolves when an early-termination token arrives.
///
/// Never resolves for instances without a gate, or once every gate sender is
/// gone.
async fn terminal_requested(terminate: &mut Option<mpsc::Receiver<()>>) {
    if let Some(rx) = terminate {
        if rx.recv().await.is_some() {
            return;
        }
    }
    std::future::pending().await
}
