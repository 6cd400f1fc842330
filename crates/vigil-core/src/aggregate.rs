// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! The aggregate contract shared by every workflow variant.

use serde::{Deserialize, Serialize};

/// Why an instance left its loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// The deadline racer fired first.
    Timeout,
    /// An early-termination request arrived before the deadline.
    Deactivated,
}

impl Termination {
    /// Lowercase name used in logs and status payloads.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::Deactivated => "deactivated",
        }
    }
}

impl std::fmt::Display for Termination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State folded from an instance's domain events.
///
/// `apply` is pure and total: an event that does not change anything (a
/// losing bid, a vote for an unknown option) returns the aggregate unchanged.
/// Implementations never fail and never perform I/O.
pub trait Aggregate: Clone + Send + Sync + 'static {
    /// Domain events accepted by this aggregate.
    type Event: Send + 'static;

    /// Payload handed to the notifier once the instance has finished.
    type Notification: Serialize + Send + Sync + 'static;

    /// Fold one event into the aggregate.
    fn apply(self, event: Self::Event) -> Self;

    /// Record the terminal signal. Called exactly once, after the last event.
    fn finish(self, _reason: Termination) -> Self {
        self
    }

    /// The payload to deliver for this termination, if any.
    fn notification(&self, reason: Termination) -> Option<Self::Notification>;
}
