// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Fixed deadlines and the deadline racer.
//!
//! A [`Deadline`] is computed once from `start_time + duration` and never
//! changes. The racer sleeps on the monotonic clock until that instant and
//! then sends a single token; the instance loop treats that token as just
//! another event source.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::debug;

/// Used when `start_time + duration` does not fit in the clock.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// An absolute point in time at which an instance stops accepting events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    at: DateTime<Utc>,
    instant: Instant,
}

impl Deadline {
    /// Deadline `duration` after `start_time`.
    ///
    /// The wall-clock value is converted to a monotonic instant once, here.
    /// A start time in the past shortens the remaining wait; a deadline that
    /// has already passed fires immediately.
    pub fn from_start(start_time: DateTime<Utc>, duration: Duration) -> Self {
        let at = TimeDelta::from_std(duration)
            .ok()
            .and_then(|delta| start_time.checked_add_signed(delta))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        let remaining = (at - Utc::now()).to_std().unwrap_or(Duration::ZERO);
        let now = Instant::now();
        let instant = now
            .checked_add(remaining)
            .unwrap_or_else(|| now + FAR_FUTURE);

        Self { at, instant }
    }

    /// Deadline `duration` from now.
    pub fn after(duration: Duration) -> Self {
        let now = Instant::now();
        let at = TimeDelta::from_std(duration)
            .ok()
            .and_then(|delta| Utc::now().checked_add_signed(delta))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        let instant = now
            .checked_add(duration)
            .unwrap_or_else(|| now + FAR_FUTURE);

        Self { at, instant }
    }

    /// Wall-clock deadline.
    pub fn at(&self) -> DateTime<Utc> {
        self.at
    }

    /// Monotonic deadline used by the racer.
    pub fn instant(&self) -> Instant {
        self.instant
    }

    /// Time left before the deadline, zero once it has passed.
    pub fn remaining(&self) -> Duration {
        self.instant.saturating_duration_since(Instant::now())
    }

    /// Whether the deadline has passed.
    pub fn has_passed(&self) -> bool {
        Instant::now() >= self.instant
    }
}

/// Arm the deadline racer.
///
/// The spawned task is detached: it cannot be cancelled, never re-arms, and
/// sends at most one token. The receiver resolves when the deadline passes.
pub fn spawn_racer(instance_id: &str, deadline: Deadline) -> oneshot::Receiver<()> {
    let (tx, rx) = oneshot::channel();
    let instance_id = instance_id.to_string();

    tokio::spawn(async move {
        tokio::time::sleep_until(deadline.instant()).await;
        debug!(instance_id = %instance_id, deadline = %deadline.at(), "Deadline reached");
        // The loop may already have exited through early termination.
        let _ = tx.send(());
    });

    rx
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_racer_fires_after_duration() {
        let deadline = Deadline::after(Duration::from_secs(10));
        let mut rx = spawn_racer("test", deadline);

        tokio::time::sleep(Duration::from_secs(9)).await;
        assert!(rx.try_recv().is_err(), "racer fired early");

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(rx.try_recv().is_ok(), "racer should have fired");
    }

    #[tokio::test(start_paused = true)]
    async fn test_past_deadline_fires_immediately() {
        let start = Utc::now() - TimeDelta::minutes(5);
        let deadline = Deadline::from_start(start, Duration::from_secs(60));
        assert!(deadline.has_passed());
        assert_eq!(deadline.remaining(), Duration::ZERO);

        let rx = spawn_racer("test", deadline);
        tokio::time::timeout(Duration::from_millis(1), rx)
            .await
            .expect("racer should fire without waiting")
            .expect("racer sends exactly one token");
    }

    #[tokio::test(start_paused = true)]
    async fn test_remaining_counts_down() {
        let deadline = Deadline::after(Duration::from_secs(30));
        tokio::time::sleep(Duration::from_secs(10)).await;
        let remaining = deadline.remaining();
        assert!(remaining <= Duration::from_secs(20));
        assert!(remaining > Duration::from_secs(19));
        assert!(!deadline.has_passed());
    }

    #[tokio::test]
    async fn test_overflowing_duration_saturates() {
        let deadline = Deadline::after(Duration::from_secs(u64::MAX));
        assert_eq!(deadline.at(), DateTime::<Utc>::MAX_UTC);
        assert!(!deadline.has_passed());
    }
}
