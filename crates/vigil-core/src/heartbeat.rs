// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Liveness pulses for long-running attempts.
//!
//! An attempt records pulses on its [`Heartbeat`]; the executor watches the
//! other end and abandons the attempt when no pulse has arrived within the
//! configured heartbeat timeout.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

/// Handle used by a running attempt to report progress.
///
/// Cheap to clone; every clone feeds the same monitor.
#[derive(Debug, Clone)]
pub struct Heartbeat {
    pulses: Arc<watch::Sender<u64>>,
}

impl Heartbeat {
    /// Record one liveness pulse.
    pub fn record(&self) {
        self.pulses.send_modify(|count| *count = count.wrapping_add(1));
    }

    /// Number of pulses recorded so far.
    pub fn count(&self) -> u64 {
        *self.pulses.borrow()
    }
}

/// Watches a [`Heartbeat`] for stalls.
#[derive(Debug)]
pub(crate) struct HeartbeatMonitor {
    pulses: watch::Receiver<u64>,
    // Keeps the channel open even if the attempt drops its handle, so a
    // silent attempt is still detected as stalled.
    _keepalive: Heartbeat,
}

/// Create a connected heartbeat/monitor pair.
pub(crate) fn channel() -> (Heartbeat, HeartbeatMonitor) {
    let (tx, rx) = watch::channel(0);
    let heartbeat = Heartbeat {
        pulses: Arc::new(tx),
    };
    let monitor = HeartbeatMonitor {
        pulses: rx,
        _keepalive: heartbeat.clone(),
    };
    (heartbeat, monitor)
}

impl HeartbeatMonitor {
    /// Resolve once no pulse has been seen for `timeout`.
    ///
    /// With `None` this never resolves.
    pub(crate) async fn stalled(&mut self, timeout: Option<Duration>) {
        let Some(timeout) = timeout else {
            return std::future::pending().await;
        };

        loop {
            match tokio::time::timeout(timeout, self.pulses.changed()).await {
                Ok(Ok(())) => {
                    self.pulses.borrow_and_update();
                }
                // Unreachable while `_keepalive` holds the sender.
                Ok(Err(_)) => return std::future::pending().await,
                Err(_) => return,
            }
        }
    }
}
