// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Dead-man's switch: fires its message to the webhook when the deadline
//! passes, unless it is deactivated first.

use std::convert::Infallible;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{deadline_for, require_duration, require_non_empty, require_webhook};
use crate::aggregate::{Aggregate, Termination};
use crate::deadline::Deadline;
use crate::error::Result;
use crate::registry::InstanceSpec;

/// Instance id for a switch.
pub fn instance_id(id: &str) -> String {
    format!("dms: {}", id)
}

/// Switch state. At most one of `deactivated` / `timed_out` is ever set.
#[derive(Debug, Clone, PartialEq)]
pub struct Switch {
    id: String,
    message: String,
    deadline: Deadline,
    deactivated: bool,
    timed_out: bool,
}

impl Switch {
    /// Armed switch.
    pub fn new(id: impl Into<String>, message: impl Into<String>, deadline: Deadline) -> Self {
        Self {
            id: id.into(),
            message: message.into(),
            deadline,
            deactivated: false,
            timed_out: false,
        }
    }

    /// Whether the switch was deactivated before its deadline.
    pub fn deactivated(&self) -> bool {
        self.deactivated
    }

    /// Whether the switch fired.
    pub fn timed_out(&self) -> bool {
        self.timed_out
    }

    /// Time left before the switch fires.
    pub fn remaining(&self) -> Duration {
        self.deadline.remaining()
    }

    /// Derived status view.
    pub fn status(&self) -> SwitchStatus {
        let remaining = if self.deactivated || self.timed_out {
            Duration::ZERO
        } else {
            self.remaining()
        };
        SwitchStatus {
            id: self.id.clone(),
            deactivated: self.deactivated,
            timed_out: self.timed_out,
            remaining_ms: u64::try_from(remaining.as_millis()).unwrap_or(u64::MAX),
            message: self.summary(),
        }
    }

    /// Human-readable state line.
    pub fn summary(&self) -> String {
        if self.deactivated {
            return "switch was deactivated".to_string();
        }
        if self.timed_out {
            return "switch timed out".to_string();
        }
        format!("{} until timeout", format_remaining(self.remaining()))
    }
}

impl Aggregate for Switch {
    // The switch takes no domain events; only the terminal signals matter.
    type Event = Infallible;
    type Notification = TimeoutPayload;

    fn apply(self, event: Infallible) -> Self {
        match event {}
    }

    fn finish(mut self, reason: Termination) -> Self {
        match reason {
            Termination::Timeout => self.timed_out = true,
            Termination::Deactivated => self.deactivated = true,
        }
        self
    }

    fn notification(&self, reason: Termination) -> Option<TimeoutPayload> {
        (reason == Termination::Timeout).then(|| TimeoutPayload {
            id: self.id.clone(),
            message: self.message.clone(),
        })
    }
}

/// Delivered when the switch fires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeoutPayload {
    /// Switch id as supplied at start.
    pub id: String,
    /// The armed message.
    pub message: String,
}

/// Response body of `GET /get-state`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwitchStatus {
    /// Switch id.
    pub id: String,
    /// Deactivated before the deadline.
    pub deactivated: bool,
    /// Fired.
    pub timed_out: bool,
    /// Milliseconds left; zero once finished.
    pub remaining_ms: u64,
    /// Human-readable state.
    pub message: String,
}

impl SwitchStatus {
    /// Status of a switch that has already left its loop.
    pub fn finished(id: impl Into<String>, reason: Termination) -> Self {
        let message = match reason {
            Termination::Deactivated => "switch was deactivated",
            Termination::Timeout => "switch timed out",
        };
        Self {
            id: id.into(),
            deactivated: reason == Termination::Deactivated,
            timed_out: reason == Termination::Timeout,
            remaining_ms: 0,
            message: message.to_string(),
        }
    }
}

/// Body of `POST /start`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartSwitchRequest {
    /// Switch id.
    pub id: String,
    /// When the switch was armed. Defaults to now.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    /// Time until the switch fires, in milliseconds.
    pub duration_ms: u64,
    /// Message delivered when it fires.
    pub message: String,
    /// Where to deliver the message.
    pub webhook: String,
}

impl StartSwitchRequest {
    /// Reject malformed requests.
    pub fn validate(&self) -> Result<()> {
        require_non_empty("id", &self.id)?;
        require_non_empty("message", &self.message)?;
        require_duration(self.duration_ms)?;
        require_webhook(&self.webhook)
    }

    /// Instance id this request starts.
    pub fn instance_id(&self) -> String {
        instance_id(&self.id)
    }

    /// Instance configuration for this request. The switch accepts early
    /// termination.
    pub fn into_spec(self) -> InstanceSpec<Switch> {
        let deadline = deadline_for(self.start_time, self.duration_ms);
        InstanceSpec::new(Switch::new(self.id, self.message, deadline), deadline)
            .with_webhook(self.webhook)
            .with_early_termination()
    }
}

/// Format like `1h2m3.5s`, `4m0s` or `250ms`.
pub fn format_remaining(remaining: Duration) -> String {
    let total_ms = remaining.as_millis();
    if total_ms == 0 {
        return "0s".to_string();
    }
    if total_ms < 1_000 {
        return format!("{}ms", total_ms);
    }

    let hours = total_ms / 3_600_000;
    let minutes = (total_ms / 60_000) % 60;
    let seconds = (total_ms / 1_000) % 60;
    let millis = total_ms % 1_000;

    let mut out = String::new();
    if hours > 0 {
        out.push_str(&format!("{}h", hours));
    }
    if hours > 0 || minutes > 0 {
        out.push_str(&format!("{}m", minutes));
    }
    if millis == 0 {
        out.push_str(&format!("{}s", seconds));
    } else {
        let fraction = format!("{:03}", millis);
        out.push_str(&format!("{}.{}s", seconds, fraction.trim_end_matches('0')));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn armed(secs: u64) -> Switch {
        Switch::new("door", "the door is open", Deadline::after(Duration::from_secs(secs)))
    }

    #[test]
    fn test_format_remaining() {
        assert_eq!(format_remaining(Duration::ZERO), "0s");
        assert_eq!(format_remaining(Duration::from_millis(250)), "250ms");
        assert_eq!(format_remaining(Duration::from_secs(59)), "59s");
        assert_eq!(format_remaining(Duration::from_millis(3_500)), "3.5s");
        assert_eq!(format_remaining(Duration::from_secs(240)), "4m0s");
        assert_eq!(format_remaining(Duration::from_millis(3_723_500)), "1h2m3.5s");
    }

    #[tokio::test(start_paused = true)]
    async fn test_running_summary_counts_down() {
        let switch = armed(90);
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(switch.summary(), "1m0s until timeout");
        assert!(!switch.deactivated());
        assert!(!switch.timed_out());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_notifies() {
        let switch = armed(1).finish(Termination::Timeout);
        assert!(switch.timed_out());
        assert!(!switch.deactivated());
        assert_eq!(switch.summary(), "switch timed out");
        assert_eq!(
            switch.notification(Termination::Timeout),
            Some(TimeoutPayload {
                id: "door".to_string(),
                message: "the door is open".to_string(),
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_deactivation_suppresses_notification() {
        let switch = armed(60).finish(Termination::Deactivated);
        assert!(switch.deactivated());
        assert!(!switch.timed_out());
        assert_eq!(switch.summary(), "switch was deactivated");
        assert_eq!(switch.notification(Termination::Deactivated), None);
        assert_eq!(switch.status().message, "switch was deactivated");
    }

    #[tokio::test(start_paused = true)]
    async fn test_finished_status_matches_summary() {
        for reason in [Termination::Timeout, Termination::Deactivated] {
            let switch = armed(5).finish(reason);
            let status = SwitchStatus::finished("door", reason);
            assert_eq!(status, switch.status());
        }
    }

    #[test]
    fn test_start_request_requires_id_and_message() {
        let valid = StartSwitchRequest {
            id: "door".to_string(),
            start_time: None,
            duration_ms: 10_000,
            message: "the door is open".to_string(),
            webhook: "http://localhost:8080/webhook".to_string(),
        };
        assert!(valid.validate().is_ok());
        assert_eq!(valid.instance_id(), "dms: door");

        let no_id = StartSwitchRequest {
            id: String::new(),
            ..valid.clone()
        };
        assert!(no_id.validate().is_err());

        let no_message = StartSwitchRequest {
            message: String::new(),
            ..valid.clone()
        };
        assert!(no_message.validate().is_err());

        assert!(valid.into_spec().early_termination);
    }
}
