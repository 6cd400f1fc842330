// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Workflow variants built on the [`Aggregate`](crate::aggregate::Aggregate)
//! contract.
//!
//! Each variant module owns its aggregate, its events and the request types
//! the transport layer decodes. Requests are validated here, before anything
//! reaches an instance; the aggregates themselves never fail. The prom demo
//! has no aggregate: it is a single metrics-emitting activity.

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::deadline::Deadline;
use crate::error::{CoreError, Result};

/// Maximum-bid auction.
pub mod auction;

/// Dead-man's switch.
pub mod dms;

/// Weighted-tally poll.
pub mod poll;

/// Metrics-emitting demo activity.
pub mod prom;

pub(crate) fn require_non_empty(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(CoreError::validation(field, "must not be empty"));
    }
    Ok(())
}

pub(crate) fn require_amount(field: &str, value: f64) -> Result<()> {
    if !value.is_finite() {
        return Err(CoreError::validation(field, "must be a finite number"));
    }
    if value < 0.0 {
        return Err(CoreError::validation(field, "must not be negative"));
    }
    Ok(())
}

pub(crate) fn require_duration(duration_ms: u64) -> Result<()> {
    if duration_ms == 0 {
        return Err(CoreError::validation("duration_ms", "must be greater than zero"));
    }
    Ok(())
}

pub(crate) fn require_webhook(url: &str) -> Result<()> {
    require_non_empty("webhook", url)?;
    let parsed = reqwest::Url::parse(url)
        .map_err(|e| CoreError::validation("webhook", format!("invalid URL: {}", e)))?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(CoreError::validation(
            "webhook",
            format!("unsupported scheme '{}'", other),
        )),
    }
}

/// Deadline for a start request. A missing start time means now.
pub(crate) fn deadline_for(start_time: Option<DateTime<Utc>>, duration_ms: u64) -> Deadline {
    let duration = Duration::from_millis(duration_ms);
    match start_time {
        Some(start_time) => Deadline::from_start(start_time, duration),
        None => Deadline::after(duration),
    }
}
