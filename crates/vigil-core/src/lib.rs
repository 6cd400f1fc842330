// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Vigil Core - Deadline-bounded durable instances
//!
//! This crate runs long-lived logical instances (one per auction item, poll
//! prompt or dead-man's-switch id) that fold a stream of typed events into an
//! aggregate, stop at a fixed deadline or on an early-termination request, and
//! then deliver the final result to a webhook until the endpoint accepts it.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Transport (vigil-server)                            │
//! │        POST /start    POST /bid|/vote|/deactivate    GET /get-state      │
//! └─────────────────────────────────────────────────────────────────────────┘
//!           │ start                 │ send_event / terminate      │ query
//!           ▼                       ▼                             ▼
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    InstanceRegistry<A> (this crate)                      │
//! │           one live entry per instance id, per workflow variant           │
//! └─────────────────────────────────────────────────────────────────────────┘
//!           │ spawns                                              ▲ watch
//!           ▼                                                     │
//! ┌──────────────────┐  token  ┌──────────────────────────────────┴──────────┐
//! │  Deadline racer  │────────►│                Instance loop                 │
//! └──────────────────┘         │  select { event, deadline, terminate }      │
//!                              └──────────────────────┬──────────────────────┘
//!                                                     │ final aggregate
//!                                                     ▼
//!                              ┌─────────────────────────────────────────────┐
//!                              │   Notifier under execute_activity           │
//!                              │   (retry forever, heartbeat per attempt)    │
//!                              └─────────────────────────────────────────────┘
//! ```
//!
//! # Instance State Machine
//!
//! ```text
//!        start                deadline | terminate
//!   ─────────────► RUNNING ─────────────────────────► FINISHED
//!                  │    ▲                              (unaddressable,
//!            event │    │ apply                         delivery runs)
//!                  └────┘
//! ```
//!
//! Termination is only ever observed through the loop's single selection
//! point. Queries read the latest aggregate from a `watch` channel and never
//! go through the event channel.
//!
//! # Modules
//!
//! - [`aggregate`]: the [`Aggregate`](aggregate::Aggregate) contract and termination reasons
//! - [`workflows`]: auction, poll and dead-man's-switch aggregates, their start requests and the prom metrics demo
//! - [`deadline`]: fixed deadlines and the one-shot deadline racer
//! - [`instance`]: the instance loop
//! - [`registry`]: start/send/query/terminate against live instances
//! - [`retry`]: retry policies and the attempt executor
//! - [`heartbeat`]: liveness pulses for long-running attempts
//! - [`notifier`]: webhook delivery
//! - [`watchdog`]: heartbeat-supervised worker that restarts from scratch
//! - [`metrics`]: OpenTelemetry counters for instance lifecycle and delivery

#![deny(missing_docs)]

/// Aggregate contract shared by all workflow variants.
pub mod aggregate;

/// Fixed deadlines and the deadline racer task.
pub mod deadline;

/// Error types with stable error codes.
pub mod error;

/// Liveness pulses and stall detection.
pub mod heartbeat;

/// The per-instance selection loop.
pub mod instance;

/// OpenTelemetry instruments.
pub mod metrics;

/// Webhook notifier and delivery status.
pub mod notifier;

/// In-process substrate: live instance table and lifecycle ledger.
pub mod registry;

/// Retry policy and attempt executor.
pub mod retry;

/// Supervisor that restarts a heartbeat-emitting worker forever.
pub mod watchdog;

/// Concrete workflow variants.
pub mod workflows;

pub use aggregate::{Aggregate, Termination};
pub use deadline::Deadline;
pub use error::{CoreError, Result};
pub use heartbeat::Heartbeat;
pub use instance::{InstanceLoop, InstanceSnapshot, InstanceStatus};
pub use metrics::RegistryMetrics;
pub use notifier::{DeliveryStatus, HttpNotifier, Notifier, NotifyError};
pub use registry::{
    InstanceOutcome, InstanceRecord, InstanceRegistry, InstanceSpec, RecordRetention,
};
pub use retry::{
    ActivityContext, ActivityError, ActivityOptions, AttemptFailure, RetryPolicy, execute_activity,
};
pub use watchdog::{
    CycleOutcome, HeartWorker, Supervised, Watchdog, WatchdogConfig, WatchdogStats, WorkerError,
};
