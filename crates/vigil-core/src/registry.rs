// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! In-process substrate for one workflow variant.
//!
//! [`InstanceRegistry`] owns the table of live instances (at most one per id)
//! and a ledger of lifecycle and delivery status for every instance it has
//! started. Starting an instance arms its deadline racer, spawns its loop and,
//! once the loop exits, removes the live entry and delivers the notification
//! under the configured [`ActivityOptions`].
//!
//! # Example
//!
//! ```rust,ignore
//! use std::time::Duration;
//! use vigil_core::workflows::auction::{Bid, TopBid};
//! use vigil_core::{Deadline, InstanceRegistry, InstanceSpec};
//!
//! let registry = InstanceRegistry::<TopBid>::builder().build();
//! let spec = InstanceSpec::new(TopBid::new("lamp"), Deadline::after(Duration::from_secs(60)))
//!     .with_webhook("http://localhost:8080/handle-result");
//! let handle = registry.start("auction: lamp", spec)?;
//! registry.send_event("auction: lamp", Bid::new("alice", 10.0)).await?;
//! let outcome = handle.await?;
//! ```

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::Serialize;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::aggregate::{Aggregate, Termination};
use crate::deadline::{Deadline, spawn_racer};
use crate::error::{CoreError, Result};
use crate::instance::{InstanceLoop, InstanceSnapshot, InstanceStatus};
use crate::metrics::RegistryMetrics;
use crate::notifier::{DeliveryStatus, HttpNotifier, Notifier};
use crate::retry::{ActivityError, ActivityOptions, execute_activity};

/// Default capacity of each instance's event channel.
pub const DEFAULT_EVENT_BUFFER: usize = 1024;

/// Default time a settled record stays in the ledger.
pub const DEFAULT_RECORD_TTL: Duration = Duration::from_secs(3600);

/// Default cap on settled records kept in the ledger.
pub const DEFAULT_MAX_RECORDS: usize = 10_000;

/// How long finished instances stay visible in the ledger.
///
/// A record becomes eligible for eviction once its instance has finished
/// and delivery has settled. Records of live instances and of deliveries
/// still retrying are never evicted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordRetention {
    /// Evict a settled record this long after delivery settled. `None`
    /// keeps records until the count cap pushes them out.
    pub ttl: Option<Duration>,
    /// Keep at most this many settled records; the oldest go first.
    pub max_records: usize,
}

impl Default for RecordRetention {
    fn default() -> Self {
        Self {
            ttl: Some(DEFAULT_RECORD_TTL),
            max_records: DEFAULT_MAX_RECORDS,
        }
    }
}

impl RecordRetention {
    /// Set the time-to-live of settled records.
    pub fn with_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.ttl = ttl;
        self
    }

    /// Set the cap on settled records.
    pub fn with_max_records(mut self, max_records: usize) -> Self {
        self.max_records = max_records;
        self
    }
}

/// Configuration for a new instance.
#[derive(Debug, Clone)]
pub struct InstanceSpec<A> {
    /// Initial aggregate.
    pub aggregate: A,
    /// Fixed deadline.
    pub deadline: Deadline,
    /// Where to deliver the notification. `None` skips delivery.
    pub webhook: Option<String>,
    /// Whether the instance accepts early termination.
    pub early_termination: bool,
}

impl<A> InstanceSpec<A> {
    /// Spec with no webhook and no early-termination gate.
    pub fn new(aggregate: A, deadline: Deadline) -> Self {
        Self {
            aggregate,
            deadline,
            webhook: None,
            early_termination: false,
        }
    }

    /// Deliver the notification to `url`.
    pub fn with_webhook(mut self, url: impl Into<String>) -> Self {
        self.webhook = Some(url.into());
        self
    }

    /// Accept [`InstanceRegistry::terminate`] for this instance.
    pub fn with_early_termination(mut self) -> Self {
        self.early_termination = true;
        self
    }
}

/// What an instance ended with. Yielded by the handle returned from
/// [`InstanceRegistry::start`] once delivery has settled.
#[derive(Debug, Clone)]
pub struct InstanceOutcome<A> {
    /// Instance id.
    pub instance_id: String,
    /// Why the loop exited.
    pub reason: Termination,
    /// Final aggregate.
    pub aggregate: A,
    /// Final delivery status.
    pub delivery: DeliveryStatus,
}

/// Ledger entry for an instance, live or finished.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstanceRecord {
    /// Instance id.
    pub instance_id: String,
    /// Lifecycle state.
    pub status: InstanceStatus,
    /// When the instance was started.
    pub started_at: DateTime<Utc>,
    /// Fixed deadline.
    pub deadline: DateTime<Utc>,
    /// Why the instance finished, once it has.
    pub termination: Option<Termination>,
    /// Delivery progress.
    pub delivery: DeliveryStatus,
    #[serde(skip)]
    generation: u64,
}

struct LiveInstance<A: Aggregate> {
    generation: u64,
    events: mpsc::Sender<A::Event>,
    terminate: Option<mpsc::Sender<()>>,
    snapshot: watch::Receiver<InstanceSnapshot<A>>,
}

struct Inner<A: Aggregate> {
    live: DashMap<String, LiveInstance<A>>,
    records: DashMap<String, InstanceRecord>,
    next_generation: AtomicU64,
    notifier: Arc<dyn Notifier>,
    delivery: ActivityOptions,
    event_buffer: usize,
    retention: RecordRetention,
    settled: Mutex<VecDeque<(String, u64)>>,
    metrics: RegistryMetrics,
    cancel: CancellationToken,
}

/// Builder for an [`InstanceRegistry`].
pub struct InstanceRegistryBuilder<A> {
    notifier: Option<Arc<dyn Notifier>>,
    delivery: ActivityOptions,
    event_buffer: usize,
    retention: RecordRetention,
    metrics: Option<RegistryMetrics>,
    cancel: Option<CancellationToken>,
    _aggregate: std::marker::PhantomData<fn() -> A>,
}

impl<A> std::fmt::Debug for InstanceRegistryBuilder<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstanceRegistryBuilder")
            .field("notifier", &self.notifier.as_ref().map(|_| "..."))
            .field("delivery", &self.delivery)
            .field("event_buffer", &self.event_buffer)
            .field("retention", &self.retention)
            .field("metrics", &self.metrics)
            .field("cancel", &self.cancel)
            .finish()
    }
}

impl<A> Default for InstanceRegistryBuilder<A> {
    fn default() -> Self {
        Self {
            notifier: None,
            delivery: ActivityOptions::default(),
            event_buffer: DEFAULT_EVENT_BUFFER,
            retention: RecordRetention::default(),
            metrics: None,
            cancel: None,
            _aggregate: std::marker::PhantomData,
        }
    }
}

impl<A: Aggregate> InstanceRegistryBuilder<A> {
    /// Set the notifier.
    ///
    /// Default: [`HttpNotifier::new`]
    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Set the execution limits for notification delivery.
    ///
    /// Default: [`ActivityOptions::default`] (retry forever, 1s x5 up to 100s)
    pub fn delivery_options(mut self, options: ActivityOptions) -> Self {
        self.delivery = options;
        self
    }

    /// Set the per-instance event channel capacity. Clamped to at least 1.
    ///
    /// Default: [`DEFAULT_EVENT_BUFFER`]
    pub fn event_buffer(mut self, capacity: usize) -> Self {
        self.event_buffer = capacity.max(1);
        self
    }

    /// Bound the ledger of finished instances.
    ///
    /// Default: [`RecordRetention::default`] (one hour, 10 000 records)
    pub fn record_retention(mut self, retention: RecordRetention) -> Self {
        self.retention = retention;
        self
    }

    /// Record lifecycle and delivery measurements on these instruments.
    ///
    /// Default: [`RegistryMetrics::global`], labelled with the aggregate's
    /// type name
    pub fn metrics(mut self, metrics: RegistryMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Share a cancellation token with the embedding application.
    ///
    /// Cancelling it has the same effect as [`InstanceRegistry::shutdown`].
    pub fn cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Build the registry.
    pub fn build(self) -> InstanceRegistry<A> {
        let notifier = self
            .notifier
            .unwrap_or_else(|| Arc::new(HttpNotifier::new()));
        let metrics = self.metrics.unwrap_or_else(|| {
            let type_name = std::any::type_name::<A>();
            RegistryMetrics::global(type_name.rsplit("::").next().unwrap_or(type_name))
        });

        InstanceRegistry {
            inner: Arc::new(Inner {
                live: DashMap::new(),
                records: DashMap::new(),
                next_generation: AtomicU64::new(1),
                notifier,
                delivery: self.delivery,
                event_buffer: self.event_buffer,
                retention: self.retention,
                settled: Mutex::new(VecDeque::new()),
                metrics,
                cancel: self.cancel.unwrap_or_default(),
            }),
        }
    }
}

/// Live instances of one aggregate type. Cheap to clone.
pub struct InstanceRegistry<A: Aggregate> {
    inner: Arc<Inner<A>>,
}

impl<A: Aggregate> Clone for InstanceRegistry<A> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<A: Aggregate> std::fmt::Debug for InstanceRegistry<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstanceRegistry")
            .field("live", &self.inner.live.len())
            .field("records", &self.inner.records.len())
            .field("shutdown", &self.inner.cancel.is_cancelled())
            .finish()
    }
}

impl<A: Aggregate> InstanceRegistry<A> {
    /// Create a new builder.
    pub fn builder() -> InstanceRegistryBuilder<A> {
        InstanceRegistryBuilder::default()
    }

    /// Start an instance.
    ///
    /// Fails with [`CoreError::InstanceAlreadyExists`] while another instance
    /// with the same id is live. The handle resolves after the loop has
    /// exited and delivery has settled.
    pub fn start(
        &self,
        instance_id: impl Into<String>,
        spec: InstanceSpec<A>,
    ) -> Result<JoinHandle<InstanceOutcome<A>>> {
        let instance_id = instance_id.into();
        if instance_id.trim().is_empty() {
            return Err(CoreError::validation("id", "must not be empty"));
        }

        let vacant = match self.inner.live.entry(instance_id.clone()) {
            Entry::Occupied(_) => {
                return Err(CoreError::InstanceAlreadyExists { instance_id });
            }
            Entry::Vacant(vacant) => vacant,
        };

        let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);
        let (events_tx, events_rx) = mpsc::channel(self.inner.event_buffer);
        let (terminate_tx, terminate_rx) = if spec.early_termination {
            let (tx, rx) = mpsc::channel(1);
            (Some(tx), Some(rx))
        } else {
            (None, None)
        };

        let deadline_rx = spawn_racer(&instance_id, spec.deadline);
        let (instance_loop, snapshot) = InstanceLoop::new(
            instance_id.clone(),
            spec.aggregate,
            events_rx,
            deadline_rx,
            terminate_rx,
        );

        vacant.insert(LiveInstance {
            generation,
            events: events_tx,
            terminate: terminate_tx,
            snapshot,
        });

        self.inner.records.insert(
            instance_id.clone(),
            InstanceRecord {
                instance_id: instance_id.clone(),
                status: InstanceStatus::Running,
                started_at: Utc::now(),
                deadline: spec.deadline.at(),
                termination: None,
                delivery: DeliveryStatus::Pending,
                generation,
            },
        );

        self.inner.metrics.instance_started();
        info!(
            instance_id = %instance_id,
            deadline = %spec.deadline.at(),
            early_termination = spec.early_termination,
            "Instance started"
        );

        let inner = self.inner.clone();
        let webhook = spec.webhook;
        Ok(tokio::spawn(async move {
            let (aggregate, reason) = instance_loop.run().await;
            inner.retire(&instance_id, generation, reason);
            let delivery = inner
                .deliver(&instance_id, generation, &aggregate, reason, webhook.as_deref())
                .await;
            inner.settle(&instance_id, generation);

            InstanceOutcome {
                instance_id,
                reason,
                aggregate,
                delivery,
            }
        }))
    }

    /// Route a domain event to a live instance.
    ///
    /// Events from one caller are applied in the order they were sent.
    pub async fn send_event(&self, instance_id: &str, event: A::Event) -> Result<()> {
        let events = self
            .inner
            .live
            .get(instance_id)
            .map(|live| live.events.clone())
            .ok_or_else(|| CoreError::not_found(instance_id))?;

        // The loop drops its receiver on exit.
        events
            .send(event)
            .await
            .map_err(|_| CoreError::not_found(instance_id))
    }

    /// Request early termination.
    ///
    /// Repeated requests before the loop observes the first are absorbed.
    pub fn terminate(&self, instance_id: &str) -> Result<()> {
        let gate = self
            .inner
            .live
            .get(instance_id)
            .map(|live| live.terminate.clone())
            .ok_or_else(|| CoreError::not_found(instance_id))?;

        let Some(gate) = gate else {
            return Err(CoreError::EarlyTerminationUnsupported {
                instance_id: instance_id.to_string(),
            });
        };

        match gate.try_send(()) {
            Ok(()) | Err(TrySendError::Full(())) => Ok(()),
            Err(TrySendError::Closed(())) => Err(CoreError::not_found(instance_id)),
        }
    }

    /// Current aggregate of a live instance.
    pub fn query(&self, instance_id: &str) -> Result<A> {
        self.snapshot(instance_id).map(|s| s.aggregate)
    }

    /// Latest published snapshot of a live instance.
    pub fn snapshot(&self, instance_id: &str) -> Result<InstanceSnapshot<A>> {
        self.inner
            .live
            .get(instance_id)
            .map(|live| live.snapshot.borrow().clone())
            .ok_or_else(|| CoreError::not_found(instance_id))
    }

    /// Ledger entry for the most recent instance with this id, live or
    /// finished. Settled records are evicted per [`RecordRetention`].
    pub fn record(&self, instance_id: &str) -> Result<InstanceRecord> {
        self.inner
            .records
            .get(instance_id)
            .map(|record| record.clone())
            .ok_or_else(|| CoreError::not_found(instance_id))
    }

    /// Lifecycle state of the most recent instance with this id.
    pub fn status(&self, instance_id: &str) -> Result<InstanceStatus> {
        self.record(instance_id).map(|r| r.status)
    }

    /// Delivery progress of the most recent instance with this id.
    pub fn delivery_status(&self, instance_id: &str) -> Result<DeliveryStatus> {
        self.record(instance_id).map(|r| r.delivery)
    }

    /// All ledger entries, ordered by id.
    pub fn list(&self) -> Vec<InstanceRecord> {
        let mut records: Vec<InstanceRecord> = self
            .inner
            .records
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        records.sort_by(|a, b| a.instance_id.cmp(&b.instance_id));
        records
    }

    /// Number of live instances.
    pub fn live_count(&self) -> usize {
        self.inner.live.len()
    }

    /// Stop outstanding delivery retries.
    ///
    /// Live instances keep running until their deadline; their deliveries
    /// are abandoned immediately.
    pub fn shutdown(&self) {
        if !self.inner.cancel.is_cancelled() {
            info!(live = self.inner.live.len(), "Registry shutting down");
            self.inner.cancel.cancel();
        }
    }

    /// Whether [`shutdown`](Self::shutdown) has been called.
    pub fn is_shutdown(&self) -> bool {
        self.inner.cancel.is_cancelled()
    }
}

impl<A: Aggregate> Inner<A> {
    /// Make the instance unaddressable and mark it finished.
    fn retire(&self, instance_id: &str, generation: u64, reason: Termination) {
        self.live
            .remove_if(instance_id, |_, live| live.generation == generation);
        self.metrics.instance_finished(reason);
        self.update_record(instance_id, generation, |record| {
            record.status = InstanceStatus::Finished;
            record.termination = Some(reason);
        });
    }

    /// Queue a settled record for eviction.
    fn settle(self: &Arc<Self>, instance_id: &str, generation: u64) {
        let overflow: Vec<(String, u64)> = {
            let mut settled = self.settled.lock().unwrap_or_else(PoisonError::into_inner);
            settled.push_back((instance_id.to_string(), generation));
            let excess = settled.len().saturating_sub(self.retention.max_records);
            settled.drain(..excess).collect()
        };
        for (id, evicted) in overflow {
            self.forget(&id, evicted);
        }

        let Some(ttl) = self.retention.ttl else {
            return;
        };
        let inner = Arc::clone(self);
        let instance_id = instance_id.to_string();
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(ttl) => inner.forget(&instance_id, generation),
                _ = inner.cancel.cancelled() => {}
            }
        });
    }

    /// Drop a record unless the id has been restarted since.
    fn forget(&self, instance_id: &str, generation: u64) {
        if self
            .records
            .remove_if(instance_id, |_, record| record.generation == generation)
            .is_some()
        {
            debug!(instance_id = %instance_id, "Record evicted");
        }
    }

    fn update_record(&self, instance_id: &str, generation: u64, f: impl FnOnce(&mut InstanceRecord)) {
        if let Some(mut record) = self.records.get_mut(instance_id) {
            if record.generation == generation {
                f(&mut record);
            }
        }
    }

    async fn deliver(
        &self,
        instance_id: &str,
        generation: u64,
        aggregate: &A,
        reason: Termination,
        webhook: Option<&str>,
    ) -> DeliveryStatus {
        let status = match (webhook, aggregate.notification(reason)) {
            (Some(url), Some(notification)) => match serde_json::to_vec(&notification) {
                Ok(bytes) => self.deliver_payload(instance_id, generation, url, bytes.into()).await,
                Err(e) => {
                    error!(instance_id = %instance_id, error = %e, "Failed to serialize notification");
                    DeliveryStatus::Failed {
                        attempts: 0,
                        error: CoreError::from(e).to_string(),
                    }
                }
            },
            _ => DeliveryStatus::NotRequired,
        };

        self.metrics.delivery_settled(&status);
        let recorded = status.clone();
        self.update_record(instance_id, generation, |record| record.delivery = recorded);
        status
    }

    async fn deliver_payload(
        &self,
        instance_id: &str,
        generation: u64,
        url: &str,
        payload: Arc<[u8]>,
    ) -> DeliveryStatus {
        let result = execute_activity("deliver_notification", &self.delivery, &self.cancel, |ctx| {
            self.update_record(instance_id, generation, |record| {
                record.delivery = DeliveryStatus::InFlight {
                    attempt: ctx.attempt(),
                };
            });
            let notifier = self.notifier.clone();
            let payload = payload.clone();
            async move {
                notifier.deliver(url, &payload, &ctx).await?;
                Ok::<_, crate::notifier::NotifyError>(ctx.attempt())
            }
        })
        .await;

        match result {
            Ok(attempts) => {
                info!(instance_id = %instance_id, url = %url, attempts, "Notification delivered");
                DeliveryStatus::Succeeded { attempts }
            }
            Err(ActivityError::Cancelled { attempts }) => {
                warn!(instance_id = %instance_id, url = %url, attempts, "Notification abandoned on shutdown");
                DeliveryStatus::Abandoned { attempts }
            }
            Err(ActivityError::AttemptsExhausted { attempts, last }) => {
                error!(instance_id = %instance_id, url = %url, attempts, error = %last, "Notification failed");
                DeliveryStatus::Failed {
                    attempts,
                    error: last.to_string(),
                }
            }
        }
    }
}
