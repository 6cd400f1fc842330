// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! OpenTelemetry instruments for instance lifecycle and delivery.
//!
//! Instruments are built from a [`Meter`]. Until the embedding application
//! installs a meter provider the global meter is a no-op, so recording is
//! always safe.
//!
//! | Instrument                 | Kind           | Attributes            |
//! |----------------------------|----------------|-----------------------|
//! | `vigil.instances.started`  | counter        | `variant`             |
//! | `vigil.instances.finished` | counter        | `variant`, `reason`   |
//! | `vigil.instances.live`     | up-down counter| `variant`             |
//! | `vigil.deliveries`         | counter        | `variant`, `outcome`  |

use opentelemetry::KeyValue;
use opentelemetry::metrics::{Counter, Meter, UpDownCounter};

use crate::aggregate::Termination;
use crate::notifier::DeliveryStatus;

/// Instrumentation scope used for the global meter.
pub const METER_NAME: &str = "vigil";

/// Lifecycle and delivery counters for one registry.
#[derive(Clone)]
pub struct RegistryMetrics {
    variant: &'static str,
    started: Counter<u64>,
    finished: Counter<u64>,
    live: UpDownCounter<i64>,
    deliveries: Counter<u64>,
}

impl std::fmt::Debug for RegistryMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryMetrics")
            .field("variant", &self.variant)
            .finish_non_exhaustive()
    }
}

impl RegistryMetrics {
    /// Instruments on `meter`, tagged with `variant`.
    pub fn new(meter: &Meter, variant: &'static str) -> Self {
        Self {
            variant,
            started: meter
                .u64_counter("vigil.instances.started")
                .with_description("Instances started")
                .build(),
            finished: meter
                .u64_counter("vigil.instances.finished")
                .with_description("Instances whose loop exited")
                .build(),
            live: meter
                .i64_up_down_counter("vigil.instances.live")
                .with_description("Instances currently accepting events")
                .build(),
            deliveries: meter
                .u64_counter("vigil.deliveries")
                .with_description("Notification deliveries that settled, by outcome")
                .build(),
        }
    }

    /// Instruments on the global meter.
    pub fn global(variant: &'static str) -> Self {
        Self::new(&opentelemetry::global::meter(METER_NAME), variant)
    }

    /// Label attached to every measurement.
    pub fn variant(&self) -> &'static str {
        self.variant
    }

    pub(crate) fn instance_started(&self) {
        let attributes = [KeyValue::new("variant", self.variant)];
        self.started.add(1, &attributes);
        self.live.add(1, &attributes);
    }

    pub(crate) fn instance_finished(&self, reason: Termination) {
        self.live.add(-1, &[KeyValue::new("variant", self.variant)]);
        self.finished.add(
            1,
            &[
                KeyValue::new("variant", self.variant),
                KeyValue::new("reason", reason.as_str()),
            ],
        );
    }

    pub(crate) fn delivery_settled(&self, status: &DeliveryStatus) {
        self.deliveries.add(
            1,
            &[
                KeyValue::new("variant", self.variant),
                KeyValue::new("outcome", status.as_str()),
            ],
        );
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory meter provider for asserting on recorded measurements.

    use opentelemetry::KeyValue;
    use opentelemetry::metrics::{Meter, MeterProvider as _};
    use opentelemetry_sdk::metrics::data::{AggregatedMetrics, MetricData, ResourceMetrics};
    use opentelemetry_sdk::metrics::{InMemoryMetricExporter, SdkMeterProvider};

    fn has_attribute<'a>(
        mut attributes: impl Iterator<Item = &'a KeyValue>,
        wanted: Option<(&str, &str)>,
    ) -> bool {
        match wanted {
            None => true,
            Some((key, value)) => {
                attributes.any(|kv| kv.key.as_str() == key && kv.value.as_str() == value)
            }
        }
    }

    pub(crate) struct TestMeter {
        provider: SdkMeterProvider,
        exporter: InMemoryMetricExporter,
    }

    impl TestMeter {
        pub(crate) fn new() -> Self {
            let exporter = InMemoryMetricExporter::default();
            let provider = SdkMeterProvider::builder()
                .with_periodic_exporter(exporter.clone())
                .build();
            Self { provider, exporter }
        }

        pub(crate) fn meter(&self) -> Meter {
            self.provider.meter("vigil-test")
        }

        fn collect(&self) -> Option<ResourceMetrics> {
            self.provider.force_flush().unwrap();
            self.exporter.get_finished_metrics().unwrap().pop()
        }

        /// Sum of all data points of an integer sum instrument, optionally
        /// filtered by one attribute.
        pub(crate) fn sum(&self, name: &str, attribute: Option<(&str, &str)>) -> i64 {
            let Some(metrics) = self.collect() else {
                return 0;
            };
            let mut total = 0;
            for scope in metrics.scope_metrics() {
                for metric in scope.metrics().filter(|m| m.name() == name) {
                    match metric.data() {
                        AggregatedMetrics::U64(MetricData::Sum(sum)) => {
                            for point in sum.data_points() {
                                if has_attribute(point.attributes(), attribute) {
                                    total += point.value() as i64;
                                }
                            }
                        }
                        AggregatedMetrics::I64(MetricData::Sum(sum)) => {
                            for point in sum.data_points() {
                                if has_attribute(point.attributes(), attribute) {
                                    total += point.value();
                                }
                            }
                        }
                        _ => {}
                    }
                }
            }
            total
        }

        /// Last value of an `f64` gauge, if it was recorded.
        pub(crate) fn gauge(&self, name: &str) -> Option<f64> {
            let metrics = self.collect()?;
            for scope in metrics.scope_metrics() {
                for metric in scope.metrics().filter(|m| m.name() == name) {
                    if let AggregatedMetrics::F64(MetricData::Gauge(gauge)) = metric.data() {
                        return gauge.data_points().next().map(|point| point.value());
                    }
                }
            }
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::TestMeter;
    use super::*;

    #[test]
    fn test_lifecycle_counters() {
        let test_meter = TestMeter::new();
        let metrics = RegistryMetrics::new(&test_meter.meter(), "auction");

        metrics.instance_started();
        metrics.instance_started();
        metrics.instance_finished(Termination::Timeout);
        metrics.delivery_settled(&DeliveryStatus::Succeeded { attempts: 1 });

        assert_eq!(test_meter.sum("vigil.instances.started", Some(("variant", "auction"))), 2);
        assert_eq!(test_meter.sum("vigil.instances.live", None), 1);
        assert_eq!(test_meter.sum("vigil.instances.finished", Some(("reason", "timeout"))), 1);
        assert_eq!(test_meter.sum("vigil.deliveries", Some(("outcome", "succeeded"))), 1);
        assert_eq!(test_meter.sum("vigil.deliveries", Some(("outcome", "failed"))), 0);
    }

    #[test]
    fn test_global_meter_is_safe_without_provider() {
        let metrics = RegistryMetrics::global("poll");
        metrics.instance_started();
        metrics.instance_finished(Termination::Deactivated);
        assert_eq!(metrics.variant(), "poll");
    }
}
