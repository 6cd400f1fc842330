// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Tracing subscriber and OpenTelemetry meter provider setup.
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: log filter (default: info for the vigil crates)
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP gRPC endpoint; metrics are only
//!   exported when set
//! - `OTEL_SERVICE_NAME`: service name (default: "vigil")

use opentelemetry_otlp::{MetricExporter, WithExportConfig};
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::metrics::SdkMeterProvider;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::LogFormat;

const DEFAULT_DIRECTIVES: &str = "vigil_core=info,vigil_server=info,vigil=info,tower_http=info";

/// Filter from `RUST_LOG`, falling back to info for this crate family.
pub fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVES))
}

/// Install the global subscriber.
pub fn init_tracing(format: LogFormat) {
    let builder = tracing_subscriber::fmt().with_env_filter(env_filter());
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

/// Keeps the meter provider alive and flushes pending metrics on drop.
#[derive(Debug, Default)]
pub struct MetricsGuard {
    provider: Option<SdkMeterProvider>,
}

impl MetricsGuard {
    /// Whether metrics are exported.
    pub fn is_exporting(&self) -> bool {
        self.provider.is_some()
    }
}

impl Drop for MetricsGuard {
    fn drop(&mut self) {
        if let Some(provider) = self.provider.take()
            && let Err(e) = provider.shutdown()
        {
            warn!(error = ?e, "Failed to flush metrics");
        }
    }
}

/// Install the global meter provider when an OTLP endpoint is configured.
///
/// Must run before any router is built: instruments bind to the provider
/// that is global when they are created.
pub fn init_metrics() -> MetricsGuard {
    let Some(endpoint) = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT")
        .ok()
        .filter(|endpoint| !endpoint.is_empty())
    else {
        return MetricsGuard::default();
    };
    let service_name = std::env::var("OTEL_SERVICE_NAME").unwrap_or_else(|_| "vigil".to_string());

    let exporter = match MetricExporter::builder()
        .with_tonic()
        .with_endpoint(&endpoint)
        .build()
    {
        Ok(exporter) => exporter,
        Err(e) => {
            warn!(endpoint = %endpoint, error = ?e, "Failed to create OTLP metric exporter");
            return MetricsGuard::default();
        }
    };

    let provider = SdkMeterProvider::builder()
        .with_resource(Resource::builder().with_service_name(service_name).build())
        .with_periodic_exporter(exporter)
        .build();
    opentelemetry::global::set_meter_provider(provider.clone());

    info!(endpoint = %endpoint, "Exporting metrics over OTLP");
    MetricsGuard {
        provider: Some(provider),
    }
}
