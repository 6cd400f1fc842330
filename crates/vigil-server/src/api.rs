// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! HTTP routers, one per workflow variant.
//!
//! Every handler answers with a [`DefaultJsonResponse`] (`{message, error}`);
//! state queries add the typed state under `state`.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Json, Query};
use axum::routing::get;
use axum::Router;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use vigil_core::{InstanceRegistry, RegistryMetrics};

use crate::config::Config;
use crate::error::{ApiError, ApiResult};

pub mod auction;
pub mod dms;
pub mod heart;
pub mod poll;
pub mod prom;

/// Which workflow a server instance hosts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Variant {
    /// Maximum-bid auctions.
    Auction,
    /// Weighted-tally polls.
    Poll,
    /// Dead-man's switches.
    Dms,
    /// The heartbeat watchdog.
    Heart,
    /// The metrics-emitting demo.
    Prom,
}

impl Variant {
    /// Lowercase name used in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Variant::Auction => "auction",
            Variant::Poll => "poll",
            Variant::Dms => "dms",
            Variant::Heart => "heart",
            Variant::Prom => "prom",
        }
    }
}

impl std::fmt::Display for Variant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Body of every response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefaultJsonResponse {
    /// Result text; `"ok"` for plain acknowledgements.
    #[serde(default)]
    pub message: String,
    /// Error text; empty on success.
    #[serde(default)]
    pub error: String,
}

impl DefaultJsonResponse {
    /// Plain acknowledgement.
    pub fn ok() -> Self {
        Self::message("ok")
    }

    /// Success with a message.
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            error: String::new(),
        }
    }

    /// Failure with an error.
    pub fn error(error: impl Into<String>) -> Self {
        Self {
            message: String::new(),
            error: error.into(),
        }
    }
}

/// Body of `GET /get-state`: the message plus the typed state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateResponse<T> {
    /// Human-readable state.
    pub message: String,
    /// Always empty.
    #[serde(default)]
    pub error: String,
    /// Typed state.
    pub state: T,
}

impl<T> StateResponse<T> {
    fn new(message: impl Into<String>, state: T) -> Self {
        Self {
            message: message.into(),
            error: String::new(),
            state,
        }
    }
}

/// Health check.
pub async fn healthz() -> Json<DefaultJsonResponse> {
    Json(DefaultJsonResponse::ok())
}

/// Unwrap a JSON body, turning decode failures into a 400.
fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> ApiResult<T> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| ApiError::BadRequest(rejection.body_text()))
}

/// Unwrap query parameters, turning decode failures into a 400.
fn query_params<T>(params: Result<Query<T>, QueryRejection>) -> ApiResult<T> {
    params
        .map(|Query(params)| params)
        .map_err(|rejection| ApiError::BadRequest(rejection.body_text()))
}

fn registry<A: vigil_core::Aggregate>(
    variant: Variant,
    config: &Config,
    shutdown: &CancellationToken,
) -> InstanceRegistry<A> {
    InstanceRegistry::builder()
        .event_buffer(config.event_buffer)
        .record_retention(config.retention)
        .metrics(RegistryMetrics::global(variant.as_str()))
        .cancellation_token(shutdown.clone())
        .build()
}

/// Build the router for `variant`.
///
/// Cancelling `shutdown` abandons outstanding webhook retries and stops the
/// watchdog and the metrics demo.
pub fn app(variant: Variant, config: &Config, shutdown: CancellationToken) -> Router {
    let router = match variant {
        Variant::Auction => auction::router(registry(variant, config, &shutdown)),
        Variant::Poll => poll::router(registry(variant, config, &shutdown)),
        Variant::Dms => dms::router(registry(variant, config, &shutdown)),
        Variant::Heart => heart::router(heart::HeartState::new(shutdown)),
        Variant::Prom => prom::router(prom::PromState::new(shutdown)),
    };

    router
        .route("/healthz", get(healthz))
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_response_shape() {
        let ok = serde_json::to_value(DefaultJsonResponse::ok()).unwrap();
        assert_eq!(ok, serde_json::json!({"message": "ok", "error": ""}));

        let err = serde_json::to_value(DefaultJsonResponse::error("nope")).unwrap();
        assert_eq!(err, serde_json::json!({"message": "", "error": "nope"}));
    }

    #[test]
    fn test_state_response_decodes_as_default() {
        let body = serde_json::to_string(&StateResponse::new("hi", 3)).unwrap();
        let decoded: DefaultJsonResponse = serde_json::from_str(&body).unwrap();
        assert_eq!(decoded, DefaultJsonResponse::message("hi"));
    }
}
