// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Metrics demo routes.
//!
//! At most one demo runs at a time; a finished demo can be started again.

use std::sync::{Arc, Mutex, PoisonError};

use axum::extract::{Json, State};
use axum::routing::{get, post};
use axum::Router;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::info;
use vigil_core::CoreError;
use vigil_core::workflows::prom::{INSTANCE_ID, PromConfig, PromStats, PromWorkflow};

use super::{DefaultJsonResponse, StateResponse};
use crate::error::ApiResult;

/// Shared state of the prom routes.
#[derive(Clone, Debug)]
pub struct PromState {
    config: PromConfig,
    shutdown: CancellationToken,
    stats: Arc<Mutex<Option<watch::Receiver<PromStats>>>>,
}

impl PromState {
    /// State with the default demo settings.
    pub fn new(shutdown: CancellationToken) -> Self {
        Self::with_config(PromConfig::default(), shutdown)
    }

    /// State with custom demo settings.
    pub fn with_config(config: PromConfig, shutdown: CancellationToken) -> Self {
        Self {
            config,
            shutdown,
            stats: Arc::new(Mutex::new(None)),
        }
    }

    fn current(&self) -> Option<PromStats> {
        self.stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|rx| *rx.borrow())
    }
}

/// Routes for the prom variant.
pub fn router(state: PromState) -> Router {
    Router::new()
        .route("/start", post(start))
        .route("/get-state", get(get_state))
        .with_state(state)
}

async fn start(State(state): State<PromState>) -> ApiResult<Json<DefaultJsonResponse>> {
    let mut slot = state.stats.lock().unwrap_or_else(PoisonError::into_inner);
    if slot.as_ref().is_some_and(|rx| !rx.borrow().finished) {
        return Err(CoreError::InstanceAlreadyExists {
            instance_id: INSTANCE_ID.to_string(),
        }
        .into());
    }

    let demo = PromWorkflow::with_global_meter(state.config.clone());
    *slot = Some(demo.spawn(state.shutdown.clone()));
    info!(instance_id = INSTANCE_ID, "Metrics demo launched");
    Ok(Json(DefaultJsonResponse::ok()))
}

async fn get_state(State(state): State<PromState>) -> ApiResult<Json<StateResponse<PromStats>>> {
    let stats = state
        .current()
        .ok_or_else(|| CoreError::not_found(INSTANCE_ID))?;

    let message = if stats.finished {
        format!("finished after {} ticks", stats.ticks)
    } else {
        format!("{} ticks emitted", stats.ticks)
    };
    Ok(Json(StateResponse::new(message, stats)))
}
