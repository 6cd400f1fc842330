// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Heartbeat watchdog routes.
//!
//! There is a single watchdog per process. It runs until the server's
//! shutdown token is cancelled.

use std::sync::{Arc, OnceLock};

use axum::extract::{Json, State};
use axum::routing::{get, post};
use axum::Router;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::info;
use vigil_core::{CoreError, HeartWorker, Watchdog, WatchdogConfig, WatchdogStats};

use super::{DefaultJsonResponse, StateResponse};
use crate::error::ApiResult;

/// Fixed id of the watchdog instance.
pub const WATCHDOG_ID: &str = "heartbeat-and-continue-workflow";

/// Shared state of the heart routes.
#[derive(Clone, Debug)]
pub struct HeartState {
    config: WatchdogConfig,
    shutdown: CancellationToken,
    stats: Arc<OnceLock<watch::Receiver<WatchdogStats>>>,
}

impl HeartState {
    /// State with the default watchdog settings.
    pub fn new(shutdown: CancellationToken) -> Self {
        Self::with_config(WatchdogConfig::default(), shutdown)
    }

    /// State with custom watchdog settings.
    pub fn with_config(config: WatchdogConfig, shutdown: CancellationToken) -> Self {
        Self {
            config,
            shutdown,
            stats: Arc::new(OnceLock::new()),
        }
    }

    fn already_running() -> CoreError {
        CoreError::InstanceAlreadyExists {
            instance_id: WATCHDOG_ID.to_string(),
        }
    }
}

/// Routes for the heart variant.
pub fn router(state: HeartState) -> Router {
    Router::new()
        .route("/start", post(start))
        .route("/get-state", get(get_state))
        .with_state(state)
}

async fn start(State(state): State<HeartState>) -> ApiResult<Json<DefaultJsonResponse>> {
    if state.stats.get().is_some() {
        return Err(HeartState::already_running().into());
    }

    let watchdog = Watchdog::new(HeartWorker::new(&state.config), state.config.clone());
    state
        .stats
        .set(watchdog.subscribe())
        .map_err(|_| HeartState::already_running())?;

    watchdog.spawn(state.shutdown.clone());
    info!(instance_id = WATCHDOG_ID, "Watchdog launched");
    Ok(Json(DefaultJsonResponse::ok()))
}

async fn get_state(State(state): State<HeartState>) -> ApiResult<Json<StateResponse<WatchdogStats>>> {
    let stats = state
        .stats
        .get()
        .map(|rx| rx.borrow().clone())
        .ok_or_else(|| CoreError::not_found(WATCHDOG_ID))?;

    let message = format!(
        "{} cycles, {} ended with a dead worker",
        stats.cycles, stats.dead_workers
    );
    Ok(Json(StateResponse::new(message, stats)))
}
