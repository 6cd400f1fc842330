// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Dead-man's switch routes.
//!
//! A switch stays observable after it has fired or been deactivated: once
//! the instance has left the live set, `GET /get-state` answers from the
//! registry ledger instead.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Json, Query, State};
use axum::routing::{get, post};
use axum::Router;
use serde::Deserialize;
use tracing::info;
use vigil_core::workflows::dms::{self, StartSwitchRequest, Switch, SwitchStatus, TimeoutPayload};
use vigil_core::{CoreError, InstanceRecord, InstanceRegistry};

use super::{DefaultJsonResponse, StateResponse, json_body, query_params};
use crate::error::ApiResult;

type Registry = InstanceRegistry<Switch>;

/// Query of `POST /deactivate` and `GET /get-state`.
#[derive(Debug, Deserialize)]
pub struct IdQuery {
    /// Switch id.
    pub id: String,
}

/// Routes for the dead-man's-switch variant.
pub fn router(registry: Registry) -> Router {
    Router::new()
        .route("/start", post(start))
        .route("/deactivate", post(deactivate))
        .route("/get-state", get(get_state))
        .route("/webhook", post(webhook))
        .route("/instances", get(instances))
        .with_state(registry)
}

async fn start(
    State(registry): State<Registry>,
    payload: Result<Json<StartSwitchRequest>, JsonRejection>,
) -> ApiResult<Json<DefaultJsonResponse>> {
    let request = json_body(payload)?;
    request.validate()?;

    let id = request.instance_id();
    registry.start(&id, request.into_spec())?;
    info!(instance_id = %id, "Switch armed");
    Ok(Json(DefaultJsonResponse::ok()))
}

async fn deactivate(
    State(registry): State<Registry>,
    params: Result<Query<IdQuery>, QueryRejection>,
) -> ApiResult<Json<DefaultJsonResponse>> {
    let IdQuery { id } = query_params(params)?;
    let instance_id = dms::instance_id(&id);
    registry.terminate(&instance_id)?;
    info!(instance_id = %instance_id, "Switch deactivation requested");
    Ok(Json(DefaultJsonResponse::ok()))
}

async fn get_state(
    State(registry): State<Registry>,
    params: Result<Query<IdQuery>, QueryRejection>,
) -> ApiResult<Json<StateResponse<SwitchStatus>>> {
    let IdQuery { id } = query_params(params)?;
    let status = switch_status(&registry, &id)?;
    Ok(Json(StateResponse::new(status.message.clone(), status)))
}

fn switch_status(registry: &Registry, id: &str) -> Result<SwitchStatus, CoreError> {
    let instance_id = dms::instance_id(id);
    match registry.query(&instance_id) {
        Ok(switch) => Ok(switch.status()),
        Err(CoreError::InstanceNotFound { .. }) => {
            let record = registry.record(&instance_id)?;
            record
                .termination
                .map(|reason| SwitchStatus::finished(id, reason))
                .ok_or_else(|| CoreError::not_found(instance_id))
        }
        Err(e) => Err(e),
    }
}

/// Sample receiver for a fired switch.
async fn webhook(
    payload: Result<Json<TimeoutPayload>, JsonRejection>,
) -> ApiResult<Json<DefaultJsonResponse>> {
    let fired = json_body(payload)?;
    info!(id = %fired.id, message = %fired.message, "Switch fired");
    Ok(Json(DefaultJsonResponse::ok()))
}

async fn instances(State(registry): State<Registry>) -> Json<Vec<InstanceRecord>> {
    Json(registry.list())
}
