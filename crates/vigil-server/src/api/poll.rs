// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Poll routes.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Json, Query, State};
use axum::routing::{get, post};
use axum::Router;
use serde::Deserialize;
use tracing::info;
use vigil_core::workflows::poll::{self, PollResult, StartPollRequest, VoteRequest};
use vigil_core::{InstanceRecord, InstanceRegistry};

use super::{DefaultJsonResponse, StateResponse, json_body, query_params};
use crate::error::ApiResult;

type Registry = InstanceRegistry<PollResult>;

/// Query of `GET /get-state`.
#[derive(Debug, Deserialize)]
pub struct PromptQuery {
    /// Poll prompt.
    pub prompt: String,
}

/// Routes for the poll variant.
pub fn router(registry: Registry) -> Router {
    Router::new()
        .route("/start", post(start))
        .route("/vote", post(vote))
        .route("/get-state", get(get_state))
        .route("/handle-result", post(handle_result))
        .route("/instances", get(instances))
        .with_state(registry)
}

async fn start(
    State(registry): State<Registry>,
    payload: Result<Json<StartPollRequest>, JsonRejection>,
) -> ApiResult<Json<DefaultJsonResponse>> {
    let request = json_body(payload)?;
    request.validate()?;

    let id = request.instance_id();
    registry.start(&id, request.into_spec())?;
    info!(instance_id = %id, "Poll started");
    Ok(Json(DefaultJsonResponse::ok()))
}

async fn vote(
    State(registry): State<Registry>,
    payload: Result<Json<VoteRequest>, JsonRejection>,
) -> ApiResult<Json<DefaultJsonResponse>> {
    let request = json_body(payload)?;
    request.validate()?;

    registry
        .send_event(&request.instance_id(), request.into_event())
        .await?;
    Ok(Json(DefaultJsonResponse::ok()))
}

async fn get_state(
    State(registry): State<Registry>,
    params: Result<Query<PromptQuery>, QueryRejection>,
) -> ApiResult<Json<StateResponse<PollResult>>> {
    let PromptQuery { prompt } = query_params(params)?;
    let result = registry.query(&poll::instance_id(&prompt))?;
    Ok(Json(StateResponse::new(result.summary(), result)))
}

/// Sample receiver for the final tally.
async fn handle_result(
    payload: Result<Json<PollResult>, JsonRejection>,
) -> ApiResult<Json<DefaultJsonResponse>> {
    let result = json_body(payload)?;
    info!(prompt = %result.prompt, "Poll result received:\n{}", result.summary());
    Ok(Json(DefaultJsonResponse::ok()))
}

async fn instances(State(registry): State<Registry>) -> Json<Vec<InstanceRecord>> {
    Json(registry.list())
}
