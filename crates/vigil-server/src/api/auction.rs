// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Auction routes.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Json, Query, State};
use axum::routing::{get, post};
use axum::Router;
use serde::Deserialize;
use tracing::info;
use vigil_core::workflows::auction::{self, BidRequest, StartAuctionRequest, TopBid};
use vigil_core::{InstanceRecord, InstanceRegistry};

use super::{DefaultJsonResponse, StateResponse, json_body, query_params};
use crate::error::ApiResult;

type Registry = InstanceRegistry<TopBid>;

/// Query of `GET /get-state`.
#[derive(Debug, Deserialize)]
pub struct ItemQuery {
    /// Auction item.
    pub item: String,
}

/// Routes for the auction variant.
pub fn router(registry: Registry) -> Router {
    Router::new()
        .route("/start", post(start))
        .route("/bid", post(bid))
        .route("/get-state", get(get_state))
        .route("/handle-result", post(handle_result))
        .route("/instances", get(instances))
        .with_state(registry)
}

async fn start(
    State(registry): State<Registry>,
    payload: Result<Json<StartAuctionRequest>, JsonRejection>,
) -> ApiResult<Json<DefaultJsonResponse>> {
    let request = json_body(payload)?;
    request.validate()?;

    let id = request.instance_id();
    registry.start(&id, request.into_spec())?;
    info!(instance_id = %id, "Auction started");
    Ok(Json(DefaultJsonResponse::ok()))
}

async fn bid(
    State(registry): State<Registry>,
    payload: Result<Json<BidRequest>, JsonRejection>,
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
    params: Result<Query<ItemQuery>, QueryRejection>,
) -> ApiResult<Json<StateResponse<TopBid>>> {
    let ItemQuery { item } = query_params(params)?;
    let top = registry.query(&auction::instance_id(&item))?;
    Ok(Json(StateResponse::new(top.summary(), top)))
}

/// Sample receiver for the winning bid.
async fn handle_result(
    payload: Result<Json<TopBid>, JsonRejection>,
) -> ApiResult<Json<DefaultJsonResponse>> {
    let result = json_body(payload)?;
    info!(item = %result.item, bidder = %result.bidder, amount = result.amount, "Auction result received");
    Ok(Json(DefaultJsonResponse::ok()))
}

async fn instances(State(registry): State<Registry>) -> Json<Vec<InstanceRecord>> {
    Json(registry.list())
}
