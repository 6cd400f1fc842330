// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! HTTP client for a running vigil server.
//!
//! Requests are validated locally before they are sent, so a malformed
//! command never reaches the server.

use reqwest::{Client, StatusCode};
use serde::Serialize;
use thiserror::Error;
use tracing::debug;
use vigil_core::CoreError;
use vigil_core::workflows::auction::{BidRequest, StartAuctionRequest};
use vigil_core::workflows::dms::StartSwitchRequest;
use vigil_core::workflows::poll::{StartPollRequest, VoteRequest};

use crate::api::DefaultJsonResponse;

/// Errors returned by [`VigilClient`].
#[derive(Error, Debug)]
pub enum ClientError {
    /// The request was rejected before it was sent.
    #[error(transparent)]
    Invalid(#[from] CoreError),

    /// The server could not be reached or the body could not be read.
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The server answered with a non-200 status.
    #[error("bad response code ({status}): {error}")]
    Server {
        /// HTTP status.
        status: u16,
        /// The `error` field of the body, or the raw body.
        error: String,
    },
}

/// Client for one server endpoint.
#[derive(Debug, Clone)]
pub struct VigilClient {
    http: Client,
    endpoint: String,
}

impl VigilClient {
    /// Client for `endpoint`, e.g. `http://localhost:8080`.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self::with_client(Client::new(), endpoint)
    }

    /// Client sharing an existing connection pool.
    pub fn with_client(http: Client, endpoint: impl Into<String>) -> Self {
        let endpoint = endpoint.into().trim_end_matches('/').to_string();
        Self { http, endpoint }
    }

    /// Base URL requests are sent to.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// `POST /start` on an auction server.
    pub async fn start_auction(&self, request: &StartAuctionRequest) -> Result<(), ClientError> {
        request.validate()?;
        self.post_json("/start", request).await
    }

    /// `POST /bid`.
    pub async fn bid(&self, request: &BidRequest) -> Result<(), ClientError> {
        request.validate()?;
        self.post_json("/bid", request).await
    }

    /// Current top bid as a state line.
    pub async fn auction_state(&self, item: &str) -> Result<String, ClientError> {
        self.get_message("/get-state", &[("item", item)]).await
    }

    /// `POST /start` on a poll server.
    pub async fn start_poll(&self, request: &StartPollRequest) -> Result<(), ClientError> {
        request.validate()?;
        self.post_json("/start", request).await
    }

    /// `POST /vote`.
    pub async fn vote(&self, request: &VoteRequest) -> Result<(), ClientError> {
        request.validate()?;
        self.post_json("/vote", request).await
    }

    /// Current tally as a state line.
    pub async fn poll_state(&self, prompt: &str) -> Result<String, ClientError> {
        self.get_message("/get-state", &[("prompt", prompt)]).await
    }

    /// `POST /start` on a dead-man's-switch server.
    pub async fn start_switch(&self, request: &StartSwitchRequest) -> Result<(), ClientError> {
        request.validate()?;
        self.post_json("/start", request).await
    }

    /// `POST /deactivate?id=`.
    pub async fn deactivate(&self, id: &str) -> Result<(), ClientError> {
        if id.trim().is_empty() {
            return Err(CoreError::validation("id", "must not be empty").into());
        }
        let response = self
            .http
            .post(self.url("/deactivate"))
            .query(&[("id", id)])
            .send()
            .await?;
        Self::expect_ok(response).await.map(|_| ())
    }

    /// Switch state line.
    pub async fn switch_state(&self, id: &str) -> Result<String, ClientError> {
        self.get_message("/get-state", &[("id", id)]).await
    }

    /// `POST /start` on a heart server.
    pub async fn start_heart(&self) -> Result<(), ClientError> {
        let response = self.http.post(self.url("/start")).send().await?;
        Self::expect_ok(response).await.map(|_| ())
    }

    /// `POST /start` on a prom server.
    pub async fn start_prom(&self) -> Result<(), ClientError> {
        let response = self.http.post(self.url("/start")).send().await?;
        Self::expect_ok(response).await.map(|_| ())
    }

    /// Metrics demo progress line.
    pub async fn prom_state(&self) -> Result<String, ClientError> {
        self.get_message("/get-state", &[]).await
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.endpoint, path)
    }

    async fn post_json<T: Serialize + ?Sized>(&self, path: &str, body: &T) -> Result<(), ClientError> {
        debug!(endpoint = %self.endpoint, path, "POST");
        let response = self.http.post(self.url(path)).json(body).send().await?;
        Self::expect_ok(response).await.map(|_| ())
    }

    async fn get_message(&self, path: &str, query: &[(&str, &str)]) -> Result<String, ClientError> {
        debug!(endpoint = %self.endpoint, path, "GET");
        let response = self.http.get(self.url(path)).query(query).send().await?;
        let body = Self::expect_ok(response).await?;
        let decoded: DefaultJsonResponse =
            serde_json::from_str(&body).map_err(|e| ClientError::Server {
                status: StatusCode::OK.as_u16(),
                error: format!("could not parse message: {}: {}", e, body),
            })?;
        Ok(decoded.message)
    }

    async fn expect_ok(response: reqwest::Response) -> Result<String, ClientError> {
        let status = response.status();
        let body = response.text().await?;
        if status == StatusCode::OK {
            return Ok(body);
        }

        let error = serde_json::from_str::<DefaultJsonResponse>(&body)
            .ok()
            .map(|decoded| decoded.error)
            .filter(|error| !error.is_empty())
            .unwrap_or(body);
        Err(ClientError::Server {
            status: status.as_u16(),
            error,
        })
    }
}
