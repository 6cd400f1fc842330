// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Webhook delivery of final results.
//!
//! A [`Notifier`] performs one delivery attempt. Retrying is not its concern:
//! the registry runs it under [`execute_activity`](crate::retry::execute_activity)
//! with the payload serialized once, so every attempt sends the same bytes.

use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::CONTENT_TYPE;
use serde::Serialize;
use thiserror::Error;

use crate::retry::ActivityContext;

/// A single failed delivery attempt.
#[derive(Debug, Error)]
pub enum NotifyError {
    /// The request never produced a response.
    #[error("failed to reach {url}: {source}")]
    Transport {
        /// Target URL.
        url: String,
        /// Underlying client error.
        #[source]
        source: reqwest::Error,
    },

    /// The endpoint answered with something other than 200.
    #[error("endpoint answered {status}: {body}")]
    BadResponse {
        /// HTTP status code.
        status: u16,
        /// Response body, possibly empty.
        body: String,
    },
}

/// Delivers a serialized payload to a URL.
#[async_trait]
pub trait Notifier: Send + Sync + 'static {
    /// Make one delivery attempt.
    ///
    /// Implementations record a pulse on `ctx.heartbeat()` whenever the
    /// attempt makes progress; an attempt that goes silent is abandoned and
    /// retried.
    async fn deliver(
        &self,
        url: &str,
        payload: &[u8],
        ctx: &ActivityContext,
    ) -> Result<(), NotifyError>;
}

/// POSTs JSON payloads with `reqwest`. Only `200 OK` counts as delivered.
///
/// Pulses are recorded on progress only: when the request goes out, when
/// the response head arrives and for every body chunk. An endpoint that
/// accepts the connection and then goes quiet therefore trips the
/// heartbeat timeout instead of holding the attempt open.
#[derive(Debug, Clone, Default)]
pub struct HttpNotifier {
    client: reqwest::Client,
}

impl HttpNotifier {
    /// Notifier with a default client.
    pub fn new() -> Self {
        Self::default()
    }

    /// Notifier using the given client.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Notifier for HttpNotifier {
    async fn deliver(
        &self,
        url: &str,
        payload: &[u8],
        ctx: &ActivityContext,
    ) -> Result<(), NotifyError> {
        let transport = |source| NotifyError::Transport {
            url: url.to_string(),
            source,
        };

        ctx.heartbeat().record();
        let mut response = self
            .client
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .body(payload.to_vec())
            .send()
            .await
            .map_err(transport)?;
        ctx.heartbeat().record();

        let status = response.status();
        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(transport)? {
            ctx.heartbeat().record();
            if status != StatusCode::OK {
                body.extend_from_slice(&chunk);
            }
        }

        if status == StatusCode::OK {
            return Ok(());
        }

        Err(NotifyError::BadResponse {
            status: status.as_u16(),
            body: String::from_utf8_lossy(&body).into_owned(),
        })
    }
}

/// Where an instance's result delivery stands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum DeliveryStatus {
    /// The instance finished without anything to deliver.
    NotRequired,
    /// The instance is still running or delivery has not started.
    Pending,
    /// An attempt is running.
    InFlight {
        /// Current attempt, starting at 1.
        attempt: u32,
    },
    /// The endpoint accepted the payload.
    Succeeded {
        /// Attempts it took.
        attempts: u32,
    },
    /// Shutdown cancelled delivery before it succeeded.
    Abandoned {
        /// Attempts made before cancellation.
        attempts: u32,
    },
    /// Delivery gave up. Only reachable with a bounded retry policy or an
    /// unserializable payload.
    Failed {
        /// Attempts made.
        attempts: u32,
        /// Last error.
        error: String,
    },
}

impl DeliveryStatus {
    /// Snake-case state name, as serialized under `state`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotRequired => "not_required",
            Self::Pending => "pending",
            Self::InFlight { .. } => "in_flight",
            Self::Succeeded { .. } => "succeeded",
            Self::Abandoned { .. } => "abandoned",
            Self::Failed { .. } => "failed",
        }
    }

    /// Whether no further attempts will be made.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::NotRequired | Self::Succeeded { .. } | Self::Abandoned { .. } | Self::Failed { .. }
        )
    }
}
