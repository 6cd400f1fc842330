// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Vigil server: HTTP routes and a command-line client for the vigil
//! workflow variants.
//!
//! One process hosts one [`Variant`](api::Variant). The `vigil` binary
//! either serves a variant or talks to a running server through
//! [`VigilClient`](client::VigilClient).

pub mod api;
pub mod client;
pub mod config;
pub mod duration;
pub mod error;
pub mod telemetry;

pub use api::{DefaultJsonResponse, StateResponse, Variant, app};
pub use client::{ClientError, VigilClient};
pub use config::{Config, ConfigError, LogFormat};
pub use error::{ApiError, ApiResult};
