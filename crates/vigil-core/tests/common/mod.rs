// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Shared helpers for vigil-core integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use vigil_core::{ActivityContext, Notifier, NotifyError};

/// One captured delivery.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub url: String,
    pub body: serde_json::Value,
}

/// Notifier that records every payload and always succeeds.
#[derive(Debug, Default, Clone)]
pub struct CapturingNotifier {
    deliveries: Arc<Mutex<Vec<Delivery>>>,
}

impl CapturingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deliveries(&self) -> Vec<Delivery> {
        self.deliveries.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for CapturingNotifier {
    async fn deliver(
        &self,
        url: &str,
        payload: &[u8],
        _ctx: &ActivityContext,
    ) -> Result<(), NotifyError> {
        let body = serde_json::from_slice(payload).expect("payload is JSON");
        self.deliveries.lock().unwrap().push(Delivery {
            url: url.to_string(),
            body,
        });
        Ok(())
    }
}
