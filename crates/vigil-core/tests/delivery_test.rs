// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Webhook delivery against a real HTTP endpoint.
//!
//! These run on real time with millisecond backoff so that the mock server's
//! I/O is not raced by an auto-advancing paused clock.

use std::sync::Arc;
use std::time::Duration;

use vigil_core::workflows::auction::{Bid, TopBid};
use vigil_core::{
    ActivityOptions, Deadline, DeliveryStatus, HttpNotifier, InstanceRegistry, InstanceSpec,
    RetryPolicy,
};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fast_retries() -> ActivityOptions {
    ActivityOptions::default().with_retry_policy(RetryPolicy::new(
        Duration::from_millis(10),
        5.0,
        Duration::from_millis(100),
        0,
    ))
}

#[tokio::test]
async fn test_retries_until_200_with_identical_payload() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/handle-result"))
        .respond_with(ResponseTemplate::new(500).set_body_string("down"))
        .up_to_n_times(3)
        .expect(3)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/handle-result"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let registry = InstanceRegistry::<TopBid>::builder()
        .notifier(Arc::new(HttpNotifier::new()))
        .delivery_options(fast_retries())
        .build();

    let id = "auction: lamp";
    let spec = InstanceSpec::new(TopBid::new("lamp"), Deadline::after(Duration::from_millis(200)))
        .with_webhook(format!("{}/handle-result", server.uri()));
    let handle = registry.start(id, spec).unwrap();

    registry.send_event(id, Bid::new("A", 10.0)).await.unwrap();
    registry.send_event(id, Bid::new("C", 15.0)).await.unwrap();

    let outcome = tokio::time::timeout(Duration::from_secs(10), handle)
        .await
        .expect("delivery should settle")
        .unwrap();
    assert_eq!(outcome.delivery, DeliveryStatus::Succeeded { attempts: 4 });
    assert_eq!(
        registry.delivery_status(id).unwrap(),
        DeliveryStatus::Succeeded { attempts: 4 }
    );

    let expected = serde_json::to_vec(&outcome.aggregate).unwrap();
    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 4);
    for request in &requests {
        assert_eq!(request.body, expected, "every attempt sends the same bytes");
    }
    let body: serde_json::Value = serde_json::from_slice(&requests[3].body).unwrap();
    assert_eq!(body["bidder"], "C");
    assert_eq!(body["amount"], 15.0);
}

#[tokio::test]
async fn test_shutdown_abandons_unreachable_endpoint() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let registry = InstanceRegistry::<TopBid>::builder()
        .delivery_options(fast_retries())
        .build();
    let spec = InstanceSpec::new(TopBid::new("vase"), Deadline::after(Duration::from_millis(50)))
        .with_webhook(server.uri());
    let handle = registry.start("auction: vase", spec).unwrap();

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(matches!(
        registry.delivery_status("auction: vase").unwrap(),
        DeliveryStatus::InFlight { .. }
    ));

    registry.shutdown();
    let outcome = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("shutdown should stop retries")
        .unwrap();
    match outcome.delivery {
        DeliveryStatus::Abandoned { attempts } => assert!(attempts >= 2),
        other => panic!("expected Abandoned, got {:?}", other),
    }
}
