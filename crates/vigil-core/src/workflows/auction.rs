// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! The auction keeps the single highest bid seen before its deadline and
//! delivers it to the webhook once the auction closes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{deadline_for, require_amount, require_duration, require_non_empty, require_webhook};
use crate::aggregate::{Aggregate, Termination};
use crate::error::Result;
use crate::registry::InstanceSpec;

/// Instance id for an auction item.
pub fn instance_id(item: &str) -> String {
    format!("auction: {}", item)
}

/// Highest bid so far. Also the notification payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopBid {
    /// Item being auctioned.
    pub item: String,
    /// Current leader; empty until the first positive bid.
    pub bidder: String,
    /// Current maximum; starts at zero.
    pub amount: f64,
}

impl TopBid {
    /// Empty auction for `item`.
    pub fn new(item: impl Into<String>) -> Self {
        Self {
            item: item.into(),
            bidder: String::new(),
            amount: 0.0,
        }
    }

    /// Human-readable state line.
    pub fn summary(&self) -> String {
        format!("top bid by {} for {:.6}", self.bidder, self.amount)
    }
}

/// A bid on a running auction.
#[derive(Debug, Clone, PartialEq)]
pub struct Bid {
    /// Who is bidding.
    pub bidder: String,
    /// Offered amount.
    pub amount: f64,
}

impl Bid {
    /// Create a bid.
    pub fn new(bidder: impl Into<String>, amount: f64) -> Self {
        Self {
            bidder: bidder.into(),
            amount,
        }
    }
}

impl Aggregate for TopBid {
    type Event = Bid;
    type Notification = TopBid;

    // Strictly greater: an equal bid keeps the earlier bidder.
    fn apply(self, bid: Bid) -> Self {
        if bid.amount > self.amount {
            TopBid {
                item: self.item,
                bidder: bid.bidder,
                amount: bid.amount,
            }
        } else {
            self
        }
    }

    fn notification(&self, _reason: Termination) -> Option<TopBid> {
        Some(self.clone())
    }
}

/// Body of `POST /start`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartAuctionRequest {
    /// When the auction opened. Defaults to now.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    /// How long bids are accepted, in milliseconds.
    pub duration_ms: u64,
    /// Item being auctioned.
    pub item: String,
    /// Informational only; does not affect which bid wins.
    #[serde(default)]
    pub reserve_price: f64,
    /// Where to deliver the winning bid.
    pub webhook: String,
}

impl StartAuctionRequest {
    /// Reject malformed requests.
    pub fn validate(&self) -> Result<()> {
        require_non_empty("item", &self.item)?;
        require_duration(self.duration_ms)?;
        require_amount("reserve_price", self.reserve_price)?;
        require_webhook(&self.webhook)
    }

    /// Instance id this request starts.
    pub fn instance_id(&self) -> String {
        instance_id(&self.item)
    }

    /// Instance configuration for this request.
    pub fn into_spec(self) -> InstanceSpec<TopBid> {
        let deadline = deadline_for(self.start_time, self.duration_ms);
        InstanceSpec::new(TopBid::new(self.item), deadline).with_webhook(self.webhook)
    }
}

/// Body of `POST /bid`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BidRequest {
    /// Target item.
    pub item: String,
    /// Who is bidding.
    pub bidder: String,
    /// Offered amount.
    pub amount: f64,
}

impl BidRequest {
    /// Reject malformed bids.
    pub fn validate(&self) -> Result<()> {
        require_non_empty("item", &self.item)?;
        require_non_empty("bidder", &self.bidder)?;
        require_amount("amount", self.amount)
    }

    /// Instance id this bid targets.
    pub fn instance_id(&self) -> String {
        instance_id(&self.item)
    }

    /// The domain event.
    pub fn into_event(self) -> Bid {
        Bid::new(self.bidder, self.amount)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(bids: &[(&str, f64)]) -> TopBid {
        bids.iter()
            .fold(TopBid::new("lamp"), |top, (who, amount)| top.apply(Bid::new(*who, *amount)))
    }

    #[test]
    fn test_highest_bid_wins() {
        let top = run(&[("A", 10.0), ("B", 5.0), ("C", 15.0)]);
        assert_eq!(top.bidder, "C");
        assert_eq!(top.amount, 15.0);
        assert_eq!(top.item, "lamp");
    }

    #[test]
    fn test_tie_keeps_first_bidder() {
        let top = run(&[("A", 10.0), ("B", 10.0)]);
        assert_eq!(top.bidder, "A");
    }

    #[test]
    fn test_zero_bid_does_not_lead() {
        let top = run(&[("A", 0.0)]);
        assert_eq!(top.bidder, "");
        assert_eq!(top.amount, 0.0);
    }

    #[test]
    fn test_summary() {
        let top = run(&[("C", 15.0)]);
        assert_eq!(top.summary(), "top bid by C for 15.000000");
    }

    #[test]
    fn test_notification_payload_shape() {
        let top = run(&[("C", 15.0)]);
        let payload = serde_json::to_value(top.notification(Termination::Timeout)).unwrap();
        assert_eq!(
            payload,
            serde_json::json!({"item": "lamp", "bidder": "C", "amount": 15.0})
        );
    }

    #[test]
    fn test_start_request_validation() {
        let valid = StartAuctionRequest {
            start_time: None,
            duration_ms: 60_000,
            item: "lamp".to_string(),
            reserve_price: 5.0,
            webhook: "http://localhost:8080/handle-result".to_string(),
        };
        assert!(valid.validate().is_ok());
        assert_eq!(valid.instance_id(), "auction: lamp");

        let mut missing_item = valid.clone();
        missing_item.item = " ".to_string();
        assert!(missing_item.validate().is_err());

        let mut zero_duration = valid.clone();
        zero_duration.duration_ms = 0;
        assert!(zero_duration.validate().is_err());

        let mut negative_reserve = valid;
        negative_reserve.reserve_price = -1.0;
        assert!(negative_reserve.validate().is_err());
    }

    #[test]
    fn test_bid_request_validation() {
        let bid = BidRequest {
            item: "lamp".to_string(),
            bidder: "alice".to_string(),
            amount: 3.0,
        };
        assert!(bid.validate().is_ok());
        assert_eq!(bid.clone().into_event(), Bid::new("alice", 3.0));

        let negative = BidRequest {
            amount: -3.0,
            ..bid.clone()
        };
        assert_eq!(negative.validate().unwrap_err().error_code(), "VALIDATION_ERROR");

        let anonymous = BidRequest {
            bidder: String::new(),
            ..bid
        };
        assert!(anonymous.validate().is_err());
    }

    #[test]
    fn test_start_request_defaults() {
        let request: StartAuctionRequest = serde_json::from_str(
            r#"{"duration_ms": 1000, "item": "lamp", "webhook": "http://h/x"}"#,
        )
        .unwrap();
        assert_eq!(request.start_time, None);
        assert_eq!(request.reserve_price, 0.0);
    }
}
