// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Property tests for the auction and poll aggregates.

use std::collections::BTreeMap;

use proptest::prelude::*;
use vigil_core::Aggregate;
use vigil_core::workflows::auction::{Bid, TopBid};
use vigil_core::workflows::poll::{PollResult, Vote};

const OPTIONS: [&str; 3] = ["x", "y", "z"];

fn bids() -> impl Strategy<Value = Vec<(String, f64)>> {
    prop::collection::vec(("[a-e]", 0.0f64..1_000.0), 0..64)
}

fn votes() -> impl Strategy<Value = Vec<(String, f64)>> {
    // "w" is never a configured option.
    let option = prop::sample::select(vec!["w", "x", "y", "z"]).prop_map(String::from);
    prop::collection::vec((option, 0.0f64..100.0), 0..64)
}

proptest! {
    #[test]
    fn auction_amount_is_running_maximum(bids in bids()) {
        let mut top = TopBid::new("lamp");
        let mut previous = 0.0;
        let mut expected_max = 0.0f64;

        for (bidder, amount) in &bids {
            top = top.apply(Bid::new(bidder.clone(), *amount));
            expected_max = expected_max.max(*amount);

            prop_assert!(top.amount >= previous);
            prop_assert_eq!(top.amount, expected_max);
            previous = top.amount;
        }
        prop_assert_eq!(top.item, "lamp");
    }

    #[test]
    fn auction_leader_is_first_to_reach_maximum(bids in bids()) {
        let top = bids.iter().fold(TopBid::new("lamp"), |top, (bidder, amount)| {
            top.apply(Bid::new(bidder.clone(), *amount))
        });

        let first_max = bids
            .iter()
            .filter(|(_, amount)| *amount > 0.0)
            .fold(None::<&(String, f64)>, |best, bid| match best {
                Some(b) if b.1 >= bid.1 => Some(b),
                _ => Some(bid),
            });

        match first_max {
            Some((bidder, amount)) => {
                prop_assert_eq!(&top.bidder, bidder);
                prop_assert_eq!(top.amount, *amount);
            }
            None => prop_assert_eq!(top.bidder, ""),
        }
    }

    #[test]
    fn poll_weight_is_sum_of_valid_votes(votes in votes()) {
        let poll = votes
            .iter()
            .fold(PollResult::new("lunch", OPTIONS), |poll, (option, amount)| {
                poll.apply(Vote::new(option.clone(), *amount))
            });

        let mut expected: BTreeMap<String, f64> =
            OPTIONS.iter().map(|o| (o.to_string(), 0.0)).collect();
        for (option, amount) in &votes {
            if let Some(weight) = expected.get_mut(option) {
                *weight += amount;
            }
        }

        prop_assert_eq!(poll.votes.len(), OPTIONS.len());
        prop_assert!(!poll.votes.contains_key("w"));
        for (option, weight) in &expected {
            prop_assert!((poll.votes[option] - weight).abs() < 1e-9);
        }
    }
}
