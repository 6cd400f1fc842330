// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! The poll sums weighted votes per option. Options are fixed at start;
//! votes for anything else are ignored.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{deadline_for, require_amount, require_duration, require_non_empty, require_webhook};
use crate::aggregate::{Aggregate, Termination};
use crate::error::{CoreError, Result};
use crate::registry::InstanceSpec;

/// Instance id for a poll prompt.
pub fn instance_id(prompt: &str) -> String {
    format!("poll: {}", prompt)
}

/// Running tally. Also the notification payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollResult {
    /// The question.
    pub prompt: String,
    /// Accumulated weight per option.
    pub votes: BTreeMap<String, f64>,
}

impl PollResult {
    /// Poll with every option at zero.
    pub fn new<I, S>(prompt: impl Into<String>, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            prompt: prompt.into(),
            votes: options.into_iter().map(|o| (o.into(), 0.0)).collect(),
        }
    }

    /// Options with their weight, highest first. Ties keep option order.
    pub fn ranked(&self) -> Vec<(&str, f64)> {
        let mut ranked: Vec<(&str, f64)> =
            self.votes.iter().map(|(o, v)| (o.as_str(), *v)).collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        ranked
    }

    /// Human-readable results, one option per line.
    pub fn summary(&self) -> String {
        let mut msg = format!("Poll results for \"{}\":\n", self.prompt);
        for (option, votes) in self.ranked() {
            let _ = writeln!(msg, "\t{}: {}", option, votes);
        }
        msg
    }
}

/// A weighted vote.
#[derive(Debug, Clone, PartialEq)]
pub struct Vote {
    /// Chosen option.
    pub option: String,
    /// Weight.
    pub amount: f64,
}

impl Vote {
    /// Create a vote.
    pub fn new(option: impl Into<String>, amount: f64) -> Self {
        Self {
            option: option.into(),
            amount,
        }
    }
}

impl Aggregate for PollResult {
    type Event = Vote;
    type Notification = PollResult;

    // A vote that would overflow the weight is dropped, so the tally always
    // serializes as numbers.
    fn apply(mut self, vote: Vote) -> Self {
        if let Some(weight) = self.votes.get_mut(&vote.option) {
            let next = *weight + vote.amount;
            if next.is_finite() {
                *weight = next;
            }
        }
        self
    }

    fn notification(&self, _reason: Termination) -> Option<PollResult> {
        Some(self.clone())
    }
}

/// Body of `POST /start`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartPollRequest {
    /// When the poll opened. Defaults to now.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    /// How long votes are accepted, in milliseconds.
    pub duration_ms: u64,
    /// The question.
    pub prompt: String,
    /// Allowed options.
    pub options: Vec<String>,
    /// Where to deliver the final tally.
    pub webhook: String,
}

impl StartPollRequest {
    /// Reject malformed requests.
    pub fn validate(&self) -> Result<()> {
        require_non_empty("prompt", &self.prompt)?;
        require_duration(self.duration_ms)?;
        if self.options.is_empty() {
            return Err(CoreError::validation(
                "options",
                "at least one option is required",
            ));
        }
        for option in &self.options {
            require_non_empty("options", option)?;
        }
        require_webhook(&self.webhook)
    }

    /// Instance id this request starts.
    pub fn instance_id(&self) -> String {
        instance_id(&self.prompt)
    }

    /// Instance configuration for this request.
    pub fn into_spec(self) -> InstanceSpec<PollResult> {
        let deadline = deadline_for(self.start_time, self.duration_ms);
        InstanceSpec::new(PollResult::new(self.prompt, self.options), deadline)
            .with_webhook(self.webhook)
    }
}

/// Body of `POST /vote`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoteRequest {
    /// Target poll.
    pub prompt: String,
    /// Chosen option.
    pub option: String,
    /// Weight.
    pub amount: f64,
}

impl VoteRequest {
    /// Reject malformed votes. Unknown options pass; the poll ignores them.
    pub fn validate(&self) -> Result<()> {
        require_non_empty("prompt", &self.prompt)?;
        require_non_empty("option", &self.option)?;
        require_amount("amount", self.amount)
    }

    /// Instance id this vote targets.
    pub fn instance_id(&self) -> String {
        instance_id(&self.prompt)
    }

    /// The domain event.
    pub fn into_event(self) -> Vote {
        Vote::new(self.option, self.amount)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tally() {
        let poll = PollResult::new("lunch", ["x", "y"])
            .apply(Vote::new("x", 3.0))
            .apply(Vote::new("y", 1.0))
            .apply(Vote::new("x", 2.0));
        assert_eq!(poll.votes["x"], 5.0);
        assert_eq!(poll.votes["y"], 1.0);
    }

    #[test]
    fn test_unknown_option_ignored() {
        let poll = PollResult::new("lunch", ["x", "y"]);
        let after = poll.clone().apply(Vote::new("z", 10.0));
        assert_eq!(after, poll);
        assert!(!after.votes.contains_key("z"));
    }

    #[test]
    fn test_overflowing_vote_is_dropped() {
        let poll = PollResult::new("p", ["x"])
            .apply(Vote::new("x", 1e308))
            .apply(Vote::new("x", 1e308));
        assert_eq!(poll.votes["x"], 1e308);

        let body = serde_json::to_string(&poll).unwrap();
        let decoded: PollResult = serde_json::from_str(&body).unwrap();
        assert!(decoded.votes["x"].is_finite());

        // Smaller votes still count afterwards.
        let poll = PollResult::new("p", ["x"])
            .apply(Vote::new("x", f64::MAX))
            .apply(Vote::new("x", 1.0));
        assert!(poll.votes["x"].is_finite());
    }

    #[test]
    fn test_summary_sorted_by_votes() {
        let poll = PollResult::new("lunch", ["pizza", "salad", "tacos"])
            .apply(Vote::new("salad", 1.0))
            .apply(Vote::new("tacos", 2.5));
        assert_eq!(
            poll.summary(),
            "Poll results for \"lunch\":\n\ttacos: 2.5\n\tsalad: 1\n\tpizza: 0\n"
        );
    }

    #[test]
    fn test_start_request_validation() {
        let valid = StartPollRequest {
            start_time: None,
            duration_ms: 1_000,
            prompt: "lunch".to_string(),
            options: vec!["x".to_string(), "y".to_string()],
            webhook: "http://localhost:8080/handle-result".to_string(),
        };
        assert!(valid.validate().is_ok());
        assert_eq!(valid.instance_id(), "poll: lunch");

        let no_options = StartPollRequest {
            options: vec![],
            ..valid.clone()
        };
        assert!(no_options.validate().is_err());

        let blank_option = StartPollRequest {
            options: vec!["x".to_string(), "".to_string()],
            ..valid
        };
        assert!(blank_option.validate().is_err());
    }

    #[test]
    fn test_vote_request_validation() {
        let vote = VoteRequest {
            prompt: "lunch".to_string(),
            option: "x".to_string(),
            amount: 1.0,
        };
        assert!(vote.validate().is_ok());

        let negative = VoteRequest {
            amount: -1.0,
            ..vote.clone()
        };
        assert!(negative.validate().is_err());

        let no_option = VoteRequest {
            option: String::new(),
            ..vote
        };
        assert!(no_option.validate().is_err());
    }
}
