// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! `vigil`: serve a workflow variant over HTTP, or drive a running server.
//!
//! ```text
//! vigil serve auction
//! vigil auction start --item lamp --duration 30s
//! vigil auction bid --item lamp --bidder alice --amount 12.5
//! vigil auction state --item lamp
//! vigil prom start
//! ```

use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use vigil_core::workflows::auction::{BidRequest, StartAuctionRequest};
use vigil_core::workflows::dms::StartSwitchRequest;
use vigil_core::workflows::poll::{StartPollRequest, VoteRequest};
use vigil_server::duration::parse_duration;
use vigil_server::{Config, LogFormat, Variant, VigilClient, app, telemetry};

const RESULT_WEBHOOK: &str = "http://localhost:8080/handle-result";
const SWITCH_WEBHOOK: &str = "http://localhost:8080/webhook";

/// Time-bounded auctions, polls, dead-man's switches and a heartbeat watchdog.
#[derive(Parser)]
#[command(name = "vigil", version, about)]
struct Cli {
    /// Server to talk to.
    #[arg(
        long,
        global = true,
        env = "VIGIL_ENDPOINT",
        default_value = "http://localhost:8080"
    )]
    endpoint: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve one workflow variant over HTTP.
    Serve {
        /// Variant to host.
        #[arg(value_enum)]
        variant: Variant,
    },
    /// Auction commands.
    #[command(subcommand)]
    Auction(AuctionCommand),
    /// Poll commands.
    #[command(subcommand)]
    Poll(PollCommand),
    /// Dead-man's switch commands.
    #[command(subcommand)]
    Dms(DmsCommand),
    /// Heartbeat watchdog commands.
    #[command(subcommand)]
    Heart(HeartCommand),
    /// Metrics demo commands.
    #[command(subcommand)]
    Prom(PromCommand),
}

#[derive(Args)]
struct Window {
    /// How long the instance stays open, e.g. `30s` or `1m30s`.
    #[arg(long, short = 'd', value_parser = parse_duration)]
    duration: Duration,
}

#[derive(Subcommand)]
enum AuctionCommand {
    /// Open an auction.
    Start {
        #[arg(long, short = 'i')]
        item: String,
        #[command(flatten)]
        window: Window,
        #[arg(long, default_value_t = 0.0)]
        reserve_price: f64,
        #[arg(long, default_value = RESULT_WEBHOOK)]
        webhook: String,
    },
    /// Place a bid.
    Bid {
        #[arg(long, short = 'i')]
        item: String,
        #[arg(long, short = 'b')]
        bidder: String,
        #[arg(long, short = 'a')]
        amount: f64,
    },
    /// Print the current top bid.
    State {
        #[arg(long, short = 'i')]
        item: String,
    },
}

#[derive(Subcommand)]
enum PollCommand {
    /// Open a poll.
    Start {
        #[arg(long, short = 'p')]
        prompt: String,
        /// Allowed option; repeat for each.
        #[arg(long = "option", short = 'o', required = true)]
        options: Vec<String>,
        #[command(flatten)]
        window: Window,
        #[arg(long, default_value = RESULT_WEBHOOK)]
        webhook: String,
    },
    /// Cast a weighted vote.
    Vote {
        #[arg(long, short = 'p')]
        prompt: String,
        #[arg(long, short = 'o')]
        option: String,
        #[arg(long, short = 'a', default_value_t = 1.0)]
        amount: f64,
    },
    /// Print the current tally.
    State {
        #[arg(long, short = 'p')]
        prompt: String,
    },
}

#[derive(Subcommand)]
enum DmsCommand {
    /// Arm a switch.
    Start {
        #[arg(long)]
        id: String,
        #[arg(long, short = 'm')]
        message: String,
        #[command(flatten)]
        window: Window,
        #[arg(long, default_value = SWITCH_WEBHOOK)]
        webhook: String,
    },
    /// Deactivate a switch before it fires.
    Deactivate {
        #[arg(long)]
        id: String,
    },
    /// Print the switch state.
    State {
        #[arg(long)]
        id: String,
    },
}

#[derive(Subcommand)]
enum HeartCommand {
    /// Launch the watchdog.
    Start,
}

#[derive(Subcommand)]
enum PromCommand {
    /// Launch the metrics demo.
    Start,
    /// Print how many ticks the demo has emitted.
    State,
}

fn client(endpoint: String) -> VigilClient {
    telemetry::init_tracing(LogFormat::Text);
    VigilClient::new(endpoint)
}

fn duration_ms(window: &Window) -> u64 {
    u64::try_from(window.duration.as_millis()).unwrap_or(u64::MAX)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file (from crate directory or parent directories)
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    match cli.command {
        Command::Serve { variant } => serve(variant).await,
        Command::Auction(command) => auction(&client(cli.endpoint), command).await,
        Command::Poll(command) => poll(&client(cli.endpoint), command).await,
        Command::Dms(command) => dms(&client(cli.endpoint), command).await,
        Command::Heart(HeartCommand::Start) => Ok(client(cli.endpoint).start_heart().await?),
        Command::Prom(PromCommand::Start) => Ok(client(cli.endpoint).start_prom().await?),
        Command::Prom(PromCommand::State) => {
            println!("{}", client(cli.endpoint).prom_state().await?);
            Ok(())
        }
    }
}

async fn serve(variant: Variant) -> Result<()> {
    let config = Config::from_env().context("configuration error")?;
    telemetry::init_tracing(config.log_format);
    let metrics = telemetry::init_metrics();

    info!(
        variant = %variant,
        http_addr = %config.http_addr,
        event_buffer = config.event_buffer,
        record_ttl = ?config.retention.ttl,
        max_records = config.retention.max_records,
        metrics = metrics.is_exporting(),
        "Starting vigil server"
    );

    let shutdown = CancellationToken::new();
    let router = app(variant, &config, shutdown.clone());

    let listener = tokio::net::TcpListener::bind(config.http_addr)
        .await
        .with_context(|| format!("could not bind {}", config.http_addr))?;
    info!(addr = %config.http_addr, "Listening");

    let signal = shutdown.clone();
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {}", e);
            }
            info!("Shutting down...");
            signal.cancel();
        })
        .await?;

    // Covers the server exiting without the signal firing.
    shutdown.cancel();
    drop(metrics);
    info!("Shutdown complete");
    Ok(())
}

async fn auction(client: &VigilClient, command: AuctionCommand) -> Result<()> {
    match command {
        AuctionCommand::Start {
            item,
            window,
            reserve_price,
            webhook,
        } => {
            let request = StartAuctionRequest {
                start_time: Some(Utc::now()),
                duration_ms: duration_ms(&window),
                item,
                reserve_price,
                webhook,
            };
            client.start_auction(&request).await?;
        }
        AuctionCommand::Bid {
            item,
            bidder,
            amount,
        } => {
            client
                .bid(&BidRequest {
                    item,
                    bidder,
                    amount,
                })
                .await?;
        }
        AuctionCommand::State { item } => {
            println!("{}", client.auction_state(&item).await?);
        }
    }
    Ok(())
}

async fn poll(client: &VigilClient, command: PollCommand) -> Result<()> {
    match command {
        PollCommand::Start {
            prompt,
            options,
            window,
            webhook,
        } => {
            let request = StartPollRequest {
                start_time: Some(Utc::now()),
                duration_ms: duration_ms(&window),
                prompt,
                options,
                webhook,
            };
            client.start_poll(&request).await?;
        }
        PollCommand::Vote {
            prompt,
            option,
            amount,
        } => {
            client
                .vote(&VoteRequest {
                    prompt,
                    option,
                    amount,
                })
                .await?;
        }
        PollCommand::State { prompt } => {
            // The tally already ends with a newline.
            print!("{}", client.poll_state(&prompt).await?);
        }
    }
    Ok(())
}

async fn dms(client: &VigilClient, command: DmsCommand) -> Result<()> {
    match command {
        DmsCommand::Start {
            id,
            message,
            window,
            webhook,
        } => {
            let request = StartSwitchRequest {
                id,
                start_time: Some(Utc::now()),
                duration_ms: duration_ms(&window),
                message,
                webhook,
            };
            client.start_switch(&request).await?;
        }
        DmsCommand::Deactivate { id } => client.deactivate(&id).await?,
        DmsCommand::State { id } => {
            println!("{}", client.switch_state(&id).await?);
        }
    }
    Ok(())
}
