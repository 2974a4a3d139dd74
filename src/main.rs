mod api;
mod backoff;
mod booking;
mod config;
mod error;
mod key_poller;
mod log_buffer;
mod log_client;
mod log_entry;
mod log_view;
mod projector;
mod socket_transport;
mod sse_transport;
mod transport;
mod types;

use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info, LevelFilter};
use simple_logger::SimpleLogger;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;

use crate::api::LockerApi;
use crate::config::{Command, Config};
use crate::log_buffer::LogBuffer;
use crate::log_client::{LogClient, SubscriptionId};
use crate::transport::TransportKind;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let cli = config::Cli::parse();

    // Load configuration
    let config = config::load_config(&cli)?;

    let level: LevelFilter = config
        .log_level
        .parse()
        .with_context(|| format!("Invalid log level: {}", config.log_level))?;
    SimpleLogger::new()
        .with_level(level)
        .env()
        .init()
        .context("Failed to initialise logger")?;

    info!("Starting locker-feed");

    let http = reqwest::Client::new();
    let api = LockerApi::new(http.clone(), &config.api_url);

    match cli.command.clone().unwrap_or(Command::Watch) {
        Command::Watch => watch_feed(&config, http, api).await,
        Command::Book { rfid } => book_key(&config, api, &rfid).await,
        Command::Return { rfid, key_number } => return_key(&config, api, &rfid, &key_number).await,
    }
}

fn feed_client(config: &Config, http: reqwest::Client) -> LogClient {
    match config.transport {
        TransportKind::Sse => LogClient::new(
            &config.endpoint,
            sse_transport::SseTransport::new(http),
            config.backoff.clone(),
        ),
        TransportKind::Socket => LogClient::new(
            &config.endpoint,
            socket_transport::SocketTransport,
            config.backoff.clone(),
        ),
    }
}

async fn watch_feed(config: &Config, http: reqwest::Client, api: LockerApi) -> Result<()> {
    let buffer = LogBuffer::new(config.buffer_capacity);
    let feed = feed_client(config, http);
    feed.attach_buffer(&buffer);
    let mut printer = Some(follow(&feed));
    let mut states = feed.watch_state();
    feed.start();

    let (counts_tx, counts_rx) = watch::channel(None);
    let mut poller = tokio::spawn(key_poller::run(api, config.poll_interval(), counts_tx));

    info!("Console commands: show, clear, counts, state, quiet, follow");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let mut states_open = true;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                break;
            }
            _ = &mut poller => {
                error!("Key poller terminated unexpectedly");
                break;
            }
            changed = states.changed(), if states_open => match changed {
                Ok(()) => info!("Log feed {}", *states.borrow_and_update()),
                Err(_) => states_open = false,
            },
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(line)) => {
                    console_command(line.trim(), &buffer, &feed, &mut printer, &counts_rx)
                }
                Ok(None) => stdin_open = false,
                Err(e) => {
                    error!("Failed to read console input: {}", e);
                    stdin_open = false;
                }
            },
        }
    }

    feed.teardown();
    poller.abort();
    Ok(())
}

/// Echo every new entry to stdout.
fn follow(feed: &LogClient) -> SubscriptionId {
    feed.subscribe(|entry| println!("{}", log_view::render_line(entry)))
}

fn console_command(
    command: &str,
    buffer: &LogBuffer,
    feed: &LogClient,
    printer: &mut Option<SubscriptionId>,
    counts: &watch::Receiver<Option<types::CountsSnapshot>>,
) {
    match command {
        "" => {}
        "show" => {
            for line in log_view::render(&buffer.snapshot()) {
                println!("{}", line);
            }
        }
        "clear" => {
            if buffer.is_empty() {
                info!("Log view already empty");
            } else {
                buffer.clear();
                info!("Log view cleared");
            }
        }
        "quiet" => match printer.take() {
            Some(id) => {
                feed.unsubscribe(id);
                info!("Live output paused; entries are still buffered");
            }
            None => info!("Live output already paused"),
        },
        "follow" => {
            if printer.is_none() {
                *printer = Some(follow(feed));
                info!("Live output resumed");
            }
        }
        "counts" => match *counts.borrow() {
            Some(snapshot) => println!("{} (as of {})", snapshot.counts, snapshot.fetched_at),
            None => println!("Key counts not fetched yet"),
        },
        "state" => println!(
            "Log feed {} ({}/{} entries buffered)",
            feed.state(),
            buffer.len(),
            buffer.capacity()
        ),
        other => println!("Unknown command: {}", other),
    }
}

async fn book_key(config: &Config, api: LockerApi, rfid: &str) -> Result<()> {
    let (scans, scan_rx) = booking::scan_channel();
    let mut flow = booking::BookingFlow::new(api, scan_rx, config.scan_timeout());

    // A QR scanner in keyboard mode types each code as one line on stdin.
    let scanner = tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if line.trim().is_empty() {
                continue;
            }
            if scans.submit(line).await.is_err() {
                break;
            }
        }
    });

    let result = flow.book(rfid).await;
    scanner.abort();

    let reply = result.context("Unable to book key")?;
    println!("Success: {}", reply.message);
    Ok(())
}

async fn return_key(config: &Config, api: LockerApi, rfid: &str, key_number: &str) -> Result<()> {
    let (_scans, scan_rx) = booking::scan_channel();
    let flow = booking::BookingFlow::new(api, scan_rx, config.scan_timeout());

    let reply = flow
        .return_key(rfid, key_number)
        .await
        .context("Unable to return key")?;
    println!("Success: {}", reply.message);
    Ok(())
}
