use crate::backoff::BackoffConfig;
use crate::log_buffer::DEFAULT_CAPACITY;
use crate::transport::TransportKind;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[clap(name = "locker-feed", version, about)]
pub struct Cli {
    /// Path to configuration file
    #[clap(long, default_value = "./config.toml")]
    pub config: PathBuf,

    /// Override log feed endpoint
    #[clap(long)]
    pub endpoint: Option<String>,

    /// Override log feed transport
    #[clap(long, value_enum)]
    pub transport: Option<TransportKind>,

    /// Override REST API base URL
    #[clap(long)]
    pub api_url: Option<String>,

    #[clap(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Follow the live log feed and key counters (default)
    Watch,
    /// Book a key; scanned key codes are read from stdin
    Book {
        #[clap(long)]
        rfid: String,
    },
    /// Return a key by RFID and/or key number
    Return {
        #[clap(long, default_value = "")]
        rfid: String,
        #[clap(long, default_value = "")]
        key_number: String,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub endpoint: String,
    pub api_url: String,
    #[serde(default)]
    pub transport: TransportKind,
    #[serde(default = "default_buffer_capacity")]
    pub buffer_capacity: usize,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_scan_timeout_secs")]
    pub scan_timeout_secs: u64,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub backoff: BackoffConfig,
}

fn default_buffer_capacity() -> usize {
    DEFAULT_CAPACITY
}

fn default_poll_interval_secs() -> u64 {
    30
}

fn default_scan_timeout_secs() -> u64 {
    60
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    pub fn scan_timeout(&self) -> Duration {
        Duration::from_secs(self.scan_timeout_secs)
    }
}

pub fn load_config(cli: &Cli) -> Result<Config> {
    let config_content = fs::read_to_string(&cli.config)
        .with_context(|| format!("Failed to read config file: {:?}", cli.config))?;

    let config = parse_config(&config_content)?;
    Ok(apply_overrides(config, cli))
}

fn parse_config(content: &str) -> Result<Config> {
    toml::from_str(content).context("Failed to parse config file")
}

fn apply_overrides(mut config: Config, cli: &Cli) -> Config {
    if let Some(ref endpoint) = cli.endpoint {
        config.endpoint = endpoint.clone();
    }

    if let Some(transport) = cli.transport {
        config.transport = transport;
    }

    if let Some(ref api_url) = cli.api_url {
        config.api_url = api_url.clone();
    }

    config
}
