//! CLI module for cloudlet-broker
//!
//! Subcommands:
//! - `cloudlet-broker serve` - Run the Tier1 broker
//! - `cloudlet-broker matchers` - List matcher stages and configured pipelines
//! - `cloudlet-broker cloudlets` - List the cloudlets a running broker knows

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use uuid::Uuid;

mod commands;
mod display;

pub use commands::*;
pub use display::*;

#[derive(Parser, Debug)]
#[command(name = "cloudlet-broker")]
#[command(about = "Tier1 edge broker - match deployments to the best available cloudlet")]
#[command(version)]
pub struct Cli {
    /// Enable verbose logging output (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to config file (default: <config dir>/cloudlet-broker/config.yaml)
    #[arg(long, global = true, env = "CLOUDLET_BROKER_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the broker: Tier1 API plus expiry and reporting jobs
    Serve(ServeArgs),

    /// List available matcher stages and the configured pipelines
    Matchers,

    /// List cloudlets known to a running broker
    Cloudlets(CloudletsArgs),
}

/// Arguments for the serve command. Flags override the config file.
#[derive(Parser, Debug, Default)]
pub struct ServeArgs {
    /// Bind address for the server
    #[arg(long, env = "CLOUDLET_BROKER_BIND_ADDR")]
    pub bind_addr: Option<String>,

    /// Port to listen on (default: 5000)
    #[arg(short, long, env = "CLOUDLET_BROKER_PORT")]
    pub port: Option<u16>,

    /// Stages of the default pipeline, in order (repeatable)
    #[arg(short = 'm', long = "matcher", value_name = "STAGE")]
    pub matchers: Vec<String>,

    /// Parent broker to report resources to (repeatable)
    #[arg(
        long = "tier1-url",
        value_name = "URL",
        env = "CLOUDLET_BROKER_TIER1_URLS",
        value_delimiter = ','
    )]
    pub tier1_urls: Vec<String>,

    /// Base URL parents reach this node on
    #[arg(long, env = "CLOUDLET_BROKER_TIER2_URL")]
    pub tier2_url: Option<String>,

    /// Identity used when reporting upstream
    #[arg(long, env = "CLOUDLET_BROKER_UUID")]
    pub uuid: Option<Uuid>,

    /// YAML list of cloudlets to preseed the registry with
    #[arg(long, value_name = "FILE", env = "CLOUDLET_BROKER_CLOUDLETS")]
    pub cloudlets: Option<PathBuf>,

    /// CSV file receiving one row per upstream report
    #[arg(long, value_name = "FILE", env = "CLOUDLET_BROKER_TELEMETRY")]
    pub telemetry_path: Option<String>,

    /// Path to a .env file loaded before anything else
    #[arg(long, value_name = "FILE")]
    pub env_file: Option<PathBuf>,
}

/// Arguments for the cloudlets command
#[derive(Parser, Debug)]
pub struct CloudletsArgs {
    /// Broker base URL
    #[arg(long, default_value = "http://localhost:5000", env = "CLOUDLET_BROKER_URL")]
    pub url: String,
}
