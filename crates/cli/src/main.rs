//! Telemetry Generator CLI
//!
//! Validates and samples topology documents offline, and switches feature
//! flags on a running generator.

mod client;
mod commands;
mod output;

use anyhow::Result;
use clap::builder::BoolishValueParser;
use clap::{ArgAction, Parser, Subcommand};
use commands::topology::DocumentFormat;
use commands::{flags, topology};
use std::path::PathBuf;

/// Telemetry Generator CLI
#[derive(Parser)]
#[command(name = "tgctl")]
#[command(author, version, about = "CLI for the Telemetry Generator", long_about = None)]
pub struct Cli {
    /// Generator API URL (can also be set via TGCTL_API_URL env var)
    #[arg(long, env = "TGCTL_API_URL", default_value = "http://localhost:8080")]
    pub api_url: String,

    /// Output format
    #[arg(long, short, default_value = "table")]
    pub format: output::OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Load a topology file and report every validation error
    Validate {
        /// Topology document (.json, .yaml or .yml)
        file: PathBuf,
    },

    /// Generate sample traces from a topology file
    Sample {
        /// Topology document (.json, .yaml or .yml)
        file: PathBuf,

        /// Service of the root span (defaults to the first root route)
        #[arg(long, short)]
        service: Option<String>,

        /// Route of the root span
        #[arg(long, short)]
        route: Option<String>,

        /// Number of traces
        #[arg(long, short = 'n', default_value_t = 1)]
        count: usize,

        /// Seed for reproducible output
        #[arg(long)]
        seed: Option<u64>,

        /// Also print one tick of every metric series
        #[arg(long)]
        metrics: bool,
    },

    /// Print a topology file as JSON or YAML
    Convert {
        /// Topology document (.json, .yaml or .yml)
        file: PathBuf,

        /// Output document format
        #[arg(long, value_enum, default_value = "yaml")]
        to: DocumentFormat,
    },

    /// Inspect and switch flags on a running generator
    #[command(subcommand)]
    Flags(FlagsCommands),
}

#[derive(Subcommand)]
pub enum FlagsCommands {
    /// List flags and their state
    List,

    /// Enable or disable a root flag
    Set {
        /// Flag name
        name: String,

        /// true/false, 1/0, yes/no, on/off
        #[arg(action = ArgAction::Set, value_parser = BoolishValueParser::new())]
        enabled: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Validate { file } => {
            topology::validate(&file, cli.format)?;
        }
        Commands::Sample {
            file,
            service,
            route,
            count,
            seed,
            metrics,
        } => {
            topology::sample(&file, service, route, count, seed, metrics, cli.format)?;
        }
        Commands::Convert { file, to } => {
            topology::convert(&file, to)?;
        }
        Commands::Flags(flags_cmd) => {
            let client = client::ApiClient::new(&cli.api_url)?;
            match flags_cmd {
                FlagsCommands::List => {
                    flags::list_flags(&client, cli.format).await?;
                }
                FlagsCommands::Set { name, enabled } => {
                    flags::set_flag(&client, &name, enabled, cli.format).await?;
                }
            }
        }
    }

    Ok(())
}
