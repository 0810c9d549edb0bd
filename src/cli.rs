//! Command-line interface

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// Contract-address detection and token analysis
#[derive(Parser, Debug)]
#[command(name = "contract-lens")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short, long, env = "CA_LENS_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn", env = "CA_LENS_LOG_LEVEL", global = true)]
    pub log_level: String,

    /// Log format (text, json)
    #[arg(long, env = "CA_LENS_LOG_FORMAT", global = true)]
    pub log_format: Option<String>,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text, global = true)]
    pub format: OutputFormat,

    /// Subcommand
    #[command(subcommand)]
    pub command: Command,
}

/// How results are printed
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable
    Text,
    /// Pretty JSON
    Json,
    /// YAML
    Yaml,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Find contract addresses in text
    Scan {
        /// Text to scan; reads stdin when omitted
        text: Option<String>,
    },

    /// Query every upstream source for an address
    Analyze {
        /// Contract address
        #[arg(required = true)]
        address: String,

        /// Do not record the analysis in history
        #[arg(long)]
        no_history: bool,
    },

    /// Recent analyses
    #[command(subcommand)]
    History(HistoryCommand),
}

/// History subcommands
#[derive(Subcommand, Debug)]
pub enum HistoryCommand {
    /// List recent analyses, newest first
    List,

    /// Forget every entry
    Clear,
}
