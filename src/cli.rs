use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// CLI for drivepulse: a storage device health monitoring server.
#[derive(Parser)]
#[command(name = "drivepulse", version, about = "Storage device health monitoring server")]
pub struct Cli {
    /// Path to the configuration file. Defaults to the project config
    /// directory when omitted; a missing file falls back to defaults.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the monitoring server: ingest endpoints, background monitors,
    /// and the report scheduler.
    Serve,

    /// Generate a health report once and print it to stdout.
    Report {
        /// Report period.
        #[arg(long, default_value = "weekly", value_parser = ["daily", "weekly", "monthly"])]
        period: String,

        /// Also write a PDF to the given directory.
        #[arg(long)]
        pdf_dir: Option<PathBuf>,
    },
}
