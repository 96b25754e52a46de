//! Command-line interface for asset-split
//!
//! Provides the main CLI structure using clap with subcommands for:
//! - `build`: Partition, render and write the bundle
//! - `check`: Validate the configuration and print the chunk plan

mod build;
mod check;

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;

pub use build::{BuildCommand, BuildOptions};
pub use check::CheckCommand;

use crate::config::CONFIG_FILE;

/// asset-split - splits a site's client assets into content-hashed chunks
#[derive(Parser, Debug)]
#[command(name = "asset-split")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to the config file
    #[arg(short, long, global = true, default_value = CONFIG_FILE)]
    pub config: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build the project
    Build(BuildCommand),

    /// Validate the configuration and show how modules are split
    Check(CheckCommand),
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(&self) -> Result<()> {
        print_banner();

        match &self.command {
            Commands::Build(cmd) => cmd.execute(&self.config).await,
            Commands::Check(cmd) => cmd.execute(&self.config).await,
        }
    }
}

fn print_banner() {
    eprintln!(
        "\n{} {}\n",
        "asset-split".bold().cyan(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
}
