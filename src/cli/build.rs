//! Build command implementation

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{bail, Result};
use clap::Args;
use colored::Colorize;
use tracing::info;

use crate::bundler::{Bundler, FileKind};
use crate::config::Config;
use crate::utils::{format_duration, format_size};

/// Build the project
#[derive(Args, Debug)]
pub struct BuildCommand {
    /// Output directory
    #[arg(short, long)]
    pub outdir: Option<PathBuf>,

    /// Minify stylesheets
    #[arg(short, long)]
    pub minify: bool,

    /// Write a source map next to every chunk file
    #[arg(long)]
    pub source_map: bool,

    /// Write stats.json and print a size report
    #[arg(long, env = "ASSET_SPLIT_ANALYSE")]
    pub analyse: bool,

    /// Modules transformed concurrently (defaults to available cores)
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Abort the build after this many seconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Hide the progress bar
    #[arg(long)]
    pub no_progress: bool,
}

impl BuildCommand {
    pub async fn execute(&self, config_path: &str) -> Result<()> {
        let start = Instant::now();

        info!("Loading configuration from {}", config_path);
        let config = Config::load(config_path)?;

        eprintln!("{} Building {}...", "→".blue(), config.project.name.bold());

        let bundler = Bundler::new(config, self.into())?;
        let result = match self.timeout {
            Some(secs) => match tokio::time::timeout(Duration::from_secs(secs), bundler.build()).await {
                Ok(result) => result?,
                Err(_) => bail!("Build timed out after {}s", secs),
            },
            None => bundler.build().await?,
        };

        eprintln!(
            "\n{} Built {} file(s) in {}\n",
            "✓".green().bold(),
            result.bundles.len(),
            format_duration(start.elapsed())
        );

        // Print bundle summary
        for bundle in &result.bundles {
            let kind = match bundle.kind {
                FileKind::Script => "js ",
                FileKind::Style => "css",
            };
            eprintln!(
                "  {} {} {} {}",
                kind.dimmed(),
                bundle.output_path.display().to_string().cyan(),
                format!("({})", bundle.chunk).dimmed(),
                format_size(bundle.size).dimmed()
            );
        }

        if let Some(stats) = &result.stats {
            eprintln!("\n{}", stats.report());
        }

        eprintln!();

        Ok(())
    }
}

/// Build options derived from command arguments
#[derive(Debug, Clone)]
pub struct BuildOptions {
    pub outdir: Option<PathBuf>,
    pub minify: bool,
    pub source_map: bool,
    pub analyse: bool,
    pub progress: bool,
    pub jobs: usize,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            outdir: None,
            minify: false,
            source_map: false,
            analyse: false,
            progress: true,
            jobs: default_jobs(),
        }
    }
}

impl From<&BuildCommand> for BuildOptions {
    fn from(cmd: &BuildCommand) -> Self {
        Self {
            outdir: cmd.outdir.clone(),
            minify: cmd.minify,
            source_map: cmd.source_map,
            analyse: cmd.analyse,
            progress: !cmd.no_progress,
            jobs: cmd.jobs.unwrap_or_else(default_jobs),
        }
    }
}

fn default_jobs() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}
