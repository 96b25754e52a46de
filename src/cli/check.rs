//! Check command: validate, resolve and print the chunk plan

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use tracing::info;

use crate::bundler::{Bundler, ChunkPlan, ModuleGraph};
use crate::cli::BuildOptions;
use crate::config::Config;

/// Validate the configuration and show how modules are split
#[derive(Args, Debug)]
pub struct CheckCommand {
    /// Also list the modules of each chunk
    #[arg(short, long)]
    pub modules: bool,
}

impl CheckCommand {
    pub async fn execute(&self, config_path: &str) -> Result<()> {
        info!("Loading configuration from {}", config_path);
        let config = Config::load(config_path)?;
        eprintln!("{} Configuration is valid", "✓".green().bold());

        let options = BuildOptions {
            progress: false,
            ..BuildOptions::default()
        };
        let bundler = Bundler::new(config, options)?;
        let plan = bundler.plan().await?;

        let graph = bundler.graph();
        let graph = graph.read();
        println!("{}", describe(&graph, &plan, self.modules));

        Ok(())
    }
}

/// Chunks and entry load order as plain text
fn describe(graph: &ModuleGraph, plan: &ChunkPlan, modules: bool) -> String {
    let mut lines = Vec::new();

    for chunk in plan.chunks() {
        lines.push(format!(
            "chunk {} [{}] {} module(s)",
            chunk.name,
            chunk.kind.as_str(),
            chunk.len()
        ));
        if modules {
            for &id in &chunk.module_ids {
                if let Some(module) = graph.get_module(id) {
                    lines.push(format!("  {}", module.ident));
                }
            }
        }
    }

    for entry in plan.entrypoints() {
        lines.push(format!(
            "entry {}: {}",
            entry.name,
            plan.entry_chunk_names(&entry.name).join(" -> ")
        ));
    }

    lines.join("\n")
}
