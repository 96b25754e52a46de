//! Bundle analysis: `stats.json` and the console report

use std::fmt::Write as _;

use anyhow::{Context, Result};
use colored::Colorize;
use serde::Serialize;

use crate::utils::format_size;

use super::emit::{EmittedFile, FileKind};
use super::manifest::Manifest;
use super::{ChunkPlan, ModuleGraph};

pub const STATS_FILE: &str = "stats.json";

#[derive(Debug, Serialize)]
pub struct BuildStats {
    pub entrypoints: Vec<EntryStats>,
    pub chunks: Vec<ChunkStats>,
}

#[derive(Debug, Serialize)]
pub struct EntryStats {
    pub name: String,
    pub files: Vec<String>,
    /// Total bytes an entry loads
    pub size: usize,
}

#[derive(Debug, Serialize)]
pub struct ChunkStats {
    pub name: String,
    pub kind: &'static str,
    pub files: Vec<FileStats>,
    pub modules: Vec<ModuleStats>,
}

#[derive(Debug, Serialize)]
pub struct FileStats {
    pub name: String,
    pub kind: FileKind,
    pub size: usize,
}

#[derive(Debug, Serialize)]
pub struct ModuleStats {
    pub ident: String,
    /// Size after transformation
    pub size: usize,
}

impl BuildStats {
    pub fn collect(
        graph: &ModuleGraph,
        plan: &ChunkPlan,
        files: &[EmittedFile],
        manifest: &Manifest,
    ) -> Self {
        let size_of = |name: &str| {
            files
                .iter()
                .find(|file| file.file_name == name)
                .map_or(0, |file| file.contents.len())
        };

        let entrypoints = manifest
            .entrypoints()
            .map(|(name, entry_files)| EntryStats {
                name: name.to_string(),
                files: entry_files.to_vec(),
                size: entry_files.iter().map(|f| size_of(f)).sum(),
            })
            .collect();

        let chunks = plan
            .chunks()
            .iter()
            .enumerate()
            .map(|(id, chunk)| ChunkStats {
                name: chunk.name.clone(),
                kind: chunk.kind.as_str(),
                files: files
                    .iter()
                    .filter(|file| file.chunk == id)
                    .map(|file| FileStats {
                        name: file.file_name.clone(),
                        kind: file.kind,
                        size: file.contents.len(),
                    })
                    .collect(),
                modules: chunk
                    .module_ids
                    .iter()
                    .filter_map(|&module| graph.get_module(module))
                    .map(|module| ModuleStats {
                        ident: module.ident.clone(),
                        size: module.code().len(),
                    })
                    .collect(),
            })
            .collect();

        Self {
            entrypoints,
            chunks,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize build stats")
    }

    /// Human-readable report, largest modules first within each chunk
    pub fn report(&self) -> String {
        let mut out = String::new();

        for chunk in &self.chunks {
            let size: usize = chunk.files.iter().map(|f| f.size).sum();
            let _ = writeln!(
                out,
                "{} {} {}",
                chunk.name.bold(),
                format!("[{}]", chunk.kind).dimmed(),
                format_size(size).cyan()
            );

            let mut modules: Vec<&ModuleStats> = chunk.modules.iter().collect();
            modules.sort_by(|a, b| b.size.cmp(&a.size).then_with(|| a.ident.cmp(&b.ident)));
            for module in modules {
                let _ = writeln!(
                    out,
                    "  {} {} {}",
                    "•".dimmed(),
                    module.ident,
                    format_size(module.size).dimmed()
                );
            }
        }

        for entry in &self.entrypoints {
            let _ = writeln!(
                out,
                "{} {} {}",
                "entry".green(),
                entry.name.bold(),
                format_size(entry.size).cyan()
            );
        }

        out
    }
}
