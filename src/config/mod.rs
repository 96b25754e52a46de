//! Configuration handling
//!
//! Parses and validates `asset-split.toml` files.

mod error;
mod policy;
mod schema;
mod template;

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub use error::ConfigError;
pub use policy::{CacheGroupRule, ModuleMatcher, SplitPolicy};
pub use schema::*;
pub use template::{FilenameTemplate, DEFAULT_HASH_LENGTH, MAX_HASH_LENGTH};

/// Default configuration file name
pub const CONFIG_FILE: &str = "asset-split.toml";

/// Built-in transform plugins, in default order
pub const BUILTIN_PLUGINS: &[&str] = &["source-map", "typescript", "json", "css"];

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Project metadata
    pub project: ProjectConfig,

    /// Entries in declaration order
    #[serde(default, rename = "entry")]
    pub entries: Vec<EntryConfig>,

    /// Output configuration
    #[serde(default)]
    pub output: OutputConfig,

    /// Module resolution
    #[serde(default)]
    pub resolve: ResolveConfig,

    /// HTML generation
    #[serde(default)]
    pub html: HtmlConfig,

    /// Chunk splitting
    #[serde(default)]
    pub optimization: OptimizationConfig,

    /// Transform chain; empty means the built-in chain
    #[serde(default)]
    pub plugins: Vec<PluginConfig>,

    /// Root directory (computed from config file location)
    #[serde(skip)]
    pub root: PathBuf,
}

impl Config {
    /// Load configuration from a file path
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let canonical_path = if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()?.join(path)
        };

        let content = fs::read_to_string(&canonical_path)
            .with_context(|| format!("Failed to read config file: {}", canonical_path.display()))?;

        let root = canonical_path
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));

        Self::from_toml(&content, root)
            .with_context(|| format!("Invalid configuration in {}", canonical_path.display()))
    }

    /// Parse and validate configuration text
    pub fn from_toml(content: &str, root: PathBuf) -> Result<Self> {
        let mut config: Config = toml::from_str(content).context("Failed to parse configuration")?;
        config.root = root;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.entries.is_empty() {
            return Err(ConfigError::NoEntries);
        }

        let mut entry_names = HashSet::new();
        for entry in &self.entries {
            if entry.name.is_empty() {
                return Err(ConfigError::EmptyEntryName);
            }
            if !entry_names.insert(entry.name.as_str()) {
                return Err(ConfigError::DuplicateEntry(entry.name.clone()));
            }
            if entry.assets.is_empty() {
                return Err(ConfigError::EmptyEntry(entry.name.clone()));
            }
        }

        let mut group_keys = HashSet::new();
        let mut group_names = HashSet::new();
        for group in &self.optimization.cache_groups {
            if group.key.is_empty() {
                return Err(ConfigError::EmptyCacheGroupKey);
            }
            if !group_keys.insert(group.key.as_str()) {
                return Err(ConfigError::DuplicateCacheGroup(group.key.clone()));
            }
            let name = group.chunk_name();
            if name.is_empty() {
                return Err(ConfigError::EmptyChunkName(group.key.clone()));
            }
            if entry_names.contains(name) {
                return Err(ConfigError::ChunkNameConflict {
                    name: name.to_string(),
                    owner: format!("cache group '{}'", group.key),
                    other: format!("entry '{}'", name),
                });
            }
            if group.enabled {
                group_names.insert(name);
            }
        }

        for runtime in self.runtime_chunk_names() {
            let other = if entry_names.contains(runtime.as_str()) {
                Some("an entry")
            } else if group_names.contains(runtime.as_str()) {
                Some("a cache group")
            } else {
                None
            };
            if let Some(other) = other {
                return Err(ConfigError::ChunkNameConflict {
                    name: runtime,
                    owner: "the runtime chunk".to_string(),
                    other: other.to_string(),
                });
            }
        }

        FilenameTemplate::parse(&self.output.filename)?;
        FilenameTemplate::parse(&self.output.css_filename)?;

        for plugin in &self.plugins {
            if !BUILTIN_PLUGINS.contains(&plugin.name.as_str()) {
                return Err(ConfigError::UnknownPlugin(plugin.name.clone()));
            }
        }

        SplitPolicy::from_config(&self.optimization).map(drop)
    }

    /// Compile the chunk-splitting policy
    pub fn split_policy(&self) -> Result<SplitPolicy, ConfigError> {
        SplitPolicy::from_config(&self.optimization)
    }

    /// Names of the runtime chunks the configured mode produces
    pub fn runtime_chunk_names(&self) -> Vec<String> {
        match self.optimization.runtime_chunk {
            RuntimeChunk::None => Vec::new(),
            RuntimeChunk::Single => vec![runtime_chunk_name(None)],
            RuntimeChunk::Multiple => self
                .entries
                .iter()
                .map(|entry| runtime_chunk_name(Some(&entry.name)))
                .collect(),
        }
    }

    /// Get the absolute output directory path
    pub fn output_dir(&self) -> PathBuf {
        self.root.join(&self.output.dir)
    }
}

/// Name of a runtime chunk: `runtime`, or `runtime~<entry>` per entry
pub fn runtime_chunk_name(entry: Option<&str>) -> String {
    match entry {
        Some(entry) => format!("runtime~{}", entry),
        None => "runtime".to_string(),
    }
}
