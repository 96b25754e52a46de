//! asset-split library
//!
//! Splits a static site's client assets into chunks: entries are resolved
//! into a module graph, transformed, partitioned by cache-group rules and
//! written as content-hashed files with a manifest and an HTML document.

pub mod bundler;
pub mod cli;
pub mod config;
pub mod html;
pub mod plugins;
pub mod resolver;
pub mod transform;
pub mod utils;

pub use bundler::{partition, Bundler, ChunkPlan, Manifest};
pub use cli::Cli;
pub use config::{Config, SplitPolicy};
