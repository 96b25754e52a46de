//! Configuration errors, reported before any resolution or partitioning runs

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("at least one [[entry]] must be specified")]
    NoEntries,

    #[error("entry names must not be empty")]
    EmptyEntryName,

    #[error("entry '{0}' is declared more than once")]
    DuplicateEntry(String),

    #[error("entry '{0}' lists no assets")]
    EmptyEntry(String),

    #[error("cache group key must not be empty")]
    EmptyCacheGroupKey,

    #[error("cache group '{0}' is declared more than once")]
    DuplicateCacheGroup(String),

    #[error("cache group '{0}' has an empty chunk name")]
    EmptyChunkName(String),

    #[error("chunk name '{name}' of {owner} collides with {other}")]
    ChunkNameConflict {
        name: String,
        owner: String,
        other: String,
    },

    #[error("cache group '{group}' has an invalid pattern")]
    InvalidPattern {
        group: String,
        #[source]
        source: regex::Error,
    },

    #[error("cache group '{group}' has an invalid glob")]
    InvalidGlob {
        group: String,
        #[source]
        source: globset::Error,
    },

    #[error("cache group '{0}' needs min_chunks of at least 1")]
    InvalidMinChunks(String),

    #[error("file name template '{template}': {reason}")]
    InvalidFilename { template: String, reason: String },

    #[error("unknown plugin '{0}'")]
    UnknownPlugin(String),

    #[error("plugin '{plugin}': invalid option '{option}': {reason}")]
    InvalidPluginOption {
        plugin: String,
        option: String,
        reason: String,
    },
}
