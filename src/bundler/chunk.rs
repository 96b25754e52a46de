//! Chunks: the unit of emission

use super::ModuleId;

/// Type of chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ChunkKind {
    /// Module-loader bootstrap, loaded before anything else
    Runtime,
    /// Filled by a cache group, e.g. `vendors`
    Shared,
    /// Modules owned by one entry
    Entry,
}

impl ChunkKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkKind::Runtime => "runtime",
            ChunkKind::Shared => "shared",
            ChunkKind::Entry => "entry",
        }
    }
}

/// A chunk is a group of modules that will be bundled together
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Chunk name (used for output filename)
    pub name: String,

    /// Type of chunk
    pub kind: ChunkKind,

    /// Module IDs included in this chunk, dependencies first
    pub module_ids: Vec<ModuleId>,
}

impl Chunk {
    /// Create a new entry chunk
    pub fn entry(name: impl Into<String>) -> Self {
        Self::with_kind(name, ChunkKind::Entry)
    }

    /// Create a new shared chunk
    pub fn shared(name: impl Into<String>) -> Self {
        Self::with_kind(name, ChunkKind::Shared)
    }

    /// Create a new runtime chunk
    pub fn runtime(name: impl Into<String>) -> Self {
        Self::with_kind(name, ChunkKind::Runtime)
    }

    fn with_kind(name: impl Into<String>, kind: ChunkKind) -> Self {
        Self {
            name: name.into(),
            kind,
            module_ids: Vec::new(),
        }
    }

    /// Check if chunk is empty
    pub fn is_empty(&self) -> bool {
        self.module_ids.is_empty()
    }

    /// Number of modules in chunk
    pub fn len(&self) -> usize {
        self.module_ids.len()
    }
}
