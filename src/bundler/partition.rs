//! Chunk partitioning
//!
//! Assigns every module of a [`ModuleGraph`] to exactly one chunk. Cache
//! group rules are tried in policy order (descending priority, ties in
//! declaration order); the first rule that applies wins. A module no rule
//! claims goes to the chunk of the first entry, in declaration order, that
//! reaches it.
//!
//! The pass is pure and deterministic: no I/O and no hash-order dependence.

use std::collections::{BTreeSet, HashMap};

use crate::config::{runtime_chunk_name, RuntimeChunk, SplitPolicy};

use super::{Chunk, ChunkKind, Dependency, ImportKind, ModuleGraph, ModuleId};

/// Index of a chunk within a [`ChunkPlan`]
pub type ChunkId = usize;

/// Name of the entry chunk that collects modules when the graph declares no
/// entries at all.
pub const FALLBACK_CHUNK: &str = "main";

/// The chunks one entry needs, in load order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryPoint {
    pub name: String,
    /// Runtime first, then shared chunks, then entry chunks; the entry's own
    /// chunk is last.
    pub chunks: Vec<ChunkId>,
}

/// Result of partitioning a module graph
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkPlan {
    chunks: Vec<Chunk>,
    /// Chunk of every module, indexed by module ID
    assignment: Vec<ChunkId>,
    entrypoints: Vec<EntryPoint>,
}

impl ChunkPlan {
    /// All chunks: runtime chunks, then shared chunks, then entry chunks
    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    pub fn chunk(&self, id: ChunkId) -> Option<&Chunk> {
        self.chunks.get(id)
    }

    pub fn chunk_id_of(&self, module: ModuleId) -> Option<ChunkId> {
        self.assignment.get(module).copied()
    }

    /// Chunk a module was assigned to
    pub fn chunk_of(&self, module: ModuleId) -> Option<&Chunk> {
        self.chunk_id_of(module).and_then(|id| self.chunks.get(id))
    }

    pub fn entrypoints(&self) -> &[EntryPoint] {
        &self.entrypoints
    }

    pub fn entrypoint(&self, name: &str) -> Option<&EntryPoint> {
        self.entrypoints.iter().find(|entry| entry.name == name)
    }

    /// Chunk names an entry loads, in order
    pub fn entry_chunk_names(&self, name: &str) -> Vec<&str> {
        self.entrypoint(name)
            .map(|entry| {
                entry
                    .chunks
                    .iter()
                    .map(|&id| self.chunks[id].name.as_str())
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Partition a module graph into chunks
pub fn partition(graph: &ModuleGraph, policy: &SplitPolicy) -> ChunkPlan {
    let reach = Reachability::analyze(graph);
    let order = module_order(graph);
    let entries = graph.entries();

    let mut table = ChunkTable::default();

    let runtimes: Vec<Option<ChunkId>> = match policy.runtime() {
        RuntimeChunk::None => vec![None; entries.len()],
        RuntimeChunk::Single => {
            let id = table.get_or_insert(Chunk::runtime(runtime_chunk_name(None)));
            vec![Some(id); entries.len()]
        }
        RuntimeChunk::Multiple => entries
            .iter()
            .map(|entry| Some(table.get_or_insert(Chunk::runtime(runtime_chunk_name(Some(&entry.name))))))
            .collect(),
    };

    for rule in policy.rules() {
        table.get_or_insert(Chunk::shared(rule.name.clone()));
    }

    let entry_chunks: Vec<ChunkId> = entries
        .iter()
        .map(|entry| table.get_or_insert(Chunk::entry(entry.name.clone())))
        .collect();
    let fallback = match entry_chunks.first() {
        Some(&id) => id,
        None => table.get_or_insert(Chunk::entry(FALLBACK_CHUNK)),
    };

    let mut assignment = vec![fallback; graph.len()];
    for &id in &order {
        let Some(module) = graph.get_module(id) else {
            continue;
        };
        let reached_by = &reach.reached_by[id];

        let rule = policy.rules().iter().find(|rule| {
            rule.applies(
                &module.ident,
                reach.initial[id],
                reach.on_demand[id],
                reached_by.len(),
            )
        });

        let target = match rule {
            Some(rule) => table.id_of(&rule.name).unwrap_or(fallback),
            None => reached_by
                .first()
                .map(|&entry| entry_chunks[entry])
                .unwrap_or(fallback),
        };

        assignment[id] = target;
        table.chunks[target].module_ids.push(id);
    }

    let entrypoints = entries
        .iter()
        .enumerate()
        .map(|(index, entry)| {
            let mut needed: BTreeSet<ChunkId> = reach
                .reached_by
                .iter()
                .enumerate()
                .filter(|(_, by)| by.contains(&index))
                .map(|(module, _)| assignment[module])
                .collect();
            needed.extend(runtimes[index]);
            needed.insert(entry_chunks[index]);

            EntryPoint {
                name: entry.name.clone(),
                chunks: needed.into_iter().collect(),
            }
        })
        .collect();

    ChunkPlan {
        chunks: table.chunks,
        assignment,
        entrypoints,
    }
    .without_empty_shared_chunks()
}

impl ChunkPlan {
    /// Drop shared chunks no module landed in and renumber the rest
    fn without_empty_shared_chunks(self) -> Self {
        let mut remap = Vec::with_capacity(self.chunks.len());
        let mut chunks = Vec::with_capacity(self.chunks.len());
        for chunk in self.chunks {
            if chunk.kind == ChunkKind::Shared && chunk.is_empty() {
                remap.push(None);
            } else {
                remap.push(Some(chunks.len()));
                chunks.push(chunk);
            }
        }

        let renumber = |id: ChunkId| remap[id];
        Self {
            chunks,
            assignment: self.assignment.into_iter().filter_map(renumber).collect(),
            entrypoints: self
                .entrypoints
                .into_iter()
                .map(|entry| EntryPoint {
                    name: entry.name,
                    chunks: entry.chunks.into_iter().filter_map(renumber).collect(),
                })
                .collect(),
        }
    }
}

#[derive(Default)]
struct ChunkTable {
    chunks: Vec<Chunk>,
    by_name: HashMap<String, ChunkId>,
}

impl ChunkTable {
    fn get_or_insert(&mut self, chunk: Chunk) -> ChunkId {
        if let Some(&id) = self.by_name.get(&chunk.name) {
            return id;
        }
        let id = self.chunks.len();
        self.by_name.insert(chunk.name.clone(), id);
        self.chunks.push(chunk);
        id
    }

    fn id_of(&self, name: &str) -> Option<ChunkId> {
        self.by_name.get(name).copied()
    }
}

/// Per-module reachability facts
struct Reachability {
    /// Entry indexes reaching each module, ascending
    reached_by: Vec<Vec<usize>>,
    /// Reached from some entry through synchronous imports only
    initial: Vec<bool>,
    /// Reached through a path containing a dynamic import
    on_demand: Vec<bool>,
}

impl Reachability {
    fn analyze(graph: &ModuleGraph) -> Self {
        let len = graph.len();
        let mut reached_by = vec![Vec::new(); len];
        let mut initial = vec![false; len];

        for (index, entry) in graph.entries().iter().enumerate() {
            for id in walk(graph, &entry.assets, |_| true) {
                reached_by[id].push(index);
            }
            for id in walk(graph, &entry.assets, |dep| dep.kind == ImportKind::Sync) {
                initial[id] = true;
            }
        }

        // unreachable modules behave as if the first entry imported them
        if !graph.entries().is_empty() {
            for id in 0..len {
                if reached_by[id].is_empty() {
                    reached_by[id].push(0);
                    initial[id] = true;
                }
            }
        }

        let split_points: Vec<ModuleId> = (0..len)
            .flat_map(|id| graph.dependencies(id).iter())
            .filter(|dep| dep.kind == ImportKind::Async)
            .map(|dep| dep.target)
            .collect();
        let mut on_demand = vec![false; len];
        for id in walk(graph, &split_points, |_| true) {
            on_demand[id] = true;
        }

        Self {
            reached_by,
            initial,
            on_demand,
        }
    }
}

/// Depth-first walk from `roots`, following the edges `follow` accepts
fn walk(
    graph: &ModuleGraph,
    roots: &[ModuleId],
    follow: impl Fn(&Dependency) -> bool,
) -> Vec<ModuleId> {
    let mut seen = vec![false; graph.len()];
    let mut stack: Vec<ModuleId> = roots.iter().rev().copied().collect();
    let mut visited = Vec::new();

    while let Some(id) = stack.pop() {
        if id >= seen.len() || seen[id] {
            continue;
        }
        seen[id] = true;
        visited.push(id);
        for dep in graph.dependencies(id).iter().rev() {
            if follow(dep) && !seen[dep.target] {
                stack.push(dep.target);
            }
        }
    }

    visited
}

/// Dependency-first post-order over the whole graph: entries in declaration
/// order, assets in entry order, imports in source order, then any module
/// no entry reaches.
fn module_order(graph: &ModuleGraph) -> Vec<ModuleId> {
    let mut visited = vec![false; graph.len()];
    let mut order = Vec::with_capacity(graph.len());

    let roots = graph
        .entries()
        .iter()
        .flat_map(|entry| entry.assets.iter().copied())
        .chain(0..graph.len());

    for root in roots {
        if root >= visited.len() || visited[root] {
            continue;
        }
        visited[root] = true;
        let mut stack = vec![(root, 0usize)];

        while let Some(&(id, next)) = stack.last() {
            match graph.dependencies(id).get(next) {
                Some(dep) => {
                    let top = stack.len() - 1;
                    stack[top].1 += 1;
                    if !visited[dep.target] {
                        visited[dep.target] = true;
                        stack.push((dep.target, 0));
                    }
                }
                None => {
                    order.push(id);
                    stack.pop();
                }
            }
        }
    }

    order
}
