//! Chunk rendering
//!
//! Turns a [`ChunkPlan`] into file contents. Rendering is pure; writing the
//! files is the bundler's job.

use anyhow::{anyhow, Result};
use parcel_sourcemap::{OriginalLocation, SourceMap};
use serde::Serialize;
use tracing::debug;

use crate::config::{Config, ConfigError, FilenameTemplate, RuntimeChunk};
use crate::utils::hash_content;

use super::link::{js_string, link_script, link_style, Imports};
use super::{Chunk, ChunkId, ChunkKind, ChunkPlan, ModuleGraph, ModuleId, ModuleIds, ModuleKind};

/// Global array chunks push themselves onto until the runtime drains it
pub const CHUNK_QUEUE: &str = "__asset_split_chunks__";

/// Module loader bootstrap. Installed once per page: a second copy finds the
/// queue already taken over and stops.
const RUNTIME: &str = r#"(function () {
  var queue = (self.__asset_split_chunks__ = self.__asset_split_chunks__ || []);
  if (queue.push !== Array.prototype.push) return;
  var factories = {};
  var cache = {};
  function require(id) {
    var cached = cache[id];
    if (cached) return cached.exports;
    var factory = factories[id];
    if (!factory) throw new Error("Cannot find module '" + id + "'");
    var module = (cache[id] = { exports: {} });
    factory.call(module.exports, module, module.exports, require);
    return module.exports;
  }
  require.interop = function (exports) {
    return exports && exports.__esModule ? exports : { default: exports };
  };
  require.reexport = function (target, source) {
    Object.keys(source).forEach(function (key) {
      if (key !== "default" && !(key in target)) target[key] = source[key];
    });
  };
  function install(chunk) {
    var modules = chunk[1];
    for (var id in modules) factories[id] = modules[id];
    (chunk[2] || []).forEach(require);
  }
  queue.forEach(install);
  queue.push = install;
})();
"#;

/// Kind of an emitted file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Script,
    Style,
}

impl FileKind {
    fn map_comment(&self, url: &str) -> String {
        match self {
            FileKind::Script => format!("//# sourceMappingURL={}\n", url),
            FileKind::Style => format!("/*# sourceMappingURL={} */\n", url),
        }
    }
}

/// One output file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmittedFile {
    pub chunk: ChunkId,
    pub kind: FileKind,
    pub file_name: String,
    pub contents: String,
    /// Entry this file starts. Only that entry loads it; every other file
    /// of the chunk is loaded by all entries that need the chunk.
    pub starts: Option<String>,
    /// Source map JSON, written as `<file_name>.map`
    pub source_map: Option<String>,
}

impl EmittedFile {
    pub fn map_name(&self) -> String {
        format!("{}.map", self.file_name)
    }
}

/// Where a module's code begins in a rendered file
struct Segment {
    module: ModuleId,
    line: u32,
    lines: u32,
    /// Original line of the first generated line
    skip: u32,
}

/// File contents plus the line bookkeeping for its source map
#[derive(Default)]
struct Rendered {
    contents: String,
    line: u32,
    segments: Vec<Segment>,
}

impl Rendered {
    fn push(&mut self, text: &str) {
        self.line += text.matches('\n').count() as u32;
        self.contents.push_str(text);
    }

    fn push_module(&mut self, module: ModuleId, code: &str, skip: usize) {
        self.segments.push(Segment {
            module,
            line: self.line,
            lines: code.lines().count() as u32,
            skip: skip as u32,
        });
        self.push(code);
    }
}

/// Renders chunks to files
pub struct Emitter<'a> {
    graph: &'a ModuleGraph,
    plan: &'a ChunkPlan,
    ids: &'a ModuleIds,
    runtime: RuntimeChunk,
    script_name: FilenameTemplate,
    style_name: FilenameTemplate,
    source_maps: bool,
}

impl<'a> Emitter<'a> {
    pub fn new(
        graph: &'a ModuleGraph,
        plan: &'a ChunkPlan,
        ids: &'a ModuleIds,
        config: &Config,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            graph,
            plan,
            ids,
            runtime: config.optimization.runtime_chunk,
            script_name: FilenameTemplate::parse(&config.output.filename)?,
            style_name: FilenameTemplate::parse(&config.output.css_filename)?,
            source_maps: config.output.source_map,
        })
    }

    pub fn with_source_maps(mut self, enabled: bool) -> Self {
        self.source_maps = enabled;
        self
    }

    /// Render every chunk; per chunk the stylesheet comes before the script.
    ///
    /// An entry chunk that other entries also load (it holds modules they
    /// share) keeps only its modules; starting the entry moves to a
    /// separate `<entry>~start` file that only the entry itself loads.
    pub fn render(&self) -> Result<Vec<EmittedFile>> {
        let mut files = Vec::new();

        for (id, chunk) in self.plan.chunks().iter().enumerate() {
            if let Some(rendered) = self.render_style(chunk) {
                files.push(self.file(id, &chunk.name, FileKind::Style, rendered, None)?);
            }

            let run = self.run_list(chunk);
            if run.is_empty() || !self.loaded_by_other_entries(id, chunk) {
                if let Some(rendered) = self.render_script(chunk, &run) {
                    files.push(self.file(id, &chunk.name, FileKind::Script, rendered, None)?);
                }
                continue;
            }

            if let Some(rendered) = self.render_script(chunk, &[]) {
                files.push(self.file(id, &chunk.name, FileKind::Script, rendered, None)?);
            }
            let start = format!("{}~start", chunk.name);
            let mut rendered = Rendered::default();
            if self.runtime == RuntimeChunk::None {
                rendered.push(RUNTIME);
            }
            self.push_payload(&mut rendered, &start, &[], &run);
            files.push(self.file(id, &start, FileKind::Script, rendered, Some(chunk.name.clone()))?);
        }

        Ok(files)
    }

    fn file(
        &self,
        id: ChunkId,
        name: &str,
        kind: FileKind,
        rendered: Rendered,
        starts: Option<String>,
    ) -> Result<EmittedFile> {
        let template = match kind {
            FileKind::Script => &self.script_name,
            FileKind::Style => &self.style_name,
        };
        let hash = if template.uses_hash() {
            hash_content(rendered.contents.as_bytes())
        } else {
            String::new()
        };
        let file_name = template.render(name, &hash);

        let mut contents = rendered.contents;
        let source_map = if self.source_maps && !rendered.segments.is_empty() {
            let map = self.source_map(&rendered.segments)?;
            let base = file_name.rsplit('/').next().unwrap_or(&file_name);
            contents.push_str(&kind.map_comment(&format!("{}.map", base)));
            Some(map)
        } else {
            None
        };
        debug!("Rendered {} ({} bytes)", file_name, contents.len());

        Ok(EmittedFile {
            chunk: id,
            kind,
            file_name,
            contents,
            starts,
            source_map,
        })
    }

    /// Line map from each generated line to the same line of the module's
    /// original source
    fn source_map(&self, segments: &[Segment]) -> Result<String> {
        let mut map = SourceMap::new("/");

        for segment in segments {
            let Some(module) = self.graph.get_module(segment.module) else {
                continue;
            };
            let source = map.add_source(&module.ident);
            map.set_source_content(source as usize, &module.source)
                .map_err(|e| anyhow!("Source map for {}: {}", module.ident, e))?;

            let original_lines = module.source.lines().count() as u32;
            for k in 0..segment.lines {
                let original = segment.skip + k;
                if original >= original_lines {
                    break;
                }
                map.add_mapping(
                    segment.line + k,
                    0,
                    Some(OriginalLocation::new(original, 0, source, None)),
                );
            }
        }

        map.to_json(None)
            .map_err(|e| anyhow!("Failed to serialize source map: {}", e))
    }

    /// Whether an entry other than the chunk's own loads it
    fn loaded_by_other_entries(&self, id: ChunkId, chunk: &Chunk) -> bool {
        self.plan
            .entrypoints()
            .iter()
            .any(|entry| entry.name != chunk.name && entry.chunks.contains(&id))
    }

    /// Script modules an entry chunk starts once loaded
    fn run_list(&self, chunk: &Chunk) -> Vec<&str> {
        if chunk.kind != ChunkKind::Entry {
            return Vec::new();
        }
        self.graph
            .entries()
            .iter()
            .find(|entry| entry.name == chunk.name)
            .map(|entry| {
                entry
                    .assets
                    .iter()
                    .filter(|&&asset| {
                        self.graph
                            .get_module(asset)
                            .is_some_and(|m| m.kind() == ModuleKind::Script)
                    })
                    .map(|&asset| self.ids.get(asset))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn render_script(&self, chunk: &Chunk, run: &[&str]) -> Option<Rendered> {
        let mut rendered = Rendered::default();
        if chunk.kind == ChunkKind::Runtime {
            rendered.push(RUNTIME);
            return Some(rendered);
        }

        let modules: Vec<(ModuleId, String)> = chunk
            .module_ids
            .iter()
            .filter_map(|&id| {
                let module = self.graph.get_module(id)?;
                if module.kind() != ModuleKind::Script {
                    return None;
                }
                let code = link_script(module.code(), &Imports::of(self.graph, self.ids, id));
                Some((id, code.trim_end().to_string()))
            })
            .collect();

        if modules.is_empty() && run.is_empty() {
            return None;
        }

        if self.runtime == RuntimeChunk::None && !run.is_empty() {
            rendered.push(RUNTIME);
        }
        self.push_payload(&mut rendered, &chunk.name, &modules, run);
        Some(rendered)
    }

    /// `queue.push([name, {id: factory, ...}, [run ids]])`
    fn push_payload(&self, out: &mut Rendered, name: &str, modules: &[(ModuleId, String)], run: &[&str]) {
        out.push(&format!(
            "(self.{queue} = self.{queue} || []).push([\n  {name},\n  {{\n",
            queue = CHUNK_QUEUE,
            name = js_string(name),
        ));
        for (i, (id, code)) in modules.iter().enumerate() {
            if i > 0 {
                out.push(",\n");
            }
            out.push(&format!(
                "    {}: function (module, exports, require) {{\n",
                js_string(self.ids.get(*id))
            ));
            out.push_module(*id, code, 0);
            out.push("\n    }");
        }
        let run: Vec<String> = run.iter().map(|id| js_string(id)).collect();
        out.push(&format!("\n  }},\n  [{}]\n]);\n", run.join(", ")));
    }

    fn render_style(&self, chunk: &Chunk) -> Option<Rendered> {
        let mut hoisted: Vec<String> = Vec::new();
        let mut bodies = Vec::new();

        for &id in &chunk.module_ids {
            let Some(module) = self.graph.get_module(id) else {
                continue;
            };
            if module.kind() != ModuleKind::Style {
                continue;
            }
            let linked = link_style(module.code(), &Imports::of(self.graph, self.ids, id));
            for rule in linked.hoisted {
                if !hoisted.contains(&rule) {
                    hoisted.push(rule);
                }
            }
            bodies.push((id, linked.body.trim_end().to_string(), linked.offset));
        }

        if bodies.is_empty() {
            return None;
        }

        let mut out = Rendered::default();
        for rule in &hoisted {
            out.push(rule);
            out.push("\n");
        }
        for (i, (id, body, offset)) in bodies.iter().enumerate() {
            if i > 0 {
                out.push("\n");
            }
            out.push_module(*id, body, *offset);
        }
        out.push("\n");
        Some(out)
    }
}
