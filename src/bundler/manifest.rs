//! Entry manifest
//!
//! `{ entry: [file, ...] }` with entries in declaration order and files in
//! load order: runtime chunk, shared chunks, then the entry's own chunk.

use anyhow::{Context, Result};
use serde::ser::{Serialize, SerializeMap, Serializer};

use super::emit::EmittedFile;
use super::ChunkPlan;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    entrypoints: Vec<(String, Vec<String>)>,
}

impl Manifest {
    pub fn from_plan(plan: &ChunkPlan, files: &[EmittedFile]) -> Self {
        let entrypoints = plan
            .entrypoints()
            .iter()
            .map(|entry| {
                let names = entry
                    .chunks
                    .iter()
                    .flat_map(|&chunk| {
                        files.iter().filter(move |file| {
                            file.chunk == chunk
                                && file.starts.as_ref().map_or(true, |owner| *owner == entry.name)
                        })
                    })
                    .map(|file| file.file_name.clone())
                    .collect();
                (entry.name.clone(), names)
            })
            .collect();

        Self { entrypoints }
    }

    /// Files an entry loads, in order
    pub fn entry(&self, name: &str) -> Option<&[String]> {
        self.entrypoints
            .iter()
            .find(|(entry, _)| entry == name)
            .map(|(_, files)| files.as_slice())
    }

    pub fn entrypoints(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entrypoints
            .iter()
            .map(|(name, files)| (name.as_str(), files.as_slice()))
    }

    /// Every file any entry loads, once, in first-seen order
    pub fn files(&self) -> Vec<&str> {
        let mut seen = Vec::new();
        for (_, files) in &self.entrypoints {
            for file in files {
                if !seen.contains(&file.as_str()) {
                    seen.push(file.as_str());
                }
            }
        }
        seen
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize manifest")
    }
}

impl Serialize for Manifest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entrypoints.len()))?;
        for (name, files) in &self.entrypoints {
            map.serialize_entry(name, files)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundler::{emit::FileKind, partition, ImportKind, Module, ModuleGraph};
    use crate::config::{CacheGroupRule, RuntimeChunk, SplitPolicy};
    use pretty_assertions::assert_eq;

    fn fixture() -> (ChunkPlan, Vec<EmittedFile>) {
        let mut graph = ModuleGraph::new();
        let home = graph.add_module(Module::new("./home.js"));
        let about = graph.add_module(Module::new("./about.js"));
        let lib = graph.add_module(Module::new("./node_modules/lib/index.js"));
        graph.add_dependency(home, "lib", ImportKind::Sync, lib);
        graph.add_dependency(about, "lib", ImportKind::Sync, lib);
        graph.add_entry("home", vec![home]);
        graph.add_entry("about", vec![about]);

        let vendors = CacheGroupRule::regex("vendor", "vendors", "node_modules", 20).unwrap();
        let plan = partition(&graph, &SplitPolicy::new(vec![vendors], RuntimeChunk::Single));
        let files = plan
            .chunks()
            .iter()
            .enumerate()
            .map(|(id, chunk)| EmittedFile {
                chunk: id,
                kind: FileKind::Script,
                file_name: format!("{}.js", chunk.name),
                contents: String::new(),
                starts: None,
                source_map: None,
            })
            .collect();
        (plan, files)
    }

    #[test]
    fn test_runtime_first_entry_last() {
        let (plan, files) = fixture();
        let manifest = Manifest::from_plan(&plan, &files);
        assert_eq!(
            manifest.entry("home").unwrap(),
            &["runtime.js", "vendors.js", "home.js"]
        );
        assert_eq!(
            manifest.entry("about").unwrap(),
            &["runtime.js", "vendors.js", "about.js"]
        );
        assert!(manifest.entry("missing").is_none());
    }

    #[test]
    fn test_shared_files_listed_once() {
        let (plan, files) = fixture();
        let manifest = Manifest::from_plan(&plan, &files);
        assert_eq!(
            manifest.files(),
            vec!["runtime.js", "vendors.js", "home.js", "about.js"]
        );
    }

    #[test]
    fn test_json_keeps_entry_order() {
        let (plan, files) = fixture();
        let json = Manifest::from_plan(&plan, &files).to_json().unwrap();
        assert_eq!(
            json,
            r#"{
  "home": [
    "runtime.js",
    "vendors.js",
    "home.js"
  ],
  "about": [
    "runtime.js",
    "vendors.js",
    "about.js"
  ]
}"#
        );
    }
}
