//! Module graph data structures

use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Unique identifier for a module, an index into the graph
pub type ModuleId = usize;

/// Types of modules the bundler can handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleType {
    JavaScript,
    TypeScript,
    Jsx,
    Tsx,
    Css,
    Json,
    Unknown,
}

/// Output kind of a module: extracted to a stylesheet, or run as script
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ModuleKind {
    Style,
    Script,
}

impl ModuleType {
    /// Determine module type from file extension
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_lowercase().as_str() {
            "js" | "mjs" | "cjs" => ModuleType::JavaScript,
            "ts" | "mts" | "cts" => ModuleType::TypeScript,
            "jsx" => ModuleType::Jsx,
            "tsx" => ModuleType::Tsx,
            "css" => ModuleType::Css,
            "json" => ModuleType::Json,
            _ => ModuleType::Unknown,
        }
    }

    /// Determine module type from path
    pub fn from_path(path: &Path) -> Self {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(ModuleType::from_extension)
            .unwrap_or(ModuleType::Unknown)
    }

    /// Check if this is a JavaScript-like module
    pub fn is_js_like(&self) -> bool {
        matches!(
            self,
            ModuleType::JavaScript | ModuleType::TypeScript | ModuleType::Jsx | ModuleType::Tsx
        )
    }

    pub fn is_typescript(&self) -> bool {
        matches!(self, ModuleType::TypeScript | ModuleType::Tsx)
    }

    pub fn kind(&self) -> ModuleKind {
        match self {
            ModuleType::Css => ModuleKind::Style,
            _ => ModuleKind::Script,
        }
    }
}

/// How a dependency is imported
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportKind {
    /// Static import, `require()` or CSS `@import`
    Sync,
    /// Dynamic `import()`
    Async,
}

/// A resolved edge to another module
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    /// Specifier as written in the importing source
    pub specifier: String,
    pub kind: ImportKind,
    pub target: ModuleId,
}

/// A module in the dependency graph
#[derive(Debug, Clone)]
pub struct Module {
    /// Root-relative identifier, e.g. `./client/index.tsx`
    pub ident: String,

    /// Absolute path to the module
    pub path: PathBuf,

    /// Original source code
    pub source: String,

    /// Module type
    pub module_type: ModuleType,

    /// Transformed code
    pub transformed: Option<String>,
}

impl Module {
    /// A module with no source, typed from its identifier
    pub fn new(ident: impl Into<String>) -> Self {
        let ident = ident.into();
        let path = PathBuf::from(&ident);
        Self {
            module_type: ModuleType::from_path(&path),
            ident,
            path,
            source: String::new(),
            transformed: None,
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn kind(&self) -> ModuleKind {
        self.module_type.kind()
    }

    /// Transformed code, or the source if no transform ran
    pub fn code(&self) -> &str {
        self.transformed.as_deref().unwrap_or(&self.source)
    }
}

/// A named root of the graph
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub name: String,
    /// Asset modules in composition order
    pub assets: Vec<ModuleId>,
}

/// The module dependency graph
#[derive(Debug, Default)]
pub struct ModuleGraph {
    /// All modules indexed by their ID
    modules: Vec<Module>,

    /// Map from identifier to module ID
    ident_to_id: HashMap<String, ModuleId>,

    /// Dependency edges in import order
    edges: Vec<Vec<Dependency>>,

    /// Entries in declaration order
    entries: Vec<Entry>,
}

impl ModuleGraph {
    /// Create a new empty module graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a module to the graph. A module whose identifier is already
    /// present is not added again; the existing ID is returned.
    pub fn add_module(&mut self, module: Module) -> ModuleId {
        if let Some(&id) = self.ident_to_id.get(&module.ident) {
            return id;
        }

        let id = self.modules.len();
        self.ident_to_id.insert(module.ident.clone(), id);
        self.modules.push(module);
        self.edges.push(Vec::new());

        id
    }

    /// Add a dependency edge between modules. Repeated specifiers are kept
    /// once.
    pub fn add_dependency(
        &mut self,
        from: ModuleId,
        specifier: impl Into<String>,
        kind: ImportKind,
        to: ModuleId,
    ) {
        let specifier = specifier.into();
        if let Some(deps) = self.edges.get_mut(from) {
            if deps.iter().any(|dep| dep.specifier == specifier) {
                return;
            }
            deps.push(Dependency {
                specifier,
                kind,
                target: to,
            });
        }
    }

    /// Declare an entry. Entry names are unique; re-adding an entry appends
    /// assets not already listed.
    pub fn add_entry(&mut self, name: impl Into<String>, assets: Vec<ModuleId>) {
        let name = name.into();
        match self.entries.iter_mut().find(|entry| entry.name == name) {
            Some(entry) => {
                for asset in assets {
                    if !entry.assets.contains(&asset) {
                        entry.assets.push(asset);
                    }
                }
            }
            None => self.entries.push(Entry { name, assets }),
        }
    }

    /// Get module ID from identifier
    pub fn get_module_id(&self, ident: &str) -> Option<ModuleId> {
        self.ident_to_id.get(ident).copied()
    }

    /// Get a module by ID
    pub fn get_module(&self, id: ModuleId) -> Option<&Module> {
        self.modules.get(id)
    }

    /// Get a mutable reference to a module
    pub fn get_module_mut(&mut self, id: ModuleId) -> Option<&mut Module> {
        self.modules.get_mut(id)
    }

    /// Get all module IDs
    pub fn all_module_ids(&self) -> Vec<ModuleId> {
        (0..self.modules.len()).collect()
    }

    pub fn modules(&self) -> impl Iterator<Item = (ModuleId, &Module)> {
        self.modules.iter().enumerate()
    }

    /// Get direct dependencies of a module
    pub fn dependencies(&self, id: ModuleId) -> &[Dependency] {
        self.edges.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    /// Total number of modules
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    /// Check if graph is empty
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_type_detection() {
        assert_eq!(ModuleType::from_extension("js"), ModuleType::JavaScript);
        assert_eq!(ModuleType::from_extension("ts"), ModuleType::TypeScript);
        assert_eq!(ModuleType::from_extension("jsx"), ModuleType::Jsx);
        assert_eq!(ModuleType::from_extension("tsx"), ModuleType::Tsx);
        assert_eq!(ModuleType::from_extension("css"), ModuleType::Css);
        assert_eq!(ModuleType::from_extension("json"), ModuleType::Json);
        assert_eq!(ModuleType::from_extension("xyz"), ModuleType::Unknown);
        assert_eq!(ModuleType::Css.kind(), ModuleKind::Style);
        assert_eq!(ModuleType::Tsx.kind(), ModuleKind::Script);
    }

    #[test]
    fn test_module_type_from_versioned_path() {
        let path = Path::new("./vendors/normalize.css@8.0.1/normalize.css");
        assert_eq!(ModuleType::from_path(path), ModuleType::Css);
    }

    #[test]
    fn test_module_graph_basic() {
        let mut graph = ModuleGraph::new();

        let id = graph.add_module(Module::new("./main.js").with_source("console.log('test')"));
        assert_eq!(graph.len(), 1);
        assert!(graph.get_module(id).is_some());
        assert_eq!(graph.get_module_id("./main.js"), Some(id));
    }

    #[test]
    fn test_modules_deduplicated_by_ident() {
        let mut graph = ModuleGraph::new();
        let a = graph.add_module(Module::new("./a.js").with_source("first"));
        let again = graph.add_module(Module::new("./a.js").with_source("second"));
        assert_eq!(a, again);
        assert_eq!(graph.len(), 1);
        assert_eq!(graph.get_module(a).unwrap().source, "first");
    }

    #[test]
    fn test_dependencies_keep_import_order() {
        let mut graph = ModuleGraph::new();
        let main = graph.add_module(Module::new("./main.js"));
        let b = graph.add_module(Module::new("./b.js"));
        let a = graph.add_module(Module::new("./a.js"));
        graph.add_dependency(main, "./b", ImportKind::Sync, b);
        graph.add_dependency(main, "./a", ImportKind::Async, a);
        graph.add_dependency(main, "./b", ImportKind::Sync, b);

        let targets: Vec<_> = graph.dependencies(main).iter().map(|d| d.target).collect();
        assert_eq!(targets, vec![b, a]);
        assert_eq!(graph.dependencies(main)[1].kind, ImportKind::Async);
        assert!(graph.dependencies(a).is_empty());
    }
}
