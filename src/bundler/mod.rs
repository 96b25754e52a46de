//! Core bundler implementation
//!
//! Resolves entries into a module graph, runs the transform chain,
//! partitions the graph into chunks and writes the output.

mod chunk;
mod emit;
mod graph;
mod link;
mod manifest;
mod module_ids;
mod partition;
mod stats;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{anyhow, bail, Context, Result};
use futures_util::{stream, StreamExt, TryStreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use parking_lot::RwLock;
use tracing::{debug, info};

use crate::cli::BuildOptions;
use crate::config::{Config, SplitPolicy};
use crate::html;
use crate::plugins::{ModuleInfo, PluginManager};
use crate::resolver::{Resolution, ResolveError, Resolver};
use crate::transform::plugin_chain;
use crate::utils::module_ident;

pub use chunk::{Chunk, ChunkKind};
pub use emit::{EmittedFile, Emitter, FileKind, CHUNK_QUEUE};
pub use graph::{Dependency, Entry, ImportKind, Module, ModuleGraph, ModuleId, ModuleKind, ModuleType};
pub use link::{link_script, link_style, Imports, LinkedStyle};
pub use manifest::Manifest;
pub use module_ids::ModuleIds;
pub use partition::{partition, ChunkId, ChunkPlan, EntryPoint, FALLBACK_CHUNK};
pub use stats::{BuildStats, STATS_FILE};

/// Result of a build operation
#[derive(Debug)]
pub struct BuildResult {
    pub output_dir: PathBuf,

    /// Written chunk files, in chunk order
    pub bundles: Vec<BundleInfo>,

    /// Entry manifest
    pub manifest: Manifest,

    /// Present when the build was analysed
    pub stats: Option<BuildStats>,
}

/// Information about a written chunk file
#[derive(Debug)]
pub struct BundleInfo {
    /// Output file path
    pub output_path: PathBuf,

    pub chunk: String,

    pub kind: FileKind,

    /// Size in bytes
    pub size: usize,
}

/// The main bundler
pub struct Bundler {
    /// Project configuration
    config: Arc<Config>,

    /// Build options
    options: BuildOptions,

    /// Compiled chunk-splitting policy
    policy: SplitPolicy,

    /// Module resolver
    resolver: Resolver,

    /// Transform chain
    plugins: PluginManager,

    /// Module graph
    graph: Arc<RwLock<ModuleGraph>>,
}

impl Bundler {
    /// Create a new bundler instance
    pub fn new(mut config: Config, options: BuildOptions) -> Result<Self> {
        // identifiers are computed against canonical module paths
        config.root = fs::canonicalize(&config.root)
            .with_context(|| format!("Project root not found: {}", config.root.display()))?;

        let policy = config.split_policy()?;
        let plugins = plugin_chain(&config, options.minify || config.optimization.minify)?;
        let config = Arc::new(config);
        let resolver = Resolver::new(config.clone())?;

        Ok(Self {
            config,
            options,
            policy,
            resolver,
            plugins,
            graph: Arc::new(RwLock::new(ModuleGraph::new())),
        })
    }

    pub fn graph(&self) -> Arc<RwLock<ModuleGraph>> {
        self.graph.clone()
    }

    /// Output directory: `--outdir` if given, else the configured one
    pub fn output_dir(&self) -> PathBuf {
        self.options
            .outdir
            .clone()
            .unwrap_or_else(|| self.config.output_dir())
    }

    /// Build the project
    pub async fn build(&self) -> Result<BuildResult> {
        let start = Instant::now();
        self.plugins.run_build_start().await?;

        // 1. Resolve entries into the module graph
        info!("Building module graph...");
        self.build_module_graph().await?;

        // 2. Run the transform chain
        info!("Transforming modules...");
        self.transform_modules().await?;

        // 3. Partition, render and write
        let result = {
            let graph = self.graph.read();
            info!("Partitioning {} modules...", graph.len());
            let plan = partition(&graph, &self.policy);
            self.emit(&graph, &plan)?
        };

        self.plugins.run_build_end().await?;
        debug!("Build completed in {:?}", start.elapsed());

        Ok(result)
    }

    /// Resolve the graph and partition it without transforming or writing
    pub async fn plan(&self) -> Result<ChunkPlan> {
        self.build_module_graph().await?;
        let graph = self.graph.read();
        Ok(partition(&graph, &self.policy))
    }

    /// Build the module graph from the configured entries
    async fn build_module_graph(&self) -> Result<()> {
        for entry in &self.config.entries {
            debug!("Processing entry: {}", entry.name);

            let mut assets = Vec::with_capacity(entry.assets.len());
            for asset in &entry.assets {
                let path = self
                    .resolver
                    .resolve_entry(asset)
                    .ok_or_else(|| ResolveError::MissingAsset {
                        entry: entry.name.clone(),
                        asset: asset.clone(),
                    })?;
                assets.push(self.process_module(&path, &entry.name).await?);
            }

            self.graph.write().add_entry(entry.name.clone(), assets);
        }

        Ok(())
    }

    /// Process a single module and its dependencies
    ///
    /// Uses Box::pin for async recursion to avoid infinite type size issues
    async fn process_module(&self, path: &Path, entry: &str) -> Result<ModuleId> {
        let read_error = |source| ResolveError::Read {
            entry: entry.to_string(),
            path: path.to_path_buf(),
            source,
        };

        let canonical_path = fs::canonicalize(path).map_err(read_error)?;
        let ident = module_ident(&self.config.root, &canonical_path);

        // Check if already processed
        let existing = self.graph.read().get_module_id(&ident);
        if let Some(id) = existing {
            return Ok(id);
        }

        let module_type = ModuleType::from_path(&canonical_path);
        if module_type == ModuleType::Unknown {
            return Err(ResolveError::Unsupported {
                entry: entry.to_string(),
                path: canonical_path,
            }
            .into());
        }

        let source = fs::read_to_string(&canonical_path).map_err(read_error)?;
        let dependencies = self.resolver.extract_dependencies(&source, module_type);

        let module = Module {
            ident: ident.clone(),
            path: canonical_path.clone(),
            source,
            module_type,
            transformed: None,
        };
        let module_id = self.graph.write().add_module(module);

        for dep in dependencies {
            match self
                .resolver
                .resolve(&dep.specifier, &canonical_path, module_type.kind())?
            {
                Resolution::Module(resolved) => {
                    let dep_id = Box::pin(self.process_module(&resolved, entry)).await?;
                    self.graph
                        .write()
                        .add_dependency(module_id, dep.specifier, dep.kind, dep_id);
                }
                Resolution::External => debug!("External import '{}' in {}", dep.specifier, ident),
                Resolution::NotFound => {
                    return Err(ResolveError::Unresolved {
                        entry: entry.to_string(),
                        specifier: dep.specifier,
                        importer: ident,
                    }
                    .into())
                }
            }
        }

        Ok(module_id)
    }

    /// Transform all modules, `jobs` at a time
    async fn transform_modules(&self) -> Result<()> {
        let module_ids = self.graph.read().all_module_ids();

        let bar = if self.options.progress {
            ProgressBar::new(module_ids.len() as u64)
        } else {
            ProgressBar::hidden()
        };
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} [{bar:30.cyan/blue}] {pos}/{len} {wide_msg}")?
                .progress_chars("=> "),
        );

        let transformed: Vec<(ModuleId, String)> = stream::iter(module_ids)
            .map(|id| {
                let bar = &bar;
                async move {
                    let (source, info) = {
                        let graph = self.graph.read();
                        let module = graph
                            .get_module(id)
                            .ok_or_else(|| anyhow!("Unknown module id {}", id))?;
                        let info = ModuleInfo {
                            ident: module.ident.clone(),
                            path: module.path.clone(),
                            module_type: module.module_type,
                        };
                        (module.source.clone(), info)
                    };

                    bar.set_message(info.ident.clone());
                    let code = self.plugins.transform(&source, &info).await?;
                    bar.inc(1);
                    Ok::<_, anyhow::Error>((id, code))
                }
            })
            .buffered(self.options.jobs.max(1))
            .try_collect()
            .await?;

        bar.finish_and_clear();

        let mut graph = self.graph.write();
        for (id, code) in transformed {
            if let Some(module) = graph.get_module_mut(id) {
                module.transformed = Some(code);
            }
        }

        Ok(())
    }

    /// Empty the output directory; a directory holding the project root is
    /// never removed
    fn clean_output(&self, output_dir: &Path) -> Result<()> {
        if !output_dir.exists() {
            return Ok(());
        }
        let canonical = fs::canonicalize(output_dir)
            .with_context(|| format!("Failed to resolve {}", output_dir.display()))?;
        if self.config.root.starts_with(&canonical) {
            bail!(
                "Refusing to clean {}: it contains the project root",
                output_dir.display()
            );
        }

        debug!("Cleaning {}", canonical.display());
        fs::remove_dir_all(&canonical)
            .with_context(|| format!("Failed to clean {}", output_dir.display()))
    }

    /// Render the chunks and write every output file
    fn emit(&self, graph: &ModuleGraph, plan: &ChunkPlan) -> Result<BuildResult> {
        let ids = ModuleIds::assign(graph, self.config.optimization.module_ids);
        let files = Emitter::new(graph, plan, &ids, &self.config)?
            .with_source_maps(self.options.source_map || self.config.output.source_map)
            .render()?;
        let manifest = Manifest::from_plan(plan, &files);

        let output_dir = self.output_dir();
        if self.config.output.clean {
            self.clean_output(&output_dir)?;
        }
        fs::create_dir_all(&output_dir).context("Failed to create output directory")?;

        info!("Writing {} files...", files.len());
        let mut bundles = Vec::with_capacity(files.len());
        for file in &files {
            let output_path = output_dir.join(&file.file_name);
            if let Some(parent) = output_path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&output_path, &file.contents)
                .with_context(|| format!("Failed to write bundle: {}", output_path.display()))?;
            if let Some(map) = &file.source_map {
                let map_path = output_dir.join(file.map_name());
                fs::write(&map_path, map)
                    .with_context(|| format!("Failed to write {}", map_path.display()))?;
            }

            bundles.push(BundleInfo {
                output_path,
                chunk: plan
                    .chunk(file.chunk)
                    .map(|chunk| chunk.name.clone())
                    .unwrap_or_default(),
                kind: file.kind,
                size: file.contents.len(),
            });
        }

        if self.config.output.manifest {
            let manifest_path = output_dir.join(&self.config.output.manifest_filename);
            fs::write(&manifest_path, manifest.to_json()?)
                .with_context(|| format!("Failed to write {}", manifest_path.display()))?;
        }

        if self.config.html.enabled {
            let document = html::render_document(&self.config, &manifest, &files)?;
            let html_path = output_dir.join(&self.config.html.filename);
            fs::write(&html_path, document)
                .with_context(|| format!("Failed to write {}", html_path.display()))?;
        }

        let stats = if self.options.analyse {
            let stats = BuildStats::collect(graph, plan, &files, &manifest);
            let stats_path = output_dir.join(STATS_FILE);
            fs::write(&stats_path, stats.to_json()?)
                .with_context(|| format!("Failed to write {}", stats_path.display()))?;
            Some(stats)
        } else {
            None
        };

        Ok(BuildResult {
            output_dir,
            bundles,
            manifest,
            stats,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(root: &Path, path: &str, contents: &str) {
        let path = root.join(path);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    fn options(outdir: &Path) -> BuildOptions {
        BuildOptions {
            outdir: Some(outdir.to_path_buf()),
            minify: false,
            source_map: false,
            analyse: true,
            progress: false,
            jobs: 2,
        }
    }

    fn gallery(root: &Path) -> Config {
        write(root, "vendors/normalize.css", "html { margin: 0; }\n");
        write(root, "vendors/theme.css", ".hljs { color: #333; }\n");
        write(
            root,
            "client/index.tsx",
            "import x from \"x\";\nimport \"./index.css\";\nconst answer: number = x();\nconsole.log(answer);\n",
        );
        write(root, "client/index.css", "body { color: black; }\n");
        write(root, "node_modules/x/package.json", r#"{"main": "lib/x.js"}"#);
        write(root, "node_modules/x/lib/x.js", "module.exports = function () { return 42; };\n");

        Config::from_toml(
            r#"[project]
name = "gallery"

[output]
filename = "[name].js"
css_filename = "[name].css"

[[entry]]
name = "vendor-styles"
assets = ["./vendors/normalize.css", "./vendors/theme.css"]

[[entry]]
name = "client"
assets = ["./client/index.tsx"]

[optimization]
runtime_chunk = "single"

[[optimization.cache_groups]]
key = "vendor"
name = "vendors"
test = "[\\/]node_modules[\\/]"
priority = 20
"#,
            root.to_path_buf(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_build_gallery() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        let out = root.join("dist");
        let bundler = Bundler::new(gallery(root), options(&out)).unwrap();

        let result = bundler.build().await.unwrap();
        assert_eq!(
            result.manifest.entry("client").unwrap(),
            &["runtime.js", "vendors.js", "client.css", "client.js"]
        );
        assert_eq!(
            result.manifest.entry("vendor-styles").unwrap(),
            &["runtime.js", "vendor-styles.css"]
        );

        let client = fs::read_to_string(out.join("client.js")).unwrap();
        assert!(client.contains("const answer = "));
        assert!(!client.contains("return 42"));
        let vendors = fs::read_to_string(out.join("vendors.js")).unwrap();
        assert!(vendors.contains("return 42"));

        let styles = fs::read_to_string(out.join("vendor-styles.css")).unwrap();
        assert_eq!(styles, "html { margin: 0; }\n.hljs { color: #333; }\n");

        let html = fs::read_to_string(out.join("index.html")).unwrap();
        let runtime_at = html.find("/runtime.js").unwrap();
        let vendors_at = html.find("/vendors.js").unwrap();
        let client_at = html.find("/client.js").unwrap();
        assert!(runtime_at < vendors_at && vendors_at < client_at);
        assert_eq!(html.matches("/runtime.js").count(), 1);

        assert!(out.join("manifest.json").is_file());
        assert!(out.join(STATS_FILE).is_file());
        assert!(result.stats.is_some());
    }

    #[tokio::test]
    async fn test_clean_keeps_project_root() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        write(root, "main.js", "console.log(1);\n");
        let config = Config::from_toml(
            "[project]\nname = \"t\"\n[output]\nclean = true\n[[entry]]\nname = \"main\"\nassets = [\"./main.js\"]\n",
            root.to_path_buf(),
        )
        .unwrap();
        let bundler = Bundler::new(config, options(root)).unwrap();

        let err = bundler.build().await.unwrap_err();
        assert!(err.to_string().starts_with("Refusing to clean"));
        assert!(root.join("main.js").is_file());

        let out = root.join("dist");
        write(&out, "stale.js", "old\n");
        let config = Config::from_toml(
            "[project]\nname = \"t\"\n[output]\nclean = true\n[[entry]]\nname = \"main\"\nassets = [\"./main.js\"]\n",
            root.to_path_buf(),
        )
        .unwrap();
        Bundler::new(config, options(&out)).unwrap().build().await.unwrap();
        assert!(!out.join("stale.js").exists());
        assert!(out.join("manifest.json").is_file());
    }

    #[tokio::test]
    async fn test_sibling_stylesheet_import() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        write(root, "styles/main.css", "@import url(theme.css);\nbody { margin: 0; }\n");
        write(root, "styles/theme.css", ".theme { color: teal; }\n");
        let config = Config::from_toml(
            "[project]\nname = \"t\"\n[output]\ncss_filename = \"[name].css\"\n[[entry]]\nname = \"s\"\nassets = [\"./styles/main.css\"]\n",
            root.to_path_buf(),
        )
        .unwrap();
        let out = root.join("dist");
        Bundler::new(config, options(&out)).unwrap().build().await.unwrap();

        let css = fs::read_to_string(out.join("s.css")).unwrap();
        assert_eq!(css, ".theme { color: teal; }\nbody { margin: 0; }\n");
    }

    #[tokio::test]
    async fn test_missing_entry_asset() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        let config = Config::from_toml(
            "[project]\nname = \"t\"\n[[entry]]\nname = \"client\"\nassets = [\"./missing.js\"]\n",
            root.to_path_buf(),
        )
        .unwrap();
        let bundler = Bundler::new(config, options(&root.join("dist"))).unwrap();

        let err = bundler.build().await.unwrap_err();
        assert_eq!(err.to_string(), "entry 'client': asset './missing.js' not found");
    }

    #[tokio::test]
    async fn test_unresolved_import() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        write(root, "main.js", "import gone from './gone';\n");
        let config = Config::from_toml(
            "[project]\nname = \"t\"\n[[entry]]\nname = \"main\"\nassets = [\"./main.js\"]\n",
            root.to_path_buf(),
        )
        .unwrap();
        let bundler = Bundler::new(config, options(&root.join("dist"))).unwrap();

        let err = bundler.plan().await.unwrap_err();
        let err = err.downcast::<ResolveError>().unwrap();
        assert!(matches!(err, ResolveError::Unresolved { specifier, .. } if specifier == "./gone"));
    }
}
