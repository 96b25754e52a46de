//! Configuration schema definitions

use serde::{Deserialize, Serialize};

/// Project metadata configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Project name, used as the default HTML title
    pub name: String,

    /// Project version
    #[serde(default = "default_version")]
    pub version: String,
}

fn default_version() -> String {
    "0.1.0".to_string()
}

/// A named entry: an ordered list of assets composed into one logical page bundle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryConfig {
    /// Entry name (used as the entry chunk name)
    pub name: String,

    /// Assets in composition order, relative to the project root
    pub assets: Vec<String>,
}

/// Output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Output directory
    #[serde(default = "default_output_dir")]
    pub dir: String,

    /// Public URL prefix for emitted files
    #[serde(default = "default_public_path")]
    pub public_path: String,

    /// File name template for script files
    #[serde(default = "default_filename")]
    pub filename: String,

    /// File name template for extracted stylesheets
    #[serde(default = "default_css_filename")]
    pub css_filename: String,

    /// Write the entry manifest
    #[serde(default = "default_true")]
    pub manifest: bool,

    /// Manifest file name inside the output directory
    #[serde(default = "default_manifest_filename")]
    pub manifest_filename: String,

    /// Empty the output directory before writing
    #[serde(default)]
    pub clean: bool,

    /// Write a line map next to every chunk file
    #[serde(default)]
    pub source_map: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
            public_path: default_public_path(),
            filename: default_filename(),
            css_filename: default_css_filename(),
            manifest: true,
            manifest_filename: default_manifest_filename(),
            clean: false,
            source_map: false,
        }
    }
}

fn default_output_dir() -> String {
    "dist".to_string()
}

fn default_public_path() -> String {
    "/".to_string()
}

fn default_filename() -> String {
    "[name].[contenthash].js".to_string()
}

fn default_css_filename() -> String {
    "[name].[contenthash].css".to_string()
}

fn default_manifest_filename() -> String {
    "manifest.json".to_string()
}

fn default_true() -> bool {
    true
}

/// Module resolution settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolveConfig {
    /// Extensions tried, in order, for extension-less specifiers
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,

    /// Directory names searched for bare specifiers
    #[serde(default = "default_modules")]
    pub modules: Vec<String>,
}

impl Default for ResolveConfig {
    fn default() -> Self {
        Self {
            extensions: default_extensions(),
            modules: default_modules(),
        }
    }
}

fn default_extensions() -> Vec<String> {
    [".js", ".jsx", ".ts", ".tsx", ".json"]
        .iter()
        .map(|ext| ext.to_string())
        .collect()
}

fn default_modules() -> Vec<String> {
    vec!["node_modules".to_string()]
}

/// HTML document generation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HtmlConfig {
    /// Generate an HTML document referencing the emitted files
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Template path relative to the project root
    #[serde(default)]
    pub template: Option<String>,

    /// Output file name
    #[serde(default = "default_html_filename")]
    pub filename: String,

    /// Document title for the generated default document
    #[serde(default)]
    pub title: Option<String>,
}

impl Default for HtmlConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            template: None,
            filename: default_html_filename(),
            title: None,
        }
    }
}

fn default_html_filename() -> String {
    "index.html".to_string()
}

/// How the module-loader bootstrap is placed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeChunk {
    /// Inline the bootstrap in every chunk that runs entry modules
    #[default]
    None,
    /// One `runtime` chunk shared by all entries
    Single,
    /// One `runtime~<entry>` chunk per entry
    Multiple,
}

/// Module id strategy for the emitted code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleIdStrategy {
    /// The root-relative module identifier
    #[default]
    Named,
    /// A short base64 digest of the identifier
    Hashed,
}

/// Which import kinds a cache group applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkSelection {
    /// Modules reachable through synchronous imports only
    Initial,
    /// Modules reachable through a dynamic import
    Async,
    /// Both
    #[default]
    All,
}

impl ChunkSelection {
    /// Whether a module with the given reachability is eligible
    pub fn accepts(self, initial: bool, on_demand: bool) -> bool {
        match self {
            ChunkSelection::Initial => initial,
            ChunkSelection::Async => on_demand,
            ChunkSelection::All => true,
        }
    }
}

/// Match condition of a cache group
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TestConfig {
    /// Regular expression over the module identifier
    Regex(String),
    /// Glob over the module identifier
    Glob { glob: String },
}

/// A cache group: moves matching modules into a named shared chunk
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheGroupConfig {
    /// Unique key of the group
    pub key: String,

    /// Target chunk name (defaults to the key)
    #[serde(default)]
    pub name: Option<String>,

    /// Match condition; absent matches every module
    #[serde(default)]
    pub test: Option<TestConfig>,

    /// Higher priority wins when several groups match
    #[serde(default)]
    pub priority: i32,

    /// Import kinds this group applies to
    #[serde(default)]
    pub chunks: ChunkSelection,

    /// Minimum number of entries that must reach a module
    #[serde(default = "default_min_chunks")]
    pub min_chunks: usize,

    /// Disabled groups are ignored
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl CacheGroupConfig {
    /// Name of the chunk this group fills
    pub fn chunk_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.key)
    }
}

fn default_min_chunks() -> usize {
    1
}

/// Chunk optimisation settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OptimizationConfig {
    /// Runtime extraction mode
    #[serde(default)]
    pub runtime_chunk: RuntimeChunk,

    /// Module id strategy
    #[serde(default)]
    pub module_ids: ModuleIdStrategy,

    /// Minify extracted stylesheets
    #[serde(default)]
    pub minify: bool,

    /// Cache groups in declaration order
    #[serde(default)]
    pub cache_groups: Vec<CacheGroupConfig>,
}

/// Plugin configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginConfig {
    /// Plugin name/identifier
    pub name: String,

    /// Plugin-specific options
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<toml::Table>,
}
