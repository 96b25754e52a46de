//! Module resolution
//!
//! Extracts import specifiers from sources and resolves them to files.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;
use tracing::debug;

use crate::bundler::{ImportKind, ModuleKind, ModuleType};
use crate::config::Config;

/// `import a, { b } from "x"` (group 1 set for `import type`)
pub static IMPORT_FROM_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?m)^[ \t]*import\s+(type\s+)?([\w$*{}\s,]+?)\s+from\s*["']([^"']+)["'][ \t]*;?"#)
        .unwrap()
});

/// `import "x"`
pub static SIDE_EFFECT_IMPORT_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?m)^[ \t]*import\s*["']([^"']+)["'][ \t]*;?"#).unwrap()
});

/// `export * from "x"`, `export { a } from "x"`
pub static EXPORT_FROM_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?m)^[ \t]*export\s+(type\s+)?(\*(?:\s+as\s+[\w$]+)?|\{[^}]*\})\s*from\s*["']([^"']+)["'][ \t]*;?"#,
    )
    .unwrap()
});

/// `require("x")`
pub static REQUIRE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"\brequire\s*\(\s*["']([^"']+)["']\s*\)"#).unwrap()
});

/// `import("x")`
pub static DYNAMIC_IMPORT_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"\bimport\s*\(\s*["']([^"']+)["']\s*\)"#).unwrap()
});

/// `@import "x";`, `@import url(x) screen;`
pub static CSS_IMPORT_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"@import\s+(?:url\(\s*["']?([^"')]+)["']?\s*\)|["']([^"']+)["'])[^;]*;"#).unwrap()
});

/// Resolution failures; each is fatal to the build
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("entry '{entry}': asset '{asset}' not found")]
    MissingAsset { entry: String, asset: String },

    #[error("entry '{entry}': cannot resolve '{specifier}' from {importer}")]
    Unresolved {
        entry: String,
        specifier: String,
        importer: String,
    },

    #[error("entry '{entry}': unsupported asset type {path}")]
    Unsupported { entry: String, path: PathBuf },

    #[error("entry '{entry}': failed to read {path}")]
    Read {
        entry: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A dependency found in a module's source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencySpec {
    pub specifier: String,
    pub kind: ImportKind,
}

/// Outcome of resolving one specifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// A file to bundle
    Module(PathBuf),
    /// Left to the browser (URLs)
    External,
    NotFound,
}

/// Module resolver
pub struct Resolver {
    /// Project configuration
    config: Arc<Config>,
}

impl Resolver {
    /// Create a new resolver
    pub fn new(config: Arc<Config>) -> Result<Self> {
        Ok(Self { config })
    }

    /// Extract dependencies from source code, in source order
    pub fn extract_dependencies(&self, source: &str, module_type: ModuleType) -> Vec<DependencySpec> {
        let mut found: Vec<(usize, DependencySpec)> = Vec::new();
        let mut push = |at: usize, specifier: &str, kind: ImportKind| {
            found.push((
                at,
                DependencySpec {
                    specifier: specifier.to_string(),
                    kind,
                },
            ));
        };

        if module_type.kind() == ModuleKind::Style {
            for cap in CSS_IMPORT_REGEX.captures_iter(source) {
                if let Some(spec) = cap.get(1).or_else(|| cap.get(2)) {
                    push(cap.get(0).map_or(0, |m| m.start()), spec.as_str().trim(), ImportKind::Sync);
                }
            }
        } else if module_type.is_js_like() {
            for cap in IMPORT_FROM_REGEX.captures_iter(source) {
                if cap.get(1).is_none() {
                    push(cap.get(0).map_or(0, |m| m.start()), &cap[3], ImportKind::Sync);
                }
            }
            for cap in SIDE_EFFECT_IMPORT_REGEX.captures_iter(source) {
                push(cap.get(0).map_or(0, |m| m.start()), &cap[1], ImportKind::Sync);
            }
            for cap in EXPORT_FROM_REGEX.captures_iter(source) {
                if cap.get(1).is_none() {
                    push(cap.get(0).map_or(0, |m| m.start()), &cap[3], ImportKind::Sync);
                }
            }
            for cap in REQUIRE_REGEX.captures_iter(source) {
                push(cap.get(0).map_or(0, |m| m.start()), &cap[1], ImportKind::Sync);
            }
            for cap in DYNAMIC_IMPORT_REGEX.captures_iter(source) {
                push(cap.get(0).map_or(0, |m| m.start()), &cap[1], ImportKind::Async);
            }
        }

        found.sort_by_key(|(at, _)| *at);

        let mut dependencies: Vec<DependencySpec> = Vec::new();
        for (_, dep) in found {
            match dependencies.iter_mut().find(|d| d.specifier == dep.specifier) {
                // a static import anywhere makes the edge synchronous
                Some(existing) => {
                    if dep.kind == ImportKind::Sync {
                        existing.kind = ImportKind::Sync;
                    }
                }
                None => dependencies.push(dep),
            }
        }

        debug!("Found {} dependencies", dependencies.len());

        dependencies
    }

    /// Resolve an entry asset relative to the project root
    pub fn resolve_entry(&self, asset: &str) -> Option<PathBuf> {
        self.resolve_file(&self.config.root.join(asset))
    }

    /// Resolve an import specifier found in `from`
    pub fn resolve(&self, specifier: &str, from: &Path, kind: ModuleKind) -> Result<Resolution> {
        debug!("Resolving '{}' from '{}'", specifier, from.display());

        if is_external(specifier) {
            return Ok(Resolution::External);
        }

        let base_dir = from.parent().unwrap_or(Path::new("."));

        let resolved = if specifier.starts_with('.') || specifier.starts_with('/') {
            let target = if specifier.starts_with('/') {
                self.config.root.join(specifier.trim_start_matches('/'))
            } else {
                base_dir.join(specifier)
            };
            self.resolve_file(&target)
        } else if let Some(package) = specifier.strip_prefix('~') {
            // `~pkg/file.css` in stylesheets refers to a package
            self.resolve_bare(package, base_dir, kind)?
        } else if kind == ModuleKind::Style {
            // plain `@import "theme.css"` is relative to the sheet
            match self.resolve_file(&base_dir.join(specifier)) {
                Some(path) => Some(path),
                None => self.resolve_bare(specifier, base_dir, kind)?,
            }
        } else {
            self.resolve_bare(specifier, base_dir, kind)?
        };

        debug!("Resolved to: {:?}", resolved);

        Ok(match resolved {
            Some(path) => Resolution::Module(path),
            None => Resolution::NotFound,
        })
    }

    /// Resolve a path: exact file, then configured extensions appended,
    /// then a directory index
    fn resolve_file(&self, target: &Path) -> Option<PathBuf> {
        if target.is_file() {
            return Some(target.to_path_buf());
        }

        for ext in &self.config.resolve.extensions {
            let mut with_ext = OsString::from(target.as_os_str());
            with_ext.push(ext);
            let with_ext = PathBuf::from(with_ext);
            if with_ext.is_file() {
                return Some(with_ext);
            }
        }

        if target.is_dir() {
            for ext in &self.config.resolve.extensions {
                let index = target.join(format!("index{}", ext));
                if index.is_file() {
                    return Some(index);
                }
            }
        }

        None
    }

    /// Resolve a bare import by walking up to the nearest package directory
    fn resolve_bare(&self, specifier: &str, from: &Path, kind: ModuleKind) -> Result<Option<PathBuf>> {
        let mut current = from.to_path_buf();

        loop {
            for modules in &self.config.resolve.modules {
                let node_modules = current.join(modules);
                if node_modules.is_dir() {
                    if let Some(resolved) = self.resolve_in_node_modules(&node_modules, specifier, kind)? {
                        return Ok(Some(resolved));
                    }
                }
            }

            // Move to parent directory
            if !current.pop() {
                break;
            }
        }

        Ok(None)
    }

    /// Resolve a module within a node_modules directory
    fn resolve_in_node_modules(
        &self,
        node_modules: &Path,
        specifier: &str,
        kind: ModuleKind,
    ) -> Result<Option<PathBuf>> {
        let (package_name, subpath) = split_package_specifier(specifier);
        let package_dir = node_modules.join(package_name);

        if !package_dir.is_dir() {
            return Ok(None);
        }

        if let Some(sub) = subpath {
            return Ok(self.resolve_file(&package_dir.join(sub)));
        }

        let package_json = package_dir.join("package.json");
        if package_json.is_file() {
            let content = fs::read_to_string(&package_json)
                .with_context(|| format!("Failed to read {}", package_json.display()))?;
            let pkg: serde_json::Value = serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse {}", package_json.display()))?;

            let fields: &[&str] = match kind {
                ModuleKind::Style => &["style", "main"],
                ModuleKind::Script => &["module", "main"],
            };
            for field in fields {
                if let Some(entry) = pkg.get(field).and_then(|v| v.as_str()) {
                    if let Some(resolved) = self.resolve_file(&package_dir.join(entry)) {
                        return Ok(Some(resolved));
                    }
                }
            }
        }

        Ok(self.resolve_file(&package_dir.join("index")))
    }
}

/// Split `@scope/name/sub` or `name/sub` into package name and subpath
fn split_package_specifier(specifier: &str) -> (&str, Option<&str>) {
    let split_at = if specifier.starts_with('@') {
        specifier
            .match_indices('/')
            .nth(1)
            .map(|(i, _)| i)
    } else {
        specifier.find('/')
    };

    match split_at {
        Some(i) => (&specifier[..i], Some(&specifier[i + 1..])),
        None => (specifier, None),
    }
}

fn is_external(specifier: &str) -> bool {
    ["http://", "https://", "//", "data:"]
        .iter()
        .any(|prefix| specifier.starts_with(prefix))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn resolver(root: &Path) -> Resolver {
        let config = Config::from_toml(
            "[project]\nname = \"t\"\n[[entry]]\nname = \"main\"\nassets = [\"./main.js\"]\n",
            root.to_path_buf(),
        )
        .unwrap();
        Resolver::new(Arc::new(config)).unwrap()
    }

    fn specifiers(deps: &[DependencySpec]) -> Vec<&str> {
        deps.iter().map(|d| d.specifier.as_str()).collect()
    }

    #[test]
    fn test_extract_imports() {
        let source = r#"
import foo from './foo';
import React, { useState } from "react";
import { bar } from './bar.js';
import * as baz from '../baz';
import type { Props } from './types';
import './style.css';
export { qux } from './qux';
const x = require('./x');
"#;

        let r = resolver(Path::new("/"));
        let deps = r.extract_dependencies(source, ModuleType::Tsx);

        assert_eq!(
            specifiers(&deps),
            vec!["./foo", "react", "./bar.js", "../baz", "./style.css", "./qux", "./x"]
        );
        assert!(deps.iter().all(|d| d.kind == ImportKind::Sync));
    }

    #[test]
    fn test_extract_dynamic_imports() {
        let source = r#"
const page = import('./dynamic');
import('./other').then(m => m.default);
import eager from './other';
"#;

        let r = resolver(Path::new("/"));
        let deps = r.extract_dependencies(source, ModuleType::JavaScript);

        assert_eq!(deps[0].specifier, "./dynamic");
        assert_eq!(deps[0].kind, ImportKind::Async);
        assert_eq!(deps[1].specifier, "./other");
        assert_eq!(deps[1].kind, ImportKind::Sync);
    }

    #[test]
    fn test_extract_css_imports() {
        let source = r#"
@import "./base.css";
@import url(theme.css) screen;
@import url("https://fonts.example.com/inter.css");
body { color: red; }
"#;
        let r = resolver(Path::new("/"));
        let deps = r.extract_dependencies(source, ModuleType::Css);
        assert_eq!(
            specifiers(&deps),
            vec!["./base.css", "theme.css", "https://fonts.example.com/inter.css"]
        );
    }

    #[test]
    fn test_resolve_relative_with_extensions() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("client/components")).unwrap();
        fs::write(root.join("client/index.tsx"), "").unwrap();
        fs::write(root.join("client/layout.tsx"), "").unwrap();
        fs::write(root.join("client/components/index.ts"), "").unwrap();

        let r = resolver(root);
        let from = root.join("client/index.tsx");
        assert_eq!(
            r.resolve("./layout", &from, ModuleKind::Script).unwrap(),
            Resolution::Module(root.join("client/layout.tsx"))
        );
        assert_eq!(
            r.resolve("./components", &from, ModuleKind::Script).unwrap(),
            Resolution::Module(root.join("client/components/index.ts"))
        );
        assert_eq!(
            r.resolve("./missing", &from, ModuleKind::Script).unwrap(),
            Resolution::NotFound
        );
        assert_eq!(
            r.resolve("https://cdn.example.com/a.js", &from, ModuleKind::Script).unwrap(),
            Resolution::External
        );
    }

    #[test]
    fn test_resolve_bare_packages() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        let pkg = root.join("node_modules/@loadable/component");
        fs::create_dir_all(pkg.join("dist")).unwrap();
        fs::write(pkg.join("package.json"), r#"{"main": "dist/loadable.cjs.js"}"#).unwrap();
        fs::write(pkg.join("dist/loadable.cjs.js"), "").unwrap();
        let highlight = root.join("node_modules/highlight.js/styles");
        fs::create_dir_all(&highlight).unwrap();
        fs::write(highlight.join("github.css"), "").unwrap();
        fs::create_dir_all(root.join("client")).unwrap();

        let r = resolver(root);
        let from = root.join("client/index.tsx");
        assert_eq!(
            r.resolve("@loadable/component", &from, ModuleKind::Script).unwrap(),
            Resolution::Module(pkg.join("dist/loadable.cjs.js"))
        );
        assert_eq!(
            r.resolve("~highlight.js/styles/github.css", &from, ModuleKind::Style).unwrap(),
            Resolution::Module(highlight.join("github.css"))
        );
        assert_eq!(
            r.resolve("left-pad", &from, ModuleKind::Script).unwrap(),
            Resolution::NotFound
        );
    }

    #[test]
    fn test_resolve_stylesheet_imports_relative_to_sheet() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("styles")).unwrap();
        fs::write(root.join("styles/main.css"), "@import url(theme.css);\n").unwrap();
        fs::write(root.join("styles/theme.css"), "").unwrap();
        let normalize = root.join("node_modules/normalize.css");
        fs::create_dir_all(&normalize).unwrap();
        fs::write(normalize.join("package.json"), r#"{"style": "normalize.css"}"#).unwrap();
        fs::write(normalize.join("normalize.css"), "").unwrap();

        let r = resolver(root);
        let from = root.join("styles/main.css");
        assert_eq!(
            r.resolve("theme.css", &from, ModuleKind::Style).unwrap(),
            Resolution::Module(root.join("styles/theme.css"))
        );
        assert_eq!(
            r.resolve("~normalize.css", &from, ModuleKind::Style).unwrap(),
            Resolution::Module(normalize.join("normalize.css"))
        );
        // no sibling file: falls back to the package lookup
        assert_eq!(
            r.resolve("normalize.css", &from, ModuleKind::Style).unwrap(),
            Resolution::Module(normalize.join("normalize.css"))
        );
        assert_eq!(
            r.resolve("theme.css", &root.join("client/index.tsx"), ModuleKind::Script).unwrap(),
            Resolution::NotFound
        );
    }

    #[test]
    fn test_split_package_specifier() {
        assert_eq!(split_package_specifier("react"), ("react", None));
        assert_eq!(split_package_specifier("react/jsx-runtime"), ("react", Some("jsx-runtime")));
        assert_eq!(split_package_specifier("@scope/pkg"), ("@scope/pkg", None));
        assert_eq!(split_package_specifier("@scope/pkg/a/b"), ("@scope/pkg", Some("a/b")));
    }
}
