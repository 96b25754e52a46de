//! Built-in transform plugins
//!
//! The default chain is `source-map`, `typescript`, `json`, `css`. A
//! `[[plugins]]` list in the configuration replaces it, in the listed order.

mod typescript;

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use lightningcss::stylesheet::{MinifyOptions, ParserOptions, PrinterOptions, StyleSheet};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::bundler::ModuleType;
use crate::config::{Config, ConfigError, PluginConfig, BUILTIN_PLUGINS};
use crate::plugins::{ModuleInfo, Plugin, PluginContext, PluginManager, TransformResult};

pub use typescript::erase_types;

static JS_SOURCE_MAP_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^[ \t]*//[#@][ \t]*sourceMappingURL=\S*[ \t]*(?:\r?\n|$)").unwrap()
});

static CSS_SOURCE_MAP_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"/\*[#@][ \t]*sourceMappingURL=[^*]*\*/[ \t]*(?:\r?\n)?").unwrap()
});

/// Build the transform chain for a configuration
pub fn plugin_chain(config: &Config, minify: bool) -> Result<PluginManager, ConfigError> {
    let configured: Vec<PluginConfig> = if config.plugins.is_empty() {
        BUILTIN_PLUGINS
            .iter()
            .map(|name| PluginConfig {
                name: name.to_string(),
                options: None,
            })
            .collect()
    } else {
        config.plugins.clone()
    };

    let mut manager = PluginManager::new(config.root.clone());
    for plugin in &configured {
        manager.register(builtin(plugin, minify)?);
    }
    Ok(manager)
}

fn builtin(plugin: &PluginConfig, minify: bool) -> Result<Arc<dyn Plugin>, ConfigError> {
    let options = PluginOptions::new(plugin);
    let built: Arc<dyn Plugin> = match plugin.name.as_str() {
        "source-map" => {
            options.only(&[])?;
            Arc::new(SourceMapPlugin)
        }
        "typescript" => {
            options.only(&["exclude"])?;
            let exclude = options
                .string("exclude")?
                .unwrap_or_else(|| "node_modules".to_string());
            let exclude = if exclude.is_empty() {
                None
            } else {
                Some(Regex::new(&exclude).map_err(|e| options.invalid("exclude", e.to_string()))?)
            };
            Arc::new(TypeScriptPlugin { exclude })
        }
        "json" => {
            options.only(&[])?;
            Arc::new(JsonPlugin)
        }
        "css" => {
            options.only(&["minify"])?;
            let minify = options.bool("minify")?.unwrap_or(minify);
            Arc::new(CssPlugin { minify })
        }
        other => return Err(ConfigError::UnknownPlugin(other.to_string())),
    };
    Ok(built)
}

/// Typed access to a plugin's option table
struct PluginOptions<'a> {
    plugin: &'a str,
    table: Option<&'a toml::Table>,
}

impl<'a> PluginOptions<'a> {
    fn new(config: &'a PluginConfig) -> Self {
        Self {
            plugin: &config.name,
            table: config.options.as_ref(),
        }
    }

    fn invalid(&self, option: &str, reason: impl Into<String>) -> ConfigError {
        ConfigError::InvalidPluginOption {
            plugin: self.plugin.to_string(),
            option: option.to_string(),
            reason: reason.into(),
        }
    }

    fn only(&self, known: &[&str]) -> Result<(), ConfigError> {
        for key in self.table.into_iter().flat_map(|t| t.keys()) {
            if !known.contains(&key.as_str()) {
                return Err(self.invalid(key, "unknown option"));
            }
        }
        Ok(())
    }

    fn string(&self, key: &str) -> Result<Option<String>, ConfigError> {
        match self.table.and_then(|t| t.get(key)) {
            None => Ok(None),
            Some(toml::Value::String(s)) => Ok(Some(s.clone())),
            Some(_) => Err(self.invalid(key, "expected a string")),
        }
    }

    fn bool(&self, key: &str) -> Result<Option<bool>, ConfigError> {
        match self.table.and_then(|t| t.get(key)) {
            None => Ok(None),
            Some(toml::Value::Boolean(b)) => Ok(Some(*b)),
            Some(_) => Err(self.invalid(key, "expected a boolean")),
        }
    }
}

/// Drops `sourceMappingURL` comments of the inputs. Chunk maps, when
/// enabled, are written at emission and point at the module sources.
pub struct SourceMapPlugin;

#[async_trait]
impl Plugin for SourceMapPlugin {
    fn name(&self) -> &str {
        "source-map"
    }

    async fn transform(
        &self,
        code: &str,
        module: &ModuleInfo,
        _ctx: &PluginContext,
    ) -> Result<TransformResult> {
        let pattern = match module.module_type {
            ModuleType::Css => &*CSS_SOURCE_MAP_URL,
            t if t.is_js_like() => &*JS_SOURCE_MAP_URL,
            _ => return Ok(TransformResult::Skip),
        };
        if !pattern.is_match(code) {
            return Ok(TransformResult::Skip);
        }

        Ok(TransformResult::Transformed {
            code: pattern.replace_all(code, "").into_owned(),
        })
    }
}

/// Erases TypeScript-only syntax from `.ts`/`.tsx` modules. JSX is left
/// as written, so `.tsx` and `.jsx` output needs a JSX-aware runtime or a
/// later compile step before a browser can run it.
pub struct TypeScriptPlugin {
    exclude: Option<Regex>,
}

#[async_trait]
impl Plugin for TypeScriptPlugin {
    fn name(&self) -> &str {
        "typescript"
    }

    async fn transform(
        &self,
        code: &str,
        module: &ModuleInfo,
        _ctx: &PluginContext,
    ) -> Result<TransformResult> {
        if !module.module_type.is_typescript() {
            return Ok(TransformResult::Skip);
        }
        if self.exclude.as_ref().is_some_and(|re| re.is_match(&module.ident)) {
            return Ok(TransformResult::Skip);
        }

        debug!("Erasing types: {}", module.ident);
        Ok(TransformResult::Transformed {
            code: erase_types(code),
        })
    }
}

/// JSON plugin - wraps JSON documents as CommonJS modules
pub struct JsonPlugin;

#[async_trait]
impl Plugin for JsonPlugin {
    fn name(&self) -> &str {
        "json"
    }

    async fn transform(
        &self,
        code: &str,
        module: &ModuleInfo,
        _ctx: &PluginContext,
    ) -> Result<TransformResult> {
        if module.module_type != ModuleType::Json {
            return Ok(TransformResult::Skip);
        }

        serde_json::from_str::<serde_json::Value>(code)
            .with_context(|| format!("Invalid JSON in {}", module.ident))?;

        Ok(TransformResult::Transformed {
            code: format!("module.exports = {};", code.trim()),
        })
    }
}

/// Stylesheet extraction step: minifies with lightningcss when enabled
pub struct CssPlugin {
    minify: bool,
}

#[async_trait]
impl Plugin for CssPlugin {
    fn name(&self) -> &str {
        "css"
    }

    async fn transform(
        &self,
        code: &str,
        module: &ModuleInfo,
        _ctx: &PluginContext,
    ) -> Result<TransformResult> {
        if module.module_type != ModuleType::Css || !self.minify {
            return Ok(TransformResult::Skip);
        }

        Ok(TransformResult::Transformed {
            code: minify_css(code, &module.ident)?,
        })
    }
}

/// Parse and minify a stylesheet
pub fn minify_css(code: &str, filename: &str) -> Result<String> {
    let mut sheet = StyleSheet::parse(
        code,
        ParserOptions {
            filename: filename.to_string(),
            ..ParserOptions::default()
        },
    )
    .map_err(|e| anyhow!("Invalid CSS in {}: {}", filename, e))?;

    sheet
        .minify(MinifyOptions::default())
        .map_err(|e| anyhow!("Failed to minify {}: {}", filename, e))?;

    let printed = sheet
        .to_css(PrinterOptions {
            minify: true,
            ..PrinterOptions::default()
        })
        .map_err(|e| anyhow!("Failed to print {}: {}", filename, e))?;

    Ok(printed.code)
}
