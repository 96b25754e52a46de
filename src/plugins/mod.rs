//! Plugin system
//!
//! A plugin is a step of the transform chain. Plugins run in registration
//! order; each one sees the output of the previous one.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::debug;

use crate::bundler::ModuleType;

/// Plugin hook context
pub struct PluginContext {
    /// Project root directory
    pub root: PathBuf,
}

/// What a transform hook gets to know about the module
#[derive(Debug, Clone)]
pub struct ModuleInfo {
    /// Root-relative identifier
    pub ident: String,
    pub path: PathBuf,
    pub module_type: ModuleType,
}

/// Result of a transform hook
pub enum TransformResult {
    /// Continue to next plugin (no transformation)
    Skip,
    /// Transformed code
    Transformed { code: String },
}

/// Plugin trait - implement this to add a step to the transform chain
#[async_trait]
pub trait Plugin: Send + Sync {
    /// Plugin name for logging and debugging
    fn name(&self) -> &str;

    /// Called when the build starts
    async fn build_start(&self, _ctx: &PluginContext) -> Result<()> {
        Ok(())
    }

    /// Called when the build ends
    async fn build_end(&self, _ctx: &PluginContext) -> Result<()> {
        Ok(())
    }

    /// Transform the code of a module
    /// Return TransformResult::Skip to leave code unchanged
    async fn transform(
        &self,
        _code: &str,
        _module: &ModuleInfo,
        _ctx: &PluginContext,
    ) -> Result<TransformResult> {
        Ok(TransformResult::Skip)
    }
}

/// Plugin manager
pub struct PluginManager {
    plugins: Vec<Arc<dyn Plugin>>,
    context: PluginContext,
}

impl PluginManager {
    /// Create a new plugin manager
    pub fn new(root: PathBuf) -> Self {
        Self {
            plugins: Vec::new(),
            context: PluginContext { root },
        }
    }

    /// Register a plugin at the end of the chain
    pub fn register(&mut self, plugin: Arc<dyn Plugin>) {
        self.plugins.push(plugin);
    }

    /// Registered plugin names, in chain order
    pub fn names(&self) -> Vec<&str> {
        self.plugins.iter().map(|p| p.name()).collect()
    }

    /// Run build_start hooks
    pub async fn run_build_start(&self) -> Result<()> {
        for plugin in &self.plugins {
            plugin
                .build_start(&self.context)
                .await
                .with_context(|| format!("Plugin '{}' failed to start", plugin.name()))?;
        }
        Ok(())
    }

    /// Run build_end hooks
    pub async fn run_build_end(&self) -> Result<()> {
        for plugin in &self.plugins {
            plugin
                .build_end(&self.context)
                .await
                .with_context(|| format!("Plugin '{}' failed to finish", plugin.name()))?;
        }
        Ok(())
    }

    /// Run the transform chain over one module
    pub async fn transform(&self, code: &str, module: &ModuleInfo) -> Result<String> {
        let mut current_code = code.to_string();

        for plugin in &self.plugins {
            let result = plugin
                .transform(&current_code, module, &self.context)
                .await
                .with_context(|| format!("Plugin '{}' failed on {}", plugin.name(), module.ident))?;

            if let TransformResult::Transformed { code } = result {
                debug!("{} transformed {}", plugin.name(), module.ident);
                current_code = code;
            }
        }

        Ok(current_code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Suffix(&'static str);

    #[async_trait]
    impl Plugin for Suffix {
        fn name(&self) -> &str {
            self.0
        }

        async fn transform(
            &self,
            code: &str,
            _module: &ModuleInfo,
            _ctx: &PluginContext,
        ) -> Result<TransformResult> {
            Ok(TransformResult::Transformed {
                code: format!("{}{}", code, self.0),
            })
        }
    }

    struct Failing;

    #[async_trait]
    impl Plugin for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        async fn transform(
            &self,
            _code: &str,
            _module: &ModuleInfo,
            _ctx: &PluginContext,
        ) -> Result<TransformResult> {
            anyhow::bail!("boom")
        }
    }

    fn info() -> ModuleInfo {
        ModuleInfo {
            ident: "./a.js".to_string(),
            path: PathBuf::from("/a.js"),
            module_type: ModuleType::JavaScript,
        }
    }

    #[tokio::test]
    async fn test_plugins_run_in_registration_order() {
        let mut manager = PluginManager::new(PathBuf::from("/"));
        manager.register(Arc::new(Suffix("-1")));
        manager.register(Arc::new(Suffix("-2")));

        assert_eq!(manager.names(), vec!["-1", "-2"]);
        assert_eq!(manager.transform("code", &info()).await.unwrap(), "code-1-2");
    }

    #[tokio::test]
    async fn test_plugin_error_names_plugin_and_module() {
        let mut manager = PluginManager::new(PathBuf::from("/"));
        manager.register(Arc::new(Failing));

        let err = manager.transform("code", &info()).await.unwrap_err();
        assert_eq!(err.to_string(), "Plugin 'failing' failed on ./a.js");
    }
}
