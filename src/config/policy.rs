//! Compiled chunk-splitting policy
//!
//! [`SplitPolicy`] is built once from the `[optimization]` section and handed
//! by reference to the partitioner. Patterns are compiled here, so a policy
//! that exists is always valid.

use globset::{GlobBuilder, GlobMatcher};
use regex::Regex;

use super::{CacheGroupConfig, ChunkSelection, ConfigError, OptimizationConfig, RuntimeChunk, TestConfig};

/// Predicate over module identifiers
#[derive(Debug, Clone)]
pub enum ModuleMatcher {
    Any,
    Regex(Regex),
    Glob(GlobMatcher),
}

impl ModuleMatcher {
    pub fn is_match(&self, ident: &str) -> bool {
        match self {
            ModuleMatcher::Any => true,
            ModuleMatcher::Regex(re) => re.is_match(ident),
            ModuleMatcher::Glob(glob) => glob.is_match(ident),
        }
    }
}

/// A validated cache group
#[derive(Debug, Clone)]
pub struct CacheGroupRule {
    pub key: String,
    pub name: String,
    pub priority: i32,
    pub chunks: ChunkSelection,
    pub min_chunks: usize,
    matcher: ModuleMatcher,
}

impl CacheGroupRule {
    /// A rule matching every module
    pub fn new(key: impl Into<String>, name: impl Into<String>, priority: i32) -> Self {
        Self {
            key: key.into(),
            name: name.into(),
            priority,
            chunks: ChunkSelection::All,
            min_chunks: 1,
            matcher: ModuleMatcher::Any,
        }
    }

    /// A rule matching identifiers against a regular expression
    pub fn regex(
        key: impl Into<String>,
        name: impl Into<String>,
        pattern: &str,
        priority: i32,
    ) -> Result<Self, ConfigError> {
        let mut rule = Self::new(key, name, priority);
        rule.matcher = compile_regex(&rule.key, pattern)?;
        Ok(rule)
    }

    pub fn with_chunks(mut self, chunks: ChunkSelection) -> Self {
        self.chunks = chunks;
        self
    }

    pub fn with_min_chunks(mut self, min_chunks: usize) -> Self {
        self.min_chunks = min_chunks;
        self
    }

    /// Compile a `[[optimization.cache_groups]]` table
    pub fn from_config(group: &CacheGroupConfig) -> Result<Self, ConfigError> {
        if group.min_chunks == 0 {
            return Err(ConfigError::InvalidMinChunks(group.key.clone()));
        }

        let matcher = match &group.test {
            None => ModuleMatcher::Any,
            Some(TestConfig::Regex(pattern)) => compile_regex(&group.key, pattern)?,
            Some(TestConfig::Glob { glob }) => {
                let glob = GlobBuilder::new(glob)
                    .literal_separator(true)
                    .build()
                    .map_err(|source| ConfigError::InvalidGlob {
                        group: group.key.clone(),
                        source,
                    })?;
                ModuleMatcher::Glob(glob.compile_matcher())
            }
        };

        Ok(Self {
            key: group.key.clone(),
            name: group.chunk_name().to_string(),
            priority: group.priority,
            chunks: group.chunks,
            min_chunks: group.min_chunks,
            matcher,
        })
    }

    /// Whether this rule claims a module.
    ///
    /// `entries` is the number of entries that reach the module.
    pub fn applies(&self, ident: &str, initial: bool, on_demand: bool, entries: usize) -> bool {
        self.chunks.accepts(initial, on_demand)
            && entries >= self.min_chunks
            && self.matcher.is_match(ident)
    }
}

fn compile_regex(group: &str, pattern: &str) -> Result<ModuleMatcher, ConfigError> {
    Regex::new(pattern)
        .map(ModuleMatcher::Regex)
        .map_err(|source| ConfigError::InvalidPattern {
            group: group.to_string(),
            source,
        })
}

/// Immutable partitioning policy
#[derive(Debug, Clone, Default)]
pub struct SplitPolicy {
    /// Sorted by descending priority, ties in declaration order
    rules: Vec<CacheGroupRule>,
    runtime: RuntimeChunk,
}

impl SplitPolicy {
    pub fn new(mut rules: Vec<CacheGroupRule>, runtime: RuntimeChunk) -> Self {
        // stable sort keeps declaration order among equal priorities
        rules.sort_by(|a, b| b.priority.cmp(&a.priority));
        Self { rules, runtime }
    }

    /// Compile the enabled cache groups of an `[optimization]` section
    pub fn from_config(optimization: &OptimizationConfig) -> Result<Self, ConfigError> {
        let rules = optimization
            .cache_groups
            .iter()
            .filter(|group| group.enabled)
            .map(CacheGroupRule::from_config)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self::new(rules, optimization.runtime_chunk))
    }

    /// Rules in evaluation order
    pub fn rules(&self) -> &[CacheGroupRule] {
        &self.rules
    }

    pub fn runtime(&self) -> RuntimeChunk {
        self.runtime
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group(key: &str, test: Option<TestConfig>, priority: i32) -> CacheGroupConfig {
        CacheGroupConfig {
            key: key.to_string(),
            name: None,
            test,
            priority,
            chunks: ChunkSelection::All,
            min_chunks: 1,
            enabled: true,
        }
    }

    #[test]
    fn test_rules_sorted_by_priority_then_declaration() {
        let policy = SplitPolicy::new(
            vec![
                CacheGroupRule::new("low", "low", 10),
                CacheGroupRule::new("high", "high", 20),
                CacheGroupRule::new("low-2", "low-2", 10),
            ],
            RuntimeChunk::None,
        );
        let keys: Vec<_> = policy.rules().iter().map(|r| r.key.as_str()).collect();
        assert_eq!(keys, vec!["high", "low", "low-2"]);
    }

    #[test]
    fn test_regex_and_glob_matchers() {
        let vendor = CacheGroupRule::from_config(&group(
            "vendor",
            Some(TestConfig::Regex(r"[\\/]node_modules[\\/]".to_string())),
            20,
        ))
        .unwrap();
        assert!(vendor.applies("./node_modules/react/index.js", true, false, 1));
        assert!(!vendor.applies("./client/index.tsx", true, false, 1));

        let styles = CacheGroupRule::from_config(&group(
            "styles",
            Some(TestConfig::Glob {
                glob: "./vendors/**/*.css".to_string(),
            }),
            0,
        ))
        .unwrap();
        assert!(styles.applies("./vendors/normalize.css@8.0.1/normalize.css", true, false, 1));
        assert!(!styles.applies("./client/index.css", true, false, 1));
    }

    #[test]
    fn test_eligibility_and_min_chunks() {
        let rule = CacheGroupRule::new("common", "common", 0)
            .with_chunks(ChunkSelection::Initial)
            .with_min_chunks(2);
        assert!(rule.applies("./a.js", true, false, 2));
        assert!(!rule.applies("./a.js", true, false, 1));
        assert!(!rule.applies("./a.js", false, true, 2));

        let lazy = CacheGroupRule::new("lazy", "lazy", 0).with_chunks(ChunkSelection::Async);
        assert!(lazy.applies("./a.js", false, true, 1));
        assert!(!lazy.applies("./a.js", true, false, 1));
    }

    #[test]
    fn test_invalid_pattern_reported() {
        let err = CacheGroupRule::from_config(&group(
            "broken",
            Some(TestConfig::Regex("node_modules(".to_string())),
            0,
        ))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPattern { ref group, .. } if group == "broken"));
    }

    #[test]
    fn test_disabled_groups_skipped() {
        let mut disabled = group("off", None, 50);
        disabled.enabled = false;
        let optimization = OptimizationConfig {
            cache_groups: vec![disabled, group("on", None, 0)],
            ..Default::default()
        };
        let policy = SplitPolicy::from_config(&optimization).unwrap();
        assert_eq!(policy.rules().len(), 1);
        assert_eq!(policy.rules()[0].key, "on");
    }
}
