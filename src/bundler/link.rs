//! Module linking
//!
//! Rewrites import specifiers to module ids and lowers ES module syntax to
//! the chunk runtime's CommonJS-style `require`. Imports of stylesheets are
//! dropped from scripts; the sheets are emitted as CSS files instead.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::resolver::{
    CSS_IMPORT_REGEX, DYNAMIC_IMPORT_REGEX, EXPORT_FROM_REGEX, IMPORT_FROM_REGEX, REQUIRE_REGEX,
    SIDE_EFFECT_IMPORT_REGEX,
};

use super::{ModuleGraph, ModuleId, ModuleIds, ModuleKind};

static EXPORT_DEFAULT_DECL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^([ \t]*)export\s+default\s+((?:async\s+)?function\b\s*\*?\s*([\w$]+)|class\s+([\w$]+))")
        .unwrap()
});

static EXPORT_DEFAULT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^([ \t]*)export\s+default\s+").unwrap());

static EXPORT_DECL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^([ \t]*)export\s+((?:async\s+)?function\b\s*\*?\s*|class\s+|(?:const|let|var)\s+)([\w$]+)")
        .unwrap()
});

static EXPORT_LIST: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^[ \t]*export\s*\{([^}]*)\}[ \t]*;?").unwrap());

const ES_MODULE_MARKER: &str = "Object.defineProperty(exports, \"__esModule\", { value: true }); ";

/// Where an import specifier points
#[derive(Debug, Clone, Copy)]
pub struct LinkTarget<'a> {
    pub id: &'a str,
    pub kind: ModuleKind,
}

/// Link targets of one module's dependencies, by specifier
#[derive(Debug, Default)]
pub struct Imports<'a> {
    by_specifier: HashMap<&'a str, LinkTarget<'a>>,
}

impl<'a> Imports<'a> {
    pub fn of(graph: &'a ModuleGraph, ids: &'a ModuleIds, module: ModuleId) -> Self {
        let by_specifier = graph
            .dependencies(module)
            .iter()
            .filter_map(|dep| {
                let target = graph.get_module(dep.target)?;
                Some((
                    dep.specifier.as_str(),
                    LinkTarget {
                        id: ids.get(dep.target),
                        kind: target.kind(),
                    },
                ))
            })
            .collect();

        Self { by_specifier }
    }

    pub fn get(&self, specifier: &str) -> Option<LinkTarget<'a>> {
        self.by_specifier.get(specifier).copied()
    }
}

/// A stylesheet with its `@import` rules taken out
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkedStyle {
    pub body: String,
    /// `@import` rules for sheets outside the bundle; they must lead the
    /// emitted file to stay valid CSS.
    pub hoisted: Vec<String>,
    /// Source lines trimmed from the top of `body`
    pub offset: usize,
}

/// Link a script module
pub fn link_script(code: &str, imports: &Imports) -> String {
    let mut esm = false;
    let mut temps = 0usize;
    let mut exported: Vec<(String, String)> = Vec::new();

    // Calls go first: the statement rewrites below emit `require(<id>)`
    // calls that must not be looked up again.
    let code = REQUIRE_REGEX
        .replace_all(code, |caps: &Captures| match imports.get(&caps[1]) {
            Some(target) if target.kind == ModuleKind::Style => "{}".to_string(),
            Some(target) => require_call(target.id),
            None => caps[0].to_string(),
        })
        .into_owned();

    let code = DYNAMIC_IMPORT_REGEX
        .replace_all(&code, |caps: &Captures| match imports.get(&caps[1]) {
            Some(target) if target.kind == ModuleKind::Style => "Promise.resolve({})".to_string(),
            Some(target) => format!(
                "Promise.resolve().then(function () {{ return {}; }})",
                require_call(target.id)
            ),
            None => caps[0].to_string(),
        })
        .into_owned();

    let code = EXPORT_FROM_REGEX
        .replace_all(&code, |caps: &Captures| {
            if caps.get(1).is_some() {
                return String::new();
            }
            let Some(target) = imports.get(&caps[3]) else {
                return caps[0].to_string();
            };
            esm = true;
            let source = source_of(target);
            let clause = caps[2].trim();

            if clause == "*" {
                return format!("require.reexport(exports, {});", source);
            }
            if let Some(namespace) = clause.strip_prefix('*') {
                let namespace = namespace.trim().strip_prefix("as").unwrap_or(namespace).trim();
                return format!("exports.{} = {};", namespace, source);
            }

            temps += 1;
            let temp = temp_name(temps);
            let mut out = format!("var {} = {};", temp, source);
            for (imported, name) in bindings(clause.trim_start_matches('{').trim_end_matches('}')) {
                out.push_str(&format!(" exports.{} = {};", name, member(&temp, imported)));
            }
            out
        })
        .into_owned();

    let code = IMPORT_FROM_REGEX
        .replace_all(&code, |caps: &Captures| {
            if caps.get(1).is_some() {
                return String::new();
            }
            let Some(target) = imports.get(&caps[3]) else {
                return caps[0].to_string();
            };
            esm = true;
            temps += 1;
            lower_import(&caps[2], &source_of(target), &temp_name(temps))
        })
        .into_owned();

    let code = SIDE_EFFECT_IMPORT_REGEX
        .replace_all(&code, |caps: &Captures| match imports.get(&caps[1]) {
            Some(target) if target.kind == ModuleKind::Style => {
                esm = true;
                String::new()
            }
            Some(target) => {
                esm = true;
                format!("{};", require_call(target.id))
            }
            None => caps[0].to_string(),
        })
        .into_owned();

    let code = EXPORT_DEFAULT_DECL
        .replace_all(&code, |caps: &Captures| {
            esm = true;
            let name = caps.get(3).or_else(|| caps.get(4)).map_or("", |m| m.as_str());
            exported.push(("default".to_string(), name.to_string()));
            format!("{}{}", &caps[1], &caps[2])
        })
        .into_owned();

    let code = EXPORT_DEFAULT
        .replace_all(&code, |caps: &Captures| {
            esm = true;
            format!("{}exports.default = ", &caps[1])
        })
        .into_owned();

    let code = EXPORT_DECL
        .replace_all(&code, |caps: &Captures| {
            esm = true;
            exported.push((caps[3].to_string(), caps[3].to_string()));
            format!("{}{}{}", &caps[1], &caps[2], &caps[3])
        })
        .into_owned();

    let mut code = EXPORT_LIST
        .replace_all(&code, |caps: &Captures| {
            esm = true;
            bindings(&caps[1])
                .into_iter()
                .map(|(local, name)| format!("exports.{} = {};", name, local))
                .collect::<Vec<_>>()
                .join(" ")
        })
        .into_owned();

    if !exported.is_empty() && !code.is_empty() && !code.ends_with('\n') {
        code.push('\n');
    }
    for (name, local) in &exported {
        code.push_str(&format!("exports.{} = {};\n", name, local));
    }

    if esm {
        code.insert_str(0, ES_MODULE_MARKER);
    }
    code
}

/// Link a stylesheet: bundled `@import`s are removed (the imported sheet
/// precedes this one in chunk order), others are hoisted.
pub fn link_style(code: &str, imports: &Imports) -> LinkedStyle {
    let mut hoisted = Vec::new();
    let body = CSS_IMPORT_REGEX
        .replace_all(code, |caps: &Captures| {
            let specifier = caps
                .get(1)
                .or_else(|| caps.get(2))
                .map_or("", |m| m.as_str().trim());
            if imports.get(specifier).is_none() {
                hoisted.push(caps[0].to_string());
            }
            String::new()
        })
        .into_owned();

    let trimmed = body.trim_start();
    let offset = body[..body.len() - trimmed.len()].matches('\n').count();
    LinkedStyle {
        body: trimmed.to_string(),
        hoisted,
        offset,
    }
}

/// JavaScript string literal
pub fn js_string(value: &str) -> String {
    serde_json::Value::from(value).to_string()
}

fn require_call(id: &str) -> String {
    format!("require({})", js_string(id))
}

fn source_of(target: LinkTarget) -> String {
    match target.kind {
        ModuleKind::Style => "{}".to_string(),
        ModuleKind::Script => require_call(target.id),
    }
}

fn temp_name(n: usize) -> String {
    format!("__import_{}__", n)
}

fn member(temp: &str, name: &str) -> String {
    if name == "default" {
        format!("require.interop({}).default", temp)
    } else {
        format!("{}.{}", temp, name)
    }
}

/// `var` statements for an import clause such as `a, { b as c }`
fn lower_import(clause: &str, source: &str, temp: &str) -> String {
    let mut out = format!("var {} = {};", temp, source);
    let mut rest = clause.trim();

    if let Some(open) = rest.find('{') {
        let close = rest[open..].find('}').map_or(rest.len(), |i| open + i);
        for (imported, local) in bindings(&rest[open + 1..close]) {
            out.push_str(&format!(" var {} = {};", local, member(temp, imported)));
        }
        rest = &rest[..open];
    }

    for part in rest.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        match part.strip_prefix('*') {
            Some(namespace) => {
                let namespace = namespace.trim();
                let namespace = namespace.strip_prefix("as").unwrap_or(namespace).trim();
                out.push_str(&format!(" var {} = {};", namespace, temp));
            }
            None => out.push_str(&format!(" var {} = {};", part, member(temp, "default"))),
        }
    }

    out
}

/// `a, b as c` as (source name, bound name) pairs; type-only names dropped
fn bindings(list: &str) -> Vec<(&str, &str)> {
    list.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty() && !item.starts_with("type "))
        .map(|item| match item.split_once(" as ") {
            Some((from, to)) => (from.trim(), to.trim()),
            None => (item, item),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundler::{ImportKind, Module};
    use crate::config::ModuleIdStrategy;
    use pretty_assertions::assert_eq;

    /// ./app.js importing `react`, ./utils.js, ./lazy.js and ./style.css
    fn fixture() -> (ModuleGraph, ModuleId) {
        let mut graph = ModuleGraph::new();
        let app = graph.add_module(Module::new("./app.js"));
        let react = graph.add_module(Module::new("./node_modules/react/index.js"));
        let utils = graph.add_module(Module::new("./utils.js"));
        let lazy = graph.add_module(Module::new("./lazy.js"));
        let style = graph.add_module(Module::new("./style.css"));
        graph.add_dependency(app, "react", ImportKind::Sync, react);
        graph.add_dependency(app, "./utils", ImportKind::Sync, utils);
        graph.add_dependency(app, "./lazy", ImportKind::Async, lazy);
        graph.add_dependency(app, "./style.css", ImportKind::Sync, style);
        graph.add_entry("app", vec![app]);
        (graph, app)
    }

    fn link(source: &str) -> String {
        let (graph, app) = fixture();
        let ids = ModuleIds::assign(&graph, ModuleIdStrategy::Named);
        link_script(source, &Imports::of(&graph, &ids, app))
    }

    #[test]
    fn test_imports_lowered_to_require() {
        let out = link(
            "import React, { useState as useS } from \"react\";\nimport \"./style.css\";\nconsole.log(React, useS);\n",
        );
        assert_eq!(
            out,
            "Object.defineProperty(exports, \"__esModule\", { value: true }); \
             var __import_1__ = require(\"./node_modules/react/index.js\"); \
             var useS = __import_1__.useState; \
             var React = require.interop(__import_1__).default;\n\
             \n\
             console.log(React, useS);\n"
        );
    }

    #[test]
    fn test_namespace_and_style_bindings() {
        let out = link("import * as utils from './utils';\nimport styles from './style.css';\n");
        assert!(out.contains("var __import_1__ = require(\"./utils.js\"); var utils = __import_1__;"));
        assert!(out.contains("var __import_2__ = {}; var styles = require.interop(__import_2__).default;"));
    }

    #[test]
    fn test_exports_lowered() {
        let out = link(
            "export const answer = 42;\nexport default function App() {}\nexport { answer as value };\nexport * from \"./utils\";\n",
        );
        assert_eq!(
            out,
            "Object.defineProperty(exports, \"__esModule\", { value: true }); \
             const answer = 42;\n\
             function App() {}\n\
             exports.value = answer;\n\
             require.reexport(exports, require(\"./utils.js\"));\n\
             exports.default = App;\n\
             exports.answer = answer;\n"
        );
    }

    #[test]
    fn test_default_expression_export() {
        let out = link("export default { name: 'app' };\n");
        assert!(out.ends_with("exports.default = { name: 'app' };\n"));
    }

    #[test]
    fn test_calls_and_dynamic_imports() {
        let out = link("const u = require('./utils');\nconst page = import('./lazy');\nrequire('./style.css');\n");
        assert_eq!(
            out,
            "const u = require(\"./utils.js\");\n\
             const page = Promise.resolve().then(function () { return require(\"./lazy.js\"); });\n\
             {};\n"
        );
    }

    #[test]
    fn test_unknown_specifiers_left_alone() {
        let source = "const cdn = import('https://cdn.example.com/x.js');\n";
        assert_eq!(link(source), source);
    }

    #[test]
    fn test_style_imports() {
        let mut graph = ModuleGraph::new();
        let main = graph.add_module(Module::new("./main.css"));
        let base = graph.add_module(Module::new("./base.css"));
        graph.add_dependency(main, "./base.css", ImportKind::Sync, base);
        let ids = ModuleIds::assign(&graph, ModuleIdStrategy::Named);

        let linked = link_style(
            "@import \"./base.css\";\n@import url(https://fonts.example.com/inter.css);\nbody { margin: 0; }\n",
            &Imports::of(&graph, &ids, main),
        );
        assert_eq!(linked.body, "body { margin: 0; }\n");
        assert_eq!(linked.offset, 2);
        assert_eq!(
            linked.hoisted,
            vec!["@import url(https://fonts.example.com/inter.css);".to_string()]
        );
    }
}
