//! HTML document generation
//!
//! Injects `<link>` tags before `</head>` and `<script>` tags before
//! `</body>`, in manifest order, each file once.

use std::fs;

use anyhow::{Context, Result};

use crate::bundler::{EmittedFile, FileKind, Manifest};
use crate::config::Config;
use crate::utils::public_url;

/// Render the document for a build
pub fn render_document(config: &Config, manifest: &Manifest, files: &[EmittedFile]) -> Result<String> {
    let document = match &config.html.template {
        Some(template) => {
            let path = config.root.join(template);
            fs::read_to_string(&path)
                .with_context(|| format!("Failed to read HTML template: {}", path.display()))?
        }
        None => default_document(config.html.title.as_deref().unwrap_or(&config.project.name)),
    };

    let mut styles = Vec::new();
    let mut scripts = Vec::new();
    for name in manifest.files() {
        let url = public_url(&config.output.public_path, name);
        match files.iter().find(|file| file.file_name == name).map(|file| file.kind) {
            Some(FileKind::Style) => styles.push(url),
            Some(FileKind::Script) => scripts.push(url),
            None => {}
        }
    }

    Ok(inject(&document, &styles, &scripts))
}

/// Insert stylesheet and script tags into a document
pub fn inject(html: &str, styles: &[String], scripts: &[String]) -> String {
    let links: String = styles
        .iter()
        .map(|href| format!("    <link rel=\"stylesheet\" href=\"{}\" />\n", escape_attr(href)))
        .collect();
    let script_tags: String = scripts
        .iter()
        .map(|src| format!("    <script src=\"{}\"></script>\n", escape_attr(src)))
        .collect();

    let mut result = html.to_string();

    // scripts first: inserting them does not move `</head>`
    match result.rfind("</body>") {
        Some(pos) => result.insert_str(line_start(&result, pos), &script_tags),
        None => result.push_str(&script_tags),
    }
    match result.find("</head>") {
        Some(pos) => result.insert_str(line_start(&result, pos), &links),
        None => result.insert_str(0, &links),
    }

    result
}

/// Start of the line holding `pos` when only indentation precedes it, so
/// tags land on their own lines
fn line_start(html: &str, pos: usize) -> usize {
    let start = html[..pos].rfind('\n').map_or(0, |i| i + 1);
    if html[start..pos].trim().is_empty() {
        start
    } else {
        pos
    }
}

fn escape_attr(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
}

/// Generate a default document
pub fn default_document(title: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
  <head>
    <meta charset="UTF-8" />
    <meta name="viewport" content="width=device-width, initial-scale=1.0" />
    <title>{}</title>
  </head>
  <body>
    <div id="app"></div>
  </body>
</html>
"#,
        title.replace('&', "&amp;").replace('<', "&lt;")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_inject_into_template() {
        let html = "<html>\n  <head>\n    <title>x</title>\n  </head>\n  <body>\n    <div id=\"app\"></div>\n  </body>\n</html>\n";
        let out = inject(
            html,
            &["/vendor-styles.css".to_string()],
            &["/runtime.js".to_string(), "/client.js".to_string()],
        );
        assert_eq!(
            out,
            "<html>\n  <head>\n    <title>x</title>\n    <link rel=\"stylesheet\" href=\"/vendor-styles.css\" />\n  </head>\n  <body>\n    <div id=\"app\"></div>\n    <script src=\"/runtime.js\"></script>\n    <script src=\"/client.js\"></script>\n  </body>\n</html>\n"
        );
    }

    #[test]
    fn test_inject_without_head_or_body() {
        let out = inject("<p>hi</p>", &["a.css".to_string()], &["a.js".to_string()]);
        assert_eq!(
            out,
            "    <link rel=\"stylesheet\" href=\"a.css\" />\n<p>hi</p>    <script src=\"a.js\"></script>\n"
        );
    }

    #[test]
    fn test_default_document_title() {
        let doc = default_document("Gallery & co");
        assert!(doc.contains("<title>Gallery &amp; co</title>"));
        assert!(doc.contains("</head>"));
    }
}
