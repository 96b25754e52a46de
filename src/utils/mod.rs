//! Utility functions and helpers

use std::path::Path;

use sha2::{Digest, Sha256};

/// Hex SHA-256 digest of the given content
pub fn hash_content(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    hex::encode(hasher.finalize())
}

/// Root-relative module identifier with `/` separators, prefixed `./`.
///
/// Identifiers are stable across machines, so cache-group patterns and
/// hashed module ids do not depend on where the project is checked out.
pub fn module_ident(root: &Path, path: &Path) -> String {
    let relative = pathdiff::diff_paths(path, root)
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| path.display().to_string());
    let relative = clean_path(&relative.replace('\\', "/"));

    if relative.starts_with("../") || relative.starts_with('/') {
        relative
    } else {
        format!("./{}", relative)
    }
}

/// Clean a path by removing . and .. components
pub fn clean_path(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();

    for part in path.split('/') {
        match part {
            "" | "." => continue,
            ".." => {
                if matches!(parts.last(), None | Some(&"..")) {
                    if !path.starts_with('/') {
                        parts.push("..");
                    }
                } else {
                    parts.pop();
                }
            }
            _ => parts.push(part),
        }
    }

    if path.starts_with('/') {
        format!("/{}", parts.join("/"))
    } else {
        parts.join("/")
    }
}

/// Join a public path prefix and a file name
pub fn public_url(public_path: &str, file: &str) -> String {
    if public_path.is_empty() || public_path.ends_with('/') {
        format!("{}{}", public_path, file)
    } else {
        format!("{}/{}", public_path, file)
    }
}

/// Format bytes as human-readable size
pub fn format_size(bytes: usize) -> String {
    const KB: usize = 1024;
    const MB: usize = KB * 1024;
    const GB: usize = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// Format duration as human-readable string
pub fn format_duration(duration: std::time::Duration) -> String {
    let secs = duration.as_secs_f64();

    if secs >= 60.0 {
        let mins = (secs / 60.0).floor() as u64;
        let remaining_secs = secs - (mins as f64 * 60.0);
        format!("{}m {:.2}s", mins, remaining_secs)
    } else if secs >= 1.0 {
        format!("{:.2}s", secs)
    } else {
        format!("{:.0}ms", secs * 1000.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_content() {
        let hash = hash_content(b"hello world");
        assert_eq!(hash.len(), 64);
        assert!(hash.starts_with("b94d27b9934d3e08"));
    }

    #[test]
    fn test_clean_path() {
        assert_eq!(clean_path("./foo/bar"), "foo/bar");
        assert_eq!(clean_path("foo/../bar"), "bar");
        assert_eq!(clean_path("/foo/./bar/../baz"), "/foo/baz");
        assert_eq!(clean_path("../shared/a.css"), "../shared/a.css");
    }

    #[test]
    fn test_module_ident() {
        let root = Path::new("/site");
        assert_eq!(
            module_ident(root, Path::new("/site/client/index.tsx")),
            "./client/index.tsx"
        );
        assert_eq!(
            module_ident(root, Path::new("/site/node_modules/x/index.js")),
            "./node_modules/x/index.js"
        );
        assert_eq!(module_ident(root, Path::new("/shared/a.css")), "../shared/a.css");
    }

    #[test]
    fn test_public_url() {
        assert_eq!(public_url("/", "client.js"), "/client.js");
        assert_eq!(public_url("/static", "client.js"), "/static/client.js");
        assert_eq!(public_url("", "client.js"), "client.js");
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(1024), "1.00 KB");
        assert_eq!(format_size(1536), "1.50 KB");
        assert_eq!(format_size(1048576), "1.00 MB");
    }

    #[test]
    fn test_format_duration() {
        use std::time::Duration;

        assert_eq!(format_duration(Duration::from_millis(500)), "500ms");
        assert_eq!(format_duration(Duration::from_secs_f64(1.5)), "1.50s");
        assert_eq!(format_duration(Duration::from_secs(65)), "1m 5.00s");
    }
}
