//! Output file name templates (`[name].[contenthash].js`)

use super::ConfigError;

/// Hex digits used by a bare `[contenthash]`
pub const DEFAULT_HASH_LENGTH: usize = 20;

/// Length of a full SHA-256 hex digest
pub const MAX_HASH_LENGTH: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Part {
    Literal(String),
    Name,
    ContentHash(usize),
}

/// A parsed file name template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilenameTemplate {
    parts: Vec<Part>,
}

impl FilenameTemplate {
    /// Parse a template. Every template must contain `[name]` so that
    /// distinct chunks never map to the same file.
    pub fn parse(template: &str) -> Result<Self, ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidFilename {
            template: template.to_string(),
            reason,
        };

        let mut parts = Vec::new();
        let mut literal = String::new();
        let mut rest = template;

        while let Some(open) = rest.find('[') {
            literal.push_str(&rest[..open]);
            let after = &rest[open + 1..];
            let close = after
                .find(']')
                .ok_or_else(|| invalid("unclosed '['".to_string()))?;
            let token = &after[..close];

            let part = match token.split_once(':') {
                None if token == "name" => Part::Name,
                None if token == "contenthash" => Part::ContentHash(DEFAULT_HASH_LENGTH),
                Some(("contenthash", len)) => {
                    let len: usize = len
                        .parse()
                        .map_err(|_| invalid(format!("invalid hash length '{}'", len)))?;
                    if len == 0 || len > MAX_HASH_LENGTH {
                        return Err(invalid(format!(
                            "hash length must be between 1 and {}",
                            MAX_HASH_LENGTH
                        )));
                    }
                    Part::ContentHash(len)
                }
                _ => return Err(invalid(format!("unknown placeholder '[{}]'", token))),
            };

            if !literal.is_empty() {
                parts.push(Part::Literal(std::mem::take(&mut literal)));
            }
            parts.push(part);
            rest = &after[close + 1..];
        }
        literal.push_str(rest);
        if !literal.is_empty() {
            parts.push(Part::Literal(literal));
        }

        if !parts.contains(&Part::Name) {
            return Err(invalid("missing '[name]' placeholder".to_string()));
        }

        Ok(Self { parts })
    }

    /// Whether rendering needs the content hash
    pub fn uses_hash(&self) -> bool {
        self.parts.iter().any(|p| matches!(p, Part::ContentHash(_)))
    }

    /// Render a file name. `content_hash` is a hex digest; it is truncated
    /// to the placeholder's length.
    pub fn render(&self, name: &str, content_hash: &str) -> String {
        let mut out = String::new();
        for part in &self.parts {
            match part {
                Part::Literal(text) => out.push_str(text),
                Part::Name => out.push_str(name),
                Part::ContentHash(len) => {
                    out.push_str(&content_hash[..(*len).min(content_hash.len())])
                }
            }
        }
        out
    }
}
