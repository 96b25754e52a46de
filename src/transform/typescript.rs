//! Type erasure for TypeScript modules
//!
//! Handles declarations with no runtime meaning (type aliases, interfaces,
//! `declare`, type-only imports and exports) and the common annotation
//! positions. Syntax that needs real compilation, such as `enum` or
//! parameter properties, passes through unchanged, and so does JSX.
//! Removed declarations leave blank lines behind so line numbers survive.

use std::borrow::Cow;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

static VAR_ANNOTATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\b(const|let|var)(\s+(?:[\w$]+|\{[^{}]*\}|\[[^\[\]]*\]))\s*:\s*(?:[^=;]|=>)+?(\s*(?:=[^>=]|;|\r?\n|$))",
    )
    .unwrap()
});

static FUNCTION_GENERICS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(function\s*\*?\s*[\w$]*)\s*<[^<>()]*>").unwrap());

static FUNCTION_PARAMS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(function\b[^(]*)\(([^()]*)\)").unwrap());

static METHOD_PARAMS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\s*(?:(?:static|async|get|set)\s+)*)([\w$]+)(\s*)\(([^()]*)\)(\s*\{)").unwrap()
});

static RETURN_ANNOTATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\)\s*:\s*[\w$.<>\[\]|&, ]+?\s*\{").unwrap());

static ARROW_RETURN_ANNOTATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\)\s*:\s*[^=;{}()]+?\s*=>").unwrap());

static ARROW_PARAMS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\(([^()]*)\)(\s*=>)").unwrap());

static AS_CAST: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\s+as\s+(?:const\b|string\b|number\b|boolean\b|any\b|unknown\b|[A-Z][\w$.]*(?:<[^<>]*>)?(?:\[\])*)",
    )
    .unwrap()
});

static CALL_TYPE_ARGS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"\b([\w$]+)<[\w$.,\s\[\]|'"]+>\("#).unwrap());

static NON_NULL: Lazy<Regex> = Lazy::new(|| Regex::new(r"([\w$)\]])!([.\[)])").unwrap());

static IMPLEMENTS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+implements\s+[\w$.,<>\s]+?(\s*\{)").unwrap());

static MEMBER_MODIFIERS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\s*)(?:(?:public|private|protected|readonly|abstract|override)\s+)+").unwrap()
});

static FIELD_ANNOTATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^(\s*)([\w$]+)\??\s*:\s*[\w$.<>\[\]|&'", ]+?(\s*(?:=[^>=]|;))"#).unwrap()
});

const CONTROL_KEYWORDS: &[&str] = &[
    "if", "for", "while", "switch", "with", "return", "function", "typeof", "await", "new",
];

/// Remove TypeScript-only syntax, leaving plain JavaScript
pub fn erase_types(source: &str) -> String {
    let lines: Vec<&str> = source.split_inclusive('\n').collect();
    let mut out = String::with_capacity(source.len());

    let mut i = 0;
    while i < lines.len() {
        if is_type_declaration(lines[i].trim_start()) {
            let end = skip_declaration(&lines, i);
            for line in &lines[i..end] {
                if line.ends_with('\n') {
                    out.push('\n');
                }
            }
            i = end;
            continue;
        }
        out.push_str(&erase_annotations(lines[i]));
        i += 1;
    }

    out
}

fn is_type_declaration(line: &str) -> bool {
    if line.starts_with("import type ") {
        return true;
    }

    let rest = line.strip_prefix("export ").map(str::trim_start).unwrap_or(line);
    if rest.starts_with("interface ") || rest.starts_with("declare ") {
        return true;
    }

    match rest.strip_prefix("type ") {
        Some(after) => after
            .trim_start()
            .starts_with(|c: char| c.is_alphabetic() || c == '_' || c == '$' || c == '{' || c == '*'),
        None => false,
    }
}

/// Index of the first line after the declaration starting at `start`
fn skip_declaration(lines: &[&str], start: usize) -> usize {
    let mut depth = 0i32;
    let mut i = start;

    while i < lines.len() {
        let line = lines[i].trim();
        depth += nesting(line);
        i += 1;

        if depth > 0 {
            continue;
        }
        if line.ends_with(';') {
            break;
        }
        if line.ends_with(&['=', '|', '&', ','][..]) {
            continue;
        }
        let continues = lines.get(i).is_some_and(|next| {
            let next = next.trim_start();
            next.starts_with('|') || next.starts_with('&') || next.starts_with('{')
        });
        if !continues {
            break;
        }
    }

    i
}

fn nesting(line: &str) -> i32 {
    line.chars()
        .map(|c| match c {
            '{' | '[' | '(' => 1,
            '}' | ']' | ')' => -1,
            _ => 0,
        })
        .sum()
}

fn erase_annotations(line: &str) -> Cow<'_, str> {
    let trimmed = line.trim_start();
    if trimmed.starts_with("import ") || trimmed.starts_with("export {") || trimmed.starts_with("export *") {
        return Cow::Borrowed(line);
    }

    let mut code = MEMBER_MODIFIERS.replace(line, "$1").into_owned();
    code = FIELD_ANNOTATION
        .replace(&code, |caps: &Captures| {
            if matches!(&caps[2], "case" | "default") {
                caps[0].to_string()
            } else {
                format!("{}{}{}", &caps[1], &caps[2], &caps[3])
            }
        })
        .into_owned();
    code = VAR_ANNOTATION.replace_all(&code, "$1$2$3").into_owned();
    code = FUNCTION_GENERICS.replace_all(&code, "$1").into_owned();
    code = RETURN_ANNOTATION.replace_all(&code, ") {").into_owned();
    code = ARROW_RETURN_ANNOTATION.replace_all(&code, ") =>").into_owned();
    code = FUNCTION_PARAMS
        .replace_all(&code, |caps: &Captures| {
            format!("{}({})", &caps[1], strip_params(&caps[2]))
        })
        .into_owned();
    code = METHOD_PARAMS
        .replace(&code, |caps: &Captures| {
            if CONTROL_KEYWORDS.contains(&&caps[2]) {
                caps[0].to_string()
            } else {
                format!(
                    "{}{}{}({}){}",
                    &caps[1],
                    &caps[2],
                    &caps[3],
                    strip_params(&caps[4]),
                    &caps[5]
                )
            }
        })
        .into_owned();
    code = ARROW_PARAMS
        .replace_all(&code, |caps: &Captures| {
            format!("({}){}", strip_params(&caps[1]), &caps[2])
        })
        .into_owned();
    code = IMPLEMENTS.replace_all(&code, "$1").into_owned();
    code = AS_CAST.replace_all(&code, "").into_owned();
    code = CALL_TYPE_ARGS.replace_all(&code, "$1(").into_owned();
    code = NON_NULL.replace_all(&code, "$1$2").into_owned();

    Cow::Owned(code)
}

fn strip_params(params: &str) -> String {
    split_top_level(params, ',')
        .into_iter()
        .map(strip_param)
        .collect::<Vec<_>>()
        .join(",")
}

fn strip_param(param: &str) -> String {
    let Some(colon) = find_top_level(param, ':') else {
        return param.to_string();
    };

    let (head, tail) = param.split_at(colon);
    let head = head.trim_end().trim_end_matches('?');
    let head = MEMBER_MODIFIERS.replace(head, "$1");

    match find_top_level(tail, '=') {
        Some(eq) => format!("{} {}", head, tail[eq..].trim()),
        None => head.into_owned(),
    }
}

fn split_top_level(s: &str, separator: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut rest = s;
    while let Some(at) = find_top_level(rest, separator) {
        parts.push(&rest[..at]);
        rest = &rest[at + separator.len_utf8()..];
    }
    parts.push(rest);
    parts
}

/// Byte offset of `target` outside any brackets, skipping the `=` of `=>`
fn find_top_level(s: &str, target: char) -> Option<usize> {
    let mut depth = 0i32;
    let mut prev = '\0';
    let mut chars = s.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        let next = chars.peek().map(|&(_, n)| n);
        match c {
            '(' | '[' | '{' | '<' => depth += 1,
            ')' | ']' | '}' => depth -= 1,
            '>' if prev != '=' => depth -= 1,
            _ if c == target && depth == 0 => {
                if !(c == '=' && next == Some('>')) {
                    return Some(i);
                }
            }
            _ => {}
        }
        prev = c;
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_type_only_declarations_removed() {
        let source = r#"import type { User } from "./user";
import { render } from "./render";
export type { Props } from "./props";
export interface Props {
  name: string;
}
type Handler =
  | "a"
  | "b";
declare const VERSION: string;
export const greet = (user: User, excited?: boolean): string => user.name;
"#;
        let expected = format!(
            "\nimport {{ render }} from \"./render\";\n{}export const greet = (user, excited) => user.name;\n",
            "\n".repeat(8)
        );
        assert_eq!(erase_types(source), expected);
    }

    #[test]
    fn test_function_annotations_removed() {
        let source = "function add<T>(a: number, b: number = 2): number {\n  const total: number = a + b;\n  return total as number;\n}\n";
        let expected = "function add(a, b = 2) {\n  const total = a + b;\n  return total;\n}\n";
        assert_eq!(erase_types(source), expected);
    }

    #[test]
    fn test_class_members() {
        let source = r#"class Greeter implements Named {
  private prefix: string = "Hi";
  greet(name: string): string {
    return this.prefix + this.user!.name;
  }
}
"#;
        let expected = r#"class Greeter {
  prefix = "Hi";
  greet(name) {
    return this.prefix + this.user.name;
  }
}
"#;
        assert_eq!(erase_types(source), expected);
    }

    #[test]
    fn test_generic_calls_and_destructuring() {
        assert_eq!(
            erase_types("const [items, setItems] = useState<string[]>([]);"),
            "const [items, setItems] = useState([]);"
        );
        assert_eq!(
            erase_types("const { a, b }: Props = props;"),
            "const { a, b } = props;"
        );
    }

    #[test]
    fn test_plain_javascript_untouched() {
        let source = "import * as React from \"react\";\nif (a ? b : c) {\n  switch (x) {\n    default: y = 1;\n  }\n}\nlet type = 1;\n";
        assert_eq!(erase_types(source), source);
    }
}
