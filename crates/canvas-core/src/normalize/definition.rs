//! Detection of complete component definitions.

use std::sync::LazyLock;

use regex::Regex;

use super::is_identifier;

static DECLARATION: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(
        r"^(?:export\s+(?:default\s+)?)?(?:async\s+)?(?:function\*?|const|let|var|class)\s+([A-Za-z_$][\w$]*)",
    )
    .ok()
});

/// A top-level declaration found at the start of a buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Definition {
    pub name: String,
    /// The declaration with leading imports, any `export` prefix and a
    /// trailing `export default Name;` removed.
    pub body: String,
    /// The body already ends with its own render invocation.
    pub renders_itself: bool,
}

/// Return the definition when `source` begins with a named declaration.
///
/// Leading `import` statements (including multi-line ones) and a
/// `"use client"` directive are skipped first.
pub fn detect(source: &str) -> Option<Definition> {
    let rest = skip_imports(source);
    let pattern = DECLARATION.as_ref()?;
    let name = pattern.captures(rest)?.get(1)?.as_str().to_string();

    let body = strip_default_export_line(strip_export(rest).trim_end()).to_string();
    let renders_itself = body
        .lines()
        .any(|line| line.trim_start().starts_with("render("));

    Some(Definition {
        name,
        body,
        renders_itself,
    })
}

fn skip_imports(source: &str) -> &str {
    let mut offset = 0usize;
    let mut in_import = false;

    for line in source.split_inclusive('\n') {
        let trimmed = line.trim();
        let skip = if in_import {
            in_import = !ends_import(trimmed);
            true
        } else if trimmed.is_empty() || is_directive(trimmed) {
            true
        } else if trimmed.starts_with("import ") || trimmed.starts_with("import{") {
            // Side-effect imports (`import './x.css'`) are always one line.
            let side_effect = trimmed.starts_with("import '") || trimmed.starts_with("import \"");
            in_import = !(side_effect || ends_import(trimmed));
            true
        } else {
            false
        };
        if !skip {
            break;
        }
        offset += line.len();
    }

    &source[offset..]
}

fn ends_import(line: &str) -> bool {
    line.contains(" from ") || line.starts_with("from ") || line.starts_with("} from") || line.ends_with(';')
}

fn is_directive(line: &str) -> bool {
    matches!(
        line.trim_end_matches(';'),
        "\"use client\"" | "'use client'" | "\"use strict\"" | "'use strict'"
    )
}

fn strip_export(source: &str) -> &str {
    let Some(rest) = source.strip_prefix("export") else {
        return source;
    };
    let rest = rest.trim_start();
    match rest.strip_prefix("default") {
        Some(after) if after.starts_with(char::is_whitespace) => after.trim_start(),
        _ => rest,
    }
}

/// Drop a final `export default Name;` statement.
fn strip_default_export_line(body: &str) -> &str {
    let (head, last) = body.rsplit_once('\n').unwrap_or(("", body));
    let exported = last
        .trim()
        .strip_prefix("export default ")
        .map(|name| name.trim().trim_end_matches(';').trim_end());
    match exported {
        Some(name) if is_identifier(name) => head.trim_end(),
        _ => body,
    }
}
