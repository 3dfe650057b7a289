//! Inline CSS declarations to style-object literals.

use super::StepError;

/// A converted `style` attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StyleObject {
    /// Object literal including its braces: `{color: 'red'}`.
    pub literal: String,
    /// Declarations that were dropped as malformed.
    pub skipped: Vec<String>,
}

/// Convert `key: value; key2: value2` into `{camelKey: 'value', ...}`.
///
/// Malformed declarations (no colon, empty key or value, invalid property
/// name) are skipped. Fails only when nothing valid remains.
pub fn css_to_object(css: &str) -> Result<StyleObject, StepError> {
    let mut entries = Vec::new();
    let mut skipped = Vec::new();

    for decl in split_top_level(css, ';') {
        let decl = decl.trim();
        if decl.is_empty() {
            continue;
        }
        match parse_declaration(decl) {
            Some((key, value)) => entries.push(format!("{key}: '{}'", escape_value(value))),
            None => skipped.push(decl.to_string()),
        }
    }

    if entries.is_empty() {
        return Err(StepError::MalformedStyle(css.to_string()));
    }

    Ok(StyleObject {
        literal: format!("{{{}}}", entries.join(", ")),
        skipped,
    })
}

/// CSS property name to its style-object key.
///
/// `font-size` -> `fontSize`, `-webkit-box-shadow` -> `WebkitBoxShadow`,
/// `-ms-transform` -> `msTransform`. Custom properties stay quoted.
pub fn property_key(property: &str) -> String {
    if property.starts_with("--") {
        return format!("'{property}'");
    }
    if let Some(rest) = property.strip_prefix("-ms-") {
        return camel_case(&format!("ms-{rest}"));
    }
    if let Some(rest) = property.strip_prefix('-') {
        let camel = camel_case(rest);
        let mut chars = camel.chars();
        return match chars.next() {
            Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
            None => camel,
        };
    }
    camel_case(property)
}

fn camel_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut upper = false;
    for c in s.chars() {
        if c == '-' {
            upper = true;
        } else if upper {
            out.push(c.to_ascii_uppercase());
            upper = false;
        } else {
            out.push(c.to_ascii_lowercase());
        }
    }
    out
}

fn parse_declaration(decl: &str) -> Option<(String, &str)> {
    let (name, value) = decl.split_once(':')?;
    let name = name.trim();
    let value = value.trim();
    if value.is_empty() || !is_property_name(name) {
        return None;
    }
    Some((property_key(name), value))
}

fn is_property_name(name: &str) -> bool {
    let body = name.trim_start_matches('-');
    let dashes = name.len() - body.len();
    dashes <= 2
        && body.chars().next().is_some_and(|c| c.is_ascii_alphabetic())
        && body.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

fn escape_value(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

/// Split on `sep` outside parentheses and quotes, so
/// `url(data:...;base64,...)` stays whole.
fn split_top_level(text: &str, sep: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut start = 0usize;

    for (i, c) in text.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match (quote, c) {
            (Some(_), '\\') => escaped = true,
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(c),
            (None, '(') => depth += 1,
            (None, ')') => depth = depth.saturating_sub(1),
            (None, c) if c == sep && depth == 0 => {
                parts.push(&text[start..i]);
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(&text[start..]);
    parts
}

// ---------------------------------------------------------------------------
// Style objects back to CSS
// ---------------------------------------------------------------------------

const UNITLESS: &[&str] = &[
    "flex",
    "flex-grow",
    "flex-shrink",
    "font-weight",
    "line-height",
    "opacity",
    "order",
    "z-index",
    "zoom",
];

/// Convert a style-object literal back into a CSS declaration list.
///
/// Entries whose value is not a literal are skipped, since nothing is
/// evaluated. Numbers get `px` unless the property is unitless.
pub fn object_to_css(literal: &str) -> String {
    let trimmed = literal.trim();
    let Some(body) = trimmed
        .strip_prefix('{')
        .and_then(|rest| rest.strip_suffix('}'))
    else {
        return String::new();
    };

    let mut decls = Vec::new();
    for entry in split_top_level(body, ',') {
        let Some((key, value)) = entry.split_once(':') else {
            continue;
        };
        let property = match unquote(key.trim()) {
            Some(raw) => raw.to_string(),
            None => css_property(key.trim()),
        };
        let value = value.trim();
        let value = match unquote(value) {
            Some(text) => text.replace("\\'", "'").replace("\\\\", "\\"),
            None => match value.parse::<f64>() {
                Ok(n) if n != 0.0 && !UNITLESS.contains(&property.as_str()) => format!("{value}px"),
                Ok(_) => value.to_string(),
                Err(_) => continue,
            },
        };
        if !property.is_empty() {
            decls.push(format!("{property}: {value}"));
        }
    }
    decls.join("; ")
}

/// Style-object key to CSS property: `fontSize` -> `font-size`,
/// `WebkitTransition` -> `-webkit-transition`, `msTransform` -> `-ms-transform`.
pub fn css_property(key: &str) -> String {
    let mut out = String::with_capacity(key.len() + 4);
    if key.starts_with("ms") && key[2..].starts_with(|c: char| c.is_ascii_uppercase()) {
        out.push('-');
    }
    for c in key.chars() {
        if c.is_ascii_uppercase() {
            out.push('-');
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

fn unquote(text: &str) -> Option<&str> {
    let first = text.chars().next()?;
    if !matches!(first, '\'' | '"' | '`') || text.len() < 2 || !text.ends_with(first) {
        return None;
    }
    Some(&text[1..text.len() - 1])
}
