//! The individual fragment normalization steps, in pipeline order.

use std::collections::BTreeMap;

use tracing::debug;

use super::style::css_to_object;
use super::{Degradation, NormalizeStep, Stage, StepError};
use crate::markup::{AttrValue, Token, is_void_element, tokenize_with_report};

// ---------------------------------------------------------------------------
// Text stage
// ---------------------------------------------------------------------------

/// Remove a surrounding fenced-code block (and its language tag).
///
/// Prose outside the first fenced block is discarded. A block still being
/// streamed (no closing fence yet) runs to the end of the input.
pub fn strip_fences(text: &str) -> &str {
    let mut offset = 0usize;
    let mut body_start = None;

    for line in text.split_inclusive('\n') {
        let is_fence = line.trim_start().starts_with("```");
        match body_start {
            None if is_fence => body_start = Some(offset + line.len()),
            Some(start) if is_fence => return &text[start..offset],
            _ => {}
        }
        offset += line.len();
    }

    match body_start {
        Some(start) => &text[start.min(text.len())..],
        None => text,
    }
}

/// Byte offset of the first structural tag start, if any.
pub fn first_tag_start(text: &str) -> Option<usize> {
    text.char_indices().find_map(|(i, c)| {
        if c != '<' {
            return None;
        }
        let rest = &text[i + 1..];
        let structural = rest.starts_with("!--")
            || rest.starts_with('>')
            || rest.starts_with(|n: char| n.is_ascii_alphabetic());
        structural.then_some(i)
    })
}

/// (a) Strip fences and language tags.
pub struct StripFences;

impl NormalizeStep for StripFences {
    fn name(&self) -> &'static str {
        "fences"
    }

    fn apply(&self, stage: Stage, _: &mut Vec<Degradation>) -> Result<Stage, StepError> {
        let text = expect_text(stage, self.name())?;
        Ok(Stage::Text(strip_fences(&text).to_string()))
    }
}

/// (b) Discard prose before the first tag.
pub struct DropPreamble;

impl NormalizeStep for DropPreamble {
    fn name(&self) -> &'static str {
        "preamble"
    }

    fn apply(&self, stage: Stage, _: &mut Vec<Degradation>) -> Result<Stage, StepError> {
        let text = expect_text(stage, self.name())?;
        match first_tag_start(&text) {
            Some(0) => Ok(Stage::Text(text)),
            Some(start) => {
                debug!(dropped = start, "dropping preamble before first tag");
                Ok(Stage::Text(text[start..].to_string()))
            }
            None => Ok(Stage::Text(String::new())),
        }
    }
}

/// Text to tokens. Whitespace inside tags and around `=` is canonicalized
/// here, since tokens carry no formatting. An unmatched `{` followed by more
/// markup is kept as a literal brace and recorded.
pub struct Tokenize;

impl NormalizeStep for Tokenize {
    fn name(&self) -> &'static str {
        "tokenize"
    }

    fn apply(&self, stage: Stage, degradations: &mut Vec<Degradation>) -> Result<Stage, StepError> {
        let text = expect_text(stage, self.name())?;
        let report = tokenize_with_report(&text);
        for offset in report.stray_braces {
            degradations.push(Degradation::new(
                self.name(),
                format!("unmatched `{{` at byte {offset} kept as literal text"),
            ));
        }
        Ok(Stage::Markup(report.tokens))
    }
}

// ---------------------------------------------------------------------------
// Markup stage
// ---------------------------------------------------------------------------

/// (c) `<!-- x -->` to `{/* x */}`.
pub struct RewriteComments;

impl NormalizeStep for RewriteComments {
    fn name(&self) -> &'static str {
        "comments"
    }

    fn apply(&self, stage: Stage, _: &mut Vec<Degradation>) -> Result<Stage, StepError> {
        let tokens = expect_markup(stage, self.name())?;
        let tokens = tokens
            .into_iter()
            .map(|token| match token {
                Token::Comment(body) => Token::Expr(format!("/*{}*/", body.replace("*/", "* /"))),
                other => other,
            })
            .collect();
        Ok(Stage::Markup(tokens))
    }
}

/// (d) Attribute renames from a mapping table.
pub struct RenameAttributes {
    renames: BTreeMap<String, String>,
}

impl RenameAttributes {
    pub fn new(renames: BTreeMap<String, String>) -> Self {
        Self { renames }
    }
}

impl NormalizeStep for RenameAttributes {
    fn name(&self) -> &'static str {
        "attributes"
    }

    fn apply(&self, stage: Stage, _: &mut Vec<Degradation>) -> Result<Stage, StepError> {
        if let Some((from, to)) = self.renames.iter().find(|(_, to)| !is_attribute_name(to)) {
            return Err(StepError::InvalidRename {
                from: from.clone(),
                to: to.clone(),
            });
        }

        let mut tokens = expect_markup(stage, self.name())?;
        for token in &mut tokens {
            let Token::Open(tag) = token else { continue };
            let present: Vec<String> = tag.attrs.iter().map(|a| a.name.clone()).collect();
            for attr in &mut tag.attrs {
                if let Some(to) = self.renames.get(&attr.name) {
                    if !present.contains(to) {
                        attr.name = to.clone();
                    }
                }
            }
        }
        Ok(Stage::Markup(tokens))
    }
}

fn is_attribute_name(name: &str) -> bool {
    let mut chars = name.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | ':'))
}

/// (e) Inline style strings to style objects, per attribute.
///
/// A style with no valid declaration is left as it was and reported; the
/// rest of the markup still converts.
pub struct ConvertStyles;

impl NormalizeStep for ConvertStyles {
    fn name(&self) -> &'static str {
        "styles"
    }

    fn apply(&self, stage: Stage, degradations: &mut Vec<Degradation>) -> Result<Stage, StepError> {
        let mut tokens = expect_markup(stage, self.name())?;
        for token in &mut tokens {
            let Token::Open(tag) = token else { continue };
            let tag_name = tag.name.clone();
            for attr in &mut tag.attrs {
                if attr.name != "style" {
                    continue;
                }
                let AttrValue::Quoted(css) = &attr.value else { continue };
                match css_to_object(css) {
                    Ok(object) => {
                        for decl in object.skipped {
                            degradations.push(Degradation::new(
                                self.name(),
                                format!("skipped malformed declaration `{decl}` on <{tag_name}>"),
                            ));
                        }
                        attr.value = AttrValue::Expr(object.literal);
                    }
                    Err(e) => degradations.push(Degradation::new(self.name(), e.to_string())),
                }
            }
        }
        Ok(Stage::Markup(tokens))
    }
}

/// (f) Drop layout-only whitespace between tags.
pub struct NormalizeWhitespace;

impl NormalizeStep for NormalizeWhitespace {
    fn name(&self) -> &'static str {
        "whitespace"
    }

    fn apply(&self, stage: Stage, _: &mut Vec<Degradation>) -> Result<Stage, StepError> {
        let tokens = expect_markup(stage, self.name())?;
        let mut depth = 0usize;
        let mut out = Vec::with_capacity(tokens.len());

        for token in tokens {
            match &token {
                Token::Open(tag) if !tag.self_closing => depth += 1,
                Token::Close(_) => depth = depth.saturating_sub(1),
                Token::Text(text) if text.trim().is_empty() => {
                    if depth == 0 || text.contains('\n') {
                        continue;
                    }
                }
                _ => {}
            }
            out.push(token);
        }
        Ok(Stage::Markup(out))
    }
}

/// Close dangling elements and drop stray closing tags, so a partially
/// streamed buffer still yields well-formed markup.
pub struct BalanceTags;

impl NormalizeStep for BalanceTags {
    fn name(&self) -> &'static str {
        "balance"
    }

    fn apply(&self, stage: Stage, degradations: &mut Vec<Degradation>) -> Result<Stage, StepError> {
        let tokens = expect_markup(stage, self.name())?;
        let mut open: Vec<String> = Vec::new();
        let mut out = Vec::with_capacity(tokens.len());

        for token in tokens {
            match token {
                Token::Open(mut tag) => {
                    if is_void_element(&tag.name) {
                        tag.self_closing = true;
                    }
                    if !tag.self_closing {
                        open.push(tag.name.clone());
                    }
                    out.push(Token::Open(tag));
                }
                Token::Close(name) => match open.iter().rposition(|n| *n == name) {
                    Some(index) => {
                        while open.len() > index + 1 {
                            if let Some(inner) = open.pop() {
                                out.push(Token::Close(inner));
                            }
                        }
                        open.pop();
                        out.push(Token::Close(name));
                    }
                    None if is_void_element(&name) => {}
                    None => degradations.push(Degradation::new(
                        self.name(),
                        format!("dropped stray closing tag </{name}>"),
                    )),
                },
                other => out.push(other),
            }
        }

        while let Some(name) = open.pop() {
            out.push(Token::Close(name));
        }
        Ok(Stage::Markup(out))
    }
}

/// (g) Empty element pairs and void elements become self-closing.
pub struct SelfClose;

impl NormalizeStep for SelfClose {
    fn name(&self) -> &'static str {
        "self-closing"
    }

    fn apply(&self, stage: Stage, _: &mut Vec<Degradation>) -> Result<Stage, StepError> {
        let tokens = expect_markup(stage, self.name())?;
        let mut out: Vec<Token> = Vec::with_capacity(tokens.len());

        for token in tokens {
            match token {
                Token::Open(mut tag) if is_void_element(&tag.name) => {
                    tag.self_closing = true;
                    out.push(Token::Open(tag));
                }
                Token::Close(name) => {
                    if let Some(Token::Open(prev)) = out.last_mut() {
                        if !prev.self_closing && !prev.name.is_empty() && prev.name == name {
                            prev.self_closing = true;
                            continue;
                        }
                    }
                    out.push(Token::Close(name));
                }
                other => out.push(other),
            }
        }
        Ok(Stage::Markup(out))
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn expect_text(stage: Stage, step: &'static str) -> Result<String, StepError> {
    match stage {
        Stage::Text(text) => Ok(text),
        Stage::Markup(_) => Err(StepError::UnexpectedStage {
            step,
            expected: "text",
        }),
    }
}

fn expect_markup(stage: Stage, step: &'static str) -> Result<Vec<Token>, StepError> {
    match stage {
        Stage::Markup(tokens) => Ok(tokens),
        Stage::Text(_) => Err(StepError::UnexpectedStage {
            step,
            expected: "markup",
        }),
    }
}
