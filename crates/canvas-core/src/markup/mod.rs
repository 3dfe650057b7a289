//! Lightweight tag/token model for AI-authored markup.
//!
//! The normalizer rewrites token sequences instead of raw strings, and the
//! sandbox's built-in evaluator builds element trees from the same tokens.
//!
//! ```text
//! "<div class = \"a\">Hi</div>"
//!     |
//!     v  tokenize()
//! [Open(div, [class="a"]), Text("Hi"), Close(div)]
//!     |
//!     v  serialize()
//! "<div class=\"a\">Hi</div>"
//! ```

pub mod tokenizer;
pub mod tree;

pub use tokenizer::{Scan, Scanner, Tokenized, tokenize, tokenize_with_report};
pub use tree::{MarkupError, Node, build_tree, parse_element};

/// One lexical unit of markup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// Character data between tags.
    Text(String),
    /// An HTML comment body (without `<!--` / `-->`).
    Comment(String),
    /// A brace-delimited expression container (without the outer braces).
    Expr(String),
    /// An opening or self-closing tag.
    Open(Tag),
    /// A closing tag; the name is empty for a fragment close (`</>`).
    Close(String),
}

/// An opening tag. The name is empty for a fragment (`<>`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    pub name: String,
    pub attrs: Vec<Attr>,
    pub self_closing: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attr {
    pub name: String,
    pub value: AttrValue,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttrValue {
    /// Attribute present without a value (`disabled`).
    Bare,
    /// Quoted or unquoted literal value.
    Quoted(String),
    /// Expression value (`{...}`), stored without the outer braces.
    Expr(String),
}

impl Tag {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attrs: Vec::new(),
            self_closing: false,
        }
    }

    pub fn attr(&self, name: &str) -> Option<&AttrValue> {
        self.attrs.iter().find(|a| a.name == name).map(|a| &a.value)
    }
}

/// HTML elements that never have content.
pub const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

pub fn is_void_element(name: &str) -> bool {
    VOID_ELEMENTS.contains(&name.to_ascii_lowercase().as_str())
}

/// Whether a tag name refers to a component rather than an intrinsic element.
pub fn is_component_name(name: &str) -> bool {
    name.chars().next().is_some_and(|c| c.is_ascii_uppercase())
}

/// Render tokens back into canonical markup.
///
/// Attribute spacing is canonical (`name="value"`, single spaces), which is
/// how inconsistent spacing around `=` and tag boundaries is normalized.
pub fn serialize(tokens: &[Token]) -> String {
    let mut out = String::new();
    for token in tokens {
        match token {
            Token::Text(text) => out.push_str(text),
            Token::Comment(body) => {
                out.push_str("<!--");
                out.push_str(body);
                out.push_str("-->");
            }
            Token::Expr(expr) => {
                out.push('{');
                out.push_str(expr);
                out.push('}');
            }
            Token::Open(tag) => {
                out.push('<');
                out.push_str(&tag.name);
                for attr in &tag.attrs {
                    out.push(' ');
                    push_attr(&mut out, attr);
                }
                if tag.self_closing {
                    out.push_str(" />");
                } else {
                    out.push('>');
                }
            }
            Token::Close(name) => {
                out.push_str("</");
                out.push_str(name);
                out.push('>');
            }
        }
    }
    out
}

fn push_attr(out: &mut String, attr: &Attr) {
    out.push_str(&attr.name);
    match &attr.value {
        AttrValue::Bare => {}
        AttrValue::Quoted(value) => {
            let quote = if value.contains('"') { '\'' } else { '"' };
            out.push('=');
            out.push(quote);
            out.push_str(value);
            out.push(quote);
        }
        AttrValue::Expr(expr) => {
            out.push_str("={");
            out.push_str(expr);
            out.push('}');
        }
    }
}
