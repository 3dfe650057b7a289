//! Strict element trees built from tokens.
//!
//! Unlike the tokenizer, tree building rejects malformed structure: this is
//! what the sandbox's built-in evaluator reports as a compile fault.

use thiserror::Error;

use super::tokenizer::{Scan, Scanner};
use super::{Attr, Token};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element {
        name: String,
        attrs: Vec<Attr>,
        children: Vec<Node>,
    },
    Text(String),
    Expr(String),
    Comment(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MarkupError {
    #[error("unexpected end of input: <{0}> is never closed")]
    Unclosed(String),

    #[error("expected </{expected}> but found </{found}>")]
    MismatchedClose { expected: String, found: String },

    #[error("unexpected closing tag </{0}>")]
    UnexpectedClose(String),

    #[error("no element starts at offset {0}")]
    NotAnElement(usize),
}

struct Frame {
    name: String,
    attrs: Vec<Attr>,
    children: Vec<Node>,
}

/// Build a forest from a complete token sequence.
pub fn build_tree(tokens: Vec<Token>) -> Result<Vec<Node>, MarkupError> {
    let mut roots = Vec::new();
    let mut stack: Vec<Frame> = Vec::new();

    for token in tokens {
        if let Some(node) = push_token(&mut stack, token)? {
            roots.push(node);
        }
    }

    match stack.pop() {
        Some(frame) => Err(MarkupError::Unclosed(frame.name)),
        None => Ok(roots),
    }
}

/// Parse exactly one element starting at byte offset `start` of `src`.
///
/// Returns the element and the offset just past its closing tag. Used to
/// lift the markup out of a component body embedded in surrounding code.
pub fn parse_element(src: &str, start: usize) -> Result<(Node, usize), MarkupError> {
    let mut scanner = Scanner::at(src, start);
    let mut stack: Vec<Frame> = Vec::new();

    match scanner.next_scan() {
        Scan::Token(token @ Token::Open(_)) => {
            if let Some(node) = push_token(&mut stack, token)? {
                return Ok((node, scanner.position()));
            }
        }
        _ => return Err(MarkupError::NotAnElement(start)),
    }

    loop {
        match scanner.next_scan() {
            Scan::Token(token) => {
                if let Some(node) = push_token(&mut stack, token)? {
                    return Ok((node, scanner.position()));
                }
            }
            Scan::Truncated | Scan::Eof => {
                let name = stack.pop().map(|f| f.name).unwrap_or_default();
                return Err(MarkupError::Unclosed(name));
            }
        }
    }
}

/// Apply one token to the open-element stack. Returns a node when it
/// completes at depth zero.
fn push_token(stack: &mut Vec<Frame>, token: Token) -> Result<Option<Node>, MarkupError> {
    let node = match token {
        Token::Open(tag) if tag.self_closing => Node::Element {
            name: tag.name,
            attrs: tag.attrs,
            children: Vec::new(),
        },
        Token::Open(tag) => {
            stack.push(Frame {
                name: tag.name,
                attrs: tag.attrs,
                children: Vec::new(),
            });
            return Ok(None);
        }
        Token::Close(name) => {
            let frame = stack
                .pop()
                .ok_or_else(|| MarkupError::UnexpectedClose(name.clone()))?;
            if frame.name != name {
                return Err(MarkupError::MismatchedClose {
                    expected: frame.name,
                    found: name,
                });
            }
            Node::Element {
                name: frame.name,
                attrs: frame.attrs,
                children: frame.children,
            }
        }
        Token::Text(text) => Node::Text(text),
        Token::Expr(expr) => Node::Expr(expr),
        Token::Comment(body) => Node::Comment(body),
    };

    match stack.last_mut() {
        Some(parent) => {
            parent.children.push(node);
            Ok(None)
        }
        None => Ok(Some(node)),
    }
}
