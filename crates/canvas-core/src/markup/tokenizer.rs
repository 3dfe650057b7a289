//! Tolerant markup scanner.
//!
//! The scanner never fails. A `<` that does not start a well-formed tag is
//! emitted as text; a construct cut off by the end of input (a tag, comment,
//! or expression still being streamed) yields [`Scan::Truncated`] and the
//! caller decides whether to drop the tail. A `{` that is never closed but
//! is followed by more markup is not a streaming tail: it is kept as a
//! literal brace and its offset is recorded.

use tracing::debug;

use super::{Attr, AttrValue, Tag, Token};

/// Result of scanning one token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scan {
    Token(Token),
    /// The remaining input is an unterminated construct.
    Truncated,
    Eof,
}

/// Pull-based scanner over a markup string.
#[derive(Debug, Clone)]
pub struct Scanner<'a> {
    src: &'a str,
    pos: usize,
    stray_braces: Vec<usize>,
}

impl<'a> Scanner<'a> {
    pub fn new(src: &'a str) -> Self {
        Self::at(src, 0)
    }

    /// Start scanning at byte offset `pos` (must be a char boundary).
    pub fn at(src: &'a str, pos: usize) -> Self {
        Self {
            src,
            pos,
            stray_braces: Vec::new(),
        }
    }

    /// Byte offset of the next unread character.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Offsets of unmatched `{` emitted as literal text so far.
    pub fn stray_braces(&self) -> &[usize] {
        &self.stray_braces
    }

    pub fn next_scan(&mut self) -> Scan {
        let bytes = self.src.as_bytes();
        let len = bytes.len();
        if self.pos >= len {
            return Scan::Eof;
        }

        let rest = &self.src[self.pos..];
        if rest.starts_with("<!--") {
            let body_start = self.pos + 4;
            return match self.src[body_start..].find("-->") {
                Some(offset) => {
                    let body = self.src[body_start..body_start + offset].to_string();
                    self.pos = body_start + offset + 3;
                    Scan::Token(Token::Comment(body))
                }
                None => {
                    self.pos = len;
                    Scan::Truncated
                }
            };
        }

        match bytes[self.pos] {
            b'<' => match scan_tag(self.src, self.pos) {
                TagScan::Complete(token, end) => {
                    self.pos = end;
                    Scan::Token(token)
                }
                TagScan::Truncated => {
                    self.pos = len;
                    Scan::Truncated
                }
                TagScan::Invalid => {
                    self.pos += 1;
                    Scan::Token(Token::Text("<".to_string()))
                }
            },
            b'{' => match matching_brace(self.src, self.pos) {
                Some(end) => {
                    let inner = self.src[self.pos + 1..end].to_string();
                    self.pos = end + 1;
                    Scan::Token(Token::Expr(inner))
                }
                None if tag_follows(&self.src[self.pos + 1..]) => {
                    self.stray_braces.push(self.pos);
                    self.pos += 1;
                    Scan::Token(Token::Text("{".to_string()))
                }
                None => {
                    self.pos = len;
                    Scan::Truncated
                }
            },
            _ => {
                let end = rest
                    .find(['<', '{'])
                    .map(|offset| self.pos + offset)
                    .unwrap_or(len);
                let text = self.src[self.pos..end].to_string();
                self.pos = end;
                Scan::Token(Token::Text(text))
            }
        }
    }
}

/// Output of [`tokenize_with_report`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tokenized {
    pub tokens: Vec<Token>,
    /// Byte offsets of unmatched `{` kept as literal braces.
    pub stray_braces: Vec<usize>,
}

/// Tokenize a whole string, merging adjacent text and dropping an
/// unterminated trailing construct.
pub fn tokenize(input: &str) -> Vec<Token> {
    tokenize_with_report(input).tokens
}

/// Like [`tokenize`], also reporting unmatched braces.
///
/// A stray `{` becomes the expression `'{'`, which serializes to markup
/// that renders a literal brace.
pub fn tokenize_with_report(input: &str) -> Tokenized {
    let mut scanner = Scanner::new(input);
    let mut tokens: Vec<Token> = Vec::new();
    loop {
        let strays = scanner.stray_braces().len();
        match scanner.next_scan() {
            Scan::Token(Token::Text(_)) if scanner.stray_braces().len() > strays => {
                tokens.push(Token::Expr("'{'".to_string()));
            }
            Scan::Token(Token::Text(text)) => match tokens.last_mut() {
                Some(Token::Text(prev)) => prev.push_str(&text),
                _ => tokens.push(Token::Text(text)),
            },
            Scan::Token(token) => tokens.push(token),
            Scan::Truncated => {
                debug!(consumed = scanner.position(), "dropping unterminated trailing markup");
                break;
            }
            Scan::Eof => break,
        }
    }
    Tokenized {
        tokens,
        stray_braces: scanner.stray_braces,
    }
}

/// Whether a tag, closing tag or comment starts anywhere in `rest`.
fn tag_follows(rest: &str) -> bool {
    rest.match_indices('<').any(|(i, _)| {
        rest[i + 1..]
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || matches!(c, '/' | '!' | '>'))
    })
}

enum TagScan {
    Complete(Token, usize),
    Truncated,
    Invalid,
}

fn scan_tag(src: &str, start: usize) -> TagScan {
    let b = src.as_bytes();
    let len = b.len();
    let mut p = start + 1;

    let closing = p < len && b[p] == b'/';
    if closing {
        p += 1;
    }
    p = skip_ws(b, p);
    if p >= len {
        return TagScan::Truncated;
    }

    if closing {
        let name_end = scan_name(b, p);
        let name = src[p..name_end].to_string();
        let q = skip_ws(b, name_end);
        if q >= len {
            return TagScan::Truncated;
        }
        return if b[q] == b'>' {
            TagScan::Complete(Token::Close(name), q + 1)
        } else {
            TagScan::Invalid
        };
    }

    if b[p] == b'>' {
        return TagScan::Complete(Token::Open(Tag::new("")), p + 1);
    }
    if !b[p].is_ascii_alphabetic() {
        return TagScan::Invalid;
    }

    let name_end = scan_name(b, p);
    let mut tag = Tag::new(&src[p..name_end]);
    p = name_end;

    loop {
        p = skip_ws(b, p);
        if p >= len {
            return TagScan::Truncated;
        }
        match b[p] {
            b'>' => return TagScan::Complete(Token::Open(tag), p + 1),
            b'/' => {
                let q = skip_ws(b, p + 1);
                if q >= len {
                    return TagScan::Truncated;
                }
                if b[q] == b'>' {
                    tag.self_closing = true;
                    return TagScan::Complete(Token::Open(tag), q + 1);
                }
                return TagScan::Invalid;
            }
            _ => {}
        }

        let attr_end = scan_attr_name(b, p);
        if attr_end == p {
            return TagScan::Invalid;
        }
        let name = src[p..attr_end].to_string();
        p = skip_ws(b, attr_end);

        let value = if p < len && b[p] == b'=' {
            p = skip_ws(b, p + 1);
            if p >= len {
                return TagScan::Truncated;
            }
            match b[p] {
                quote @ (b'"' | b'\'') => match src[p + 1..].find(quote as char) {
                    Some(offset) => {
                        let value = src[p + 1..p + 1 + offset].to_string();
                        p = p + 1 + offset + 1;
                        AttrValue::Quoted(value)
                    }
                    None => return TagScan::Truncated,
                },
                b'{' => match matching_brace(src, p) {
                    Some(end) => {
                        let expr = src[p + 1..end].to_string();
                        p = end + 1;
                        AttrValue::Expr(expr)
                    }
                    None => return TagScan::Truncated,
                },
                b'>' => return TagScan::Invalid,
                _ => {
                    let end = scan_unquoted(b, p);
                    let value = src[p..end].to_string();
                    p = end;
                    AttrValue::Quoted(value)
                }
            }
        } else {
            AttrValue::Bare
        };

        tag.attrs.push(Attr { name, value });
    }
}

fn skip_ws(b: &[u8], mut p: usize) -> usize {
    while p < b.len() && b[p].is_ascii_whitespace() {
        p += 1;
    }
    p
}

fn scan_name(b: &[u8], mut p: usize) -> usize {
    while p < b.len() && (b[p].is_ascii_alphanumeric() || matches!(b[p], b'-' | b'_' | b'.' | b':'))
    {
        p += 1;
    }
    p
}

fn scan_attr_name(b: &[u8], mut p: usize) -> usize {
    while p < b.len()
        && !b[p].is_ascii_whitespace()
        && !matches!(b[p], b'=' | b'>' | b'/' | b'"' | b'\'' | b'<' | b'{' | b'}')
    {
        p += 1;
    }
    p
}

fn scan_unquoted(b: &[u8], mut p: usize) -> usize {
    while p < b.len() && !b[p].is_ascii_whitespace() && b[p] != b'>' {
        if b[p] == b'/' && b.get(p + 1) == Some(&b'>') {
            break;
        }
        p += 1;
    }
    p
}

/// Find the `}` matching the `{` at `start`, skipping string literals and
/// block comments. Returns `None` when the input ends first.
pub(crate) fn matching_brace(src: &str, start: usize) -> Option<usize> {
    let b = src.as_bytes();
    let mut depth = 0usize;
    let mut p = start;
    while p < b.len() {
        match b[p] {
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(p);
                }
            }
            quote @ (b'"' | b'\'' | b'`') => {
                p += 1;
                while p < b.len() && b[p] != quote {
                    if b[p] == b'\\' {
                        p += 1;
                    }
                    p += 1;
                }
                if p >= b.len() {
                    return None;
                }
            }
            b'/' if b.get(p + 1) == Some(&b'*') => {
                let close = src[p + 2..].find("*/")?;
                p = p + 2 + close + 1;
            }
            _ => {}
        }
        p += 1;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open(name: &str, attrs: Vec<(&str, AttrValue)>, self_closing: bool) -> Token {
        Token::Open(Tag {
            name: name.to_string(),
            attrs: attrs
                .into_iter()
                .map(|(n, v)| Attr {
                    name: n.to_string(),
                    value: v,
                })
                .collect(),
            self_closing,
        })
    }

    #[test]
    fn simple_element() {
        let tokens = tokenize("<div class=\"a\">Hi</div>");
        assert_eq!(
            tokens,
            vec![
                open("div", vec![("class", AttrValue::Quoted("a".into()))], false),
                Token::Text("Hi".into()),
                Token::Close("div".into()),
            ]
        );
    }

    #[test]
    fn tolerates_spacing_around_equals_and_tag_start() {
        let tokens = tokenize("< span  id = 'x'   >t</ span >");
        assert_eq!(
            tokens,
            vec![
                open("span", vec![("id", AttrValue::Quoted("x".into()))], false),
                Token::Text("t".into()),
                Token::Close("span".into()),
            ]
        );
    }

    #[test]
    fn bare_unquoted_and_expression_attributes() {
        let tokens = tokenize("<input disabled type=text onChange={() => set({a: 1})} />");
        assert_eq!(
            tokens,
            vec![open(
                "input",
                vec![
                    ("disabled", AttrValue::Bare),
                    ("type", AttrValue::Quoted("text".into())),
                    ("onChange", AttrValue::Expr("() => set({a: 1})".into())),
                ],
                true,
            )]
        );
    }

    #[test]
    fn comments_and_expressions() {
        let tokens = tokenize("<!-- note --><p>{/* jsx */}{count}</p>");
        assert_eq!(
            tokens,
            vec![
                Token::Comment(" note ".into()),
                open("p", vec![], false),
                Token::Expr("/* jsx */".into()),
                Token::Expr("count".into()),
                Token::Close("p".into()),
            ]
        );
    }

    #[test]
    fn fragments() {
        let tokens = tokenize("<><b>x</b></>");
        assert_eq!(tokens.first(), Some(&open("", vec![], false)));
        assert_eq!(tokens.last(), Some(&Token::Close(String::new())));
    }

    #[test]
    fn stray_angle_bracket_is_text() {
        let tokens = tokenize("<p>1 < 2</p>");
        assert_eq!(
            tokens,
            vec![
                open("p", vec![], false),
                Token::Text("1 < 2".into()),
                Token::Close("p".into()),
            ]
        );
    }

    #[test]
    fn truncated_tail_is_dropped() {
        let tokens = tokenize("<div><p>Hello</p><span cla");
        assert_eq!(tokens.len(), 4);
        assert_eq!(tokens[3], Token::Close("p".into()));

        assert_eq!(tokenize("<p>x</p><!-- half").len(), 3);
        assert_eq!(tokenize("<p>{value").len(), 1);
        assert_eq!(tokenize("<p>{items.map(i => i").len(), 1);
    }

    #[test]
    fn unmatched_brace_before_more_markup_is_literal() {
        let report = tokenize_with_report("<p>Use { to open</p><p>Tail</p>");
        assert_eq!(report.stray_braces, vec![7]);
        assert_eq!(
            report.tokens,
            vec![
                open("p", vec![], false),
                Token::Text("Use ".into()),
                Token::Expr("'{'".into()),
                Token::Text(" to open".into()),
                Token::Close("p".into()),
                open("p", vec![], false),
                Token::Text("Tail".into()),
                Token::Close("p".into()),
            ]
        );
    }

    #[test]
    fn scanner_reports_stray_brace_as_text() {
        let mut scanner = Scanner::new("{ x <b>");
        assert_eq!(scanner.next_scan(), Scan::Token(Token::Text("{".into())));
        assert_eq!(scanner.stray_braces(), &[0]);
        assert_eq!(scanner.next_scan(), Scan::Token(Token::Text(" x ".into())));
    }

    #[test]
    fn brace_matching_skips_strings_and_comments() {
        let src = "{ '}' + \"}\" /* } */ + {a: 1} }";
        assert_eq!(matching_brace(src, 0), Some(src.len() - 1));
        assert_eq!(matching_brace("{ unterminated", 0), None);
    }

    #[test]
    fn multibyte_text_survives() {
        let tokens = tokenize("<p>héllo — ✓</p>");
        assert_eq!(tokens[1], Token::Text("héllo — ✓".into()));
    }
}
