//! Built-in evaluator for component targets.
//!
//! A restricted renderer, not a script engine: it lifts the markup each
//! top-level component returns, resolves component names against the
//! source's own definitions and the binding table, and renders static
//! HTML. Expression containers are not evaluated; only string, number, and
//! comment expressions produce output.

use std::collections::BTreeMap;
use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex::Regex;
use tracing::debug;

use super::bindings::{BindingTable, LIBRARY_PRIMITIVES, Props, escape_html, html_attrs};
use super::evaluator::{Evaluator, Renderable};
use super::{CompileFault, RenderFault};
use crate::framework::ExecutionStrategy;
use crate::markup::{Attr, AttrValue, Node, is_component_name, is_void_element, parse_element};
use crate::normalize::{NormalizedArtifact, object_to_css};

static TOP_LEVEL_DEFINITION: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(
        r"(?m)^(?:export\s+(?:default\s+)?)?(?:async\s+)?(?:function\*?|const|let|var|class)\s+([A-Za-z_$][\w$]*)",
    )
    .ok()
});

pub struct MarkupEvaluator {
    max_depth: usize,
}

impl MarkupEvaluator {
    pub fn new(max_depth: usize) -> Self {
        Self { max_depth }
    }
}

impl Default for MarkupEvaluator {
    fn default() -> Self {
        Self::new(64)
    }
}

#[async_trait]
impl Evaluator for MarkupEvaluator {
    fn name(&self) -> &str {
        "markup"
    }

    async fn compile(
        &self,
        artifact: &NormalizedArtifact,
        bindings: &BindingTable,
    ) -> Result<Box<dyn Renderable>, CompileFault> {
        if !artifact.executable
            || artifact.target_framework.execution() != ExecutionStrategy::Evaluated
        {
            return Err(CompileFault::NotExecutable(artifact.target_framework));
        }

        let program = Program::compile(&artifact.source, &artifact.entry_expression, bindings)?;
        debug!(
            components = program.components.len(),
            evaluator = self.name(),
            "compiled component source"
        );
        Ok(Box::new(MountedComponent {
            program: Arc::new(program),
            bindings: bindings.clone(),
            max_depth: self.max_depth,
        }))
    }
}

// ---------------------------------------------------------------------------
// Compilation
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct Program {
    entry: Node,
    /// Top-level component name -> the markup it returns, if any.
    components: BTreeMap<String, Option<Node>>,
}

impl Program {
    fn compile(source: &str, entry: &str, bindings: &BindingTable) -> Result<Self, CompileFault> {
        reject_module_resolution(source)?;
        check_library_bindings(source, bindings)?;

        let entry = entry.trim();
        if entry.is_empty() {
            return Err(CompileFault::MissingEntry);
        }
        let (entry, _) = parse_element(entry, 0)
            .map_err(|e| CompileFault::Syntax(format!("entry expression: {e}")))?;

        let components = collect_components(source)?;
        let program = Self { entry, components };

        program.check_names(&program.entry, bindings)?;
        for node in program.components.values().flatten() {
            program.check_names(node, bindings)?;
        }
        Ok(program)
    }

    fn check_names(&self, node: &Node, bindings: &BindingTable) -> Result<(), CompileFault> {
        let Node::Element { name, children, .. } = node else {
            return Ok(());
        };
        let resolvable = is_fragment(name)
            || (!name.contains('.')
                && (!is_component_name(name)
                    || self.components.contains_key(name)
                    || bindings.get(name).is_some()));
        if !resolvable {
            return Err(CompileFault::UnknownComponent(name.clone()));
        }
        for child in children {
            self.check_names(child, bindings)?;
        }
        Ok(())
    }
}

fn reject_module_resolution(source: &str) -> Result<(), CompileFault> {
    for line in source.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with("import ")
            || trimmed.starts_with("import{")
            || trimmed.contains("require(")
            || trimmed.contains("import(")
        {
            return Err(CompileFault::ModuleResolution(trimmed.to_string()));
        }
    }
    Ok(())
}

fn check_library_bindings(source: &str, bindings: &BindingTable) -> Result<(), CompileFault> {
    for name in LIBRARY_PRIMITIVES {
        let used = source.contains(&format!("{name}("))
            || source.contains(&format!("{name}."))
            || source.contains(&format!("<{name}"));
        if used && !bindings.is_library(name) {
            return Err(CompileFault::Unbound(name.to_string()));
        }
    }
    Ok(())
}

fn collect_components(source: &str) -> Result<BTreeMap<String, Option<Node>>, CompileFault> {
    let pattern = TOP_LEVEL_DEFINITION
        .as_ref()
        .ok_or_else(|| CompileFault::Syntax("definition pattern unavailable".to_string()))?;

    let heads: Vec<(String, usize, usize)> = pattern
        .captures_iter(source)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let name = caps.get(1)?.as_str().to_string();
            Some((name, whole.start(), whole.end()))
        })
        .collect();

    let mut components = BTreeMap::new();
    for (index, (name, _, body_start)) in heads.iter().enumerate() {
        if !is_component_name(name) {
            continue;
        }
        let mut body_end = heads.get(index + 1).map(|h| h.1).unwrap_or(source.len());
        if let Some(offset) = render_call_offset(&source[*body_start..body_end]) {
            body_end = body_start + offset;
        }

        let markup = match find_markup_start(&source[*body_start..body_end]) {
            Some(offset) => {
                let (node, _) = parse_element(source, body_start + offset)
                    .map_err(|e| CompileFault::Syntax(format!("in {name}: {e}")))?;
                Some(node)
            }
            None => None,
        };
        components.insert(name.clone(), markup);
    }
    Ok(components)
}

/// Offset of a line starting with `render(` within `segment`.
fn render_call_offset(segment: &str) -> Option<usize> {
    let mut offset = 0usize;
    for line in segment.split_inclusive('\n') {
        if line.trim_start().starts_with("render(") {
            return Some(offset);
        }
        offset += line.len();
    }
    None
}

/// Offset of the first `<` that opens markup in expression position,
/// skipping string literals and comments.
fn find_markup_start(segment: &str) -> Option<usize> {
    let b = segment.as_bytes();
    let mut p = 0usize;
    while p < b.len() {
        match b[p] {
            quote @ (b'"' | b'\'' | b'`') => {
                p += 1;
                while p < b.len() && b[p] != quote {
                    if b[p] == b'\\' {
                        p += 1;
                    }
                    p += 1;
                }
            }
            b'/' if b.get(p + 1) == Some(&b'/') => {
                while p < b.len() && b[p] != b'\n' {
                    p += 1;
                }
            }
            b'/' if b.get(p + 1) == Some(&b'*') => match segment[p + 2..].find("*/") {
                Some(close) => p += 2 + close + 1,
                None => return None,
            },
            b'<' => {
                let opens = b
                    .get(p + 1)
                    .is_some_and(|n| n.is_ascii_alphabetic() || *n == b'>');
                if opens && in_expression_position(&segment[..p]) {
                    return Some(p);
                }
            }
            _ => {}
        }
        p += 1;
    }
    None
}

fn in_expression_position(before: &str) -> bool {
    let before = before.trim_end();
    before.is_empty()
        || before.ends_with("return")
        || before.ends_with(['(', '=', '>', '?', ':', ',', '&', '|', '[', '{'])
}

fn is_fragment(name: &str) -> bool {
    name.is_empty() || name == "Fragment" || name == "React.Fragment"
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

struct MountedComponent {
    program: Arc<Program>,
    bindings: BindingTable,
    max_depth: usize,
}

impl Renderable for MountedComponent {
    fn render(&self) -> Result<String, RenderFault> {
        let mut out = String::new();
        self.render_node(&self.program.entry, 0, &mut out)?;
        Ok(out)
    }
}

impl MountedComponent {
    fn render_node(&self, node: &Node, depth: usize, out: &mut String) -> Result<(), RenderFault> {
        if depth > self.max_depth {
            return Err(RenderFault::DepthExceeded(self.max_depth));
        }

        match node {
            Node::Text(text) => out.push_str(&escape_html(text)),
            Node::Comment(_) => {}
            Node::Expr(expr) => {
                if let Some(value) = literal_value(expr) {
                    out.push_str(&escape_html(&value));
                }
            }
            Node::Element {
                name,
                attrs,
                children,
            } => {
                if is_fragment(name) {
                    self.render_children(children, depth, out)?;
                } else if let Some(definition) = self.program.components.get(name) {
                    if let Some(body) = definition {
                        self.render_node(body, depth + 1, out)?;
                    }
                } else if let Some(primitive) = self.bindings.get(name) {
                    let mut inner = String::new();
                    self.render_children(children, depth, &mut inner)?;
                    let html = primitive(&html_props(attrs), &inner).map_err(|e| {
                        RenderFault::Primitive {
                            name: name.clone(),
                            message: e.to_string(),
                        }
                    })?;
                    out.push_str(&html);
                } else if is_component_name(name) {
                    return Err(RenderFault::Component(format!("<{name}> is not in scope")));
                } else {
                    out.push('<');
                    out.push_str(name);
                    out.push_str(&html_attrs(&html_props(attrs)));
                    out.push('>');
                    if !is_void_element(name) {
                        self.render_children(children, depth, out)?;
                        out.push_str("</");
                        out.push_str(name);
                        out.push('>');
                    }
                }
            }
        }
        Ok(())
    }

    fn render_children(
        &self,
        children: &[Node],
        depth: usize,
        out: &mut String,
    ) -> Result<(), RenderFault> {
        for child in children {
            self.render_node(child, depth + 1, out)?;
        }
        Ok(())
    }
}

/// Component attributes to HTML attributes. Event handlers, `key`, `ref`,
/// and non-literal expressions are dropped.
fn html_props(attrs: &[Attr]) -> Props {
    let mut props = Props::new();
    for attr in attrs {
        let name = match attr.name.as_str() {
            "className" => "class",
            "htmlFor" => "for",
            "key" | "ref" => continue,
            other if is_event_handler(other) => continue,
            other => other,
        };
        let value = match &attr.value {
            AttrValue::Bare => String::new(),
            AttrValue::Quoted(value) => value.clone(),
            AttrValue::Expr(expr) if name == "style" => {
                let css = object_to_css(expr);
                if css.is_empty() {
                    continue;
                }
                css
            }
            AttrValue::Expr(expr) => match expr.trim() {
                "true" => String::new(),
                _ => match literal_value(expr) {
                    Some(value) => value,
                    None => continue,
                },
            },
        };
        props.insert(name.to_string(), value);
    }
    props
}

fn is_event_handler(name: &str) -> bool {
    name.strip_prefix("on")
        .and_then(|rest| rest.chars().next())
        .is_some_and(|c| c.is_ascii_uppercase())
}

/// Value of a string or number literal expression.
fn literal_value(expr: &str) -> Option<String> {
    let expr = expr.trim();
    if expr.starts_with("/*") && expr.ends_with("*/") {
        return None;
    }
    let first = expr.chars().next()?;
    if matches!(first, '\'' | '"' | '`') && expr.len() >= 2 && expr.ends_with(first) {
        let inner = &expr[1..expr.len() - 1];
        if first == '`' && inner.contains("${") {
            return None;
        }
        let unescaped = inner
            .replace(&format!("\\{first}"), &first.to_string())
            .replace("\\\\", "\\");
        return Some(unescaped);
    }
    expr.parse::<f64>().ok().map(|_| expr.to_string())
}
