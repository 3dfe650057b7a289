//! Buffer normalization into executable source per target framework.
//!
//! # Architecture
//!
//! ```text
//! buffer ──> Framework::normalization()
//!              |
//!              +── Markup       fences + comment syntax only
//!              +── Passthrough  raw buffer, not executable
//!              +── Component
//!                    |
//!                    +── complete definition? ──> body + render(<Name />)
//!                    |
//!                    +── fragment pipeline (each step may fail alone):
//!                          fences > preamble > tokenize > comments >
//!                          attributes > styles > whitespace > balance >
//!                          self-closing > wrap in synthetic component
//! ```
//!
//! A step that fails hands its input to the next step unchanged and leaves
//! a [`Degradation`] on the artifact. Normalization itself never fails.

pub mod definition;
pub mod steps;
pub mod style;

use std::ops::Range;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::{DEFAULT_COMPONENT_NAME, NormalizerConfig};
use crate::framework::{Framework, NormalizationStrategy};
use crate::markup::{Token, is_component_name, serialize};

pub use definition::{Definition, detect as detect_definition};
pub use steps::strip_fences;
pub use style::{css_to_object, object_to_css};

static JSX_COMMENT: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?s)\{\s*/\*(.*?)\*/\s*\}").ok());

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// How an artifact's source was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactOrigin {
    /// No usable structural content; `source` is empty.
    Void,
    /// Markup for an isolated document.
    Document,
    /// An existing component definition plus a render invocation.
    Definition,
    /// A raw fragment wrapped in the synthetic component.
    Fragment,
    /// Raw buffer, presented read-only.
    Passthrough,
}

/// A sub-step that failed in isolation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Degradation {
    pub step: String,
    pub reason: String,
}

impl Degradation {
    pub fn new(step: &str, reason: impl Into<String>) -> Self {
        Self {
            step: step.to_string(),
            reason: reason.into(),
        }
    }
}

/// Normalized source for one target framework.
///
/// Derived from the whole buffer every time; never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedArtifact {
    pub target_framework: Framework,
    pub source: String,
    /// Expression that evaluates to the renderable value (empty for
    /// documents and read-only source).
    pub entry_expression: String,
    pub executable: bool,
    pub origin: ArtifactOrigin,
    pub degradations: Vec<Degradation>,
}

impl NormalizedArtifact {
    pub fn void(target_framework: Framework) -> Self {
        Self {
            target_framework,
            source: String::new(),
            entry_expression: String::new(),
            executable: false,
            origin: ArtifactOrigin::Void,
            degradations: Vec::new(),
        }
    }

    pub fn is_void(&self) -> bool {
        self.source.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StepError {
    #[error("step {step} expected {expected} input")]
    UnexpectedStage {
        step: &'static str,
        expected: &'static str,
    },

    #[error("rename target {to:?} for attribute {from:?} is not a valid attribute name")]
    InvalidRename { from: String, to: String },

    #[error("no valid declarations in style {0:?}")]
    MalformedStyle(String),

    #[error("step panicked: {0}")]
    Panicked(String),
}

/// Intermediate value passed between steps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stage {
    Text(String),
    Markup(Vec<Token>),
}

/// One ordered, individually failable transformation.
pub trait NormalizeStep: Send + Sync {
    fn name(&self) -> &'static str;

    /// Transform `stage`. Non-fatal problems go into `degradations`; an
    /// `Err` makes the pipeline keep this step's input.
    fn apply(&self, stage: Stage, degradations: &mut Vec<Degradation>) -> Result<Stage, StepError>;
}

// ---------------------------------------------------------------------------
// Normalizer
// ---------------------------------------------------------------------------

pub struct CodeNormalizer {
    component_name: String,
    pipeline: Vec<Box<dyn NormalizeStep>>,
}

impl std::fmt::Debug for CodeNormalizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodeNormalizer")
            .field("component_name", &self.component_name)
            .field(
                "pipeline",
                &self.pipeline.iter().map(|s| s.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl Default for CodeNormalizer {
    fn default() -> Self {
        Self::new(NormalizerConfig::default())
    }
}

impl CodeNormalizer {
    pub fn new(config: NormalizerConfig) -> Self {
        let component_name = if is_identifier(&config.component_name)
            && is_component_name(&config.component_name)
        {
            config.component_name
        } else {
            warn!(
                name = %config.component_name,
                "invalid synthetic component name, using default"
            );
            DEFAULT_COMPONENT_NAME.to_string()
        };

        let pipeline: Vec<Box<dyn NormalizeStep>> = vec![
            Box::new(steps::StripFences),
            Box::new(steps::DropPreamble),
            Box::new(steps::Tokenize),
            Box::new(steps::RewriteComments),
            Box::new(steps::RenameAttributes::new(config.attribute_renames)),
            Box::new(steps::ConvertStyles),
            Box::new(steps::NormalizeWhitespace),
            Box::new(steps::BalanceTags),
            Box::new(steps::SelfClose),
        ];

        Self {
            component_name,
            pipeline,
        }
    }

    pub fn component_name(&self) -> &str {
        &self.component_name
    }

    /// Normalize the whole current buffer for `framework`.
    ///
    /// Pure with respect to its inputs, so running it on every progress
    /// event of a growing buffer is safe.
    pub fn normalize(&self, buffer: &str, framework: Framework) -> NormalizedArtifact {
        if buffer.trim().is_empty() {
            return NormalizedArtifact::void(framework);
        }

        let artifact = match framework.normalization() {
            NormalizationStrategy::Markup => self.normalize_document(buffer, framework),
            NormalizationStrategy::Component => self.normalize_component(buffer, framework),
            NormalizationStrategy::Passthrough => NormalizedArtifact {
                target_framework: framework,
                source: buffer.to_string(),
                entry_expression: String::new(),
                executable: false,
                origin: ArtifactOrigin::Passthrough,
                degradations: Vec::new(),
            },
        };

        debug!(
            framework = %framework,
            origin = ?artifact.origin,
            bytes = artifact.source.len(),
            degraded = artifact.degradations.len(),
            "normalized buffer"
        );
        artifact
    }

    fn normalize_document(&self, buffer: &str, framework: Framework) -> NormalizedArtifact {
        let body = strip_fences(buffer);
        let mut degradations = Vec::new();
        let body = match JSX_COMMENT.as_ref() {
            Some(pattern) => rewrite_document_comments(body, pattern),
            None => {
                degradations.push(Degradation::new("comments", "comment pattern unavailable"));
                body.to_string()
            }
        };

        let source = body.trim();
        if source.is_empty() {
            return NormalizedArtifact::void(framework);
        }

        NormalizedArtifact {
            target_framework: framework,
            source: source.to_string(),
            entry_expression: String::new(),
            executable: true,
            origin: ArtifactOrigin::Document,
            degradations,
        }
    }

    fn normalize_component(&self, buffer: &str, framework: Framework) -> NormalizedArtifact {
        if let Some(definition) = detect_definition(strip_fences(buffer)) {
            debug!(component = %definition.name, "found complete component definition");
            let entry_expression = format!("<{} />", definition.name);
            let source = if definition.renders_itself {
                definition.body
            } else {
                format!("{}\n\nrender({entry_expression});", definition.body)
            };
            return NormalizedArtifact {
                target_framework: framework,
                source,
                entry_expression,
                executable: true,
                origin: ArtifactOrigin::Definition,
                degradations: Vec::new(),
            };
        }

        let (stage, degradations) = self.run_pipeline(Stage::Text(buffer.to_string()));
        let tokens = match stage {
            Stage::Markup(tokens) => tokens,
            Stage::Text(text) => crate::markup::tokenize(&text),
        };
        if !tokens.iter().any(|t| matches!(t, Token::Open(_))) {
            return NormalizedArtifact {
                degradations,
                ..NormalizedArtifact::void(framework)
            };
        }

        let (source, entry_expression) = wrap_component(&self.component_name, &tokens);
        NormalizedArtifact {
            target_framework: framework,
            source,
            entry_expression,
            executable: true,
            origin: ArtifactOrigin::Fragment,
            degradations,
        }
    }

    fn run_pipeline(&self, input: Stage) -> (Stage, Vec<Degradation>) {
        let mut stage = input;
        let mut degradations = Vec::new();

        for step in &self.pipeline {
            let mut local = Vec::new();
            let result = catch_unwind(AssertUnwindSafe(|| step.apply(stage.clone(), &mut local)))
                .unwrap_or_else(|payload| Err(StepError::Panicked(panic_message(&*payload))));
            match result {
                Ok(next) => {
                    degradations.append(&mut local);
                    stage = next;
                }
                Err(e) => {
                    warn!(step = step.name(), error = %e, "normalization step degraded; input kept");
                    degradations.push(Degradation::new(step.name(), e.to_string()));
                }
            }
        }

        (stage, degradations)
    }
}

/// (h) Wrap markup in the synthetic component and invoke it.
/// `{/* x */}` to `<!-- x -->`, leaving `<script>` and `<style>` bodies alone.
fn rewrite_document_comments(body: &str, pattern: &Regex) -> String {
    let mut out = String::with_capacity(body.len());
    let mut pos = 0;
    for raw in raw_text_ranges(body) {
        out.push_str(&pattern.replace_all(&body[pos..raw.start], "<!--$1-->"));
        out.push_str(&body[raw.clone()]);
        pos = raw.end;
    }
    out.push_str(&pattern.replace_all(&body[pos..], "<!--$1-->"));
    out
}

/// Byte ranges of raw-text element bodies, in order. An element still being
/// streamed runs to the end of the input.
fn raw_text_ranges(body: &str) -> Vec<Range<usize>> {
    let lower = body.to_ascii_lowercase();
    let mut ranges = Vec::new();
    let mut pos = 0;
    while let Some((open, name)) = next_raw_text_open(&lower, pos) {
        let Some(gt) = lower[open..].find('>') else {
            ranges.push(open..lower.len());
            break;
        };
        let start = open + gt + 1;
        let end = lower[start..]
            .find(&format!("</{name}"))
            .map_or(lower.len(), |offset| start + offset);
        ranges.push(start..end);
        pos = end;
    }
    ranges
}

fn next_raw_text_open(lower: &str, from: usize) -> Option<(usize, &'static str)> {
    ["script", "style"]
        .into_iter()
        .filter_map(|name| {
            let needle = format!("<{name}");
            lower[from..]
                .match_indices(&needle)
                .map(|(i, _)| from + i)
                .find(|&at| {
                    lower[at + needle.len()..]
                        .chars()
                        .next()
                        .is_none_or(|c| c.is_ascii_whitespace() || matches!(c, '>' | '/'))
                })
                .map(|at| (at, name))
        })
        .min_by_key(|(at, _)| *at)
}

fn wrap_component(name: &str, tokens: &[Token]) -> (String, String) {
    let markup = if has_single_root_element(tokens) {
        serialize(tokens)
    } else {
        format!("<>{}</>", serialize(tokens))
    };
    let entry = format!("<{name} />");
    let source = format!("const {name} = () => (\n  {markup}\n);\n\nrender({entry});");
    (source, entry)
}

fn has_single_root_element(tokens: &[Token]) -> bool {
    let mut depth = 0usize;
    let mut roots = 0usize;
    let mut first_is_element = false;

    for token in tokens {
        if depth == 0 {
            let counts = match token {
                Token::Text(text) => !text.trim().is_empty(),
                Token::Close(_) => false,
                _ => true,
            };
            if counts {
                if roots == 0 {
                    first_is_element = matches!(token, Token::Open(tag) if !tag.name.is_empty());
                }
                roots += 1;
            }
        }
        match token {
            Token::Open(tag) if !tag.self_closing => depth += 1,
            Token::Close(_) => depth = depth.saturating_sub(1),
            _ => {}
        }
    }

    roots == 1 && first_is_element
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_' || c == '$')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
