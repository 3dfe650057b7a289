//! Live preview execution with contained faults.
//!
//! # Architecture
//!
//! ```text
//! NormalizedArtifact
//!     |
//!     v  Framework::execution()
//!     +── IsolatedDocument ──> SandboxDocument (srcdoc, allow-scripts, CSP, style shim)
//!     +── ReadOnly         ──> source shown as text
//!     +── Evaluated
//!           |
//!           v  layer 1: Evaluator::compile(artifact, &BindingTable)
//!           |     Err ──> compile_error channel (mounted result stays)
//!           v
//!         Box<dyn Renderable> (mounted)
//!           |
//!           v  layer 2: FaultBoundary::guard
//!                 Err/panic ──> render_error channel + last good render or fallback
//! ```
//!
//! The layers are independent: a render fault leaves the mounted result in
//! place but never stops the next artifact from being compiled.

pub mod bindings;
pub mod boundary;
pub mod evaluator;
pub mod html;
pub mod markup_eval;

use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::panic::AssertUnwindSafe;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::SandboxConfig;
use crate::framework::{ExecutionStrategy, Framework};
use crate::normalize::{NormalizedArtifact, panic_message};

pub use bindings::{BindingTable, LIBRARY_PRIMITIVES, Primitive, Props};
pub use boundary::{BoundaryOutcome, FaultBoundary, fallback_panel};
pub use evaluator::{Evaluator, Renderable};
pub use html::{SANDBOX_POLICY, SandboxDocument, StyleShim};
pub use markup_eval::MarkupEvaluator;

// ---------------------------------------------------------------------------
// Faults
// ---------------------------------------------------------------------------

/// Layer 1: the source could not be compiled.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileFault {
    #[error("module resolution is not available in the preview: `{0}`")]
    ModuleResolution(String),

    #[error("syntax error: {0}")]
    Syntax(String),

    #[error("<{0}> is neither defined in the source nor bound")]
    UnknownComponent(String),

    #[error("`{0}` is not in the binding table")]
    Unbound(String),

    #[error("artifact has no entry expression")]
    MissingEntry,

    #[error("{0} artifacts are not executable")]
    NotExecutable(Framework),

    #[error("evaluator panicked: {0}")]
    Panicked(String),

    #[error("sandbox context has been released")]
    Released,
}

/// Layer 2: the mounted result failed while rendering.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenderFault {
    #[error("component error: {0}")]
    Component(String),

    #[error("<{name}> failed: {message}")]
    Primitive { name: String, message: String },

    #[error("render depth limit of {0} exceeded")]
    DepthExceeded(usize),

    #[error("render panicked: {0}")]
    Panicked(String),
}

// ---------------------------------------------------------------------------
// Surface
// ---------------------------------------------------------------------------

/// What the preview surface currently shows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "content", rename_all = "snake_case")]
pub enum PreviewDisplay {
    #[default]
    Empty,
    /// An isolated document (`srcdoc`).
    Document(String),
    /// Rendered component markup.
    Rendered(String),
    /// Fallback panel after a render fault with nothing good to keep.
    Fallback(String),
    /// Source shown read-only.
    ReadOnly(String),
}

/// The preview surface plus its two error channels.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreviewSurface {
    pub display: PreviewDisplay,
    pub compile_error: Option<String>,
    pub render_error: Option<String>,
}

/// Result of executing one artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionOutcome {
    /// Nothing to execute ("no preview").
    Void,
    Rendered,
    ReadOnly,
    CompileFailed(CompileFault),
    RenderFailed(RenderFault),
}

impl ExecutionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Rendered | Self::ReadOnly)
    }
}

// ---------------------------------------------------------------------------
// Sandbox
// ---------------------------------------------------------------------------

/// Per-session execution context. Never shared between sessions.
pub struct PreviewSandbox {
    bindings: BindingTable,
    evaluator: Box<dyn Evaluator>,
    shim: StyleShim,
    boundary: FaultBoundary,
    mounted: Option<Box<dyn Renderable>>,
    surface: PreviewSurface,
    released: bool,
}

impl PreviewSandbox {
    pub fn new(config: &SandboxConfig) -> Self {
        Self {
            bindings: BindingTable::standard(config),
            evaluator: Box::new(MarkupEvaluator::new(config.max_render_depth)),
            shim: StyleShim::default().with_extra(config.extra_shim_classes.clone()),
            boundary: FaultBoundary::new(),
            mounted: None,
            surface: PreviewSurface::default(),
            released: false,
        }
    }

    /// Replace the component evaluator.
    pub fn with_evaluator(mut self, evaluator: Box<dyn Evaluator>) -> Self {
        self.evaluator = evaluator;
        self
    }

    pub fn bindings(&self) -> &BindingTable {
        &self.bindings
    }

    pub fn bindings_mut(&mut self) -> &mut BindingTable {
        &mut self.bindings
    }

    pub fn surface(&self) -> &PreviewSurface {
        &self.surface
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted.is_some()
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Execute an artifact and update the surface.
    ///
    /// Never panics and never returns an error: every fault ends up on one
    /// of the surface's channels and in the returned outcome.
    pub async fn execute(&mut self, artifact: &NormalizedArtifact) -> ExecutionOutcome {
        if self.released {
            return self.compile_failed(CompileFault::Released);
        }
        if artifact.is_void() {
            debug!(framework = %artifact.target_framework, "no preview for void artifact");
            return ExecutionOutcome::Void;
        }

        match artifact.target_framework.execution() {
            ExecutionStrategy::IsolatedDocument => {
                let document = SandboxDocument::build(&artifact.source, &self.shim);
                self.surface = PreviewSurface {
                    display: PreviewDisplay::Document(document.srcdoc),
                    ..PreviewSurface::default()
                };
                ExecutionOutcome::Rendered
            }
            ExecutionStrategy::ReadOnly => {
                self.surface = PreviewSurface {
                    display: PreviewDisplay::ReadOnly(artifact.source.clone()),
                    ..PreviewSurface::default()
                };
                ExecutionOutcome::ReadOnly
            }
            ExecutionStrategy::Evaluated => {
                let compiled = AssertUnwindSafe(self.evaluator.compile(artifact, &self.bindings))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|payload| {
                        Err(CompileFault::Panicked(panic_message(&*payload)))
                    });
                match compiled {
                    Ok(renderable) => {
                        self.surface.compile_error = None;
                        self.mounted = Some(renderable);
                        self.render_mounted()
                    }
                    Err(fault) => self.compile_failed(fault),
                }
            }
        }
    }

    /// Render the mounted result again (an update after mount).
    pub fn rerender(&mut self) -> Option<ExecutionOutcome> {
        if self.released || self.mounted.is_none() {
            return None;
        }
        Some(self.render_mounted())
    }

    /// Release the execution context. Later executions fail with
    /// [`CompileFault::Released`].
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.mounted = None;
        self.boundary.reset();
        info!(evaluator = self.evaluator.name(), "released sandbox context");
    }

    fn render_mounted(&mut self) -> ExecutionOutcome {
        let Some(mounted) = self.mounted.as_deref() else {
            return ExecutionOutcome::Void;
        };
        match self.boundary.guard(mounted) {
            BoundaryOutcome::Rendered(html) => {
                self.surface.display = PreviewDisplay::Rendered(html);
                self.surface.render_error = None;
                ExecutionOutcome::Rendered
            }
            BoundaryOutcome::Contained {
                fault,
                display,
                kept_last_good,
            } => {
                self.surface.display = if kept_last_good {
                    PreviewDisplay::Rendered(display)
                } else {
                    PreviewDisplay::Fallback(display)
                };
                self.surface.render_error = Some(fault.to_string());
                ExecutionOutcome::RenderFailed(fault)
            }
        }
    }

    fn compile_failed(&mut self, fault: CompileFault) -> ExecutionOutcome {
        warn!(error = %fault, "compile fault; preview not updated");
        self.surface.compile_error = Some(fault.to_string());
        ExecutionOutcome::CompileFailed(fault)
    }
}

impl std::fmt::Debug for PreviewSandbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreviewSandbox")
            .field("evaluator", &self.evaluator.name())
            .field("bindings", &self.bindings)
            .field("mounted", &self.mounted.is_some())
            .field("surface", &self.surface)
            .field("released", &self.released)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::CodeNormalizer;

    fn artifact(buffer: &str, framework: Framework) -> NormalizedArtifact {
        CodeNormalizer::default().normalize(buffer, framework)
    }

    #[tokio::test]
    async fn html_goes_into_an_isolated_document() {
        let mut sandbox = PreviewSandbox::new(&SandboxConfig::default());
        let outcome = sandbox
            .execute(&artifact("<p class=\"p-4\">x</p>", Framework::Html))
            .await;
        assert_eq!(outcome, ExecutionOutcome::Rendered);
        let PreviewDisplay::Document(srcdoc) = &sandbox.surface().display else {
            panic!("expected document");
        };
        assert!(srcdoc.contains("<p class=\"p-4\">x</p>"));
    }

    #[tokio::test]
    async fn vue_is_read_only() {
        let mut sandbox = PreviewSandbox::new(&SandboxConfig::default());
        let outcome = sandbox
            .execute(&artifact("<template><p/></template>", Framework::VueLike))
            .await;
        assert_eq!(outcome, ExecutionOutcome::ReadOnly);
        assert!(!sandbox.is_mounted());
    }

    #[tokio::test]
    async fn compile_fault_keeps_previous_render() {
        let mut sandbox = PreviewSandbox::new(&SandboxConfig::default());
        sandbox
            .execute(&artifact("<p>first</p>", Framework::ReactLike))
            .await;
        let outcome = sandbox
            .execute(&artifact("const A = () => <Missing />;", Framework::ReactLike))
            .await;
        assert!(matches!(outcome, ExecutionOutcome::CompileFailed(_)));
        assert_eq!(
            sandbox.surface().display,
            PreviewDisplay::Rendered("<p>first</p>".into())
        );
        assert!(sandbox.surface().compile_error.as_deref().unwrap().contains("Missing"));

        // A later good artifact clears the compile channel.
        sandbox
            .execute(&artifact("<p>second</p>", Framework::ReactLike))
            .await;
        assert_eq!(sandbox.surface().compile_error, None);
        assert_eq!(
            sandbox.surface().display,
            PreviewDisplay::Rendered("<p>second</p>".into())
        );
    }

    #[tokio::test]
    async fn void_artifact_is_no_preview() {
        let mut sandbox = PreviewSandbox::new(&SandboxConfig::default());
        assert_eq!(
            sandbox.execute(&artifact("", Framework::ReactLike)).await,
            ExecutionOutcome::Void
        );
        assert_eq!(sandbox.surface(), &PreviewSurface::default());
    }

    #[tokio::test]
    async fn released_sandbox_refuses_work() {
        let mut sandbox = PreviewSandbox::new(&SandboxConfig::default());
        sandbox
            .execute(&artifact("<p>x</p>", Framework::ReactLike))
            .await;
        sandbox.release();
        assert!(sandbox.is_released());
        assert!(!sandbox.is_mounted());
        assert_eq!(sandbox.rerender(), None);
        assert_eq!(
            sandbox.execute(&artifact("<p>y</p>", Framework::ReactLike)).await,
            ExecutionOutcome::CompileFailed(CompileFault::Released)
        );
    }
}
