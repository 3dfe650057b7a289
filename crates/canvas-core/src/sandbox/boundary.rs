//! Render-time fault boundary.

use std::panic::{AssertUnwindSafe, catch_unwind};

use tracing::warn;

use super::bindings::escape_html;
use super::evaluator::Renderable;
use super::RenderFault;
use crate::normalize::panic_message;

/// Result of rendering through the boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoundaryOutcome {
    Rendered(String),
    /// The render failed; `display` is the last good render if there was
    /// one, otherwise a fallback panel.
    Contained {
        fault: RenderFault,
        display: String,
        kept_last_good: bool,
    },
}

/// Catches errors and panics raised while a mounted result renders.
#[derive(Debug, Default)]
pub struct FaultBoundary {
    last_good: Option<String>,
}

impl FaultBoundary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_good(&self) -> Option<&str> {
        self.last_good.as_deref()
    }

    /// Render `renderable`, never letting a fault escape.
    pub fn guard(&mut self, renderable: &dyn Renderable) -> BoundaryOutcome {
        let result = catch_unwind(AssertUnwindSafe(|| renderable.render()))
            .unwrap_or_else(|payload| Err(RenderFault::Panicked(panic_message(&*payload))));

        match result {
            Ok(html) => {
                self.last_good = Some(html.clone());
                BoundaryOutcome::Rendered(html)
            }
            Err(fault) => {
                warn!(error = %fault, "render fault contained by boundary");
                match &self.last_good {
                    Some(last) => BoundaryOutcome::Contained {
                        display: last.clone(),
                        fault,
                        kept_last_good: true,
                    },
                    None => BoundaryOutcome::Contained {
                        display: fallback_panel(&fault),
                        fault,
                        kept_last_good: false,
                    },
                }
            }
        }
    }

    /// Forget the last good render.
    pub fn reset(&mut self) {
        self.last_good = None;
    }
}

/// The panel shown when a render fails and nothing good is on screen.
pub fn fallback_panel(fault: &RenderFault) -> String {
    format!(
        "<div class=\"canvas-fallback\" role=\"alert\">Preview failed to render: {}</div>",
        escape_html(&fault.to_string())
    )
}
