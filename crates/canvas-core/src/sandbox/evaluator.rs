//! The `Evaluator` trait -- the seam where component source is compiled.
//!
//! Framework compilers are external capabilities. The sandbox only ever
//! talks to them through this trait, hands them an explicit
//! [`BindingTable`], and contains whatever they do.

use async_trait::async_trait;

use super::bindings::BindingTable;
use super::{CompileFault, RenderFault};
use crate::normalize::NormalizedArtifact;

/// Compiles normalized component source into something renderable.
///
/// # Object Safety
///
/// This trait is object-safe so the sandbox can hold `Box<dyn Evaluator>`
/// and swap the built-in evaluator for an external one.
#[async_trait]
pub trait Evaluator: Send + Sync {
    /// Human-readable name (e.g. "markup").
    fn name(&self) -> &str;

    /// Compile `artifact` against `bindings`.
    ///
    /// Any name not resolvable through `bindings`, and any attempt at module
    /// resolution, must be reported as a [`CompileFault`].
    async fn compile(
        &self,
        artifact: &NormalizedArtifact,
        bindings: &BindingTable,
    ) -> Result<Box<dyn Renderable>, CompileFault>;
}

/// A mounted, compiled component.
pub trait Renderable: Send + Sync {
    /// Render the current output. May fail (or panic); the sandbox's fault
    /// boundary contains both.
    fn render(&self) -> Result<String, RenderFault>;
}

// Compile-time assertion: both traits must be usable as trait objects.
const _: () = {
    fn _assert_object_safe(_: &dyn Evaluator, _: &dyn Renderable) {}
};
