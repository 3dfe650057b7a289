//! Fault containment in the preview sandbox: nothing generated code does
//! may escape past the sandbox or stop the session.

use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use canvas_core::config::SandboxConfig;
use canvas_core::framework::Framework;
use canvas_core::normalize::{CodeNormalizer, NormalizedArtifact};
use canvas_core::sandbox::{
    BindingTable, CompileFault, Evaluator, ExecutionOutcome, PreviewDisplay, PreviewSandbox,
    Props, RenderFault, Renderable,
};
use canvas_core::session::{GenerationSession, SessionState, SessionStatus};
use canvas_core::SessionConfig;
use canvas_test_utils::frames;

fn artifact(buffer: &str) -> NormalizedArtifact {
    CodeNormalizer::default().normalize(buffer, Framework::ReactLike)
}

fn sandbox_with_primitive(
    name: &str,
    primitive: impl Fn(&Props, &str) -> Result<String, RenderFault> + Send + Sync + 'static,
) -> PreviewSandbox {
    let mut sandbox = PreviewSandbox::new(&SandboxConfig::default());
    sandbox.bindings_mut().register(name, Arc::new(primitive));
    sandbox
}

// ---------------------------------------------------------------------------
// Render-time faults
// ---------------------------------------------------------------------------

#[tokio::test]
async fn panicking_component_is_caught_by_the_boundary() {
    let mut sandbox = sandbox_with_primitive("Boom", |_: &Props, _: &str| {
        panic!("kaboom");
    });

    let outcome = sandbox.execute(&artifact("<Boom />")).await;
    assert_eq!(
        outcome,
        ExecutionOutcome::RenderFailed(RenderFault::Panicked("kaboom".into()))
    );

    let surface = sandbox.surface();
    assert!(surface.render_error.as_deref().unwrap().contains("kaboom"));
    let PreviewDisplay::Fallback(panel) = &surface.display else {
        panic!("expected fallback panel, got {:?}", surface.display);
    };
    assert!(panel.contains("canvas-fallback"));
}

#[tokio::test]
async fn render_fault_keeps_last_good_render() {
    let mut sandbox = sandbox_with_primitive("Flaky", |_: &Props, children: &str| {
        if children.contains("bad") {
            Err(RenderFault::Component("cannot show that".into()))
        } else {
            Ok(format!("<em>{children}</em>"))
        }
    });

    assert_eq!(
        sandbox.execute(&artifact("<Flaky>good</Flaky>")).await,
        ExecutionOutcome::Rendered
    );
    let outcome = sandbox.execute(&artifact("<Flaky>bad</Flaky>")).await;
    let ExecutionOutcome::RenderFailed(RenderFault::Primitive { name, message }) = outcome else {
        panic!("expected a primitive fault");
    };
    assert_eq!(name, "Flaky");
    assert!(message.contains("cannot show that"));

    assert_eq!(
        sandbox.surface().display,
        PreviewDisplay::Rendered("<em>good</em>".into())
    );
    assert!(sandbox.surface().render_error.is_some());
    assert!(sandbox.is_mounted());
}

#[tokio::test]
async fn render_fault_never_blocks_the_next_compile() {
    let mut sandbox = PreviewSandbox::new(&SandboxConfig::default());

    let outcome = sandbox
        .execute(&artifact("const Loop = () => <div><Loop /></div>;"))
        .await;
    assert_eq!(
        outcome,
        ExecutionOutcome::RenderFailed(RenderFault::DepthExceeded(64))
    );

    let outcome = sandbox.execute(&artifact("<p>recovered</p>")).await;
    assert_eq!(outcome, ExecutionOutcome::Rendered);
    assert_eq!(sandbox.surface().render_error, None);
    assert_eq!(
        sandbox.surface().display,
        PreviewDisplay::Rendered("<p>recovered</p>".into())
    );
}

#[tokio::test]
async fn rerender_goes_through_the_boundary_again() {
    let mut sandbox = sandbox_with_primitive("Boom", |_: &Props, _: &str| {
        panic!("again");
    });
    sandbox.execute(&artifact("<Boom />")).await;
    assert!(matches!(
        sandbox.rerender(),
        Some(ExecutionOutcome::RenderFailed(RenderFault::Panicked(_)))
    ));
}

// ---------------------------------------------------------------------------
// Compile-time faults
// ---------------------------------------------------------------------------

#[tokio::test]
async fn module_resolution_is_a_compile_fault() {
    let mut sandbox = PreviewSandbox::new(&SandboxConfig::default());
    let source = "const App = () => {\n  const x = require('fs');\n  return <p/>;\n};";
    let outcome = sandbox.execute(&artifact(source)).await;
    assert!(matches!(
        outcome,
        ExecutionOutcome::CompileFailed(CompileFault::ModuleResolution(_))
    ));
    assert!(!sandbox.is_mounted());
    assert_eq!(sandbox.surface().display, PreviewDisplay::Empty);
}

struct PanickyEvaluator;

#[async_trait]
impl Evaluator for PanickyEvaluator {
    fn name(&self) -> &str {
        "panicky"
    }

    async fn compile(
        &self,
        _artifact: &NormalizedArtifact,
        _bindings: &BindingTable,
    ) -> Result<Box<dyn Renderable>, CompileFault> {
        panic!("compiler crashed");
    }
}

#[tokio::test]
async fn panicking_evaluator_is_a_compile_fault() {
    let mut sandbox =
        PreviewSandbox::new(&SandboxConfig::default()).with_evaluator(Box::new(PanickyEvaluator));
    let outcome = sandbox.execute(&artifact("<p>x</p>")).await;
    assert_eq!(
        outcome,
        ExecutionOutcome::CompileFailed(CompileFault::Panicked("compiler crashed".into()))
    );
}

// ---------------------------------------------------------------------------
// Through a whole session
// ---------------------------------------------------------------------------

#[tokio::test]
async fn session_survives_a_crashing_evaluator() {
    let config = SessionConfig::for_framework(Framework::ReactLike);
    let sandbox =
        PreviewSandbox::new(&config.sandbox).with_evaluator(Box::new(PanickyEvaluator));
    let (tx, rx) = mpsc::channel(16);

    let terminal = GenerationSession::new(config)
        .with_sandbox(sandbox)
        .run(frames(&["CODE:<p>a</p>", "<p>b</p>"]), CancellationToken::new(), tx)
        .await;

    assert_eq!(terminal.status, SessionStatus::Complete);
    assert_eq!(terminal.state, SessionState::ExecFailed);
    assert_eq!(terminal.final_text, "<p>a</p><p>b</p>");
    let preview = terminal.preview.unwrap();
    assert!(preview.compile_error.unwrap().contains("compiler crashed"));

    let events: Vec<_> = tokio_stream::wrappers::ReceiverStream::new(rx).collect().await;
    assert_eq!(events.len(), 3);
}

#[tokio::test]
async fn session_with_recursive_component_still_completes() {
    let (tx, rx) = mpsc::channel(16);
    let terminal = GenerationSession::new(SessionConfig::for_framework(Framework::ReactLike))
        .run(
            frames(&["CODE:const Loop = () => <div><Loop /></div>;"]),
            CancellationToken::new(),
            tx,
        )
        .await;
    drop(rx);

    assert_eq!(terminal.status, SessionStatus::Complete);
    assert_eq!(terminal.state, SessionState::ExecFailed);
    let preview = terminal.preview.unwrap();
    assert!(preview.render_error.unwrap().contains("depth"));
    assert!(matches!(preview.display, PreviewDisplay::Fallback(_)));
}
