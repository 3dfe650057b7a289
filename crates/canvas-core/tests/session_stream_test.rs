//! End-to-end session tests: transport bytes in, lifecycle events out.

use std::time::Duration;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use canvas_core::framework::Framework;
use canvas_core::sandbox::PreviewDisplay;
use canvas_core::session::{
    ProgressSnapshot, SessionEvent, SessionSlots, SessionState, SessionStatus, SlotError,
    TerminalSnapshot, spawn_session,
};
use canvas_core::stream::{PayloadKind, TransportFault};
use canvas_core::SessionConfig;
use canvas_test_utils::{ByteStream, ChannelTransport, failing_after, frames, stalled_after};

// ---------------------------------------------------------------------------
// Test helpers
// ---------------------------------------------------------------------------

async fn run(config: SessionConfig, transport: ByteStream) -> (Vec<SessionEvent>, TerminalSnapshot) {
    let (handle, events) = spawn_session(config, transport, CancellationToken::new());
    let events: Vec<SessionEvent> = events.collect().await;
    let terminal = handle.await.expect("session task panicked");
    (events, terminal)
}

fn progress(events: &[SessionEvent]) -> Vec<&ProgressSnapshot> {
    events
        .iter()
        .filter_map(|e| match e {
            SessionEvent::Progress(p) => Some(p),
            SessionEvent::Finished(_) => None,
        })
        .collect()
}

fn finished_count(events: &[SessionEvent]) -> usize {
    events.iter().filter(|e| e.is_finished()).count()
}

// ---------------------------------------------------------------------------
// Classification and accumulation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn chat_marker_first_snapshot() {
    let (events, terminal) = run(SessionConfig::default(), frames(&["CHAT:Hello there"])).await;

    let snapshots = progress(&events);
    assert_eq!(snapshots.len(), 1);
    assert_eq!(snapshots[0].kind, PayloadKind::Chat);
    assert_eq!(snapshots[0].partial_text, "Hello there");
    assert_eq!(snapshots[0].partial_code, None);
    assert_eq!(snapshots[0].preview, None);

    assert_eq!(terminal.status, SessionStatus::Complete);
    assert_eq!(terminal.final_text, "Hello there");
    assert_eq!(finished_count(&events), 1);
}

#[tokio::test]
async fn buffer_only_grows() {
    let parts = ["CHAT:", "The ", "quick ", "", "brown ", "fox"];
    let (events, terminal) = run(SessionConfig::default(), frames(&parts)).await;

    let snapshots = progress(&events);
    // The empty chunk decodes to no frame.
    assert_eq!(snapshots.len(), 5);
    for pair in snapshots.windows(2) {
        assert!(pair[1].partial_text.len() >= pair[0].partial_text.len());
        assert!(pair[1].partial_text.starts_with(&pair[0].partial_text));
        assert_eq!(pair[1].sequence, pair[0].sequence + 1);
    }
    assert_eq!(terminal.final_text, "The quick brown fox");
}

#[tokio::test]
async fn later_frames_never_reclassify() {
    let (events, terminal) = run(
        SessionConfig::default(),
        frames(&["CODE:<x>", "CHAT:not a marker", "CHAT:"]),
    )
    .await;

    for snapshot in progress(&events) {
        assert_eq!(snapshot.kind, PayloadKind::Code);
    }
    assert_eq!(terminal.kind, PayloadKind::Code);
    assert_eq!(terminal.final_text, "<x>CHAT:not a markerCHAT:");
}

#[tokio::test]
async fn unmarked_and_error_frames_are_chat() {
    let (_, terminal) = run(
        SessionConfig::default(),
        frames(&["ERROR: model overloaded"]),
    )
    .await;
    assert_eq!(terminal.kind, PayloadKind::Chat);
    assert_eq!(terminal.final_text, "ERROR: model overloaded");
    assert_eq!(terminal.state, SessionState::Delivered);
}

#[tokio::test]
async fn marker_split_across_chunks_is_not_recognized() {
    let (_, terminal) = run(SessionConfig::default(), frames(&["CO", "DE:<p>x</p>"])).await;
    assert_eq!(terminal.kind, PayloadKind::Chat);
    assert_eq!(terminal.final_text, "CODE:<p>x</p>");
}

#[tokio::test]
async fn empty_stream_is_complete_chat() {
    for framework in Framework::ALL {
        let (events, terminal) = run(SessionConfig::for_framework(framework), frames(&[])).await;
        assert_eq!(events.len(), 1);
        assert_eq!(terminal.status, SessionStatus::Complete);
        assert_eq!(terminal.kind, PayloadKind::Chat);
        assert!(terminal.final_text.is_empty());
        assert_eq!(terminal.frames, 0);
    }
}

#[tokio::test]
async fn split_multibyte_character_reaches_the_buffer_whole() {
    let (transport, stream) = ChannelTransport::new(8);
    let (handle, events) = spawn_session(SessionConfig::default(), stream, CancellationToken::new());

    assert!(transport.send("CHAT:caf").await);
    assert!(transport.send_bytes(b"\xC3").await);
    assert!(transport.send_bytes(b"\xA9!").await);
    transport.close();

    let events: Vec<_> = events.collect().await;
    let terminal = handle.await.unwrap();
    assert_eq!(terminal.final_text, "café!");
    assert_eq!(terminal.frames, 2);
    assert_eq!(progress(&events).len(), 2);
}

// ---------------------------------------------------------------------------
// Code sessions
// ---------------------------------------------------------------------------

#[tokio::test]
async fn code_session_rerenders_on_every_frame() {
    let (events, terminal) = run(
        SessionConfig::for_framework(Framework::ReactLike),
        frames(&["CODE:<section><h1>Title</h1>", "<p>Body</p>", "</section>"]),
    )
    .await;

    let snapshots = progress(&events);
    assert_eq!(snapshots.len(), 3);
    for snapshot in &snapshots {
        assert_eq!(snapshot.state, SessionState::Rendered);
        assert!(snapshot.partial_code.as_deref().unwrap().contains("render(<GeneratedComponent />);"));
    }

    assert_eq!(terminal.state, SessionState::Rendered);
    assert_eq!(
        terminal.preview.unwrap().display,
        PreviewDisplay::Rendered("<section><h1>Title</h1><p>Body</p></section>".into())
    );
}

#[tokio::test]
async fn host_primitives_render_through_the_binding_table() {
    let (_, terminal) = run(
        SessionConfig::for_framework(Framework::ReactLike),
        frames(&[
            "CODE:const App = () => (\n  <Card>\n    <Button>Go</Button>\n  </Card>\n);",
        ]),
    )
    .await;

    assert_eq!(terminal.state, SessionState::Rendered);
    let PreviewDisplay::Rendered(html) = terminal.preview.unwrap().display else {
        panic!("expected rendered preview");
    };
    assert!(html.contains("canvas-card"));
    assert!(html.contains("canvas-button"));
    assert!(html.contains(">Go</button>"));
}

#[tokio::test]
async fn html_session_produces_an_isolated_document() {
    let (_, terminal) = run(
        SessionConfig::for_framework(Framework::Html),
        frames(&["CODE:```html\n<div class=\"p-4\">Hi</div>\n```"]),
    )
    .await;

    assert_eq!(terminal.state, SessionState::Rendered);
    assert_eq!(terminal.final_code.as_deref(), Some("<div class=\"p-4\">Hi</div>"));
    let PreviewDisplay::Document(srcdoc) = terminal.preview.unwrap().display else {
        panic!("expected isolated document");
    };
    assert!(srcdoc.contains("<div class=\"p-4\">Hi</div>"));
}

#[tokio::test]
async fn unknown_component_is_an_exec_failure_not_a_crash() {
    let (events, terminal) = run(
        SessionConfig::for_framework(Framework::ReactLike),
        frames(&["CODE:<p>ok</p>", "<Widget />"]),
    )
    .await;

    let snapshots = progress(&events);
    assert_eq!(snapshots[0].state, SessionState::Rendered);
    assert_eq!(snapshots[1].state, SessionState::ExecFailed);

    assert_eq!(terminal.status, SessionStatus::Complete);
    assert_eq!(terminal.state, SessionState::ExecFailed);
    let preview = terminal.preview.unwrap();
    assert!(preview.compile_error.unwrap().contains("Widget"));
    // The compile channel never replaces what is on screen.
    assert_eq!(preview.display, PreviewDisplay::Rendered("<p>ok</p>".into()));
}

// ---------------------------------------------------------------------------
// Faults and cancellation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn transport_failure_flushes_the_partial_buffer() {
    let (events, terminal) = run(
        SessionConfig::default(),
        failing_after(&["CHAT:par", "tial"], "connection reset"),
    )
    .await;

    assert_eq!(progress(&events).len(), 2);
    assert_eq!(terminal.status, SessionStatus::Failed);
    assert_eq!(terminal.state, SessionState::Failed);
    assert_eq!(terminal.final_text, "partial");
    assert!(matches!(&terminal.fault, Some(TransportFault::Read(msg)) if msg.contains("connection reset")));
    assert_eq!(finished_count(&events), 1);
}

#[tokio::test]
async fn cancellation_fails_exactly_once_with_partial_buffer() {
    let cancel = CancellationToken::new();
    let (handle, mut events) = spawn_session(
        SessionConfig::for_framework(Framework::ReactLike),
        stalled_after(&["CODE:<div>", "partial"]),
        cancel.clone(),
    );

    let mut seen = Vec::new();
    while seen.len() < 2 {
        let event = events.next().await.expect("stream ended early");
        seen.push(event);
    }
    cancel.cancel();

    let rest: Vec<_> = events.collect().await;
    let terminal = handle.await.unwrap();

    assert_eq!(rest.len(), 1);
    assert_eq!(finished_count(&rest), 1);
    assert_eq!(terminal.status, SessionStatus::Failed);
    assert_eq!(terminal.state, SessionState::Failed);
    assert_eq!(terminal.fault, Some(TransportFault::Cancelled));
    assert_eq!(terminal.final_text, "<div>partial");
    assert_eq!(terminal.kind, PayloadKind::Code);

    // Cancelling again changes nothing.
    cancel.cancel();
    assert_eq!(rest[0], SessionEvent::Finished(terminal));
}

#[tokio::test]
async fn cancellation_is_not_blocked_by_a_slow_consumer() {
    let cancel = CancellationToken::new();
    let config = SessionConfig {
        event_capacity: 1,
        ..SessionConfig::for_framework(Framework::ReactLike)
    };
    let (handle, mut events) = spawn_session(
        config,
        stalled_after(&["CODE:<p>a</p>", "<p>b</p>", "<p>c</p>"]),
        cancel.clone(),
    );

    let first = events.next().await.expect("stream ended early");
    assert!(!first.is_finished());
    cancel.cancel();

    let terminal = tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("session ignored cancellation")
        .unwrap();
    assert_eq!(terminal.status, SessionStatus::Failed);
    assert_eq!(terminal.fault, Some(TransportFault::Cancelled));
    assert!(terminal.final_text.starts_with("<p>a</p>"));

    let rest: Vec<_> = events.collect().await;
    assert!(finished_count(&rest) <= 1);
}

#[tokio::test]
async fn cancelled_before_first_frame() {
    let cancel = CancellationToken::new();
    cancel.cancel();
    let (handle, events) = spawn_session(SessionConfig::default(), stalled_after(&[]), cancel);
    let events: Vec<_> = events.collect().await;
    let terminal = handle.await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(terminal.status, SessionStatus::Failed);
    assert!(terminal.final_text.is_empty());
}

#[tokio::test]
async fn one_session_per_requester() {
    let slots = SessionSlots::new();
    let guard = slots.acquire("user-1").unwrap();
    assert_eq!(
        slots.acquire("user-1").unwrap_err(),
        SlotError::Busy("user-1".into())
    );

    let (_, terminal) = run(SessionConfig::default(), frames(&["CHAT:hi"])).await;
    assert!(terminal.is_complete());
    drop(guard);

    assert!(slots.acquire("user-1").is_ok());
}
