//! `canvas replay` command: feed a recorded backend stream through a full
//! generation session and print every lifecycle event.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result, bail};
use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use canvas_core::session::{SessionEvent, SessionStatus, spawn_session};
use canvas_core::SessionConfig;

pub async fn run_replay(
    config: SessionConfig,
    recording: Vec<u8>,
    chunk_size: usize,
    json: bool,
) -> Result<()> {
    let chunks: Vec<std::io::Result<Vec<u8>>> = recording
        .chunks(chunk_size.max(1))
        .map(|c| Ok(c.to_vec()))
        .collect();
    let transport = futures::stream::iter(chunks);

    // First signal cancels the session, second force-exits.
    let cancel = CancellationToken::new();
    let cancel_clone = cancel.clone();
    let got_first_signal = Arc::new(AtomicBool::new(false));
    tokio::spawn(async move {
        loop {
            tokio::signal::ctrl_c().await.ok();
            if got_first_signal.swap(true, Ordering::SeqCst) {
                eprintln!("\nForce exit.");
                std::process::exit(130);
            }
            eprintln!("\nCancelling session (Ctrl+C again to force)...");
            cancel_clone.cancel();
        }
    });

    let (handle, mut events) = spawn_session(config, transport, cancel);
    while let Some(event) = events.next().await {
        if json {
            let line = serde_json::to_string(&event).context("failed to serialize event")?;
            println!("{line}");
        } else {
            print_event(&event);
        }
    }

    let terminal = handle.await.context("session task panicked")?;
    if terminal.status == SessionStatus::Failed {
        let reason = terminal
            .fault
            .map(|f| f.to_string())
            .unwrap_or_else(|| "unknown fault".to_string());
        bail!("session failed after {} frame(s): {reason}", terminal.frames);
    }
    Ok(())
}

fn print_event(event: &SessionEvent) {
    match event {
        SessionEvent::Progress(p) => {
            println!(
                "[{:>4}] {:<14} kind={:<5} text={}B code={}",
                p.sequence,
                p.state.to_string(),
                p.kind.to_string(),
                p.partial_text.len(),
                p.partial_code
                    .as_ref()
                    .map(|c| format!("{}B", c.len()))
                    .unwrap_or_else(|| "-".to_string()),
            );
            if let Some(preview) = &p.preview {
                if let Some(err) = &preview.compile_error {
                    println!("       compile error: {err}");
                }
                if let Some(err) = &preview.render_error {
                    println!("       render error: {err}");
                }
            }
        }
        SessionEvent::Finished(t) => {
            println!();
            println!("Session {} finished: {:?} ({})", t.session_id, t.status, t.state);
            println!("  kind:   {}", t.kind);
            println!("  frames: {}", t.frames);
            println!(
                "  took:   {}ms",
                (t.finished_at - t.started_at).num_milliseconds()
            );
            println!();
            match &t.final_code {
                Some(code) if !code.is_empty() => println!("{code}"),
                _ => println!("{}", t.final_text),
            }
        }
    }
}
