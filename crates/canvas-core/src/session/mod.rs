//! Per-request orchestration: frames in, lifecycle events out.
//!
//! # Architecture
//!
//! ```text
//! transport ──> StreamFrameReader ──> frame ──> StreamClassifier ──> IncrementalAccumulator
//!                                                                       |
//!                            chat: progress event <─────────────────────+
//!                            code: CodeNormalizer ──> PreviewSandbox ──> progress event
//!
//! stream end | transport fault | cancellation ──> one Finished event, sandbox released
//! ```
//!
//! Each frame is fully classified, accumulated, normalized and executed
//! before the next read. Nothing here is shared between sessions.

pub mod events;
pub mod slots;
pub mod state;

use chrono::Utc;
use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::SessionConfig;
use crate::normalize::{CodeNormalizer, NormalizedArtifact};
use crate::sandbox::{ExecutionOutcome, PreviewSandbox, PreviewSurface};
use crate::stream::{
    IncrementalAccumulator, PayloadKind, StreamClassifier, StreamFrame, StreamFrameReader,
    TransportFault,
};

pub use events::{ProgressSnapshot, SessionEvent, SessionStatus, TerminalSnapshot};
pub use slots::{SessionSlots, SlotError, SlotGuard};
pub use state::{SessionState, SessionStateMachine, TransitionError};

/// One prompt submission, from first frame to terminal event.
#[derive(Debug)]
pub struct GenerationSession {
    id: Uuid,
    config: SessionConfig,
    normalizer: CodeNormalizer,
    sandbox: PreviewSandbox,
    classifier: StreamClassifier,
    buffer: IncrementalAccumulator,
    machine: SessionStateMachine,
    sequence: u64,
    last_artifact: Option<NormalizedArtifact>,
}

impl GenerationSession {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            id: Uuid::new_v4(),
            normalizer: CodeNormalizer::new(config.normalizer.clone()),
            sandbox: PreviewSandbox::new(&config.sandbox),
            config,
            classifier: StreamClassifier::new(),
            buffer: IncrementalAccumulator::new(),
            machine: SessionStateMachine::new(),
            sequence: 0,
            last_artifact: None,
        }
    }

    /// Use a preconfigured sandbox (custom evaluator or bindings).
    pub fn with_sandbox(mut self, sandbox: PreviewSandbox) -> Self {
        self.sandbox = sandbox;
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.machine.state()
    }

    pub fn kind(&self) -> PayloadKind {
        self.classifier.kind()
    }

    /// Drive the session to completion.
    ///
    /// Sends one [`SessionEvent::Progress`] per frame and exactly one
    /// [`SessionEvent::Finished`], and returns the same terminal snapshot.
    /// A dropped receiver does not stop the session, and a receiver that
    /// stops reading does not delay cancellation.
    pub async fn run<S, B>(
        mut self,
        transport: S,
        cancel: CancellationToken,
        events: mpsc::Sender<SessionEvent>,
    ) -> TerminalSnapshot
    where
        S: Stream<Item = std::io::Result<B>> + Send + 'static,
        B: AsRef<[u8]> + Send + 'static,
    {
        let started_at = Utc::now();
        info!(
            session_id = %self.id,
            framework = %self.config.framework,
            "session started"
        );
        self.enter(SessionState::Classifying);

        let mut frames = StreamFrameReader::new(transport).frames();
        let fault = loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break Some(TransportFault::Cancelled),
                next = frames.next() => match next {
                    Some(Ok(frame)) => self.on_frame(frame, &events, &cancel).await,
                    Some(Err(fault)) => break Some(fault),
                    None => break None,
                },
            }
        };

        let terminal = self.finish(fault, started_at);
        self.emit(&events, &cancel, SessionEvent::Finished(terminal.clone()))
            .await;
        terminal
    }

    async fn on_frame(
        &mut self,
        frame: StreamFrame,
        events: &mpsc::Sender<SessionEvent>,
        cancel: &CancellationToken,
    ) {
        let (kind, text) = self.classifier.accept(&frame);
        if self.machine.state() == SessionState::Classifying {
            self.enter(match kind {
                PayloadKind::Code => SessionState::CodeStreaming,
                _ => SessionState::ChatStreaming,
            });
        }

        let total = self.buffer.append(text);
        self.sequence += 1;
        debug!(
            session_id = %self.id,
            sequence = self.sequence,
            bytes = total,
            "frame accumulated"
        );

        if kind == PayloadKind::Code {
            self.refresh_preview().await;
        }

        let snapshot = ProgressSnapshot {
            session_id: self.id,
            sequence: self.sequence,
            kind,
            status: SessionStatus::Streaming,
            state: self.machine.state(),
            partial_text: self.buffer.text().to_string(),
            partial_code: self.code(),
            preview: self.preview(),
        };
        self.emit(events, cancel, SessionEvent::Progress(snapshot)).await;
    }

    /// Deliver one event, waiting for channel space only until cancelled.
    ///
    /// Once cancelled, progress is dropped and the terminal event goes out
    /// only if the channel has room.
    async fn emit(
        &self,
        events: &mpsc::Sender<SessionEvent>,
        cancel: &CancellationToken,
        event: SessionEvent,
    ) {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                if matches!(event, SessionEvent::Finished(_)) && events.try_send(event).is_err() {
                    debug!(session_id = %self.id, "terminal event not delivered after cancellation");
                }
            }
            permit = events.reserve() => {
                if let Ok(permit) = permit {
                    permit.send(event);
                }
            }
        }
    }

    /// Re-normalize the whole buffer and execute the result.
    async fn refresh_preview(&mut self) {
        if matches!(
            self.machine.state(),
            SessionState::Rendered | SessionState::ExecFailed
        ) {
            self.enter(SessionState::CodeStreaming);
        }
        self.enter(SessionState::Normalizing);

        let artifact = self
            .normalizer
            .normalize(self.buffer.text(), self.config.framework);
        if artifact.is_void() {
            self.last_artifact = Some(artifact);
            self.enter(SessionState::CodeStreaming);
            return;
        }

        self.enter(SessionState::Executing);
        let outcome = self.sandbox.execute(&artifact).await;
        self.last_artifact = Some(artifact);
        match outcome {
            ExecutionOutcome::Rendered | ExecutionOutcome::ReadOnly => {
                self.enter(SessionState::Rendered)
            }
            other => {
                debug!(session_id = %self.id, outcome = ?other, "preview not rendered");
                self.enter(SessionState::ExecFailed)
            }
        }
    }

    fn finish(
        &mut self,
        fault: Option<TransportFault>,
        started_at: chrono::DateTime<Utc>,
    ) -> TerminalSnapshot {
        let kind = match self.classifier.kind() {
            PayloadKind::Unclassified => self.classifier.finish_empty(),
            kind => kind,
        };

        let status = match &fault {
            Some(fault) => {
                warn!(
                    session_id = %self.id,
                    error = %fault,
                    bytes = self.buffer.len(),
                    "session failed; flushing partial buffer"
                );
                self.enter(SessionState::Failed);
                SessionStatus::Failed
            }
            None => {
                match self.machine.state() {
                    SessionState::Classifying
                    | SessionState::ChatStreaming
                    | SessionState::CodeStreaming => self.enter(SessionState::Delivered),
                    _ => {}
                }
                SessionStatus::Complete
            }
        };

        let preview = self.preview();
        self.sandbox.release();

        info!(
            session_id = %self.id,
            kind = %kind,
            state = %self.machine.state(),
            frames = self.sequence,
            "session finished"
        );

        TerminalSnapshot {
            session_id: self.id,
            status,
            kind,
            final_text: self.buffer.text().to_string(),
            final_code: self.code(),
            state: self.machine.state(),
            fault,
            preview,
            frames: self.sequence,
            started_at,
            finished_at: Utc::now(),
        }
    }

    fn code(&self) -> Option<String> {
        if self.classifier.kind() != PayloadKind::Code {
            return None;
        }
        Some(
            self.last_artifact
                .as_ref()
                .map(|a| a.source.clone())
                .unwrap_or_default(),
        )
    }

    fn preview(&self) -> Option<PreviewSurface> {
        (self.classifier.kind() == PayloadKind::Code).then(|| self.sandbox.surface().clone())
    }

    fn enter(&mut self, to: SessionState) {
        if let Err(e) = self.machine.advance(to) {
            warn!(session_id = %self.id, error = %e, "ignored transition");
        }
    }
}

/// Spawn a session on the runtime.
///
/// Returns the task handle (resolving to the terminal snapshot) and the
/// stream of lifecycle events, buffered up to `config.event_capacity`.
pub fn spawn_session<S, B>(
    config: SessionConfig,
    transport: S,
    cancel: CancellationToken,
) -> (JoinHandle<TerminalSnapshot>, ReceiverStream<SessionEvent>)
where
    S: Stream<Item = std::io::Result<B>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
{
    let (tx, rx) = mpsc::channel(config.event_capacity.max(1));
    let session = GenerationSession::new(config);
    let handle = tokio::spawn(session.run(transport, cancel, tx));
    (handle, ReceiverStream::new(rx))
}
