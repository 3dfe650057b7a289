//! Lifecycle events a session exposes to the UI layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::state::SessionState;
use crate::sandbox::PreviewSurface;
use crate::stream::{PayloadKind, TransportFault};

/// Coarse session status: progress events are always `Streaming`, the
/// terminal event is `Complete` or `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Streaming,
    Complete,
    Failed,
}

/// Emitted after every frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSnapshot {
    pub session_id: Uuid,
    /// 1-based frame counter.
    pub sequence: u64,
    pub kind: PayloadKind,
    pub status: SessionStatus,
    pub state: SessionState,
    /// Full accumulated buffer so far.
    pub partial_text: String,
    /// Normalized source for code sessions.
    pub partial_code: Option<String>,
    pub preview: Option<PreviewSurface>,
}

/// Emitted exactly once when the session ends, whatever the reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TerminalSnapshot {
    pub session_id: Uuid,
    pub status: SessionStatus,
    pub kind: PayloadKind,
    /// Everything accumulated, including a partial buffer after a fault.
    pub final_text: String,
    pub final_code: Option<String>,
    pub state: SessionState,
    pub fault: Option<TransportFault>,
    pub preview: Option<PreviewSurface>,
    pub frames: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl TerminalSnapshot {
    pub fn is_complete(&self) -> bool {
        self.status == SessionStatus::Complete
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    Progress(ProgressSnapshot),
    Finished(TerminalSnapshot),
}

impl SessionEvent {
    pub fn session_id(&self) -> Uuid {
        match self {
            Self::Progress(p) => p.session_id,
            Self::Finished(t) => t.session_id,
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Finished(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_serializes_camel_case_with_event_tag() {
        let event = SessionEvent::Progress(ProgressSnapshot {
            session_id: Uuid::nil(),
            sequence: 1,
            kind: PayloadKind::Code,
            status: SessionStatus::Streaming,
            state: SessionState::Rendered,
            partial_text: "<p>".into(),
            partial_code: Some("const A = 1;".into()),
            preview: None,
        });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "progress");
        assert_eq!(json["partialText"], "<p>");
        assert_eq!(json["partialCode"], "const A = 1;");
        assert_eq!(json["kind"], "code");
        assert_eq!(json["status"], "streaming");
        assert_eq!(json["state"], "rendered");
        assert!(!event.is_finished());
    }
}
