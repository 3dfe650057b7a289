//! Session state machine.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Lifecycle state of a generation session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    Idle,
    Classifying,
    ChatStreaming,
    CodeStreaming,
    Normalizing,
    Executing,
    Rendered,
    ExecFailed,
    /// Stream completed without any execution result (chat sessions, empty
    /// streams, code that never produced a preview).
    Delivered,
    Failed,
}

impl SessionState {
    /// States a finished session can end in.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Rendered | Self::ExecFailed | Self::Delivered | Self::Failed
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Classifying => "classifying",
            Self::ChatStreaming => "chat_streaming",
            Self::CodeStreaming => "code_streaming",
            Self::Normalizing => "normalizing",
            Self::Executing => "executing",
            Self::Rendered => "rendered",
            Self::ExecFailed => "exec_failed",
            Self::Delivered => "delivered",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid session transition: {from} -> {to}")]
pub struct TransitionError {
    pub from: SessionState,
    pub to: SessionState,
}

/// Enforces the transition graph:
///
/// ```text
/// idle           -> classifying
/// classifying    -> chat_streaming | code_streaming | delivered (empty stream)
/// chat_streaming -> delivered
/// code_streaming -> normalizing | delivered
/// normalizing    -> executing | code_streaming (nothing to execute yet)
/// executing      -> rendered | exec_failed
/// rendered       -> code_streaming (next frame)
/// exec_failed    -> code_streaming (next frame)
/// any non-final  -> failed
/// ```
///
/// `rendered` and `exec_failed` are final once the stream has ended;
/// `delivered` and `failed` are always final.
#[derive(Debug, Clone, Default)]
pub struct SessionStateMachine {
    state: SessionState,
    history: Vec<SessionState>,
}

impl SessionStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Every state entered after `idle`, in order.
    pub fn history(&self) -> &[SessionState] {
        &self.history
    }

    pub fn is_valid_transition(from: SessionState, to: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (from, to),
            (Idle, Classifying)
                | (Classifying, ChatStreaming)
                | (Classifying, CodeStreaming)
                | (Classifying, Delivered)
                | (ChatStreaming, Delivered)
                | (CodeStreaming, Normalizing)
                | (CodeStreaming, Delivered)
                | (Normalizing, Executing)
                | (Normalizing, CodeStreaming)
                | (Executing, Rendered)
                | (Executing, ExecFailed)
                | (Rendered, CodeStreaming)
                | (ExecFailed, CodeStreaming)
        ) || (to == Failed && !matches!(from, Failed | Delivered))
    }

    pub fn advance(&mut self, to: SessionState) -> Result<(), TransitionError> {
        if !Self::is_valid_transition(self.state, to) {
            return Err(TransitionError {
                from: self.state,
                to,
            });
        }
        self.state = to;
        self.history.push(to);
        Ok(())
    }
}
