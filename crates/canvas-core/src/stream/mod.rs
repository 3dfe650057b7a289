//! Live response stream handling: frame decoding, classification, and
//! accumulation.
//!
//! # Architecture
//!
//! ```text
//! transport bytes ──> StreamFrameReader ──> StreamFrame { raw, is_first }
//!                                               |
//!                                               v
//!                                        StreamClassifier (first frame only)
//!                                               |  PayloadKind + remainder
//!                                               v
//!                                     IncrementalAccumulator (append-only)
//! ```

pub mod accumulator;
pub mod classifier;
pub mod reader;

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use accumulator::IncrementalAccumulator;
pub use classifier::{CHAT_MARKER, CODE_MARKER, Classification, StreamClassifier};
pub use reader::StreamFrameReader;

/// One decoded chunk of the live response stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamFrame {
    pub raw: String,
    /// True only for the first frame of a session.
    pub is_first: bool,
}

/// What a session's stream carries, decided once from the first frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadKind {
    #[default]
    Unclassified,
    Chat,
    Code,
}

impl fmt::Display for PayloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Unclassified => "unclassified",
            Self::Chat => "chat",
            Self::Code => "code",
        };
        f.write_str(s)
    }
}

/// The stream ended abnormally.
///
/// The partial buffer accumulated before the fault is always preserved and
/// flushed to the caller; faults are never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "type", content = "message", rename_all = "snake_case")]
pub enum TransportFault {
    #[error("transport read failed: {0}")]
    Read(String),

    #[error("stream cancelled by caller")]
    Cancelled,
}

impl From<std::io::Error> for TransportFault {
    fn from(err: std::io::Error) -> Self {
        Self::Read(err.to_string())
    }
}
