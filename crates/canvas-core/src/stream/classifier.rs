//! First-frame payload classification.
//!
//! Only the first frame of a session may carry a marker. Once decided, the
//! kind is fixed for the rest of the session and later frames pass through
//! verbatim, even if they happen to start with a marker literal.

use tracing::debug;

use super::{PayloadKind, StreamFrame};

/// Marker prefix announcing a chat reply.
pub const CHAT_MARKER: &str = "CHAT:";
/// Marker prefix announcing a code artifact.
pub const CODE_MARKER: &str = "CODE:";

/// Outcome of inspecting a first frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification<'a> {
    pub kind: PayloadKind,
    /// The matched marker, or `None` when the chat default applied.
    pub marker: Option<&'static str>,
    /// The frame text after the marker.
    pub remainder: &'a str,
}

/// Decides a session's [`PayloadKind`] exactly once.
#[derive(Debug, Default)]
pub struct StreamClassifier {
    decided: Option<PayloadKind>,
}

impl StreamClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Classify first-frame text.
    ///
    /// Pure function of `text`. An unrecognised prefix is not an error: the
    /// whole frame is chat text.
    pub fn classify(text: &str) -> Classification<'_> {
        for (marker, kind) in [(CHAT_MARKER, PayloadKind::Chat), (CODE_MARKER, PayloadKind::Code)] {
            if let Some(remainder) = text.strip_prefix(marker) {
                return Classification {
                    kind,
                    marker: Some(marker),
                    remainder,
                };
            }
        }
        Classification {
            kind: PayloadKind::Chat,
            marker: None,
            remainder: text,
        }
    }

    /// The kind decided so far (`Unclassified` before the first frame).
    pub fn kind(&self) -> PayloadKind {
        self.decided.unwrap_or(PayloadKind::Unclassified)
    }

    /// Accept a frame and return the session kind plus the text to append.
    ///
    /// The first frame decides the kind and has its marker stripped. A frame
    /// arriving before any first frame (which the reader never produces)
    /// falls back to chat.
    pub fn accept<'a>(&mut self, frame: &'a StreamFrame) -> (PayloadKind, &'a str) {
        if let Some(kind) = self.decided {
            return (kind, frame.raw.as_str());
        }

        if !frame.is_first {
            debug!("frame arrived before classification; defaulting to chat");
            self.decided = Some(PayloadKind::Chat);
            return (PayloadKind::Chat, frame.raw.as_str());
        }

        let classification = Self::classify(&frame.raw);
        debug!(
            kind = %classification.kind,
            marker = classification.marker.unwrap_or("<none>"),
            "classified stream"
        );
        self.decided = Some(classification.kind);
        (classification.kind, classification.remainder)
    }

    /// Finish classification for a stream that produced no frames.
    pub fn finish_empty(&mut self) -> PayloadKind {
        *self.decided.get_or_insert(PayloadKind::Chat)
    }
}
