//! Append-only session buffer.

/// Running buffer of received fragments, in receipt order.
///
/// Append at the tail is the only mutation, so the buffer length is
/// monotonically non-decreasing no matter how often it is read.
#[derive(Debug, Clone, Default)]
pub struct IncrementalAccumulator {
    fragments: Vec<String>,
    joined: String,
}

impl IncrementalAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a fragment and return the new buffer length in bytes.
    ///
    /// Empty fragments are recorded too (a first frame holding only a marker
    /// still counts as a received fragment).
    pub fn append(&mut self, fragment: &str) -> usize {
        self.fragments.push(fragment.to_string());
        self.joined.push_str(fragment);
        self.joined.len()
    }

    /// The whole buffer as one string.
    pub fn text(&self) -> &str {
        &self.joined
    }

    pub fn fragments(&self) -> &[String] {
        &self.fragments
    }

    pub fn len(&self) -> usize {
        self.joined.len()
    }

    pub fn is_empty(&self) -> bool {
        self.joined.is_empty()
    }

    pub fn into_text(self) -> String {
        self.joined
    }
}
