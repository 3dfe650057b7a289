//! Scripted byte transports for canvas integration tests.
//!
//! Every transport yields `io::Result<Vec<u8>>` chunks, the shape a live
//! response body has after the HTTP layer.

use std::io;

use futures::stream::{self, BoxStream, StreamExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

pub type ByteStream = BoxStream<'static, io::Result<Vec<u8>>>;

/// One chunk per part.
pub fn frames(parts: &[&str]) -> ByteStream {
    let chunks: Vec<io::Result<Vec<u8>>> =
        parts.iter().map(|p| Ok(p.as_bytes().to_vec())).collect();
    stream::iter(chunks).boxed()
}

/// `text` cut into chunks of `size` bytes. Multi-byte characters may be
/// split across chunks.
pub fn chunked(text: &str, size: usize) -> ByteStream {
    let chunks: Vec<io::Result<Vec<u8>>> = text
        .as_bytes()
        .chunks(size.max(1))
        .map(|c| Ok(c.to_vec()))
        .collect();
    stream::iter(chunks).boxed()
}

/// The given parts, then a connection-reset error.
pub fn failing_after(parts: &[&str], message: &str) -> ByteStream {
    let error = io::Error::new(io::ErrorKind::ConnectionReset, message.to_string());
    frames(parts).chain(stream::once(async move { Err(error) })).boxed()
}

/// The given parts, then a transport that never yields again.
pub fn stalled_after(parts: &[&str]) -> ByteStream {
    frames(parts).chain(stream::pending()).boxed()
}

/// A transport fed by the test while the session runs.
pub struct ChannelTransport {
    tx: mpsc::Sender<io::Result<Vec<u8>>>,
}

impl ChannelTransport {
    pub fn new(capacity: usize) -> (Self, ByteStream) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, ReceiverStream::new(rx).boxed())
    }

    /// Push one chunk. Returns false once the reader is gone.
    pub async fn send(&self, text: &str) -> bool {
        self.tx.send(Ok(text.as_bytes().to_vec())).await.is_ok()
    }

    pub async fn send_bytes(&self, bytes: &[u8]) -> bool {
        self.tx.send(Ok(bytes.to_vec())).await.is_ok()
    }

    /// Push a transport error.
    pub async fn fail(&self, message: &str) -> bool {
        let error = io::Error::new(io::ErrorKind::BrokenPipe, message.to_string());
        self.tx.send(Err(error)).await.is_ok()
    }

    /// End the stream normally.
    pub fn close(self) {}
}
