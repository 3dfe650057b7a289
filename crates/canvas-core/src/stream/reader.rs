//! Turns a raw byte transport into text frames.
//!
//! Transport chunks are arbitrary byte slices: a multi-byte character can
//! straddle two chunks. The reader carries the incomplete tail over to the
//! next chunk so every emitted frame is valid UTF-8, and never interprets
//! the content.

use std::pin::Pin;

use futures::{Stream, StreamExt};
use tracing::{debug, warn};

use super::{StreamFrame, TransportFault};

/// Boxed stream of decoded frames, ending with at most one fault.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<StreamFrame, TransportFault>> + Send>>;

/// Reads sequential frames from a live response channel.
pub struct StreamFrameReader<S> {
    transport: S,
}

impl<S, B> StreamFrameReader<S>
where
    S: Stream<Item = std::io::Result<B>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
{
    pub fn new(transport: S) -> Self {
        Self { transport }
    }

    /// Consume the transport and yield frames in receipt order.
    ///
    /// Chunks that decode to no text yet (only part of a character) do not
    /// produce a frame. A transport error yields one `Err` and ends the
    /// stream; bytes still carried at that point are flushed lossily first.
    pub fn frames(self) -> FrameStream {
        let transport = self.transport;
        let stream = async_stream::stream! {
            let mut transport = Box::pin(transport);
            let mut carry: Vec<u8> = Vec::new();
            let mut emitted = 0usize;

            loop {
                match transport.next().await {
                    Some(Ok(chunk)) => {
                        carry.extend_from_slice(chunk.as_ref());
                        let text = decode_available(&mut carry);
                        if text.is_empty() {
                            continue;
                        }
                        emitted += 1;
                        debug!(frame = emitted, bytes = text.len(), "decoded frame");
                        yield Ok(StreamFrame { raw: text, is_first: emitted == 1 });
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, frames = emitted, "transport read failed");
                        if !carry.is_empty() {
                            let text = String::from_utf8_lossy(&carry).into_owned();
                            carry.clear();
                            emitted += 1;
                            yield Ok(StreamFrame { raw: text, is_first: emitted == 1 });
                        }
                        yield Err(TransportFault::from(e));
                        break;
                    }
                    None => {
                        if !carry.is_empty() {
                            warn!(bytes = carry.len(), "stream ended inside a multi-byte character");
                            let text = String::from_utf8_lossy(&carry).into_owned();
                            carry.clear();
                            emitted += 1;
                            yield Ok(StreamFrame { raw: text, is_first: emitted == 1 });
                        }
                        break;
                    }
                }
            }
        };
        Box::pin(stream)
    }
}

/// Decode as much of `carry` as possible, leaving an incomplete trailing
/// character in place. Invalid sequences become U+FFFD.
fn decode_available(carry: &mut Vec<u8>) -> String {
    let mut out = String::new();
    let mut consumed = 0usize;

    loop {
        match std::str::from_utf8(&carry[consumed..]) {
            Ok(valid) => {
                out.push_str(valid);
                consumed = carry.len();
                break;
            }
            Err(e) => {
                let valid_end = consumed + e.valid_up_to();
                // Bytes before valid_end were just validated.
                out.push_str(&String::from_utf8_lossy(&carry[consumed..valid_end]));
                match e.error_len() {
                    Some(bad) => {
                        out.push(char::REPLACEMENT_CHARACTER);
                        consumed = valid_end + bad;
                    }
                    None => {
                        consumed = valid_end;
                        break;
                    }
                }
            }
        }
    }

    carry.drain(..consumed);
    out
}
