//! Newline-delimited JSON framing.
//!
//! Every message travels as one UTF-8 JSON object `{"type": ..., "data": ...}`
//! terminated by `\n`. [`MessageCodec`] plugs that framing into
//! `tokio_util::codec` so connections can be driven with `FramedRead` and
//! `FramedWrite`.

use std::io;

use bytes::{BufMut, BytesMut};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder, LinesCodec, LinesCodecError};

use super::message::{Message, MessageType};

/// Default maximum frame length, terminator excluded.
pub const DEFAULT_MAX_FRAME_LEN: usize = 1024 * 1024;

/// Errors produced while framing or decoding messages.
///
/// Everything except [`CodecError::Io`] concerns a single frame: the frame is
/// dropped and the stream stays usable.
#[derive(Error, Debug)]
pub enum CodecError {
    /// Not JSON, not an envelope, or a payload of the wrong shape
    #[error("malformed message: {0}")]
    Malformed(String),

    /// Envelope `type` not recognised
    #[error("unknown message type '{0}'")]
    UnknownType(String),

    /// Frame longer than the configured maximum
    #[error("frame exceeds {max} bytes")]
    FrameTooLong {
        /// Configured maximum
        max: usize,
    },

    /// Transport failure
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl CodecError {
    /// Whether the stream can keep being read after this error.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, CodecError::Io(_))
    }
}

#[derive(Serialize)]
struct OutboundEnvelope<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    data: Value,
}

#[derive(Deserialize)]
struct InboundEnvelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Value,
}

/// Serializes a message into one frame, terminator included.
pub fn encode(message: &Message) -> Result<Vec<u8>, CodecError> {
    let envelope = OutboundEnvelope {
        kind: message.message_type().as_str(),
        data: message
            .data()
            .map_err(|e| CodecError::Malformed(e.to_string()))?,
    };
    let mut bytes =
        serde_json::to_vec(&envelope).map_err(|e| CodecError::Malformed(e.to_string()))?;
    bytes.push(b'\n');
    Ok(bytes)
}

/// Parses one frame. Surrounding whitespace, including the terminator, is
/// ignored.
pub fn decode(frame: &[u8]) -> Result<Message, CodecError> {
    let envelope: InboundEnvelope =
        serde_json::from_slice(frame).map_err(|e| CodecError::Malformed(e.to_string()))?;
    let kind: MessageType = envelope.kind.parse()?;
    Message::from_parts(kind, envelope.data)
}

/// `tokio_util` codec for protocol messages.
///
/// Decoded items are themselves results: a frame that fails to decode yields
/// `Some(Err(_))` so the caller can log it and keep reading, while the outer
/// error is reserved for transport failures.
#[derive(Debug, Clone)]
pub struct MessageCodec {
    lines: LinesCodec,
    max_frame_len: usize,
}

impl MessageCodec {
    /// Codec with the default frame limit.
    pub fn new() -> Self {
        Self::with_max_frame_len(DEFAULT_MAX_FRAME_LEN)
    }

    /// Codec rejecting frames longer than `max_frame_len` bytes.
    pub fn with_max_frame_len(max_frame_len: usize) -> Self {
        Self {
            lines: LinesCodec::new_with_max_length(max_frame_len),
            max_frame_len,
        }
    }

    /// Configured frame limit.
    pub fn max_frame_len(&self) -> usize {
        self.max_frame_len
    }

    fn next_frame(
        &mut self,
        src: &mut BytesMut,
        eof: bool,
    ) -> Result<Option<Result<Message, CodecError>>, CodecError> {
        loop {
            let line = if eof {
                self.lines.decode_eof(src)
            } else {
                self.lines.decode(src)
            };

            match line {
                Ok(Some(line)) if line.trim().is_empty() => continue,
                Ok(Some(line)) => return Ok(Some(decode(line.as_bytes()))),
                Ok(None) => return Ok(None),
                Err(LinesCodecError::MaxLineLengthExceeded) => {
                    return Ok(Some(Err(CodecError::FrameTooLong {
                        max: self.max_frame_len,
                    })))
                }
                // The offending line has already been consumed.
                Err(LinesCodecError::Io(e)) if e.kind() == io::ErrorKind::InvalidData => {
                    return Ok(Some(Err(CodecError::Malformed(e.to_string()))))
                }
                Err(LinesCodecError::Io(e)) => return Err(CodecError::Io(e)),
            }
        }
    }
}

impl Default for MessageCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for MessageCodec {
    type Item = Result<Message, CodecError>;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        self.next_frame(src, false)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        self.next_frame(src, true)
    }
}

impl Encoder<Message> for MessageCodec {
    type Error = CodecError;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let frame = encode(&item)?;
        if frame.len() - 1 > self.max_frame_len {
            return Err(CodecError::FrameTooLong {
                max: self.max_frame_len,
            });
        }
        dst.reserve(frame.len());
        dst.put_slice(&frame);
        Ok(())
    }
}
