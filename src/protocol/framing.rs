//! Stream framing for the vMix TCP API
//!
//! TCP delivers an unbounded byte stream with no message boundaries. Every
//! message starts with a header line `<TYPE> <STATUS>[ ...]` terminated by
//! `\r\n`. The one exception is `XML <length>`, whose header is followed by
//! exactly `length` bytes of payload.
//!
//! [`VmixCodec`] extracts one [`Frame`] per `decode` call and returns
//! `Ok(None)` while only a fragment is buffered. `FramedRead` keeps calling it
//! until that happens, so a burst containing many messages is drained before
//! control returns to the runtime. Incomplete or unparseable data is never an
//! error: the codec waits for more bytes.

use super::{LINE_TERMINATOR, LINE_TERMINATOR_LEN, MAX_XML_LENGTH, XML_MESSAGE_TYPE};
use crate::observability::logging::FRAMING_TARGET;
use bytes::{Buf, BufMut, BytesMut};
use std::io;
use tokio_util::codec::{Decoder, Encoder};
use tracing::{debug, trace, warn};

/// One complete message cut from the stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Payload of an `XML <length>` message
    Xml { body: String },
    /// Any single-line message
    Line {
        message_type: String,
        status: String,
        raw: String,
    },
}

impl Frame {
    /// Text handed to generic `data` subscribers
    pub fn raw(&self) -> &str {
        match self {
            Frame::Xml { body } => body,
            Frame::Line { raw, .. } => raw,
        }
    }
}

/// Codec for the vMix line protocol
#[derive(Debug, Clone, Default)]
pub struct VmixCodec {
    debug_buffers: bool,
}

impl VmixCodec {
    pub fn new(debug_buffers: bool) -> Self {
        Self { debug_buffers }
    }
}

/// Position of the first `\r\n` in `bytes`
fn find_terminator(bytes: &[u8]) -> Option<usize> {
    bytes
        .windows(LINE_TERMINATOR_LEN)
        .position(|window| window == LINE_TERMINATOR.as_bytes())
}

/// Number of bytes taken by bare terminators at the front of `bytes`
fn leading_terminators(bytes: &[u8]) -> usize {
    let mut offset = 0;
    while bytes[offset..].starts_with(LINE_TERMINATOR.as_bytes()) {
        offset += LINE_TERMINATOR_LEN;
    }
    offset
}

impl Decoder for VmixCodec {
    type Item = Frame;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.is_empty() {
            return Ok(None);
        }

        if self.debug_buffers {
            trace!(
                target: FRAMING_TARGET,
                buffered = src.len(),
                buffer = %String::from_utf8_lossy(src),
                "Reading buffer"
            );
        }

        let header_start = leading_terminators(src);
        let Some(header_len) = find_terminator(&src[header_start..]) else {
            return Ok(None);
        };

        // Byte accounting below works on the raw header bytes, never on chars
        let header_end = header_start + header_len;
        let header = String::from_utf8_lossy(&src[header_start..header_end]).into_owned();
        let tokens: Vec<&str> = header
            .split(' ')
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .collect();

        // Fewer than two tokens: the header may still be arriving
        if tokens.len() < 2 {
            return Ok(None);
        }

        let message_type = tokens[0].to_string();
        let status = tokens[1].to_string();
        let payload_start = header_end + LINE_TERMINATOR_LEN;

        if message_type == XML_MESSAGE_TYPE {
            let length = status.parse::<usize>().ok();
            let complete_len = length
                .filter(|length| *length <= MAX_XML_LENGTH)
                .and_then(|length| payload_start.checked_add(length));

            if let (Some(length), Some(complete_len)) = (length, complete_len) {
                if src.len() < complete_len {
                    return Ok(None);
                }

                let message = src.split_to(complete_len);
                let payload = &message[payload_start..];
                let payload = payload
                    .strip_suffix(LINE_TERMINATOR.as_bytes())
                    .unwrap_or(payload);
                let body = String::from_utf8_lossy(payload).into_owned();

                if self.debug_buffers {
                    trace!(target: FRAMING_TARGET, length, "Extracted XML message");
                }
                return Ok(Some(Frame::Xml { body }));
            }

            if length.is_some() {
                warn!(
                    target: FRAMING_TARGET,
                    header = %header,
                    max = MAX_XML_LENGTH,
                    "XML length out of range, treating as single line"
                );
            } else {
                debug!(
                    target: FRAMING_TARGET,
                    header = %header,
                    "XML header without byte length, treating as single line"
                );
            }
        }

        src.advance(payload_start);

        if self.debug_buffers {
            trace!(target: FRAMING_TARGET, message = %header, "Extracted line message");
        }
        Ok(Some(Frame::Line {
            message_type,
            status,
            raw: header,
        }))
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let frame = self.decode(buf)?;
        if frame.is_none() && !buf.is_empty() {
            debug!(
                target: FRAMING_TARGET,
                dropped = buf.len(),
                "Discarding incomplete message at end of stream"
            );
            buf.clear();
        }
        Ok(frame)
    }
}

impl Encoder<String> for VmixCodec {
    type Error = io::Error;

    fn encode(&mut self, line: String, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.reserve(line.len() + LINE_TERMINATOR_LEN);
        dst.put_slice(line.as_bytes());
        if !line.ends_with(LINE_TERMINATOR) {
            dst.put_slice(LINE_TERMINATOR.as_bytes());
        }
        Ok(())
    }
}
