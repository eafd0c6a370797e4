// Newline-delimited message framing for the stdio transport

use bytes::BytesMut;
use std::io;
use tokio_util::codec::{Decoder, Encoder, LinesCodec, LinesCodecError};

/// Longest accepted message line, excluding the newline
pub const MAX_MESSAGE_BYTES: usize = 8 * 1024 * 1024;

/// A line that could not be turned into a message; the stream stays usable
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    #[error("message is not valid UTF-8")]
    InvalidUtf8,

    #[error("message exceeds {0} bytes")]
    TooLong(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Message(String),
    Invalid(FrameError),
}

/// Line codec that reports bad lines as frames instead of stream errors
///
/// Only I/O errors from the underlying stream are returned as `Err`, so a
/// single malformed line never ends the session.
#[derive(Debug)]
pub struct MessageCodec {
    lines: LinesCodec,
    max_length: usize,
}

impl MessageCodec {
    pub fn new() -> Self {
        Self::with_max_length(MAX_MESSAGE_BYTES)
    }

    pub fn with_max_length(max_length: usize) -> Self {
        Self {
            lines: LinesCodec::new_with_max_length(max_length),
            max_length,
        }
    }

    fn frame(&self, decoded: Result<Option<String>, LinesCodecError>) -> io::Result<Option<Frame>> {
        match decoded {
            Ok(line) => Ok(line.map(Frame::Message)),
            // The codec discards the rest of the line before decoding resumes
            Err(LinesCodecError::MaxLineLengthExceeded) => {
                Ok(Some(Frame::Invalid(FrameError::TooLong(self.max_length))))
            }
            // The offending line has already been consumed
            Err(LinesCodecError::Io(e)) if e.kind() == io::ErrorKind::InvalidData => {
                Ok(Some(Frame::Invalid(FrameError::InvalidUtf8)))
            }
            Err(LinesCodecError::Io(e)) => Err(e),
        }
    }
}

impl Default for MessageCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for MessageCodec {
    type Item = Frame;
    type Error = io::Error;

    fn decode(&mut self, buf: &mut BytesMut) -> io::Result<Option<Frame>> {
        let decoded = self.lines.decode(buf);
        self.frame(decoded)
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> io::Result<Option<Frame>> {
        let decoded = self.lines.decode_eof(buf);
        self.frame(decoded)
    }
}

impl Encoder<String> for MessageCodec {
    type Error = io::Error;

    fn encode(&mut self, item: String, dst: &mut BytesMut) -> io::Result<()> {
        self.lines.encode(item, dst).map_err(|e| match e {
            LinesCodecError::Io(e) => e,
            other => io::Error::other(other),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(codec: &mut MessageCodec, input: &[u8]) -> Vec<Frame> {
        let mut buf = BytesMut::from(input);
        let mut frames = Vec::new();
        while let Some(frame) = codec.decode_eof(&mut buf).unwrap() {
            frames.push(frame);
        }
        frames
    }

    #[test]
    fn test_decodes_lines_and_strips_carriage_return() {
        let mut codec = MessageCodec::new();
        let frames = decode_all(&mut codec, b"first\r\nsecond\nlast");

        assert_eq!(
            frames,
            vec![
                Frame::Message("first".to_string()),
                Frame::Message("second".to_string()),
                Frame::Message("last".to_string()),
            ]
        );
    }

    #[test]
    fn test_invalid_utf8_line_is_skipped() {
        let mut codec = MessageCodec::new();
        let frames = decode_all(&mut codec, b"\xff\xfe\nok\n");

        assert_eq!(
            frames,
            vec![
                Frame::Invalid(FrameError::InvalidUtf8),
                Frame::Message("ok".to_string()),
            ]
        );
    }

    #[test]
    fn test_over_long_line_is_discarded() {
        let mut codec = MessageCodec::with_max_length(8);
        let frames = decode_all(&mut codec, b"0123456789abcdef\nshort\n");

        assert_eq!(
            frames,
            vec![
                Frame::Invalid(FrameError::TooLong(8)),
                Frame::Message("short".to_string()),
            ]
        );
    }

    #[test]
    fn test_encode_appends_newline() {
        let mut codec = MessageCodec::new();
        let mut buf = BytesMut::new();
        codec.encode("{}".to_string(), &mut buf).unwrap();
        assert_eq!(&buf[..], b"{}\n");
    }
}
