//! Newline-delimited text framing shared by the line-based services.

use std::string::FromUtf8Error;

use bytes::{Bytes, BytesMut};
use tokio_util::codec::{AnyDelimiterCodec, AnyDelimiterCodecError, Decoder, Encoder};

/// One received line. A line that is not valid UTF-8 is an `Err` item rather
/// than a stream error, so the session can answer it and keep reading.
pub type Line = Result<String, FromUtf8Error>;

/// `\n`-delimited codec that strips a trailing `\r` and bounds line length.
///
/// Exceeding the length bound is still a stream error and ends the session.
#[derive(Debug, Clone)]
pub struct TextLines {
    inner: AnyDelimiterCodec,
}

impl TextLines {
    #[must_use]
    pub fn new_with_max_length(max_length: usize) -> Self {
        Self {
            inner: AnyDelimiterCodec::new_with_max_length(
                b"\n".to_vec(),
                b"\n".to_vec(),
                max_length,
            ),
        }
    }
}

fn into_line(chunk: Bytes) -> Line {
    let mut bytes = chunk.to_vec();
    if bytes.last() == Some(&b'\r') {
        bytes.pop();
    }
    String::from_utf8(bytes)
}

impl Decoder for TextLines {
    type Item = Line;
    type Error = AnyDelimiterCodecError;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Line>, Self::Error> {
        Ok(self.inner.decode(buf)?.map(into_line))
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Line>, Self::Error> {
        Ok(self.inner.decode_eof(buf)?.map(into_line))
    }
}

impl<T: AsRef<str>> Encoder<T> for TextLines {
    type Error = AnyDelimiterCodecError;

    fn encode(&mut self, line: T, dst: &mut BytesMut) -> Result<(), Self::Error> {
        self.inner.encode(line, dst)
    }
}
