//! Line framing for client input.
//!
//! Splits on `\n` and drops one trailing `\r`. Bytes that are not valid
//! UTF-8 are replaced with U+FFFD. Only a line longer than the limit is an
//! error.

use bytes::{Bytes, BytesMut};
use tokio_util::codec::{AnyDelimiterCodec, AnyDelimiterCodecError, Decoder};

/// `\n`-delimited, lossily decoded text lines with a length cap.
#[derive(Debug, Clone)]
pub struct LossyLinesCodec {
    inner: AnyDelimiterCodec,
}

impl LossyLinesCodec {
    /// Lines longer than `max_length` bytes, `\n` excluded, fail
    /// with `MaxChunkLengthExceeded`.
    pub fn new_with_max_length(max_length: usize) -> Self {
        Self {
            inner: AnyDelimiterCodec::new_with_max_length(
                vec![b'\n'],
                Vec::new(),
                max_length,
            ),
        }
    }
}

fn to_line(chunk: Bytes) -> String {
    let chunk = chunk.strip_suffix(b"\r").unwrap_or(&chunk[..]);
    String::from_utf8_lossy(chunk).into_owned()
}

impl Decoder for LossyLinesCodec {
    type Item = String;
    type Error = AnyDelimiterCodecError;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<String>, Self::Error> {
        Ok(self.inner.decode(buf)?.map(to_line))
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<String>, Self::Error> {
        Ok(self.inner.decode_eof(buf)?.map(to_line))
    }
}
