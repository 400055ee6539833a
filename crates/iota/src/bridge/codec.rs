//! Framed codec for worker communication.
//!
//! Uses LinesCodec for framing + serde_json for serialization.
//! Works over any AsyncRead/AsyncWrite (TCP streams in practice).

use std::io;
use std::marker::PhantomData;

use serde::{Serialize, de::DeserializeOwned};
use tokio_util::bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder, LinesCodec, LinesCodecError};

/// Upper bound on a single message line (arguments and results included).
pub const MAX_LINE_LENGTH: usize = 8 * 1024 * 1024;

/// Codec that frames messages as newline-terminated JSON.
///
/// Wraps LinesCodec and adds serde_json serialization.
pub struct JsonLinesCodec<T> {
    inner: LinesCodec,
    _phantom: PhantomData<T>,
}

impl<T> Default for JsonLinesCodec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> JsonLinesCodec<T> {
    pub fn new() -> Self {
        Self {
            inner: LinesCodec::new_with_max_length(MAX_LINE_LENGTH),
            _phantom: PhantomData,
        }
    }
}

fn lines_error(e: LinesCodecError) -> io::Error {
    match e {
        LinesCodecError::Io(e) => e,
        LinesCodecError::MaxLineLengthExceeded => {
            io::Error::new(io::ErrorKind::InvalidData, "message exceeds max line length")
        }
    }
}

fn parse_line<T: DeserializeOwned>(line: Option<String>) -> io::Result<Option<T>> {
    match line {
        Some(line) if line.trim().is_empty() => Ok(None),
        Some(line) => {
            let item = serde_json::from_str(&line)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            Ok(Some(item))
        }
        None => Ok(None),
    }
}

impl<T: DeserializeOwned> Decoder for JsonLinesCodec<T> {
    type Item = T;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            let line = self.inner.decode(src).map_err(lines_error)?;
            match line {
                // Blank keep-alive line: keep scanning the buffer.
                Some(ref l) if l.trim().is_empty() => continue,
                other => return parse_line(other),
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(src)? {
            Some(item) => Ok(Some(item)),
            None => parse_line(self.inner.decode_eof(src).map_err(lines_error)?),
        }
    }
}

impl<T: Serialize> Encoder<T> for JsonLinesCodec<T> {
    type Error = io::Error;

    fn encode(&mut self, item: T, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let json = serde_json::to_string(&item)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        tracing::trace!(json_size_bytes = json.len(), "Encoding frame");
        self.inner.encode(json, dst).map_err(lines_error)
    }
}
