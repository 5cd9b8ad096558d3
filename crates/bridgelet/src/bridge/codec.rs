//! Newline-delimited JSON codec for the bridge streams.
//!
//! One JSON object per line, in both directions. Decode failures are
//! per-line: a line that is not valid JSON (or not the expected record
//! shape) surfaces as [`DecodedLine::Malformed`] carrying the raw bytes, so
//! the consumer can report it and keep reading. Only transport-level I/O
//! errors terminate the stream.

use std::io;
use std::marker::PhantomData;

use serde::{Serialize, de::DeserializeOwned};
use tokio_util::bytes::{BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

/// Codec that frames messages by newline and serializes with JSON.
pub struct NdJsonCodec<T> {
    // Index into the buffer where the scan for the next newline resumes,
    // so partial reads are not rescanned from the start.
    next_index: usize,
    _phantom: PhantomData<T>,
}

impl<T> NdJsonCodec<T> {
    pub fn new() -> Self {
        Self {
            next_index: 0,
            _phantom: PhantomData,
        }
    }

    fn parse_line(&self, line: &[u8]) -> DecodedLine<T>
    where
        T: DeserializeOwned,
    {
        match serde_json::from_slice(line) {
            Ok(record) => DecodedLine::Record(record),
            Err(e) => DecodedLine::Malformed {
                error: e.to_string(),
                raw: line.to_vec(),
            },
        }
    }
}

impl<T> Default for NdJsonCodec<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// One framed line, decoded or not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedLine<T> {
    Record(T),
    /// The line did not decode; `raw` is the payload without the newline.
    Malformed { error: String, raw: Vec<u8> },
}

fn trim_line(line: &[u8]) -> &[u8] {
    line.strip_suffix(b"\r").unwrap_or(line)
}

impl<T: DeserializeOwned> Decoder for NdJsonCodec<T> {
    type Item = DecodedLine<T>;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let Some(offset) = src[self.next_index..].iter().position(|b| *b == b'\n') else {
            self.next_index = src.len();
            return Ok(None);
        };

        let newline_index = self.next_index + offset;
        self.next_index = 0;
        let line = src.split_to(newline_index + 1);
        let line = trim_line(&line[..line.len() - 1]);
        Ok(Some(self.parse_line(line)))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(frame) = self.decode(src)? {
            return Ok(Some(frame));
        }
        if src.is_empty() {
            return Ok(None);
        }

        // A final line without a trailing newline still counts.
        let line = src.split_to(src.len());
        self.next_index = 0;
        Ok(Some(self.parse_line(trim_line(&line))))
    }
}

impl<T: Serialize> Encoder<T> for NdJsonCodec<T> {
    type Error = io::Error;

    fn encode(&mut self, item: T, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let json =
            serde_json::to_vec(&item).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        dst.reserve(json.len() + 1);
        dst.extend_from_slice(&json);
        dst.put_u8(b'\n');
        Ok(())
    }
}
