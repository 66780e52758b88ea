//! Binary layout of a delta.
//!
//! A delta is a plain sequence of records, each starting with a one byte tag:
//!
//! | tag | payload                                                  |
//! |-----|----------------------------------------------------------|
//! | `1` | big-endian `u64` start, big-endian `u64` end of a match   |
//! | `0` | big-endian `u64` length `L`, then `L` literal bytes       |
//!
//! The delta ends with its input. A record with any other tag also ends it.

use std::io::{self, Read, Write};

use log::warn;

use crate::delta_generation::{DeltaChunk, MatchRange};
use crate::error::{Error, Result};

pub const LITERAL_TAG: u8 = 0;
pub const MATCH_TAG: u8 = 1;

impl DeltaChunk {
    pub fn encode<W: Write>(&self, out: &mut W) -> io::Result<()> {
        match self {
            DeltaChunk::Match(range) => {
                out.write_all(&[MATCH_TAG])?;
                out.write_all(&range.from.to_be_bytes())?;
                out.write_all(&range.to.to_be_bytes())
            }
            DeltaChunk::Literal(bytes) => {
                out.write_all(&[LITERAL_TAG])?;
                out.write_all(&(bytes.len() as u64).to_be_bytes())?;
                out.write_all(bytes)
            }
        }
    }

    /// Number of bytes [`encode`](Self::encode) writes.
    pub fn encoded_len(&self) -> usize {
        match self {
            DeltaChunk::Match(_) => 1 + 8 + 8,
            DeltaChunk::Literal(bytes) => 1 + 8 + bytes.len(),
        }
    }
}

/// Decodes chunks from a delta, one record at a time.
pub struct DeltaReader<R> {
    input: R,
    finished: bool,
}

impl<R: Read> DeltaReader<R> {
    pub fn new(input: R) -> Self {
        Self {
            input,
            finished: false,
        }
    }

    /// The next chunk, or `None` once the delta has ended.
    pub fn read_chunk(&mut self) -> Result<Option<DeltaChunk>> {
        if self.finished {
            return Ok(None);
        }
        let mut tag = [0u8; 1];
        loop {
            match self.input.read(&mut tag) {
                Ok(0) => {
                    self.finished = true;
                    return Ok(None);
                }
                Ok(_) => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }

        match tag[0] {
            MATCH_TAG => {
                let from = self.read_u64("match start")?;
                let to = self.read_u64("match end")?;
                if to <= from {
                    return Err(Error::InvalidRange { from, to });
                }
                Ok(Some(DeltaChunk::Match(MatchRange { from, to })))
            }
            LITERAL_TAG => {
                let len = self.read_u64("literal length")?;
                let mut bytes = Vec::new();
                // `take` keeps a bogus length from allocating more than the input holds
                (&mut self.input).take(len).read_to_end(&mut bytes)?;
                if (bytes.len() as u64) < len {
                    return Err(Error::TruncatedChunk {
                        what: "literal data",
                        expected: len,
                    });
                }
                Ok(Some(DeltaChunk::Literal(bytes)))
            }
            unknown => {
                warn!("delta record with unknown tag {:#04x}, treating it as the end of the delta", unknown);
                self.finished = true;
                Ok(None)
            }
        }
    }

    fn read_u64(&mut self, what: &'static str) -> Result<u64> {
        let mut bytes = [0u8; 8];
        match self.input.read_exact(&mut bytes) {
            Ok(()) => Ok(u64::from_be_bytes(bytes)),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                Err(Error::TruncatedChunk { what, expected: 8 })
            }
            Err(e) => Err(e.into()),
        }
    }
}

impl<R: Read> Iterator for DeltaReader<R> {
    type Item = Result<DeltaChunk>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.read_chunk() {
            Ok(chunk) => chunk.map(Ok),
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}
