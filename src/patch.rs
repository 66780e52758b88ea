use std::io;
use std::sync::mpsc::SyncSender;

use log::{debug, info};

use crate::delta_generation::{DeltaChunk, MatchRange};
use crate::error::{Error, Result};
use crate::windowed_reader::ReadAt;

/// Longest piece of a match sent downstream in one message. Longer matches are split so a
/// single range never has to fit in memory at once.
pub const MAX_COPY_LEN: u64 = 1 << 20;

/// Rebuilds the new file from `chunks`, copying matched ranges out of `basis`.
///
/// The bytes go to `out` strictly in chunk order. Returns the number of bytes sent. Any failure
/// stops the patch: whatever was already sent is not a valid file.
pub fn apply_patch<I, Src>(chunks: I, basis: &Src, out: SyncSender<Vec<u8>>) -> Result<u64>
where
    I: IntoIterator<Item = DeltaChunk>,
    Src: ReadAt + ?Sized,
{
    let mut written = 0u64;
    let mut chunk_count = 0usize;
    for chunk in chunks {
        chunk_count += 1;
        match chunk {
            DeltaChunk::Match(range) => {
                debug!("copying [{}, {}) from the basis", range.from, range.to);
                written += copy_range(basis, range, &out)?;
            }
            DeltaChunk::Literal(bytes) => {
                debug!("inserting {} literal bytes", bytes.len());
                written += bytes.len() as u64;
                if !bytes.is_empty() {
                    send(&out, bytes)?;
                }
            }
        }
    }
    info!("patch: {} chunks produced {} bytes", chunk_count, written);
    Ok(written)
}

fn copy_range<Src>(basis: &Src, range: MatchRange, out: &SyncSender<Vec<u8>>) -> Result<u64>
where
    Src: ReadAt + ?Sized,
{
    if range.is_empty() {
        return Err(Error::InvalidRange {
            from: range.from,
            to: range.to,
        });
    }
    let mut at = range.from;
    while at < range.to {
        let len = (range.to - at).min(MAX_COPY_LEN);
        let mut piece = vec![0; len as usize];
        basis.read_exact_at(&mut piece, at).map_err(|e| match e.kind() {
            io::ErrorKind::UnexpectedEof => Error::RangeOutOfBounds {
                from: range.from,
                to: range.to,
            },
            _ => Error::Io(e),
        })?;
        send(out, piece)?;
        at += len;
    }
    Ok(range.len())
}

fn send(out: &SyncSender<Vec<u8>>, bytes: Vec<u8>) -> Result<()> {
    out.send(bytes).map_err(|_| Error::ChannelClosed("patch writer"))
}
