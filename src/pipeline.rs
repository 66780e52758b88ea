//! End to end runs of the three phases.
//!
//! Every phase is a chain of stages running on their own scoped threads, connected by bounded
//! channels. A stage ends when its input channel is closed and drained, and closes its output
//! channel by dropping the sender when it returns, successfully or not. The last stage, the one
//! writing the output, runs on the calling thread.
//!
//! When several stages fail, the error of the stage closest to the output wins: an upstream
//! stage only fails with [`Error::ChannelClosed`] because its consumer gave up first.

use std::io::{Read, Write};
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::thread::{self, ScopedJoinHandle};

use log::info;

use crate::config::Config;
use crate::delta_codec::DeltaReader;
use crate::delta_generation::{generate_delta, DeltaChunk, DeltaStats};
use crate::error::{Error, Result};
use crate::patch::apply_patch;
use crate::rolling_checksum::rolling_sum::RollingSum;
use crate::rolling_checksum::RollingChecksum;
use crate::signature_generation::{generate_signature, ChecksumBundle, BUNDLE_SIZE};
use crate::signature_index::{SignatureIndex, SignatureLookup};
use crate::strong_hash::md4::Md4Sum;
use crate::strong_hash::md5::Md5Sum;
use crate::strong_hash::{StrongHash, StrongHashKind};
use crate::windowed_reader::{ReadAt, WindowedReader};

/// Writes the signature of `old` to `out`. Returns the number of blocks.
pub fn signature_flow<Src, W>(config: &Config, old: Src, out: W) -> Result<usize>
where
    Src: ReadAt + Send,
    W: Write,
{
    match config.strong_hash() {
        StrongHashKind::Md4 => signature_flow_with::<RollingSum, Md4Sum, _, _>(config, old, out),
        StrongHashKind::Md5 => signature_flow_with::<RollingSum, Md5Sum, _, _>(config, old, out),
    }
}

pub fn signature_flow_with<R, S, Src, W>(config: &Config, old: Src, mut out: W) -> Result<usize>
where
    R: RollingChecksum,
    S: StrongHash,
    Src: ReadAt + Send,
    W: Write,
{
    let reader = WindowedReader::new(old, config.window_size());
    let (bundles, received) = mpsc::sync_channel(config.channel_capacity());

    thread::scope(|scope| {
        let producer = scope.spawn(move || generate_signature::<R, S, _>(reader, bundles));
        let written = write_bundles(received, &mut out);
        let produced = join(producer, "signature");
        written?;
        produced
    })
}

/// Writes the delta between the old file described by `signature` and `new` to `out`.
pub fn delta_flow<Src, W>(config: &Config, signature: &[u8], new: Src, out: W) -> Result<DeltaStats>
where
    Src: ReadAt + Send,
    W: Write,
{
    match config.strong_hash() {
        StrongHashKind::Md4 => {
            delta_flow_with::<RollingSum, Md4Sum, _, _>(config, signature, new, out)
        }
        StrongHashKind::Md5 => {
            delta_flow_with::<RollingSum, Md5Sum, _, _>(config, signature, new, out)
        }
    }
}

pub fn delta_flow_with<R, S, Src, W>(
    config: &Config,
    signature: &[u8],
    new: Src,
    mut out: W,
) -> Result<DeltaStats>
where
    R: RollingChecksum,
    S: StrongHash,
    Src: ReadAt + Send,
    W: Write,
{
    let index = SignatureIndex::from_bytes(signature)?;
    info!("signature describes {} blocks", index.block_count());

    let reader = WindowedReader::new(new, config.window_size());
    let (chunks, received) = mpsc::sync_channel(config.channel_capacity());

    thread::scope(|scope| {
        let index = &index;
        let producer = scope.spawn(move || generate_delta::<R, S, _, _>(index, reader, chunks));
        let written = write_chunks(received, &mut out);
        let produced = join(producer, "delta");
        let written = written?;
        info!("delta is {} bytes", written);
        produced
    })
}

/// Rebuilds the new file from `basis` and `delta` into `out`. Returns the number of bytes
/// written.
///
/// Nothing written to `out` is meaningful when this fails.
pub fn patch_flow<Src, D, W>(config: &Config, basis: &Src, delta: D, mut out: W) -> Result<u64>
where
    Src: ReadAt + Sync + ?Sized,
    D: Read + Send,
    W: Write,
{
    let (chunks, received_chunks) = mpsc::sync_channel(config.channel_capacity());
    let (bytes, received_bytes) = mpsc::sync_channel(config.channel_capacity());

    thread::scope(|scope| {
        let decoder = scope.spawn(move || send_chunks(DeltaReader::new(delta), chunks));
        let engine = scope.spawn(move || apply_patch(received_chunks, basis, bytes));
        let written = write_bytes(received_bytes, &mut out);

        let patched = join(engine, "patch");
        let decoded = join(decoder, "delta reader");
        let written = written?;
        let patched = patched?;
        decoded?;
        debug_assert_eq!(written, patched);
        Ok(written)
    })
}

fn join<T>(handle: ScopedJoinHandle<'_, Result<T>>, stage: &'static str) -> Result<T> {
    handle.join().map_err(|_| Error::WorkerPanicked(stage))?
}

fn send_chunks<R: Read>(reader: DeltaReader<R>, chunks: SyncSender<DeltaChunk>) -> Result<usize> {
    let mut count = 0;
    for chunk in reader {
        chunks
            .send(chunk?)
            .map_err(|_| Error::ChannelClosed("patch"))?;
        count += 1;
    }
    Ok(count)
}

fn write_bundles<W: Write>(bundles: Receiver<ChecksumBundle>, out: &mut W) -> Result<u64> {
    let mut written = 0;
    for bundle in bundles {
        out.write_all(&bundle.to_bytes()?)?;
        written += BUNDLE_SIZE as u64;
    }
    out.flush()?;
    Ok(written)
}

fn write_chunks<W: Write>(chunks: Receiver<DeltaChunk>, out: &mut W) -> Result<u64> {
    let mut written = 0;
    for chunk in chunks {
        chunk.encode(out)?;
        written += chunk.encoded_len() as u64;
    }
    out.flush()?;
    Ok(written)
}

fn write_bytes<W: Write>(pieces: Receiver<Vec<u8>>, out: &mut W) -> Result<u64> {
    let mut written = 0;
    for piece in pieces {
        out.write_all(&piece)?;
        written += piece.len() as u64;
    }
    out.flush()?;
    Ok(written)
}
