use std::mem;
use std::sync::mpsc::SyncSender;

use bitvec::vec::BitVec;
use log::{debug, info};

use crate::error::{Error, Result};
use crate::rolling_checksum::{RollingChecksum, RollingState};
use crate::signature_index::SignatureLookup;
use crate::strong_hash::StrongHash;
use crate::windowed_reader::{PopError, ReadAt, WindowedReader};
use crate::BlockIndex;

/// Bytes `[from, to)` of the old file, copied verbatim.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MatchRange {
    pub from: u64,
    pub to: u64,
}

impl MatchRange {
    pub fn len(&self) -> u64 {
        self.to - self.from
    }

    pub fn is_empty(&self) -> bool {
        self.to <= self.from
    }
}

/// One instruction of a delta.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DeltaChunk {
    /// Copy a range of the old file.
    Match(MatchRange),
    /// Insert these bytes.
    Literal(Vec<u8>),
}

/// What a delta run emitted, and which blocks of the old file it reused.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DeltaStats {
    pub match_chunks: usize,
    pub literal_chunks: usize,
    pub matched_bytes: u64,
    pub literal_bytes: u64,
    pub reused_blocks: BitVec,
}

impl DeltaStats {
    fn new(block_count: usize) -> Self {
        Self {
            reused_blocks: BitVec::repeat(false, block_count),
            ..Self::default()
        }
    }

    pub fn reused_block_count(&self) -> usize {
        self.reused_blocks.count_ones()
    }
}

// What the scanner is holding on to that has not been emitted yet. An open match and pending
// literal bytes never coexist: each is flushed before the other starts.
enum Pending {
    Scanning,
    Matched(MatchRange),
    Literal(Vec<u8>),
}

struct ChunkSender {
    chunks: SyncSender<DeltaChunk>,
    pending: Pending,
    stats: DeltaStats,
}

impl ChunkSender {
    fn send(&mut self, chunk: DeltaChunk) -> Result<()> {
        match &chunk {
            DeltaChunk::Match(range) => {
                debug!("match [{}, {})", range.from, range.to);
                self.stats.match_chunks += 1;
                self.stats.matched_bytes += range.len();
            }
            DeltaChunk::Literal(bytes) => {
                debug!("literal of {} bytes", bytes.len());
                self.stats.literal_chunks += 1;
                self.stats.literal_bytes += bytes.len() as u64;
            }
        }
        self.chunks
            .send(chunk)
            .map_err(|_| Error::ChannelClosed("delta writer"))
    }

    fn flush(&mut self) -> Result<()> {
        match mem::replace(&mut self.pending, Pending::Scanning) {
            Pending::Scanning => Ok(()),
            Pending::Matched(range) => self.send(DeltaChunk::Match(range)),
            Pending::Literal(bytes) => self.send(DeltaChunk::Literal(bytes)),
        }
    }

    // Extends the open match when `matched` continues it in the old file, otherwise emits
    // whatever is pending and opens a new match.
    fn matched(&mut self, matched: MatchRange) -> Result<()> {
        if let Pending::Matched(open) = &mut self.pending {
            if open.to == matched.from {
                open.to = matched.to;
                return Ok(());
            }
        }
        self.flush()?;
        self.pending = Pending::Matched(matched);
        Ok(())
    }

    fn unmatched(&mut self, byte: u8) -> Result<()> {
        if let Pending::Literal(bytes) = &mut self.pending {
            bytes.push(byte);
            return Ok(());
        }
        self.flush()?;
        self.pending = Pending::Literal(vec![byte]);
        Ok(())
    }
}

/// Scans `reader` for windows that are copies of blocks described by `signature` and sends the
/// new file as a series of chunks, in order.
///
/// Whole windows are tried first. While a window doesn't match, the scanner slides one byte at
/// a time, keeping the weak checksum up to date incrementally and collecting the bytes it slid
/// past as a literal. A weak checksum hit only counts once the strong hash of the window agrees.
/// After a match the scanner jumps a whole window ahead again. Matches of consecutive old
/// blocks are merged into a single range.
///
/// `chunks` is dropped on return, which tells the receiver the delta is complete.
pub fn generate_delta<R, S, L, Src>(
    signature: &L,
    mut reader: WindowedReader<Src>,
    chunks: SyncSender<DeltaChunk>,
) -> Result<DeltaStats>
where
    R: RollingChecksum,
    S: StrongHash,
    L: SignatureLookup,
    Src: ReadAt,
{
    let window_size = reader.window_size();
    let mut sender = ChunkSender {
        chunks,
        pending: Pending::Scanning,
        stats: DeltaStats::new(signature.block_count()),
    };
    // set while sliding byte by byte: the previous sums and the byte that just left the window
    let mut rolling: Option<(RollingState, u8)> = None;

    loop {
        let state = match rolling.take() {
            Some((previous, removed)) => {
                R::from_previous(reader.window(), removed, window_size, previous)
            }
            None => {
                if reader.advance_window()? == 0 {
                    sender.flush()?;
                    break;
                }
                R::from_scratch(reader.window())
            }
        };

        if let Some(block) = find_match::<S, L>(signature, state.checksum(), reader.window()) {
            let from = block as u64 * window_size as u64;
            sender.matched(MatchRange {
                from,
                to: from + reader.window_len() as u64,
            })?;
            sender.stats.reused_blocks.set(block, true);
            continue;
        }

        match reader.pop_and_shift() {
            Ok(byte) => {
                sender.unmatched(byte)?;
                rolling = Some((state, byte));
            }
            Err(PopError::EmptyWindow) => {
                sender.flush()?;
                break;
            }
            Err(PopError::Io(e)) => return Err(e.into()),
        }
    }

    let stats = sender.stats;
    info!(
        "delta: {} match chunks covering {} bytes, {} literal chunks with {} bytes; {} of {} old blocks reused",
        stats.match_chunks,
        stats.matched_bytes,
        stats.literal_chunks,
        stats.literal_bytes,
        stats.reused_block_count(),
        stats.reused_blocks.len()
    );
    Ok(stats)
}

fn find_match<S, L>(signature: &L, weak: u32, window: &[u8]) -> Option<BlockIndex>
where
    S: StrongHash,
    L: SignatureLookup,
{
    if window.is_empty() {
        return None;
    }
    let (block, strong) = signature.candidate(weak)?;
    if S::hash(window) == *strong {
        Some(block)
    } else {
        debug!("weak checksum {:#010x} hit block {} but strong hashes differ", weak, block);
        None
    }
}

#[cfg(test)]
mod test {
    use std::io;
    use std::sync::mpsc;
    use std::thread;

    use test_case::test_case;

    use crate::rolling_checksum::rolling_sum::RollingSum;
    use crate::signature_generation::ChecksumBundle;
    use crate::signature_index::SignatureIndex;
    use crate::strong_hash::md4::Md4Sum;
    use crate::strong_hash::Digest;

    use super::*;

    fn signature_of<S: StrongHash>(old: &[u8], window_size: usize) -> SignatureIndex {
        SignatureIndex::from_bundles(old.chunks(window_size).map(|block| ChecksumBundle {
            weak: RollingSum::from_scratch(block).checksum(),
            strong: S::hash(block),
        }))
    }

    fn delta_with<S: StrongHash>(
        signature: &SignatureIndex,
        new: &[u8],
        window_size: usize,
    ) -> (Vec<DeltaChunk>, DeltaStats) {
        let (sender, receiver) = mpsc::sync_channel(1);
        thread::scope(|scope| {
            let producer = scope.spawn(|| {
                generate_delta::<RollingSum, S, _, _>(
                    signature,
                    WindowedReader::new(new, window_size),
                    sender,
                )
            });
            let chunks = receiver.iter().collect();
            (chunks, producer.join().unwrap().unwrap())
        })
    }

    fn delta(old: &[u8], new: &[u8], window_size: usize) -> Vec<DeltaChunk> {
        delta_with::<Md4Sum>(&signature_of::<Md4Sum>(old, window_size), new, window_size).0
    }

    fn apply(old: &[u8], chunks: &[DeltaChunk]) -> Vec<u8> {
        let mut out = Vec::new();
        for chunk in chunks {
            match chunk {
                DeltaChunk::Match(range) => {
                    out.extend_from_slice(&old[range.from as usize..range.to as usize])
                }
                DeltaChunk::Literal(bytes) => out.extend_from_slice(bytes),
            }
        }
        out
    }

    fn literal(bytes: &[u8]) -> DeltaChunk {
        DeltaChunk::Literal(bytes.to_vec())
    }

    fn matched(from: u64, to: u64) -> DeltaChunk {
        DeltaChunk::Match(MatchRange { from, to })
    }

    #[test]
    fn test_identical_input_is_one_coalesced_match() {
        let content = b"abcdefghijk";
        let (chunks, stats) =
            delta_with::<Md4Sum>(&signature_of::<Md4Sum>(content, 3), content, 3);

        assert_eq!(chunks, vec![matched(0, 11)]);
        assert_eq!(stats.match_chunks, 1);
        assert_eq!(stats.literal_chunks, 0);
        assert_eq!(stats.matched_bytes, 11);
        assert_eq!(stats.reused_block_count(), 4);
    }

    #[test]
    fn test_empty_old_file_gives_one_literal() {
        assert_eq!(delta(b"", b"Imagine yo", 10), vec![literal(b"Imagine yo")]);
    }

    #[test]
    fn test_empty_new_file_gives_no_chunks() {
        assert!(delta(b"Imagine yo", b"", 10).is_empty());
    }

    #[test]
    fn test_literal_before_match_is_flushed_once() {
        let chunks = delta(b"abcdef", b"xyzabcdef", 3);
        assert_eq!(chunks, vec![literal(b"xyz"), matched(0, 6)]);
    }

    #[test]
    fn test_unmatched_tail_is_flushed_once() {
        let chunks = delta(b"abcdef", b"abcdef12345", 3);
        assert_eq!(chunks, vec![matched(0, 6), literal(b"12345")]);
    }

    #[test]
    fn test_non_contiguous_blocks_are_separate_matches() {
        let chunks = delta(b"abcdefghi", b"ghiabc", 3);
        assert_eq!(chunks, vec![matched(6, 9), matched(0, 3)]);
    }

    #[test]
    fn test_match_found_mid_window() {
        let old = b"0123456789";
        let chunks = delta(old, b"ab0123456789", 5);

        assert_eq!(chunks, vec![literal(b"ab"), matched(0, 10)]);
    }

    #[test]
    fn test_literal_between_matches() {
        let old = b"aaaabbbbcccc";
        let new = b"aaaaXbbbbcccc";
        let chunks = delta(old, new, 4);

        assert_eq!(chunks, vec![matched(0, 4), literal(b"X"), matched(4, 12)]);
        assert_eq!(apply(old, &chunks), new);
    }

    // hashes only the first byte, so every window starting with the same byte looks identical
    struct FirstByteHash {}

    impl StrongHash for FirstByteHash {
        fn hash(data: &[u8]) -> Digest {
            let mut digest = [0; 16];
            digest[0] = data.first().copied().unwrap_or_default();
            digest
        }
    }

    #[test]
    fn test_weak_hit_with_different_strong_hash_is_no_match() {
        let index = SignatureIndex::from_bundles([ChecksumBundle {
            weak: RollingSum::from_scratch(b"abc").checksum(),
            strong: Md4Sum::hash(b"not abc"),
        }]);
        let (chunks, stats) = delta_with::<Md4Sum>(&index, b"abc", 3);

        assert_eq!(chunks, vec![literal(b"abc")]);
        assert_eq!(stats.reused_block_count(), 0);
    }

    #[test]
    fn test_weak_collision_is_settled_by_strong_hash() {
        let old = b"abcd";
        let colliding = b"acae";
        assert_eq!(RollingSum::from_scratch(colliding), RollingSum::from_scratch(old));

        let (chunks, _) = delta_with::<Md4Sum>(&signature_of::<Md4Sum>(old, 4), colliding, 4);
        assert_eq!(chunks, vec![literal(colliding)]);

        // a strong hash that only looks at the first byte cannot tell the two apart
        let (chunks, _) =
            delta_with::<FirstByteHash>(&signature_of::<FirstByteHash>(old, 4), colliding, 4);
        assert_eq!(chunks, vec![matched(0, 4)]);
    }

    #[test_case(b"", b""; "when both are empty")]
    #[test_case(b"Imagine yo", b"Imagine yo"; "when file is exactly one window")]
    #[test_case(b"Imagine", b"Imagine"; "when file is shorter than one window")]
    #[test_case(b"Imagine you have two files, A and B", b"Imagine you wish to uphave two files, A and B"; "when content is inserted")]
    #[test_case(b"Iamaginfe u have two sasdf, Asda andd yosdfu", b"Imagfwne you have twoyou have tw||oyou"; "when content is completely different")]
    fn test_delta_reconstructs_new_file(old: &[u8], new: &[u8]) {
        let chunks = delta(old, new, 10);
        assert_eq!(apply(old, &chunks), new);
    }

    /// Serves `data` up to `limit` and fails every read past it.
    struct FailsPast<'a> {
        data: &'a [u8],
        limit: usize,
    }

    impl ReadAt for FailsPast<'_> {
        fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
            let offset = offset as usize;
            if offset >= self.limit {
                return Err(io::Error::new(io::ErrorKind::Other, "disk went away"));
            }
            let available = &self.data[offset..self.limit.min(self.data.len())];
            let n = available.len().min(buf.len());
            buf[..n].copy_from_slice(&available[..n]);
            Ok(n)
        }
    }

    #[test]
    fn test_read_failure_while_sliding_aborts_the_delta() {
        let source = FailsPast {
            data: b"abcdefghijkl",
            limit: 6,
        };
        let signature = signature_of::<Md4Sum>(b"", 4);
        let (sender, receiver) = mpsc::sync_channel(16);

        let result = generate_delta::<RollingSum, Md4Sum, _, _>(
            &signature,
            WindowedReader::new(source, 4),
            sender,
        );

        assert!(matches!(result, Err(Error::Io(_))));
        // the bytes slid past before the failure never make it out as a literal
        assert!(receiver.iter().next().is_none());
    }
}
