use std::collections::HashMap;

use log::debug;
use rayon::iter::ParallelIterator;
use rayon::slice::ParallelSlice;

use crate::error::{Error, Result};
use crate::signature_generation::{ChecksumBundle, BUNDLE_SIZE};
use crate::strong_hash::Digest;
use crate::BlockIndex;

/// Finds the block of the old file a window may be a copy of.
pub trait SignatureLookup {
    /// The block registered under `weak`, together with its strong hash. A hit is only a
    /// candidate: the caller still has to compare strong hashes.
    fn candidate(&self, weak: u32) -> Option<(BlockIndex, &Digest)>;

    /// Number of blocks the old file was split into.
    fn block_count(&self) -> usize;
}

/// Parsed signature of an old file.
///
/// Every weak checksum maps to a single block. When several blocks share a weak checksum the
/// last one wins, the others can never be matched.
#[derive(Debug, Default)]
pub struct SignatureIndex {
    checksum_to_block: HashMap<u32, BlockIndex>,
    hashes: Vec<Digest>,
}

impl SignatureIndex {
    pub fn from_bytes(signature: &[u8]) -> Result<Self> {
        if signature.len() % BUNDLE_SIZE != 0 {
            return Err(Error::MalformedSignature {
                len: signature.len(),
            });
        }

        // decoding is independent per bundle, only the insertion order matters
        let bundles = signature
            .par_chunks_exact(BUNDLE_SIZE)
            .map(ChecksumBundle::from_bytes)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::from_bundles(bundles))
    }

    pub fn from_bundles<I>(bundles: I) -> Self
    where
        I: IntoIterator<Item = ChecksumBundle>,
    {
        let bundles = bundles.into_iter();
        let mut index = Self {
            checksum_to_block: HashMap::with_capacity(bundles.size_hint().0),
            hashes: Vec::with_capacity(bundles.size_hint().0),
        };
        for (block, bundle) in bundles.enumerate() {
            if let Some(shadowed) = index.checksum_to_block.insert(bundle.weak, block) {
                debug!(
                    "block {} shadows block {} with the same weak checksum {:#010x}",
                    block, shadowed, bundle.weak
                );
            }
            index.hashes.push(bundle.strong);
        }
        index
    }

    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }
}

impl SignatureLookup for SignatureIndex {
    fn candidate(&self, weak: u32) -> Option<(BlockIndex, &Digest)> {
        let block = *self.checksum_to_block.get(&weak)?;
        self.hashes.get(block).map(|hash| (block, hash))
    }

    fn block_count(&self) -> usize {
        self.hashes.len()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn bundle(weak: u32, fill: u8) -> ChecksumBundle {
        ChecksumBundle {
            weak,
            strong: [fill; 16],
        }
    }

    #[test]
    fn test_from_bytes_keeps_block_order() {
        let mut signature = Vec::new();
        for (weak, fill) in [(7, 1), (8, 2), (9, 3)] {
            signature.extend(bundle(weak, fill).to_bytes().unwrap());
        }

        let index = SignatureIndex::from_bytes(&signature).unwrap();

        assert_eq!(index.block_count(), 3);
        assert_eq!(index.candidate(7), Some((0, &[1; 16])));
        assert_eq!(index.candidate(9), Some((2, &[3; 16])));
        assert_eq!(index.candidate(10), None);
    }

    #[test]
    fn test_from_bytes_rejects_partial_bundles() {
        let signature = [0u8; BUNDLE_SIZE + 3];
        assert!(matches!(
            SignatureIndex::from_bytes(&signature),
            Err(Error::MalformedSignature { len }) if len == BUNDLE_SIZE + 3
        ));
    }

    #[test]
    fn test_empty_signature() {
        let index = SignatureIndex::from_bytes(&[]).unwrap();
        assert!(index.is_empty());
        assert_eq!(index.candidate(0), None);
    }

    #[test]
    fn test_colliding_checksums_keep_last_block() {
        let index = SignatureIndex::from_bundles([bundle(5, 1), bundle(6, 2), bundle(5, 3)]);

        assert_eq!(index.block_count(), 3);
        assert_eq!(index.candidate(5), Some((2, &[3; 16])));
    }
}
