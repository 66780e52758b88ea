use std::sync::mpsc::SyncSender;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::rolling_checksum::RollingChecksum;
use crate::strong_hash::{Digest, StrongHash};
use crate::windowed_reader::{ReadAt, WindowedReader};

/// Size of one serialized [`ChecksumBundle`].
pub const BUNDLE_SIZE: usize = 4 + crate::strong_hash::DIGEST_LEN;

/// Weak checksum and strong hash of one block of the old file.
///
/// Serialized as the big-endian weak checksum followed by the raw strong hash, with no framing.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChecksumBundle {
    pub weak: u32,
    pub strong: Digest,
}

impl ChecksumBundle {
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(bincode2::config().big_endian().serialize(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(bincode2::config().big_endian().deserialize(bytes)?)
    }
}

/// Walks `reader` one whole window at a time and sends a bundle per window, in file order.
/// The last bundle covers whatever is left when the input is not a multiple of the window size.
///
/// Returns the number of bundles sent. `bundles` is dropped on return, which is what tells the
/// receiving side the signature is complete.
pub fn generate_signature<R, S, Src>(
    mut reader: WindowedReader<Src>,
    bundles: SyncSender<ChecksumBundle>,
) -> Result<usize>
where
    R: RollingChecksum,
    S: StrongHash,
    Src: ReadAt,
{
    let mut block_count = 0;
    while reader.advance_window()? > 0 {
        let window = reader.window();
        let bundle = ChecksumBundle {
            weak: R::from_scratch(window).checksum(),
            strong: S::hash(window),
        };
        debug!(
            "block {} at offset {} ({} bytes): weak checksum {:#010x}",
            block_count,
            reader.offset(),
            window.len(),
            bundle.weak
        );
        bundles
            .send(bundle)
            .map_err(|_| Error::ChannelClosed("signature writer"))?;
        block_count += 1;

        if reader.is_eof() {
            break;
        }
    }

    info!(
        "signature of {} bytes: {} blocks of up to {} bytes",
        reader.offset() + reader.window_len() as u64,
        block_count,
        reader.window_size()
    );
    Ok(block_count)
}
