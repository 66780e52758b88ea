use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O failure: {0}")]
    Io(#[from] io::Error),

    #[error("window size must be at least one byte")]
    ZeroWindowSize,

    #[error("window size {size} is larger than the maximum of {max} bytes")]
    WindowTooLarge { size: usize, max: usize },

    #[error("channel capacity must be at least one message")]
    ZeroChannelCapacity,

    #[error("signature is {len} bytes long, which is not a multiple of the 20-byte bundle size")]
    MalformedSignature { len: usize },

    #[error("checksum bundle encoding failed: {0}")]
    Bundle(#[from] bincode2::Error),

    #[error("delta chunk truncated: expected {expected} bytes of {what}")]
    TruncatedChunk { what: &'static str, expected: u64 },

    #[error("match range [{from}, {to}) is empty or reversed")]
    InvalidRange { from: u64, to: u64 },

    #[error("match range [{from}, {to}) reaches past the end of the basis file")]
    RangeOutOfBounds { from: u64, to: u64 },

    #[error("the {0} stage stopped receiving before the stream ended")]
    ChannelClosed(&'static str),

    #[error("the {0} stage panicked")]
    WorkerPanicked(&'static str),
}

pub type Result<T> = std::result::Result<T, Error>;
