//! rsync style binary deltas.
//!
//! Three phases, each usable on its own:
//!
//! 1. [`pipeline::signature_flow`] splits the old file into blocks and records a weak rolling
//!    checksum and a strong hash for each.
//! 2. [`pipeline::delta_flow`] slides a window over the new file looking for those blocks and
//!    describes the new file as ranges of the old one plus literal bytes.
//! 3. [`pipeline::patch_flow`] replays the delta against the old file.
//!
//! Only the signature needs to travel to whoever holds the new file.

pub mod config;
pub mod delta_codec;
pub mod delta_generation;
pub mod error;
pub mod patch;
pub mod pipeline;
pub mod signature_generation;
pub mod signature_index;
pub mod windowed_reader;

pub mod rolling_checksum;
pub mod strong_hash;

pub use config::Config;
pub use error::{Error, Result};

/// Position of a block in the old file. Block `i` starts at byte `i * window_size`.
pub type BlockIndex = usize;
