use std::fmt::Debug;

pub mod md4;
pub mod md5;

/// Length of every strong hash stored in a signature.
pub const DIGEST_LEN: usize = 16;

pub type Digest = [u8; DIGEST_LEN];

pub trait StrongHash {
    fn hash(data: &[u8]) -> Digest;
}

/// Names the [`StrongHash`] implementations the binary can pick from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum StrongHashKind {
    #[default]
    Md4,
    Md5,
}
