use md4::{Digest as _, Md4};

use crate::strong_hash::{Digest, StrongHash};

/// The default strong hash, matching existing rdiff style signature files.
pub struct Md4Sum {}

impl StrongHash for Md4Sum {
    fn hash(data: &[u8]) -> Digest {
        Md4::digest(data).into()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_md4_of_known_input() {
        // RFC 1320 test suite
        assert_eq!(
            Md4Sum::hash(b"abc"),
            [
                0xa4, 0x48, 0x01, 0x7a, 0xaf, 0x21, 0xd8, 0x52, 0x5f, 0xc1, 0x0a, 0xe8, 0x7a, 0xa6,
                0x72, 0x9d
            ]
        );
    }

    #[test]
    fn test_md4_of_empty_input() {
        assert_eq!(
            Md4Sum::hash(&[]),
            [
                0x31, 0xd6, 0xcf, 0xe0, 0xd1, 0x6a, 0xe9, 0x31, 0xb7, 0x3c, 0x59, 0xd7, 0xe0, 0xc0,
                0x89, 0xc0
            ]
        );
    }
}
