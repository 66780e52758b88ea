use crate::strong_hash::{Digest, StrongHash};

pub struct Md5Sum {}

impl StrongHash for Md5Sum {
    fn hash(data: &[u8]) -> Digest {
        md5::compute(data).into()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_md5_of_known_input() {
        assert_eq!(
            Md5Sum::hash(b"abc"),
            [
                0x90, 0x01, 0x50, 0x98, 0x3c, 0xd2, 0x4f, 0xb0, 0xd6, 0x96, 0x3f, 0x7d, 0x28, 0xe1,
                0x7f, 0x72
            ]
        );
    }
}
