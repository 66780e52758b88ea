use crate::error::{Error, Result};
use crate::strong_hash::StrongHashKind;

pub const DEFAULT_WINDOW_SIZE: usize = 5000;
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;
/// Largest accepted window. The windowed reader buffers two windows.
pub const MAX_WINDOW_SIZE: usize = 1 << 27;

/// Settings shared by the signature, delta and patch phases.
///
/// The signature and delta of one file must be computed with the same `window_size` and
/// `strong_hash` - nothing in the signature records them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    window_size: usize,
    channel_capacity: usize,
    strong_hash: StrongHashKind,
}

impl Config {
    pub fn new(window_size: usize, channel_capacity: usize, strong_hash: StrongHashKind) -> Result<Self> {
        if window_size == 0 {
            return Err(Error::ZeroWindowSize);
        }
        if window_size > MAX_WINDOW_SIZE {
            return Err(Error::WindowTooLarge {
                size: window_size,
                max: MAX_WINDOW_SIZE,
            });
        }
        if channel_capacity == 0 {
            return Err(Error::ZeroChannelCapacity);
        }
        Ok(Self { window_size, channel_capacity, strong_hash })
    }

    pub fn with_window_size(window_size: usize) -> Result<Self> {
        Self::new(window_size, DEFAULT_CHANNEL_CAPACITY, StrongHashKind::default())
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// How many messages may queue between two pipeline stages before the producer blocks.
    pub fn channel_capacity(&self) -> usize {
        self.channel_capacity
    }

    pub fn strong_hash(&self) -> StrongHashKind {
        self.strong_hash
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            window_size: DEFAULT_WINDOW_SIZE,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            strong_hash: StrongHashKind::default(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_zero_sizes_are_rejected() {
        assert!(matches!(Config::with_window_size(0), Err(Error::ZeroWindowSize)));
        assert!(matches!(
            Config::new(16, 0, StrongHashKind::Md5),
            Err(Error::ZeroChannelCapacity)
        ));
    }

    #[test]
    fn test_huge_window_is_rejected() {
        assert!(Config::with_window_size(MAX_WINDOW_SIZE).is_ok());
        assert!(matches!(
            Config::with_window_size(1 << 40),
            Err(Error::WindowTooLarge { size, max: MAX_WINDOW_SIZE }) if size == 1 << 40
        ));
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.window_size(), DEFAULT_WINDOW_SIZE);
        assert_eq!(config.strong_hash(), StrongHashKind::Md4);
        assert_eq!(Config::with_window_size(DEFAULT_WINDOW_SIZE).unwrap(), config);
    }
}
