pub mod rolling_sum;

/// The `(a, b)` partial sums behind a weak checksum.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RollingState {
    pub a: u32,
    pub b: u32,
}

impl RollingState {
    pub fn checksum(&self) -> u32 {
        self.b << 16 | self.a
    }
}

pub trait RollingChecksum {
    fn from_scratch(window: &[u8]) -> RollingState;

    /// Updates `previous` after the window slid by one byte: `removed` left the window and
    /// `window` is its new content. A `window` shorter than `window_size` means no byte was
    /// appended, the window just shrank.
    fn from_previous(
        window: &[u8],
        removed: u8,
        window_size: usize,
        previous: RollingState,
    ) -> RollingState;
}
