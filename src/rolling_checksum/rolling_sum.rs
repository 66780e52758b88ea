use super::{RollingChecksum, RollingState};

/// rsync style weak checksum with plain 32 bit accumulators.
///
/// Unlike the textbook rsum, `a` and `b` are never truncated to 16 bits, so `b` bleeds into the
/// upper half together with `a`. Existing signature files depend on this exact arithmetic.
pub struct RollingSum {}

impl RollingChecksum for RollingSum {
    fn from_scratch(window: &[u8]) -> RollingState {
        checksum_from_scratch(window).1
    }

    fn from_previous(
        window: &[u8],
        removed: u8,
        window_size: usize,
        previous: RollingState,
    ) -> RollingState {
        checksum_from_previous(window, removed, window_size, previous).1
    }
}

pub fn checksum_from_scratch(window: &[u8]) -> (u32, RollingState) {
    let n = window.len();
    let mut state = RollingState::default();
    for (i, &byte) in window.iter().enumerate() {
        let byte = u32::from(byte);
        state.a = state.a.wrapping_add(byte);
        state.b = state.b.wrapping_add(((n - i) as u32).wrapping_mul(byte));
    }
    (state.checksum(), state)
}

pub fn checksum_from_previous(
    window: &[u8],
    removed: u8,
    window_size: usize,
    previous: RollingState,
) -> (u32, RollingState) {
    let removed = u32::from(removed);
    let n = window.len() as u32;

    let state = match window.last() {
        Some(&appended) if window.len() >= window_size => {
            let a = previous
                .a
                .wrapping_sub(removed)
                .wrapping_add(u32::from(appended));
            RollingState {
                a,
                b: previous.b.wrapping_sub(n.wrapping_mul(removed)).wrapping_add(a),
            }
        }
        // the tail of the input - nothing got appended
        _ => RollingState {
            a: previous.a.wrapping_sub(removed),
            b: previous
                .b
                .wrapping_sub(n.wrapping_add(1).wrapping_mul(removed)),
        },
    };
    (state.checksum(), state)
}
