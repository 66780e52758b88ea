use std::io;

use thiserror::Error;

mod read_at;

pub use read_at::ReadAt;

#[derive(Debug, Error)]
pub enum PopError {
    /// The window holds no bytes anymore - the input is exhausted.
    #[error("window is empty")]
    EmptyWindow,
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// A sliding window over a [`ReadAt`] source.
///
/// The window can either jump forward by a whole window ([`advance_window`](Self::advance_window))
/// or slide by a single byte ([`pop_and_shift`](Self::pop_and_shift)).
///
/// A single buffer two windows wide backs the reader: the current window lives somewhere inside
/// it, followed by bytes that were read ahead. Sliding moves the window start forward and the
/// live bytes are compacted to the front only when the window would run off the buffer's end,
/// so single byte shifts neither copy the whole window nor issue a read per byte.
pub struct WindowedReader<R> {
    source: R,
    window_size: usize,
    buffer: Vec<u8>,
    // index of the window's first byte inside `buffer`
    start: usize,
    // bytes in the current window
    len: usize,
    // end of the valid bytes in `buffer`, window included
    filled: usize,
    // source offset of `buffer[start]`
    offset: u64,
    source_exhausted: bool,
    eof: bool,
}

impl<R: ReadAt> WindowedReader<R> {
    /// `window_size` must be at least 1, see [`crate::config::Config`].
    pub fn new(source: R, window_size: usize) -> Self {
        debug_assert!(window_size > 0);
        Self {
            source,
            window_size,
            buffer: vec![0; window_size.saturating_mul(2)],
            start: 0,
            len: 0,
            filled: 0,
            offset: 0,
            source_exhausted: false,
            eof: false,
        }
    }

    /// Moves to the window right after the current one and fills it with up to `window_size`
    /// bytes. Returns how many bytes the new window holds - 0 once the input is exhausted.
    pub fn advance_window(&mut self) -> io::Result<usize> {
        self.offset += self.len as u64;
        self.start += self.len;
        self.len = 0;

        self.fill(self.window_size)?;
        self.len = (self.filled - self.start).min(self.window_size);
        if self.len < self.window_size {
            self.eof = true;
        }
        Ok(self.len)
    }

    /// Drops the oldest byte of the window and appends the next byte of the input, if there is
    /// one. Once the input is exhausted the window shrinks by one byte per call.
    pub fn pop_and_shift(&mut self) -> Result<u8, PopError> {
        if self.len == 0 {
            return Err(PopError::EmptyWindow);
        }
        let popped = self.buffer[self.start];
        self.start += 1;
        self.offset += 1;
        self.len -= 1;

        self.fill(self.len + 1)?;
        if self.filled - self.start > self.len {
            self.len += 1;
        } else {
            self.eof = true;
        }
        Ok(popped)
    }

    /// The current window, never longer than [`window_len`](Self::window_len).
    pub fn window(&self) -> &[u8] {
        &self.buffer[self.start..self.start + self.len]
    }

    pub fn window_len(&self) -> usize {
        self.len
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// Source offset of the window's first byte.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Whether a read has come up short - no bytes exist beyond the current window.
    pub fn is_eof(&self) -> bool {
        self.eof
    }

    // Makes sure at least `wanted` bytes are buffered from `start` on, unless the source ends
    // first.
    fn fill(&mut self, wanted: usize) -> io::Result<()> {
        if self.filled - self.start >= wanted || self.source_exhausted {
            return Ok(());
        }
        if self.start + wanted > self.buffer.len() {
            self.buffer.copy_within(self.start..self.filled, 0);
            self.filled -= self.start;
            self.start = 0;
        }

        while self.filled - self.start < wanted {
            let at = self.offset + (self.filled - self.start) as u64;
            match self.source.read_at(&mut self.buffer[self.filled..], at) {
                Ok(0) => {
                    self.source_exhausted = true;
                    break;
                }
                Ok(n) => self.filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}
