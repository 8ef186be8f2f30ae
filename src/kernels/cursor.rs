//! A bounds-checked reader over an encoded sample stream.
//!
//! Every read either returns exactly the bytes requested or a `CorruptStream`
//! error carrying the offset at which the read started. Nothing here panics.

use std::io::Cursor;

use crate::error::{Result, TimelineError};

pub struct ByteCursor<'a> {
    inner: Cursor<&'a [u8]>,
}

impl<'a> ByteCursor<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self {
            inner: Cursor::new(bytes),
        }
    }

    /// Offset of the next unread byte.
    pub fn position(&self) -> usize {
        self.inner.position() as usize
    }

    pub fn remaining(&self) -> usize {
        self.inner.get_ref().len().saturating_sub(self.position())
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining() == 0
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        let [byte] = self.read_array::<1>()?;
        Ok(byte)
    }

    /// Reads exactly `N` bytes.
    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let pos = self.position();
        let bytes: &'a [u8] = *self.inner.get_ref();
        let slice = pos
            .checked_add(N)
            .and_then(|end| bytes.get(pos..end))
            .ok_or_else(|| {
                TimelineError::corrupt(
                    pos,
                    format!(
                        "truncated stream: needed {} byte(s), {} remain",
                        N,
                        self.remaining()
                    ),
                )
            })?;

        let mut out = [0u8; N];
        out.copy_from_slice(slice);
        self.inner.set_position((pos + N) as u64);
        Ok(out)
    }
}
