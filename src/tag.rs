//! A `Tag` is a block size with the allocated flag in the least significant bit.
//!
//! Sizes are always multiples of [`ALIGNMENT`](crate::ALIGNMENT), so the
//! low four bits are free to hold flags. Only bit zero is used.

use crate::{ptr_utils, ALIGNMENT};

/// Header/footer word of a block.
#[derive(Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub struct Tag(pub u64);

impl core::fmt::Debug for Tag {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Tag")
            .field("size", &self.size())
            .field("is_allocated", &self.is_allocated())
            .finish()
    }
}

impl Tag {
    pub const ALLOCATED_FLAG: u64 = 1 << 0;
    const FLAG_MASK: u64 = ALIGNMENT as u64 - 1;

    /// The zero-sized allocated tag that terminates the arena.
    pub const EPILOGUE: Tag = Tag(Self::ALLOCATED_FLAG);

    #[inline]
    pub fn new(size: usize, is_allocated: bool) -> Self {
        debug_assert!(ptr_utils::is_aligned(size), "unaligned block size {}", size);

        Self(size as u64 | if is_allocated { Self::ALLOCATED_FLAG } else { 0 })
    }

    #[inline]
    pub fn size(self) -> usize {
        (self.0 & !Self::FLAG_MASK) as usize
    }

    #[inline]
    pub fn is_allocated(self) -> bool {
        self.0 & Self::ALLOCATED_FLAG != 0
    }

    #[inline]
    pub fn is_epilogue(self) -> bool {
        self.size() == 0 && self.is_allocated()
    }

    /// Returns the same size with the allocated flag flipped to `is_allocated`.
    #[inline]
    pub fn with_allocated(self, is_allocated: bool) -> Self {
        Self::new(self.size(), is_allocated)
    }
}
