//! Generic utilities for offset handling and sizing.

use crate::ALIGNMENT;

/// Aligns `n` up to the next `align_mask + 1`, or `None` on overflow.
///
/// `align_mask` must be a power of two minus one.
#[inline]
pub fn checked_align_up_by(n: usize, align_mask: usize) -> Option<usize> {
    debug_assert!((align_mask + 1).is_power_of_two());

    Some(n.checked_add(align_mask)? & !align_mask)
}

#[inline]
pub fn is_aligned(n: usize) -> bool {
    n & (ALIGNMENT - 1) == 0
}
