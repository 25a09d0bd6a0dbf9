//! Track allocation counters for a [`Heap`].
//!
//! All byte counts are block sizes, tags included.

use crate::source::Source;

use super::Heap;

/// Allocation and arena statistics.
///
/// The arena's pad word, prologue and epilogue are never counted as free or
/// allocated, so `claimed_bytes` always exceeds the two by [`Counters::overhead_bytes`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Counters {
    /// Blocks currently handed out.
    pub allocation_count: usize,
    /// Blocks handed out since the last `initialize`.
    pub total_allocation_count: u64,

    /// Bytes in blocks currently handed out.
    pub allocated_bytes: usize,
    /// Bytes in every block handed out since the last `initialize`.
    pub total_allocated_bytes: u64,

    /// Bytes sitting on the free lists.
    pub available_bytes: usize,
    /// Blocks sitting on the free lists.
    pub fragment_count: usize,

    /// Successful `sbrk` extensions, the one made by `initialize` included.
    pub grow_count: usize,
    /// Current arena size, as reported by the source.
    pub claimed_bytes: usize,
}

impl Counters {
    /// All zeroes.
    pub const fn new() -> Self {
        Self {
            allocation_count: 0,
            total_allocation_count: 0,
            allocated_bytes: 0,
            total_allocated_bytes: 0,
            available_bytes: 0,
            fragment_count: 0,
            grow_count: 0,
            claimed_bytes: 0,
        }
    }

    /// Bytes used by the pad word, prologue and epilogue. Constant once initialized.
    pub const fn overhead_bytes(&self) -> usize {
        self.claimed_bytes - self.available_bytes - self.allocated_bytes
    }

    /// Bytes in blocks that were handed out and have since been released.
    pub const fn total_freed_bytes(&self) -> u64 {
        self.total_allocated_bytes - self.allocated_bytes as u64
    }

    pub(crate) fn account_free_block(&mut self, size: usize) {
        self.available_bytes += size;
        self.fragment_count += 1;
    }
    pub(crate) fn account_taken_block(&mut self, size: usize) {
        self.available_bytes -= size;
        self.fragment_count -= 1;
    }

    pub(crate) fn account_alloc(&mut self, block_size: usize) {
        self.allocation_count += 1;
        self.allocated_bytes += block_size;

        self.total_allocation_count += 1;
        self.total_allocated_bytes += block_size as u64;
    }

    pub(crate) fn account_dealloc(&mut self, block_size: usize) {
        self.allocation_count -= 1;
        self.allocated_bytes -= block_size;
    }

    pub(crate) fn account_claim(&mut self, size: usize) {
        self.claimed_bytes += size;
    }

    pub(crate) fn account_grow(&mut self, size: usize) {
        self.grow_count += 1;
        self.claimed_bytes += size;
    }
}

impl<S: Source> Heap<S> {
    /// The heap's statistics.
    pub fn counters(&self) -> &Counters {
        &self.counters
    }
}
