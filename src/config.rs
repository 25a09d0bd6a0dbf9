use crate::{ptr_utils, DEFAULT_GROWTH_SIZE};

/// Tunables of a [`Heap`](crate::Heap).
///
/// ```rust
/// use bintag::{Heap, HeapConfig, VecSource};
///
/// let config = HeapConfig::default()
///     .with_growth_size(64 << 10)
///     .with_back_placement_threshold(Some(100));
///
/// let heap = Heap::with_config(VecSource::new(), config).unwrap();
/// assert_eq!(heap.config().growth_size, 64 << 10);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeapConfig {
    /// Minimum number of bytes to extend the arena by when no free block fits,
    /// and the size of the first free block set up by
    /// [`initialize`](crate::Heap::initialize). Rounded up to a multiple of
    /// [`ALIGNMENT`](crate::ALIGNMENT). Default: 16 KiB.
    pub growth_size: usize,

    /// Carve allocations of at least this many bytes (block size) from the
    /// back of the free block they're placed in, leaving the remainder in
    /// front. Keeps large and small allocations apart under some workloads.
    /// Default: `None`, always carve from the front.
    pub back_placement_threshold: Option<usize>,
}

impl Default for HeapConfig {
    fn default() -> Self {
        Self { growth_size: DEFAULT_GROWTH_SIZE, back_placement_threshold: None }
    }
}

impl HeapConfig {
    /// Set [`growth_size`](Self::growth_size).
    pub fn with_growth_size(mut self, growth_size: usize) -> Self {
        self.growth_size = growth_size;
        self
    }

    /// Set [`back_placement_threshold`](Self::back_placement_threshold).
    pub fn with_back_placement_threshold(mut self, threshold: Option<usize>) -> Self {
        self.back_placement_threshold = threshold;
        self
    }

    /// `growth_size` rounded up to alignment, saturating.
    pub(crate) fn aligned_growth_size(&self) -> usize {
        ptr_utils::checked_align_up_by(self.growth_size, crate::ALIGNMENT - 1)
            .unwrap_or(usize::MAX & !(crate::ALIGNMENT - 1))
    }
}
