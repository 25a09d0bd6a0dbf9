use alloc::vec::Vec;

use allocator_api2::alloc::AllocError;

use crate::WORD_SIZE;

use super::{Source, MAX_HEAP};

/// An arena kept in a [`Vec`], grown on demand up to a fixed ceiling.
///
/// Every access is bounds-checked, so misuse of a
/// [`Heap`](crate::Heap) backed by a [`VecSource`] can at worst corrupt its
/// metadata or panic, never touch memory outside the arena.
///
/// # Example
/// ```rust
/// use bintag::{Heap, VecSource};
///
/// // refuse to grow beyond 64 KiB
/// let mut heap = Heap::new(VecSource::with_max_heap(64 << 10)).unwrap();
/// assert!(heap.allocate(100 << 10).is_none());
/// assert!(heap.allocate(1 << 10).is_some());
/// ```
pub struct VecSource {
    heap: Vec<u8>,
    max_heap: usize,
}

impl core::fmt::Debug for VecSource {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("VecSource")
            .field("heap_size", &self.heap.len())
            .field("max_heap", &self.max_heap)
            .finish()
    }
}

impl Default for VecSource {
    fn default() -> Self {
        Self::new()
    }
}

impl VecSource {
    /// Create an empty arena that may grow up to [`MAX_HEAP`] bytes.
    pub const fn new() -> Self {
        Self::with_max_heap(MAX_HEAP)
    }

    /// Create an empty arena that may grow up to `max_heap` bytes.
    pub const fn with_max_heap(max_heap: usize) -> Self {
        Self { heap: Vec::new(), max_heap }
    }

    /// The arena ceiling.
    pub fn max_heap(&self) -> usize {
        self.max_heap
    }
}

impl Source for VecSource {
    fn sbrk(&mut self, increment: usize) -> Result<usize, AllocError> {
        let old_brk = self.heap.len();

        if increment > self.max_heap - old_brk {
            return Err(AllocError);
        }

        self.heap.try_reserve(increment).map_err(|_| AllocError)?;
        self.heap.resize(old_brk + increment, 0);

        Ok(old_brk)
    }

    fn reset(&mut self) {
        self.heap.clear();
    }

    #[inline]
    fn heap_size(&self) -> usize {
        self.heap.len()
    }

    #[inline]
    fn read_word(&self, offset: usize) -> u64 {
        let mut word = [0; WORD_SIZE];
        word.copy_from_slice(&self.heap[offset..offset + WORD_SIZE]);
        u64::from_ne_bytes(word)
    }

    #[inline]
    fn write_word(&mut self, offset: usize, word: u64) {
        self.heap[offset..offset + WORD_SIZE].copy_from_slice(&word.to_ne_bytes());
    }

    fn copy_bytes(&mut self, src: usize, dst: usize, len: usize) {
        self.heap.copy_within(src..src + len, dst);
    }

    fn fill_bytes(&mut self, offset: usize, len: usize, byte: u8) {
        self.heap[offset..offset + len].fill(byte);
    }

    fn bytes(&self, offset: usize, len: usize) -> &[u8] {
        &self.heap[offset..offset + len]
    }

    fn bytes_mut(&mut self, offset: usize, len: usize) -> &mut [u8] {
        &mut self.heap[offset..offset + len]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sbrk_returns_old_break() {
        let mut src = VecSource::with_max_heap(100);

        assert_eq!(src.sbrk(32), Ok(0));
        assert_eq!(src.sbrk(48), Ok(32));
        assert_eq!(src.heap_size(), 80);
        assert_eq!(src.heap_lo(), 0);
        assert_eq!(src.heap_hi(), 79);

        // 80 + 32 > 100
        assert_eq!(src.sbrk(32), Err(AllocError));
        assert_eq!(src.heap_size(), 80);
        assert_eq!(src.sbrk(20), Ok(80));
        assert_eq!(src.sbrk(0), Ok(100));
        assert_eq!(src.sbrk(1), Err(AllocError));

        src.reset();
        assert_eq!(src.heap_size(), 0);
        assert_eq!(src.sbrk(16), Ok(0));
    }

    #[test]
    fn word_and_byte_access() {
        let mut src = VecSource::new();
        src.sbrk(64).unwrap();

        src.write_word(8, 0xdead_beef_0000_0011);
        assert_eq!(src.read_word(8), 0xdead_beef_0000_0011);
        assert_eq!(src.read_word(16), 0);

        src.fill_bytes(32, 16, 0xab);
        assert!(src.bytes(32, 16).iter().all(|&b| b == 0xab));

        src.copy_bytes(32, 40, 16);
        assert!(src.bytes(32, 24).iter().all(|&b| b == 0xab));
        assert!(src.bytes(56, 8).iter().all(|&b| b == 0));

        src.bytes_mut(0, 4).copy_from_slice(b"abcd");
        assert_eq!(src.bytes(0, 4), b"abcd");
    }

    #[test]
    #[should_panic]
    fn out_of_bounds_access_panics() {
        let mut src = VecSource::new();
        src.sbrk(16).unwrap();
        src.read_word(16);
    }
}
