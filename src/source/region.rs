use core::ptr::NonNull;

use allocator_api2::alloc::AllocError;

use crate::{ptr_utils, ALIGNMENT, WORD_SIZE};

use super::{RawSource, Source};

/// An arena carved out of a fixed region of memory provided by the caller.
///
/// The region's base is aligned up to [`ALIGNMENT`], losing up to
/// `ALIGNMENT - 1` bytes off the bottom. The break starts at the base and moves
/// up towards the end of the region as the [`Heap`](crate::Heap) grows.
///
/// # Example
/// ```rust
/// use bintag::{Heap, Region};
///
/// static mut ARENA: [u8; 64 << 10] = [0; 64 << 10];
///
/// let region = unsafe { Region::array(core::ptr::addr_of_mut!(ARENA)) };
/// let mut heap = Heap::new(region).unwrap();
/// let addr = heap.allocate(1000).unwrap();
/// heap.release(addr);
/// ```
#[derive(Debug)]
pub struct Region {
    base: NonNull<u8>,
    capacity: usize,
    brk: usize,
}

// The region is exclusively owned by this `Region` by construction contract.
unsafe impl Send for Region {}

impl Region {
    /// Create a [`Region`] over `size` bytes at `base`.
    ///
    /// # Safety
    /// The memory `base..base + size` must be valid for reads and writes,
    /// and must not be accessed through anything but this [`Region`] (and
    /// the allocations handed out of it) while it is alive.
    ///
    /// # Panics
    /// Panics if `base` is null.
    pub unsafe fn new(base: *mut u8, size: usize) -> Self {
        assert!(!base.is_null(), "region covers the null address!");

        let aligned = ptr_utils::checked_align_up_by(base as usize, ALIGNMENT - 1);
        let padding = match aligned {
            Some(aligned) => aligned - base as usize,
            None => size,
        };

        // SAFETY: if padding < size, `base + padding` is within the region and non-null
        let base = NonNull::new_unchecked(base.wrapping_add(padding.min(size)));
        let capacity = size.saturating_sub(padding) & !(WORD_SIZE - 1);

        Self { base, capacity, brk: 0 }
    }

    /// Create a [`Region`] over an array.
    ///
    /// # Safety
    /// See [`Region::new`].
    pub unsafe fn array<const N: usize>(array: *mut [u8; N]) -> Self {
        Self::new(array.cast(), N)
    }

    /// The number of bytes the arena may grow to.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    #[track_caller]
    fn ptr_at(&self, offset: usize, len: usize) -> *mut u8 {
        assert!(
            offset <= self.brk && len <= self.brk - offset,
            "access {}..{} is out of the arena 0..{}",
            offset,
            offset.wrapping_add(len),
            self.brk
        );

        // SAFETY: offset is within the region
        unsafe { self.base.as_ptr().add(offset) }
    }
}

impl Source for Region {
    fn sbrk(&mut self, increment: usize) -> Result<usize, AllocError> {
        if increment > self.capacity - self.brk {
            return Err(AllocError);
        }

        let old_brk = self.brk;
        self.brk += increment;
        Ok(old_brk)
    }

    fn reset(&mut self) {
        self.brk = 0;
    }

    #[inline]
    fn heap_size(&self) -> usize {
        self.brk
    }

    #[inline]
    fn read_word(&self, offset: usize) -> u64 {
        let ptr = self.ptr_at(offset, WORD_SIZE);
        debug_assert!(ptr as usize % WORD_SIZE == 0);

        // SAFETY: in bounds, aligned as the base is aligned and words sit at multiples of 8
        unsafe { ptr.cast::<u64>().read() }
    }

    #[inline]
    fn write_word(&mut self, offset: usize, word: u64) {
        let ptr = self.ptr_at(offset, WORD_SIZE);
        debug_assert!(ptr as usize % WORD_SIZE == 0);

        // SAFETY: see read_word
        unsafe { ptr.cast::<u64>().write(word) }
    }

    fn copy_bytes(&mut self, src: usize, dst: usize, len: usize) {
        let src = self.ptr_at(src, len);
        let dst = self.ptr_at(dst, len);

        // SAFETY: both ranges are in bounds, `copy` tolerates overlap
        unsafe { core::ptr::copy(src, dst, len) }
    }

    fn fill_bytes(&mut self, offset: usize, len: usize, byte: u8) {
        let ptr = self.ptr_at(offset, len);

        // SAFETY: in bounds
        unsafe { ptr.write_bytes(byte, len) }
    }

    fn bytes(&self, offset: usize, len: usize) -> &[u8] {
        let ptr = self.ptr_at(offset, len);

        // SAFETY: in bounds, and the region is only reachable through `self`
        unsafe { core::slice::from_raw_parts(ptr, len) }
    }

    fn bytes_mut(&mut self, offset: usize, len: usize) -> &mut [u8] {
        let ptr = self.ptr_at(offset, len);

        // SAFETY: in bounds, and `&mut self` guarantees exclusivity
        unsafe { core::slice::from_raw_parts_mut(ptr, len) }
    }
}

// SAFETY: every accessor resolves offset `o` to `base + o`, base is aligned in `new`
unsafe impl RawSource for Region {
    #[inline]
    fn base(&self) -> Option<NonNull<u8>> {
        Some(self.base)
    }
}
