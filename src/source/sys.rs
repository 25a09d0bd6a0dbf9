use core::ptr::NonNull;

use allocator_api2::alloc::AllocError;

use super::{RawSource, Region, Source, MAX_HEAP};

/// An arena reserved from the operating system with `mmap`.
///
/// The whole ceiling is mapped on the first [`sbrk`](Source::sbrk) and
/// handed back to the OS when the [`SysMem`] is dropped. Pages are only
/// backed by physical memory once touched.
#[derive(Debug)]
pub struct SysMem {
    region: Option<Region>,
    max_heap: usize,
}

impl Default for SysMem {
    fn default() -> Self {
        Self::new()
    }
}

impl SysMem {
    /// Create an arena that may grow up to [`MAX_HEAP`] bytes.
    pub const fn new() -> Self {
        Self::with_max_heap(MAX_HEAP)
    }

    /// Create an arena that may grow up to `max_heap` bytes.
    pub const fn with_max_heap(max_heap: usize) -> Self {
        Self { region: None, max_heap }
    }

    fn region(&mut self) -> Result<&mut Region, AllocError> {
        if self.region.is_none() {
            #[cfg(target_os = "linux")]
            let flags = libc::MAP_ANONYMOUS | libc::MAP_PRIVATE | libc::MAP_NORESERVE;
            #[cfg(not(target_os = "linux"))]
            let flags = libc::MAP_ANONYMOUS | libc::MAP_PRIVATE;

            let base = unsafe {
                libc::mmap(
                    core::ptr::null_mut(),
                    self.max_heap,
                    libc::PROT_READ | libc::PROT_WRITE,
                    flags,
                    -1,
                    0,
                )
            };

            if base == libc::MAP_FAILED || base.is_null() {
                return Err(AllocError);
            }

            // SAFETY: the mapping is fresh, page aligned, and exclusively ours until munmap
            self.region = Some(unsafe { Region::new(base.cast(), self.max_heap) });
        }

        self.region.as_mut().ok_or(AllocError)
    }
}

impl Drop for SysMem {
    fn drop(&mut self) {
        if let Some(region) = self.region.take() {
            if let Some(base) = region.base() {
                let result = unsafe { libc::munmap(base.as_ptr().cast(), self.max_heap) };
                debug_assert_eq!(result, 0);
            }
        }
    }
}

impl Source for SysMem {
    fn sbrk(&mut self, increment: usize) -> Result<usize, AllocError> {
        self.region()?.sbrk(increment)
    }

    fn reset(&mut self) {
        if let Some(region) = self.region.as_mut() {
            region.reset();
        }
    }

    #[inline]
    fn heap_size(&self) -> usize {
        self.region.as_ref().map_or(0, Region::heap_size)
    }

    // Accessors are only called on offsets below the break, which implies a mapping.

    #[inline]
    fn read_word(&self, offset: usize) -> u64 {
        match &self.region {
            Some(region) => region.read_word(offset),
            None => panic!("read from an empty arena"),
        }
    }

    #[inline]
    fn write_word(&mut self, offset: usize, word: u64) {
        match &mut self.region {
            Some(region) => region.write_word(offset, word),
            None => panic!("write to an empty arena"),
        }
    }

    fn copy_bytes(&mut self, src: usize, dst: usize, len: usize) {
        match &mut self.region {
            Some(region) => region.copy_bytes(src, dst, len),
            None => assert_eq!(len, 0, "copy within an empty arena"),
        }
    }

    fn fill_bytes(&mut self, offset: usize, len: usize, byte: u8) {
        match &mut self.region {
            Some(region) => region.fill_bytes(offset, len, byte),
            None => assert_eq!(len, 0, "fill within an empty arena"),
        }
    }

    fn bytes(&self, offset: usize, len: usize) -> &[u8] {
        match &self.region {
            Some(region) => region.bytes(offset, len),
            None => {
                assert_eq!(len, 0, "read from an empty arena");
                &[]
            }
        }
    }

    fn bytes_mut(&mut self, offset: usize, len: usize) -> &mut [u8] {
        match &mut self.region {
            Some(region) => region.bytes_mut(offset, len),
            None => {
                assert_eq!(len, 0, "write to an empty arena");
                &mut []
            }
        }
    }
}

// SAFETY: delegates to the mapped `Region`
unsafe impl RawSource for SysMem {
    #[inline]
    fn base(&self) -> Option<NonNull<u8>> {
        self.region.as_ref().and_then(Region::base)
    }
}
