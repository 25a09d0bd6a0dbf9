//! The arena collaborators a [`Heap`](crate::Heap) grows into.
//!
//! A [`Source`] is the `sbrk` of this allocator: a contiguous, growable run of
//! bytes addressed by offsets starting at zero, along with the raw word and
//! byte access the allocator needs to maintain its metadata inside it.
//!
//! - [`VecSource`] keeps the arena in a [`Vec`](alloc::vec::Vec). Bounds-checked.
//! - [`Region`] manages a chunk of memory you hand it, such as a `static` array.
//! - `SysMem` reserves its arena from the operating system (`system-backed` feature).
//!
//! [`Region`] and `SysMem` also implement [`RawSource`], which ties offsets
//! to real addresses so that [`HeapLock`](crate::HeapLock) can act as a
//! [`GlobalAlloc`](allocator_api2::alloc::GlobalAlloc).

use core::{fmt::Debug, ptr::NonNull};

use allocator_api2::alloc::AllocError;

mod region;
mod vec;

#[cfg(all(feature = "system-backed", unix))]
mod sys;

pub use region::Region;
pub use vec::VecSource;

#[cfg(all(feature = "system-backed", unix))]
pub use sys::SysMem;

/// Default arena ceiling of [`VecSource`] and `SysMem`: 20 MiB.
pub const MAX_HEAP: usize = 20 << 20;

/// A growable arena.
///
/// Offsets passed to the accessors are always within `0..heap_size()` when
/// called by [`Heap`](crate::Heap). Implementations are free to panic otherwise.
pub trait Source: Debug {
    /// Extend the arena by `increment` bytes.
    ///
    /// Returns the offset of the first new byte, i.e. the old arena size,
    /// or [`AllocError`] if the arena has hit its ceiling.
    fn sbrk(&mut self, increment: usize) -> Result<usize, AllocError>;

    /// Shrink the arena back to nothing, discarding its contents.
    fn reset(&mut self);

    /// The number of bytes currently in the arena.
    fn heap_size(&self) -> usize;

    /// Offset of the first byte of the arena.
    #[inline]
    fn heap_lo(&self) -> usize {
        0
    }

    /// Offset of the last byte of the arena.
    #[inline]
    fn heap_hi(&self) -> usize {
        self.heap_size().saturating_sub(1)
    }

    /// Read the 8-byte word at `offset`.
    fn read_word(&self, offset: usize) -> u64;

    /// Write the 8-byte word at `offset`.
    fn write_word(&mut self, offset: usize, word: u64);

    /// Copy `len` bytes from `src` to `dst`. The ranges may overlap.
    fn copy_bytes(&mut self, src: usize, dst: usize, len: usize);

    /// Set `len` bytes at `offset` to `byte`.
    fn fill_bytes(&mut self, offset: usize, len: usize, byte: u8);

    /// Borrow `len` bytes at `offset`.
    fn bytes(&self, offset: usize, len: usize) -> &[u8];

    /// Mutably borrow `len` bytes at `offset`.
    fn bytes_mut(&mut self, offset: usize, len: usize) -> &mut [u8];
}

/// A [`Source`] whose offsets correspond to real, stable memory addresses.
///
/// # Safety
/// If `base` returns `Some(base)`, then for every offset `o` in
/// `0..heap_size()`, `base + o` must be the address of the byte the
/// [`Source`] accessors read and write at `o`, valid for reads and writes
/// for as long as the [`Source`] lives and isn't [`reset`](Source::reset).
/// `base` must be aligned to [`ALIGNMENT`](crate::ALIGNMENT).
pub unsafe trait RawSource: Source {
    /// Address of offset zero, if the arena has been established.
    fn base(&self) -> Option<NonNull<u8>>;
}
