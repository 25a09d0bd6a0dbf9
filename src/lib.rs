//! A boundary-tag allocator with segregated free lists, built over an
//! `sbrk`-style growable arena.
//!
//! For getting started:
//! - Pick a [`Source`]: [`VecSource`] for a heap-backed arena, [`Region`] for
//!     a fixed chunk of memory you own, or `SysMem` with the `system-backed` feature.
//! - Create a [`Heap`] with [`Heap::new`] and use [`Heap::allocate`],
//!     [`Heap::release`], [`Heap::reallocate`] and [`Heap::zero_allocate`].
//! - Wrap it in a [`HeapLock`] to share it or to use it as a [`GlobalAlloc`](core::alloc::GlobalAlloc).
//!
//! ```rust
//! use bintag::{Heap, VecSource};
//!
//! let mut heap = Heap::new(VecSource::new()).unwrap();
//!
//! let addr = heap.allocate(100).unwrap();
//! heap.payload_mut(addr)[..5].copy_from_slice(b"hello");
//!
//! let addr = heap.reallocate(Some(addr), 3000).unwrap();
//! assert_eq!(&heap.payload(addr)[..5], b"hello");
//!
//! heap.release(addr);
//! assert!(heap.validate_heap(line!()));
//! ```

#![cfg_attr(not(test), no_std)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs)]

extern crate alloc;

#[macro_use]
mod alog;

mod bins;
mod block;
mod config;
mod heap;
mod llist;
mod ptr_utils;
mod tag;

pub mod source;
#[cfg(feature = "lock_api")]
pub mod sync;

pub use allocator_api2::alloc::AllocError;
pub use block::BlockView;
pub use config::HeapConfig;
pub use heap::{Addr, Blocks, Heap};
#[cfg(feature = "counters")]
pub use heap::Counters;
pub use source::{RawSource, Region, Source, VecSource};
#[cfg(all(feature = "system-backed", unix))]
pub use source::SysMem;
#[cfg(feature = "lock_api")]
pub use sync::HeapLock;

use core::sync::atomic::{AtomicBool, Ordering};

/// Every payload address is a multiple of this.
pub const ALIGNMENT: usize = 16;

/// Size of a header or footer word.
pub const WORD_SIZE: usize = 8;

/// Per-block bookkeeping overhead: one header and one footer.
pub const BLOCK_OVERHEAD: usize = 2 * WORD_SIZE;

/// The smallest block the allocator will carve, metadata included.
///
/// A free block needs room for its header, footer and two free-list links.
pub const MIN_BLOCK_SIZE: usize = 32;

/// Default number of bytes the arena grows by when no free block fits.
pub const DEFAULT_GROWTH_SIZE: usize = 16384;

static ALLOC_LOG: AtomicBool = AtomicBool::new(false);

/// Enables the allocator's diagnostic logging through the [`log`] facade.
///
/// Off by default. Make sure the installed logger doesn't allocate through
/// the same allocator, or it'll deadlock (or worse) on the first log line.
pub fn enable_logging() {
    ALLOC_LOG.store(true, Ordering::Relaxed);
}

/// Disables the allocator's diagnostic logging.
pub fn disable_logging() {
    ALLOC_LOG.store(false, Ordering::Relaxed);
}

pub(crate) fn should_log() -> bool {
    ALLOC_LOG.load(Ordering::Relaxed)
}
