//! The allocator engine.

use core::{fmt::Debug, num::NonZeroUsize};

use allocator_api2::alloc::AllocError;

use crate::{
    bins::Bins,
    block::Block,
    config::HeapConfig,
    ptr_utils,
    source::Source,
    tag::Tag,
    ALIGNMENT, BLOCK_OVERHEAD, MIN_BLOCK_SIZE, WORD_SIZE,
};

mod check;
mod coalesce;
mod grow;
mod place;

#[cfg(feature = "counters")]
mod counters;

pub use check::Blocks;
#[cfg(feature = "counters")]
pub use counters::Counters;

/// Payload offset of the first block after the prologue.
pub(crate) const FIRST_BLOCK: Block = Block(4 * WORD_SIZE);

/// The payload offset of a live allocation.
///
/// Offsets are relative to the bottom of the heap's [`Source`]. For a
/// [`RawSource`](crate::RawSource), `base + offset` is the payload's address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Addr(NonZeroUsize);

impl Addr {
    /// The payload offset.
    #[inline]
    pub fn get(self) -> usize {
        self.0.get()
    }

    #[inline]
    pub(crate) fn new(offset: usize) -> Option<Self> {
        NonZeroUsize::new(offset).map(Self)
    }

    #[inline]
    pub(crate) fn block(self) -> Block {
        Block(self.0.get())
    }
}

impl core::fmt::Display for Addr {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// A boundary-tag allocator over an `sbrk`-style arena.
///
/// Blocks carry their size and allocation status in a header and an
/// identical footer, so freed blocks merge with their free neighbours in
/// constant time. Free blocks are kept on segregated, size-classed lists
/// and searched first-fit. When nothing fits, the arena is extended.
///
/// The heap never hands memory back to its [`Source`]; it only grows,
/// until [`initialize`](Heap::initialize) starts over.
pub struct Heap<S: Source> {
    source: S,
    bins: Bins,
    config: HeapConfig,

    #[cfg(feature = "counters")]
    counters: counters::Counters,
}

impl<S: Source> Debug for Heap<S> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let mut dbg = f.debug_struct("Heap");
        dbg.field("source", &self.source).field("bins", &self.bins).field("config", &self.config);

        #[cfg(feature = "counters")]
        dbg.field("counters", &self.counters);

        dbg.finish()
    }
}

impl<S: Source> Heap<S> {
    /// Create a heap over `source` with the default [`HeapConfig`] and
    /// [`initialize`](Heap::initialize) it.
    pub fn new(source: S) -> Result<Self, AllocError> {
        Self::with_config(source, HeapConfig::default())
    }

    /// Create a heap over `source` and [`initialize`](Heap::initialize) it.
    pub fn with_config(source: S, config: HeapConfig) -> Result<Self, AllocError> {
        let mut heap = Self {
            source,
            bins: Bins::new(),
            config,
            #[cfg(feature = "counters")]
            counters: counters::Counters::new(),
        };

        heap.initialize()?;
        Ok(heap)
    }

    /// Reset the arena and lay it out afresh: alignment pad, prologue,
    /// epilogue, and one free block of [`HeapConfig::growth_size`] bytes.
    ///
    /// Every outstanding [`Addr`] is invalidated.
    pub fn initialize(&mut self) -> Result<(), AllocError> {
        atrace!("initialize: {:?}", self.config);

        self.source.reset();
        self.bins.clear();

        #[cfg(feature = "counters")]
        {
            self.counters = counters::Counters::new();
        }

        let base = self.source.sbrk(FIRST_BLOCK.0)?;
        debug_assert_eq!(base, 0, "source did not reset to an empty arena");

        let prologue = Tag::new(BLOCK_OVERHEAD, true);
        self.source.write_word(base, 0);
        self.source.write_word(base + WORD_SIZE, prologue.0);
        self.source.write_word(base + 2 * WORD_SIZE, prologue.0);
        self.source.write_word(base + 3 * WORD_SIZE, Tag::EPILOGUE.0);

        #[cfg(feature = "counters")]
        self.counters.account_claim(FIRST_BLOCK.0);

        self.grow(self.config.aligned_growth_size())?;

        #[cfg(feature = "heap-checking")]
        debug_assert!(self.validate_heap(line!()));

        Ok(())
    }

    /// Allocate a payload of at least `size` bytes, aligned to [`ALIGNMENT`].
    ///
    /// Returns `None` if `size` is zero or the arena can't grow enough.
    pub fn allocate(&mut self, size: usize) -> Option<Addr> {
        let needed = required_size(size)?;

        let block = match self.bins.find(&self.source, needed) {
            Some(block) => block,
            None => self.grow(needed.max(self.config.aligned_growth_size())).ok()?,
        };

        let block = self.place(block, needed);

        #[cfg(feature = "counters")]
        self.counters.account_alloc(block.size(&self.source));

        atrace!("allocate({}) -> {:#x}", size, block.0);

        #[cfg(feature = "heap-checking")]
        debug_assert!(self.validate_heap(line!()));

        Addr::new(block.0)
    }

    /// Free an allocation, merging it with any free neighbours.
    ///
    /// `addr` must have been returned by this heap since it was last
    /// initialized, and not released since. This isn't checked. A foreign
    /// or stale `addr` corrupts the heap's metadata.
    pub fn release(&mut self, addr: Addr) {
        atrace!("release({})", addr);

        let block = addr.block();
        let tag = block.tag(&self.source);
        debug_assert!(tag.is_allocated() && !tag.is_epilogue(), "release of non-allocated {}", addr);

        #[cfg(feature = "counters")]
        self.counters.account_dealloc(tag.size());

        block.set_tags(&mut self.source, tag.with_allocated(false));
        self.register(block, tag.size());
        self.coalesce(block);

        #[cfg(feature = "heap-checking")]
        debug_assert!(self.validate_heap(line!()));
    }

    /// Move an allocation into a new one of at least `size` bytes.
    ///
    /// - `addr == None` behaves as [`allocate`](Heap::allocate).
    /// - `size == 0` releases `addr` and returns `None`.
    /// - Otherwise the first `min(size, usable_size(addr))` bytes are copied
    ///     into a fresh allocation and `addr` is released. If that allocation
    ///     fails, `None` is returned and `addr` is left as it was.
    pub fn reallocate(&mut self, addr: Option<Addr>, size: usize) -> Option<Addr> {
        atrace!("reallocate({:?}, {})", addr.map(Addr::get), size);

        let Some(addr) = addr else {
            return self.allocate(size);
        };

        if size == 0 {
            self.release(addr);
            return None;
        }

        let new_addr = self.allocate(size)?;

        let copy_len = size.min(self.usable_size(addr));
        self.source.copy_bytes(addr.get(), new_addr.get(), copy_len);

        self.release(addr);
        Some(new_addr)
    }

    /// Allocate `count * elem_size` zeroed bytes.
    ///
    /// Returns `None` if the product is zero or overflows, or the arena
    /// can't grow enough.
    pub fn zero_allocate(&mut self, count: usize, elem_size: usize) -> Option<Addr> {
        let size = count.checked_mul(elem_size)?;
        let addr = self.allocate(size)?;

        self.source.fill_bytes(addr.get(), size, 0);
        Some(addr)
    }

    /// Number of payload bytes the allocation at `addr` can hold.
    #[inline]
    pub fn usable_size(&self, addr: Addr) -> usize {
        addr.block().size(&self.source) - BLOCK_OVERHEAD
    }

    /// The payload of a live allocation.
    pub fn payload(&self, addr: Addr) -> &[u8] {
        self.source.bytes(addr.get(), self.usable_size(addr))
    }

    /// The payload of a live allocation.
    pub fn payload_mut(&mut self, addr: Addr) -> &mut [u8] {
        let len = self.usable_size(addr);
        self.source.bytes_mut(addr.get(), len)
    }

    /// The arena this heap manages.
    pub fn source(&self) -> &S {
        &self.source
    }

    /// The tunables this heap was created with.
    pub fn config(&self) -> &HeapConfig {
        &self.config
    }

    /// Put a free block on its list.
    #[inline]
    fn register(&mut self, block: Block, size: usize) {
        #[cfg(feature = "counters")]
        self.counters.account_free_block(size);

        self.bins.insert(&mut self.source, block, size);
    }

    /// Take a free block off its list. `size` must be what it was registered with.
    #[inline]
    fn deregister(&mut self, block: Block, size: usize) {
        #[cfg(feature = "counters")]
        self.counters.account_taken_block(size);

        self.bins.remove(&mut self.source, block, size);
    }
}

/// Block size needed to serve a `size` byte request, or `None` if the
/// request is empty or unsatisfiable.
#[inline]
fn required_size(size: usize) -> Option<usize> {
    if size == 0 {
        return None;
    }

    let size = size.checked_add(BLOCK_OVERHEAD)?;
    Some(ptr_utils::checked_align_up_by(size, ALIGNMENT - 1)?.max(MIN_BLOCK_SIZE))
}
