//! Heap consistency checking and block dumps.

use crate::{
    bins::BIN_COUNT,
    block::{Block, BlockView},
    source::Source,
    BLOCK_OVERHEAD,
};

#[cfg(any(debug_assertions, feature = "heap-checking"))]
use crate::{bins::bin_of_size, llist, ptr_utils, tag::Tag, MIN_BLOCK_SIZE, WORD_SIZE};

use super::{Addr, Heap, FIRST_BLOCK};

impl<S: Source> Heap<S> {
    /// Walk the arena and every free list, checking the heap's invariants.
    ///
    /// Each inconsistency found is reported through [`log::error!`], tagged
    /// with `line` (pass `line!()`), and `false` is returned. Checking continues
    /// past findings where the heap is still walkable.
    ///
    /// Checks are only compiled in with `debug_assertions` or the
    /// `heap-checking` feature. Otherwise this always returns `true`.
    pub fn validate_heap(&self, line: u32) -> bool {
        #[cfg(any(debug_assertions, feature = "heap-checking"))]
        return self.check(line);

        #[cfg(not(any(debug_assertions, feature = "heap-checking")))]
        {
            let _ = line;
            true
        }
    }

    #[cfg(any(debug_assertions, feature = "heap-checking"))]
    fn check(&self, line: u32) -> bool {
        let src = &self.source;
        let heap_size = src.heap_size();
        let mut ok = true;

        macro_rules! report {
            ($($arg:tt)*) => {{
                log::error!("validate_heap (line {}): {}", line, format_args!($($arg)*));
                ok = false;
            }};
        }

        if heap_size < FIRST_BLOCK.0 {
            report!("arena of {} bytes is too small to be initialized", heap_size);
            return ok;
        }

        let prologue = Tag::new(BLOCK_OVERHEAD, true);
        if Tag(src.read_word(WORD_SIZE)) != prologue || Tag(src.read_word(2 * WORD_SIZE)) != prologue {
            report!("prologue is damaged");
        }

        // physical walk

        let mut free_count = 0;
        let mut prev_free = false;
        let mut block = FIRST_BLOCK;

        loop {
            if !ptr_utils::is_aligned(block.0) {
                report!("block {:#x} is misaligned", block.0);
                break;
            }
            if block.0 > heap_size {
                report!("block {:#x} is outside the arena, missing epilogue", block.0);
                break;
            }

            let tag = block.tag(src);

            if tag.is_epilogue() {
                if block.0 != heap_size {
                    report!("epilogue at {:#x} is not the last word of the arena", block.header());
                }
                break;
            }

            let size = tag.size();

            if size < MIN_BLOCK_SIZE || !ptr_utils::is_aligned(size) {
                report!("block {:#x} has invalid size {}", block.0, size);
                break;
            }
            if size > heap_size - block.0 {
                report!("block {:#x} of size {} runs past the arena", block.0, size);
                break;
            }

            let footer = block.footer_tag(src);
            if footer != tag {
                report!("block {:#x} header {:?} doesn't match footer {:?}", block.0, tag, footer);
            }

            if !tag.is_allocated() {
                free_count += 1;

                if prev_free {
                    report!("free block {:#x} follows another free block", block.0);
                }
            }

            prev_free = !tag.is_allocated();
            block = block.next(src);
        }

        // free list walk

        let max_len = heap_size / MIN_BLOCK_SIZE;
        let mut listed_count = 0;

        for bin in 0..BIN_COUNT {
            let head = self.bins.head(bin);

            if head.is_some() != (self.bins.next_available(bin) == Some(bin)) {
                report!("availability of bin {} doesn't match its list", bin);
            }

            let mut expected_prev = None;
            let mut current = head;

            while let Some(block) = current {
                if listed_count > max_len {
                    report!("free lists hold more blocks than could fit the arena, cycle?");
                    return ok;
                }

                let in_arena = block.0 >= FIRST_BLOCK.0 && block.0 + 2 * WORD_SIZE <= heap_size;
                if !in_arena || !ptr_utils::is_aligned(block.0) {
                    report!("bin {} links to {:#x}, which is not a payload offset", bin, block.0);
                    break;
                }

                listed_count += 1;

                let tag = block.tag(src);
                if tag.is_allocated() {
                    report!("allocated block {:#x} is on the free list of bin {}", block.0, bin);
                } else if bin_of_size(tag.size()) != bin {
                    report!("free block {:#x} of size {} is in bin {}", block.0, tag.size(), bin);
                }

                if llist::prev(src, block) != expected_prev {
                    report!("free block {:#x} has a broken back-link", block.0);
                }

                expected_prev = Some(block);
                current = llist::next(src, block);
            }
        }

        if listed_count != free_count {
            report!("{} free blocks in the arena, but {} on the free lists", free_count, listed_count);
        }

        ok
    }

    /// Iterate over the arena's blocks in address order, excluding the
    /// prologue and epilogue.
    pub fn blocks(&self) -> Blocks<'_, S> {
        Blocks { src: &self.source, block: FIRST_BLOCK }
    }

    /// Log every block, and the state of the free lists, at debug level.
    pub fn log_blocks(&self) {
        adebug!("heap of {} bytes:", self.source.heap_size());

        for (addr, view) in self.blocks() {
            adebug!("  {:>#10x} {:?}", addr.get(), view);
        }

        for bin in 0..BIN_COUNT {
            if let Some(head) = self.bins.head(bin) {
                adebug!("  bin {:>2}: head {:#x}", bin, head.0);
            }
        }

        #[cfg(feature = "counters")]
        adebug!("  {:?}", self.counters);
    }
}

/// Iterator over a heap's blocks, created by [`Heap::blocks`].
///
/// Stops early, rather than panicking, if the walk runs into a malformed tag.
#[derive(Debug)]
#[must_use = "iterators are lazy and do nothing unless consumed"]
pub struct Blocks<'a, S: Source> {
    src: &'a S,
    block: Block,
}

impl<'a, S: Source> Iterator for Blocks<'a, S> {
    type Item = (Addr, BlockView);

    fn next(&mut self) -> Option<Self::Item> {
        let heap_size = self.src.heap_size();

        if self.block.0 > heap_size || heap_size - self.block.0 < BLOCK_OVERHEAD {
            return None;
        }

        let view = self.block.view(self.src);
        let size = view.size();

        if size == 0 || size > heap_size - self.block.0 {
            return None;
        }

        let addr = Addr::new(self.block.0)?;
        self.block = Block(self.block.0 + size);
        Some((addr, view))
    }
}
