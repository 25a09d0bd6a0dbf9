//! Block geometry: where a block's tags live and who its neighbours are.
//!
//! ```text
//!   header                    footer
//!   v                         v
//! | size|a | payload ...    | size|a | size|a | ...
//!          ^                         ^
//!          block (p)                 next block (p + size)
//! ```
//!
//! A [`Block`] is the offset of its payload. Sizes include both tags.

use crate::{heap::Addr, llist, source::Source, tag::Tag, BLOCK_OVERHEAD, WORD_SIZE};

/// The payload offset of a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Block(pub usize);

impl Block {
    /// Offset of the header word.
    #[inline]
    pub fn header(self) -> usize {
        self.0 - WORD_SIZE
    }

    #[inline]
    pub fn tag<S: Source + ?Sized>(self, src: &S) -> Tag {
        Tag(src.read_word(self.header()))
    }

    #[inline]
    pub fn size<S: Source + ?Sized>(self, src: &S) -> usize {
        self.tag(src).size()
    }

    #[inline]
    pub fn is_allocated<S: Source + ?Sized>(self, src: &S) -> bool {
        self.tag(src).is_allocated()
    }

    /// Offset of the footer word, derived from the header's size.
    #[inline]
    pub fn footer<S: Source + ?Sized>(self, src: &S) -> usize {
        self.0 + self.size(src) - BLOCK_OVERHEAD
    }

    #[cfg(any(test, debug_assertions, feature = "heap-checking"))]
    #[inline]
    pub fn footer_tag<S: Source + ?Sized>(self, src: &S) -> Tag {
        Tag(src.read_word(self.footer(src)))
    }

    /// The physically following block.
    #[inline]
    pub fn next<S: Source + ?Sized>(self, src: &S) -> Block {
        Block(self.0 + self.size(src))
    }

    /// The physically preceding block, found through its footer at `p - 16`.
    #[inline]
    pub fn prev<S: Source + ?Sized>(self, src: &S) -> Block {
        Block(self.0 - Tag(src.read_word(self.0 - BLOCK_OVERHEAD)).size())
    }

    /// Write `tag` to the header, then to the footer it locates.
    #[inline]
    pub fn set_tags<S: Source + ?Sized>(self, src: &mut S, tag: Tag) {
        src.write_word(self.header(), tag.0);
        let footer = self.footer(src);
        src.write_word(footer, tag.0);
    }

    /// Interpret the block according to its header.
    pub fn view<S: Source + ?Sized>(self, src: &S) -> BlockView {
        let tag = self.tag(src);

        if tag.is_epilogue() {
            BlockView::Epilogue
        } else if tag.is_allocated() {
            BlockView::Allocated { size: tag.size() }
        } else {
            BlockView::Free {
                size: tag.size(),
                prev: llist::prev(src, self).and_then(|b| Addr::new(b.0)),
                next: llist::next(src, self).and_then(|b| Addr::new(b.0)),
            }
        }
    }
}

/// A block, as seen from its header.
///
/// Free blocks reuse the first two words of their payload for their
/// free-list links, so those are only meaningful for [`BlockView::Free`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockView {
    /// A block owned by the caller. `size` includes both tags.
    Allocated {
        /// Block size in bytes.
        size: usize,
    },
    /// A block on a free list.
    Free {
        /// Block size in bytes.
        size: usize,
        /// The previous block on the same list.
        prev: Option<Addr>,
        /// The next block on the same list.
        next: Option<Addr>,
    },
    /// The zero-sized terminator at the top of the arena.
    Epilogue,
}

impl BlockView {
    /// The block size, zero for the epilogue.
    pub fn size(&self) -> usize {
        match *self {
            BlockView::Allocated { size } | BlockView::Free { size, .. } => size,
            BlockView::Epilogue => 0,
        }
    }

    /// Whether the block is on a free list.
    pub fn is_free(&self) -> bool {
        matches!(self, BlockView::Free { .. })
    }
}
