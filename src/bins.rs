//! Segregated free lists.
//!
//! Free blocks are binned by size into doubling classes starting at
//! [`MIN_BLOCK_SIZE`], with a catch-all class at the top. A bitfield tracks
//! which bins are non-empty so a search can skip straight to the next
//! populated bin.

use crate::{block::Block, llist, source::Source, MIN_BLOCK_SIZE};

/// Number of size classes.
pub const BIN_COUNT: usize = 11;

const MIN_BLOCK_SIZE_LOG2: u32 = MIN_BLOCK_SIZE.trailing_zeros();

/// The bin that holds free blocks of `size` bytes, and where a search for a
/// `size` byte block starts.
///
/// Bin `i` covers `[32 << i, 64 << i)`, except the last which takes everything
/// from `32 << (BIN_COUNT - 1)` up.
#[inline]
pub fn bin_of_size(size: usize) -> usize {
    if size < MIN_BLOCK_SIZE * 2 {
        return 0;
    }

    let log2 = usize::BITS - 1 - size.leading_zeros();
    ((log2 - MIN_BLOCK_SIZE_LOG2) as usize).min(BIN_COUNT - 1)
}

/// List heads and the availability bitfield.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bins {
    heads: [Option<Block>; BIN_COUNT],
    /// Bit `i` is set iff `heads[i]` is `Some`.
    avails: u32,
}

impl Default for Bins {
    fn default() -> Self {
        Self::new()
    }
}

impl Bins {
    pub const fn new() -> Self {
        Self { heads: [None; BIN_COUNT], avails: 0 }
    }

    pub fn clear(&mut self) {
        *self = Self::new();
    }

    #[inline]
    pub fn head(&self, bin: usize) -> Option<Block> {
        self.heads[bin]
    }

    /// The lowest non-empty bin at or above `bin`.
    #[inline]
    pub fn next_available(&self, bin: usize) -> Option<usize> {
        if bin >= BIN_COUNT {
            return None;
        }

        match self.avails >> bin << bin {
            0 => None,
            avails => Some(avails.trailing_zeros() as usize),
        }
    }

    pub fn iter<'a, S: Source + ?Sized>(&self, src: &'a S, bin: usize) -> llist::Iter<'a, S> {
        llist::Iter::new(src, self.heads[bin])
    }

    /// Push a free block onto the head of its bin's list.
    pub fn insert<S: Source + ?Sized>(&mut self, src: &mut S, block: Block, size: usize) {
        let bin = bin_of_size(size);
        let head = self.heads[bin];

        llist::set_prev(src, block, None);
        llist::set_next(src, block, head);

        match head {
            Some(head) => llist::set_prev(src, head, Some(block)),
            None => self.avails |= 1 << bin,
        }

        self.heads[bin] = Some(block);
    }

    /// Splice a free block out of its list.
    ///
    /// `size` must be the size the block was inserted with.
    pub fn remove<S: Source + ?Sized>(&mut self, src: &mut S, block: Block, size: usize) {
        let bin = bin_of_size(size);
        let prev = llist::prev(src, block);
        let next = llist::next(src, block);

        match prev {
            Some(prev) => llist::set_next(src, prev, next),
            None => {
                debug_assert_eq!(self.heads[bin], Some(block), "{:?} is not in bin {}", block, bin);

                self.heads[bin] = next;
                if next.is_none() {
                    self.avails &= !(1 << bin);
                }
            }
        }

        if let Some(next) = next {
            llist::set_prev(src, next, prev);
        }
    }

    /// First fit for a `needed` byte block, starting at `needed`'s own bin.
    ///
    /// Heads of bins above the starting one always fit, apart from the
    /// catch-all bin which holds blocks of any larger size.
    pub fn find<S: Source + ?Sized>(&self, src: &S, needed: usize) -> Option<Block> {
        let mut bin = bin_of_size(needed);

        while let Some(available) = self.next_available(bin) {
            let found = self.iter(src, available).find(|b| b.size(src) >= needed);
            if found.is_some() {
                return found;
            }
            bin = available + 1;
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{tag::Tag, VecSource};

    #[test]
    fn size_classes() {
        assert_eq!(bin_of_size(0), 0);
        assert_eq!(bin_of_size(32), 0);
        assert_eq!(bin_of_size(48), 0);
        assert_eq!(bin_of_size(63), 0);
        assert_eq!(bin_of_size(64), 1);
        assert_eq!(bin_of_size(127), 1);
        assert_eq!(bin_of_size(128), 2);
        assert_eq!(bin_of_size(16383), 8);
        assert_eq!(bin_of_size(16384), 9);
        assert_eq!(bin_of_size(32767), 9);
        assert_eq!(bin_of_size(32768), 10);
        assert_eq!(bin_of_size(1 << 30), 10);
        assert_eq!(bin_of_size(usize::MAX), 10);
    }

    fn free_block(src: &mut VecSource, block: Block, size: usize) {
        block.set_tags(src, Tag::new(size, false));
    }

    #[test]
    fn insert_remove_avails() {
        let mut src = VecSource::new();
        src.sbrk(4096).unwrap();
        let mut bins = Bins::new();

        let (a, b, c) = (Block(32), Block(128), Block(256));
        free_block(&mut src, a, 64);
        free_block(&mut src, b, 96);
        free_block(&mut src, c, 1024);

        bins.insert(&mut src, a, 64);
        bins.insert(&mut src, b, 96);
        bins.insert(&mut src, c, 1024);

        assert_eq!(bins.avails, 1 << 1 | 1 << 5);
        assert_eq!(bins.head(1), Some(b));
        assert_eq!(bins.iter(&src, 1).collect::<Vec<_>>(), [b, a]);
        assert_eq!(bins.next_available(0), Some(1));
        assert_eq!(bins.next_available(2), Some(5));
        assert_eq!(bins.next_available(6), None);
        assert_eq!(bins.next_available(BIN_COUNT), None);

        // head
        bins.remove(&mut src, b, 96);
        assert_eq!(bins.head(1), Some(a));
        assert_eq!(llist::prev(&src, a), None);

        // sole element
        bins.remove(&mut src, a, 64);
        assert_eq!(bins.head(1), None);
        assert_eq!(bins.avails, 1 << 5);

        bins.remove(&mut src, c, 1024);
        assert_eq!(bins, Bins::new());
    }

    #[test]
    fn remove_middle_and_tail() {
        let mut src = VecSource::new();
        src.sbrk(4096).unwrap();
        let mut bins = Bins::new();

        let blocks = [Block(32), Block(96), Block(160), Block(224)];
        for &block in &blocks {
            free_block(&mut src, block, 64);
            bins.insert(&mut src, block, 64);
        }
        // list order is reversed: 224, 160, 96, 32

        bins.remove(&mut src, Block(160), 64);
        assert_eq!(bins.iter(&src, 1).collect::<Vec<_>>(), [Block(224), Block(96), Block(32)]);
        assert_eq!(llist::prev(&src, Block(96)), Some(Block(224)));

        bins.remove(&mut src, Block(32), 64);
        assert_eq!(bins.iter(&src, 1).collect::<Vec<_>>(), [Block(224), Block(96)]);
        assert_eq!(llist::next(&src, Block(96)), None);
    }

    #[test]
    fn first_fit_search() {
        let mut src = VecSource::new();
        src.sbrk(1 << 16).unwrap();
        let mut bins = Bins::new();

        assert_eq!(bins.find(&src, 32), None);

        free_block(&mut src, Block(32), 80);
        bins.insert(&mut src, Block(32), 80);

        // 80 is in the 64..128 bin but can't hold 96
        assert_eq!(bins.find(&src, 96), None);
        assert_eq!(bins.find(&src, 80), Some(Block(32)));
        assert_eq!(bins.find(&src, 32), Some(Block(32)));

        free_block(&mut src, Block(128), 40000);
        bins.insert(&mut src, Block(128), 40000);

        assert_eq!(bins.find(&src, 96), Some(Block(128)));
        assert_eq!(bins.find(&src, 40000), Some(Block(128)));
        assert_eq!(bins.find(&src, 40016), None);
    }
}
