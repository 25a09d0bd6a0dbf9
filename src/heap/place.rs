use crate::{block::Block, source::Source, tag::Tag, MIN_BLOCK_SIZE};

use super::Heap;

impl<S: Source> Heap<S> {
    /// Carve a `needed` byte allocated block out of a registered free block.
    ///
    /// A leftover too small to be a block stays attached to the allocation.
    /// Otherwise the leftover is registered as a free block of its own. It
    /// never has a free neighbour: the block it came out of didn't.
    pub(super) fn place(&mut self, block: Block, needed: usize) -> Block {
        let size = block.size(&self.source);
        debug_assert!(!block.is_allocated(&self.source));
        debug_assert!(size >= needed);

        self.deregister(block, size);

        let leftover = size - needed;

        if leftover < MIN_BLOCK_SIZE {
            block.set_tags(&mut self.source, Tag::new(size, true));
            return block;
        }

        if self.config.back_placement_threshold.is_some_and(|threshold| needed >= threshold) {
            block.set_tags(&mut self.source, Tag::new(leftover, false));
            self.register(block, leftover);

            let allocated = Block(block.0 + leftover);
            allocated.set_tags(&mut self.source, Tag::new(needed, true));
            allocated
        } else {
            block.set_tags(&mut self.source, Tag::new(needed, true));

            let rest = Block(block.0 + needed);
            rest.set_tags(&mut self.source, Tag::new(leftover, false));
            self.register(rest, leftover);
            block
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{block::BlockView, heap::FIRST_BLOCK, source::Source, Heap, HeapConfig, VecSource};

    #[test]
    fn back_placement() {
        let config = HeapConfig::default().with_back_placement_threshold(Some(100));
        let mut heap = Heap::with_config(VecSource::new(), config).unwrap();

        // below the threshold, placed at the front
        let small = heap.allocate(40).unwrap();
        assert_eq!(small.get(), FIRST_BLOCK.0);

        // at the threshold, placed at the back
        let large = heap.allocate(1000).unwrap();
        let top = heap.source().heap_size() - 8;
        assert_eq!(large.get() + 1024, top + 8);
        assert_eq!(large.block().next(heap.source()).header(), top);

        let gap = small.block().next(heap.source());
        assert_eq!(gap.view(heap.source()), BlockView::Free { size: 16384 - 64 - 1024, prev: None, next: None });

        heap.release(large);
        heap.release(small);
        assert_eq!(FIRST_BLOCK.view(heap.source()).size(), 16384);
        assert!(heap.validate_heap(line!()));
    }

    #[test]
    fn back_placement_respects_small_leftovers() {
        let config = HeapConfig::default().with_growth_size(1040).with_back_placement_threshold(Some(100));
        let mut heap = Heap::with_config(VecSource::new(), config).unwrap();

        // 1040 byte block, 1024 needed
        let addr = heap.allocate(1000).unwrap();
        assert_eq!(addr.get(), FIRST_BLOCK.0);
        assert_eq!(heap.usable_size(addr), 1024);
    }
}
