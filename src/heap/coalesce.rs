use crate::{block::Block, source::Source, tag::Tag};

use super::Heap;

impl<S: Source> Heap<S> {
    /// Merge a registered free block with its free physical neighbours.
    ///
    /// Every block taking part is deregistered under its current size and the
    /// merged block is registered in their place. Returns the merged block.
    pub(super) fn coalesce(&mut self, block: Block) -> Block {
        let size = block.size(&self.source);
        let prev = block.prev(&self.source);
        let next = block.next(&self.source);

        let prev_free = !prev.is_allocated(&self.source);
        let next_free = !next.is_allocated(&self.source);

        let (merged, merged_size) = match (prev_free, next_free) {
            (false, false) => return block,
            (false, true) => {
                let next_size = next.size(&self.source);
                adebug!("coalesce {:#x}: with next {:#x}", block.0, next.0);

                self.deregister(block, size);
                self.deregister(next, next_size);
                (block, size + next_size)
            }
            (true, false) => {
                let prev_size = prev.size(&self.source);
                adebug!("coalesce {:#x}: with prev {:#x}", block.0, prev.0);

                self.deregister(prev, prev_size);
                self.deregister(block, size);
                (prev, prev_size + size)
            }
            (true, true) => {
                let prev_size = prev.size(&self.source);
                let next_size = next.size(&self.source);
                adebug!("coalesce {:#x}: with prev {:#x} and next {:#x}", block.0, prev.0, next.0);

                self.deregister(prev, prev_size);
                self.deregister(block, size);
                self.deregister(next, next_size);
                (prev, prev_size + size + next_size)
            }
        };

        merged.set_tags(&mut self.source, Tag::new(merged_size, false));
        self.register(merged, merged_size);
        merged
    }
}
