use allocator_api2::alloc::AllocError;

use crate::{block::Block, ptr_utils, source::Source, tag::Tag, ALIGNMENT, MIN_BLOCK_SIZE};

use super::Heap;

impl<S: Source> Heap<S> {
    /// Extend the arena by at least `bytes` and return the resulting free block.
    ///
    /// The old epilogue becomes the new block's header and a new epilogue is
    /// written past it. If the arena ended in a free block, the two merge.
    pub(super) fn grow(&mut self, bytes: usize) -> Result<Block, AllocError> {
        let bytes =
            ptr_utils::checked_align_up_by(bytes, ALIGNMENT - 1).ok_or(AllocError)?.max(MIN_BLOCK_SIZE);

        let brk = self.source.sbrk(bytes).map_err(|err| {
            awarn!("arena exhausted: failed to grow {} bytes by {}", self.source.heap_size(), bytes);
            err
        })?;

        adebug!("grew arena by {} to {} bytes", bytes, brk + bytes);

        #[cfg(feature = "counters")]
        self.counters.account_grow(bytes);

        let block = Block(brk);
        block.set_tags(&mut self.source, Tag::new(bytes, false));
        self.source.write_word(block.next(&self.source).header(), Tag::EPILOGUE.0);

        self.register(block, bytes);
        Ok(self.coalesce(block))
    }
}
