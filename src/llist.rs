//! Free-list links, stored in the first two payload words of a free block.
//!
//! `prev` lives at `p`, `next` at `p + 8`. Zero means "none": offset zero is
//! the alignment pad and can never be a payload.

use crate::{block::Block, source::Source, WORD_SIZE};

#[inline]
fn decode(word: u64) -> Option<Block> {
    match word {
        0 => None,
        offset => Some(Block(offset as usize)),
    }
}

#[inline]
fn encode(link: Option<Block>) -> u64 {
    link.map_or(0, |b| b.0 as u64)
}

#[inline]
pub fn prev<S: Source + ?Sized>(src: &S, block: Block) -> Option<Block> {
    decode(src.read_word(block.0))
}

#[inline]
pub fn next<S: Source + ?Sized>(src: &S, block: Block) -> Option<Block> {
    decode(src.read_word(block.0 + WORD_SIZE))
}

#[inline]
pub fn set_prev<S: Source + ?Sized>(src: &mut S, block: Block, prev: Option<Block>) {
    src.write_word(block.0, encode(prev));
}

#[inline]
pub fn set_next<S: Source + ?Sized>(src: &mut S, block: Block, next: Option<Block>) {
    src.write_word(block.0 + WORD_SIZE, encode(next));
}

/// Walks a free list from its head along the `next` links.
#[derive(Debug)]
#[must_use = "iterators are lazy and do nothing unless consumed"]
pub struct Iter<'a, S: Source + ?Sized> {
    src: &'a S,
    current: Option<Block>,
}

impl<'a, S: Source + ?Sized> Iter<'a, S> {
    pub fn new(src: &'a S, head: Option<Block>) -> Self {
        Self { src, current: head }
    }
}

impl<'a, S: Source + ?Sized> Iterator for Iter<'a, S> {
    type Item = Block;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.current?;
        self.current = next(self.src, current);
        Some(current)
    }
}
