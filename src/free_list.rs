//! Segregated free lists.
//!
//! Each list is circular and doubly linked through its sentinel, which lives
//! in the heap itself rather than in the arena. Blocks are pushed at the head,
//! so a list is ordered most recently freed first.

use crate::block::{Link, Words};
use crate::config::{MIN_BLOCK_SIZE, NUM_FREE_LISTS, WILDERNESS_LIST};

/// Upper bounds (in multiples of the minimum block size) of the ordinary
/// classes, following the Fibonacci sequence. The class after the last bound
/// takes every larger size; the wilderness list is never chosen by size.
const CLASS_BOUNDS: [usize; WILDERNESS_LIST - 1] = [1, 2, 3, 5, 8, 13, 21];

/// Index of the ordinary size class holding blocks of `block_size` bytes.
pub fn size_class_of(block_size: usize) -> usize {
    CLASS_BOUNDS
        .iter()
        .position(|&bound| block_size <= bound * MIN_BLOCK_SIZE)
        .unwrap_or(WILDERNESS_LIST - 1)
}

#[derive(Debug, Clone, Copy)]
struct Sentinel {
    next: Link,
    prev: Link,
}

#[derive(Debug)]
pub(crate) struct FreeLists {
    heads: [Sentinel; NUM_FREE_LISTS],
}

impl FreeLists {
    pub(crate) const fn new() -> FreeLists {
        let mut heads = [Sentinel {
            next: Link::Head(0),
            prev: Link::Head(0),
        }; NUM_FREE_LISTS];
        let mut i = 0;
        while i < NUM_FREE_LISTS {
            heads[i] = Sentinel {
                next: Link::Head(i),
                prev: Link::Head(i),
            };
            i += 1;
        }
        FreeLists { heads }
    }

    fn set_next(&mut self, words: Words, at: Link, to: Link) {
        match at {
            Link::Head(list) => self.heads[list].next = to,
            Link::Block(offset) => words.set_next_link(offset, to),
        }
    }

    fn set_prev(&mut self, words: Words, at: Link, to: Link) {
        match at {
            Link::Head(list) => self.heads[list].prev = to,
            Link::Block(offset) => words.set_prev_link(offset, to),
        }
    }

    /// Pushes the free block at `offset` onto the head of `list`.
    pub(crate) fn insert(&mut self, words: Words, list: usize, offset: usize) {
        let head = Link::Head(list);
        let first = self.heads[list].next;

        words.set_next_link(offset, first);
        words.set_prev_link(offset, head);
        self.set_prev(words, first, Link::Block(offset));
        self.heads[list].next = Link::Block(offset);
    }

    /// Unlinks the free block at `offset` from whichever list holds it.
    pub(crate) fn remove(&mut self, words: Words, offset: usize) {
        let prev = words.prev_link(offset);
        let next = words.next_link(offset);

        self.set_next(words, prev, next);
        self.set_prev(words, next, prev);
    }

    pub(crate) fn first(&self, list: usize) -> Option<usize> {
        match self.heads[list].next {
            Link::Block(offset) => Some(offset),
            Link::Head(_) => None,
        }
    }

    pub(crate) fn last(&self, list: usize) -> Option<usize> {
        match self.heads[list].prev {
            Link::Block(offset) => Some(offset),
            Link::Head(_) => None,
        }
    }

    pub(crate) fn iter(&self, words: Words, list: usize) -> FreeListIter {
        FreeListIter {
            words,
            cursor: self.heads[list].next,
        }
    }

    /// The wilderness block, if one is designated.
    pub(crate) fn wilderness(&self) -> Option<usize> {
        self.first(WILDERNESS_LIST)
    }
}

/// Walks one list from its head in link order.
pub(crate) struct FreeListIter {
    words: Words,
    cursor: Link,
}

impl Iterator for FreeListIter {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        match self.cursor {
            Link::Head(_) => None,
            Link::Block(offset) => {
                self.cursor = self.words.next_link(offset);
                Some(offset)
            }
        }
    }
}

#[cfg(test)]
mod test {
    use core::ptr::NonNull;

    use super::*;

    #[test]
    fn fibonacci_classes() {
        let m = MIN_BLOCK_SIZE;
        assert_eq!(size_class_of(m), 0);
        assert_eq!(size_class_of(2 * m), 1);
        assert_eq!(size_class_of(3 * m), 2);
        assert_eq!(size_class_of(4 * m), 3);
        assert_eq!(size_class_of(5 * m), 3);
        assert_eq!(size_class_of(224), 4);
        assert_eq!(size_class_of(8 * m), 4);
        assert_eq!(size_class_of(13 * m), 5);
        assert_eq!(size_class_of(21 * m), 6);
        assert_eq!(size_class_of(22 * m), 7);
        assert_eq!(size_class_of(100_000), 7);
    }

    #[test]
    fn lifo_order_and_removal() {
        let mut buf = [0u64; 64];
        let base = NonNull::new(buf.as_mut_ptr().cast::<u8>()).unwrap();
        let words = unsafe { Words::new(base, 512) };
        let mut lists = FreeLists::new();

        lists.insert(words, 3, 0);
        lists.insert(words, 3, 128);
        lists.insert(words, 3, 256);
        assert!(lists.iter(words, 3).eq([256, 128, 0]));
        assert_eq!(lists.last(3), Some(0));

        lists.remove(words, 128);
        assert!(lists.iter(words, 3).eq([256, 0]));
        lists.remove(words, 0);
        assert_eq!(lists.last(3), Some(256));
        lists.insert(words, 3, 0);

        lists.remove(words, 256);
        lists.remove(words, 0);
        assert_eq!(lists.last(3), None);
        assert_eq!(lists.first(3), None);

        lists.insert(words, WILDERNESS_LIST, 384);
        assert_eq!(lists.wilderness(), Some(384));
        assert_eq!(lists.first(0), None);
    }
}
