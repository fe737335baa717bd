//! Read-only views of the heap and an invariant audit.

use core::marker::PhantomData;
use core::ptr::NonNull;

use crate::block::{Block, BlockInfo, Header, Link, Words};
use crate::config::{
    ALIGNMENT, FIRST_BLOCK_OFFSET, MIN_BLOCK_SIZE, NUM_FREE_LISTS, PROLOGUE_OFFSET,
    WILDERNESS_LIST, WORD_SIZE,
};
use crate::error::HeapError;
use crate::free_list::size_class_of;
use crate::heap::Heap;
use crate::provider::ArenaProvider;

/// Totals gathered by walking every block between the sentinels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeapStats {
    pub arena_bytes: usize,
    pub pages: usize,
    pub allocated_blocks: usize,
    pub allocated_bytes: usize,
    pub free_blocks: usize,
    pub free_bytes: usize,
}

/// Iterator over the blocks of an arena in address order.
pub struct Blocks<'a> {
    words: Words,
    offset: usize,
    end: usize,
    _heap: PhantomData<&'a ()>,
}

impl Iterator for Blocks<'_> {
    type Item = BlockInfo;

    fn next(&mut self) -> Option<BlockInfo> {
        if self.offset >= self.end {
            return None;
        }
        let header = self.words.header(self.offset);
        if header.size() == 0 {
            return None;
        }

        let info = BlockInfo {
            address: self.words.payload(self.offset),
            size: header.size(),
            allocated: header.is_allocated(),
        };
        self.offset = self.offset.saturating_add(header.size());
        Some(info)
    }
}

fn corrupted(offset: usize, reason: &'static str) -> HeapError {
    HeapError::Corrupted { offset, reason }
}

impl<P: ArenaProvider> Heap<P> {
    /// Header of the block whose payload starts at `payload`, or `None` when
    /// the address is not inside the block area.
    pub fn block_header(&self, payload: NonNull<u8>) -> Option<Header> {
        if !self.is_initialized() {
            return None;
        }
        let words = self.words();
        words
            .header_offset_of(payload.as_ptr())
            .filter(|&offset| (FIRST_BLOCK_OFFSET..self.epilogue()).contains(&offset))
            .filter(|offset| offset % WORD_SIZE == 0)
            .map(|offset| words.header(offset))
    }

    pub fn blocks(&self) -> Blocks<'_> {
        let initialized = self.is_initialized();
        Blocks {
            words: self.words(),
            offset: FIRST_BLOCK_OFFSET,
            end: if initialized { self.epilogue() } else { 0 },
            _heap: PhantomData,
        }
    }

    /// Members of free list `list`, most recently inserted first.
    pub fn free_blocks(&self, list: usize) -> impl Iterator<Item = BlockInfo> + '_ {
        let words = self.words();
        self.lists.iter(words, list).map(move |offset| BlockInfo {
            address: words.payload(offset),
            size: words.header(offset).size(),
            allocated: false,
        })
    }

    pub fn free_list_len(&self, list: usize) -> usize {
        self.free_blocks(list).count()
    }

    /// Payload address of the head of free list `list`.
    pub fn free_list_first(&self, list: usize) -> Option<NonNull<u8>> {
        self.lists
            .first(list)
            .map(|offset| self.words().payload(offset))
    }

    /// Number of listed free blocks of exactly `size` bytes, or of every
    /// listed free block when `size` is zero.
    pub fn free_block_count(&self, size: usize) -> usize {
        (0..NUM_FREE_LISTS)
            .flat_map(|list| self.free_blocks(list))
            .filter(|block| size == 0 || block.size == size)
            .count()
    }

    pub fn stats(&self) -> HeapStats {
        let mut stats = HeapStats {
            arena_bytes: self.provider.len(),
            pages: self.provider.len() / self.provider.page_size(),
            ..HeapStats::default()
        };

        for block in self.blocks() {
            if block.allocated {
                stats.allocated_blocks += 1;
                stats.allocated_bytes += block.size;
            } else {
                stats.free_blocks += 1;
                stats.free_bytes += block.size;
            }
        }
        stats
    }

    /// Audits every block and every free list, reporting the first
    /// inconsistency found.
    pub fn check(&self) -> Result<(), HeapError> {
        if !self.is_initialized() {
            return Ok(());
        }

        let words = self.words();
        let epilogue = self.epilogue();

        let prologue = Header::new(MIN_BLOCK_SIZE, true, true);
        if words.header(PROLOGUE_OFFSET) != prologue
            || words.footer_before(FIRST_BLOCK_OFFSET) != prologue
        {
            return Err(corrupted(PROLOGUE_OFFSET, "prologue damaged"));
        }

        let mut offset = FIRST_BLOCK_OFFSET;
        let mut prev_allocated = true;
        let mut free_blocks = 0;

        while offset < epilogue {
            let header = words.header(offset);
            let size = header.size();

            if size < MIN_BLOCK_SIZE
                || size % ALIGNMENT != 0
                || offset.checked_add(size).is_none_or(|end| end > epilogue)
            {
                return Err(corrupted(offset, "bad block size"));
            }
            if header.is_prev_allocated() != prev_allocated {
                return Err(corrupted(offset, "stale left neighbour bit"));
            }

            if !header.is_allocated() {
                if !prev_allocated {
                    return Err(corrupted(offset, "adjacent free blocks"));
                }
                if words.footer_before(offset + size) != header {
                    return Err(corrupted(offset, "footer differs from header"));
                }
                if offset + size == epilogue && self.lists.wilderness() != Some(offset) {
                    return Err(corrupted(offset, "trailing free block is not the wilderness"));
                }
                free_blocks += 1;
            }

            prev_allocated = header.is_allocated();
            offset += size;
        }

        let end = words.header(epilogue);
        if end.size() != 0 || !end.is_allocated() {
            return Err(corrupted(epilogue, "epilogue damaged"));
        }
        if end.is_prev_allocated() != prev_allocated {
            return Err(corrupted(epilogue, "stale left neighbour bit"));
        }

        let mut listed = 0;
        for list in 0..NUM_FREE_LISTS {
            listed += self.check_list(words, list, free_blocks)?;
        }
        if listed != free_blocks {
            return Err(corrupted(0, "free block missing from the lists"));
        }
        Ok(())
    }

    /// Walks one list checking membership and links; returns its length.
    fn check_list(&self, words: Words, list: usize, limit: usize) -> Result<usize, HeapError> {
        let epilogue = self.epilogue();
        let mut prev = Link::Head(list);
        let mut cursor = self.lists.first(list);
        let mut len = 0;

        while let Some(offset) = cursor {
            if len == limit {
                return Err(corrupted(offset, "free list does not terminate"));
            }
            if !(FIRST_BLOCK_OFFSET..epilogue).contains(&offset)
                || (offset - FIRST_BLOCK_OFFSET) % ALIGNMENT != 0
            {
                return Err(corrupted(offset, "free list link leaves the arena"));
            }

            let Block::Free {
                size,
                prev: back,
                next,
            } = Block::load(words, offset)
            else {
                return Err(corrupted(offset, "allocated block on a free list"));
            };

            if back != prev {
                return Err(corrupted(offset, "broken back link"));
            }
            if list != WILDERNESS_LIST && size_class_of(size) != list {
                return Err(corrupted(offset, "block filed under the wrong class"));
            }

            len += 1;
            prev = Link::Block(offset);
            cursor = match next {
                Link::Block(next) => Some(next),
                Link::Head(head) if head == list => None,
                Link::Head(_) => return Err(corrupted(offset, "link into another list")),
            };
        }

        if self.lists.last(list) != prev_offset(prev) {
            return Err(corrupted(0, "list sentinel points at the wrong tail"));
        }
        if list == WILDERNESS_LIST && len > 1 {
            return Err(corrupted(0, "more than one wilderness block"));
        }
        Ok(len)
    }
}

fn prev_offset(link: Link) -> Option<usize> {
    match link {
        Link::Block(offset) => Some(offset),
        Link::Head(_) => None,
    }
}
