use core::ptr::NonNull;

use crate::block::{Header, Words, block_size_for};
use crate::config::{
    ALIGNMENT, FIRST_BLOCK_OFFSET, MIN_BLOCK_SIZE, PROLOGUE_OFFSET, SENTINEL_OVERHEAD,
    WILDERNESS_LIST, WORD_SIZE,
};
use crate::error::ErrorCode;
use crate::free_list::{FreeLists, size_class_of};
use crate::provider::ArenaProvider;

/// A segregated-fit heap over one growable arena.
///
/// Blocks carry boundary tags, free blocks are kept on size-class lists, and
/// the free block touching the arena's high end (the wilderness) is grown in
/// place when no list can satisfy a request.
///
/// The heap is single threaded; wrap it in a lock to share it.
pub struct Heap<P: ArenaProvider> {
    pub(crate) provider: P,
    pub(crate) lists: FreeLists,
    errno: Option<ErrorCode>,
    pub(crate) logging: bool,
}

impl<P: ArenaProvider> Heap<P> {
    /// Creates an empty heap. The arena is laid out on the first call that
    /// needs it.
    pub const fn new(provider: P) -> Heap<P> {
        Heap {
            provider,
            lists: FreeLists::new(),
            errno: None,
            logging: true,
        }
    }

    /// Turns off the heap's own log records.
    ///
    /// A heap that backs the global allocator must not log: a logger that
    /// allocates would re-enter the heap while it is locked.
    pub fn without_logging(mut self) -> Heap<P> {
        self.logging = false;
        self
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn is_initialized(&self) -> bool {
        !self.provider.is_empty()
    }

    /// Condition left by the last failing call. Successful calls do not clear it.
    pub fn last_error(&self) -> Option<ErrorCode> {
        self.errno
    }

    pub fn clear_error(&mut self) {
        self.errno = None;
    }

    pub(crate) fn set_error(&mut self, code: ErrorCode) {
        self.errno = Some(code);
    }

    pub(crate) fn words(&self) -> Words {
        let base = NonNull::new(self.provider.start()).unwrap_or(NonNull::dangling());
        // Safety: the provider hands out committed memory between start and end,
        // and nothing else writes to it.
        unsafe { Words::new(base, self.provider.len()) }
    }

    /// Offset of the epilogue header.
    pub(crate) fn epilogue(&self) -> usize {
        self.provider.len() - WORD_SIZE
    }

    /// Allocates at least `size` bytes aligned to [`ALIGNMENT`].
    ///
    /// Returns `None` for a zero size (without touching the error condition)
    /// and when the arena cannot grow any further, in which case the
    /// condition is set to [`ErrorCode::OutOfMemory`].
    pub fn allocate(&mut self, size: usize) -> Option<NonNull<u8>> {
        if size == 0 {
            return None;
        }

        let Some(offset) = self.allocate_block(size) else {
            heap_log!(self, warn, "allocate({size}) -> out of memory");
            return None;
        };

        let ptr = self.words().payload(offset);
        heap_log!(self, trace, "allocate({size}) -> {:p}", ptr);
        Some(ptr)
    }

    /// Finds or makes room for `size` payload bytes and returns the header
    /// offset of the now allocated block.
    pub(crate) fn allocate_block(&mut self, size: usize) -> Option<usize> {
        if !self.ensure_initialized() {
            self.set_error(ErrorCode::OutOfMemory);
            return None;
        }

        let target = block_size_for(size);
        let offset = match self.find_fit(target) {
            Some(offset) => offset,
            None => self.extend_wilderness(target)?,
        };

        self.place(offset, target);
        Some(offset)
    }

    fn ensure_initialized(&mut self) -> bool {
        if self.is_initialized() {
            return true;
        }

        if self.provider.grow().is_none() {
            heap_log!(self, warn, "arena provider refused the first page");
            return false;
        }
        debug_assert_eq!(self.provider.start() as usize % ALIGNMENT, 0);

        let words = self.words();
        let epilogue = self.epilogue();

        words.set_header(PROLOGUE_OFFSET, Header::new(MIN_BLOCK_SIZE, true, true));
        words.sync_footer(PROLOGUE_OFFSET);
        words.write_free(
            FIRST_BLOCK_OFFSET,
            words.len() - SENTINEL_OVERHEAD,
            true,
        );
        words.set_header(epilogue, Header::new(0, true, false));

        self.lists = FreeLists::new();
        self.lists.insert(words, WILDERNESS_LIST, FIRST_BLOCK_OFFSET);

        heap_log!(
            self,
            debug,
            "heap initialized at {:p} with {} bytes",
            self.provider.start(),
            words.len()
        );
        true
    }

    /// First fit within each class, classes scanned from the smallest that
    /// could hold `target`; the wilderness is the last resort.
    fn find_fit(&self, target: usize) -> Option<usize> {
        let words = self.words();

        for list in size_class_of(target)..WILDERNESS_LIST {
            let found = self
                .lists
                .iter(words, list)
                .find(|&offset| words.header(offset).size() >= target);
            if found.is_some() {
                return found;
            }
        }

        self.lists
            .wilderness()
            .filter(|&offset| words.header(offset).size() >= target)
    }

    /// Grows the arena page by page until the wilderness can hold `target`.
    fn extend_wilderness(&mut self, target: usize) -> Option<usize> {
        loop {
            let wilderness = self.grow_arena()?;
            if self.words().header(wilderness).size() >= target {
                return Some(wilderness);
            }
        }
    }

    /// Adds one page, merges it with a free left neighbour and makes the
    /// result the wilderness. Returns its offset.
    fn grow_arena(&mut self) -> Option<usize> {
        let old_epilogue = self.epilogue();
        let prev_allocated = self.words().header(old_epilogue).is_prev_allocated();

        if self.provider.grow().is_none() {
            heap_log!(self, warn, "arena exhausted at {} bytes", self.provider.len());
            self.set_error(ErrorCode::OutOfMemory);
            return None;
        }

        let words = self.words();
        let epilogue = self.epilogue();
        words.set_header(epilogue, Header::new(0, true, false));
        words.write_free(old_epilogue, epilogue - old_epilogue, prev_allocated);

        let offset = self.coalesce_left(old_epilogue);
        self.install_wilderness(offset);

        heap_log!(
            self,
            debug,
            "arena grown to {} bytes, wilderness {} bytes",
            words.len(),
            words.header(offset).size()
        );
        Some(offset)
    }

    /// Takes the free block at `offset` off its list and allocates its first
    /// `target` bytes. The rest becomes a free block unless it would be a
    /// splinter, in which case it stays with the allocation.
    fn place(&mut self, offset: usize, target: usize) {
        let words = self.words();
        let header = words.header(offset);
        self.lists.remove(words, offset);

        let remainder = header.size() - target;
        if remainder < MIN_BLOCK_SIZE {
            words.set_header(offset, header.with_allocated(true));
            words.set_prev_allocated(offset + header.size(), true);
            return;
        }

        words.set_header(offset, Header::new(target, true, header.is_prev_allocated()));

        let rest = offset + target;
        words.write_free(rest, remainder, true);
        if rest + remainder == self.epilogue() {
            self.install_wilderness(rest);
        } else {
            self.lists.insert(words, size_class_of(remainder), rest);
        }
    }

    /// Makes the free block at `offset` the wilderness, moving a previously
    /// designated one to its size class.
    pub(crate) fn install_wilderness(&mut self, offset: usize) {
        let words = self.words();
        if let Some(old) = self.lists.wilderness() {
            self.lists.remove(words, old);
            self.lists
                .insert(words, size_class_of(words.header(old).size()), old);
        }
        self.lists.insert(words, WILDERNESS_LIST, offset);
    }

    /// Merges the free block at `offset` with free blocks to its left.
    /// The block must not be on a list; absorbed neighbours are taken off
    /// theirs. Returns the offset of the merged block.
    pub(crate) fn coalesce_left(&mut self, mut offset: usize) -> usize {
        let words = self.words();

        loop {
            let header = words.header(offset);
            if header.is_prev_allocated() {
                return offset;
            }

            let left = words.footer_before(offset);
            if left.is_allocated()
                || left.size() < MIN_BLOCK_SIZE
                || left.size() > offset - FIRST_BLOCK_OFFSET
            {
                return offset;
            }

            let left_offset = offset - left.size();
            self.lists.remove(words, left_offset);
            words.write_free(
                left_offset,
                left.size() + header.size(),
                words.header(left_offset).is_prev_allocated(),
            );
            offset = left_offset;
        }
    }

    /// Merges the free block at `offset` with free blocks to its right.
    /// Same list discipline as [`coalesce_left`](Self::coalesce_left).
    pub(crate) fn coalesce_right(&mut self, offset: usize) {
        let words = self.words();

        loop {
            let header = words.header(offset);
            let right = offset + header.size();
            let right_header = words.header(right);
            if right_header.is_allocated() {
                return;
            }

            self.lists.remove(words, right);
            words.write_free(
                offset,
                header.size() + right_header.size(),
                header.is_prev_allocated(),
            );
        }
    }
}
