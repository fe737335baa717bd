use core::ptr::NonNull;

use crate::block::{Header, block_size_for};
use crate::config::{ALIGNMENT, MIN_BLOCK_SIZE};
use crate::error::ErrorCode;
use crate::free_list::size_class_of;
use crate::heap::Heap;
use crate::provider::ArenaProvider;

impl<P: ArenaProvider> Heap<P> {
    /// Allocates `size` bytes whose address is a multiple of `alignment`.
    ///
    /// `alignment` must be a power of two no smaller than the minimum block
    /// size, and `size` must be non-zero; otherwise the condition is set to
    /// invalid-argument and nothing is allocated.
    pub fn aligned_allocate(&mut self, size: usize, alignment: usize) -> Option<NonNull<u8>> {
        if size == 0 || alignment < MIN_BLOCK_SIZE || !alignment.is_power_of_two() {
            heap_log!(
                self,
                warn,
                "aligned_allocate({size}, {alignment}) -> invalid argument"
            );
            self.set_error(ErrorCode::InvalidArgument);
            return None;
        }

        let Some(request) = size
            .checked_add(alignment)
            .and_then(|n| n.checked_add(MIN_BLOCK_SIZE))
        else {
            heap_log!(
                self,
                warn,
                "aligned_allocate({size}, {alignment}) -> request overflows"
            );
            self.set_error(ErrorCode::OutOfMemory);
            return None;
        };

        let Some(mut offset) = self.allocate_block(request) else {
            heap_log!(self, warn, "aligned_allocate({size}, {alignment}) -> out of memory");
            return None;
        };

        let words = self.words();
        let header = words.header(offset);
        let payload = words.payload(offset).as_ptr() as usize;

        // payloads sit on ALIGNMENT boundaries, so the skip is always a whole
        // number of minimum blocks
        let skip = payload.next_multiple_of(alignment) - payload;
        debug_assert_eq!(skip % ALIGNMENT, 0);

        if skip > 0 {
            // the left neighbour of a freshly allocated block is never free,
            // so the skipped prefix stands on its own
            words.write_free(offset, skip, header.is_prev_allocated());
            self.lists.insert(words, size_class_of(skip), offset);

            offset += skip;
            words.set_header(offset, Header::new(header.size() - skip, true, false));
        }

        let need = block_size_for(size);
        if words.header(offset).size() - need >= MIN_BLOCK_SIZE {
            self.split_allocated(offset, need);
        }

        let ptr = words.payload(offset);
        heap_log!(self, trace, "aligned_allocate({size}, {alignment}) -> {:p}", ptr);
        Some(ptr)
    }
}
