use crate::config::{ALIGNMENT, FIRST_BLOCK_OFFSET, MIN_BLOCK_SIZE, WILDERNESS_LIST};
use crate::error::{HeapError, PointerFault};
use crate::free_list::size_class_of;
use crate::heap::Heap;
use crate::provider::ArenaProvider;

impl<P: ArenaProvider> Heap<P> {
    /// Returns the block behind `ptr` to the heap, merging it with free
    /// neighbours.
    ///
    /// A pointer that does not name a live allocation of this heap is
    /// rejected with [`HeapError::InvalidPointer`] before anything is
    /// modified. The heap must not be used for further mutation after such a
    /// rejection is observed by a process-wide allocator; see
    /// [`crate::allocator::free`].
    ///
    /// # Safety
    /// `ptr` must be null or a pointer previously returned by this heap that
    /// has not been released since. Validation catches most violations but a
    /// stale pointer whose memory was reused cannot be told apart from a live one.
    pub unsafe fn release(&mut self, ptr: *mut u8) -> Result<(), HeapError> {
        let offset = self.validate(ptr).inspect_err(|fault| {
            heap_log!(self, warn, "release({:p}) rejected: {fault}", ptr);
        })?;

        let words = self.words();
        let header = words.header(offset);
        words.write_free(offset, header.size(), header.is_prev_allocated());

        let offset = self.coalesce_left(offset);
        self.coalesce_right(offset);
        let size = words.header(offset).size();
        words.set_prev_allocated(offset + size, false);
        self.reinsert(offset);

        heap_log!(self, trace, "release({:p}) -> free block of {size} bytes", ptr);
        Ok(())
    }

    /// Header offset of the live allocation behind `ptr`.
    pub(crate) fn validate(&self, ptr: *const u8) -> Result<usize, PointerFault> {
        if ptr.is_null() {
            return Err(PointerFault::Null);
        }
        if ptr as usize % ALIGNMENT != 0 {
            return Err(PointerFault::Misaligned);
        }
        if !self.is_initialized() {
            return Err(PointerFault::OutOfBounds);
        }

        let words = self.words();
        let epilogue = self.epilogue();
        let offset = words
            .header_offset_of(ptr)
            .filter(|&offset| (FIRST_BLOCK_OFFSET..epilogue).contains(&offset))
            .ok_or(PointerFault::OutOfBounds)?;

        let header = words.header(offset);
        let size = header.size();
        if size < MIN_BLOCK_SIZE
            || size % ALIGNMENT != 0
            || offset.checked_add(size).is_none_or(|end| end > epilogue)
        {
            return Err(PointerFault::BadSize);
        }
        if !header.is_allocated() {
            return Err(PointerFault::NotAllocated);
        }
        if !header.is_prev_allocated() {
            let left = words.footer_before(offset);
            if left.is_allocated()
                || left.size() < MIN_BLOCK_SIZE
                || left.size() > offset - FIRST_BLOCK_OFFSET
            {
                return Err(PointerFault::PrevAllocatedMismatch);
            }
        }

        Ok(offset)
    }

    /// Files a coalesced free block, keeping a single wilderness.
    ///
    /// An empty wilderness list adopts the block outright, even when it does
    /// not touch the epilogue. Otherwise the block replaces the current
    /// wilderness if it reaches past that block's start or ends at the
    /// epilogue, and goes to its size class if neither holds.
    pub(crate) fn reinsert(&mut self, offset: usize) {
        let words = self.words();
        let size = words.header(offset).size();
        let end = offset + size;

        match self.lists.wilderness() {
            None => self.lists.insert(words, WILDERNESS_LIST, offset),
            Some(wilderness) if end > wilderness => self.install_wilderness(offset),
            Some(_) if end == self.epilogue() => self.install_wilderness(offset),
            Some(_) => self.lists.insert(words, size_class_of(size), offset),
        }
    }
}
