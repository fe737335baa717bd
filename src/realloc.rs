use core::ptr::{self, NonNull};

use crate::block::block_size_for;
use crate::config::{MIN_BLOCK_SIZE, WORD_SIZE};
use crate::error::HeapError;
use crate::heap::Heap;
use crate::provider::ArenaProvider;

impl<P: ArenaProvider> Heap<P> {
    /// Resizes the allocation behind `ptr` to hold `size` bytes.
    ///
    /// * `size == 0` releases the block and yields `Ok(None)`.
    /// * A larger block is allocated elsewhere, the contents copied and the old
    ///   block released. If that allocation fails the old block is left alone,
    ///   the result is `Ok(None)` and the condition is out-of-memory.
    /// * A smaller block shrinks in place, returning the tail to the heap
    ///   unless it would be a splinter.
    ///
    /// # Safety
    /// Same contract as [`release`](Self::release).
    pub unsafe fn reallocate(
        &mut self,
        ptr: *mut u8,
        size: usize,
    ) -> Result<Option<NonNull<u8>>, HeapError> {
        let offset = self.validate(ptr).inspect_err(|fault| {
            heap_log!(self, warn, "reallocate({:p}, {size}) rejected: {fault}", ptr);
        })?;

        if size == 0 {
            unsafe { self.release(ptr)? };
            return Ok(None);
        }

        let current = self.words().header(offset).size();
        let target = block_size_for(size);

        if target > current {
            let Some(moved) = self.allocate(size) else {
                heap_log!(
                    self,
                    warn,
                    "reallocate({:p}, {size}) -> out of memory, block kept",
                    ptr
                );
                return Ok(None);
            };

            let count = (current - WORD_SIZE).min(size);
            unsafe {
                ptr::copy_nonoverlapping(ptr, moved.as_ptr(), count);
                self.release(ptr)?;
            }
            heap_log!(
                self,
                trace,
                "reallocate({:p}, {size}) -> moved to {:p}",
                ptr,
                moved
            );
            return Ok(Some(moved));
        }

        if current - target >= MIN_BLOCK_SIZE {
            self.split_allocated(offset, target);
            heap_log!(self, trace, "reallocate({:p}, {size}) -> shrunk to {target}", ptr);
        }
        Ok(NonNull::new(ptr))
    }

    /// Cuts the allocated block at `offset` down to `keep` bytes and returns the
    /// tail to the heap, merged with a free right neighbour.
    pub(crate) fn split_allocated(&mut self, offset: usize, keep: usize) {
        let words = self.words();
        let header = words.header(offset);

        let rest = offset + keep;
        words.set_header(offset, header.with_size(keep));
        words.write_free(rest, header.size() - keep, true);

        self.coalesce_right(rest);
        let merged = words.header(rest).size();
        words.set_prev_allocated(rest + merged, false);
        self.reinsert(rest);
    }
}

#[cfg(test)]
mod test {
    use crate::config::{SENTINEL_OVERHEAD, WILDERNESS_LIST};
    use crate::error::{ErrorCode, PointerFault};
    use crate::heap::test::{PAGE, backing, heap};

    use super::*;

    #[test]
    fn realloc_larger_block() {
        let mut buf = backing(4);
        let mut heap = heap(&mut buf, 4);

        let x = heap.allocate(size_of::<i32>()).unwrap();
        let _y = heap.allocate(10).unwrap();
        unsafe { x.cast::<i32>().write(0x1234_5678) };

        let x = unsafe { heap.reallocate(x.as_ptr(), size_of::<i32>() * 20) }
            .unwrap()
            .unwrap();

        let header = heap.block_header(x).unwrap();
        assert!(header.is_allocated());
        assert_eq!(header.size(), 96);
        assert_eq!(unsafe { x.cast::<i32>().read() }, 0x1234_5678);

        assert_eq!(heap.free_block_count(0), 2);
        assert_eq!(heap.free_block_count(32), 1);
        assert_eq!(heap.free_block_count(1824), 1);
        heap.check().unwrap();
    }

    #[test]
    fn realloc_smaller_block_splinter() {
        let mut buf = backing(4);
        let mut heap = heap(&mut buf, 4);

        let x = heap.allocate(size_of::<i32>() * 20).unwrap();
        let y = unsafe { heap.reallocate(x.as_ptr(), size_of::<i32>() * 16) }
            .unwrap()
            .unwrap();

        assert_eq!(x, y);
        let header = heap.block_header(y).unwrap();
        assert!(header.is_allocated());
        assert_eq!(header.size(), 96);

        assert_eq!(heap.free_block_count(0), 1);
        assert_eq!(heap.free_block_count(1888), 1);
        heap.check().unwrap();
    }

    #[test]
    fn realloc_smaller_block_free_block() {
        let mut buf = backing(4);
        let mut heap = heap(&mut buf, 4);

        let x = heap.allocate(size_of::<f64>() * 8).unwrap();
        let y = unsafe { heap.reallocate(x.as_ptr(), size_of::<i32>()) }
            .unwrap()
            .unwrap();

        assert_eq!(x, y);
        let header = heap.block_header(y).unwrap();
        assert!(header.is_allocated());
        assert_eq!(header.size(), 32);

        // the cut-off tail merges with the wilderness
        assert_eq!(heap.free_block_count(0), 1);
        assert_eq!(heap.free_block_count(1952), 1);
        assert_eq!(heap.free_list_len(WILDERNESS_LIST), 1);
        heap.check().unwrap();
    }

    #[test]
    fn shrink_and_grow_back_keep_pointer() {
        let mut buf = backing(4);
        let mut heap = heap(&mut buf, 4);

        // 90 and 100 bytes both need a 128-byte block
        let p = heap.allocate(100).unwrap();
        let q = unsafe { heap.reallocate(p.as_ptr(), 90) }.unwrap().unwrap();
        let r = unsafe { heap.reallocate(q.as_ptr(), 100) }.unwrap().unwrap();

        assert_eq!(p, q);
        assert_eq!(q, r);
        heap.check().unwrap();
    }

    #[test]
    fn shrink_tail_goes_to_size_class() {
        let mut buf = backing(4);
        let mut heap = heap(&mut buf, 4);

        let p = heap.allocate(400).unwrap();
        let _guard = heap.allocate(8).unwrap();

        let q = unsafe { heap.reallocate(p.as_ptr(), 100) }.unwrap().unwrap();
        assert_eq!(p, q);
        assert_eq!(heap.block_header(q).unwrap().size(), 128);
        assert_eq!(heap.free_block_count(416 - 128), 1);
        assert_eq!(heap.free_block_count(0), 2);
        heap.check().unwrap();
    }

    #[test]
    fn zero_size_releases() {
        let mut buf = backing(4);
        let mut heap = heap(&mut buf, 4);

        let p = heap.allocate(64).unwrap();
        assert_eq!(unsafe { heap.reallocate(p.as_ptr(), 0) }, Ok(None));
        assert_eq!(heap.free_block_count(0), 1);
        assert_eq!(heap.free_block_count(PAGE - SENTINEL_OVERHEAD), 1);
        heap.check().unwrap();
    }

    #[test]
    fn failed_growth_keeps_old_block() {
        let mut buf = backing(2);
        let mut heap = heap(&mut buf, 2);

        let p = heap.allocate(64).unwrap();
        unsafe { p.as_ptr().write_bytes(0x5A, 64) };

        assert_eq!(unsafe { heap.reallocate(p.as_ptr(), 10 * PAGE) }, Ok(None));
        assert_eq!(heap.last_error(), Some(ErrorCode::OutOfMemory));

        let header = heap.block_header(p).unwrap();
        assert!(header.is_allocated());
        let bytes = unsafe { core::slice::from_raw_parts(p.as_ptr(), 64) };
        assert!(bytes.iter().all(|&b| b == 0x5A));
        unsafe { heap.release(p.as_ptr()).unwrap() };
        heap.check().unwrap();
    }

    #[test]
    fn rejects_null_and_misaligned() {
        let mut buf = backing(4);
        let mut heap = heap(&mut buf, 4);
        let p = heap.allocate(64).unwrap();

        unsafe {
            assert_eq!(
                heap.reallocate(core::ptr::null_mut(), 8),
                Err(HeapError::InvalidPointer(PointerFault::Null))
            );
            assert_eq!(
                heap.reallocate(p.as_ptr().add(1), 8),
                Err(HeapError::InvalidPointer(PointerFault::Misaligned))
            );
        }
    }

    #[test]
    fn free_after_realloc_three_pages() {
        let mut buf = backing(8);
        let mut heap = heap(&mut buf, 8);

        let size = 3 * PAGE - 32;
        let x = heap.allocate(size).unwrap();
        let x = unsafe { heap.reallocate(x.as_ptr(), size / 2) }.unwrap().unwrap();
        unsafe { heap.release(x.as_ptr()).unwrap() };

        assert_eq!(heap.free_block_count(0), 1);
        assert_eq!(heap.last_error(), None);
        heap.check().unwrap();
    }
}
