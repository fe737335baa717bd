//! Process-wide heap in the shape of the C allocation functions.
//!
//! Every call goes through one lock around a lazily built
//! [`Heap<PageArena>`](crate::Heap). Pointer contract violations are fatal
//! here: the fault is logged and the process aborts.
//!
//! The heap behind the lock never logs. The facade itself only logs on the
//! way to an abort, after the lock is released, so an installed logger may
//! allocate through [`SegAlloc`].

use core::alloc::{GlobalAlloc, Layout};
use core::ptr::{self, NonNull};

use lazy_static::lazy_static;
use spin::Mutex;

use crate::config::{ALIGNMENT, ArenaConfig};
use crate::error::{ErrorCode, HeapError};
use crate::heap::Heap;
use crate::page_arena::PageArena;

lazy_static! {
    static ref HEAP: Mutex<Heap<PageArena>> =
        Mutex::new(Heap::new(PageArena::new(ArenaConfig::default())).without_logging());
}

fn fatal(op: &str, ptr: *mut u8, err: HeapError) -> ! {
    log::error!("{op}({:p}): {err}, aborting", ptr);
    unsafe { libc::abort() }
}

/// Allocates `size` bytes aligned to [`ALIGNMENT`]; null when `size` is zero
/// or the heap is exhausted.
pub fn malloc(size: usize) -> *mut u8 {
    HEAP.lock()
        .allocate(size)
        .map_or(ptr::null_mut(), NonNull::as_ptr)
}

/// # Safety
/// `ptr` must come from this module (or [`SegAlloc`]) and not be freed yet.
/// Anything the heap can tell is not a live allocation, null included,
/// aborts the process.
pub unsafe fn free(ptr: *mut u8) {
    let result = unsafe { HEAP.lock().release(ptr) };
    if let Err(err) = result {
        fatal("free", ptr, err);
    }
}

/// Resizes an allocation. A zero `size` frees it and returns null; a failed
/// growth returns null and leaves `ptr` valid.
///
/// # Safety
/// Same contract as [`free`].
pub unsafe fn realloc(ptr: *mut u8, size: usize) -> *mut u8 {
    let result = unsafe { HEAP.lock().reallocate(ptr, size) };
    match result {
        Ok(moved) => moved.map_or(ptr::null_mut(), NonNull::as_ptr),
        Err(err) => fatal("realloc", ptr, err),
    }
}

/// Allocates `size` bytes at a multiple of `alignment`, which must be a
/// power of two of at least [`ALIGNMENT`].
pub fn memalign(alignment: usize, size: usize) -> *mut u8 {
    HEAP.lock()
        .aligned_allocate(size, alignment)
        .map_or(ptr::null_mut(), NonNull::as_ptr)
}

/// The last failure condition as a C errno value, `0` if none is set.
pub fn errno() -> i32 {
    HEAP.lock().last_error().map_or(0, ErrorCode::as_errno)
}

pub fn clear_errno() {
    HEAP.lock().clear_error();
}

/// [`GlobalAlloc`] adapter over the process-wide heap.
///
/// Not installed by this crate; register it with `#[global_allocator]` where
/// wanted.
pub struct SegAlloc;

unsafe impl GlobalAlloc for SegAlloc {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let size = layout.size().max(1);
        if layout.align() <= ALIGNMENT {
            malloc(size)
        } else {
            memalign(layout.align(), size)
        }
    }

    unsafe fn dealloc(&self, ptr: *mut u8, _layout: Layout) {
        unsafe { free(ptr) }
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        if layout.align() <= ALIGNMENT {
            return unsafe { realloc(ptr, new_size.max(1)) };
        }

        // the heap only keeps the default alignment when it moves a block
        let Ok(new_layout) = Layout::from_size_align(new_size, layout.align()) else {
            return ptr::null_mut();
        };
        let moved = unsafe { self.alloc(new_layout) };
        if !moved.is_null() {
            unsafe {
                ptr::copy_nonoverlapping(ptr, moved, layout.size().min(new_size));
                self.dealloc(ptr, layout);
            }
        }
        moved
    }
}

#[cfg(test)]
mod test {
    use super::*;

    // the facade is shared by every test in the process
    static SERIAL: Mutex<()> = Mutex::new(());

    #[test]
    fn malloc_free_round_trip() {
        let _serial = SERIAL.lock();

        let p = malloc(100);
        assert!(!p.is_null());
        assert_eq!(p as usize % ALIGNMENT, 0);
        unsafe {
            p.write_bytes(0x42, 100);
            free(p);
        }
        assert!(malloc(0).is_null());
    }

    #[test]
    fn realloc_preserves_contents() {
        let _serial = SERIAL.lock();

        unsafe {
            let p = malloc(16);
            for i in 0..16 {
                p.add(i).write(i as u8);
            }
            let q = realloc(p, 400);
            assert!(!q.is_null());
            for i in 0..16 {
                assert_eq!(q.add(i).read(), i as u8);
            }
            assert!(realloc(q, 0).is_null());
        }
    }

    #[test]
    fn memalign_and_errno() {
        let _serial = SERIAL.lock();

        clear_errno();
        let p = memalign(512, 40);
        assert_eq!(p as usize % 512, 0);
        assert_eq!(errno(), 0);
        unsafe { free(p) };

        assert!(memalign(24, 40).is_null());
        assert_eq!(errno(), libc::EINVAL);
        clear_errno();
        assert_eq!(errno(), 0);
    }

    #[test]
    fn exhaustion_sets_enomem() {
        let _serial = SERIAL.lock();

        clear_errno();
        assert!(malloc(ArenaConfig::default().capacity()).is_null());
        assert_eq!(errno(), libc::ENOMEM);

        // space grown on the way stays usable
        let p = malloc(1000);
        assert!(!p.is_null());
        unsafe { free(p) };
        clear_errno();
    }

    #[test]
    fn global_alloc_adapter() {
        let _serial = SERIAL.lock();
        let alloc = SegAlloc;

        unsafe {
            let small = Layout::from_size_align(24, 8).unwrap();
            let p = alloc.alloc(small);
            assert!(!p.is_null());
            p.write_bytes(7, 24);

            let p = alloc.realloc(p, small, 200);
            assert_eq!(p.read(), 7);
            alloc.dealloc(p, Layout::from_size_align(200, 8).unwrap());

            let wide = Layout::from_size_align(64, 256).unwrap();
            let q = alloc.alloc(wide);
            assert_eq!(q as usize % 256, 0);
            q.write_bytes(9, 64);

            let q = alloc.realloc(q, wide, 1000);
            assert_eq!(q as usize % 256, 0);
            assert_eq!(q.add(63).read(), 9);
            alloc.dealloc(q, Layout::from_size_align(1000, 256).unwrap());
        }
    }
}
