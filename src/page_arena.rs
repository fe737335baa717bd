use core::ffi::c_void;
use core::ptr::{self, NonNull};

use lazy_static::lazy_static;

use crate::config::ArenaConfig;
use crate::provider::ArenaProvider;

lazy_static! {
    pub static ref OS_PAGE_SIZE: usize = os_page_size();
}

fn os_page_size() -> usize {
    match unsafe { libc::sysconf(libc::_SC_PAGESIZE) } {
        size if size > 0 => size as usize,
        _ => 4096,
    }
}

fn round_up(value: usize, to: usize) -> usize {
    value.div_ceil(to) * to
}

/// Arena backed by anonymous virtual memory.
///
/// The whole capacity is reserved with `PROT_NONE` on the first growth and
/// committed page by page with `mprotect`, so the arena never moves.
pub struct PageArena {
    config: ArenaConfig,
    reserved: Option<NonNull<u8>>,
    /// Bytes handed out as arena pages.
    len: usize,
    /// Bytes made readable and writable; a multiple of the OS page size.
    committed: usize,
}

// The reservation is owned exclusively by this value.
unsafe impl Send for PageArena {}

impl PageArena {
    pub const fn new(config: ArenaConfig) -> PageArena {
        PageArena {
            config,
            reserved: None,
            len: 0,
            committed: 0,
        }
    }

    pub fn config(&self) -> ArenaConfig {
        self.config
    }

    fn reserve(&mut self) -> Option<NonNull<u8>> {
        if let Some(base) = self.reserved {
            return Some(base);
        }

        let size = round_up(self.config.capacity(), *OS_PAGE_SIZE);
        let ptr = unsafe {
            libc::mmap(
                ptr::null_mut(),
                size,
                libc::PROT_NONE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            return None;
        }

        let base = NonNull::new(ptr.cast::<u8>())?;
        self.reserved = Some(base);
        Some(base)
    }

    fn commit(&mut self, base: NonNull<u8>, upto: usize) -> bool {
        if upto <= self.committed {
            return true;
        }

        let target = round_up(upto, *OS_PAGE_SIZE);
        let rc = unsafe {
            libc::mprotect(
                base.as_ptr().add(self.committed).cast::<c_void>(),
                target - self.committed,
                libc::PROT_READ | libc::PROT_WRITE,
            )
        };
        if rc != 0 {
            return false;
        }

        self.committed = target;
        true
    }
}

impl ArenaProvider for PageArena {
    fn grow(&mut self) -> Option<NonNull<u8>> {
        let page = self.config.page_size();
        if self.len + page > self.config.capacity() {
            return None;
        }

        let base = self.reserve()?;
        if !self.commit(base, self.len + page) {
            return None;
        }

        let page_start = unsafe { base.add(self.len) };
        self.len += page;
        Some(page_start)
    }

    fn start(&self) -> *mut u8 {
        self.reserved.map_or(ptr::null_mut(), NonNull::as_ptr)
    }

    fn end(&self) -> *mut u8 {
        match self.reserved {
            Some(base) => unsafe { base.as_ptr().add(self.len) },
            None => ptr::null_mut(),
        }
    }

    fn page_size(&self) -> usize {
        self.config.page_size()
    }
}
