use core::marker::PhantomData;
use core::ptr::NonNull;

use crate::config::{ALIGNMENT, ArenaConfig};
use crate::provider::ArenaProvider;

/// Arena that hands out pages of a caller-owned buffer, front to back.
///
/// Useful where no virtual memory is available and for deterministic tests.
/// The buffer start is aligned up to the block alignment; the arena is
/// exhausted when either the buffer or `max_pages` runs out.
pub struct LinearArena<'a> {
    base: NonNull<u8>,
    capacity: usize,
    len: usize,
    config: ArenaConfig,
    _buf: PhantomData<&'a mut [u8]>,
}

impl<'a> LinearArena<'a> {
    pub fn new(buf: &'a mut [u8], config: ArenaConfig) -> LinearArena<'a> {
        let offset = buf.as_ptr().align_offset(ALIGNMENT).min(buf.len());
        let capacity = buf.len() - offset;
        let base = NonNull::from(&mut buf[offset..]).cast::<u8>();
        LinearArena {
            base,
            capacity,
            len: 0,
            config,
            _buf: PhantomData,
        }
    }

    /// Pages the buffer could still supply.
    pub fn remaining_pages(&self) -> usize {
        let by_buffer = (self.capacity - self.len) / self.config.page_size();
        let by_config = self.config.max_pages() - self.len / self.config.page_size();
        by_buffer.min(by_config)
    }
}

impl ArenaProvider for LinearArena<'_> {
    fn grow(&mut self) -> Option<NonNull<u8>> {
        if self.remaining_pages() == 0 {
            return None;
        }

        let page_start = unsafe { self.base.add(self.len) };
        self.len += self.config.page_size();
        Some(page_start)
    }

    fn start(&self) -> *mut u8 {
        self.base.as_ptr()
    }

    fn end(&self) -> *mut u8 {
        self.start().wrapping_add(self.len)
    }

    fn page_size(&self) -> usize {
        self.config.page_size()
    }
}

#[cfg(test)]
mod test {
    use std::vec;

    use super::*;

    #[test]
    fn pages_come_from_the_buffer() {
        let mut buf = vec![0u8; 3 * 2048 + 100];
        let range = buf.as_ptr_range();
        let mut arena = LinearArena::new(&mut buf, ArenaConfig::default());

        assert_eq!(arena.start() as usize % ALIGNMENT, 0);
        assert!(arena.is_empty());
        assert_eq!(arena.remaining_pages(), 3);

        let first = arena.grow().unwrap();
        assert_eq!(first.as_ptr(), arena.start());
        assert!(arena.grow().is_some());
        assert!(arena.grow().is_some());
        assert!(arena.grow().is_none());

        assert_eq!(arena.len(), 3 * 2048);
        assert!(range.contains(&(arena.end().wrapping_sub(1) as *const u8)));
    }

    #[test]
    fn respects_max_pages() {
        let mut buf = vec![0u8; 8 * 2048];
        let mut arena = LinearArena::new(&mut buf, ArenaConfig::new(2048, 2).unwrap());

        assert!(arena.grow().is_some());
        assert!(arena.grow().is_some());
        assert!(arena.grow().is_none());
    }
}
