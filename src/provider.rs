use core::ptr::NonNull;

/// Source of arena memory.
///
/// The arena is one contiguous region that only ever grows at its high end,
/// one fixed-size page per call. Memory is never handed back.
///
/// The start must be aligned to [`ALIGNMENT`](crate::config::ALIGNMENT) and a
/// page must be large enough to satisfy [`ArenaConfig::new`](crate::ArenaConfig::new).
pub trait ArenaProvider {
    /// Extends the arena by one page and returns the start of the new page,
    /// or `None` once the underlying resource is exhausted. A failed call
    /// leaves the arena bounds unchanged.
    fn grow(&mut self) -> Option<NonNull<u8>>;

    /// Low boundary of the arena. Equal to [`end`](Self::end) until the first
    /// successful [`grow`](Self::grow), and stable afterwards.
    fn start(&self) -> *mut u8;

    /// Current high boundary (exclusive).
    fn end(&self) -> *mut u8;

    fn page_size(&self) -> usize;

    fn len(&self) -> usize {
        self.end() as usize - self.start() as usize
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
