use crate::error::HeapError;

/// Every block size and every payload address is a multiple of this.
pub const ALIGNMENT: usize = 32;
pub const MIN_BLOCK_SIZE: usize = 32;
/// Width of a header, footer or free-list link.
pub const WORD_SIZE: usize = 8;
/// Header plus footer.
pub const BLOCK_OVERHEAD: usize = 2 * WORD_SIZE;

/// Leading padding, prologue block and epilogue header.
pub const SENTINEL_OVERHEAD: usize = PROLOGUE_OFFSET + MIN_BLOCK_SIZE + WORD_SIZE;
/// The prologue header sits here so the first real payload lands on `ALIGNMENT`.
pub const PROLOGUE_OFFSET: usize = ALIGNMENT - WORD_SIZE;
pub const FIRST_BLOCK_OFFSET: usize = PROLOGUE_OFFSET + MIN_BLOCK_SIZE;

pub const NUM_FREE_LISTS: usize = 9;
pub const WILDERNESS_LIST: usize = NUM_FREE_LISTS - 1;

pub const DEFAULT_PAGE_SIZE: usize = 2048;
pub const DEFAULT_MAX_PAGES: usize = 50;

/// Sizing of the arena handed out by an [`ArenaProvider`](crate::ArenaProvider).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArenaConfig {
    page_size: usize,
    max_pages: usize,
}

impl Default for ArenaConfig {
    fn default() -> Self {
        ArenaConfig {
            page_size: DEFAULT_PAGE_SIZE,
            max_pages: DEFAULT_MAX_PAGES,
        }
    }
}

impl ArenaConfig {
    pub fn new(page_size: usize, max_pages: usize) -> Result<ArenaConfig, HeapError> {
        if page_size % ALIGNMENT != 0 {
            return Err(HeapError::InvalidConfig(
                "page size must be a multiple of the block alignment",
            ));
        }
        if page_size < SENTINEL_OVERHEAD + 2 * MIN_BLOCK_SIZE {
            return Err(HeapError::InvalidConfig(
                "page size cannot hold the sentinels and two minimum blocks",
            ));
        }
        if max_pages == 0 {
            return Err(HeapError::InvalidConfig("arena needs at least one page"));
        }

        Ok(ArenaConfig {
            page_size,
            max_pages,
        })
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn max_pages(&self) -> usize {
        self.max_pages
    }

    /// Upper bound on the arena size in bytes.
    pub fn capacity(&self) -> usize {
        self.page_size * self.max_pages
    }
}
