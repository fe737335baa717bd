use core::ptr::NonNull;

use crate::config::{ALIGNMENT, BLOCK_OVERHEAD, MIN_BLOCK_SIZE, WORD_SIZE};

/// Set while the block is handed out to a client (and on both sentinels).
pub const ALLOCATED: u64 = 0x10;
/// Mirrors the allocation state of the block immediately to the left.
pub const PREV_ALLOCATED: u64 = 0x08;
const SIZE_MASK: u64 = !0x1f;

/// Block size needed to carry `payload` bytes.
pub fn block_size_for(payload: usize) -> usize {
    let total = payload.saturating_add(BLOCK_OVERHEAD);
    if total <= MIN_BLOCK_SIZE {
        return MIN_BLOCK_SIZE;
    }
    total.saturating_add(ALIGNMENT - 1) & !(ALIGNMENT - 1)
}

/// A decoded boundary tag.
///
/// The same word is stored as header and, while the block is free, as footer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header(u64);

impl Header {
    pub const fn new(size: usize, allocated: bool, prev_allocated: bool) -> Header {
        let mut raw = size as u64 & SIZE_MASK;
        if allocated {
            raw |= ALLOCATED;
        }
        if prev_allocated {
            raw |= PREV_ALLOCATED;
        }
        Header(raw)
    }

    pub const fn from_raw(raw: u64) -> Header {
        Header(raw)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }

    pub const fn size(self) -> usize {
        (self.0 & SIZE_MASK) as usize
    }

    pub const fn is_allocated(self) -> bool {
        self.0 & ALLOCATED != 0
    }

    pub const fn is_prev_allocated(self) -> bool {
        self.0 & PREV_ALLOCATED != 0
    }

    pub const fn with_size(self, size: usize) -> Header {
        Header((self.0 & !SIZE_MASK) | (size as u64 & SIZE_MASK))
    }

    pub const fn with_allocated(self, allocated: bool) -> Header {
        if allocated {
            Header(self.0 | ALLOCATED)
        } else {
            Header(self.0 & !ALLOCATED)
        }
    }

    pub const fn with_prev_allocated(self, prev_allocated: bool) -> Header {
        if prev_allocated {
            Header(self.0 | PREV_ALLOCATED)
        } else {
            Header(self.0 & !PREV_ALLOCATED)
        }
    }
}

/// A free-list link: either another free block or one of the list sentinels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Link {
    Head(usize),
    Block(usize),
}

const HEAD_TAG: u64 = 1 << 63;

impl Link {
    fn encode(self) -> u64 {
        match self {
            Link::Head(list) => HEAD_TAG | list as u64,
            Link::Block(offset) => offset as u64,
        }
    }

    fn decode(raw: u64) -> Link {
        if raw & HEAD_TAG != 0 {
            Link::Head((raw & !HEAD_TAG) as usize)
        } else {
            Link::Block(raw as usize)
        }
    }
}

/// Offset-addressed view of the arena's committed bytes.
///
/// All block metadata is reached through here; offsets are relative to the
/// arena start and every access is bounds checked against the committed size.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Words {
    base: NonNull<u8>,
    len: usize,
}

impl Words {
    /// # Safety
    /// `base..base + len` must be committed, writable, exclusively owned by the
    /// heap and aligned to `ALIGNMENT`.
    pub(crate) unsafe fn new(base: NonNull<u8>, len: usize) -> Words {
        Words { base, len }
    }

    pub(crate) fn len(self) -> usize {
        self.len
    }

    fn word(self, offset: usize) -> *mut u64 {
        assert!(
            offset % WORD_SIZE == 0 && offset + WORD_SIZE <= self.len,
            "arena word access out of range: {offset:#x}"
        );
        unsafe { self.base.as_ptr().add(offset).cast::<u64>() }
    }

    pub(crate) fn read(self, offset: usize) -> u64 {
        unsafe { self.word(offset).read() }
    }

    pub(crate) fn write(self, offset: usize, value: u64) {
        unsafe { self.word(offset).write(value) }
    }

    pub(crate) fn header(self, offset: usize) -> Header {
        Header(self.read(offset))
    }

    pub(crate) fn set_header(self, offset: usize, header: Header) {
        self.write(offset, header.0)
    }

    /// Copies the header to the last word of the block it describes.
    pub(crate) fn sync_footer(self, offset: usize) {
        let header = self.header(offset);
        self.write(offset + header.size() - WORD_SIZE, header.0);
    }

    /// Writes a free block's header and footer in one go.
    pub(crate) fn write_free(self, offset: usize, size: usize, prev_allocated: bool) {
        self.set_header(offset, Header::new(size, false, prev_allocated));
        self.sync_footer(offset);
    }

    /// Footer of the block ending right before `offset`.
    pub(crate) fn footer_before(self, offset: usize) -> Header {
        Header(self.read(offset - WORD_SIZE))
    }

    /// Updates the `PREV_ALLOCATED` bit of the block at `offset`, footer included
    /// when that block is free.
    pub(crate) fn set_prev_allocated(self, offset: usize, prev_allocated: bool) {
        let header = self.header(offset).with_prev_allocated(prev_allocated);
        self.set_header(offset, header);
        if !header.is_allocated() && header.size() != 0 {
            self.sync_footer(offset);
        }
    }

    pub(crate) fn next_link(self, offset: usize) -> Link {
        Link::decode(self.read(offset + WORD_SIZE))
    }

    pub(crate) fn prev_link(self, offset: usize) -> Link {
        Link::decode(self.read(offset + 2 * WORD_SIZE))
    }

    pub(crate) fn set_next_link(self, offset: usize, link: Link) {
        self.write(offset + WORD_SIZE, link.encode())
    }

    pub(crate) fn set_prev_link(self, offset: usize, link: Link) {
        self.write(offset + 2 * WORD_SIZE, link.encode())
    }

    pub(crate) fn payload(self, offset: usize) -> NonNull<u8> {
        unsafe { self.base.add(offset + WORD_SIZE) }
    }

    /// Offset of the header belonging to `payload`, if it lies inside the view.
    pub(crate) fn header_offset_of(self, payload: *const u8) -> Option<usize> {
        let start = self.base.as_ptr() as usize;
        let addr = payload as usize;
        if addr < start + WORD_SIZE || addr >= start + self.len {
            return None;
        }
        Some(addr - start - WORD_SIZE)
    }
}

/// A block decoded together with its free-list links.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Block {
    Free { size: usize, prev: Link, next: Link },
    Allocated,
}

impl Block {
    pub(crate) fn load(words: Words, offset: usize) -> Block {
        let header = words.header(offset);
        if header.is_allocated() {
            Block::Allocated
        } else {
            Block::Free {
                size: header.size(),
                prev: words.prev_link(offset),
                next: words.next_link(offset),
            }
        }
    }
}

/// Public summary of a block between the sentinels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
    /// Payload address of the block.
    pub address: NonNull<u8>,
    pub size: usize,
    pub allocated: bool,
}
