//! Segregated-fit heap with boundary tags.
//!
//! Blocks live in one arena that grows a page at a time. Every block carries
//! a header, free blocks also a footer, so neighbours merge in constant time.
//! Free blocks are filed on eight size classes plus a dedicated list holding
//! the wilderness, the free block at the arena's high end that absorbs new
//! pages.
//!
//! [`Heap`] is the allocator proper and can sit on any [`ArenaProvider`].
//! The [`allocator`] module wraps one heap over a [`PageArena`] behind a lock
//! and exposes it in the C style and as a [`GlobalAlloc`](core::alloc::GlobalAlloc).
#![no_std]

#[cfg(test)]
extern crate std;

/// Forwards to `log` unless the heap was built
/// [`without_logging`](crate::Heap::without_logging).
macro_rules! heap_log {
    ($heap:expr, $level:ident, $($arg:tt)+) => {
        if $heap.logging {
            log::$level!($($arg)+);
        }
    };
}

mod aligned;
pub mod allocator;
pub mod block;
pub mod config;
pub mod error;
pub mod free_list;
mod heap;
mod inspect;
mod linear_arena;
mod page_arena;
pub mod provider;
mod realloc;
mod release;

pub use allocator::SegAlloc;
pub use block::{BlockInfo, Header, block_size_for};
pub use config::ArenaConfig;
pub use error::{ErrorCode, HeapError, PointerFault};
pub use free_list::size_class_of;
pub use heap::Heap;
pub use inspect::{Blocks, HeapStats};
pub use linear_arena::LinearArena;
pub use page_arena::PageArena;
pub use provider::ArenaProvider;
