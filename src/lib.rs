//! A small self-managed heap: a first-fit free-list allocator with block
//! splitting and coalescing, under a flat mark and sweep collector.
//!
//! The heap owns one contiguous arena that grows on demand from the OS. Every
//! allocation is pushed onto a bounded root stack; popping a root makes the
//! block eligible for the next [`MarkSweepHeap::collect`].

#![no_std]

extern crate alloc as rust_alloc;

pub mod alloc;
pub mod collector;
pub mod collectors;
pub mod dump;
pub mod error;

pub use crate::alloc::arena::{Arena, DEFAULT_ARENA_RESERVE};
pub use crate::alloc::free_list::{
    BLOCK_ALIGN, BlockHandle, BlockInfo, FreeListAllocator, HEADER_SIZE, block_size_for,
};
pub use crate::collector::Collector;
pub use crate::collectors::mark_sweep::{
    CollectStats, DEFAULT_ROOT_CAPACITY, MarkSweepHeap, RootStack,
};
pub use crate::dump::HeapDump;
pub use crate::error::HeapError;
