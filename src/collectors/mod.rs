//! Garbage collectors built on top of the allocators in [`crate::alloc`].

pub mod mark_sweep;
