//! A flat mark and sweep collector over the free-list heap.
//!
//! Reachability is exactly "referenced by an entry on the root stack". The
//! collector never looks inside a payload unless the caller asks it to with
//! [`MarkSweepHeap::collect_with`].

use core::fmt;
use core::ptr::NonNull;

use log::{debug, error, trace};
use rust_alloc::vec::Vec;

use crate::alloc::arena::Arena;
use crate::alloc::free_list::{BlockHandle, BlockInfo, FreeListAllocator, block_size_for};
use crate::error::HeapError;

mod roots;


pub use roots::{DEFAULT_ROOT_CAPACITY, RootStack};

/// Outcome of one collection cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectStats {
    pub collected: usize,
    pub before: usize,
    pub after: usize,
}

impl fmt::Display for CollectStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Objects collected: [{}]. Before: [{}]. After: [{}]",
            self.collected, self.before, self.after
        )
    }
}

/// The heap state: directory, root stack and live-object counter.
///
/// A heap is single threaded. It is neither `Send` nor `Sync`; share it by
/// wrapping the whole value in a lock.
#[derive(Debug, Default)]
pub struct MarkSweepHeap {
    pub(crate) allocator: FreeListAllocator,
    roots: RootStack,
    // allocations not yet reclaimed by a sweep
    live_objects: usize,
    // set once the directory fails an integrity check
    poisoned: bool,
}

impl MarkSweepHeap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_root_capacity(mut self, capacity: usize) -> Self {
        debug_assert!(self.roots.is_empty(), "configure the heap before using it");
        self.roots = RootStack::with_capacity(capacity);
        self
    }

    /// Sets how much address space the arena may grow into.
    pub fn with_arena_reserve(mut self, reserve: usize) -> Self {
        debug_assert!(
            self.allocator.arena().is_empty(),
            "configure the heap before using it"
        );
        self.allocator = FreeListAllocator::new(Arena::with_reserve(reserve));
        self
    }
}

impl MarkSweepHeap {
    fn ensure_healthy(&self) -> Result<(), HeapError> {
        if self.poisoned {
            return Err(HeapError::CorruptDirectory);
        }
        Ok(())
    }

    // poisons the heap on fatal errors before handing them back
    fn check<T>(&mut self, result: Result<T, HeapError>) -> Result<T, HeapError> {
        if let Err(err) = &result {
            if err.is_fatal() && !self.poisoned {
                error!("heap poisoned: {err}");
                self.poisoned = true;
            }
        }
        result
    }

    /// Allocates `size` payload bytes, roots the new block and returns its
    /// payload address.
    pub fn allocate(&mut self, size: usize) -> Result<NonNull<u8>, HeapError> {
        self.ensure_healthy()?;
        let Some(block_size) = block_size_for(size) else {
            debug!("allocate: rejecting size {size}");
            return Err(HeapError::InvalidSize);
        };
        // check before touching the directory so a full stack leaves no trace
        if self.roots.is_full() {
            debug!("allocate: root stack full ({} entries)", self.roots.len());
            return Err(HeapError::RootStackOverflow);
        }

        let result = self.allocator.allocate_block(block_size);
        let handle = self.check(result)?;
        let result = self.allocator.payload_ptr(handle);
        let ptr = self.check(result)?;

        self.roots.push(handle)?;
        self.live_objects += 1;
        trace!("allocate: {size} bytes at {handle}");
        Ok(ptr)
    }

    /// Returns a block to the free pool and coalesces the directory.
    ///
    /// A null pointer is ignored. The root stack and the live-object counter
    /// are left alone.
    pub fn release(&mut self, ptr: *mut u8) -> Result<(), HeapError> {
        if ptr.is_null() {
            return Ok(());
        }
        self.ensure_healthy()?;
        let handle = self
            .allocator
            .lookup_payload(ptr)
            .ok_or(HeapError::InvalidPointer)?;
        let result = self.allocator.free_block(handle);
        self.check(result)
    }

    /// Pops the most recent root and returns its payload address.
    pub fn pop_root(&mut self) -> Result<NonNull<u8>, HeapError> {
        self.ensure_healthy()?;
        let handle = self.roots.peek().ok_or(HeapError::EmptyRootStack)?;
        let result = self.allocator.payload_ptr(handle);
        let ptr = self.check(result)?;
        self.roots.pop();
        Ok(ptr)
    }

    /// Roots an in-use block again from its payload address.
    pub fn push_root(&mut self, ptr: NonNull<u8>) -> Result<(), HeapError> {
        self.ensure_healthy()?;
        let handle = self
            .allocator
            .lookup_payload(ptr.as_ptr())
            .ok_or(HeapError::InvalidPointer)?;
        let result = self.allocator.header(handle);
        if self.check(result)?.is_free() {
            return Err(HeapError::InvalidPointer);
        }
        self.roots.push(handle)
    }

    /// Runs one full collection cycle.
    pub fn collect(&mut self) -> Result<CollectStats, HeapError> {
        self.collect_with(|_, _| {})
    }

    /// Runs one collection cycle, tracing through payloads with `scan`.
    ///
    /// `scan` is called once for every block the mark phase reaches, with the
    /// block's payload and a callback to report payload addresses the block
    /// refers to. Reported addresses that do not start the payload of an in-use
    /// block are ignored.
    pub fn collect_with<F>(&mut self, mut scan: F) -> Result<CollectStats, HeapError>
    where
        F: FnMut(&[u8], &mut dyn FnMut(*const u8)),
    {
        self.ensure_healthy()?;
        let before = self.live_objects;

        let result = self.run_mark_phase(&mut scan);
        self.check(result)?;
        let result = self.run_sweep_phase();
        self.check(result)?;

        let after = self.live_objects;
        let stats = CollectStats {
            collected: before - after,
            before,
            after,
        };
        debug!("{stats}");
        Ok(stats)
    }

    pub(crate) fn run_mark_phase<F>(&mut self, scan: &mut F) -> Result<(), HeapError>
    where
        F: FnMut(&[u8], &mut dyn FnMut(*const u8)),
    {
        // roots whose block was merged away by a manual release are stale
        let live = self.allocator.handles();
        let mut worklist = Vec::new();

        for &root in self.roots.as_slice() {
            if !live.contains(&root) {
                trace!("mark: skipping stale root {root}");
                continue;
            }
            if self.allocator.mark(root)? {
                worklist.push(root);
            }
        }

        let mut children = Vec::new();
        while let Some(handle) = worklist.pop() {
            let payload = self.allocator.payload(handle)?;
            scan(payload, &mut |ptr| children.push(ptr));

            for child in children.drain(..) {
                let Some(child) = self.allocator.handle_for_payload(child) else {
                    continue;
                };
                if !live.contains(&child) || self.allocator.header(child)?.is_free() {
                    continue;
                }
                if self.allocator.mark(child)? {
                    worklist.push(child);
                }
            }
        }
        Ok(())
    }

    /// Walks backwards from the tail, clearing marks on survivors and freeing
    /// every unmarked in-use block.
    pub(crate) fn run_sweep_phase(&mut self) -> Result<(), HeapError> {
        let mut cursor = self.allocator.tail();
        // a walk longer than the directory means the links form a cycle
        let mut steps = self.allocator.block_count();
        while let Some(handle) = cursor {
            steps = steps.checked_sub(1).ok_or(HeapError::CorruptDirectory)?;
            let header = self.allocator.header(handle)?;
            // captured before freeing: coalescing may absorb `handle` into it
            cursor = header.prev();

            if header.is_marked() {
                self.allocator.set_marked(handle, false)?;
                continue;
            }
            if header.is_free() {
                continue;
            }

            trace!("sweep: reclaiming {handle}");
            self.allocator.free_block(handle)?;
            self.live_objects = self
                .live_objects
                .checked_sub(1)
                .ok_or(HeapError::CorruptDirectory)?;
        }
        Ok(())
    }
}

// ==== Inspection ====

impl MarkSweepHeap {
    /// Checks the directory invariants, poisoning the heap if they fail.
    pub fn verify(&mut self) -> Result<(), HeapError> {
        self.ensure_healthy()?;
        let result = self.allocator.verify();
        self.check(result)
    }

    /// Snapshots of every block in address order.
    pub fn blocks(&self) -> impl Iterator<Item = BlockInfo> + '_ {
        self.allocator
            .iter()
            .map(|(handle, header)| self.allocator.info(handle, &header))
    }

    /// Payload bytes available behind `ptr`, if it is a block payload.
    pub fn payload_size(&self, ptr: *const u8) -> Option<usize> {
        let handle = self.allocator.lookup_payload(ptr)?;
        self.allocator.payload(handle).ok().map(<[u8]>::len)
    }

    pub fn live_objects(&self) -> usize {
        self.live_objects
    }

    pub fn roots(&self) -> &[BlockHandle] {
        self.roots.as_slice()
    }

    pub fn roots_len(&self) -> usize {
        self.roots.len()
    }

    pub fn root_capacity(&self) -> usize {
        self.roots.capacity()
    }

    pub fn block_count(&self) -> usize {
        self.allocator.block_count()
    }

    /// Bytes granted to the arena by the OS.
    pub fn arena_len(&self) -> usize {
        self.allocator.arena().len()
    }

    pub fn free_bytes(&self) -> usize {
        self.allocator.free_bytes()
    }

    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }
}

impl crate::collector::Collector for MarkSweepHeap {
    fn collect(&mut self) -> Result<CollectStats, HeapError> {
        MarkSweepHeap::collect(self)
    }

    fn live_objects(&self) -> usize {
        self.live_objects
    }
}
