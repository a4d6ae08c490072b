//! A first-fit free-list allocator over a single growable [`Arena`].
//!
//! design: every block, free or in use, is a node in one doubly linked list
//! (the directory) ordered by address. Allocation takes the first free block
//! that is large enough, splitting it when it is at least twice the request,
//! and only grows the arena on a miss. Releasing a block runs a coalescing
//! pass so that no two neighbouring blocks are ever both free.

use core::ptr::NonNull;

use hashbrown::HashSet;
use log::trace;
use rustc_hash::FxBuildHasher;

use crate::alloc::arena::Arena;
use crate::error::HeapError;

mod block;

pub use block::{BLOCK_ALIGN, BlockHandle, BlockInfo, HEADER_SIZE, block_size_for};
pub(crate) use block::{BlockFlags, BlockHeader, Link};


pub(crate) type HandleSet = HashSet<BlockHandle, FxBuildHasher>;

#[derive(Debug, Default)]
pub struct FreeListAllocator {
    pub(crate) arena: Arena,
    head: Option<BlockHandle>,
    // last block by address, new arena growth is linked after it
    tail: Option<BlockHandle>,
    block_count: usize,
}

// ==== Header access ====

impl FreeListAllocator {
    pub fn new(arena: Arena) -> Self {
        Self {
            arena,
            head: None,
            tail: None,
            block_count: 0,
        }
    }

    fn header_ptr(&self, handle: BlockHandle) -> Result<NonNull<BlockHeader>, HeapError> {
        if handle.offset() % BLOCK_ALIGN != 0 {
            return Err(HeapError::CorruptDirectory);
        }
        self.arena
            .ptr_at(handle.offset(), HEADER_SIZE)
            .map(|ptr| ptr.cast::<BlockHeader>())
            .ok_or(HeapError::CorruptDirectory)
    }

    pub(crate) fn header(&self, handle: BlockHandle) -> Result<BlockHeader, HeapError> {
        let ptr = self.header_ptr(handle)?;
        // SAFETY: the header lies inside the granted arena, is aligned to
        // BLOCK_ALIGN, and every bit pattern is a valid BlockHeader
        Ok(unsafe { ptr.read() })
    }

    pub(crate) fn write_header(
        &mut self,
        handle: BlockHandle,
        header: BlockHeader,
    ) -> Result<(), HeapError> {
        let ptr = self.header_ptr(handle)?;
        // SAFETY: see `header`
        unsafe { ptr.write(header) };
        Ok(())
    }

    fn update(
        &mut self,
        handle: BlockHandle,
        f: impl FnOnce(&mut BlockHeader),
    ) -> Result<(), HeapError> {
        let mut header = self.header(handle)?;
        f(&mut header);
        self.write_header(handle, header)
    }

    pub(crate) fn set_free(&mut self, handle: BlockHandle, free: bool) -> Result<(), HeapError> {
        self.update(handle, |h| h.flags = h.flags.with_free(free))
    }

    pub(crate) fn set_marked(&mut self, handle: BlockHandle, marked: bool) -> Result<(), HeapError> {
        self.update(handle, |h| h.flags = h.flags.with_marked(marked))
    }

    /// Marks `handle`, returning `true` if it was not already marked.
    pub(crate) fn mark(&mut self, handle: BlockHandle) -> Result<bool, HeapError> {
        let header = self.header(handle)?;
        if header.is_marked() {
            return Ok(false);
        }
        self.set_marked(handle, true)?;
        Ok(true)
    }

    pub fn head(&self) -> Option<BlockHandle> {
        self.head
    }

    pub fn tail(&self) -> Option<BlockHandle> {
        self.tail
    }

    pub fn block_count(&self) -> usize {
        self.block_count
    }

    pub fn arena(&self) -> &Arena {
        &self.arena
    }

    pub fn payload_ptr(&self, handle: BlockHandle) -> Result<NonNull<u8>, HeapError> {
        self.arena
            .ptr_at(handle.payload_offset(), 0)
            .ok_or(HeapError::CorruptDirectory)
    }

    /// The payload bytes of `handle`.
    pub fn payload(&self, handle: BlockHandle) -> Result<&[u8], HeapError> {
        let header = self.header(handle)?;
        let len = header
            .size
            .checked_sub(HEADER_SIZE)
            .ok_or(HeapError::CorruptDirectory)?;
        let ptr = self
            .arena
            .ptr_at(handle.payload_offset(), len)
            .ok_or(HeapError::CorruptDirectory)?;
        // SAFETY: the range is inside the granted arena, which is zero filled
        // when committed, so every byte is initialized
        Ok(unsafe { core::slice::from_raw_parts(ptr.as_ptr(), len) })
    }
}

// ==== Allocation ====

impl FreeListAllocator {
    /// Returns an in-use block of `size` header-inclusive bytes, reusing free
    /// space when possible and growing the arena otherwise.
    pub fn allocate_block(&mut self, size: usize) -> Result<BlockHandle, HeapError> {
        debug_assert!(size >= HEADER_SIZE && size % BLOCK_ALIGN == 0);
        match self.find_free_block(size)? {
            Some(handle) => Ok(handle),
            None => self.request_memory(size),
        }
    }

    /// First fit: takes the first free block of at least `size` bytes, splits
    /// it if it is at least twice that, and marks it in use.
    pub(crate) fn find_free_block(
        &mut self,
        size: usize,
    ) -> Result<Option<BlockHandle>, HeapError> {
        let mut cursor = self.head;
        let mut steps = self.block_count;
        while let Some(handle) = cursor {
            steps = steps.checked_sub(1).ok_or(HeapError::CorruptDirectory)?;
            let header = self.header(handle)?;
            if header.is_free() && header.size >= size {
                if size
                    .checked_mul(2)
                    .is_some_and(|twice| header.size >= twice)
                {
                    self.split_block(handle, size)?;
                }
                self.set_free(handle, false)?;
                trace!("free_list: reusing {handle} for {size} bytes");
                return Ok(Some(handle));
            }
            cursor = header.next();
        }
        Ok(None)
    }

    /// Cuts `handle` into a block of exactly `size` bytes followed by a free
    /// block holding the remainder.
    pub(crate) fn split_block(&mut self, handle: BlockHandle, size: usize) -> Result<(), HeapError> {
        let mut header = self.header(handle)?;
        let remainder = header
            .size
            .checked_sub(size)
            .filter(|rest| *rest >= HEADER_SIZE)
            .ok_or(HeapError::CorruptDirectory)?;

        let new_handle = BlockHandle::from_offset(handle.offset() + size);
        let mut new_header = BlockHeader::new(remainder, Some(handle), BlockFlags::free());
        new_header.next = header.next;
        self.write_header(new_handle, new_header)?;

        match header.next() {
            Some(next) => self.update(next, |h| h.prev = Link::new(Some(new_handle)))?,
            None => self.tail = Some(new_handle),
        }

        header.size = size;
        header.next = Link::new(Some(new_handle));
        self.write_header(handle, header)?;
        self.block_count += 1;

        trace!("free_list: split {handle} into {size} + {remainder} at {new_handle}");
        Ok(())
    }

    /// Extends the arena by exactly `size` bytes and appends an in-use block
    /// covering them at the tail of the directory.
    pub(crate) fn request_memory(&mut self, size: usize) -> Result<BlockHandle, HeapError> {
        let offset = self.arena.grow(size)?;
        let handle = BlockHandle::from_offset(offset);
        let last = self.tail;

        self.write_header(handle, BlockHeader::new(size, last, BlockFlags::in_use()))?;
        match last {
            Some(last) => self.update(last, |h| h.next = Link::new(Some(handle)))?,
            None => self.head = Some(handle),
        }
        self.tail = Some(handle);
        self.block_count += 1;

        trace!("free_list: grew arena by {size} bytes for {handle}");
        Ok(handle)
    }
}

// ==== Release ====

impl FreeListAllocator {
    /// Marks `handle` free and coalesces the directory.
    pub fn free_block(&mut self, handle: BlockHandle) -> Result<(), HeapError> {
        self.set_free(handle, true)?;
        trace!("free_list: freed {handle}");
        self.coalesce()?;
        Ok(())
    }

    /// Walks the whole directory merging every pair of neighbouring free
    /// blocks. Returns the number of merges.
    pub fn coalesce(&mut self) -> Result<usize, HeapError> {
        let mut merges = 0;
        let mut cursor = self.head;
        // merges shrink the directory, so only moving forward spends a step
        let mut steps = self.block_count;
        while let Some(handle) = cursor {
            let header = self.header(handle)?;
            let Some(next) = header.next() else {
                break;
            };
            if header.is_free() && self.header(next)?.is_free() {
                self.merge(handle, next)?;
                merges += 1;
                // stay put, the grown block may now touch another free one
                continue;
            }
            steps = steps.checked_sub(1).ok_or(HeapError::CorruptDirectory)?;
            cursor = Some(next);
        }
        Ok(merges)
    }

    // absorbs `next` into `handle`
    fn merge(&mut self, handle: BlockHandle, next: BlockHandle) -> Result<(), HeapError> {
        let mut header = self.header(handle)?;
        let next_header = self.header(next)?;
        if handle.offset().checked_add(header.size) != Some(next.offset())
            || next_header.prev() != Some(handle)
        {
            return Err(HeapError::CorruptDirectory);
        }
        let remaining = self
            .block_count
            .checked_sub(1)
            .ok_or(HeapError::CorruptDirectory)?;

        header.size = header
            .size
            .checked_add(next_header.size)
            .ok_or(HeapError::CorruptDirectory)?;
        header.next = next_header.next;
        self.write_header(handle, header)?;

        match next_header.next() {
            Some(after) => self.update(after, |h| h.prev = Link::new(Some(handle)))?,
            None => self.tail = Some(handle),
        }
        self.block_count = remaining;

        trace!("free_list: merged {next} into {handle}, now {} bytes", header.size);
        Ok(())
    }
}

// ==== Lookup and inspection ====

impl FreeListAllocator {
    /// Iterates the directory in address order.
    pub(crate) fn iter(&self) -> Blocks<'_> {
        Blocks {
            allocator: self,
            cursor: self.head,
            remaining: self.block_count,
        }
    }

    /// Handles of every block currently in the directory.
    pub(crate) fn handles(&self) -> HandleSet {
        let mut set = HandleSet::with_capacity_and_hasher(self.block_count, FxBuildHasher);
        set.extend(self.iter().map(|(handle, _)| handle));
        set
    }

    /// Maps a pointer to the block whose payload starts there, without
    /// checking that the block is still in the directory.
    pub(crate) fn handle_for_payload(&self, ptr: *const u8) -> Option<BlockHandle> {
        let offset = self.arena.offset_of(ptr)?.checked_sub(HEADER_SIZE)?;
        (offset % BLOCK_ALIGN == 0).then(|| BlockHandle::from_offset(offset))
    }

    /// Finds the directory block whose payload starts at `ptr`.
    pub fn lookup_payload(&self, ptr: *const u8) -> Option<BlockHandle> {
        let target = self.handle_for_payload(ptr)?;
        self.iter()
            .map(|(handle, _)| handle)
            .take_while(|handle| *handle <= target)
            .find(|handle| *handle == target)
    }

    pub(crate) fn info(&self, handle: BlockHandle, header: &BlockHeader) -> BlockInfo {
        let address = self
            .arena
            .base()
            .map_or(core::ptr::null(), |base| {
                base.as_ptr().wrapping_add(handle.offset()).cast_const()
            });
        BlockInfo {
            handle,
            address,
            size: header.size,
            is_free: header.is_free(),
            marked: header.is_marked(),
        }
    }

    /// Bytes held by free blocks, headers included.
    pub fn free_bytes(&self) -> usize {
        self.iter()
            .filter(|(_, header)| header.is_free())
            .map(|(_, header)| header.size)
            .sum()
    }

    /// Checks every structural invariant of the directory.
    pub fn verify(&self) -> Result<(), HeapError> {
        let mut seen = HandleSet::with_capacity_and_hasher(self.block_count, FxBuildHasher);
        let mut expected_offset = 0;
        let mut prev: Option<(BlockHandle, BlockHeader)> = None;
        let mut cursor = self.head;

        while let Some(handle) = cursor {
            if !seen.insert(handle) || handle.offset() != expected_offset {
                return Err(HeapError::CorruptDirectory);
            }
            let header = self.header(handle)?;
            if header.size < HEADER_SIZE || header.size % BLOCK_ALIGN != 0 {
                return Err(HeapError::CorruptDirectory);
            }
            if header.prev() != prev.map(|(h, _)| h) || header.is_marked() {
                return Err(HeapError::CorruptDirectory);
            }
            if let Some((_, prev_header)) = prev {
                if prev_header.is_free() && header.is_free() {
                    return Err(HeapError::CorruptDirectory);
                }
            }
            expected_offset = expected_offset
                .checked_add(header.size)
                .ok_or(HeapError::CorruptDirectory)?;
            prev = Some((handle, header));
            cursor = header.next();
        }

        if prev.map(|(h, _)| h) != self.tail
            || seen.len() != self.block_count
            || expected_offset != self.arena.len()
        {
            return Err(HeapError::CorruptDirectory);
        }
        Ok(())
    }
}

/// Iterator over the directory, see [`FreeListAllocator::iter`].
///
/// Stops early if a header cannot be read.
pub(crate) struct Blocks<'a> {
    allocator: &'a FreeListAllocator,
    cursor: Option<BlockHandle>,
    // bounds the walk if the links ever form a cycle
    remaining: usize,
}

impl Iterator for Blocks<'_> {
    type Item = (BlockHandle, BlockHeader);

    fn next(&mut self) -> Option<Self::Item> {
        let handle = self.cursor?;
        if self.remaining == 0 {
            self.cursor = None;
            return None;
        }
        let Ok(header) = self.allocator.header(handle) else {
            self.cursor = None;
            return None;
        };
        self.remaining -= 1;
        self.cursor = header.next();
        Some((handle, header))
    }
}
