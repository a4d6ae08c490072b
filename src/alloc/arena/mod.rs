//! A contiguous, monotonically growing region of raw memory.
//!
//! The arena behaves like a private program break: [`Arena::grow`] hands out
//! the next `n` bytes after the current end and never gives anything back
//! until the arena itself is dropped. Everything above it addresses memory by
//! byte offset from [`Arena::base`].

use core::ptr::NonNull;

use log::{debug, trace};

use crate::error::HeapError;

pub(crate) mod sys;

#[cfg(test)]
mod tests;

/// Default amount of address space reserved for one arena (64 MiB).
pub const DEFAULT_ARENA_RESERVE: usize = 64 * 1024 * 1024;

#[derive(Debug)]
pub struct Arena {
    base: Option<NonNull<u8>>,
    // size of the reservation, a multiple of `page_size`
    reserved: usize,
    // bytes made accessible so far, a multiple of `page_size`
    committed: usize,
    // the break: bytes granted to the directory
    len: usize,
    page_size: usize,
}

impl Default for Arena {
    fn default() -> Self {
        Self::with_reserve(DEFAULT_ARENA_RESERVE)
    }
}

impl Arena {
    /// Creates an arena that may grow up to `reserve` bytes, rounded up to a
    /// whole number of pages. No memory is requested until the first call to
    /// [`Arena::grow`].
    pub fn with_reserve(reserve: usize) -> Self {
        let page_size = sys::page_size();
        let reserved = round_up(reserve.max(1), page_size).unwrap_or(usize::MAX & !(page_size - 1));
        Self {
            base: None,
            reserved,
            committed: 0,
            len: 0,
            page_size,
        }
    }

    /// Extends the arena by exactly `by` bytes and returns the offset of the
    /// first new byte.
    ///
    /// Fails with [`HeapError::OutOfMemory`] if the OS refuses the reservation
    /// or the commit, or if the reservation is exhausted. The arena is left
    /// untouched on failure.
    pub fn grow(&mut self, by: usize) -> Result<usize, HeapError> {
        let new_len = self.len.checked_add(by).ok_or(HeapError::OutOfMemory)?;
        if new_len > self.reserved {
            debug!(
                "arena: refusing to grow by {by} bytes, {} of {} bytes in use",
                self.len, self.reserved
            );
            return Err(HeapError::OutOfMemory);
        }

        let base = match self.base {
            Some(base) => base,
            None => {
                let base = sys::reserve(self.reserved).ok_or(HeapError::OutOfMemory)?;
                trace!("arena: reserved {} bytes at {base:p}", self.reserved);
                self.base = Some(base);
                base
            }
        };

        if new_len > self.committed {
            let target = round_up(new_len, self.page_size)
                .unwrap_or(self.reserved)
                .min(self.reserved);
            // SAFETY: `committed` is page aligned and `target` never passes the
            // end of the reservation
            let ok = unsafe {
                let start = base.add(self.committed);
                sys::commit(start, target - self.committed)
            };
            if !ok {
                debug!("arena: commit of {} bytes failed", target - self.committed);
                return Err(HeapError::OutOfMemory);
            }
            self.committed = target;
        }

        let offset = self.len;
        self.len = new_len;
        trace!("arena: break moved {offset} -> {new_len}");
        Ok(offset)
    }

    pub fn base(&self) -> Option<NonNull<u8>> {
        self.base
    }

    /// Bytes granted so far.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn committed(&self) -> usize {
        self.committed
    }

    pub fn reserved(&self) -> usize {
        self.reserved
    }

    /// Returns a pointer `offset` bytes into the arena if `offset..offset + len`
    /// lies inside the granted region.
    pub fn ptr_at(&self, offset: usize, len: usize) -> Option<NonNull<u8>> {
        let end = offset.checked_add(len)?;
        if end > self.len {
            return None;
        }
        // SAFETY: `offset` is within the granted part of the reservation
        self.base.map(|base| unsafe { base.add(offset) })
    }

    /// Inverse of [`Arena::ptr_at`]: the offset of `ptr` if it points into the
    /// granted region.
    pub fn offset_of(&self, ptr: *const u8) -> Option<usize> {
        let base = self.base?.as_ptr() as usize;
        let offset = (ptr as usize).checked_sub(base)?;
        (offset < self.len).then_some(offset)
    }
}

impl Drop for Arena {
    fn drop(&mut self) {
        if let Some(base) = self.base.take() {
            // SAFETY: `base` and `reserved` describe the reservation made in `grow`
            unsafe { sys::release(base, self.reserved) };
        }
    }
}

const fn round_up(value: usize, align: usize) -> Option<usize> {
    match value.checked_add(align - 1) {
        Some(v) => Some(v & !(align - 1)),
        None => None,
    }
}
