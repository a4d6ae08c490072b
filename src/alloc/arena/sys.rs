//! Raw memory from the operating system.
//!
//! The arena reserves its whole address range up front and then commits it
//! page by page as the break advances. On Unix this is an anonymous
//! `PROT_NONE` mapping that is made readable and writable with `mprotect`.
//! Elsewhere the reservation is a single zeroed allocation from the global
//! allocator and committing is free.

use core::ptr::NonNull;

pub(crate) const FALLBACK_PAGE_SIZE: usize = 4096;

#[cfg(unix)]
mod imp {
    use core::ptr::{self, NonNull};

    use super::FALLBACK_PAGE_SIZE;

    pub(super) fn page_size() -> usize {
        // SAFETY: sysconf has no preconditions
        let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        if size <= 0 {
            FALLBACK_PAGE_SIZE
        } else {
            size as usize
        }
    }

    pub(super) fn reserve(len: usize) -> Option<NonNull<u8>> {
        // SAFETY: anonymous private mapping, no file descriptor involved
        let ptr = unsafe {
            libc::mmap(
                ptr::null_mut(),
                len,
                libc::PROT_NONE,
                libc::MAP_PRIVATE | libc::MAP_ANON,
                -1,
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            return None;
        }
        NonNull::new(ptr.cast::<u8>())
    }

    /// # Safety
    ///
    /// `ptr..ptr + len` must lie inside a range returned by [`reserve`] and
    /// `ptr` must be page aligned.
    pub(super) unsafe fn commit(ptr: NonNull<u8>, len: usize) -> bool {
        // SAFETY: upheld by the caller
        unsafe {
            libc::mprotect(
                ptr.as_ptr().cast(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
            ) == 0
        }
    }

    /// # Safety
    ///
    /// `ptr` and `len` must be exactly a range returned by [`reserve`].
    pub(super) unsafe fn release(ptr: NonNull<u8>, len: usize) {
        // SAFETY: upheld by the caller
        let _ = unsafe { libc::munmap(ptr.as_ptr().cast(), len) };
    }
}

#[cfg(not(unix))]
mod imp {
    use core::ptr::NonNull;
    use rust_alloc::alloc::{Layout, alloc_zeroed, dealloc};

    use super::FALLBACK_PAGE_SIZE;

    pub(super) fn page_size() -> usize {
        FALLBACK_PAGE_SIZE
    }

    fn layout(len: usize) -> Option<Layout> {
        Layout::from_size_align(len, FALLBACK_PAGE_SIZE).ok()
    }

    pub(super) fn reserve(len: usize) -> Option<NonNull<u8>> {
        let layout = layout(len)?;
        // SAFETY: `len` is non-zero, the arena never reserves an empty range
        NonNull::new(unsafe { alloc_zeroed(layout) })
    }

    pub(super) unsafe fn commit(_ptr: NonNull<u8>, _len: usize) -> bool {
        true
    }

    pub(super) unsafe fn release(ptr: NonNull<u8>, len: usize) {
        if let Some(layout) = layout(len) {
            // SAFETY: the range came from `reserve` with the same layout
            unsafe { dealloc(ptr.as_ptr(), layout) };
        }
    }
}

pub(crate) fn page_size() -> usize {
    imp::page_size()
}

pub(crate) fn reserve(len: usize) -> Option<NonNull<u8>> {
    imp::reserve(len)
}

/// # Safety
///
/// See the platform implementation: the range must be inside a reservation
/// and start on a page boundary.
pub(crate) unsafe fn commit(ptr: NonNull<u8>, len: usize) -> bool {
    unsafe { imp::commit(ptr, len) }
}

/// # Safety
///
/// `ptr` and `len` must describe a whole reservation that is no longer used.
pub(crate) unsafe fn release(ptr: NonNull<u8>, len: usize) {
    unsafe { imp::release(ptr, len) }
}
