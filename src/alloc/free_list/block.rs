//! Block headers and the sizes derived from them.
//!
//! A block is a header followed by its payload. Headers live inside the arena
//! at the block's offset, so every field is a plain integer: a stale or
//! half-written header can be read without producing an invalid value.

use core::fmt;
use core::mem::size_of;

/// Alignment of every block offset, block size and payload.
pub const BLOCK_ALIGN: usize = size_of::<usize>();

/// Bytes taken by a header. Payloads start this far past the block offset.
pub const HEADER_SIZE: usize = align_up(size_of::<BlockHeader>(), BLOCK_ALIGN);

pub(crate) const fn align_up(value: usize, align: usize) -> usize {
    (value + align - 1) & !(align - 1)
}

/// Header-inclusive block size for a payload of `payload` bytes.
///
/// Returns `None` for a zero sized payload, and for payloads that cannot be
/// represented once aligned and prefixed with a header (this is where a
/// negative size converted to `usize` ends up).
pub fn block_size_for(payload: usize) -> Option<usize> {
    if payload == 0 {
        return None;
    }
    let aligned = payload.checked_add(BLOCK_ALIGN - 1)? & !(BLOCK_ALIGN - 1);
    let total = aligned.checked_add(HEADER_SIZE)?;
    (total <= isize::MAX as usize).then_some(total)
}

/// A block, named by the byte offset of its header from the arena base.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockHandle(usize);

impl BlockHandle {
    pub(crate) const fn from_offset(offset: usize) -> Self {
        Self(offset)
    }

    pub const fn offset(self) -> usize {
        self.0
    }

    pub(crate) const fn payload_offset(self) -> usize {
        self.0 + HEADER_SIZE
    }
}

impl fmt::Display for BlockHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub(crate) struct Link(usize);

impl Link {
    pub(crate) const NONE: Self = Self(usize::MAX);

    pub(crate) const fn new(handle: Option<BlockHandle>) -> Self {
        match handle {
            Some(h) => Self(h.0),
            None => Self::NONE,
        }
    }

    pub(crate) const fn get(self) -> Option<BlockHandle> {
        if self.0 == usize::MAX {
            None
        } else {
            Some(BlockHandle(self.0))
        }
    }
}

const FREE_BIT: u8 = 0b0000_0001;
const MARK_BIT: u8 = 0b0000_0010;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(transparent)]
pub(crate) struct BlockFlags(u8);

impl BlockFlags {
    pub(crate) const fn in_use() -> Self {
        Self(0)
    }

    pub(crate) const fn free() -> Self {
        Self(FREE_BIT)
    }

    pub(crate) const fn is_free(self) -> bool {
        self.0 & FREE_BIT == FREE_BIT
    }

    pub(crate) const fn is_marked(self) -> bool {
        self.0 & MARK_BIT == MARK_BIT
    }

    pub(crate) const fn with_free(self, free: bool) -> Self {
        if free {
            Self(self.0 | FREE_BIT)
        } else {
            Self(self.0 & !FREE_BIT)
        }
    }

    pub(crate) const fn with_marked(self, marked: bool) -> Self {
        if marked {
            Self(self.0 | MARK_BIT)
        } else {
            Self(self.0 & !MARK_BIT)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub(crate) struct BlockHeader {
    pub(crate) size: usize,
    pub(crate) next: Link,
    pub(crate) prev: Link,
    pub(crate) flags: BlockFlags,
}

impl BlockHeader {
    pub(crate) const fn new(size: usize, prev: Option<BlockHandle>, flags: BlockFlags) -> Self {
        Self {
            size,
            next: Link::NONE,
            prev: Link::new(prev),
            flags,
        }
    }

    pub(crate) const fn next(&self) -> Option<BlockHandle> {
        self.next.get()
    }

    pub(crate) const fn prev(&self) -> Option<BlockHandle> {
        self.prev.get()
    }

    pub(crate) const fn is_free(&self) -> bool {
        self.flags.is_free()
    }

    pub(crate) const fn is_marked(&self) -> bool {
        self.flags.is_marked()
    }
}

/// A read-only snapshot of one block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
    pub handle: BlockHandle,
    /// Address of the header.
    pub address: *const u8,
    /// Header-inclusive size in bytes.
    pub size: usize,
    pub is_free: bool,
    pub marked: bool,
}

impl BlockInfo {
    pub fn payload(&self) -> *const u8 {
        self.address.wrapping_add(HEADER_SIZE)
    }

    pub fn payload_size(&self) -> usize {
        self.size - HEADER_SIZE
    }
}
