//! Errors surfaced by the heap.

use core::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeapError {
    /// Requested a zero sized block, or a size that does not fit the address
    /// space once the header is added.
    InvalidSize,
    /// The OS refused to extend the arena.
    OutOfMemory,
    /// The root stack is at capacity.
    RootStackOverflow,
    /// Popped a root while the root stack was empty.
    EmptyRootStack,
    /// The pointer is not the payload address of a block in the directory.
    InvalidPointer,
    /// The block directory failed an integrity check. This is not
    /// recoverable: the heap refuses every operation afterwards.
    CorruptDirectory,
}

impl HeapError {
    pub const fn is_fatal(self) -> bool {
        matches!(self, Self::CorruptDirectory)
    }
}

impl fmt::Display for HeapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Self::InvalidSize => "invalid allocation size",
            Self::OutOfMemory => "out of memory: arena could not be extended",
            Self::RootStackOverflow => "root stack overflow",
            Self::EmptyRootStack => "pop from an empty root stack",
            Self::InvalidPointer => "pointer does not belong to a live block",
            Self::CorruptDirectory => "block directory is corrupt",
        };
        f.write_str(msg)
    }
}

impl core::error::Error for HeapError {}

#[cfg(test)]
mod tests {
    use super::HeapError;
    use rust_alloc::string::ToString;

    #[test]
    fn only_corruption_is_fatal() {
        assert!(HeapError::CorruptDirectory.is_fatal());
        assert!(!HeapError::OutOfMemory.is_fatal());
        assert!(!HeapError::RootStackOverflow.is_fatal());
        assert!(!HeapError::EmptyRootStack.is_fatal());
    }

    #[test]
    fn display() {
        assert_eq!(HeapError::RootStackOverflow.to_string(), "root stack overflow");
        assert_eq!(
            HeapError::InvalidSize.to_string(),
            "invalid allocation size"
        );
    }
}
