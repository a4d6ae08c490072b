//! The bounded root stack.

use rust_alloc::vec::Vec;

use crate::alloc::free_list::BlockHandle;
use crate::error::HeapError;

/// Default number of entries a root stack can hold.
pub const DEFAULT_ROOT_CAPACITY: usize = 256;

/// A LIFO record of the blocks the mutator still references.
///
/// Entries are block handles. The same block may appear more than once.
#[derive(Debug)]
pub struct RootStack {
    entries: Vec<BlockHandle>,
    capacity: usize,
}

impl Default for RootStack {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_ROOT_CAPACITY)
    }
}

impl RootStack {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::new(),
            capacity,
        }
    }

    pub fn push(&mut self, handle: BlockHandle) -> Result<(), HeapError> {
        if self.is_full() {
            return Err(HeapError::RootStackOverflow);
        }
        self.entries.push(handle);
        Ok(())
    }

    pub fn pop(&mut self) -> Option<BlockHandle> {
        self.entries.pop()
    }

    pub fn peek(&self) -> Option<BlockHandle> {
        self.entries.last().copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn as_slice(&self) -> &[BlockHandle] {
        &self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::RootStack;
    use crate::alloc::free_list::BlockHandle;
    use crate::error::HeapError;

    #[test]
    fn lifo_order() {
        let mut roots = RootStack::with_capacity(4);
        roots.push(BlockHandle::from_offset(0)).unwrap();
        roots.push(BlockHandle::from_offset(64)).unwrap();

        assert_eq!(roots.pop(), Some(BlockHandle::from_offset(64)));
        assert_eq!(roots.pop(), Some(BlockHandle::from_offset(0)));
        assert_eq!(roots.pop(), None);
    }

    #[test]
    fn bounded() {
        let mut roots = RootStack::with_capacity(2);
        let h = BlockHandle::from_offset(0);
        roots.push(h).unwrap();
        // duplicates are allowed
        roots.push(h).unwrap();
        assert!(roots.is_full());
        assert_eq!(roots.push(h), Err(HeapError::RootStackOverflow));
        assert_eq!(roots.len(), 2, "a rejected push must not be recorded");
    }

    #[test]
    fn zero_capacity_rejects_everything() {
        let mut roots = RootStack::with_capacity(0);
        assert_eq!(
            roots.push(BlockHandle::from_offset(0)),
            Err(HeapError::RootStackOverflow)
        );
    }
}
