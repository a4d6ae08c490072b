//! The allocation layer: the OS backed arena and the free-list allocator that
//! carves it into blocks.

pub mod arena;
pub mod free_list;
