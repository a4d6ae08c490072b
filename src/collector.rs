//! The `Collector` trait.
//!
//! Drivers and benchmarks are written against this trait rather than a
//! concrete heap so a different collector can be dropped in.

use crate::collectors::mark_sweep::CollectStats;
use crate::error::HeapError;

pub trait Collector {
    /// Runs one full collection cycle and reports what it reclaimed.
    fn collect(&mut self) -> Result<CollectStats, HeapError>;

    /// Objects allocated and not yet reclaimed by a collection.
    fn live_objects(&self) -> usize;
}
