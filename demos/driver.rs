//! Exercises the heap end to end: ten small allocations, three roots popped,
//! one collection, then a dump of the directory.
//!
//! Run with `RUST_LOG=trace cargo run --example driver` to see
//! every split, merge and sweep decision.

use std::mem::size_of;

use log::info;
use sweepheap::{Collector, HeapDump, HeapError, MarkSweepHeap};

fn main() -> Result<(), HeapError> {
    env_logger::init();

    let mut heap = MarkSweepHeap::default();

    let mut values = Vec::new();
    for i in 0..10i32 {
        let ptr = heap.allocate(size_of::<i32>())?;
        // SAFETY: the payload is at least 4 bytes and word aligned
        unsafe { ptr.as_ptr().cast::<i32>().write(i) };
        values.push(ptr);
    }
    info!("allocated {} objects, {} roots", heap.live_objects(), heap.roots_len());

    let popped = [heap.pop_root()?, heap.pop_root()?, heap.pop_root()?];
    println!("Popped: [{:p}], [{:p}], [{:p}]", popped[0], popped[1], popped[2]);
    println!("{}", heap.roots_len());

    let stats = Collector::collect(&mut heap)?;
    println!("{stats}");
    print!("\n{}\n", HeapDump(&heap));

    for ptr in &values[..7] {
        // SAFETY: the first seven blocks are still rooted
        let value = unsafe { ptr.as_ptr().cast::<i32>().read() };
        info!("{ptr:p} -> {value}");
    }

    heap.verify()
}
