//! Human readable dump of the block directory.

use core::fmt;

use crate::collectors::mark_sweep::MarkSweepHeap;

/// Borrows a heap and prints one line per block, in address order.
///
/// ```text
/// ---------LOG----------
/// Address: [0x7f3c5a400000]. Size: [56]. Free: [0]
/// ----------------------
/// ```
pub struct HeapDump<'heap>(pub &'heap MarkSweepHeap);

impl fmt::Display for HeapDump<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "---------LOG----------")?;
        for block in self.0.blocks() {
            writeln!(
                f,
                "Address: [{:p}]. Size: [{}]. Free: [{}]",
                block.address,
                block.size,
                u8::from(block.is_free)
            )?;
        }
        writeln!(f, "----------------------")
    }
}
