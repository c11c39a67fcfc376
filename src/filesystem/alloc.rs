use log::warn;

use crate::structs::NULL_BLOCK;
use crate::Error;

use super::CowFs;

impl CowFs {
    /// Take one block off the free list and initialise its header. The
    /// refcount starts at zero; chains are reference-counted in bulk once
    /// fully built.
    pub(crate) fn allocate_block(&mut self) -> Result<u64, Error> {
        let Some(index) = self.free.allocate(1) else {
            warn!(
                "block allocation failed, {} bytes in use",
                self.get_total_memory_usage()
            );
            return Err(Error::OutOfSpace);
        };
        let block = &mut self.blocks[index as usize];
        block.in_use = true;
        block.next = NULL_BLOCK;
        block.refcount = 0;
        Ok(index)
    }

    /// Clear a block's header and payload. The block does not rejoin the
    /// free list here; only the garbage collector puts it back.
    pub(crate) fn free_block(&mut self, index: u64) {
        if let Some(block) = self.blocks.get_mut(index as usize) {
            block.reset();
        }
    }

    /// Bump the refcount of every block on the chain starting at `head`.
    pub(crate) fn increment_chain_refs(&mut self, head: u64) {
        let mut current = head;
        while current != NULL_BLOCK && (current as usize) < self.blocks.len() {
            let block = &mut self.blocks[current as usize];
            block.refcount += 1;
            current = block.next;
        }
    }

    /// Drop one reference from each block along the chain, releasing blocks
    /// whose count reaches zero. The walk stops at the first block that is
    /// still referenced, since the rest of the chain is shared from there.
    pub(crate) fn decrement_chain_refs(&mut self, head: u64) {
        let mut current = head;
        while current != NULL_BLOCK && (current as usize) < self.blocks.len() {
            // The next pointer must be taken before the block is zeroed
            let next = {
                let block = &mut self.blocks[current as usize];
                let next = block.next;
                block.refcount = block.refcount.saturating_sub(1);
                if block.refcount > 0 {
                    return;
                }
                next
            };
            self.free_block(current);
            current = next;
        }
    }
}
