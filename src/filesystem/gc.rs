use log::debug;

use crate::structs::NULL_BLOCK;

use super::CowFs;

impl CowFs {
    /// Mark every block reachable from a live version's chain, then rebuild
    /// the free list from the unmarked remainder.
    ///
    /// This is the only path that recovers blocks released outside the free
    /// list, such as the partial chains the write path drops on allocation
    /// failure.
    pub fn garbage_collect(&mut self) {
        let mut live = vec![false; self.blocks.len()];
        for inode in self.inodes.iter().filter(|inode| inode.in_used) {
            for version in &inode.history {
                let mut current = version.block_index;
                while current != NULL_BLOCK && (current as usize) < self.blocks.len() {
                    let block = &self.blocks[current as usize];
                    if block.refcount > 0 {
                        live[current as usize] = true;
                    }
                    current = block.next;
                }
            }
        }

        self.free.clear();
        let mut start = 0;
        while start < self.blocks.len() {
            if live[start] {
                start += 1;
                continue;
            }
            let mut count = 0;
            while start + count < self.blocks.len() && !live[start + count] {
                self.blocks[start + count].reset();
                count += 1;
            }
            self.free.add(start as u64, count as u64);
            start += count;
        }
        self.free.coalesce();
        debug!(
            "garbage collector rebuilt the free list: {} runs, {} blocks free",
            self.free.runs().len(),
            self.free.free_blocks()
        );
    }
}
