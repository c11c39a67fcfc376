use log::debug;

use crate::delta::{find_delta, Delta};
use crate::structs::{timestamp_now, VersionInfo, BLOCK_SIZE, NULL_BLOCK};
use crate::Error;

use super::{CowFs, Fd, FileMode};

impl CowFs {
    /// Read from the current version at the descriptor's position, returning
    /// the number of bytes copied (0 at end of file).
    pub fn read(&mut self, fd: Fd, buffer: &mut [u8]) -> Result<usize, Error> {
        let descriptor = self.descriptor(fd)?;
        let inode_index = descriptor.inode.ok_or(Error::InvalidDescriptor)?;
        let position = descriptor.position;
        let read = self.read_chain(inode_index, position, buffer)?;
        self.descriptors[fd].position += read;
        Ok(read)
    }

    /// Copy bytes out of an inode's current chain starting at `position`,
    /// independent of any descriptor.
    fn read_chain(
        &self,
        inode_index: usize,
        position: usize,
        buffer: &mut [u8],
    ) -> Result<usize, Error> {
        let inode = &self.inodes[inode_index];
        if inode.size == 0 {
            return Ok(0);
        }
        if inode.first_block as usize >= self.blocks.len()
            || !self.blocks[inode.first_block as usize].in_use
        {
            return Err(Error::CorruptChain);
        }
        let available = inode.size.saturating_sub(position);
        let to_read = buffer.len().min(available);
        if to_read == 0 {
            return Ok(0);
        }

        // Descend to the block holding `position`
        let mut current = inode.first_block;
        for _ in 0..position / BLOCK_SIZE {
            if current == NULL_BLOCK || current as usize >= self.blocks.len() {
                return Err(Error::CorruptChain);
            }
            current = self.blocks[current as usize].next;
        }

        let mut offset = position % BLOCK_SIZE;
        let mut total = 0;
        while total < to_read {
            if current == NULL_BLOCK || current as usize >= self.blocks.len() {
                return Err(Error::CorruptChain);
            }
            let block = &self.blocks[current as usize];
            if !block.in_use {
                return Err(Error::CorruptChain);
            }
            let chunk = (to_read - total).min(BLOCK_SIZE - offset);
            buffer[total..total + chunk].copy_from_slice(&block.data[offset..offset + chunk]);
            total += chunk;
            // Only the first block is entered mid-way
            offset = 0;
            current = block.next;
        }
        Ok(to_read)
    }

    /// Store `buffer` as a new version of the file behind `fd`.
    ///
    /// The previous content is read back to detect the changed region; a
    /// write that changes nothing updates the position and returns without
    /// creating a version. Otherwise the entire new content gets a fresh
    /// chain and a history entry, leaving every prior version intact.
    pub fn write(&mut self, fd: Fd, buffer: &[u8]) -> Result<usize, Error> {
        let descriptor = self.descriptor(fd)?;
        if descriptor.mode != FileMode::Write {
            return Err(Error::BadMode);
        }
        let inode_index = descriptor.inode.ok_or(Error::InvalidDescriptor)?;
        if buffer.is_empty() {
            return Ok(0);
        }

        let size = buffer.len();
        let old_size = self.inodes[inode_index].size;
        let version_count = self.inodes[inode_index].version_count;

        let delta = if version_count == 0 || old_size == 0 {
            Delta { start: 0, size }
        } else {
            let mut old_content = vec![0u8; old_size];
            if self.read_chain(inode_index, 0, &mut old_content)? != old_size {
                return Err(Error::CorruptChain);
            }
            find_delta(&old_content, buffer)
        };

        if delta.size == 0 {
            debug!("no changes detected, not creating a new version");
            self.descriptors[fd].position = size;
            return Ok(size);
        }

        let head = self.write_chain(buffer)?;
        let version = VersionInfo {
            version_number: version_count + 1,
            timestamp: timestamp_now(),
            size,
            block_index: head,
            delta_start: delta.start,
            delta_size: delta.size,
            prev_version: version_count,
        };
        self.increment_chain_refs(head);

        let inode = &mut self.inodes[inode_index];
        inode.history.push(version);
        inode.first_block = head;
        inode.size = size;
        inode.version_count += 1;
        self.descriptors[fd].position = size;
        debug!(
            "wrote {size} bytes to descriptor {fd}: version {}, delta ({}, {})",
            version_count + 1,
            delta.start,
            delta.size
        );
        Ok(size)
    }

    /// Build a chain holding all of `buffer`, zero-padding the final block.
    /// On allocation failure the partial chain is released and no state
    /// changes remain.
    fn write_chain(&mut self, buffer: &[u8]) -> Result<u64, Error> {
        let blocks_needed = buffer.len().div_ceil(BLOCK_SIZE);
        debug!("allocating {blocks_needed} blocks for {} bytes", buffer.len());
        let mut head = NULL_BLOCK;
        let mut previous = NULL_BLOCK;
        for chunk in buffer.chunks(BLOCK_SIZE) {
            let current = match self.allocate_block() {
                Ok(index) => index,
                Err(e) => {
                    self.release_partial_chain(head);
                    return Err(e);
                }
            };
            if head == NULL_BLOCK {
                head = current;
            } else {
                self.blocks[previous as usize].next = current;
            }
            let block = &mut self.blocks[current as usize];
            block.data[..chunk.len()].copy_from_slice(chunk);
            block.data[chunk.len()..].fill(0);
            previous = current;
        }
        Ok(head)
    }

    fn release_partial_chain(&mut self, head: u64) {
        let mut current = head;
        while current != NULL_BLOCK && (current as usize) < self.blocks.len() {
            let next = self.blocks[current as usize].next;
            self.free_block(current);
            current = next;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::test_fs;
    use crate::{Error, FileMode, BLOCK_SIZE};

    #[test]
    fn write_then_read_round_trips() {
        let mut fs = test_fs();
        let fd = fs.create("a.txt").unwrap();
        assert_eq!(fs.write(fd, b"hello").unwrap(), 5);
        fs.close(fd).unwrap();

        let fd = fs.open("a.txt", FileMode::Read).unwrap();
        let mut buffer = [0u8; 5];
        assert_eq!(fs.read(fd, &mut buffer).unwrap(), 5);
        assert_eq!(&buffer, b"hello");
        assert_eq!(fs.get_version_count(fd).unwrap(), 1);
        // Position has advanced to the end
        assert_eq!(fs.read(fd, &mut buffer).unwrap(), 0);
    }

    #[test]
    fn identical_write_creates_no_version() {
        let mut fs = test_fs();
        let fd = fs.create("a.txt").unwrap();
        fs.write(fd, b"hello").unwrap();
        assert_eq!(fs.write(fd, b"hello").unwrap(), 5);
        assert_eq!(fs.get_version_count(fd).unwrap(), 1);
    }

    #[test]
    fn append_records_delta() {
        let mut fs = test_fs();
        let fd = fs.create("a.txt").unwrap();
        fs.write(fd, b"hello").unwrap();
        fs.write(fd, b"hello world").unwrap();
        assert_eq!(fs.get_version_count(fd).unwrap(), 2);
        assert_eq!(fs.get_file_size(fd).unwrap(), 11);
        let history = fs.get_version_history(fd);
        assert_eq!(history[1].delta_start, 5);
        assert_eq!(history[1].delta_size, 6);
        fs.close(fd).unwrap();

        let fd = fs.open("a.txt", FileMode::Read).unwrap();
        let mut buffer = [0u8; 11];
        assert_eq!(fs.read(fd, &mut buffer).unwrap(), 11);
        assert_eq!(&buffer, b"hello world");
    }

    #[test]
    fn interior_change_uses_prefix_and_suffix() {
        let mut fs = test_fs();
        let fd = fs.create("a.txt").unwrap();
        fs.write(fd, b"hello").unwrap();
        fs.write(fd, b"hello world").unwrap();
        fs.write(fd, b"hellX world").unwrap();
        let history = fs.get_version_history(fd);
        assert_eq!(history[2].delta_start, 4);
        assert_eq!(history[2].delta_size, 1);
        assert_eq!(fs.get_version_count(fd).unwrap(), 3);
    }

    #[test]
    fn multi_block_contents() {
        let mut fs = test_fs();
        let content: Vec<u8> = (0..5000u32).map(|v| (v % 251) as u8).collect();
        let fd = fs.create("big").unwrap();
        assert_eq!(fs.write(fd, &content).unwrap(), 5000);
        fs.close(fd).unwrap();

        let fd = fs.open("big", FileMode::Read).unwrap();
        let mut buffer = vec![0u8; 5000];
        assert_eq!(fs.read(fd, &mut buffer).unwrap(), 5000);
        assert_eq!(buffer, content);
        fs.close(fd).unwrap();

        // Reads spanning the block boundary honour the position
        let fd = fs.open("big", FileMode::Read).unwrap();
        let mut prefix = vec![0u8; BLOCK_SIZE - 10];
        fs.read(fd, &mut prefix).unwrap();
        let mut spanning = vec![0u8; 20];
        assert_eq!(fs.read(fd, &mut spanning).unwrap(), 20);
        assert_eq!(spanning, content[BLOCK_SIZE - 10..BLOCK_SIZE + 10]);
    }

    #[test]
    fn files_are_independent() {
        let mut fs = test_fs();
        let fd_a = fs.create("a").unwrap();
        let fd_b = fs.create("b").unwrap();
        fs.write(fd_a, b"first file").unwrap();
        fs.write(fd_b, b"second file").unwrap();
        fs.close(fd_a).unwrap();
        fs.close(fd_b).unwrap();
        assert_eq!(fs.list_files(), vec!["a".to_owned(), "b".to_owned()]);

        let fd = fs.open("a", FileMode::Read).unwrap();
        let mut buffer = [0u8; 10];
        assert_eq!(fs.read(fd, &mut buffer).unwrap(), 10);
        assert_eq!(&buffer, b"first file");
        fs.close(fd).unwrap();

        let fd = fs.open("b", FileMode::Read).unwrap();
        let mut buffer = [0u8; 11];
        assert_eq!(fs.read(fd, &mut buffer).unwrap(), 11);
        assert_eq!(&buffer, b"second file");
    }

    #[test]
    fn short_read_at_tail() {
        let mut fs = test_fs();
        let fd = fs.create("a").unwrap();
        fs.write(fd, b"hello").unwrap();
        fs.close(fd).unwrap();
        let fd = fs.open("a", FileMode::Read).unwrap();
        let mut buffer = [0u8; 64];
        assert_eq!(fs.read(fd, &mut buffer).unwrap(), 5);
        assert_eq!(&buffer[..5], b"hello");
    }

    #[test]
    fn empty_file_reads_nothing() {
        let mut fs = test_fs();
        let fd = fs.create("a").unwrap();
        fs.close(fd).unwrap();
        let fd = fs.open("a", FileMode::Read).unwrap();
        let mut buffer = [0u8; 8];
        assert_eq!(fs.read(fd, &mut buffer).unwrap(), 0);
    }

    #[test]
    fn empty_write_is_a_no_op() {
        let mut fs = test_fs();
        let fd = fs.create("a").unwrap();
        assert_eq!(fs.write(fd, b"").unwrap(), 0);
        assert_eq!(fs.get_version_count(fd).unwrap(), 0);
    }

    #[test]
    fn write_demands_write_mode() {
        let mut fs = test_fs();
        let fd = fs.create("a").unwrap();
        fs.write(fd, b"hello").unwrap();
        fs.close(fd).unwrap();
        let fd = fs.open("a", FileMode::Read).unwrap();
        assert!(matches!(fs.write(fd, b"x"), Err(Error::BadMode)));
        assert!(matches!(fs.write(999, b"x"), Err(Error::InvalidDescriptor)));
    }

    #[test]
    fn failed_write_leaves_prior_version_intact() {
        let mut fs = test_fs();
        let fd = fs.create("a").unwrap();
        fs.write(fd, b"hello").unwrap();
        // 16 blocks total, one holds "hello"; this cannot fit
        let huge = vec![1u8; 17 * BLOCK_SIZE];
        assert!(matches!(fs.write(fd, &huge), Err(Error::OutOfSpace)));
        assert_eq!(fs.get_version_count(fd).unwrap(), 1);
        assert_eq!(fs.get_file_size(fd).unwrap(), 5);
        fs.close(fd).unwrap();
        let fd = fs.open("a", FileMode::Read).unwrap();
        let mut buffer = [0u8; 5];
        assert_eq!(fs.read(fd, &mut buffer).unwrap(), 5);
        assert_eq!(&buffer, b"hello");
    }
}
