use log::debug;

use crate::structs::VersionInfo;
use crate::Error;

use super::{CowFs, Fd, FileMode};

impl CowFs {
    /// Version records of the file behind `fd`, oldest first. An invalid
    /// descriptor yields an empty list.
    pub fn get_version_history(&self, fd: Fd) -> Vec<VersionInfo> {
        match self.descriptor_inode(fd) {
            Ok(index) => self.inodes[index].history.clone(),
            Err(_) => Vec::new(),
        }
    }

    pub fn get_version_count(&self, fd: Fd) -> Result<u32, Error> {
        let index = self.descriptor_inode(fd)?;
        Ok(self.inodes[index].version_count)
    }

    /// Discard every version after `version_number` and make it current
    /// again. Blocks exclusive to the discarded versions are released.
    pub fn rollback_to_version(&mut self, fd: Fd, version_number: u32) -> Result<(), Error> {
        let descriptor = self.descriptor(fd)?;
        let mode = descriptor.mode;
        let inode_index = descriptor.inode.ok_or(Error::InvalidDescriptor)?;

        let inode = &self.inodes[inode_index];
        if version_number == 0 || version_number > inode.version_count {
            return Err(Error::VersionOutOfRange);
        }
        let target = inode
            .history
            .iter()
            .find(|version| version.version_number == version_number)
            .ok_or(Error::VersionOutOfRange)?
            .clone();
        let discarded: Vec<u64> = inode
            .history
            .iter()
            .filter(|version| version.version_number > version_number)
            .map(|version| version.block_index)
            .collect();
        for head in discarded {
            self.decrement_chain_refs(head);
        }

        let inode = &mut self.inodes[inode_index];
        inode
            .history
            .retain(|version| version.version_number <= version_number);
        inode.first_block = target.block_index;
        inode.size = target.size;
        inode.version_count = version_number;
        self.descriptors[fd].position = if mode == FileMode::Write { target.size } else { 0 };
        debug!(
            "rolled back descriptor {fd} to version {version_number}, size {}",
            target.size
        );
        Ok(())
    }

    /// Reserved. Unlike rollback this would restore a past version without
    /// discarding the ones after it; no such operation is defined yet.
    pub fn revert_to_version(&mut self, _fd: Fd, _version_number: u32) -> Result<(), Error> {
        Err(Error::Unsupported)
    }
}
