use std::io::{Read, Seek, SeekFrom, Write};
use std::mem::size_of;

use super::*;
use crate::Error;

impl Default for Inode {
    fn default() -> Self {
        Self {
            in_used: false,
            name: String::new(),
            first_block: NULL_BLOCK,
            size: 0,
            version_count: 0,
            history: Vec::new(),
        }
    }
}

impl Inode {
    pub(crate) fn record(&self) -> InodeRecord {
        let mut filename = [0u8; FILENAME_FIELD];
        let length = self.name.len().min(MAX_FILENAME_LEN - 1);
        filename[..length].copy_from_slice(&self.name.as_bytes()[..length]);
        InodeRecord {
            first_block: self.first_block,
            size: self.size as u64,
            version_count: self.version_count,
            in_used: self.in_used as u32,
            filename,
        }
    }

    /// Rebuild the runtime inode from its record; the history vector is
    /// filled in separately from the history region.
    pub(crate) fn from_record(record: &InodeRecord) -> Result<Self, Error> {
        let terminator = record
            .filename
            .iter()
            .position(|&byte| byte == 0)
            .unwrap_or(MAX_FILENAME_LEN - 1);
        let name = std::str::from_utf8(&record.filename[..terminator])?.to_owned();
        Ok(Self {
            in_used: record.in_used != 0,
            name,
            first_block: record.first_block,
            size: record.size as usize,
            version_count: record.version_count,
            history: Vec::with_capacity(record.version_count as usize),
        })
    }
}

impl DiskRecord for InodeRecord {
    type Error = Error;

    fn load<D: Read + Seek>(device: &mut D, layout: &Layout, index: u64) -> Result<Self, Error> {
        device.seek(SeekFrom::Start(layout.inode_position(index)?))?;
        let mut raw = [0u8; size_of::<Self>()];
        device.read_exact(&mut raw)?;
        Ok(bytemuck::pod_read_unaligned(&raw))
    }

    fn flush<D: Write + Seek>(
        &self,
        device: &mut D,
        layout: &Layout,
        index: u64,
    ) -> Result<(), Error> {
        device.seek(SeekFrom::Start(layout.inode_position(index)?))?;
        device.write_all(bytemuck::bytes_of(self))?;
        Ok(())
    }
}
