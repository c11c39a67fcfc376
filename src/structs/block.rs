use std::io::{Read, Seek, SeekFrom, Write};
use std::mem::size_of;

use super::*;
use crate::Error;

impl Block {
    /// Fresh zeroed block, not linked into any chain.
    pub(crate) fn empty() -> Self {
        Self {
            in_use: false,
            next: NULL_BLOCK,
            refcount: 0,
            data: vec![0; BLOCK_SIZE],
        }
    }

    /// Clear header fields and payload once no chain references the block.
    pub(crate) fn reset(&mut self) {
        self.in_use = false;
        self.next = NULL_BLOCK;
        self.refcount = 0;
        self.data.fill(0);
    }

    pub(crate) fn record(&self) -> BlockRecord {
        let mut data = [0u8; BLOCK_SIZE];
        data.copy_from_slice(&self.data);
        BlockRecord {
            next: self.next,
            refcount: self.refcount,
            in_used: self.in_use as u32,
            data,
        }
    }

    pub(crate) fn from_record(record: &BlockRecord) -> Self {
        Self {
            in_use: record.in_used != 0,
            next: record.next,
            refcount: record.refcount,
            data: record.data.to_vec(),
        }
    }
}

impl DiskRecord for BlockRecord {
    type Error = Error;

    fn load<D: Read + Seek>(device: &mut D, layout: &Layout, index: u64) -> Result<Self, Error> {
        device.seek(SeekFrom::Start(layout.block_position(index)?))?;
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
        device.seek(SeekFrom::Start(layout.block_position(index)?))?;
        device.write_all(bytemuck::bytes_of(self))?;
        Ok(())
    }
}
