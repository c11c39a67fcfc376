mod block;
mod inode;
mod layout;
mod version;

use std::io::{Read, Seek, Write};

use bytemuck::{Pod, Zeroable};

pub(crate) use version::timestamp_now;

/// Payload bytes per block.
pub const BLOCK_SIZE: usize = 4096;
/// Maximum filename length, terminator included.
pub const MAX_FILENAME_LEN: usize = 255;
/// Number of inode slots, and of descriptor slots.
pub const MAX_FILES: usize = 1024;
/// End-of-chain marker; never a valid block index.
pub const NULL_BLOCK: u64 = u64::MAX;

/// On-disk width of the filename field; one byte over the maximum so the
/// record stays free of padding.
pub(crate) const FILENAME_FIELD: usize = 256;
/// On-disk width of the version timestamp field.
pub(crate) const TIMESTAMP_FIELD: usize = 24;

/// Fixed-size record addressable by index inside one of the disk regions.
pub(crate) trait DiskRecord: Sized {
    type Error;
    fn load<D: Read + Seek>(
        device: &mut D,
        layout: &Layout,
        index: u64,
    ) -> Result<Self, Self::Error>;
    fn flush<D: Write + Seek>(
        &self,
        device: &mut D,
        layout: &Layout,
        index: u64,
    ) -> Result<(), Self::Error>;
}

/// Byte offsets of the regions in the backing file: inode table, block
/// table, then the version history records.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Layout {
    /// Total count of data blocks in the volume
    pub(crate) total_blocks: u64,
}

/// In-memory data block.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Block {
    /// Whether the block belongs to some version's chain
    pub(crate) in_use: bool,
    /// Next block in the chain, [`NULL_BLOCK`] at the end
    pub(crate) next: u64,
    /// Number of version records whose chain traverses this block
    pub(crate) refcount: u32,
    /// Raw payload, always [`BLOCK_SIZE`] bytes
    pub(crate) data: Vec<u8>,
}

/// In-memory file metadata record.
#[derive(Debug, Clone)]
pub(crate) struct Inode {
    pub(crate) in_used: bool,
    pub(crate) name: String,
    /// Head of the current version's chain, [`NULL_BLOCK`] before the first
    /// version exists
    pub(crate) first_block: u64,
    pub(crate) size: usize,
    pub(crate) version_count: u32,
    /// Versions ordered by number, dense from 1
    pub(crate) history: Vec<VersionInfo>,
}

/// Immutable snapshot of one version of a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionInfo {
    /// 1-based, monotone per file
    pub version_number: u32,
    /// Local wall-clock time, `YYYY-MM-DD HH:MM:SS`
    pub timestamp: String,
    /// Logical content length in bytes
    pub size: usize,
    /// Head of this version's block chain
    pub block_index: u64,
    /// Offset of the region that differs from the previous version
    pub delta_start: usize,
    /// Length of the differing region
    pub delta_size: usize,
    /// Number of the preceding version, 0 for the first
    pub prev_version: u32,
}

#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub(crate) struct InodeRecord {
    pub(crate) first_block: u64,
    pub(crate) size: u64,
    pub(crate) version_count: u32,
    pub(crate) in_used: u32,
    pub(crate) filename: [u8; FILENAME_FIELD],
}

#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub(crate) struct BlockRecord {
    pub(crate) next: u64,
    pub(crate) refcount: u32,
    pub(crate) in_used: u32,
    pub(crate) data: [u8; BLOCK_SIZE],
}

#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub(crate) struct VersionRecord {
    pub(crate) size: u64,
    pub(crate) block_index: u64,
    pub(crate) delta_start: u64,
    pub(crate) delta_size: u64,
    pub(crate) version_number: u32,
    pub(crate) prev_version: u32,
    pub(crate) timestamp: [u8; TIMESTAMP_FIELD],
}
