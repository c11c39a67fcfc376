use std::fmt::Debug;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use log::{debug, error};

use crate::freelist::FreeList;
use crate::structs::*;
use crate::Error;

mod alloc;
mod gc;
mod io;
mod versions;

pub trait BlockDevice: Read + Write + Seek + Debug {}

impl BlockDevice for std::fs::File {}

/// Handle into the descriptor table.
pub type Fd = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileMode {
    Read,
    Write,
    Create,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileStatus {
    pub is_open: bool,
    pub is_modified: bool,
    pub current_size: usize,
    pub current_version: u32,
}

/// Handle state; references its inode by table index only.
#[derive(Debug, Clone)]
pub(crate) struct FileDescriptor {
    pub(crate) inode: Option<usize>,
    pub(crate) mode: FileMode,
    pub(crate) position: usize,
    pub(crate) valid: bool,
}

impl Default for FileDescriptor {
    fn default() -> Self {
        Self {
            inode: None,
            mode: FileMode::Read,
            position: 0,
            valid: false,
        }
    }
}

#[derive(Debug)]
pub struct CowFs {
    pub(crate) layout: Layout,
    pub(crate) inodes: Vec<Inode>,
    pub(crate) blocks: Vec<Block>,
    pub(crate) free: FreeList,
    pub(crate) descriptors: Vec<FileDescriptor>,
    pub(crate) device: Box<dyn BlockDevice>,
}

impl CowFs {
    /// Create a fresh volume on `device` and write the empty tables out.
    pub fn new(device: Box<dyn BlockDevice>, disk_size: usize) -> Result<Self, Error> {
        let layout = Layout::new(disk_size);
        debug!(
            "initializing file store: {disk_size} bytes, {} blocks",
            layout.total_blocks
        );
        let mut fs = Self {
            layout,
            inodes: vec![Inode::default(); MAX_FILES],
            blocks: vec![Block::empty(); layout.total_blocks as usize],
            free: FreeList::with_all(layout.total_blocks),
            descriptors: vec![FileDescriptor::default(); MAX_FILES],
            device,
        };
        fs.flush()?;
        Ok(fs)
    }

    /// Load a volume previously written to `device`.
    ///
    /// The free list is not persisted; it is rebuilt from the block table so
    /// that it covers exactly the blocks no chain occupies.
    pub fn load(device: Box<dyn BlockDevice>, disk_size: usize) -> Result<Self, Error> {
        let mut device = device;
        let layout = Layout::new(disk_size);
        let mut inodes = Vec::with_capacity(MAX_FILES);
        for index in 0..MAX_FILES {
            let record = InodeRecord::load(&mut device, &layout, index as u64)?;
            inodes.push(Inode::from_record(&record)?);
        }
        let mut blocks = Vec::with_capacity(layout.total_blocks as usize);
        for index in 0..layout.total_blocks {
            let record = BlockRecord::load(&mut device, &layout, index)?;
            blocks.push(Block::from_record(&record));
        }
        device.seek(SeekFrom::Start(layout.history_region_start()))?;
        for inode in inodes.iter_mut() {
            for _ in 0..inode.version_count {
                let record = VersionRecord::read_from(&mut device)?;
                inode.history.push(VersionInfo::from_record(&record)?);
            }
        }
        let free = rebuild_free_list(&blocks);
        debug!(
            "loaded file store: {} files, {} blocks free",
            inodes.iter().filter(|inode| inode.in_used).count(),
            free.free_blocks()
        );
        Ok(Self {
            layout,
            inodes,
            blocks,
            free,
            descriptors: vec![FileDescriptor::default(); MAX_FILES],
            device,
        })
    }

    /// Open the backing file at `path`, loading it if it already exists.
    pub fn open_disk<P: AsRef<Path>>(path: P, disk_size: usize) -> Result<Self, Error> {
        let path = path.as_ref();
        if path.exists() {
            let file = std::fs::File::options().read(true).write(true).open(path)?;
            Self::load(Box::new(file), disk_size)
        } else {
            let file = std::fs::File::options()
                .read(true)
                .write(true)
                .create(true)
                .open(path)?;
            Self::new(Box::new(file), disk_size)
        }
    }

    /// Write the inode table, block table and version histories back.
    pub fn flush(&mut self) -> Result<(), Error> {
        for (index, inode) in self.inodes.iter().enumerate() {
            inode
                .record()
                .flush(&mut self.device, &self.layout, index as u64)?;
        }
        for (index, block) in self.blocks.iter().enumerate() {
            block
                .record()
                .flush(&mut self.device, &self.layout, index as u64)?;
        }
        self.device
            .seek(SeekFrom::Start(self.layout.history_region_start()))?;
        for inode in &self.inodes {
            for version in &inode.history {
                version.record().write_to(&mut self.device)?;
            }
        }
        self.device.flush()?;
        Ok(())
    }

    pub fn create(&mut self, name: &str) -> Result<Fd, Error> {
        if name.len() >= MAX_FILENAME_LEN {
            return Err(Error::NameTooLong);
        }
        if self.find_inode(name).is_some() {
            return Err(Error::AlreadyExists);
        }
        let index = self
            .inodes
            .iter()
            .position(|inode| !inode.in_used)
            .ok_or(Error::NoFreeInode)?;
        self.inodes[index] = Inode {
            in_used: true,
            name: name.to_owned(),
            ..Inode::default()
        };
        let Some(fd) = self.allocate_descriptor() else {
            self.inodes[index] = Inode::default();
            return Err(Error::NoFreeDescriptor);
        };
        self.descriptors[fd] = FileDescriptor {
            inode: Some(index),
            mode: FileMode::Write,
            position: 0,
            valid: true,
        };
        debug!("created {name:?} with descriptor {fd}");
        Ok(fd)
    }

    /// Open an existing file; the position starts at 0 for every mode.
    pub fn open(&mut self, name: &str, mode: FileMode) -> Result<Fd, Error> {
        let index = self.find_inode(name).ok_or(Error::NotFound)?;
        let fd = self.allocate_descriptor().ok_or(Error::NoFreeDescriptor)?;
        self.descriptors[fd] = FileDescriptor {
            inode: Some(index),
            mode,
            position: 0,
            valid: true,
        };
        debug!("opened {name:?} with descriptor {fd}, mode {mode:?}");
        Ok(fd)
    }

    pub fn close(&mut self, fd: Fd) -> Result<(), Error> {
        self.descriptor(fd)?;
        self.descriptors[fd].valid = false;
        Ok(())
    }

    /// Names of all in-use inodes, in table order.
    pub fn list_files(&self) -> Vec<String> {
        self.inodes
            .iter()
            .filter(|inode| inode.in_used)
            .map(|inode| inode.name.clone())
            .collect()
    }

    pub fn get_file_size(&self, fd: Fd) -> Result<usize, Error> {
        let index = self.descriptor_inode(fd)?;
        Ok(self.inodes[index].size)
    }

    pub fn get_file_status(&self, fd: Fd) -> FileStatus {
        match self.descriptor(fd) {
            Ok(descriptor) => {
                let inode = descriptor.inode.map(|index| &self.inodes[index]);
                FileStatus {
                    is_open: true,
                    is_modified: descriptor.mode == FileMode::Write,
                    current_size: inode.map_or(0, |inode| inode.size),
                    current_version: inode.map_or(0, |inode| inode.version_count),
                }
            }
            Err(_) => FileStatus::default(),
        }
    }

    /// Bytes held by in-use blocks.
    pub fn get_total_memory_usage(&self) -> usize {
        BLOCK_SIZE * self.blocks.iter().filter(|block| block.in_use).count()
    }

    pub(crate) fn descriptor(&self, fd: Fd) -> Result<&FileDescriptor, Error> {
        match self.descriptors.get(fd) {
            Some(descriptor) if descriptor.valid => Ok(descriptor),
            _ => Err(Error::InvalidDescriptor),
        }
    }

    pub(crate) fn descriptor_inode(&self, fd: Fd) -> Result<usize, Error> {
        self.descriptor(fd)?.inode.ok_or(Error::InvalidDescriptor)
    }

    fn find_inode(&self, name: &str) -> Option<usize> {
        self.inodes
            .iter()
            .position(|inode| inode.in_used && inode.name == name)
    }

    fn allocate_descriptor(&self) -> Option<Fd> {
        self.descriptors
            .iter()
            .position(|descriptor| !descriptor.valid)
    }
}

impl Drop for CowFs {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            error!("Error flushing file store on teardown: {e}")
        }
    }
}

/// Maximal runs of not-in-use blocks, already coalesced by construction.
fn rebuild_free_list(blocks: &[Block]) -> FreeList {
    let mut free = FreeList::new();
    let mut start = 0;
    while start < blocks.len() {
        if blocks[start].in_use {
            start += 1;
            continue;
        }
        let mut count = 0;
        while start + count < blocks.len() && !blocks[start + count].in_use {
            count += 1;
        }
        free.add(start as u64, count as u64);
        start += count;
    }
    free
}
