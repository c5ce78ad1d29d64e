use std::time::{SystemTime, UNIX_EPOCH};

use super::{read_u32, read_u64, write_u32, write_u64};
use crate::constants::{INODE_SIZE, NUM_DIRECT, NUM_INDIRECT, POINTER_SIZE, UNUSED_FLAG, USED_FLAG};
use crate::error::{FsError, FsResult};

const TYPE_OFFSET: usize = 4;
const PARENT_OFFSET: usize = 8;
const SIZE_OFFSET: usize = 16;
const ID_OFFSET: usize = 24;
const RESERVED_OFFSET: usize = 32;
const MODIFIED_OFFSET: usize = 40;
const DIRECT_OFFSET: usize = 48;
const INDIRECT_OFFSET: usize = DIRECT_OFFSET + NUM_DIRECT * POINTER_SIZE;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InodeKind {
    Unused,
    Directory,
    File,
}

impl InodeKind {
    const fn to_u32(self) -> u32 {
        match self {
            Self::Unused => 0,
            Self::Directory => 1,
            Self::File => 2,
        }
    }

    fn from_u32(value: u32) -> FsResult<Self> {
        match value {
            0 => Ok(Self::Unused),
            1 => Ok(Self::Directory),
            2 => Ok(Self::File),
            other => Err(FsError::Corrupt(format!("unknown inode type tag {other}"))),
        }
    }
}

/// One slot of the inode table.
///
/// Pointers are data block numbers relative to the start of the data region. Logical
/// content blocks `0..blocks_reserved` are mapped; nothing past them is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Inode {
    pub used: bool,
    pub kind: InodeKind,
    pub parent: u64,
    pub size: u64,
    pub id: u64,
    pub blocks_reserved: u64,
    pub modified: u64,
    pub direct: [u64; NUM_DIRECT],
    pub indirect: [u64; NUM_INDIRECT],
}

impl Inode {
    #[must_use]
    pub const fn new(id: u64, parent: u64, kind: InodeKind, modified: u64) -> Self {
        Self {
            used: true,
            kind,
            parent,
            size: 0,
            id,
            blocks_reserved: 0,
            modified,
            direct: [0; NUM_DIRECT],
            indirect: [0; NUM_INDIRECT],
        }
    }

    /// The zeroed record of a free slot.
    #[must_use]
    pub const fn free() -> Self {
        Self {
            used: false,
            kind: InodeKind::Unused,
            parent: 0,
            size: 0,
            id: 0,
            blocks_reserved: 0,
            modified: 0,
            direct: [0; NUM_DIRECT],
            indirect: [0; NUM_INDIRECT],
        }
    }

    #[must_use]
    pub fn is_dir(&self) -> bool {
        self.kind == InodeKind::Directory
    }

    #[must_use]
    pub fn is_file(&self) -> bool {
        self.kind == InodeKind::File
    }

    /// Drops every block mapping, leaving an empty inode.
    pub fn clear_mappings(&mut self) {
        self.size = 0;
        self.blocks_reserved = 0;
        self.direct = [0; NUM_DIRECT];
        self.indirect = [0; NUM_INDIRECT];
    }

    /// # Errors
    /// [`FsError::Corrupt`] when the type tag is unknown.
    pub fn from_bytes(buf: &[u8; INODE_SIZE]) -> FsResult<Self> {
        let mut direct = [0u64; NUM_DIRECT];
        for (i, ptr) in direct.iter_mut().enumerate() {
            *ptr = read_u64(buf, DIRECT_OFFSET + i * POINTER_SIZE);
        }
        let mut indirect = [0u64; NUM_INDIRECT];
        for (i, ptr) in indirect.iter_mut().enumerate() {
            *ptr = read_u64(buf, INDIRECT_OFFSET + i * POINTER_SIZE);
        }
        Ok(Self {
            used: buf[0] != UNUSED_FLAG,
            kind: InodeKind::from_u32(read_u32(buf, TYPE_OFFSET))?,
            parent: read_u64(buf, PARENT_OFFSET),
            size: read_u64(buf, SIZE_OFFSET),
            id: read_u64(buf, ID_OFFSET),
            blocks_reserved: read_u64(buf, RESERVED_OFFSET),
            modified: read_u64(buf, MODIFIED_OFFSET),
            direct,
            indirect,
        })
    }

    #[must_use]
    pub fn to_bytes(&self) -> [u8; INODE_SIZE] {
        let mut buf = [0u8; INODE_SIZE];
        buf[0] = if self.used { USED_FLAG } else { UNUSED_FLAG };
        write_u32(&mut buf, TYPE_OFFSET, self.kind.to_u32());
        write_u64(&mut buf, PARENT_OFFSET, self.parent);
        write_u64(&mut buf, SIZE_OFFSET, self.size);
        write_u64(&mut buf, ID_OFFSET, self.id);
        write_u64(&mut buf, RESERVED_OFFSET, self.blocks_reserved);
        write_u64(&mut buf, MODIFIED_OFFSET, self.modified);
        for (i, ptr) in self.direct.iter().enumerate() {
            write_u64(&mut buf, DIRECT_OFFSET + i * POINTER_SIZE, *ptr);
        }
        for (i, ptr) in self.indirect.iter().enumerate() {
            write_u64(&mut buf, INDIRECT_OFFSET + i * POINTER_SIZE, *ptr);
        }
        buf
    }
}

/// Seconds since the Unix epoch, as stored in `modified`.
#[must_use]
pub fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
