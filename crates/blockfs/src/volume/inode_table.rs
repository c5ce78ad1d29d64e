use tracing::debug;

use super::Volume;
use crate::constants::{HASH_SEED, INODE_SIZE, ROOT_INODE, UNUSED_FLAG};
use crate::error::{FsError, FsResult};
use crate::layout::{Inode, Superblock};
use crate::store::{BlockStore, read_exact, write_exact};

/// Home slot of `name` created under `parent`.
#[must_use]
pub fn hash_name(name: &str, parent: u64, num_inodes: u64) -> u64 {
    let hash = name.bytes().fold(HASH_SEED, |hash, byte| {
        hash.wrapping_mul(33)
            .wrapping_add(u64::from(byte))
            .wrapping_add(parent)
    });
    hash.checked_rem(num_inodes).unwrap_or(0)
}

/// Slots probed for `name`: forward from its home slot to the end of the table, then
/// from slot 1 back up to it. The root slot is never visited.
pub fn probe_sequence(name: &str, parent: u64, num_inodes: u64) -> impl Iterator<Item = u64> {
    let start = hash_name(name, parent, num_inodes);
    (start.max(1)..num_inodes).chain(1..start)
}

/// Inode-region blocks read per step when counting used slots.
const COUNT_CHUNK_BLOCKS: u64 = 64;

fn record_offset(superblock: &Superblock, block_size: u64, id: u64) -> u64 {
    superblock.inode_start * block_size + id * INODE_SIZE as u64
}

/// Two consecutive inode-region blocks held in memory while probing.
struct ProbeWindow {
    first: Option<u64>,
    buf: Vec<u8>,
    block_len: usize,
}

impl ProbeWindow {
    fn new(block_len: usize) -> Self {
        Self {
            first: None,
            buf: vec![0u8; 2 * block_len],
            block_len,
        }
    }

    fn is_used<S: BlockStore + ?Sized>(
        &mut self,
        store: &S,
        superblock: &Superblock,
        id: u64,
    ) -> FsResult<bool> {
        let block_size = self.block_len as u64;
        let offset = record_offset(superblock, block_size, id);
        let lba = offset / block_size;
        let within = (offset % block_size) as usize;

        let pos = match self.first {
            Some(first) if lba == first => within,
            Some(first) if lba == first + 1 => self.block_len + within,
            Some(first) if lba == first + 2 => {
                self.buf.copy_within(self.block_len.., 0);
                read_exact(store, &mut self.buf[self.block_len..], lba)?;
                self.first = Some(first + 1);
                self.block_len + within
            }
            _ => {
                read_exact(store, &mut self.buf, lba)?;
                self.first = Some(lba);
                within
            }
        };
        Ok(self.buf[pos] != UNUSED_FLAG)
    }
}

impl<S: BlockStore> Volume<S> {
    /// Picks the slot a new inode named `name` under `parent` should occupy.
    ///
    /// Selection only: the caller commits the slot by writing a used record before the
    /// next allocation.
    ///
    /// # Errors
    /// [`FsError::TableFull`] when every slot is in use.
    pub fn allocate_slot(&self, name: &str, parent: u64) -> FsResult<u64> {
        let superblock = &self.superblock;
        if superblock.used_inodes >= superblock.num_inodes {
            return Err(FsError::TableFull);
        }
        let mut window = ProbeWindow::new(self.block_len());
        for id in probe_sequence(name, parent, superblock.num_inodes) {
            if !window.is_used(&self.store, superblock, id)? {
                debug!(name, parent, id, "selected inode slot");
                return Ok(id);
            }
        }
        Err(FsError::TableFull)
    }

    /// Reads the raw record in slot `id`, used or not.
    ///
    /// # Errors
    /// [`FsError::InvalidId`] outside the table, [`FsError::StorageIo`], or
    /// [`FsError::Corrupt`] for an undecodable record.
    pub fn read_inode(&self, id: u64) -> FsResult<Inode> {
        let (lba, within, mut buf) = self.inode_span(id)?;
        read_exact(&self.store, &mut buf, lba)?;
        let mut record = [0u8; INODE_SIZE];
        record.copy_from_slice(&buf[within..within + INODE_SIZE]);
        Inode::from_bytes(&record)
    }

    /// Reads slot `id`, which must hold an allocated inode.
    ///
    /// # Errors
    /// [`FsError::NotFound`] for a free slot, otherwise as [`Volume::read_inode`].
    pub fn load_inode(&self, id: u64) -> FsResult<Inode> {
        let inode = self.read_inode(id)?;
        if !inode.used {
            return Err(FsError::NotFound);
        }
        Ok(inode)
    }

    /// Overwrites slot `id`, leaving neighbouring records untouched.
    ///
    /// # Errors
    /// [`FsError::InvalidId`] outside the table, or [`FsError::StorageIo`].
    pub fn write_inode(&mut self, id: u64, inode: &Inode) -> FsResult<()> {
        let (lba, within, mut buf) = self.inode_span(id)?;
        read_exact(&self.store, &mut buf, lba)?;
        buf[within..within + INODE_SIZE].copy_from_slice(&inode.to_bytes());
        write_exact(&mut self.store, &buf, lba)
    }

    /// Writes a populated record into a slot from [`Volume::allocate_slot`] and counts it.
    pub(crate) fn commit_inode(&mut self, inode: &Inode) -> FsResult<()> {
        if self.read_inode(inode.id)?.used {
            return Err(FsError::Corrupt(format!(
                "inode slot {} is already in use",
                inode.id
            )));
        }
        self.write_inode(inode.id, inode)?;
        self.superblock.used_inodes += 1;
        self.persist_allocation()
    }

    /// Returns slot `id` to the free pool. Its blocks must already be released.
    pub(crate) fn release_inode(&mut self, id: u64) -> FsResult<()> {
        if id == ROOT_INODE {
            return Err(FsError::InvalidId(id));
        }
        self.write_inode(id, &Inode::free())?;
        self.superblock.used_inodes = self.superblock.used_inodes.saturating_sub(1);
        debug!(id, "released inode");
        self.persist_allocation()
    }

    /// Number of slots whose used flag is set, scanning the inode region a chunk at a time.
    pub(crate) fn count_used_inodes(&self) -> FsResult<u64> {
        let block_len = self.block_len();
        let block_size = self.block_size();
        let sb = &self.superblock;
        let region_bytes = sb.inode_blocks() * block_size;
        let mut buf = vec![0u8; block_len * COUNT_CHUNK_BLOCKS as usize];
        let mut used = 0;
        let mut id = 0;
        let mut chunk_start = 0;
        while chunk_start < region_bytes && id < sb.num_inodes {
            let blocks = ((region_bytes - chunk_start) / block_size).min(COUNT_CHUNK_BLOCKS);
            let len = blocks * block_size;
            let chunk = &mut buf[..len as usize];
            read_exact(&self.store, chunk, sb.inode_start + chunk_start / block_size)?;
            while id < sb.num_inodes {
                let flag_at = id * INODE_SIZE as u64;
                if flag_at >= chunk_start + len {
                    break;
                }
                if chunk[(flag_at - chunk_start) as usize] != UNUSED_FLAG {
                    used += 1;
                }
                id += 1;
            }
            chunk_start += len;
        }
        Ok(used)
    }

    /// First block holding record `id`, the record's offset inside it, and a buffer
    /// covering every block the record touches.
    fn inode_span(&self, id: u64) -> FsResult<(u64, usize, Vec<u8>)> {
        if id >= self.superblock.num_inodes {
            return Err(FsError::InvalidId(id));
        }
        let block_size = self.block_size();
        let offset = record_offset(&self.superblock, block_size, id);
        let within = (offset % block_size) as usize;
        let blocks = if within + INODE_SIZE > self.block_len() {
            2
        } else {
            1
        };
        Ok((offset / block_size, within, vec![0u8; blocks * self.block_len()]))
    }
}
