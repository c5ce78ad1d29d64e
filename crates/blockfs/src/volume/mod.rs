//! The mounted filesystem engine: layout, allocation, inode table, block translation
//! and directories over a single [`BlockStore`].

mod directory;
mod inode_table;
mod translate;

#[cfg(test)]
mod volume_tests;

pub use inode_table::{hash_name, probe_sequence};
pub use translate::{BlockMap, BlockSlot};

use std::collections::BTreeSet;

use tracing::{debug, info, warn};

use crate::constants::{ROOT_INODE, SUPERBLOCK_LBA, SUPERBLOCK_MIRROR_LBA};
use crate::error::{FsError, FsResult};
use crate::layout::inode::now_secs;
use crate::layout::{BitVector, Inode, InodeKind, Superblock};
use crate::store::{BlockStore, Geometry, read_exact, write_exact};

/// Blocks zeroed per write while formatting.
const ZERO_CHUNK_BLOCKS: u64 = 64;

/// One formatted volume: the store plus the in-memory superblock and free-block bitmap.
pub struct Volume<S: BlockStore> {
    store: S,
    superblock: Superblock,
    bitmap: BitVector,
    dirty_bitmap_blocks: BTreeSet<u64>,
}

impl<S: BlockStore> Volume<S> {
    /// Returns the superblock if either copy carries valid signatures.
    ///
    /// # Errors
    /// [`FsError::StorageIo`] when the superblock blocks cannot be read.
    pub fn probe(store: &S) -> FsResult<Option<Superblock>> {
        if let Some(superblock) = read_superblock_copy(store, SUPERBLOCK_LBA)? {
            return Ok(Some(superblock));
        }
        if store.geometry().block_count <= SUPERBLOCK_MIRROR_LBA {
            return Ok(None);
        }
        read_superblock_copy(store, SUPERBLOCK_MIRROR_LBA)
    }

    /// Lays a fresh filesystem over `store`, destroying whatever it held.
    ///
    /// # Errors
    /// [`FsError::InvalidGeometry`] before anything is written, or [`FsError::StorageIo`].
    pub fn format(store: S) -> FsResult<Self> {
        let superblock = Superblock::plan(store.geometry())?;
        let bitmap = fresh_bitmap(&superblock, store.geometry().block_size);
        let mut volume = Self {
            store,
            superblock,
            bitmap,
            dirty_bitmap_blocks: BTreeSet::new(),
        };
        volume.lay_down()?;
        Ok(volume)
    }

    /// Formats the volume in place.
    ///
    /// # Errors
    /// See [`Volume::format`].
    pub fn reformat(&mut self) -> FsResult<()> {
        let superblock = Superblock::plan(self.store.geometry())?;
        self.bitmap = fresh_bitmap(&superblock, self.block_size());
        self.superblock = superblock;
        self.dirty_bitmap_blocks.clear();
        self.lay_down()
    }

    /// Mounts an existing filesystem.
    ///
    /// A damaged primary superblock is restored from the mirror. Block counters that
    /// disagree with the bitmap are rewritten from it.
    ///
    /// # Errors
    /// [`FsError::NotFormatted`] when neither superblock copy is valid,
    /// [`FsError::Corrupt`] when the layout contradicts the geometry.
    pub fn mount(store: S) -> FsResult<Self> {
        let (superblock, recovered) = match read_superblock_copy(&store, SUPERBLOCK_LBA)? {
            Some(superblock) => (superblock, false),
            None => match read_superblock_copy(&store, SUPERBLOCK_MIRROR_LBA)? {
                Some(superblock) => {
                    warn!("primary superblock is invalid, recovering from mirror");
                    (superblock, true)
                }
                None => return Err(FsError::NotFormatted),
            },
        };
        superblock.validate(store.geometry())?;

        let block_len = block_len(store.geometry());
        let bitmap_len = usize::try_from(superblock.bitmap_blocks())
            .ok()
            .and_then(|blocks| blocks.checked_mul(block_len))
            .ok_or_else(|| FsError::Corrupt("bitmap region is not addressable".into()))?;
        let mut bytes = vec![0u8; bitmap_len];
        read_exact(&store, &mut bytes, superblock.bitmap_start)?;

        let mut volume = Self {
            bitmap: BitVector::from_bytes(bytes, superblock.total_data_blocks),
            store,
            superblock,
            dirty_bitmap_blocks: BTreeSet::new(),
        };
        let blocks_fixed = volume.reconcile_counters();
        let inodes_fixed = volume.reconcile_inode_count()?;
        if blocks_fixed || inodes_fixed || recovered {
            volume.write_superblock()?;
        }
        info!(
            volume = %volume.geometry().volume_name,
            used_inodes = volume.superblock.used_inodes,
            used_blocks = volume.superblock.used_blocks,
            free_blocks = volume.superblock.free_blocks,
            "mounted volume"
        );
        Ok(volume)
    }

    #[must_use]
    pub const fn superblock(&self) -> &Superblock {
        &self.superblock
    }

    #[must_use]
    pub fn geometry(&self) -> &Geometry {
        self.store.geometry()
    }

    #[must_use]
    pub const fn store(&self) -> &S {
        &self.store
    }

    #[must_use]
    pub fn into_store(self) -> S {
        self.store
    }

    #[must_use]
    pub fn block_size(&self) -> u64 {
        self.geometry().block_size
    }

    #[must_use]
    pub fn is_block_allocated(&self, block: u64) -> bool {
        self.bitmap.get(block)
    }

    pub(crate) fn block_len(&self) -> usize {
        block_len(self.geometry())
    }

    /// Absolute LBA of a data block number.
    pub(crate) fn data_lba(&self, block: u64) -> FsResult<u64> {
        if block >= self.superblock.total_data_blocks {
            return Err(FsError::Corrupt(format!(
                "data block {block} is outside the data region"
            )));
        }
        Ok(self.superblock.data_start + block)
    }

    /// Takes the lowest free data block, zero-filled on the volume.
    ///
    /// The bitmap change stays in memory until [`Volume::persist_allocation`].
    pub(crate) fn allocate_block(&mut self) -> FsResult<u64> {
        let block = self.bitmap.first_clear().ok_or(FsError::NoSpace)?;
        let zero = vec![0u8; self.block_len()];
        write_exact(&mut self.store, &zero, self.superblock.data_start + block)?;

        self.bitmap.set(block, true);
        self.mark_bitmap_dirty(block);
        self.superblock.free_blocks = self.superblock.free_blocks.saturating_sub(1);
        self.superblock.used_blocks += 1;
        debug!(block, "allocated data block");
        Ok(block)
    }

    /// Frees a data block. Returns false, changing nothing, when it was already free.
    pub(crate) fn release_block(&mut self, block: u64) -> FsResult<bool> {
        self.data_lba(block)?;
        if !self.bitmap.get(block) {
            return Ok(false);
        }
        self.bitmap.set(block, false);
        self.mark_bitmap_dirty(block);
        self.superblock.free_blocks += 1;
        self.superblock.used_blocks = self.superblock.used_blocks.saturating_sub(1);
        debug!(block, "released data block");
        Ok(true)
    }

    /// Writes the dirty bitmap blocks and both superblock copies.
    pub(crate) fn persist_allocation(&mut self) -> FsResult<()> {
        let block_len = self.block_len();
        for index in std::mem::take(&mut self.dirty_bitmap_blocks) {
            let start = index as usize * block_len;
            let Some(chunk) = self.bitmap.as_bytes().get(start..start + block_len) else {
                continue;
            };
            write_exact(&mut self.store, chunk, self.superblock.bitmap_start + index)?;
        }
        self.write_superblock()
    }

    fn mark_bitmap_dirty(&mut self, block: u64) {
        let bits_per_block = self.block_size() * 8;
        self.dirty_bitmap_blocks.insert(block / bits_per_block);
    }

    fn write_superblock(&mut self) -> FsResult<()> {
        let mut buf = vec![0u8; self.block_len()];
        self.superblock.write_bytes(&mut buf);
        write_exact(&mut self.store, &buf, SUPERBLOCK_LBA)?;
        write_exact(&mut self.store, &buf, SUPERBLOCK_MIRROR_LBA)
    }

    /// Trusts the bitmap over the recorded counters; returns true when they were rewritten.
    fn reconcile_counters(&mut self) -> bool {
        let used = self.bitmap.count_ones();
        let sb = &mut self.superblock;
        let free = sb.total_data_blocks - used;
        if sb.used_blocks == used && sb.free_blocks == free {
            return false;
        }
        warn!(
            recorded_used = sb.used_blocks,
            recorded_free = sb.free_blocks,
            bitmap_used = used,
            "block counters disagree with the bitmap"
        );
        sb.used_blocks = used;
        sb.free_blocks = free;
        true
    }

    /// Trusts the used flags of the inode table over the recorded `used_inodes`.
    fn reconcile_inode_count(&mut self) -> FsResult<bool> {
        let used = self.count_used_inodes()?;
        if self.superblock.used_inodes == used {
            return Ok(false);
        }
        warn!(
            recorded = self.superblock.used_inodes,
            counted = used,
            "inode counter disagrees with the inode table"
        );
        self.superblock.used_inodes = used;
        Ok(true)
    }

    fn lay_down(&mut self) -> FsResult<()> {
        // Superblocks are wiped first and written last so an interrupted format never mounts.
        self.zero_blocks(SUPERBLOCK_LBA, self.superblock.data_start)?;

        let root_block = self.allocate_block()?;
        let mut root = Inode::new(ROOT_INODE, ROOT_INODE, InodeKind::Directory, now_secs());
        root.direct[0] = root_block;
        root.blocks_reserved = 1;
        self.write_inode(ROOT_INODE, &root)?;
        self.superblock.used_inodes = 1;
        self.persist_allocation()?;

        info!(
            volume = %self.geometry().volume_name,
            block_size = self.block_size(),
            blocks = self.geometry().block_count,
            inodes = self.superblock.num_inodes,
            data_blocks = self.superblock.total_data_blocks,
            "formatted volume"
        );
        Ok(())
    }

    fn zero_blocks(&mut self, start: u64, count: u64) -> FsResult<()> {
        let block_len = self.block_len();
        let chunk = count.min(ZERO_CHUNK_BLOCKS);
        let zero = vec![0u8; block_len * usize::try_from(chunk).unwrap_or(1)];
        let mut lba = start;
        while lba < start + count {
            let blocks = (start + count - lba).min(chunk);
            let len = block_len * usize::try_from(blocks).unwrap_or(1);
            write_exact(&mut self.store, &zero[..len], lba)?;
            lba += blocks;
        }
        Ok(())
    }
}

fn block_len(geometry: &Geometry) -> usize {
    usize::try_from(geometry.block_size).unwrap_or(0)
}

fn fresh_bitmap(superblock: &Superblock, block_size: u64) -> BitVector {
    let byte_len = usize::try_from(superblock.bitmap_blocks() * block_size).unwrap_or(0);
    BitVector::zeroed(superblock.total_data_blocks, byte_len)
}

fn read_superblock_copy<S: BlockStore + ?Sized>(
    store: &S,
    lba: u64,
) -> FsResult<Option<Superblock>> {
    let mut buf = vec![0u8; block_len(store.geometry())];
    read_exact(store, &mut buf, lba)?;
    Ok(Superblock::from_bytes(&buf))
}
