use std::collections::hash_map::Entry;
use std::collections::{BTreeSet, HashMap};

use tracing::warn;

use super::Volume;
use crate::constants::{NUM_DIRECT, NUM_INDIRECT, POINTER_SIZE};
use crate::error::{FsError, FsResult};
use crate::layout::inode::now_secs;
use crate::layout::{Inode, Superblock, read_u64, write_u64};
use crate::store::{BlockStore, read_exact, write_exact};

/// Where a logical block's pointer lives in an inode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockSlot {
    Direct(usize),
    /// `path` holds `level + 1` table indices, outermost first.
    Indirect { level: usize, path: Vec<u64> },
}

/// Logical-to-pointer geometry of one volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockMap {
    pointers_per_block: u64,
    level_capacity: [u64; NUM_INDIRECT],
}

impl BlockMap {
    #[must_use]
    pub const fn new(superblock: &Superblock) -> Self {
        Self {
            pointers_per_block: superblock.pointers_per_block(),
            level_capacity: superblock.level_capacity,
        }
    }

    /// Content blocks one inode can map.
    #[must_use]
    pub fn capacity(&self) -> u64 {
        self.level_capacity
            .iter()
            .fold(NUM_DIRECT as u64, |acc, &cap| acc.saturating_add(cap))
    }

    /// # Errors
    /// [`FsError::OutOfRange`] past [`BlockMap::capacity`].
    pub fn locate(&self, index: u64) -> FsResult<BlockSlot> {
        if index < NUM_DIRECT as u64 {
            return Ok(BlockSlot::Direct(index as usize));
        }
        let mut offset = index - NUM_DIRECT as u64;
        for (level, &cap) in self.level_capacity.iter().enumerate() {
            if offset < cap {
                let mut path = vec![0u64; level + 1];
                for digit in path.iter_mut().rev() {
                    *digit = offset % self.pointers_per_block;
                    offset /= self.pointers_per_block;
                }
                return Ok(BlockSlot::Indirect { level, path });
            }
            offset -= cap;
        }
        Err(FsError::OutOfRange(index))
    }

    /// Pointer blocks an inode needs to map content blocks `0..count`.
    #[must_use]
    pub fn pointer_blocks_for(&self, count: u64) -> u64 {
        let mut remaining = count.saturating_sub(NUM_DIRECT as u64);
        let mut total = 0u64;
        for (level, &cap) in self.level_capacity.iter().enumerate() {
            let entries = remaining.min(cap);
            remaining -= entries;
            let mut span = 1u64;
            for _ in 0..=level {
                span = span.saturating_mul(self.pointers_per_block);
                total += entries.div_ceil(span);
            }
        }
        total
    }
}

/// Pointer blocks decoded during one operation, keyed by data block number.
#[derive(Debug, Default)]
pub(crate) struct PointerCache {
    tables: HashMap<u64, Vec<u64>>,
}

impl<S: BlockStore> Volume<S> {
    #[must_use]
    pub const fn block_map(&self) -> BlockMap {
        BlockMap::new(&self.superblock)
    }

    /// Physical block holding logical block `index` of `inode`.
    ///
    /// # Errors
    /// [`FsError::OutOfRange`] beyond the addressable size, [`FsError::Corrupt`] for a
    /// block that is addressable but not mapped.
    pub fn resolve(&self, inode: &Inode, index: u64) -> FsResult<u64> {
        let block = self.walk(&mut PointerCache::default(), inode, index, |_| {})?;
        self.data_lba(block)
    }

    /// Every data block `inode` references: content blocks in logical order, then the
    /// pointer blocks on their paths.
    ///
    /// # Errors
    /// As [`Volume::resolve`].
    pub fn mapped_blocks(&self, inode: &Inode) -> FsResult<(Vec<u64>, BTreeSet<u64>)> {
        let mut cache = PointerCache::default();
        let mut tables = BTreeSet::new();
        let mut content = Vec::new();
        for index in 0..inode.blocks_reserved {
            content.push(self.walk(&mut cache, inode, index, |table| {
                tables.insert(table);
            })?);
        }
        Ok((content, tables))
    }

    /// Reads `len` bytes of `inode` from `offset`, without clamping to its size.
    pub(crate) fn read_range(&self, inode: &Inode, offset: u64, len: u64) -> FsResult<Vec<u8>> {
        let block_size = self.block_size();
        let mut cache = PointerCache::default();
        let mut block = vec![0u8; self.block_len()];
        let mut out = Vec::with_capacity(usize::try_from(len).unwrap_or(0));
        let end = offset.saturating_add(len);
        let mut pos = offset;
        while pos < end {
            let within = (pos % block_size) as usize;
            let take = (block_size - within as u64).min(end - pos) as usize;
            let lba = self.data_lba(self.walk(&mut cache, inode, pos / block_size, |_| {})?)?;
            read_exact(&self.store, &mut block, lba)?;
            out.extend_from_slice(&block[within..within + take]);
            pos += take as u64;
        }
        Ok(out)
    }

    /// Writes `data` into `inode` at `offset`, mapping any blocks up to the end first.
    /// The caller persists the inode.
    pub(crate) fn write_range(
        &mut self,
        inode: &mut Inode,
        offset: u64,
        data: &[u8],
    ) -> FsResult<()> {
        if data.is_empty() {
            return Ok(());
        }
        let block_size = self.block_size();
        let end = offset
            .checked_add(data.len() as u64)
            .ok_or(FsError::OutOfRange(u64::MAX))?;
        self.reserve_blocks(inode, end.div_ceil(block_size))?;

        let mut cache = PointerCache::default();
        let mut block = vec![0u8; self.block_len()];
        let mut written = 0usize;
        while written < data.len() {
            let pos = offset + written as u64;
            let within = (pos % block_size) as usize;
            let take = (self.block_len() - within).min(data.len() - written);
            let lba = self.data_lba(self.walk(&mut cache, inode, pos / block_size, |_| {})?)?;
            if take != self.block_len() {
                read_exact(&self.store, &mut block, lba)?;
            }
            block[within..within + take].copy_from_slice(&data[written..written + take]);
            write_exact(&mut self.store, &block, lba)?;
            written += take;
        }
        Ok(())
    }

    /// Maps logical blocks until `inode` covers `count` of them, then persists the
    /// allocation. Fails before allocating anything when the volume cannot hold them.
    pub(crate) fn reserve_blocks(&mut self, inode: &mut Inode, count: u64) -> FsResult<()> {
        if count <= inode.blocks_reserved {
            return Ok(());
        }
        let map = self.block_map();
        if count > map.capacity() {
            return Err(FsError::OutOfRange(count - 1));
        }
        let needed = (count - inode.blocks_reserved) + map.pointer_blocks_for(count)
            - map.pointer_blocks_for(inode.blocks_reserved);
        if needed > self.superblock.free_blocks {
            return Err(FsError::NoSpace);
        }
        let mut cache = PointerCache::default();
        while inode.blocks_reserved < count {
            self.map_next_block(&mut cache, inode)?;
        }
        self.persist_allocation()
    }

    /// Reads up to `len` bytes of file `id` from `offset`, clamped to its size.
    ///
    /// # Errors
    /// [`FsError::NotFound`] for a free slot, [`FsError::IsDirectory`] for a directory.
    pub fn read_at(&self, id: u64, offset: u64, len: u64) -> FsResult<Vec<u8>> {
        let inode = self.load_inode(id)?;
        if inode.is_dir() {
            return Err(FsError::IsDirectory);
        }
        if offset >= inode.size {
            return Ok(Vec::new());
        }
        self.read_range(&inode, offset, len.min(inode.size - offset))
    }

    /// Reads file `id` from the start; a `length` of 0 reads the whole file.
    ///
    /// # Errors
    /// As [`Volume::read_at`].
    pub fn read_file(&self, id: u64, length: u64) -> FsResult<Vec<u8>> {
        let len = if length == 0 { u64::MAX } else { length };
        self.read_at(id, 0, len)
    }

    /// Writes `data` into file `id` at `offset`, growing it as needed. Bytes between
    /// the old end and `offset` read as zero.
    ///
    /// # Errors
    /// [`FsError::NoSpace`] or [`FsError::OutOfRange`] when the file cannot grow that far,
    /// [`FsError::IsDirectory`] for a directory.
    pub fn write_file(&mut self, id: u64, data: &[u8], offset: u64) -> FsResult<u64> {
        let mut inode = self.load_inode(id)?;
        if inode.is_dir() {
            return Err(FsError::IsDirectory);
        }
        if data.is_empty() {
            return Ok(0);
        }
        let block_size = self.block_size();
        let tail = inode.size % block_size;
        if offset > inode.size && tail != 0 && inode.size / block_size < inode.blocks_reserved {
            let gap = (block_size - tail).min(offset - inode.size);
            let zeros = vec![0u8; gap as usize];
            let size = inode.size;
            self.write_range(&mut inode, size, &zeros)?;
        }
        self.write_range(&mut inode, offset, data)?;
        inode.size = inode.size.max(offset + data.len() as u64);
        inode.modified = now_secs();
        self.write_inode(id, &inode)?;
        Ok(data.len() as u64)
    }

    /// Releases every block of file `id`, leaving it empty.
    ///
    /// # Errors
    /// [`FsError::IsDirectory`] for a directory.
    pub fn truncate_file(&mut self, id: u64) -> FsResult<()> {
        let mut inode = self.load_inode(id)?;
        if inode.is_dir() {
            return Err(FsError::IsDirectory);
        }
        self.truncate(&mut inode)?;
        inode.modified = now_secs();
        self.write_inode(id, &inode)
    }

    /// Releases every content and pointer block of `inode` and clears its mappings.
    /// The caller persists the inode.
    pub(crate) fn truncate(&mut self, inode: &mut Inode) -> FsResult<()> {
        let (content, tables) = self.mapped_blocks(inode)?;
        for block in content.into_iter().chain(tables) {
            if !self.release_block(block)? {
                warn!(
                    inode = inode.id,
                    block, "released a data block that was already free"
                );
            }
        }
        inode.clear_mappings();
        self.persist_allocation()
    }

    /// Maps logical block `blocks_reserved`, allocating the content block and any pointer
    /// block its path lacks. Returns the new content block.
    pub(crate) fn map_next_block(
        &mut self,
        cache: &mut PointerCache,
        inode: &mut Inode,
    ) -> FsResult<u64> {
        let slot = self.block_map().locate(inode.blocks_reserved)?;
        let block = self.allocate_block()?;
        match slot {
            BlockSlot::Direct(i) => inode.direct[i] = block,
            BlockSlot::Indirect { level, path } => {
                let fresh = |digits: &[u64]| digits.iter().all(|&d| d == 0);
                if fresh(&path[..]) {
                    inode.indirect[level] = self.allocate_table(cache)?;
                }
                let mut table = inode.indirect[level];
                let last = path.len() - 1;
                for depth in 0..last {
                    table = if fresh(&path[depth + 1..]) {
                        let child = self.allocate_table(cache)?;
                        self.set_pointer(cache, table, path[depth], child)?;
                        child
                    } else {
                        self.pointer_at(cache, table, path[depth])?
                    };
                }
                self.set_pointer(cache, table, path[last], block)?;
            }
        }
        inode.blocks_reserved += 1;
        Ok(block)
    }

    fn allocate_table(&mut self, cache: &mut PointerCache) -> FsResult<u64> {
        let table = self.allocate_block()?;
        let entries = self.block_map().pointers_per_block as usize;
        cache.tables.insert(table, vec![0u64; entries]);
        Ok(table)
    }

    /// Content block of logical block `index`, reporting each pointer block crossed.
    pub(crate) fn walk(
        &self,
        cache: &mut PointerCache,
        inode: &Inode,
        index: u64,
        mut visit: impl FnMut(u64),
    ) -> FsResult<u64> {
        let slot = self.block_map().locate(index)?;
        if index >= inode.blocks_reserved {
            return Err(FsError::Corrupt(format!(
                "logical block {index} of inode {} is not mapped",
                inode.id
            )));
        }
        match slot {
            BlockSlot::Direct(i) => Ok(inode.direct[i]),
            BlockSlot::Indirect { level, path } => {
                let mut block = inode.indirect[level];
                for digit in path {
                    visit(block);
                    block = self.pointer_at(cache, block, digit)?;
                }
                Ok(block)
            }
        }
    }

    fn pointer_at(&self, cache: &mut PointerCache, table: u64, digit: u64) -> FsResult<u64> {
        let entries = self.cached_table(cache, table)?;
        entries
            .get(digit as usize)
            .copied()
            .ok_or_else(|| FsError::Corrupt(format!("pointer {digit} outside table {table}")))
    }

    fn set_pointer(
        &mut self,
        cache: &mut PointerCache,
        table: u64,
        digit: u64,
        value: u64,
    ) -> FsResult<()> {
        let lba = self.data_lba(table)?;
        let entries = self.cached_table(cache, table)?;
        let slot = entries
            .get_mut(digit as usize)
            .ok_or_else(|| FsError::Corrupt(format!("pointer {digit} outside table {table}")))?;
        *slot = value;

        let mut buf = vec![0u8; self.block_len()];
        for (i, ptr) in entries.iter().enumerate() {
            write_u64(&mut buf, i * POINTER_SIZE, *ptr);
        }
        write_exact(&mut self.store, &buf, lba)
    }

    fn cached_table<'c>(
        &self,
        cache: &'c mut PointerCache,
        table: u64,
    ) -> FsResult<&'c mut Vec<u64>> {
        match cache.tables.entry(table) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let mut buf = vec![0u8; self.block_len()];
                read_exact(&self.store, &mut buf, self.data_lba(table)?)?;
                let pointers = buf
                    .chunks_exact(POINTER_SIZE)
                    .map(|chunk| read_u64(chunk, 0))
                    .collect();
                Ok(entry.insert(pointers))
            }
        }
    }
}
