use tracing::debug;

use super::Volume;
use super::translate::PointerCache;
use crate::constants::{DIR_ENTRY_SIZE, FREE_ENTRY};
use crate::error::{FsError, FsResult};
use crate::layout::inode::now_secs;
use crate::layout::{DirEntry, Inode, validate_name};
use crate::store::{BlockStore, read_exact, write_exact};

/// One entry position inside a directory's data blocks.
struct EntrySlot {
    lba: u64,
    index: usize,
    entry: DirEntry,
}

impl<S: BlockStore> Volume<S> {
    /// Directory entries stored per block; entries never straddle blocks.
    #[must_use]
    pub fn entries_per_block(&self) -> usize {
        self.block_len() / DIR_ENTRY_SIZE
    }

    /// Looks `name` up among the in-use entries of directory `dir`.
    ///
    /// # Errors
    /// [`FsError::NotFound`], or [`FsError::NotDirectory`] when `dir` is a file.
    pub fn lookup(&self, dir: u64, name: &str) -> FsResult<u64> {
        let inode = self.load_dir(dir)?;
        self.entry_slots(&inode)?
            .into_iter()
            .find(|slot| !slot.entry.is_free() && slot.entry.name == name)
            .map(|slot| slot.entry.inode)
            .ok_or(FsError::NotFound)
    }

    /// In-use entries of directory `dir` in address order.
    ///
    /// # Errors
    /// [`FsError::NotDirectory`] when `dir` is a file.
    pub fn list_entries(&self, dir: u64) -> FsResult<Vec<DirEntry>> {
        let inode = self.load_dir(dir)?;
        Ok(self
            .entry_slots(&inode)?
            .into_iter()
            .filter(|slot| !slot.entry.is_free())
            .map(|slot| slot.entry)
            .collect())
    }

    /// Binds `name` to `child` in directory `dir`, reusing the first free slot or
    /// growing the directory by one block.
    ///
    /// # Errors
    /// [`FsError::AlreadyExists`] leaves the directory untouched. [`FsError::NoSpace`]
    /// when the directory cannot grow.
    pub fn insert_entry(&mut self, dir: u64, name: &str, child: u64) -> FsResult<()> {
        validate_name(name)?;
        if child == FREE_ENTRY {
            return Err(FsError::InvalidId(child));
        }
        let mut inode = self.load_dir(dir)?;
        let slots = self.entry_slots(&inode)?;
        if slots
            .iter()
            .any(|slot| !slot.entry.is_free() && slot.entry.name == name)
        {
            return Err(FsError::AlreadyExists);
        }

        let (lba, index) = match slots.iter().find(|slot| slot.entry.is_free()) {
            Some(slot) => (slot.lba, slot.index),
            None => {
                let grown = inode.blocks_reserved + 1;
                self.reserve_blocks(&mut inode, grown).map_err(|err| match err {
                    FsError::OutOfRange(_) => FsError::NoSpace,
                    other => other,
                })?;
                (self.resolve(&inode, grown - 1)?, 0)
            }
        };
        self.write_entry(lba, index, &DirEntry::new(name, child))?;

        inode.size += DIR_ENTRY_SIZE as u64;
        inode.modified = now_secs();
        self.write_inode(dir, &inode)?;
        debug!(dir, name, child, "inserted directory entry");
        Ok(())
    }

    /// Clears the entry for `name` in directory `dir` and returns the inode it named.
    /// Later entries keep their positions.
    ///
    /// # Errors
    /// [`FsError::NotFound`] leaves the directory untouched.
    pub fn remove_entry(&mut self, dir: u64, name: &str) -> FsResult<u64> {
        let mut inode = self.load_dir(dir)?;
        let slot = self
            .entry_slots(&inode)?
            .into_iter()
            .find(|slot| !slot.entry.is_free() && slot.entry.name == name)
            .ok_or(FsError::NotFound)?;
        self.write_entry(slot.lba, slot.index, &DirEntry::new("", FREE_ENTRY))?;

        inode.size = inode.size.saturating_sub(DIR_ENTRY_SIZE as u64);
        inode.modified = now_secs();
        self.write_inode(dir, &inode)?;
        debug!(dir, name, child = slot.entry.inode, "removed directory entry");
        Ok(slot.entry.inode)
    }

    pub(crate) fn load_dir(&self, dir: u64) -> FsResult<Inode> {
        let inode = self.load_inode(dir)?;
        if !inode.is_dir() {
            return Err(FsError::NotDirectory);
        }
        Ok(inode)
    }

    fn entry_slots(&self, dir: &Inode) -> FsResult<Vec<EntrySlot>> {
        let per_block = self.entries_per_block();
        let mut cache = PointerCache::default();
        let mut block = vec![0u8; self.block_len()];
        let mut slots = Vec::new();
        for logical in 0..dir.blocks_reserved {
            let lba = self.data_lba(self.walk(&mut cache, dir, logical, |_| {})?)?;
            read_exact(&self.store, &mut block, lba)?;
            for index in 0..per_block {
                let mut raw = [0u8; DIR_ENTRY_SIZE];
                raw.copy_from_slice(&block[index * DIR_ENTRY_SIZE..(index + 1) * DIR_ENTRY_SIZE]);
                slots.push(EntrySlot {
                    lba,
                    index,
                    entry: DirEntry::from_bytes(&raw),
                });
            }
        }
        Ok(slots)
    }

    fn write_entry(&mut self, lba: u64, index: usize, entry: &DirEntry) -> FsResult<()> {
        let mut block = vec![0u8; self.block_len()];
        read_exact(&self.store, &mut block, lba)?;
        block[index * DIR_ENTRY_SIZE..(index + 1) * DIR_ENTRY_SIZE]
            .copy_from_slice(&entry.to_bytes());
        write_exact(&mut self.store, &block, lba)
    }
}
