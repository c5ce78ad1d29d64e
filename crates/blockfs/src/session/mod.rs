//! A mounted volume together with its open files and working directory, exposing the
//! filesystem commands.

mod cwd;
mod host;
mod open_files;


pub use cwd::WorkingDirectory;
pub use open_files::{OpenFile, OpenFileTable, Whence};

use tracing::debug;

use crate::constants::{MAX_OPEN_FILES, ROOT_INODE};
use crate::error::{FsError, FsResult};
use crate::layout::inode::now_secs;
use crate::layout::{Inode, InodeKind, validate_name};
use crate::store::BlockStore;
use crate::volume::Volume;

/// Geometry, layout and usage of a mounted volume.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeInfo {
    pub volume_name: String,
    pub volume_size: u64,
    pub block_size: u64,
    pub block_count: u64,
    pub num_inodes: u64,
    pub used_inodes: u64,
    pub total_data_blocks: u64,
    pub free_blocks: u64,
    pub used_blocks: u64,
    pub inode_start: u64,
    pub bitmap_start: u64,
    pub data_start: u64,
    pub max_file_size: u64,
}

/// One row of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Listing {
    pub name: String,
    pub inode: u64,
    pub kind: InodeKind,
    pub size: u64,
    pub modified: u64,
}

/// Names are resolved against the working directory. Every mutating command takes
/// `&mut self`; share a session across threads only behind a lock.
pub struct VolumeSession<S: BlockStore> {
    volume: Volume<S>,
    files: OpenFileTable,
    cwd: WorkingDirectory,
}

impl<S: BlockStore> VolumeSession<S> {
    /// # Errors
    /// [`FsError::StorageIo`] when the superblock cannot be read.
    pub fn is_formatted(store: &S) -> FsResult<bool> {
        Ok(Volume::probe(store)?.is_some())
    }

    /// Formats `store` and opens a session at the root directory.
    ///
    /// # Errors
    /// As [`Volume::format`].
    pub fn format(store: S) -> FsResult<Self> {
        Ok(Self::over(Volume::format(store)?))
    }

    /// # Errors
    /// As [`Volume::mount`].
    pub fn mount(store: S) -> FsResult<Self> {
        Ok(Self::over(Volume::mount(store)?))
    }

    fn over(volume: Volume<S>) -> Self {
        Self {
            volume,
            files: OpenFileTable::new(MAX_OPEN_FILES),
            cwd: WorkingDirectory::root(),
        }
    }

    /// Formats the mounted volume in place; all descriptors are closed.
    ///
    /// # Errors
    /// As [`Volume::format`].
    pub fn reformat(&mut self) -> FsResult<()> {
        self.files.clear();
        self.cwd = WorkingDirectory::root();
        self.volume.reformat()
    }

    #[must_use]
    pub const fn volume(&self) -> &Volume<S> {
        &self.volume
    }

    #[must_use]
    pub fn into_store(self) -> S {
        self.volume.into_store()
    }

    #[must_use]
    pub fn volume_info(&self) -> VolumeInfo {
        let geometry = self.volume.geometry();
        let sb = self.volume.superblock();
        VolumeInfo {
            volume_name: geometry.volume_name.clone(),
            volume_size: geometry.volume_size(),
            block_size: geometry.block_size,
            block_count: geometry.block_count,
            num_inodes: sb.num_inodes,
            used_inodes: sb.used_inodes,
            total_data_blocks: sb.total_data_blocks,
            free_blocks: sb.free_blocks,
            used_blocks: sb.used_blocks,
            inode_start: sb.inode_start,
            bitmap_start: sb.bitmap_start,
            data_start: sb.data_start,
            max_file_size: sb.max_file_blocks().saturating_mul(geometry.block_size),
        }
    }

    #[must_use]
    pub fn current_path(&self) -> &str {
        self.cwd.path()
    }

    #[must_use]
    pub const fn current_dir(&self) -> u64 {
        self.cwd.inode()
    }

    /// Enters `name`; `/` returns to the root and `..` climbs one level.
    ///
    /// # Errors
    /// [`FsError::NotFound`], or [`FsError::NotDirectory`] for a file.
    pub fn change_directory(&mut self, name: &str) -> FsResult<()> {
        match name {
            "/" => self.cwd = WorkingDirectory::root(),
            "." => {}
            ".." => {
                if self.cwd.inode() != ROOT_INODE {
                    let parent = self.volume.load_inode(self.cwd.inode())?.parent;
                    self.cwd.leave(parent);
                }
            }
            _ => {
                let id = self.volume.lookup(self.cwd.inode(), name)?;
                if !self.volume.load_inode(id)?.is_dir() {
                    return Err(FsError::NotDirectory);
                }
                self.cwd.enter(id, name);
            }
        }
        Ok(())
    }

    /// Entries of the working directory in on-disk order.
    ///
    /// # Errors
    /// [`FsError::StorageIo`] or [`FsError::Corrupt`].
    pub fn list_directory(&mut self) -> FsResult<Vec<Listing>> {
        if let Some(cached) = self.cwd.cached() {
            return Ok(cached.to_vec());
        }
        let listing = self
            .volume
            .list_entries(self.cwd.inode())?
            .into_iter()
            .map(|entry| {
                let inode = self.volume.load_inode(entry.inode)?;
                Ok(Listing {
                    name: entry.name,
                    inode: entry.inode,
                    kind: inode.kind,
                    size: inode.size,
                    modified: inode.modified,
                })
            })
            .collect::<FsResult<Vec<_>>>()?;
        self.cwd.cache(listing.clone());
        Ok(listing)
    }

    /// # Errors
    /// [`FsError::AlreadyExists`], [`FsError::InvalidName`], [`FsError::TableFull`] or
    /// [`FsError::NoSpace`].
    pub fn make_directory(&mut self, name: &str) -> FsResult<u64> {
        self.create_node(self.cwd.inode(), name, InodeKind::Directory)
    }

    /// Removes an empty directory.
    ///
    /// # Errors
    /// [`FsError::NotFound`], [`FsError::NotDirectory`] or [`FsError::NotEmpty`].
    pub fn remove_directory(&mut self, name: &str) -> FsResult<()> {
        let dir = self.cwd.inode();
        let id = self.volume.lookup(dir, name)?;
        if !self.volume.load_inode(id)?.is_dir() {
            return Err(FsError::NotDirectory);
        }
        if !self.volume.list_entries(id)?.is_empty() {
            return Err(FsError::NotEmpty);
        }
        self.destroy_node(dir, name, id)
    }

    /// Copies file `src` to `dst`, replacing the contents of an existing `dst` file.
    /// Returns the bytes copied.
    ///
    /// # Errors
    /// [`FsError::NotFound`] for a missing source, [`FsError::IsDirectory`] when either
    /// side is a directory.
    pub fn copy_file(&mut self, src: &str, dst: &str) -> FsResult<u64> {
        let dir = self.cwd.inode();
        let src_id = self.volume.lookup(dir, src)?;
        let data = self.volume.read_file(src_id, 0)?;
        if src == dst {
            return Ok(data.len() as u64);
        }
        let dst_id = self.file_for_overwrite(dst)?;
        let copied = self.volume.write_file(dst_id, &data, 0)?;
        self.files.invalidate_inode(dst_id);
        self.cwd.invalidate();
        debug!(src, dst, bytes = copied, "copied file");
        Ok(copied)
    }

    /// Renames `src` to `dst`, or moves it into `dst` when that names a directory
    /// (`/` and `..` included).
    ///
    /// # Errors
    /// [`FsError::NotFound`] for a missing source, [`FsError::AlreadyExists`] when `dst`
    /// is an existing file or the target directory already holds the name.
    pub fn move_file(&mut self, src: &str, dst: &str) -> FsResult<()> {
        let dir = self.cwd.inode();
        let id = self.volume.lookup(dir, src)?;
        let target = match dst {
            "/" => Some(ROOT_INODE),
            ".." => Some(self.volume.load_inode(dir)?.parent),
            _ => match self.volume.lookup(dir, dst) {
                Ok(existing) => {
                    if !self.volume.load_inode(existing)?.is_dir() {
                        return Err(FsError::AlreadyExists);
                    }
                    Some(existing)
                }
                Err(FsError::NotFound) => None,
                Err(err) => return Err(err),
            },
        };

        match target {
            Some(target) if target == dir => return Ok(()),
            Some(target) if target == id => return Err(FsError::InvalidInput),
            Some(target) => {
                self.volume.insert_entry(target, src, id)?;
                self.volume.remove_entry(dir, src)?;
                let mut inode = self.volume.load_inode(id)?;
                inode.parent = target;
                inode.modified = now_secs();
                self.volume.write_inode(id, &inode)?;
            }
            None => {
                validate_name(dst)?;
                self.volume.insert_entry(dir, dst, id)?;
                self.volume.remove_entry(dir, src)?;
            }
        }
        self.cwd.invalidate();
        debug!(src, dst, "moved entry");
        Ok(())
    }

    /// Deletes file `name`; descriptors open on it are closed.
    ///
    /// # Errors
    /// [`FsError::NotFound`], or [`FsError::IsDirectory`] for a directory.
    pub fn delete_file(&mut self, name: &str) -> FsResult<()> {
        let dir = self.cwd.inode();
        let id = self.volume.lookup(dir, name)?;
        if self.volume.load_inode(id)?.is_dir() {
            return Err(FsError::IsDirectory);
        }
        let closed = self.files.close_inode(id);
        if closed > 0 {
            debug!(name, closed, "closed descriptors of deleted file");
        }
        self.destroy_node(dir, name, id)
    }

    /// Whole contents of file `name`.
    ///
    /// # Errors
    /// [`FsError::NotFound`], or [`FsError::IsDirectory`] for a directory.
    pub fn read_file(&self, name: &str) -> FsResult<Vec<u8>> {
        let id = self.volume.lookup(self.cwd.inode(), name)?;
        self.volume.read_file(id, 0)
    }

    /// Opens `name`, creating an empty file when it does not exist.
    ///
    /// # Errors
    /// [`FsError::TooManyOpenFiles`], or [`FsError::IsDirectory`] for a directory.
    pub fn open(&mut self, name: &str) -> FsResult<usize> {
        if self.files.is_full() {
            return Err(FsError::TooManyOpenFiles);
        }
        let dir = self.cwd.inode();
        let id = match self.volume.lookup(dir, name) {
            Ok(id) => id,
            Err(FsError::NotFound) => self.create_node(dir, name, InodeKind::File)?,
            Err(err) => return Err(err),
        };
        let inode = self.volume.load_inode(id)?;
        if !inode.is_file() {
            return Err(FsError::IsDirectory);
        }
        self.files.open(id, inode.size)
    }

    /// # Errors
    /// [`FsError::InvalidDescriptor`], or [`FsError::InvalidInput`] for a negative target.
    pub fn seek(&mut self, fd: usize, offset: i64, whence: Whence) -> FsResult<u64> {
        let inode = self.files.get(fd)?.inode;
        let size = self.volume.load_inode(inode)?.size;
        self.files.get_mut(fd)?.size = size;
        self.files.seek(fd, offset, whence)
    }

    /// Reads up to `len` bytes at the descriptor's position and advances it.
    ///
    /// # Errors
    /// [`FsError::InvalidDescriptor`] for a closed descriptor.
    pub fn read(&mut self, fd: usize, len: usize) -> FsResult<Vec<u8>> {
        let handle = self.files.get_mut(fd)?;
        let inode = self.volume.load_inode(handle.inode)?;
        handle.size = inode.size;
        let n = (len as u64).min(inode.size.saturating_sub(handle.position));
        if n == 0 {
            return Ok(Vec::new());
        }

        let block_size = self.volume.block_size();
        let first = handle.position / block_size;
        let last = (handle.position + n - 1) / block_size;
        let data = if first == last {
            if handle.buffered(first).is_none() {
                let start = first * block_size;
                let block_bytes = block_size.min(inode.size - start);
                handle.fill(first, self.volume.read_range(&inode, start, block_bytes)?);
            }
            let within = (handle.position % block_size) as usize;
            let buffered = handle.buffered(first).unwrap_or_default();
            buffered
                .get(within..within + n as usize)
                .ok_or_else(|| FsError::Corrupt("read-ahead buffer is short".into()))?
                .to_vec()
        } else {
            self.volume.read_range(&inode, handle.position, n)?
        };
        handle.position += n;
        Ok(data)
    }

    /// Writes `data` at the descriptor's position and advances it.
    ///
    /// # Errors
    /// [`FsError::InvalidDescriptor`], [`FsError::NoSpace`] or [`FsError::OutOfRange`].
    pub fn write(&mut self, fd: usize, data: &[u8]) -> FsResult<usize> {
        let (inode, position) = {
            let handle = self.files.get(fd)?;
            (handle.inode, handle.position)
        };
        let written = self.volume.write_file(inode, data, position)?;
        self.files.invalidate_inode(inode);
        let handle = self.files.get_mut(fd)?;
        handle.position += written;
        handle.size = handle.size.max(handle.position);
        self.cwd.invalidate();
        Ok(data.len())
    }

    /// # Errors
    /// [`FsError::InvalidDescriptor`] for a closed descriptor.
    pub fn close(&mut self, fd: usize) -> FsResult<()> {
        self.files.close(fd).map(|_| ())
    }

    /// Existing file `name` emptied for rewriting, or a new empty file.
    fn file_for_overwrite(&mut self, name: &str) -> FsResult<u64> {
        let dir = self.cwd.inode();
        match self.volume.lookup(dir, name) {
            Ok(id) => {
                self.volume.truncate_file(id)?;
                self.files.invalidate_inode(id);
                Ok(id)
            }
            Err(FsError::NotFound) => self.create_node(dir, name, InodeKind::File),
            Err(err) => Err(err),
        }
    }

    fn create_node(&mut self, parent: u64, name: &str, kind: InodeKind) -> FsResult<u64> {
        validate_name(name)?;
        match self.volume.lookup(parent, name) {
            Ok(_) => return Err(FsError::AlreadyExists),
            Err(FsError::NotFound) => {}
            Err(err) => return Err(err),
        }

        let id = self.volume.allocate_slot(name, parent)?;
        let mut inode = Inode::new(id, parent, kind, now_secs());
        if kind == InodeKind::Directory {
            self.volume.reserve_blocks(&mut inode, 1)?;
        }
        self.volume.commit_inode(&inode)?;
        if let Err(err) = self.volume.insert_entry(parent, name, id) {
            self.volume.truncate(&mut inode)?;
            self.volume.release_inode(id)?;
            return Err(err);
        }
        self.cwd.invalidate();
        debug!(parent, name, id, ?kind, "created inode");
        Ok(id)
    }

    fn destroy_node(&mut self, parent: u64, name: &str, id: u64) -> FsResult<()> {
        self.volume.remove_entry(parent, name)?;
        let mut inode = self.volume.load_inode(id)?;
        self.volume.truncate(&mut inode)?;
        self.volume.release_inode(id)?;
        self.cwd.invalidate();
        debug!(parent, name, id, "removed inode");
        Ok(())
    }
}
