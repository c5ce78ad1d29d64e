use crate::error::{FsError, FsResult};

/// Reference point of a seek.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Whence {
    /// From the current position.
    Cur,
    /// From the start of the file.
    Abs,
    /// From the end of the file.
    End,
}

/// One open descriptor. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenFile {
    pub inode: u64,
    pub position: u64,
    pub size: u64,
    read_ahead: Option<(u64, Vec<u8>)>,
}

impl OpenFile {
    const fn new(inode: u64, size: u64) -> Self {
        Self {
            inode,
            position: 0,
            size,
            read_ahead: None,
        }
    }

    /// Bytes of logical block `index` if they are buffered.
    pub(crate) fn buffered(&self, index: u64) -> Option<&[u8]> {
        match &self.read_ahead {
            Some((buffered, bytes)) if *buffered == index => Some(bytes),
            _ => None,
        }
    }

    pub(crate) fn fill(&mut self, index: u64, bytes: Vec<u8>) {
        self.read_ahead = Some((index, bytes));
    }

    pub(crate) fn drop_buffer(&mut self) {
        self.read_ahead = None;
    }
}

/// Fixed pool of descriptors; a descriptor is its slot index.
#[derive(Debug, Clone)]
pub struct OpenFileTable {
    slots: Vec<Option<OpenFile>>,
}

impl OpenFileTable {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: vec![None; capacity],
        }
    }

    #[must_use]
    pub fn is_full(&self) -> bool {
        self.slots.iter().all(Option::is_some)
    }

    #[must_use]
    pub fn open_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    /// # Errors
    /// [`FsError::TooManyOpenFiles`] when every slot is taken.
    pub fn open(&mut self, inode: u64, size: u64) -> FsResult<usize> {
        let fd = self
            .slots
            .iter()
            .position(Option::is_none)
            .ok_or(FsError::TooManyOpenFiles)?;
        self.slots[fd] = Some(OpenFile::new(inode, size));
        Ok(fd)
    }

    /// # Errors
    /// [`FsError::InvalidDescriptor`] for an unknown or closed descriptor.
    pub fn get(&self, fd: usize) -> FsResult<&OpenFile> {
        self.slots
            .get(fd)
            .and_then(Option::as_ref)
            .ok_or(FsError::InvalidDescriptor(fd))
    }

    /// # Errors
    /// [`FsError::InvalidDescriptor`] for an unknown or closed descriptor.
    pub fn get_mut(&mut self, fd: usize) -> FsResult<&mut OpenFile> {
        self.slots
            .get_mut(fd)
            .and_then(Option::as_mut)
            .ok_or(FsError::InvalidDescriptor(fd))
    }

    /// # Errors
    /// [`FsError::InvalidDescriptor`] for an unknown or closed descriptor.
    pub fn close(&mut self, fd: usize) -> FsResult<OpenFile> {
        self.slots
            .get_mut(fd)
            .and_then(Option::take)
            .ok_or(FsError::InvalidDescriptor(fd))
    }

    /// Moves the position of `fd` and returns it.
    ///
    /// # Errors
    /// [`FsError::InvalidInput`] when the target lies before the start of the file.
    pub fn seek(&mut self, fd: usize, offset: i64, whence: Whence) -> FsResult<u64> {
        let file = self.get_mut(fd)?;
        let base = match whence {
            Whence::Cur => file.position,
            Whence::Abs => 0,
            Whence::End => file.size,
        };
        let target = i128::from(base) + i128::from(offset);
        file.position = u64::try_from(target).map_err(|_| FsError::InvalidInput)?;
        Ok(file.position)
    }

    /// Closes every descriptor on `inode`; returns how many there were.
    pub fn close_inode(&mut self, inode: u64) -> usize {
        let mut closed = 0;
        for slot in &mut self.slots {
            if slot.as_ref().is_some_and(|file| file.inode == inode) {
                *slot = None;
                closed += 1;
            }
        }
        closed
    }

    /// Drops read-ahead buffers of every descriptor on `inode`.
    pub fn invalidate_inode(&mut self, inode: u64) {
        for file in self.slots.iter_mut().flatten() {
            if file.inode == inode {
                file.drop_buffer();
            }
        }
    }

    pub fn clear(&mut self) {
        self.slots.iter_mut().for_each(|slot| *slot = None);
    }
}
