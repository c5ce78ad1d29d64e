use super::{read_u64, write_u64};
use crate::constants::{DIR_ENTRY_SIZE, FREE_ENTRY, MAX_NAME_LEN, POINTER_SIZE};
use crate::error::{FsError, FsResult};

/// Name-to-inode binding stored inside a directory's data blocks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub inode: u64,
    pub name: String,
}

impl DirEntry {
    #[must_use]
    pub fn new(name: impl Into<String>, inode: u64) -> Self {
        Self {
            inode,
            name: name.into(),
        }
    }

    #[must_use]
    pub const fn is_free(&self) -> bool {
        self.inode == FREE_ENTRY
    }

    /// Decodes one entry; the name ends at the first NUL.
    #[must_use]
    pub fn from_bytes(buf: &[u8; DIR_ENTRY_SIZE]) -> Self {
        let name_bytes = &buf[POINTER_SIZE..];
        let len = name_bytes
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(name_bytes.len());
        Self {
            inode: read_u64(buf, 0),
            name: String::from_utf8_lossy(&name_bytes[..len]).into_owned(),
        }
    }

    /// Encodes the entry, NUL-padding the name. Names longer than the field are cut.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; DIR_ENTRY_SIZE] {
        let mut buf = [0u8; DIR_ENTRY_SIZE];
        write_u64(&mut buf, 0, self.inode);
        let name = self.name.as_bytes();
        let len = name.len().min(MAX_NAME_LEN);
        buf[POINTER_SIZE..POINTER_SIZE + len].copy_from_slice(&name[..len]);
        buf
    }
}

/// Accepts 1..=127 byte names without `/` or NUL that are not `.` or `..`.
///
/// # Errors
/// [`FsError::InvalidName`] otherwise.
pub fn validate_name(name: &str) -> FsResult<()> {
    if name.is_empty()
        || name.len() > MAX_NAME_LEN
        || name == "."
        || name == ".."
        || name.bytes().any(|b| b == b'/' || b == 0)
    {
        return Err(FsError::InvalidName);
    }
    Ok(())
}
