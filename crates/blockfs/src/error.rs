use std::fmt;

/// Failure of a filesystem operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FsError {
    AlreadyExists,
    Corrupt(String),
    HostIo(String),
    InvalidDescriptor(usize),
    InvalidGeometry(String),
    InvalidId(u64),
    InvalidInput,
    InvalidName,
    IsDirectory,
    NoSpace,
    NotDirectory,
    NotEmpty,
    NotFormatted,
    NotFound,
    OutOfRange(u64),
    StorageIo {
        lba: u64,
        requested: u64,
        transferred: u64,
    },
    TableFull,
    TooManyOpenFiles,
}

pub type FsResult<T> = Result<T, FsError>;

impl fmt::Display for FsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyExists => f.write_str("already exists"),
            Self::Corrupt(detail) => write!(f, "filesystem is corrupt: {detail}"),
            Self::HostIo(detail) => write!(f, "host file error: {detail}"),
            Self::InvalidDescriptor(fd) => write!(f, "invalid file descriptor {fd}"),
            Self::InvalidGeometry(detail) => write!(f, "invalid volume geometry: {detail}"),
            Self::InvalidId(id) => write!(f, "inode id {id} is outside the inode table"),
            Self::InvalidInput => f.write_str("invalid input"),
            Self::InvalidName => f.write_str("invalid name"),
            Self::IsDirectory => f.write_str("is a directory"),
            Self::NoSpace => f.write_str("no free data blocks"),
            Self::NotDirectory => f.write_str("not a directory"),
            Self::NotEmpty => f.write_str("directory not empty"),
            Self::NotFormatted => f.write_str("volume is not formatted"),
            Self::NotFound => f.write_str("not found"),
            Self::OutOfRange(index) => {
                write!(f, "logical block {index} exceeds the addressable file size")
            }
            Self::StorageIo {
                lba,
                requested,
                transferred,
            } => write!(
                f,
                "block transfer at lba {lba} moved {transferred} of {requested} blocks"
            ),
            Self::TableFull => f.write_str("inode table is full"),
            Self::TooManyOpenFiles => f.write_str("no free file descriptors"),
        }
    }
}

impl std::error::Error for FsError {}
