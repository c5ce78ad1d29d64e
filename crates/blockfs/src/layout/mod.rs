//! Fixed-size on-disk records and their little-endian codecs.

pub mod bits;
pub mod dirent;
pub mod inode;
pub mod superblock;

pub use bits::BitVector;
pub use dirent::{DirEntry, validate_name};
pub use inode::{Inode, InodeKind};
pub use superblock::Superblock;

/// Reads the little-endian u64 at `offset`.
pub(crate) fn read_u64(buf: &[u8], offset: usize) -> u64 {
    let mut word = [0u8; 8];
    word.copy_from_slice(&buf[offset..offset + 8]);
    u64::from_le_bytes(word)
}

pub(crate) fn write_u64(buf: &mut [u8], offset: usize, value: u64) {
    buf[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
}

pub(crate) fn read_u32(buf: &[u8], offset: usize) -> u32 {
    let mut word = [0u8; 4];
    word.copy_from_slice(&buf[offset..offset + 4]);
    u32::from_le_bytes(word)
}

pub(crate) fn write_u32(buf: &mut [u8], offset: usize, value: u32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}
