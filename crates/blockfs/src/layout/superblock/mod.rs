#[cfg(test)]
mod superblock_tests;

use tracing::debug;

use super::{read_u64, write_u64};
use crate::constants::{
    BLOCKS_PER_INODE, INODE_SIZE, INODE_START_LBA, MIN_BLOCK_SIZE, NUM_DIRECT, NUM_INDIRECT,
    POINTER_SIZE, SUPER_SIGNATURE, SUPER_SIGNATURE_END, SUPERBLOCK_SIZE, SUPERBLOCK_WORDS,
};
use crate::error::{FsError, FsResult};
use crate::store::Geometry;

/// Volume layout and allocation counters.
///
/// On-disk format: a run of little-endian u64 words.
///
/// - signature ([`SUPER_SIGNATURE`])
/// - inode region start block
/// - total inode count
/// - inodes in use
/// - bitmap region start block
/// - free data blocks
/// - used data blocks
/// - total data blocks
/// - indirection capacity per level, `NUM_INDIRECT` words
/// - data region start block
/// - signature ([`SUPER_SIGNATURE_END`])
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Superblock {
    pub inode_start: u64,
    pub num_inodes: u64,
    pub used_inodes: u64,
    pub bitmap_start: u64,
    pub free_blocks: u64,
    pub used_blocks: u64,
    pub total_data_blocks: u64,
    pub level_capacity: [u64; NUM_INDIRECT],
    pub data_start: u64,
}

impl Superblock {
    /// Computes the layout a fresh format of `geometry` produces, with no blocks or
    /// inodes accounted as used yet.
    ///
    /// # Errors
    /// [`FsError::InvalidGeometry`] when the block size is unsupported or the volume
    /// cannot hold an inode table, a bitmap and at least one data block.
    pub fn plan(geometry: &Geometry) -> FsResult<Self> {
        let block_size = geometry.block_size;
        if block_size < MIN_BLOCK_SIZE || block_size % POINTER_SIZE as u64 != 0 {
            return Err(FsError::InvalidGeometry(format!(
                "block size {block_size} must be a multiple of {POINTER_SIZE} and at least {MIN_BLOCK_SIZE}"
            )));
        }

        let num_inodes = prime_at_most(geometry.block_count / BLOCKS_PER_INODE);
        if num_inodes < 2 {
            return Err(FsError::InvalidGeometry(format!(
                "{} blocks leave no room for an inode table",
                geometry.block_count
            )));
        }

        let inode_blocks = (num_inodes * INODE_SIZE as u64).div_ceil(block_size);
        let bitmap_start = INODE_START_LBA + inode_blocks;
        let remaining = geometry
            .block_count
            .checked_sub(bitmap_start)
            .ok_or_else(|| FsError::InvalidGeometry("inode table overruns the volume".into()))?;
        let (bitmap_blocks, data_blocks) = compute_bitmap_blocks(remaining, block_size)?;

        let pointers_per_block = block_size / POINTER_SIZE as u64;
        let mut level_capacity = [0u64; NUM_INDIRECT];
        let mut capacity = 1u64;
        for slot in &mut level_capacity {
            capacity = capacity.saturating_mul(pointers_per_block);
            *slot = capacity;
        }

        let superblock = Self {
            inode_start: INODE_START_LBA,
            num_inodes,
            used_inodes: 0,
            bitmap_start,
            free_blocks: data_blocks,
            used_blocks: 0,
            total_data_blocks: data_blocks,
            level_capacity,
            data_start: bitmap_start + bitmap_blocks,
        };
        debug!(
            num_inodes,
            inode_blocks,
            bitmap_blocks,
            data_blocks,
            data_start = superblock.data_start,
            "planned volume layout"
        );
        Ok(superblock)
    }

    /// Decodes a superblock record; `None` unless both signatures match.
    #[must_use]
    pub fn from_bytes(buf: &[u8]) -> Option<Self> {
        if buf.len() < SUPERBLOCK_SIZE {
            return None;
        }
        let word = |i: usize| read_u64(buf, i * POINTER_SIZE);
        if word(0) != SUPER_SIGNATURE || word(SUPERBLOCK_WORDS - 1) != SUPER_SIGNATURE_END {
            return None;
        }
        let mut level_capacity = [0u64; NUM_INDIRECT];
        for (level, slot) in level_capacity.iter_mut().enumerate() {
            *slot = word(8 + level);
        }
        Some(Self {
            inode_start: word(1),
            num_inodes: word(2),
            used_inodes: word(3),
            bitmap_start: word(4),
            free_blocks: word(5),
            used_blocks: word(6),
            total_data_blocks: word(7),
            level_capacity,
            data_start: word(8 + NUM_INDIRECT),
        })
    }

    /// Encodes the record into the front of `buf`, which must hold [`SUPERBLOCK_SIZE`] bytes.
    pub fn write_bytes(&self, buf: &mut [u8]) {
        let mut words = [0u64; SUPERBLOCK_WORDS];
        words[0] = SUPER_SIGNATURE;
        words[1] = self.inode_start;
        words[2] = self.num_inodes;
        words[3] = self.used_inodes;
        words[4] = self.bitmap_start;
        words[5] = self.free_blocks;
        words[6] = self.used_blocks;
        words[7] = self.total_data_blocks;
        words[8..8 + NUM_INDIRECT].copy_from_slice(&self.level_capacity);
        words[8 + NUM_INDIRECT] = self.data_start;
        words[SUPERBLOCK_WORDS - 1] = SUPER_SIGNATURE_END;
        for (i, value) in words.into_iter().enumerate() {
            write_u64(buf, i * POINTER_SIZE, value);
        }
    }

    #[must_use]
    pub const fn inode_blocks(&self) -> u64 {
        self.bitmap_start - self.inode_start
    }

    #[must_use]
    pub const fn bitmap_blocks(&self) -> u64 {
        self.data_start - self.bitmap_start
    }

    #[must_use]
    pub const fn pointers_per_block(&self) -> u64 {
        self.level_capacity[0]
    }

    /// Content blocks a single inode can map.
    #[must_use]
    pub fn max_file_blocks(&self) -> u64 {
        self.level_capacity
            .iter()
            .fold(NUM_DIRECT as u64, |acc, &cap| acc.saturating_add(cap))
    }

    /// Checks that a decoded superblock describes a layout `geometry` can hold.
    ///
    /// # Errors
    /// [`FsError::Corrupt`] naming the first contradiction found.
    pub fn validate(&self, geometry: &Geometry) -> FsResult<()> {
        let corrupt = |detail: &str| Err(FsError::Corrupt(detail.to_string()));
        let block_size = geometry.block_size;

        if self.inode_start != INODE_START_LBA {
            return corrupt("inode region does not follow the superblock mirror");
        }
        if !(self.inode_start < self.bitmap_start && self.bitmap_start < self.data_start) {
            return corrupt("regions are out of order");
        }
        if self.num_inodes == 0
            || self.num_inodes.saturating_mul(INODE_SIZE as u64)
                > self.inode_blocks().saturating_mul(block_size)
        {
            return corrupt("inode count does not fit the inode region");
        }
        if self.total_data_blocks == 0
            || self.data_start.saturating_add(self.total_data_blocks) > geometry.block_count
        {
            return corrupt("data region extends past the volume");
        }
        if self.total_data_blocks > self.bitmap_blocks().saturating_mul(block_size * 8) {
            return corrupt("bitmap region is too small for the data region");
        }
        if self.used_inodes > self.num_inodes {
            return corrupt("more inodes in use than exist");
        }
        let mut expected = 1u64;
        for &cap in &self.level_capacity {
            expected = expected.saturating_mul(block_size / POINTER_SIZE as u64);
            if cap != expected {
                return corrupt("indirection capacity does not match the block size");
            }
        }
        Ok(())
    }
}

/// Largest prime not above `n`, or 0 when there is none.
#[must_use]
pub fn prime_at_most(n: u64) -> u64 {
    (2..=n).rev().find(|&candidate| is_prime(candidate)).unwrap_or(0)
}

fn is_prime(n: u64) -> bool {
    if n < 2 {
        return false;
    }
    if n < 4 {
        return true;
    }
    if n % 2 == 0 || n % 3 == 0 {
        return false;
    }
    let mut i = 5u64;
    while i.saturating_mul(i) <= n {
        if n % i == 0 || n % (i + 2) == 0 {
            return false;
        }
        i += 6;
    }
    true
}

/// Splits `remaining` blocks into the smallest bitmap that covers the data blocks left over.
fn compute_bitmap_blocks(remaining: u64, block_size: u64) -> FsResult<(u64, u64)> {
    let bits_per_block = block_size * 8;
    let mut bitmap_blocks = 1u64;
    while remaining > bitmap_blocks
        && (remaining - bitmap_blocks).div_ceil(bits_per_block) > bitmap_blocks
    {
        bitmap_blocks += 1;
    }
    if remaining <= bitmap_blocks {
        return Err(FsError::InvalidGeometry(
            "not enough space left for data blocks".into(),
        ));
    }
    Ok((bitmap_blocks, remaining - bitmap_blocks))
}
