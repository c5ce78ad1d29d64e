//! Block store adapters. The filesystem never touches storage except through [`BlockStore`].

mod image;
mod memory;

pub use image::ImageStore;
pub use memory::MemStore;

use std::time::Instant;

use crate::error::{FsError, FsResult};
use crate::metrics::{self, BlockOp, IoOpType};

/// Fixed shape of a volume.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Geometry {
    pub volume_name: String,
    pub block_size: u64,
    pub block_count: u64,
}

impl Geometry {
    /// Derives the block count from a byte size; a trailing partial block is unused.
    #[must_use]
    pub fn new(volume_name: impl Into<String>, volume_size: u64, block_size: u64) -> Self {
        Self {
            volume_name: volume_name.into(),
            block_size,
            block_count: volume_size.checked_div(block_size).unwrap_or(0),
        }
    }

    #[must_use]
    pub const fn volume_size(&self) -> u64 {
        self.block_size.saturating_mul(self.block_count)
    }
}

/// Block-granular access to a volume.
///
/// Both transfer methods move whole blocks and return how many were moved. Anything
/// short of `count` is reported to the caller as [`FsError::StorageIo`].
pub trait BlockStore {
    fn geometry(&self) -> &Geometry;

    /// Reads `count` blocks starting at `lba` into the front of `buf`.
    fn read_blocks(&self, buf: &mut [u8], count: u64, lba: u64) -> u64;

    /// Writes `count` blocks from the front of `buf` starting at `lba`.
    fn write_blocks(&mut self, buf: &[u8], count: u64, lba: u64) -> u64;
}

impl<S: BlockStore + ?Sized> BlockStore for Box<S> {
    fn geometry(&self) -> &Geometry {
        (**self).geometry()
    }

    fn read_blocks(&self, buf: &mut [u8], count: u64, lba: u64) -> u64 {
        (**self).read_blocks(buf, count, lba)
    }

    fn write_blocks(&mut self, buf: &[u8], count: u64, lba: u64) -> u64 {
        (**self).write_blocks(buf, count, lba)
    }
}

/// Number of whole blocks `buf` spans for this store.
fn blocks_in<S: BlockStore + ?Sized>(store: &S, len: usize) -> u64 {
    (len as u64)
        .checked_div(store.geometry().block_size)
        .unwrap_or(0)
}

/// Fills `buf` (a whole number of blocks) from `lba` onwards.
pub(crate) fn read_exact<S: BlockStore + ?Sized>(
    store: &S,
    buf: &mut [u8],
    lba: u64,
) -> FsResult<()> {
    let count = blocks_in(store, buf.len());
    let started = metrics::is_enabled().then(Instant::now);
    let transferred = store.read_blocks(buf, count, lba);
    finish(IoOpType::Read, lba, count, transferred, started)
}

/// Writes `buf` (a whole number of blocks) from `lba` onwards.
pub(crate) fn write_exact<S: BlockStore + ?Sized>(
    store: &mut S,
    buf: &[u8],
    lba: u64,
) -> FsResult<()> {
    let count = blocks_in(store, buf.len());
    let started = metrics::is_enabled().then(Instant::now);
    let transferred = store.write_blocks(buf, count, lba);
    finish(IoOpType::Write, lba, count, transferred, started)
}

fn finish(
    op: IoOpType,
    lba: u64,
    requested: u64,
    transferred: u64,
    started: Option<Instant>,
) -> FsResult<()> {
    let error = transferred < requested;
    if let Some(started) = started {
        metrics::record_block_op(BlockOp {
            op,
            lba,
            blocks: transferred,
            latency_seconds: started.elapsed().as_secs_f64(),
            error,
        });
    }
    if error {
        tracing::debug!(?op, lba, requested, transferred, "short block transfer");
        return Err(FsError::StorageIo {
            lba,
            requested,
            transferred,
        });
    }
    Ok(())
}

/// Clamps a transfer to the blocks `buf` can hold and the volume still has past `lba`.
/// Returns the byte range inside the volume and the block count, or `None` if nothing moves.
pub(crate) fn transfer_span(
    geometry: &Geometry,
    buf_len: usize,
    count: u64,
    lba: u64,
) -> Option<(usize, usize, u64)> {
    let block_size = geometry.block_size;
    if block_size == 0 || lba >= geometry.block_count {
        return None;
    }
    let fits = (buf_len as u64) / block_size;
    let blocks = count.min(fits).min(geometry.block_count - lba);
    if blocks == 0 {
        return None;
    }
    let start = usize::try_from(lba.checked_mul(block_size)?).ok()?;
    let len = usize::try_from(blocks.checked_mul(block_size)?).ok()?;
    Some((start, len, blocks))
}
