use rand::RngCore;

use crate::session::VolumeSession;
use crate::store::{BlockStore, Geometry, MemStore};
use crate::volume::Volume;

pub(crate) const BLOCK_SIZE: u64 = 512;
pub(crate) const BLOCK_COUNT: u64 = 2048;

pub(crate) fn sized_store(block_size: u64, block_count: u64) -> MemStore {
    MemStore::new(Geometry::new("testvol", block_size * block_count, block_size))
}

pub(crate) fn mem_store() -> MemStore {
    sized_store(BLOCK_SIZE, BLOCK_COUNT)
}

pub(crate) fn formatted() -> Volume<MemStore> {
    Volume::format(mem_store()).expect("format")
}

pub(crate) fn session() -> VolumeSession<MemStore> {
    VolumeSession::format(mem_store()).expect("format")
}

pub(crate) fn payload(len: usize) -> Vec<u8> {
    let mut data = vec![0u8; len];
    rand::rng().fill_bytes(&mut data);
    data
}

/// Store that transfers one block less than asked once armed.
pub(crate) struct FaultyStore {
    pub inner: MemStore,
    pub fail_reads: bool,
    pub fail_writes: bool,
}

impl FaultyStore {
    pub(crate) fn new(inner: MemStore) -> Self {
        Self {
            inner,
            fail_reads: false,
            fail_writes: false,
        }
    }
}

impl BlockStore for FaultyStore {
    fn geometry(&self) -> &Geometry {
        self.inner.geometry()
    }

    fn read_blocks(&self, buf: &mut [u8], count: u64, lba: u64) -> u64 {
        let moved = self.inner.read_blocks(buf, count, lba);
        if self.fail_reads { moved.saturating_sub(1) } else { moved }
    }

    fn write_blocks(&mut self, buf: &[u8], count: u64, lba: u64) -> u64 {
        if self.fail_writes {
            return count.saturating_sub(1);
        }
        self.inner.write_blocks(buf, count, lba)
    }
}
