use super::{BlockStore, Geometry, transfer_span};

/// Volume held entirely in memory.
#[derive(Debug, Clone)]
pub struct MemStore {
    geometry: Geometry,
    bytes: Vec<u8>,
}

impl MemStore {
    #[must_use]
    pub fn new(geometry: Geometry) -> Self {
        let len = usize::try_from(geometry.volume_size()).unwrap_or(0);
        Self {
            geometry,
            bytes: vec![0u8; len],
        }
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.bytes
    }
}

impl BlockStore for MemStore {
    fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    fn read_blocks(&self, buf: &mut [u8], count: u64, lba: u64) -> u64 {
        let Some((start, len, blocks)) = transfer_span(&self.geometry, buf.len(), count, lba)
        else {
            return 0;
        };
        let Some(src) = self.bytes.get(start..start + len) else {
            return 0;
        };
        buf[..len].copy_from_slice(src);
        blocks
    }

    fn write_blocks(&mut self, buf: &[u8], count: u64, lba: u64) -> u64 {
        let Some((start, len, blocks)) = transfer_span(&self.geometry, buf.len(), count, lba)
        else {
            return 0;
        };
        let Some(dst) = self.bytes.get_mut(start..start + len) else {
            return 0;
        };
        dst.copy_from_slice(&buf[..len]);
        blocks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_whole_blocks() {
        let mut store = MemStore::new(Geometry::new("mem", 4 * 256, 256));
        let data = vec![0x5Au8; 512];
        assert_eq!(store.write_blocks(&data, 2, 1), 2);

        let mut back = vec![0u8; 512];
        assert_eq!(store.read_blocks(&mut back, 2, 1), 2);
        assert_eq!(back, data);
        assert!(store.as_bytes()[..256].iter().all(|&b| b == 0));
    }

    #[test]
    fn transfers_past_the_end_are_short() {
        let mut store = MemStore::new(Geometry::new("mem", 4 * 256, 256));
        let data = vec![1u8; 3 * 256];
        assert_eq!(store.write_blocks(&data, 3, 2), 2);

        let mut back = vec![0u8; 256];
        assert_eq!(store.read_blocks(&mut back, 1, 4), 0);
    }
}
