
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use memmap2::{MmapMut, MmapOptions};

use super::{BlockStore, Geometry, transfer_span};

/// Volume backed by a memory-mapped host image file.
pub struct ImageStore {
    path: PathBuf,
    _file: File,
    map: MmapMut,
    geometry: Geometry,
    /// True when the image file did not exist or was empty before opening.
    pub fresh: bool,
}

impl ImageStore {
    /// Opens (creating if needed) an image sized to `geometry` and maps it.
    ///
    /// An existing larger image keeps its length; only the leading volume is mapped.
    ///
    /// # Errors
    /// Returns an error if the geometry is empty or the image cannot be created, sized or mapped.
    pub fn open_prealloc(path: impl AsRef<Path>, geometry: Geometry) -> anyhow::Result<Self> {
        let path = path.as_ref().to_path_buf();
        if geometry.block_size == 0 || geometry.block_count == 0 {
            bail!(
                "volume geometry {}x{} is empty",
                geometry.block_count,
                geometry.block_size
            );
        }
        let len = geometry.volume_size();

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .with_context(|| format!("failed to open image {}", path.display()))?;

        let prev_len = file.metadata().map(|m| m.len()).unwrap_or(0);
        if prev_len < len {
            file.set_len(len)
                .with_context(|| format!("failed to size image {} to {len}", path.display()))?;
        }

        let map_len = usize::try_from(len)
            .map_err(|_| anyhow::anyhow!("volume length {len} exceeds addressable size"))?;
        let map = unsafe { MmapOptions::new().len(map_len).map_mut(&file)? };

        Ok(Self {
            path,
            _file: file,
            map,
            geometry,
            fresh: prev_len == 0,
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Pushes dirty pages to the image file.
    ///
    /// # Errors
    /// Returns an error if the kernel rejects the flush.
    pub fn flush(&self) -> anyhow::Result<()> {
        self.map
            .flush()
            .with_context(|| format!("failed to flush image {}", self.path.display()))
    }
}

impl BlockStore for ImageStore {
    fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    fn read_blocks(&self, buf: &mut [u8], count: u64, lba: u64) -> u64 {
        let Some((start, len, blocks)) = transfer_span(&self.geometry, buf.len(), count, lba)
        else {
            return 0;
        };
        buf[..len].copy_from_slice(&self.map[start..start + len]);
        blocks
    }

    fn write_blocks(&mut self, buf: &[u8], count: u64, lba: u64) -> u64 {
        let Some((start, len, blocks)) = transfer_span(&self.geometry, buf.len(), count, lba)
        else {
            return 0;
        };
        self.map[start..start + len].copy_from_slice(&buf[..len]);
        // Pages reach the image on drop or explicit flush, not per write.
        blocks
    }
}

impl Drop for ImageStore {
    fn drop(&mut self) {
        if let Err(err) = self.map.flush() {
            tracing::warn!(path = %self.path.display(), %err, "image flush on close failed");
        }
    }
}
