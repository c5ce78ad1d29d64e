use std::io::{BufRead, Write};

use anyhow::{Context, Result, bail};
use blockfs::{BlockStore, Geometry, ImageStore, VolumeSession};
use tracing::info;

use crate::cli::VolumeArgs;
use crate::shell::confirm;

/// Opens the image named by `args`, creating and sizing it when missing.
pub fn open_store(args: &VolumeArgs) -> Result<ImageStore> {
    let geometry = Geometry::new(args.volume_name.as_str(), args.volume_size, args.block_size);
    let store = ImageStore::open_prealloc(&args.image, geometry)
        .with_context(|| format!("failed to open volume image {}", args.image.display()))?;
    if store.fresh {
        info!(image = %args.image.display(), size = args.volume_size, "created volume image");
    }
    Ok(store)
}

pub fn mount_session<S: BlockStore>(store: S) -> Result<VolumeSession<S>> {
    if !VolumeSession::is_formatted(&store).context("failed to probe volume")? {
        bail!("volume is not formatted; run `blockfs format` first");
    }
    VolumeSession::mount(store).context("failed to mount volume")
}

/// Formats `store` after confirmation unless `yes` is set. Returns `None` when declined.
pub fn format_store<S: BlockStore>(
    store: S,
    yes: bool,
    input: &mut impl BufRead,
    out: &mut impl Write,
) -> Result<Option<VolumeSession<S>>> {
    if !yes && !confirm("format the volume, destroying its contents?", input, out)? {
        writeln!(out, "format cancelled")?;
        return Ok(None);
    }
    let session = VolumeSession::format(store).context("failed to format volume")?;
    writeln!(out, "volume formatted")?;
    Ok(Some(session))
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use blockfs::MemStore;

    use super::*;

    fn store() -> MemStore {
        MemStore::new(Geometry::new("cli", 256 * 512, 512))
    }

    #[test]
    fn mount_requires_format() {
        let err = mount_session(store()).err().expect("unformatted");
        assert!(err.to_string().contains("not formatted"));
    }

    #[test]
    fn format_confirmation() {
        let mut out = Vec::new();
        let declined = format_store(store(), false, &mut Cursor::new("n\n"), &mut out)
            .expect("prompt");
        assert!(declined.is_none());
        assert!(String::from_utf8_lossy(&out).contains("cancelled"));

        let session = format_store(store(), false, &mut Cursor::new("yes\n"), &mut Vec::new())
            .expect("format")
            .expect("accepted");
        assert!(mount_session(session.into_store()).is_ok());

        let forced = format_store(store(), true, &mut Cursor::new(""), &mut Vec::new())
            .expect("format");
        assert!(forced.is_some());
    }

    #[test]
    fn open_store_creates_image() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let args = VolumeArgs {
            image: dir.path().join("vol.img"),
            volume_size: 64 * 512,
            block_size: 512,
            volume_name: "cli".into(),
        };
        let store = open_store(&args).expect("open");
        assert!(store.fresh);
        assert_eq!(store.geometry().block_count, 64);
        drop(store);
        assert_eq!(
            std::fs::metadata(&args.image).expect("image").len(),
            64 * 512
        );
    }
}
