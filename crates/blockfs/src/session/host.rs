use std::path::Path;

use tracing::info;

use super::VolumeSession;
use crate::error::{FsError, FsResult};
use crate::store::BlockStore;
use crate::transfer::TransferReport;

fn host_error(path: &Path, err: &std::io::Error) -> FsError {
    FsError::HostIo(format!("{}: {err}", path.display()))
}

impl<S: BlockStore> VolumeSession<S> {
    /// Copies host file `host` into the working directory as `name`, replacing an
    /// existing file of that name.
    ///
    /// # Errors
    /// [`FsError::HostIo`] when the host file cannot be read; otherwise as
    /// [`VolumeSession::copy_file`].
    pub fn import_from_host(&mut self, host: &Path, name: &str) -> FsResult<TransferReport> {
        let data = std::fs::read(host).map_err(|err| host_error(host, &err))?;
        let id = self.file_for_overwrite(name)?;
        self.volume.write_file(id, &data, 0)?;
        self.cwd.invalidate();

        let report = TransferReport::of(&data);
        info!(
            host = %host.display(),
            name,
            bytes = report.bytes,
            sha256 = %report.checksum_hex(),
            "imported file"
        );
        Ok(report)
    }

    /// Writes file `name` from the working directory out to host path `host`.
    ///
    /// # Errors
    /// [`FsError::HostIo`] when the host file cannot be written; otherwise as
    /// [`VolumeSession::read_file`].
    pub fn export_to_host(&self, name: &str, host: &Path) -> FsResult<TransferReport> {
        let data = self.read_file(name)?;
        std::fs::write(host, &data).map_err(|err| host_error(host, &err))?;

        let report = TransferReport::of(&data);
        info!(
            host = %host.display(),
            name,
            bytes = report.bytes,
            sha256 = %report.checksum_hex(),
            "exported file"
        );
        Ok(report)
    }
}
