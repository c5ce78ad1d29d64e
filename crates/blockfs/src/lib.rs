//! Block-based filesystem engine laid out directly on a fixed-size volume.
#![allow(clippy::cargo_common_metadata)]

pub mod constants;
pub mod error;
pub mod layout;
pub mod metrics;
pub mod session;
pub mod store;
pub mod transfer;
pub mod volume;

#[cfg(test)]
pub(crate) mod test_utils;

pub use error::{FsError, FsResult};
pub use session::{Listing, VolumeInfo, VolumeSession, Whence};
pub use store::{BlockStore, Geometry, ImageStore, MemStore};
pub use transfer::TransferReport;
pub use volume::Volume;
