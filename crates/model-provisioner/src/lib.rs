//! Fetching, caching and verifying model artifacts before they are loaded.

pub mod checksum;
pub mod download;
pub mod error;
pub mod provisioner;

pub use download::{DownloadManager, DownloadProgress, ModelFile, ProgressCallback};
pub use error::ProvisioningError;
pub use provisioner::{HttpProvisioner, LocalProvisioner, Provisioner};
