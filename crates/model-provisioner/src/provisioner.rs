use crate::download::{DownloadManager, ModelFile, ProgressCallback};
use crate::error::ProvisioningError;
use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;
use tokio::fs;
use tracing::debug;

/// Makes model artifacts available on local disk.
#[async_trait]
pub trait Provisioner: Send + Sync {
    /// Resolve `files` to local paths, in the order given.
    async fn provision(
        &self,
        files: &[ModelFile],
        progress: Option<ProgressCallback>,
    ) -> Result<Vec<PathBuf>, ProvisioningError>;
}

/// Downloads artifacts over HTTP(S), reusing verified local copies.
pub struct HttpProvisioner {
    client: reqwest::Client,
    max_retries: u32,
    retry_backoff: Duration,
}

impl HttpProvisioner {
    pub fn new(max_retries: u32) -> Result<Self, ProvisioningError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .build()
            .map_err(ProvisioningError::Client)?;
        Ok(Self::with_client(client, max_retries))
    }

    pub fn with_client(client: reqwest::Client, max_retries: u32) -> Self {
        Self {
            client,
            max_retries,
            retry_backoff: Duration::from_millis(500),
        }
    }

    pub fn with_retry_backoff(mut self, retry_backoff: Duration) -> Self {
        self.retry_backoff = retry_backoff;
        self
    }
}

#[async_trait]
impl Provisioner for HttpProvisioner {
    async fn provision(
        &self,
        files: &[ModelFile],
        progress: Option<ProgressCallback>,
    ) -> Result<Vec<PathBuf>, ProvisioningError> {
        let mut manager = DownloadManager::new(self.client.clone())
            .with_retries(self.max_retries, self.retry_backoff);
        for file in files {
            manager.add(file.clone());
        }
        if let Some(progress) = progress {
            manager.on_progress(progress);
        }
        manager.download().await
    }
}

/// Offline provisioning: artifacts must already sit in their local folders.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalProvisioner;

#[async_trait]
impl Provisioner for LocalProvisioner {
    async fn provision(
        &self,
        files: &[ModelFile],
        _progress: Option<ProgressCallback>,
    ) -> Result<Vec<PathBuf>, ProvisioningError> {
        let mut paths = Vec::with_capacity(files.len());
        for file in files {
            let path = file.local_path()?;
            if !fs::try_exists(&path).await.unwrap_or(false) {
                return Err(ProvisioningError::Missing { path });
            }
            file.verify(&path).await?;
            debug!("resolved local model artifact: {}", path.display());
            paths.push(path);
        }
        Ok(paths)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum::calculate_checksum;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_local_provisioner_resolves_existing_files() {
        let temp_dir = TempDir::new().unwrap();
        tokio::fs::write(temp_dir.path().join("ocr.onnx"), b"weights")
            .await
            .unwrap();

        let files = vec![ModelFile::new("https://models.local/ocr.onnx", temp_dir.path())
            .with_sha256(calculate_checksum(b"weights"))];

        let paths = LocalProvisioner.provision(&files, None).await.unwrap();
        assert_eq!(paths, vec![temp_dir.path().join("ocr.onnx")]);
    }

    #[tokio::test]
    async fn test_local_provisioner_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let files = vec![ModelFile::new("https://models.local/ocr.onnx", temp_dir.path())];

        let err = LocalProvisioner.provision(&files, None).await.unwrap_err();
        assert!(matches!(err, ProvisioningError::Missing { .. }));
    }

    #[tokio::test]
    async fn test_local_provisioner_rejects_bad_checksum() {
        let temp_dir = TempDir::new().unwrap();
        tokio::fs::write(temp_dir.path().join("ocr.onnx"), b"tampered")
            .await
            .unwrap();
        let files = vec![ModelFile::new("https://models.local/ocr.onnx", temp_dir.path())
            .with_sha256(calculate_checksum(b"weights"))];

        let err = LocalProvisioner.provision(&files, None).await.unwrap_err();
        assert!(matches!(err, ProvisioningError::ChecksumMismatch { .. }));
    }
}
