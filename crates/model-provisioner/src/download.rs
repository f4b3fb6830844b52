use crate::checksum::{checksums_match, file_checksum};
use crate::error::ProvisioningError;
use reqwest::Url;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

/// Progress of a single artifact download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadProgress {
    pub url: String,
    pub bytes_received: u64,
    /// Content length reported by the server, when it sent one
    pub total_bytes: Option<u64>,
}

/// Invoked zero or more times while artifacts are being fetched.
pub type ProgressCallback = Arc<dyn Fn(DownloadProgress) + Send + Sync>;

/// One remote artifact and where it lives on local disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelFile {
    pub url: String,
    pub local_folder: PathBuf,
    /// Expected SHA-256 as hex; `None` skips verification
    pub sha256: Option<String>,
}

impl ModelFile {
    pub fn new(url: impl Into<String>, local_folder: impl Into<PathBuf>) -> Self {
        Self {
            url: url.into(),
            local_folder: local_folder.into(),
            sha256: None,
        }
    }

    pub fn with_sha256(mut self, sha256: impl Into<String>) -> Self {
        self.sha256 = Some(sha256.into());
        self
    }

    /// Last path segment of the URL, used as the local file name.
    pub fn file_name(&self) -> Result<String, ProvisioningError> {
        let url = Url::parse(&self.url).map_err(|e| ProvisioningError::InvalidUrl {
            url: self.url.clone(),
            reason: e.to_string(),
        })?;

        url.path_segments()
            .and_then(|mut segments| segments.next_back())
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .ok_or_else(|| ProvisioningError::InvalidUrl {
                url: self.url.clone(),
                reason: "url has no file name".to_string(),
            })
    }

    pub fn local_path(&self) -> Result<PathBuf, ProvisioningError> {
        Ok(self.local_folder.join(self.file_name()?))
    }

    /// Verify an existing local copy against the expected checksum.
    pub(crate) async fn verify(&self, path: &Path) -> Result<(), ProvisioningError> {
        let Some(expected) = self.sha256.as_deref() else {
            return Ok(());
        };

        let actual = file_checksum(path)
            .await
            .map_err(|e| ProvisioningError::io(path, e))?;

        if checksums_match(expected, &actual) {
            Ok(())
        } else {
            Err(ProvisioningError::ChecksumMismatch {
                path: path.to_path_buf(),
                expected: expected.to_string(),
                actual,
            })
        }
    }
}

/// Downloads a list of registered artifacts into their local folders.
///
/// Files already present with a matching checksum are reused. Downloads are
/// streamed to a `.part` file, hashed on the fly and only renamed into place
/// once verified.
pub struct DownloadManager {
    client: reqwest::Client,
    files: Vec<ModelFile>,
    max_retries: u32,
    retry_backoff: Duration,
    progress: Option<ProgressCallback>,
}

impl DownloadManager {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            files: Vec::new(),
            max_retries: 2,
            retry_backoff: Duration::from_millis(500),
            progress: None,
        }
    }

    pub fn with_retries(mut self, max_retries: u32, retry_backoff: Duration) -> Self {
        self.max_retries = max_retries;
        self.retry_backoff = retry_backoff;
        self
    }

    /// Register a file; results are returned in registration order.
    pub fn add_file(
        &mut self,
        url: impl Into<String>,
        local_folder: impl Into<PathBuf>,
        sha256: Option<String>,
    ) {
        self.files.push(ModelFile {
            url: url.into(),
            local_folder: local_folder.into(),
            sha256,
        });
    }

    pub fn add(&mut self, file: ModelFile) {
        self.files.push(file);
    }

    pub fn on_progress(&mut self, callback: ProgressCallback) {
        self.progress = Some(callback);
    }

    pub fn files(&self) -> &[ModelFile] {
        &self.files
    }

    /// Fetch every registered file, returning local paths in registration order.
    pub async fn download(&self) -> Result<Vec<PathBuf>, ProvisioningError> {
        let mut paths = Vec::with_capacity(self.files.len());
        for file in &self.files {
            paths.push(self.fetch_file(file).await?);
        }
        Ok(paths)
    }

    async fn fetch_file(&self, file: &ModelFile) -> Result<PathBuf, ProvisioningError> {
        let path = file.local_path()?;

        if fs::try_exists(&path).await.unwrap_or(false) {
            match file.verify(&path).await {
                Ok(()) => {
                    debug!("using cached model artifact: {}", path.display());
                    return Ok(path);
                }
                Err(e) => {
                    warn!("cached model artifact rejected, downloading again: {}", e);
                }
            }
        }

        fs::create_dir_all(&file.local_folder)
            .await
            .map_err(|e| ProvisioningError::io(&file.local_folder, e))?;

        let mut attempt = 0;
        loop {
            match self.fetch_once(file, &path).await {
                Ok(()) => break,
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    attempt += 1;
                    warn!(
                        "download of {} failed (attempt {}/{}): {}",
                        file.url,
                        attempt,
                        self.max_retries + 1,
                        e
                    );
                    tokio::time::sleep(self.retry_backoff * attempt).await;
                }
                Err(e) => return Err(e),
            }
        }

        info!("downloaded model artifact: {}", path.display());
        Ok(path)
    }

    async fn fetch_once(&self, file: &ModelFile, path: &Path) -> Result<(), ProvisioningError> {
        let http_error = |source| ProvisioningError::Http {
            url: file.url.clone(),
            source,
        };

        let mut response = self
            .client
            .get(&file.url)
            .send()
            .await
            .map_err(http_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProvisioningError::Status {
                url: file.url.clone(),
                status: status.as_u16(),
            });
        }

        let total_bytes = response.content_length();
        let part_path = path.with_file_name(format!("{}.part", file.file_name()?));
        let mut out = fs::File::create(&part_path)
            .await
            .map_err(|e| ProvisioningError::io(&part_path, e))?;

        let mut hasher = Sha256::new();
        let mut bytes_received = 0u64;

        while let Some(chunk) = response.chunk().await.map_err(http_error)? {
            out.write_all(&chunk)
                .await
                .map_err(|e| ProvisioningError::io(&part_path, e))?;
            hasher.update(&chunk);
            bytes_received += chunk.len() as u64;
            telemetry::metrics::MODEL_DOWNLOAD_BYTES.inc_by(chunk.len() as u64);

            if let Some(progress) = &self.progress {
                progress(DownloadProgress {
                    url: file.url.clone(),
                    bytes_received,
                    total_bytes,
                });
            }
        }

        out.sync_all()
            .await
            .map_err(|e| ProvisioningError::io(&part_path, e))?;
        drop(out);

        let actual = format!("{:x}", hasher.finalize());
        if let Some(expected) = file.sha256.as_deref() {
            if !checksums_match(expected, &actual) {
                if let Err(e) = fs::remove_file(&part_path).await {
                    warn!("failed to remove {}: {}", part_path.display(), e);
                }
                return Err(ProvisioningError::ChecksumMismatch {
                    path: path.to_path_buf(),
                    expected: expected.to_string(),
                    actual,
                });
            }
        }

        fs::rename(&part_path, path)
            .await
            .map_err(|e| ProvisioningError::io(path, e))?;

        debug!(
            "fetched {} ({} bytes, sha256 {})",
            file.url, bytes_received, actual
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum::calculate_checksum;
    use axum::{http::StatusCode, response::IntoResponse, routing::get, Router};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tempfile::TempDir;

    const WEIGHTS: &[u8] = b"pretend these are network weights";

    async fn spawn_server(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn counting_route(hits: Arc<AtomicUsize>) -> Router {
        Router::new().route(
            "/models/detector.onnx",
            get(move || {
                let hits = hits.clone();
                async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    WEIGHTS
                }
            }),
        )
    }

    fn test_client() -> reqwest::Client {
        reqwest::Client::builder().no_proxy().build().unwrap()
    }

    #[test]
    fn test_model_file_name_from_url() {
        let file = ModelFile::new("https://models.local/a/b/detector.onnx?raw=1", "models");
        assert_eq!(file.file_name().unwrap(), "detector.onnx");
        assert_eq!(
            file.local_path().unwrap(),
            PathBuf::from("models").join("detector.onnx")
        );

        let bad = ModelFile::new("not a url", "models");
        assert!(matches!(
            bad.file_name(),
            Err(ProvisioningError::InvalidUrl { .. })
        ));

        let no_name = ModelFile::new("https://models.local/", "models");
        assert!(no_name.file_name().is_err());
    }

    #[tokio::test]
    async fn test_download_reports_progress_and_verifies() {
        let temp_dir = TempDir::new().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let base = spawn_server(counting_route(hits.clone())).await;

        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_cb = seen.clone();

        let mut manager = DownloadManager::new(test_client());
        manager.add_file(
            format!("{}/models/detector.onnx", base),
            temp_dir.path(),
            Some(calculate_checksum(WEIGHTS)),
        );
        manager.on_progress(Arc::new(move |p: DownloadProgress| {
            seen_cb.lock().unwrap().push(p.bytes_received);
        }));

        let paths = manager.download().await.unwrap();
        assert_eq!(paths, vec![temp_dir.path().join("detector.onnx")]);
        assert_eq!(tokio::fs::read(&paths[0]).await.unwrap(), WEIGHTS);
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        let seen = seen.lock().unwrap();
        assert!(!seen.is_empty());
        assert_eq!(*seen.last().unwrap(), WEIGHTS.len() as u64);
        assert!(!temp_dir.path().join("detector.onnx.part").exists());
    }

    #[tokio::test]
    async fn test_cached_file_is_not_downloaded_again() {
        let temp_dir = TempDir::new().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let base = spawn_server(counting_route(hits.clone())).await;

        let mut manager = DownloadManager::new(test_client());
        manager.add_file(
            format!("{}/models/detector.onnx", base),
            temp_dir.path(),
            Some(calculate_checksum(WEIGHTS)),
        );

        manager.download().await.unwrap();
        manager.download().await.unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        // A corrupted cache entry is replaced
        tokio::fs::write(temp_dir.path().join("detector.onnx"), b"garbage")
            .await
            .unwrap();
        manager.download().await.unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_checksum_mismatch_fails_and_cleans_up() {
        let temp_dir = TempDir::new().unwrap();
        let base = spawn_server(counting_route(Arc::new(AtomicUsize::new(0)))).await;

        let mut manager = DownloadManager::new(test_client());
        manager.add_file(
            format!("{}/models/detector.onnx", base),
            temp_dir.path(),
            Some(calculate_checksum(b"something else")),
        );

        let err = manager.download().await.unwrap_err();
        assert!(matches!(err, ProvisioningError::ChecksumMismatch { .. }));
        assert!(!temp_dir.path().join("detector.onnx").exists());
        assert!(!temp_dir.path().join("detector.onnx.part").exists());
    }

    #[tokio::test]
    async fn test_missing_file_is_status_error() {
        let temp_dir = TempDir::new().unwrap();
        let base = spawn_server(Router::new()).await;

        let mut manager =
            DownloadManager::new(test_client()).with_retries(3, Duration::from_millis(1));
        manager.add_file(format!("{}/models/nope.onnx", base), temp_dir.path(), None);

        match manager.download().await {
            Err(ProvisioningError::Status { status, .. }) => assert_eq!(status, 404),
            other => panic!("expected status error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_server_errors_are_retried() {
        let temp_dir = TempDir::new().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let route_hits = hits.clone();
        let app = Router::new().route(
            "/models/ocr.onnx",
            get(move || {
                let hits = route_hits.clone();
                async move {
                    if hits.fetch_add(1, Ordering::SeqCst) == 0 {
                        (StatusCode::SERVICE_UNAVAILABLE, "busy").into_response()
                    } else {
                        WEIGHTS.into_response()
                    }
                }
            }),
        );
        let base = spawn_server(app).await;

        let mut manager =
            DownloadManager::new(test_client()).with_retries(2, Duration::from_millis(1));
        manager.add_file(format!("{}/models/ocr.onnx", base), temp_dir.path(), None);

        let paths = manager.download().await.unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 2);
        assert_eq!(tokio::fs::read(&paths[0]).await.unwrap(), WEIGHTS);
    }
}
