/// Integration tests for model provisioning through the pipeline's init path
use axum::{http::StatusCode, http::Uri, Router};
use image::RgbImage;
use lpr_pipeline::inference::MockEngine;
use lpr_pipeline::models::{ATTRIBUTES_MODEL, DETECTOR_MODEL, PLATE_OCR_MODEL};
use lpr_pipeline::{InitError, PipelineConfig, SlotState, VehicleLicensePlateDetector};
use model_provisioner::{DownloadProgress, HttpProvisioner, LocalProvisioner, ProgressCallback};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

const MODELS: [&str; 3] = [DETECTOR_MODEL, ATTRIBUTES_MODEL, PLATE_OCR_MODEL];
const WEIGHTS: &[u8] = b"not really an onnx graph";

async fn spawn_model_server(hits: Arc<AtomicUsize>) -> String {
    let app = Router::new().fallback(move |uri: Uri| {
        let hits = hits.clone();
        async move {
            hits.fetch_add(1, Ordering::SeqCst);
            if uri.path().starts_with("/gone/") {
                (StatusCode::NOT_FOUND, &b""[..])
            } else {
                (StatusCode::OK, WEIGHTS)
            }
        }
    });

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

fn http_provisioner() -> Arc<HttpProvisioner> {
    let client = reqwest::Client::builder().no_proxy().build().unwrap();
    Arc::new(HttpProvisioner::with_client(client, 0))
}

fn config_for(model_dir: &Path, base_url: &str) -> PipelineConfig {
    PipelineConfig {
        model_dir: model_dir.to_path_buf(),
        model_base_url: base_url.to_string(),
        ..PipelineConfig::default()
    }
}

#[tokio::test]
async fn test_init_downloads_each_model_once() {
    let temp_dir = TempDir::new().unwrap();
    let hits = Arc::new(AtomicUsize::new(0));
    let base = spawn_model_server(hits.clone()).await;
    let config = config_for(temp_dir.path(), &base);

    let progress_events = Arc::new(Mutex::new(0usize));
    let events = progress_events.clone();
    let progress: ProgressCallback = Arc::new(move |_: DownloadProgress| {
        *events.lock().unwrap() += 1;
    });

    let engine = Arc::new(MockEngine::new());
    let detector = VehicleLicensePlateDetector::new(config.clone(), http_provisioner(), engine.clone());
    detector.init(Some(progress)).await.unwrap();

    assert!(detector.is_ready());
    assert_eq!(hits.load(Ordering::SeqCst), 3);
    assert!(*progress_events.lock().unwrap() >= 3);
    for model in MODELS {
        let path = temp_dir.path().join(model).join(format!("{}.onnx", model));
        assert_eq!(tokio::fs::read(&path).await.unwrap(), WEIGHTS);
        assert_eq!(engine.load_count(model), 1);
    }

    // A second detector finds the files already on disk.
    let detector = VehicleLicensePlateDetector::new(config, http_provisioner(), Arc::new(MockEngine::new()));
    detector.init(None).await.unwrap();
    assert_eq!(hits.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_http_error_leaves_slots_uninitialized() {
    let temp_dir = TempDir::new().unwrap();
    let hits = Arc::new(AtomicUsize::new(0));
    let base = spawn_model_server(hits.clone()).await;
    let config = config_for(temp_dir.path(), &format!("{}/gone", base));

    let detector = VehicleLicensePlateDetector::new(config, http_provisioner(), Arc::new(MockEngine::new()));
    let err = detector.init(None).await.unwrap_err();

    assert!(matches!(err, InitError::Provisioning(_)));
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert!(detector
        .slot_states()
        .iter()
        .all(|(_, state)| *state == SlotState::Uninitialized));
}

#[tokio::test]
async fn test_offline_uses_local_files() {
    let temp_dir = TempDir::new().unwrap();
    for model in MODELS {
        let dir = temp_dir.path().join(model);
        tokio::fs::create_dir_all(&dir).await.unwrap();
        tokio::fs::write(dir.join(format!("{}.onnx", model)), WEIGHTS)
            .await
            .unwrap();
    }
    let config = PipelineConfig {
        offline: true,
        ..config_for(temp_dir.path(), "http://unreachable.invalid")
    };

    let detector = VehicleLicensePlateDetector::new(config, Arc::new(LocalProvisioner), Arc::new(MockEngine::new()));
    detector.init(None).await.unwrap();
    assert!(detector.is_ready());
}

#[tokio::test]
async fn test_offline_missing_model() {
    let temp_dir = TempDir::new().unwrap();
    let config = config_for(temp_dir.path(), "http://unreachable.invalid");

    let detector = VehicleLicensePlateDetector::new(config, Arc::new(LocalProvisioner), Arc::new(MockEngine::new()));
    let err = detector.init(None).await.unwrap_err();

    assert!(err.to_string().contains("not available locally"));
    assert!(detector.detect(&RgbImage::new(10, 10)).is_err());
}
