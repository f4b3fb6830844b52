//! Catalog of the three networks the pipeline runs.

use crate::config::PipelineConfig;
use crate::inference::InferenceModel;
use crate::preprocess::BlobParams;
use crate::stages::plate_ocr;
use model_provisioner::ModelFile;

pub const DETECTOR_MODEL: &str = "vehicle-license-plate-detection-barrier-0106";
pub const ATTRIBUTES_MODEL: &str = "vehicle-attributes-recognition-barrier-0039";
pub const PLATE_OCR_MODEL: &str = "license-plate-recognition-barrier-0001";

/// Runs once right after a model is loaded, before the slot turns Ready.
pub type LoadHook = fn(&mut dyn InferenceModel) -> anyhow::Result<()>;

/// Everything needed to provision, load and feed one model.
#[derive(Clone)]
pub struct ModelSpec {
    pub name: String,
    pub files: Vec<ModelFile>,
    pub input_name: String,
    pub output_names: Vec<String>,
    pub blob: BlobParams,
    pub on_loaded: Option<LoadHook>,
}

impl std::fmt::Debug for ModelSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelSpec")
            .field("name", &self.name)
            .field("files", &self.files)
            .field("input_name", &self.input_name)
            .field("output_names", &self.output_names)
            .field("blob", &self.blob)
            .field("on_loaded", &self.on_loaded.is_some())
            .finish()
    }
}

impl ModelSpec {
    /// A single-file ONNX model laid out as `<base>/<name>/<name>.onnx` and
    /// stored under `<model_dir>/<name>/`. Tensor names default to `data` in
    /// and `output` out.
    pub fn onnx(name: &str, config: &PipelineConfig, blob: BlobParams) -> Self {
        let url = format!(
            "{}/{}/{}.onnx",
            config.model_base_url.trim_end_matches('/'),
            name,
            name
        );
        let mut file = ModelFile::new(url, config.model_dir.join(name));
        if let Some(sha256) = config.model_checksums.get(name) {
            file = file.with_sha256(sha256.clone());
        }

        Self {
            name: name.to_string(),
            files: vec![file],
            input_name: "data".to_string(),
            output_names: vec!["output".to_string()],
            blob,
            on_loaded: None,
        }
    }

    pub fn with_tensor_names(mut self, input: &str, outputs: &[&str]) -> Self {
        self.input_name = input.to_string();
        self.output_names = outputs.iter().map(|name| name.to_string()).collect();
        self
    }

    /// Output name at `index`, empty if fewer outputs are listed.
    pub fn output_name(&self, index: usize) -> String {
        self.output_names.get(index).cloned().unwrap_or_default()
    }

    pub fn with_load_hook(mut self, hook: LoadHook) -> Self {
        self.on_loaded = Some(hook);
        self
    }
}

/// SSD detector, one output of `[image_id, label, confidence, x_min, y_min, x_max, y_max]` rows.
pub fn detector_spec(config: &PipelineConfig) -> ModelSpec {
    ModelSpec::onnx(DETECTOR_MODEL, config, BlobParams::sized(300, 300))
        .with_tensor_names("data", &["detection_out"])
}

pub fn attributes_spec(config: &PipelineConfig) -> ModelSpec {
    ModelSpec::onnx(ATTRIBUTES_MODEL, config, BlobParams::sized(72, 72))
        .with_tensor_names("input", &["color", "type"])
}

/// The recognizer needs its sequence indicator in place before first use.
pub fn plate_ocr_spec(config: &PipelineConfig) -> ModelSpec {
    ModelSpec::onnx(PLATE_OCR_MODEL, config, BlobParams::sized(94, 24))
        .with_tensor_names("data", &["decode"])
        .with_load_hook(plate_ocr::prime_sequence_input)
}
