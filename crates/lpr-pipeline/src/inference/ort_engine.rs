use super::{InferenceEngine, InferenceModel, Tensor};
use crate::config::PipelineConfig;
use anyhow::{Context, Result};
use ndarray::{Array, IxDyn};
use ort::{
    execution_providers::{CPUExecutionProvider, CUDAExecutionProvider, TensorRTExecutionProvider},
    session::{
        builder::{GraphOptimizationLevel, SessionBuilder},
        Session,
    },
    value::Value,
};
use std::path::{Path, PathBuf};
use std::time::Instant;
use telemetry::metrics::LPR_INFERENCE_TIME;

/// ONNX Runtime backend with TensorRT -> CUDA -> CPU fallback.
#[derive(Debug, Clone)]
pub struct OrtEngine {
    execution_provider: String,
    device_id: i32,
    intra_threads: usize,
    inter_threads: usize,
}

impl OrtEngine {
    pub fn new(execution_provider: impl Into<String>, device_id: i32) -> Self {
        Self {
            execution_provider: execution_provider.into(),
            device_id,
            intra_threads: 4,
            inter_threads: 1,
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            execution_provider: config.execution_provider.clone(),
            device_id: config.device_id,
            intra_threads: config.intra_threads,
            inter_threads: config.inter_threads,
        }
    }

    pub fn with_threads(mut self, intra_threads: usize, inter_threads: usize) -> Self {
        self.intra_threads = intra_threads;
        self.inter_threads = inter_threads;
        self
    }

    fn builder(&self) -> Result<SessionBuilder> {
        Session::builder()
            .context("Failed to create session builder")?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .context("Failed to set optimization level")?
            .with_intra_threads(self.intra_threads)
            .context("Failed to set intra threads")?
            .with_inter_threads(self.inter_threads)
            .context("Failed to set inter threads")
    }

    fn create_session(&self, model_path: &Path) -> Result<(Session, String)> {
        match self.execution_provider.to_uppercase().as_str() {
            "TENSORRT" => {
                tracing::info!("Attempting TensorRT for {}", model_path.display());
                let result = self
                    .builder()?
                    .with_execution_providers([
                        TensorRTExecutionProvider::default()
                            .with_device_id(self.device_id)
                            .build(),
                        CUDAExecutionProvider::default()
                            .with_device_id(self.device_id)
                            .build(),
                        CPUExecutionProvider::default().build(),
                    ])
                    .context("Failed to set execution providers")?
                    .commit_from_file(model_path);

                match result {
                    Ok(session) => Ok((session, "TensorRT".to_string())),
                    Err(e) => {
                        tracing::warn!("TensorRT failed, trying CUDA: {}", e);
                        self.try_cuda(model_path)
                    }
                }
            }
            "CUDA" => self.try_cuda(model_path),
            _ => self.try_cpu(model_path),
        }
    }

    fn try_cuda(&self, model_path: &Path) -> Result<(Session, String)> {
        tracing::info!("Attempting CUDA for {}", model_path.display());
        let result = self
            .builder()?
            .with_execution_providers([
                CUDAExecutionProvider::default()
                    .with_device_id(self.device_id)
                    .build(),
                CPUExecutionProvider::default().build(),
            ])
            .context("Failed to set execution providers")?
            .commit_from_file(model_path);

        match result {
            Ok(session) => Ok((session, "CUDA".to_string())),
            Err(e) => {
                tracing::warn!("CUDA failed, using CPU: {}", e);
                self.try_cpu(model_path)
            }
        }
    }

    fn try_cpu(&self, model_path: &Path) -> Result<(Session, String)> {
        tracing::info!("Using CPU for {}", model_path.display());
        let session = self
            .builder()?
            .commit_from_file(model_path)
            .with_context(|| format!("Failed to load model from {}", model_path.display()))?;
        Ok((session, "CPU".to_string()))
    }
}

impl InferenceEngine for OrtEngine {
    fn load(&self, artifacts: &[PathBuf]) -> Result<Box<dyn InferenceModel>> {
        let model_path = artifacts
            .iter()
            .find(|path| path.extension().is_some_and(|ext| ext == "onnx"))
            .or_else(|| artifacts.first())
            .context("No model artifact to load")?;

        let (session, execution_provider) = self.create_session(model_path)?;
        let name = model_path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or("unknown")
            .to_string();
        tracing::info!(
            model = %name,
            execution_provider = %execution_provider,
            "ONNX session ready"
        );

        Ok(Box::new(OrtModel {
            name,
            session,
            inputs: Vec::new(),
            execution_provider,
        }))
    }
}

struct OrtModel {
    name: String,
    session: Session,
    inputs: Vec<(String, Tensor)>,
    execution_provider: String,
}

impl InferenceModel for OrtModel {
    fn set_input(&mut self, name: &str, tensor: Tensor) -> Result<()> {
        match self.inputs.iter_mut().find(|(existing, _)| existing == name) {
            Some(slot) => slot.1 = tensor,
            None => self.inputs.push((name.to_string(), tensor)),
        }
        Ok(())
    }

    fn forward(&mut self, output_names: &[&str]) -> Result<Vec<Tensor>> {
        let mut inputs = Vec::with_capacity(self.inputs.len());
        for (name, tensor) in &self.inputs {
            inputs.push((name.clone(), Value::from_array(tensor.clone())?));
        }

        let start = Instant::now();
        let outputs = self.session.run(inputs)?;
        LPR_INFERENCE_TIME
            .with_label_values(&[self.name.as_str(), self.execution_provider.as_str()])
            .observe(start.elapsed().as_secs_f64());

        output_names
            .iter()
            .map(|name| {
                let value = outputs
                    .get(*name)
                    .with_context(|| format!("No output tensor named '{}'", name))?;
                let (shape, data) = value.try_extract_tensor::<f32>()?;
                let shape_usize: Vec<usize> = shape.as_ref().iter().map(|&x| x as usize).collect();
                Ok(Array::from_shape_vec(IxDyn(&shape_usize), data.to_vec())?)
            })
            .collect()
    }

    fn execution_provider(&self) -> &str {
        &self.execution_provider
    }
}
