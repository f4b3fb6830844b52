/// Scripted inference backend for tests and demonstrations
use super::{InferenceEngine, InferenceModel, Tensor};
use anyhow::{Context, Result};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

/// An input tensor a mock model received.
#[derive(Debug, Clone)]
pub struct RecordedInput {
    pub model: String,
    pub name: String,
    pub tensor: Tensor,
}

type Recorder = Arc<Mutex<Vec<RecordedInput>>>;

/// Engine whose models return fixed outputs.
///
/// Models are keyed by the file stem of their first artifact, so the
/// detector loaded from `models/foo/foo.onnx` answers with the outputs
/// scripted under `"foo"`.
#[derive(Default)]
pub struct MockEngine {
    scripts: HashMap<String, HashMap<String, Tensor>>,
    failing: HashSet<String>,
    loads: Mutex<HashMap<String, usize>>,
    recorded: Recorder,
}

impl MockEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_output(mut self, model: &str, output: &str, tensor: Tensor) -> Self {
        self.scripts
            .entry(model.to_string())
            .or_default()
            .insert(output.to_string(), tensor);
        self
    }

    /// Make every load of `model` fail.
    pub fn with_load_failure(mut self, model: &str) -> Self {
        self.failing.insert(model.to_string());
        self
    }

    pub fn load_count(&self, model: &str) -> usize {
        self.loads
            .lock()
            .map(|loads| loads.get(model).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    pub fn recorded_inputs(&self) -> Vec<RecordedInput> {
        self.recorded
            .lock()
            .map(|recorded| recorded.clone())
            .unwrap_or_default()
    }

    pub fn inputs_named(&self, model: &str, name: &str) -> Vec<Tensor> {
        self.recorded_inputs()
            .into_iter()
            .filter(|input| input.model == model && input.name == name)
            .map(|input| input.tensor)
            .collect()
    }
}

impl InferenceEngine for MockEngine {
    fn load(&self, artifacts: &[PathBuf]) -> Result<Box<dyn InferenceModel>> {
        let model = artifacts
            .first()
            .and_then(|path| path.file_stem())
            .and_then(|stem| stem.to_str())
            .context("No model artifact to load")?
            .to_string();

        if self.failing.contains(&model) {
            anyhow::bail!("mock load failure for {}", model);
        }

        if let Ok(mut loads) = self.loads.lock() {
            *loads.entry(model.clone()).or_insert(0) += 1;
        }

        Ok(Box::new(MockModel {
            outputs: self.scripts.get(&model).cloned().unwrap_or_default(),
            model,
            recorded: Arc::clone(&self.recorded),
        }))
    }
}

struct MockModel {
    model: String,
    outputs: HashMap<String, Tensor>,
    recorded: Recorder,
}

impl InferenceModel for MockModel {
    fn set_input(&mut self, name: &str, tensor: Tensor) -> Result<()> {
        let mut recorded = self
            .recorded
            .lock()
            .map_err(|e| anyhow::anyhow!("Failed to lock recorder: {}", e))?;
        recorded.push(RecordedInput {
            model: self.model.clone(),
            name: name.to_string(),
            tensor,
        });
        Ok(())
    }

    fn forward(&mut self, output_names: &[&str]) -> Result<Vec<Tensor>> {
        output_names
            .iter()
            .map(|name| {
                self.outputs
                    .get(*name)
                    .cloned()
                    .with_context(|| format!("No output tensor named '{}'", name))
            })
            .collect()
    }

    fn execution_provider(&self) -> &str {
        "Mock"
    }
}
