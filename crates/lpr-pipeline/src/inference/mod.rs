//! Inference backend seam.
//!
//! Pipeline stages only talk to [`InferenceModel`]: set named input tensors,
//! run a forward pass, read named outputs back as dense `f32` arrays. The
//! production backend is ONNX Runtime ([`OrtEngine`]); tests script outputs
//! through [`MockEngine`].

pub mod mock;
pub mod ort_engine;

pub use mock::{MockEngine, RecordedInput};
pub use ort_engine::OrtEngine;

use anyhow::Result;
use ndarray::ArrayD;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

/// Dense row-major tensor exchanged with a model.
pub type Tensor = ArrayD<f32>;

/// A loaded network.
///
/// Inputs persist between forward passes, so an auxiliary input set once
/// after loading stays in place for every later call.
pub trait InferenceModel: Send {
    fn set_input(&mut self, name: &str, tensor: Tensor) -> Result<()>;

    /// Run the network and return the requested outputs in the order given.
    fn forward(&mut self, output_names: &[&str]) -> Result<Vec<Tensor>>;

    /// Execution provider the model ended up on (e.g. "CUDA", "CPU").
    fn execution_provider(&self) -> &str {
        "CPU"
    }
}

/// Turns provisioned artifacts into a runnable model.
pub trait InferenceEngine: Send + Sync {
    fn load(&self, artifacts: &[PathBuf]) -> Result<Box<dyn InferenceModel>>;
}

/// A model shared between the slot that owns it and in-flight detections.
pub type SharedModel = Arc<Mutex<Box<dyn InferenceModel>>>;

pub fn lock_model(model: &SharedModel) -> Result<MutexGuard<'_, Box<dyn InferenceModel>>> {
    model
        .lock()
        .map_err(|e| anyhow::anyhow!("Failed to lock model: {}", e))
}
