//! Lazily provisioned, individually releasable model holders.

use crate::error::InitError;
use crate::inference::{InferenceEngine, InferenceModel, SharedModel};
use crate::models::ModelSpec;
use model_provisioner::{ProgressCallback, Provisioner};
use serde::Serialize;
use std::sync::{Arc, Mutex, RwLock};
use telemetry::metrics::{MODEL_PROVISIONING, MODEL_READY};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotState {
    Uninitialized,
    Provisioning,
    Ready,
}

enum Loaded {
    Uninitialized,
    Provisioning,
    Ready(SharedModel),
}

/// Holds one model through Uninitialized -> Provisioning -> Ready.
///
/// Concurrent `ensure_ready` calls share a single provisioning attempt. A
/// failed attempt returns the slot to Uninitialized.
pub struct ModelSlot {
    spec: ModelSpec,
    provisioner: Arc<dyn Provisioner>,
    engine: Arc<dyn InferenceEngine>,
    init_lock: tokio::sync::Mutex<()>,
    loaded: RwLock<Loaded>,
}

impl ModelSlot {
    pub fn new(
        spec: ModelSpec,
        provisioner: Arc<dyn Provisioner>,
        engine: Arc<dyn InferenceEngine>,
    ) -> Self {
        Self {
            spec,
            provisioner,
            engine,
            init_lock: tokio::sync::Mutex::new(()),
            loaded: RwLock::new(Loaded::Uninitialized),
        }
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn state(&self) -> SlotState {
        match &*self.loaded.read().unwrap_or_else(|e| e.into_inner()) {
            Loaded::Uninitialized => SlotState::Uninitialized,
            Loaded::Provisioning => SlotState::Provisioning,
            Loaded::Ready(_) => SlotState::Ready,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.state() == SlotState::Ready
    }

    fn set(&self, loaded: Loaded) {
        *self.loaded.write().unwrap_or_else(|e| e.into_inner()) = loaded;
    }

    /// Provision and load the model unless it is already Ready.
    pub async fn ensure_ready(&self, progress: Option<ProgressCallback>) -> Result<(), InitError> {
        if self.is_ready() {
            return Ok(());
        }

        let _guard = self.init_lock.lock().await;
        if self.is_ready() {
            debug!(model = %self.spec.name, "model became ready while waiting");
            return Ok(());
        }

        self.set(Loaded::Provisioning);
        let mut in_flight = InFlight {
            slot: self,
            done: false,
        };
        info!(model = %self.spec.name, "provisioning model");

        let result = self.provision_and_load(progress).await;
        in_flight.done = true;

        match result {
            Ok(model) => {
                self.set(Loaded::Ready(Arc::new(Mutex::new(model))));
                MODEL_PROVISIONING
                    .with_label_values(&[self.spec.name.as_str(), "success"])
                    .inc();
                MODEL_READY.with_label_values(&[self.spec.name.as_str()]).set(1);
                info!(model = %self.spec.name, "model ready");
                Ok(())
            }
            Err(e) => {
                self.set(Loaded::Uninitialized);
                MODEL_PROVISIONING
                    .with_label_values(&[self.spec.name.as_str(), "failure"])
                    .inc();
                warn!(model = %self.spec.name, error = %e, "model initialization failed");
                Err(e)
            }
        }
    }

    async fn provision_and_load(
        &self,
        progress: Option<ProgressCallback>,
    ) -> Result<Box<dyn InferenceModel>, InitError> {
        let artifacts = self.provisioner.provision(&self.spec.files, progress).await?;

        let engine = Arc::clone(&self.engine);
        let on_loaded = self.spec.on_loaded;
        let loaded = tokio::task::spawn_blocking(move || -> anyhow::Result<Box<dyn InferenceModel>> {
            let mut model = engine.load(&artifacts)?;
            if let Some(hook) = on_loaded {
                hook(model.as_mut())?;
            }
            Ok(model)
        })
        .await;

        match loaded {
            Ok(Ok(model)) => Ok(model),
            Ok(Err(source)) => Err(InitError::Load {
                model: self.spec.name.clone(),
                source,
            }),
            Err(join_error) => Err(InitError::Load {
                model: self.spec.name.clone(),
                source: anyhow::anyhow!("model load task failed: {}", join_error),
            }),
        }
    }

    /// The loaded model, or an error naming the slot if it is not Ready.
    pub fn model(&self) -> anyhow::Result<SharedModel> {
        match &*self.loaded.read().unwrap_or_else(|e| e.into_inner()) {
            Loaded::Ready(model) => Ok(Arc::clone(model)),
            _ => anyhow::bail!("{} model not initialized; call init() first", self.spec.name),
        }
    }

    /// Drop the model. Returns whether anything was released.
    pub fn release(&self) -> bool {
        let previous = std::mem::replace(
            &mut *self.loaded.write().unwrap_or_else(|e| e.into_inner()),
            Loaded::Uninitialized,
        );
        let released = matches!(previous, Loaded::Ready(_));
        if released {
            MODEL_READY.with_label_values(&[self.spec.name.as_str()]).set(0);
            debug!(model = %self.spec.name, "model released");
        }
        released
    }
}

/// Returns the slot to Uninitialized if `ensure_ready` is dropped while
/// provisioning is still running.
struct InFlight<'a> {
    slot: &'a ModelSlot,
    done: bool,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.done {
            self.slot.set(Loaded::Uninitialized);
            debug!(model = %self.slot.spec.name, "provisioning abandoned");
        }
    }
}
