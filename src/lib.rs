//! Vehicle and license plate recognition.
//!
//! One facade over the workspace crates: shared types in [`common`], logging
//! and metrics in [`telemetry`], model downloads in [`model_provisioner`] and
//! the detection pipeline in [`lpr_pipeline`].

pub use common;
pub use lpr_pipeline;
pub use model_provisioner;
pub use telemetry;

pub use common::{DetectedObject, LicensePlate, Rect, Vehicle};
pub use lpr_pipeline::{
    InitError, PipelineConfig, Renderer, ServiceConfig, SlotState, VehicleLicensePlateDetector,
};
pub use model_provisioner::{HttpProvisioner, LocalProvisioner, Provisioner, ProvisioningError};
