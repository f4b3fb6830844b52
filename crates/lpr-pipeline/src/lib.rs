pub mod config;
pub mod error;
pub mod inference;
pub mod models;
pub mod pipeline;
pub mod preprocess;
pub mod render;
pub mod slot;
pub mod stages;

pub use config::{PipelineConfig, ServiceConfig};
pub use error::InitError;
pub use pipeline::VehicleLicensePlateDetector;
pub use render::Renderer;
pub use slot::{ModelSlot, SlotState};
