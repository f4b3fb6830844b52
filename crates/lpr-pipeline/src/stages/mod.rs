pub mod association;
pub mod attributes;
pub mod detection;
pub mod plate_ocr;

pub use association::associate;
pub use attributes::{argmax, AttributeClassifier, VehicleAttributes};
pub use detection::{decode_ssd_output, DetectionStage};
pub use plate_ocr::{decode_sequence, PlateRecognizer};
