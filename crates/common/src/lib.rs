pub mod geometry;
pub mod labels;
pub mod vehicle;

pub use geometry::Rect;
pub use vehicle::{DetectedObject, LicensePlate, Vehicle, PLATE_CLASS_ID, VEHICLE_CLASS_ID};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
