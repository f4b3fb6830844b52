//! Detection results and the assembled vehicle records.

use crate::geometry::Rect;
use serde::{Deserialize, Serialize};

/// Detector class id for vehicles.
pub const VEHICLE_CLASS_ID: i32 = 1;

/// Detector class id for license plates.
pub const PLATE_CLASS_ID: i32 = 2;

/// A single raw detector candidate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetectedObject {
    pub class_id: i32,

    /// Detector confidence in [0, 1]
    pub confidence: f32,

    pub region: Rect,
}

impl DetectedObject {
    pub fn is_vehicle(&self) -> bool {
        self.class_id == VEHICLE_CLASS_ID
    }

    pub fn is_plate(&self) -> bool {
        self.class_id == PLATE_CLASS_ID
    }
}

/// A recognized license plate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LicensePlate {
    pub region: Rect,
    pub text: String,
}

/// A classified vehicle, optionally carrying the plate found inside it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vehicle {
    pub region: Rect,
    pub color: String,
    #[serde(rename = "type")]
    pub vehicle_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub license_plate: Option<LicensePlate>,
}

impl Vehicle {
    pub fn new(region: Rect, color: impl Into<String>, vehicle_type: impl Into<String>) -> Self {
        Self {
            region,
            color: color.into(),
            vehicle_type: vehicle_type.into(),
            license_plate: None,
        }
    }

    /// Whether at least `ratio` of the plate's area lies inside this vehicle.
    ///
    /// The denominator is the plate area, so the test asks "is the plate mostly
    /// inside the vehicle", not how much the two boxes overlap overall. Empty
    /// regions never contain anything.
    pub fn contains_plate(&self, plate: &LicensePlate, ratio: f32) -> bool {
        if self.region.is_empty() || plate.region.is_empty() {
            return false;
        }

        let overlap = plate.region.intersection(&self.region);
        let contained = overlap.area() as f32 / plate.region.area() as f32;
        contained >= ratio
    }

    /// Text drawn next to the vehicle: color, type and plate text.
    pub fn label(&self) -> String {
        let plate_text = self
            .license_plate
            .as_ref()
            .map(|p| p.text.as_str())
            .unwrap_or("");
        format!("{} {} {}", self.color, self.vehicle_type, plate_text)
    }
}
