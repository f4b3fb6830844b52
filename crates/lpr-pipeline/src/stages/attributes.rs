use crate::inference::{InferenceModel, Tensor};
use crate::models::ModelSpec;
use crate::preprocess::{blob_from_image, crop_region, BlobParams};
use anyhow::Result;
use common::labels::{VEHICLE_COLORS, VEHICLE_TYPES};
use common::Rect;
use image::RgbImage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VehicleAttributes {
    pub color: &'static str,
    pub vehicle_type: &'static str,
}

/// Color and body type of a single vehicle crop.
#[derive(Debug, Clone)]
pub struct AttributeClassifier {
    input_name: String,
    color_output: String,
    type_output: String,
    blob: BlobParams,
}

impl AttributeClassifier {
    /// Expects the color scores as the first output and type scores second.
    pub fn new(spec: &ModelSpec) -> Self {
        Self {
            input_name: spec.input_name.clone(),
            color_output: spec.output_name(0),
            type_output: spec.output_name(1),
            blob: spec.blob,
        }
    }

    pub fn classify(
        &self,
        model: &mut dyn InferenceModel,
        image: &RgbImage,
        region: Rect,
    ) -> Result<VehicleAttributes> {
        let crop = crop_region(image, region)?;
        model.set_input(&self.input_name, blob_from_image(&crop, &self.blob))?;

        let outputs = model.forward(&[&self.color_output, &self.type_output])?;
        let [color, vehicle_type]: [Tensor; 2] = outputs
            .try_into()
            .map_err(|o: Vec<Tensor>| anyhow::anyhow!("Expected 2 classifier outputs, got {}", o.len()))?;

        Ok(VehicleAttributes {
            color: VEHICLE_COLORS[argmax(&color)],
            vehicle_type: VEHICLE_TYPES[argmax(&vehicle_type)],
        })
    }
}

/// Index of the largest score; ties go to the lowest index.
pub fn argmax(scores: &Tensor) -> usize {
    let mut best = 0;
    let mut best_score = f32::NEG_INFINITY;
    for (index, &score) in scores.iter().enumerate() {
        if score > best_score {
            best = index;
            best_score = score;
        }
    }
    best
}
