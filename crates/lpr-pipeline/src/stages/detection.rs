use crate::inference::{InferenceModel, Tensor};
use crate::models::ModelSpec;
use crate::preprocess::{blob_from_image, BlobParams};
use anyhow::{Context, Result};
use common::{DetectedObject, Rect};
use image::RgbImage;

/// Values per detection row: `[image_id, label, confidence, x_min, y_min, x_max, y_max]`.
const SSD_ROW_LEN: usize = 7;

/// Joint vehicle and plate detector with an SSD head.
#[derive(Debug, Clone)]
pub struct DetectionStage {
    input_name: String,
    output_name: String,
    blob: BlobParams,
    vehicle_threshold: f32,
    plate_threshold: f32,
}

impl DetectionStage {
    pub fn new(spec: &ModelSpec, vehicle_threshold: f32, plate_threshold: f32) -> Self {
        Self {
            input_name: spec.input_name.clone(),
            output_name: spec.output_name(0),
            blob: spec.blob,
            vehicle_threshold,
            plate_threshold,
        }
    }

    /// Vehicles and plates scoring strictly above their class threshold.
    pub fn detect(&self, model: &mut dyn InferenceModel, image: &RgbImage) -> Result<Vec<DetectedObject>> {
        Ok(self.filter(self.detect_raw(model, image)?))
    }

    /// Every candidate the detector reports, before thresholding.
    pub fn detect_raw(
        &self,
        model: &mut dyn InferenceModel,
        image: &RgbImage,
    ) -> Result<Vec<DetectedObject>> {
        if image.width() == 0 || image.height() == 0 {
            anyhow::bail!("cannot run detection on an empty image");
        }

        model.set_input(&self.input_name, blob_from_image(image, &self.blob))?;
        let output = model
            .forward(&[&self.output_name])?
            .into_iter()
            .next()
            .context("Detector returned no output")?;

        Ok(decode_ssd_output(&output, image.width(), image.height()))
    }

    pub fn filter(&self, candidates: Vec<DetectedObject>) -> Vec<DetectedObject> {
        candidates
            .into_iter()
            .filter(|object| {
                (object.is_vehicle() && object.confidence > self.vehicle_threshold)
                    || (object.is_plate() && object.confidence > self.plate_threshold)
            })
            .collect()
    }
}

/// Decode SSD `DetectionOutput` rows with coordinates normalized to [0, 1].
///
/// Rows with a negative image id are padding and are dropped. Corners are
/// scaled to the frame and clipped to it.
pub fn decode_ssd_output(output: &Tensor, frame_width: u32, frame_height: u32) -> Vec<DetectedObject> {
    let values: Vec<f32> = output.iter().copied().collect();
    let width = frame_width as f32;
    let height = frame_height as f32;
    let to_px = |v: f32, max: f32| (v * max).round().clamp(0.0, max) as i32;

    values
        .chunks_exact(SSD_ROW_LEN)
        .filter(|row| row[0] >= 0.0)
        .map(|row| {
            let left = to_px(row[3], width);
            let top = to_px(row[4], height);
            let right = to_px(row[5], width);
            let bottom = to_px(row[6], height);
            DetectedObject {
                class_id: row[1] as i32,
                confidence: row[2],
                region: Rect::new(left, top, right - left, bottom - top),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use crate::inference::{InferenceEngine, MockEngine};
    use crate::models::detector_spec;
    use common::{PLATE_CLASS_ID, VEHICLE_CLASS_ID};
    use ndarray::{Array, IxDyn};
    use std::path::PathBuf;

    fn ssd(rows: &[[f32; 7]]) -> Tensor {
        let flat: Vec<f32> = rows.iter().flatten().copied().collect();
        Array::from_shape_vec(IxDyn(&[1, 1, rows.len(), 7]), flat).unwrap()
    }

    fn stage(vehicle_threshold: f32, plate_threshold: f32) -> DetectionStage {
        DetectionStage::new(
            &detector_spec(&PipelineConfig::default()),
            vehicle_threshold,
            plate_threshold,
        )
    }

    #[test]
    fn test_decode_scales_to_frame() {
        let output = ssd(&[
            [0.0, 1.0, 0.9, 0.05, 0.1, 0.55, 0.7],
            [0.0, 2.0, 0.95, 0.2, 0.5, 0.3, 0.6],
        ]);
        let objects = decode_ssd_output(&output, 200, 100);

        assert_eq!(objects.len(), 2);
        assert_eq!(objects[0].class_id, VEHICLE_CLASS_ID);
        assert_eq!(objects[0].region, Rect::new(10, 10, 100, 60));
        assert_eq!(objects[1].class_id, PLATE_CLASS_ID);
        assert_eq!(objects[1].region, Rect::new(40, 50, 20, 10));
    }

    #[test]
    fn test_decode_skips_padding_rows() {
        let output = ssd(&[
            [0.0, 1.0, 0.9, 0.1, 0.1, 0.2, 0.2],
            [-1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
        ]);
        assert_eq!(decode_ssd_output(&output, 100, 100).len(), 1);
    }

    #[test]
    fn test_decode_clips_to_frame() {
        let output = ssd(&[[0.0, 1.0, 0.9, -0.1, 0.5, 1.2, 1.0]]);
        let objects = decode_ssd_output(&output, 100, 50);
        assert_eq!(objects[0].region, Rect::new(0, 25, 100, 25));
    }

    #[test]
    fn test_filter_is_strict_and_per_class() {
        let stage = stage(0.5, 0.6);
        let object = |class_id, confidence| DetectedObject {
            class_id,
            confidence,
            region: Rect::new(0, 0, 10, 10),
        };

        let kept = stage.filter(vec![
            object(VEHICLE_CLASS_ID, 0.5),
            object(VEHICLE_CLASS_ID, 0.51),
            object(PLATE_CLASS_ID, 0.55),
            object(PLATE_CLASS_ID, 0.61),
            object(7, 0.99),
        ]);

        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].confidence, 0.51);
        assert_eq!(kept[1].confidence, 0.61);
    }

    #[test]
    fn test_detect_feeds_300x300_blob() {
        let engine = MockEngine::new().with_output(
            "detector",
            "detection_out",
            ssd(&[[0.0, 1.0, 0.9, 0.0, 0.0, 0.5, 0.5]]),
        );
        let mut model = engine.load(&[PathBuf::from("detector.onnx")]).unwrap();
        let image = RgbImage::new(64, 48);

        let objects = stage(0.5, 0.5)
            .detect(model.as_mut(), &image)
            .unwrap();

        assert_eq!(objects.len(), 1);
        assert_eq!(objects[0].region, Rect::new(0, 0, 32, 24));
        let inputs = engine.inputs_named("detector", "data");
        assert_eq!(inputs[0].shape(), &[1, 3, 300, 300]);
    }

    #[test]
    fn test_detect_rejects_empty_image() {
        let engine = MockEngine::new();
        let mut model = engine.load(&[PathBuf::from("detector.onnx")]).unwrap();
        let result = stage(0.5, 0.5).detect(model.as_mut(), &RgbImage::new(0, 0));
        assert!(result.is_err());
    }
}
