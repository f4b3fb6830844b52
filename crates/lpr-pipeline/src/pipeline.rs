//! Vehicle and license plate recognition orchestrator.

use crate::config::PipelineConfig;
use crate::error::InitError;
use crate::inference::{lock_model, InferenceEngine};
use crate::models;
use crate::render::Renderer;
use crate::slot::{ModelSlot, SlotState};
use crate::stages::{associate, AttributeClassifier, DetectionStage, PlateRecognizer};
use anyhow::Result;
use common::{DetectedObject, LicensePlate, Vehicle};
use image::RgbImage;
use model_provisioner::{ProgressCallback, Provisioner};
use std::sync::Arc;
use std::time::{Duration, Instant};
use telemetry::metrics::{LPR_DETECTIONS, LPR_IMAGES_PROCESSED, LPR_STAGE_LATENCY};
use tracing::{debug, info};

/// Detects vehicles and plates, classifies vehicles, reads plates and pairs
/// plates with the vehicles that contain them.
///
/// Models are provisioned by [`init`](Self::init). Detection before that
/// fails with a "not initialized" error.
pub struct VehicleLicensePlateDetector {
    config: PipelineConfig,
    detector: ModelSlot,
    attributes: ModelSlot,
    plate_ocr: ModelSlot,
    detection_stage: DetectionStage,
    attribute_classifier: AttributeClassifier,
    plate_recognizer: PlateRecognizer,
    renderer: Renderer,
}

impl VehicleLicensePlateDetector {
    pub fn new(
        config: PipelineConfig,
        provisioner: Arc<dyn Provisioner>,
        engine: Arc<dyn InferenceEngine>,
    ) -> Self {
        let detector_spec = models::detector_spec(&config);
        let attributes_spec = models::attributes_spec(&config);
        let plate_ocr_spec = models::plate_ocr_spec(&config);

        let detection_stage = DetectionStage::new(
            &detector_spec,
            config.vehicle_threshold,
            config.plate_threshold,
        );
        let attribute_classifier = AttributeClassifier::new(&attributes_spec);
        let plate_recognizer = PlateRecognizer::new(&plate_ocr_spec);

        let slot = |spec| ModelSlot::new(spec, Arc::clone(&provisioner), Arc::clone(&engine));

        Self {
            detector: slot(detector_spec),
            attributes: slot(attributes_spec),
            plate_ocr: slot(plate_ocr_spec),
            detection_stage,
            attribute_classifier,
            plate_recognizer,
            renderer: Renderer::default(),
            config,
        }
    }

    pub fn with_renderer(mut self, renderer: Renderer) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    fn slots(&self) -> [&ModelSlot; 3] {
        [&self.detector, &self.attributes, &self.plate_ocr]
    }

    /// Provision and load the detector, then the attribute classifier, then
    /// the plate recognizer. Ready slots are skipped, so calling this again
    /// is cheap and retries only what failed before.
    pub async fn init(&self, progress: Option<ProgressCallback>) -> Result<(), InitError> {
        for slot in self.slots() {
            slot.ensure_ready(progress.clone()).await?;
        }
        info!("all pipeline models ready");
        Ok(())
    }

    pub fn is_ready(&self) -> bool {
        self.slots().iter().all(|slot| slot.is_ready())
    }

    /// `Ok(false)` while any model is missing; an error if a loaded model
    /// was poisoned by a panic during inference.
    pub fn health_check(&self) -> Result<bool> {
        for slot in self.slots() {
            if !slot.is_ready() {
                return Ok(false);
            }
            let model = slot.model()?;
            if model.is_poisoned() {
                anyhow::bail!("{} model is poisoned", slot.name());
            }
        }
        Ok(true)
    }

    /// Model name and state for each slot, in load order.
    pub fn slot_states(&self) -> Vec<(String, SlotState)> {
        self.slots()
            .iter()
            .map(|slot| (slot.name().to_string(), slot.state()))
            .collect()
    }

    pub fn detect(&self, image: &RgbImage) -> Result<Vec<Vehicle>> {
        Ok(self.detect_timed(image)?.0)
    }

    fn detect_timed(&self, image: &RgbImage) -> Result<(Vec<Vehicle>, Duration)> {
        let result = self.run_stages(image);
        let status = if result.is_ok() { "success" } else { "error" };
        LPR_IMAGES_PROCESSED.with_label_values(&[status]).inc();
        result
    }

    fn run_stages(&self, image: &RgbImage) -> Result<(Vec<Vehicle>, Duration)> {
        let detector = self.detector.model()?;
        let attributes = self.attributes.model()?;
        let plate_ocr = self.plate_ocr.model()?;

        let start = Instant::now();
        let objects = {
            let mut model = lock_model(&detector)?;
            self.detection_stage.detect(&mut **model, image)?
        };
        let detection_time = start.elapsed();
        observe_stage("detection", detection_time);

        let (vehicle_objects, plate_objects): (Vec<DetectedObject>, Vec<DetectedObject>) =
            objects.into_iter().partition(|object| object.is_vehicle());
        LPR_DETECTIONS
            .with_label_values(&["vehicle"])
            .inc_by(vehicle_objects.len() as u64);
        LPR_DETECTIONS
            .with_label_values(&["plate"])
            .inc_by(plate_objects.len() as u64);

        let start = Instant::now();
        let mut vehicles = Vec::with_capacity(vehicle_objects.len());
        {
            let mut model = lock_model(&attributes)?;
            for object in &vehicle_objects {
                let attrs = self
                    .attribute_classifier
                    .classify(&mut **model, image, object.region)?;
                vehicles.push(Vehicle::new(object.region, attrs.color, attrs.vehicle_type));
            }
        }
        observe_stage("classification", start.elapsed());

        let start = Instant::now();
        let mut plates = Vec::with_capacity(plate_objects.len());
        {
            let mut model = lock_model(&plate_ocr)?;
            for object in &plate_objects {
                let text = self
                    .plate_recognizer
                    .recognize(&mut **model, image, object.region)?;
                plates.push(LicensePlate {
                    region: object.region,
                    text,
                });
            }
        }
        observe_stage("ocr", start.elapsed());

        let start = Instant::now();
        let attached = associate(&mut vehicles, plates, self.config.overlap_ratio);
        observe_stage("association", start.elapsed());
        debug!(
            vehicles = vehicles.len(),
            plates = plate_objects.len(),
            attached,
            "pipeline finished"
        );

        Ok((vehicles, detection_time))
    }

    pub fn render(&self, image: &mut RgbImage, vehicles: &[Vehicle]) {
        let start = Instant::now();
        self.renderer.render(image, vehicles);
        observe_stage("render", start.elapsed());
    }

    /// Detect on `input`, copy it into `output` and annotate the copy.
    ///
    /// Returns a status line with the detection-stage latency.
    pub fn process_and_render(&self, input: &RgbImage, output: &mut RgbImage) -> Result<String> {
        Ok(self.process_and_render_detailed(input, output)?.0)
    }

    /// [`process_and_render`](Self::process_and_render) that also hands back
    /// the vehicles it drew.
    pub fn process_and_render_detailed(
        &self,
        input: &RgbImage,
        output: &mut RgbImage,
    ) -> Result<(String, Vec<Vehicle>)> {
        let (vehicles, elapsed) = self.detect_timed(input)?;
        output.clone_from(input);
        self.render(output, &vehicles);
        Ok((status_message(elapsed), vehicles))
    }

    /// Same as [`process_and_render`](Self::process_and_render) with a
    /// single buffer for input and output.
    pub fn process_and_render_in_place(&self, image: &mut RgbImage) -> Result<String> {
        let (vehicles, elapsed) = self.detect_timed(image)?;
        self.render(image, &vehicles);
        Ok(status_message(elapsed))
    }

    /// Release the detector, classifier and recognizer, in that order.
    /// Safe to call more than once; also runs on drop.
    pub fn shutdown(&self) {
        for slot in self.slots() {
            slot.release();
        }
    }
}

impl Drop for VehicleLicensePlateDetector {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn observe_stage(stage: &str, elapsed: Duration) {
    LPR_STAGE_LATENCY
        .with_label_values(&[stage])
        .observe(elapsed.as_secs_f64());
}

pub fn status_message(elapsed: Duration) -> String {
    format!(
        "Detected vehicles and license plates in {} milliseconds.",
        elapsed.as_millis()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_message_format() {
        assert_eq!(
            status_message(Duration::from_millis(42)),
            "Detected vehicles and license plates in 42 milliseconds."
        );
    }
}
