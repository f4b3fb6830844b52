use crate::inference::{InferenceModel, Tensor};
use crate::models::ModelSpec;
use crate::preprocess::{blob_from_image, crop_region, BlobParams};
use anyhow::{Context, Result};
use common::labels::PLATE_SYMBOLS;
use common::Rect;
use image::RgbImage;
use ndarray::{Array, IxDyn};

pub const SEQUENCE_INPUT_NAME: &str = "seq_ind";
pub const SEQUENCE_LENGTH: usize = 88;

/// Sequence indicator for the recurrent decoder: 0 for the first step,
/// 1 for every later one.
pub fn sequence_indicator() -> Tensor {
    let mut indicator = Array::ones(IxDyn(&[SEQUENCE_LENGTH, 1]));
    indicator[[0, 0]] = 0.0;
    indicator
}

/// Load hook for the recognizer. The indicator never changes, so it is set
/// once and stays bound across every later forward pass.
pub fn prime_sequence_input(model: &mut dyn InferenceModel) -> Result<()> {
    model.set_input(SEQUENCE_INPUT_NAME, sequence_indicator())
}

/// Map symbol indices to text, skipping negative (padding) entries.
///
/// Indices past the end of the symbol table are a model contract violation.
pub fn decode_sequence(indices: &[i32]) -> String {
    indices
        .iter()
        .filter(|&&index| index >= 0)
        .map(|&index| PLATE_SYMBOLS[index as usize])
        .collect()
}

/// Plate text recognizer; its output is already greedy-decoded symbol indices.
#[derive(Debug, Clone)]
pub struct PlateRecognizer {
    input_name: String,
    output_name: String,
    blob: BlobParams,
}

impl PlateRecognizer {
    pub fn new(spec: &ModelSpec) -> Self {
        Self {
            input_name: spec.input_name.clone(),
            output_name: spec.output_name(0),
            blob: spec.blob,
        }
    }

    pub fn recognize(&self, model: &mut dyn InferenceModel, image: &RgbImage, region: Rect) -> Result<String> {
        let crop = crop_region(image, region)?;
        model.set_input(&self.input_name, blob_from_image(&crop, &self.blob))?;

        let output = model
            .forward(&[&self.output_name])?
            .into_iter()
            .next()
            .context("Plate recognizer returned no output")?;

        let indices: Vec<i32> = output.iter().map(|&value| value as i32).collect();
        Ok(decode_sequence(&indices))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use crate::inference::{InferenceEngine, MockEngine};
    use crate::models::plate_ocr_spec;
    use std::path::PathBuf;

    #[test]
    fn test_decode_sequence() {
        assert_eq!(decode_sequence(&[0, 1, 2]), "012");
        assert_eq!(decode_sequence(&[5, -1, 7, -1, -1]), "57");
        assert_eq!(decode_sequence(&[]), "");
        assert_eq!(decode_sequence(&[-1, -1]), "");
        assert_eq!(decode_sequence(&[44]), "<police>");
        assert_eq!(decode_sequence(&[48, 49, 3]), "AB3");
    }

    #[test]
    fn test_sequence_indicator() {
        let indicator = sequence_indicator();
        assert_eq!(indicator.shape(), &[88, 1]);
        assert_eq!(indicator[[0, 0]], 0.0);
        assert!(indicator.iter().skip(1).all(|&v| v == 1.0));
    }

    #[test]
    fn test_recognize_decodes_output() {
        let output = Array::from_shape_vec(
            IxDyn(&[1, 6, 1, 1]),
            vec![48.0, 49.0, 1.0, 2.0, -1.0, -1.0],
        )
        .unwrap();
        let engine = MockEngine::new().with_output("ocr", "decode", output);
        let mut model = engine.load(&[PathBuf::from("ocr.onnx")]).unwrap();
        prime_sequence_input(model.as_mut()).unwrap();

        let image = RgbImage::new(200, 100);
        let text = PlateRecognizer::new(&plate_ocr_spec(&PipelineConfig::default()))
            .recognize(model.as_mut(), &image, Rect::new(40, 50, 40, 12))
            .unwrap();

        assert_eq!(text, "AB12");
        assert_eq!(engine.inputs_named("ocr", "data")[0].shape(), &[1, 3, 24, 94]);
        assert_eq!(engine.inputs_named("ocr", SEQUENCE_INPUT_NAME).len(), 1);
    }
}
