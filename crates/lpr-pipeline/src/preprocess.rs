//! Image to tensor conversion shared by every stage.

use crate::inference::Tensor;
use anyhow::Result;
use common::Rect;
use image::imageops::{self, FilterType};
use image::RgbImage;
use ndarray::{Array, IxDyn};

/// How an image is turned into a network input blob.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlobParams {
    pub width: u32,
    pub height: u32,
    /// Per-channel mean, subtracted after any channel swap
    pub mean: [f32; 3],
    pub scale: f32,
    /// Swap the first and third channel
    pub swap_rb: bool,
    /// Resize preserving aspect ratio, then centre-crop to the target size
    pub crop: bool,
}

impl BlobParams {
    /// Plain resize with no normalization.
    pub const fn sized(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            mean: [0.0; 3],
            scale: 1.0,
            swap_rb: false,
            crop: false,
        }
    }
}

/// Build a `[1, 3, height, width]` blob from an image.
pub fn blob_from_image(image: &RgbImage, params: &BlobParams) -> Tensor {
    let resized = if params.crop {
        resize_and_crop(image, params.width, params.height)
    } else {
        imageops::resize(image, params.width, params.height, FilterType::Triangle)
    };

    let mut blob = Array::zeros(IxDyn(&[
        1,
        3,
        params.height as usize,
        params.width as usize,
    ]));

    for (x, y, pixel) in resized.enumerate_pixels() {
        for c in 0..3 {
            let src = if params.swap_rb { 2 - c } else { c };
            blob[[0, c, y as usize, x as usize]] =
                (pixel[src] as f32 - params.mean[c]) * params.scale;
        }
    }

    blob
}

fn resize_and_crop(image: &RgbImage, width: u32, height: u32) -> RgbImage {
    let scale = f32::max(
        width as f32 / image.width().max(1) as f32,
        height as f32 / image.height().max(1) as f32,
    );
    let scaled_w = ((image.width() as f32 * scale).ceil() as u32).max(width);
    let scaled_h = ((image.height() as f32 * scale).ceil() as u32).max(height);
    let scaled = imageops::resize(image, scaled_w, scaled_h, FilterType::Triangle);

    let x = (scaled_w - width) / 2;
    let y = (scaled_h - height) / 2;
    imageops::crop_imm(&scaled, x, y, width, height).to_image()
}

/// Copy out the part of `image` covered by `region`, clipped to the image.
pub fn crop_region(image: &RgbImage, region: Rect) -> Result<RgbImage> {
    let clipped = region.clamp_to(image.width(), image.height());
    if clipped.is_empty() {
        anyhow::bail!(
            "region {:?} does not overlap the {}x{} image",
            region,
            image.width(),
            image.height()
        );
    }

    Ok(imageops::crop_imm(
        image,
        clipped.x as u32,
        clipped.y as u32,
        clipped.width as u32,
        clipped.height as u32,
    )
    .to_image())
}
