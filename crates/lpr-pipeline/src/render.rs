//! Annotation of detected vehicles onto an image.

use ab_glyph::{FontArc, FontVec, PxScale};
use anyhow::{Context, Result};
use common::{Rect, Vehicle};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_text_mut};
use std::path::Path;
use tracing::{info, warn};

static BUNDLED_FONT: &[u8] = include_bytes!("../assets/DejaVuSans.ttf");

const BOX_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
const TEXT_COLOR: Rgb<u8> = Rgb([0, 0, 255]);

/// Labels sit this far below the top edge of the vehicle box.
const LABEL_OFFSET_Y: i32 = 20;

/// Draws vehicle boxes and "color type plate" labels.
///
/// The default renderer labels with the bundled DejaVu Sans. Without a font
/// only boxes are drawn.
pub struct Renderer {
    font: Option<FontArc>,
    font_scale: f32,
    thickness: u32,
    box_color: Rgb<u8>,
    text_color: Rgb<u8>,
}

impl Default for Renderer {
    fn default() -> Self {
        let font = FontArc::try_from_slice(BUNDLED_FONT)
            .map_err(|e| warn!("Bundled font unusable, labels will be skipped: {}", e))
            .ok();
        Self {
            font,
            ..Self::without_font()
        }
    }
}

impl Renderer {
    /// Boxes only.
    pub fn without_font() -> Self {
        Self {
            font: None,
            font_scale: 20.0,
            thickness: 2,
            box_color: BOX_COLOR,
            text_color: TEXT_COLOR,
        }
    }

    pub fn with_font_path(font_path: &Path) -> Result<Self> {
        let font_data = std::fs::read(font_path)
            .with_context(|| format!("Failed to read font file {}", font_path.display()))?;
        let font = FontVec::try_from_vec(font_data)
            .map_err(|_| anyhow::anyhow!("Failed to parse font file: {}", font_path.display()))?;
        Ok(Self {
            font: Some(FontArc::new(font)),
            ..Self::without_font()
        })
    }

    /// Tries a few well-known font locations and falls back to the bundled font.
    pub fn with_system_font() -> Self {
        let font_paths = [
            "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
            "/usr/share/fonts/TTF/DejaVuSans.ttf",
            "/System/Library/Fonts/Supplemental/Arial.ttf",
            "C:\\Windows\\Fonts\\arial.ttf",
        ];

        for path in font_paths {
            if let Some(font) = std::fs::read(path)
                .ok()
                .and_then(|data| FontVec::try_from_vec(data).ok())
            {
                info!("Loaded system font: {}", path);
                return Self {
                    font: Some(FontArc::new(font)),
                    ..Self::without_font()
                };
            }
        }

        info!("No system font found, using the bundled font");
        Self::default()
    }

    pub fn with_colors(mut self, box_color: Rgb<u8>, text_color: Rgb<u8>) -> Self {
        self.box_color = box_color;
        self.text_color = text_color;
        self
    }

    pub fn with_thickness(mut self, thickness: u32) -> Self {
        self.thickness = thickness.max(1);
        self
    }

    pub fn with_font_scale(mut self, font_scale: f32) -> Self {
        self.font_scale = font_scale;
        self
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    pub fn render(&self, image: &mut RgbImage, vehicles: &[Vehicle]) {
        for vehicle in vehicles {
            self.draw_box(image, vehicle.region);

            if let Some(font) = &self.font {
                draw_text_mut(
                    image,
                    self.text_color,
                    vehicle.region.x,
                    vehicle.region.y + LABEL_OFFSET_Y,
                    PxScale::from(self.font_scale),
                    font,
                    &vehicle.label(),
                );
            }
        }
    }

    /// Thick outlines are nested one-pixel rectangles growing inwards.
    fn draw_box(&self, image: &mut RgbImage, region: Rect) {
        for inset in 0..self.thickness as i32 {
            let width = region.width - 2 * inset;
            let height = region.height - 2 * inset;
            if width <= 0 || height <= 0 {
                break;
            }
            draw_hollow_rect_mut(
                image,
                imageproc::rect::Rect::at(region.x + inset, region.y + inset)
                    .of_size(width as u32, height as u32),
                self.box_color,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::LicensePlate;

    fn vehicle(region: Rect) -> Vehicle {
        let mut vehicle = Vehicle::new(region, "red", "car");
        vehicle.license_plate = Some(LicensePlate {
            region: Rect::new(region.x + 2, region.y + 2, 4, 2),
            text: "A123".to_string(),
        });
        vehicle
    }

    #[test]
    fn test_render_draws_box_outline() {
        let mut image = RgbImage::new(50, 50);
        Renderer::without_font().render(&mut image, &[vehicle(Rect::new(10, 10, 20, 20))]);

        assert_eq!(image.get_pixel(10, 10), &BOX_COLOR);
        assert_eq!(image.get_pixel(29, 29), &BOX_COLOR);
        assert_eq!(image.get_pixel(11, 11), &BOX_COLOR);
        assert_eq!(image.get_pixel(20, 20), &Rgb([0, 0, 0]));
    }

    #[test]
    fn test_render_without_font_skips_labels() {
        let renderer = Renderer::without_font().with_thickness(1);
        assert!(!renderer.has_font());

        let mut image = RgbImage::new(50, 50);
        renderer.render(&mut image, &[vehicle(Rect::new(0, 0, 50, 10))]);

        let text_pixels = image.pixels().filter(|p| **p == TEXT_COLOR).count();
        assert_eq!(text_pixels, 0);
        assert_eq!(image.get_pixel(1, 1), &Rgb([0, 0, 0]));
    }

    #[test]
    fn test_render_clips_boxes_past_edges() {
        let mut image = RgbImage::new(20, 20);
        let renderer = Renderer::default().with_colors(Rgb([0, 255, 0]), TEXT_COLOR);
        renderer.render(&mut image, &[vehicle(Rect::new(-5, -5, 100, 100))]);
        assert_eq!(image.dimensions(), (20, 20));
    }

    #[test]
    fn test_render_no_vehicles_leaves_image() {
        let mut image = RgbImage::from_pixel(8, 8, Rgb([9, 9, 9]));
        Renderer::default().render(&mut image, &[]);
        assert!(image.pixels().all(|p| *p == Rgb([9, 9, 9])));
    }

    #[test]
    fn test_default_renderer_draws_label_below_top_edge() {
        let renderer = Renderer::default();
        assert!(renderer.has_font());

        let region = Rect::new(10, 10, 180, 80);
        let mut image = RgbImage::new(200, 100);
        renderer.render(&mut image, &[vehicle(region)]);

        let label_top = (region.y + LABEL_OFFSET_Y) as u32;
        let text_pixels: Vec<(u32, u32)> = image
            .enumerate_pixels()
            .filter(|(_, _, p)| **p == TEXT_COLOR)
            .map(|(x, y, _)| (x, y))
            .collect();

        assert!(!text_pixels.is_empty());
        assert!(text_pixels.iter().all(|&(_, y)| y >= label_top));
        assert!(text_pixels.iter().all(|&(x, _)| x >= region.x as u32));
    }

    #[test]
    fn test_missing_font_file() {
        assert!(Renderer::with_font_path(Path::new("/nonexistent/font.ttf")).is_err());
    }
}
