//! Region processing: pad, clamp, crop and upscale detected tables.
//!
//! Layout models return tight boxes, and OCR on a tight crop tends to lose
//! the outer cell borders and the first/last characters of edge columns.
//! Each box therefore grows by a fixed margin, is clamped to the image, and
//! is upscaled with a cubic (Catmull-Rom) kernel before it is re-submitted.
//!
//! Invariant: every box produced here satisfies `x + width <= image_width`
//! and `y + height <= image_height`. Padding that would leave the image is
//! clamped, never an error.

use crate::config::RegionOptions;
use image::imageops::FilterType;
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Axis-aligned box in source-image pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Build from corner coordinates as reported by a detector.
    ///
    /// Coordinates are rounded; negative and non-finite values become 0 and
    /// swapped corners are reordered.
    pub fn from_corners(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        let finite = |v: f32| if v.is_finite() { v } else { 0.0 };
        let (x1, y1, x2, y2) = (finite(x1), finite(y1), finite(x2), finite(y2));
        let to_px = |v: f32| v.round().max(0.0) as u32;
        let (left, right) = (to_px(x1.min(x2)), to_px(x1.max(x2)));
        let (top, bottom) = (to_px(y1.min(y2)), to_px(y1.max(y2)));
        Self::new(left, top, right - left, bottom - top)
    }

    pub fn right(&self) -> u32 {
        self.x.saturating_add(self.width)
    }

    pub fn bottom(&self) -> u32 {
        self.y.saturating_add(self.height)
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Grow by `pad` on every side, clamped to a `img_w` × `img_h` image.
    ///
    /// A box lying entirely outside the image clamps to an empty box.
    pub fn padded(&self, pad: u32, img_w: u32, img_h: u32) -> Self {
        let left = self.x.saturating_sub(pad).min(img_w);
        let top = self.y.saturating_sub(pad).min(img_h);
        let right = self.right().saturating_add(pad).min(img_w).max(left);
        let bottom = self.bottom().saturating_add(pad).min(img_h).max(top);
        Self::new(left, top, right - left, bottom - top)
    }
}

/// One tabular region returned by the layout model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TableRegion {
    pub bbox: BoundingBox,
    /// Detector confidence, 0.0–1.0.
    pub score: f32,
}

/// Cut a padded region out of `img` and upscale it.
///
/// Returns `None` when the clamped region is empty.
pub fn crop_region(
    img: &DynamicImage,
    bbox: &BoundingBox,
    opts: &RegionOptions,
) -> Option<DynamicImage> {
    let area = bbox.padded(opts.padding, img.width(), img.height());
    if area.is_empty() {
        return None;
    }
    let crop = img.crop_imm(area.x, area.y, area.width, area.height);
    let (w, h) = upscaled_size(area.width, area.height, opts);
    debug!(
        "Cropped {}x{}+{}+{} → {}x{}",
        area.width, area.height, area.x, area.y, w, h
    );
    if (w, h) == (area.width, area.height) {
        Some(crop)
    } else {
        Some(crop.resize_exact(w, h, FilterType::CatmullRom))
    }
}

/// Target size after upscaling, capped so the longest edge stays within
/// `max_crop_pixels` (aspect ratio preserved).
pub fn upscaled_size(width: u32, height: u32, opts: &RegionOptions) -> (u32, u32) {
    let factor = if opts.upscale_factor > 1.0 {
        opts.upscale_factor
    } else {
        1.0
    };
    let mut w = (width as f32 * factor) as u32;
    let mut h = (height as f32 * factor) as u32;

    let longest = w.max(h);
    if longest > opts.max_crop_pixels {
        let scale = opts.max_crop_pixels as f32 / longest as f32;
        w = ((w as f32 * scale) as u32).max(1);
        h = ((h as f32 * scale) as u32).max(1);
    }
    (w.max(1), h.max(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn blank(w: u32, h: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(w, h, Rgb([255, 255, 255])))
    }

    #[test]
    fn padding_inside_image() {
        let b = BoundingBox::new(100, 100, 50, 20).padded(30, 1000, 1000);
        assert_eq!(b, BoundingBox::new(70, 70, 110, 80));
    }

    #[test]
    fn padding_clamped_at_every_edge() {
        let (w, h) = (640u32, 480u32);
        let boxes = [
            BoundingBox::new(0, 0, 10, 10),
            BoundingBox::new(5, 470, 100, 10),
            BoundingBox::new(600, 2, 40, 478),
            BoundingBox::new(0, 0, 640, 480),
            BoundingBox::new(630, 470, 500, 500),
            BoundingBox::new(900, 900, 10, 10),
        ];
        for pad in [0, 1, 30, 1000] {
            for b in boxes {
                let p = b.padded(pad, w, h);
                assert!(p.right() <= w, "{b:?} pad {pad} → {p:?}");
                assert!(p.bottom() <= h, "{b:?} pad {pad} → {p:?}");
                assert!(p.width <= w && p.height <= h);
            }
        }
    }

    #[test]
    fn box_outside_image_is_empty() {
        let p = BoundingBox::new(900, 900, 10, 10).padded(5, 640, 480);
        assert!(p.is_empty());
        assert!(crop_region(&blank(640, 480), &BoundingBox::new(900, 900, 10, 10), &RegionOptions::default()).is_none());
    }

    #[test]
    fn corners_normalised() {
        assert_eq!(
            BoundingBox::from_corners(-4.6, 10.2, 20.4, 2.0),
            BoundingBox::new(0, 2, 20, 8)
        );
        assert_eq!(
            BoundingBox::from_corners(f32::NAN, 0.0, 5.0, 5.0),
            BoundingBox::new(0, 0, 5, 5)
        );
    }

    #[test]
    fn crop_is_padded_then_upscaled() {
        let img = blank(400, 300);
        let opts = RegionOptions {
            padding: 10,
            upscale_factor: 2.0,
            max_crop_pixels: 4096,
        };
        let crop = crop_region(&img, &BoundingBox::new(50, 50, 100, 40), &opts).unwrap();
        assert_eq!((crop.width(), crop.height()), (240, 120));
    }

    #[test]
    fn crop_at_corner_is_clamped_before_upscale() {
        let img = blank(200, 100);
        let opts = RegionOptions {
            padding: 30,
            upscale_factor: 1.5,
            max_crop_pixels: 4096,
        };
        let crop = crop_region(&img, &BoundingBox::new(0, 0, 20, 20), &opts).unwrap();
        assert_eq!((crop.width(), crop.height()), (75, 75));
    }

    #[test]
    fn upscale_respects_cap() {
        let opts = RegionOptions {
            padding: 0,
            upscale_factor: 2.0,
            max_crop_pixels: 1000,
        };
        assert_eq!(upscaled_size(1000, 250, &opts), (1000, 250));
    }

    #[test]
    fn no_upscale_below_one() {
        let opts = RegionOptions {
            padding: 0,
            upscale_factor: 1.0,
            max_crop_pixels: 4096,
        };
        assert_eq!(upscaled_size(123, 45, &opts), (123, 45));
    }
}
