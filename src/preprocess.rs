//! Button image preprocessing for OCR.
//!
//! Keypad glyphs are small and anti-aliased, so each button crop is offered
//! to OCR as a short ladder of progressively more aggressive variants. The
//! ladder is a plain ordered list of pure functions; callers walk it lazily
//! and stop at the first variant that yields a digit.

use std::io::Cursor;

use image::{DynamicImage, GrayImage, ImageFormat, Luma};
use imageproc::filter::sharpen3x3;

/// Contrast multiplier applied around the mean luminance.
pub const CONTRAST_FACTOR: f32 = 2.0;

/// Pixels strictly brighter than this become white, the rest black.
pub const BINARY_THRESHOLD: u8 = 128;

/// One rung of the preprocessing ladder.
#[derive(Clone, Copy)]
pub struct Stage {
    pub name: &'static str,
    pub apply: fn(&DynamicImage) -> GrayImage,
}

impl std::fmt::Debug for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name)
    }
}

/// Cheapest first. Sharpening only runs when the first three rungs fail.
pub const LADDER: [Stage; 5] = [
    Stage {
        name: "grayscale",
        apply: grayscale,
    },
    Stage {
        name: "contrast",
        apply: enhanced,
    },
    Stage {
        name: "threshold",
        apply: enhanced_binary,
    },
    Stage {
        name: "sharpen",
        apply: sharpened,
    },
    Stage {
        name: "sharpen+threshold",
        apply: sharpened_binary,
    },
];

/// Lazily produce candidate images for one button crop, in ladder order.
pub fn candidates(crop: &DynamicImage) -> impl Iterator<Item = (&'static str, GrayImage)> + '_ {
    LADDER.iter().map(move |stage| (stage.name, (stage.apply)(crop)))
}

fn grayscale(crop: &DynamicImage) -> GrayImage {
    crop.to_luma8()
}

fn enhanced(crop: &DynamicImage) -> GrayImage {
    contrast(&grayscale(crop), CONTRAST_FACTOR)
}

fn enhanced_binary(crop: &DynamicImage) -> GrayImage {
    threshold(&enhanced(crop), BINARY_THRESHOLD)
}

fn sharpened(crop: &DynamicImage) -> GrayImage {
    sharpen3x3(&enhanced(crop))
}

fn sharpened_binary(crop: &DynamicImage) -> GrayImage {
    threshold(&sharpened(crop), BINARY_THRESHOLD)
}

/// Scale each pixel's distance from the mean luminance by `factor`.
pub fn contrast(gray: &GrayImage, factor: f32) -> GrayImage {
    let count = (gray.width() as u64 * gray.height() as u64).max(1);
    let sum: u64 = gray.pixels().map(|p| p.0[0] as u64).sum();
    let mean = (sum as f32 / count as f32).round();

    let mut out = gray.clone();
    for pixel in out.pixels_mut() {
        let val = pixel.0[0] as f32;
        pixel.0[0] = (mean + (val - mean) * factor).round().clamp(0.0, 255.0) as u8;
    }
    out
}

pub fn threshold(gray: &GrayImage, level: u8) -> GrayImage {
    let mut out = gray.clone();
    for pixel in out.pixels_mut() {
        *pixel = if pixel.0[0] > level { Luma([255]) } else { Luma([0]) };
    }
    out
}

/// PNG-encode a candidate for the OCR engine.
pub fn encode_png(img: &GrayImage) -> image::ImageResult<Vec<u8>> {
    let mut bytes = Vec::new();
    img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn test_ladder_order() {
        let names: Vec<&str> = LADDER.iter().map(|s| s.name).collect();
        assert_eq!(
            names,
            ["grayscale", "contrast", "threshold", "sharpen", "sharpen+threshold"]
        );
    }

    #[test]
    fn test_grayscale_uses_luminance() {
        let rgb = RgbImage::from_pixel(4, 4, Rgb([255, 0, 0]));
        let gray = grayscale(&DynamicImage::ImageRgb8(rgb));
        let v = gray.get_pixel(0, 0).0[0];
        // Red contributes roughly 21-30% of luminance depending on weights
        assert!((50..=80).contains(&v), "unexpected luma {v}");
    }

    #[test]
    fn test_contrast_spreads_around_mean() {
        let mut gray = GrayImage::from_pixel(2, 1, Luma([100]));
        gray.put_pixel(1, 0, Luma([140]));
        let out = contrast(&gray, 2.0);
        // mean 120: 100 -> 80, 140 -> 160
        assert_eq!(out.get_pixel(0, 0).0[0], 80);
        assert_eq!(out.get_pixel(1, 0).0[0], 160);
    }

    #[test]
    fn test_contrast_clamps() {
        let mut gray = GrayImage::from_pixel(2, 1, Luma([0]));
        gray.put_pixel(1, 0, Luma([255]));
        let out = contrast(&gray, 4.0);
        assert_eq!(out.get_pixel(0, 0).0[0], 0);
        assert_eq!(out.get_pixel(1, 0).0[0], 255);
    }

    #[test]
    fn test_threshold_is_strictly_above() {
        let mut gray = GrayImage::new(3, 1);
        gray.put_pixel(0, 0, Luma([128]));
        gray.put_pixel(1, 0, Luma([129]));
        gray.put_pixel(2, 0, Luma([10]));
        let out = threshold(&gray, BINARY_THRESHOLD);
        assert_eq!(out.get_pixel(0, 0).0[0], 0);
        assert_eq!(out.get_pixel(1, 0).0[0], 255);
        assert_eq!(out.get_pixel(2, 0).0[0], 0);
    }

    #[test]
    fn test_binary_stages_only_emit_black_or_white() {
        let mut gray = GrayImage::from_pixel(12, 12, Luma([190]));
        for y in 3..9 {
            gray.put_pixel(6, y, Luma([140]));
        }
        let crop = DynamicImage::ImageLuma8(gray);
        for (name, img) in candidates(&crop) {
            assert_eq!(img.dimensions(), (12, 12), "stage {name} changed size");
            if name.ends_with("threshold") {
                assert!(img.pixels().all(|p| p.0[0] == 0 || p.0[0] == 255));
            }
        }
    }

    #[test]
    fn test_candidates_follow_ladder_order() {
        let crop = DynamicImage::ImageLuma8(GrayImage::from_pixel(4, 4, Luma([200])));
        let first: Vec<&str> = candidates(&crop).take(2).map(|(n, _)| n).collect();
        assert_eq!(first, ["grayscale", "contrast"]);
    }

    #[test]
    fn test_encode_png_roundtrips_dimensions() {
        let img = GrayImage::from_pixel(7, 5, Luma([42]));
        let bytes = encode_png(&img).unwrap();
        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (7, 5));
    }
}
