use image::DynamicImage;

use crate::locator::BoundingBox;

/// Raster snapshot of the whole keypad container, taken once per attempt.
///
/// Pixel (0, 0) is the container's top-left corner. If the screenshot came
/// back at a different resolution than the container box (device scale
/// factor), crops are scaled accordingly.
pub struct KeypadImage {
    image: DynamicImage,
    region: BoundingBox,
    scale_x: f64,
    scale_y: f64,
}

impl KeypadImage {
    pub fn new(image: DynamicImage, region: BoundingBox) -> Self {
        let scale_x = image.width() as f64 / region.width;
        let scale_y = image.height() as f64 / region.height;
        Self {
            image,
            region,
            scale_x,
            scale_y,
        }
    }

    /// Decode screenshot bytes (PNG from the automation layer).
    pub fn from_png(bytes: &[u8], region: BoundingBox) -> image::ImageResult<Self> {
        let image = image::load_from_memory(bytes)?;
        Ok(Self::new(image, region))
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Crop the sub-image for a button given its absolute page box.
    /// The crop is clamped to the snapshot; `None` if nothing is left.
    pub fn crop(&self, button: &BoundingBox) -> Option<DynamicImage> {
        let rel = button.relative_to(&self.region);

        let left = (rel.x * self.scale_x).round().max(0.0);
        let top = (rel.y * self.scale_y).round().max(0.0);
        let right = ((rel.x + rel.width) * self.scale_x)
            .round()
            .min(self.image.width() as f64);
        let bottom = ((rel.y + rel.height) * self.scale_y)
            .round()
            .min(self.image.height() as f64);

        if right <= left || bottom <= top {
            return None;
        }

        Some(self.image.crop_imm(
            left as u32,
            top as u32,
            (right - left) as u32,
            (bottom - top) as u32,
        ))
    }
}
