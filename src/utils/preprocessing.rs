//! Image preprocessing for the Segment Anything image encoder
//!
//! The encoder expects the longest side resized to 1024, per-channel
//! normalization in 0-255 space and zero padding on the bottom and right.

use crate::{
    error::{CutoutError, Result},
    types::BoxPrompt,
};
use image::{imageops, RgbImage};
use ndarray::Array4;

/// Side of the square encoder input
pub const SAM_INPUT_SIZE: u32 = 1024;

/// Pixel mean in RGB order
pub const SAM_PIXEL_MEAN: [f32; 3] = [123.675, 116.28, 103.53];

/// Pixel standard deviation in RGB order
pub const SAM_PIXEL_STD: [f32; 3] = [58.395, 57.12, 57.375];

/// Resizes and normalizes images for the encoder
#[derive(Debug, Clone, Copy)]
pub struct SamPreprocessor {
    target_length: u32,
}

impl SamPreprocessor {
    #[must_use]
    pub fn new(target_length: u32) -> Self {
        Self { target_length }
    }

    #[must_use]
    pub fn target_length(&self) -> u32 {
        self.target_length
    }

    /// Size `(width, height)` after scaling the longest side to the target length
    #[must_use]
    pub fn resized_size(&self, width: u32, height: u32) -> (u32, u32) {
        let longest = width.max(height).max(1);
        let scale = f64::from(self.target_length) / f64::from(longest);
        let new_width = (f64::from(width) * scale + 0.5).floor() as u32;
        let new_height = (f64::from(height) * scale + 0.5).floor() as u32;
        (new_width.max(1), new_height.max(1))
    }

    /// Build the NCHW encoder input and return it with the resized size
    ///
    /// # Errors
    /// - Empty image
    pub fn preprocess(&self, image: &RgbImage) -> Result<(Array4<f32>, (u32, u32))> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(CutoutError::processing_stage_error(
                "preprocessing",
                "image has no pixels",
                Some(&format!("{width}x{height}")),
            ));
        }

        let (new_width, new_height) = self.resized_size(width, height);
        let resized = imageops::resize(image, new_width, new_height, imageops::FilterType::Triangle);

        let side = self.target_length as usize;
        let mut tensor = Array4::<f32>::zeros((1, 3, side, side));

        #[allow(clippy::indexing_slicing)]
        // Resized image never exceeds the target length on either side
        for (x, y, pixel) in resized.enumerate_pixels() {
            let (x, y) = (x as usize, y as usize);
            for channel in 0..3 {
                tensor[[0, channel, y, x]] =
                    (f32::from(pixel[channel]) - SAM_PIXEL_MEAN[channel]) / SAM_PIXEL_STD[channel];
            }
        }

        Ok((tensor, (new_width, new_height)))
    }

    /// Box corners in encoder input coordinates as `[x1, y1, x2, y2]`
    #[must_use]
    pub fn scale_box(prompt: &BoxPrompt, original: (u32, u32), resized: (u32, u32)) -> [f32; 4] {
        let sx = resized.0 as f32 / original.0.max(1) as f32;
        let sy = resized.1 as f32 / original.1.max(1) as f32;
        [
            prompt.x1 as f32 * sx,
            prompt.y1 as f32 * sy,
            prompt.x2 as f32 * sx,
            prompt.y2 as f32 * sy,
        ]
    }
}

impl Default for SamPreprocessor {
    fn default() -> Self {
        Self::new(SAM_INPUT_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_resized_size_keeps_aspect() {
        let pre = SamPreprocessor::default();
        assert_eq!(pre.resized_size(2048, 1024), (1024, 512));
        assert_eq!(pre.resized_size(100, 100), (1024, 1024));
        assert_eq!(pre.resized_size(640, 480), (1024, 768));
        assert_eq!(pre.resized_size(3, 2000), (2, 1024));
    }

    #[test]
    fn test_preprocess_shape_and_padding() {
        let image = RgbImage::from_pixel(200, 100, Rgb([124, 116, 104]));
        let pre = SamPreprocessor::new(64);
        let (tensor, resized) = pre.preprocess(&image).unwrap();

        assert_eq!(tensor.shape(), &[1, 3, 64, 64]);
        assert_eq!(resized, (64, 32));

        // Inside the resized area: value close to zero after normalization
        assert!(tensor[[0, 0, 10, 10]].abs() < 0.02);
        // Padding rows are exactly zero
        assert!(tensor[[0, 1, 40, 10]].abs() < f32::EPSILON);
    }

    #[test]
    fn test_normalization_per_channel() {
        let image = RgbImage::from_pixel(8, 8, Rgb([255, 0, 128]));
        let (tensor, _) = SamPreprocessor::new(8).preprocess(&image).unwrap();
        let r = (255.0 - SAM_PIXEL_MEAN[0]) / SAM_PIXEL_STD[0];
        let g = (0.0 - SAM_PIXEL_MEAN[1]) / SAM_PIXEL_STD[1];
        assert!((tensor[[0, 0, 3, 3]] - r).abs() < 1e-4);
        assert!((tensor[[0, 1, 3, 3]] - g).abs() < 1e-4);
    }

    #[test]
    fn test_scale_box() {
        let prompt = BoxPrompt::new(10, 20, 110, 220);
        let scaled = SamPreprocessor::scale_box(&prompt, (500, 250), (1024, 512));
        assert!((scaled[0] - 20.48).abs() < 1e-3);
        assert!((scaled[1] - 40.96).abs() < 1e-3);
        assert!((scaled[2] - 225.28).abs() < 1e-3);
        assert!((scaled[3] - 450.56).abs() < 1e-3);
    }

    #[test]
    fn test_empty_image_rejected() {
        assert!(SamPreprocessor::default().preprocess(&RgbImage::new(0, 0)).is_err());
    }
}
