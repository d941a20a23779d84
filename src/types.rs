//! Core types for box-prompted cutout operations

use crate::error::{CutoutError, Result};
use crate::services::ImageIOService;
use image::{GrayImage, Luma, RgbaImage};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Rectangle drawn by the user around the object of interest
///
/// Coordinates are in source-image pixels; `(x1, y1)` is the top-left corner and
/// `(x2, y2)` the bottom-right one. No validation happens on construction, see
/// [`crate::utils::validate_prompt`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BoxPrompt {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl BoxPrompt {
    #[must_use]
    pub fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Signed width, non-positive for inverted prompts
    #[must_use]
    pub fn width(&self) -> i64 {
        i64::from(self.x2) - i64::from(self.x1)
    }

    /// Signed height, non-positive for inverted prompts
    #[must_use]
    pub fn height(&self) -> i64 {
        i64::from(self.y2) - i64::from(self.y1)
    }

    #[must_use]
    pub fn to_array(&self) -> [i32; 4] {
        [self.x1, self.y1, self.x2, self.y2]
    }
}

impl fmt::Display for BoxPrompt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{},{}", self.x1, self.y1, self.x2, self.y2)
    }
}

impl FromStr for BoxPrompt {
    type Err = CutoutError;

    /// Parse `x1,y1,x2,y2`
    fn from_str(s: &str) -> Result<Self> {
        let values = s
            .split(',')
            .map(|part| {
                part.trim().parse::<i32>().map_err(|e| {
                    CutoutError::invalid_prompt(format!("'{}' is not an integer: {}", part.trim(), e))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        match values.as_slice() {
            [x1, y1, x2, y2] => Ok(Self::new(*x1, *y1, *x2, *y2)),
            _ => Err(CutoutError::invalid_prompt(format!(
                "expected 4 comma-separated integers (x1,y1,x2,y2), got {}",
                values.len()
            ))),
        }
    }
}

/// Per-pixel object/background classification
///
/// Stored row-major. Pipeline stages never mutate a mask; each produces a new one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BinaryMask {
    data: Vec<bool>,
    dimensions: (u32, u32),
}

impl BinaryMask {
    /// Create a mask from row-major data
    ///
    /// # Errors
    /// - Data length does not equal `width * height`
    pub fn new(data: Vec<bool>, dimensions: (u32, u32)) -> Result<Self> {
        let expected = dimensions.0 as usize * dimensions.1 as usize;
        if data.len() != expected {
            return Err(CutoutError::processing(format!(
                "Mask data has {} values, expected {} for {}x{}",
                data.len(),
                expected,
                dimensions.0,
                dimensions.1
            )));
        }
        Ok(Self { data, dimensions })
    }

    /// Create a mask with every pixel set to `value`
    #[must_use]
    pub fn filled(width: u32, height: u32, value: bool) -> Self {
        Self {
            data: vec![value; width as usize * height as usize],
            dimensions: (width, height),
        }
    }

    /// Create a mask by evaluating `f(x, y)` for every pixel
    #[must_use]
    pub fn from_fn<F: Fn(u32, u32) -> bool>(width: u32, height: u32, f: F) -> Self {
        let mut data = Vec::with_capacity(width as usize * height as usize);
        for y in 0..height {
            for x in 0..width {
                data.push(f(x, y));
            }
        }
        Self {
            data,
            dimensions: (width, height),
        }
    }

    /// Binarize a grayscale image; pixels strictly above `threshold` are foreground
    #[must_use]
    pub fn from_gray(image: &GrayImage, threshold: u8) -> Self {
        let data = image.pixels().map(|p| p[0] > threshold).collect();
        Self {
            data,
            dimensions: image.dimensions(),
        }
    }

    /// Convert to an 8-bit intensity image (false -> 0, true -> 255)
    #[must_use]
    pub fn to_gray(&self) -> GrayImage {
        let (width, height) = self.dimensions;
        GrayImage::from_fn(width, height, |x, y| {
            Luma([if self.get(x, y) { 255 } else { 0 }])
        })
    }

    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        self.dimensions
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.dimensions.0
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.dimensions.1
    }

    /// Value at `(x, y)`; out-of-range coordinates read as background
    #[must_use]
    pub fn get(&self, x: u32, y: u32) -> bool {
        if x >= self.dimensions.0 || y >= self.dimensions.1 {
            return false;
        }
        let index = y as usize * self.dimensions.0 as usize + x as usize;
        self.data.get(index).copied().unwrap_or(false)
    }

    #[must_use]
    pub fn as_slice(&self) -> &[bool] {
        &self.data
    }

    #[must_use]
    pub fn foreground_count(&self) -> usize {
        self.data.iter().filter(|&&v| v).count()
    }

    /// True when no pixel belongs to the object
    #[must_use]
    pub fn is_empty(&self) -> bool {
        !self.data.iter().any(|&v| v)
    }

    #[must_use]
    pub fn statistics(&self) -> MaskStatistics {
        let total_pixels = self.data.len();
        let foreground_pixels = self.foreground_count();
        let foreground_ratio = if total_pixels == 0 {
            0.0
        } else {
            foreground_pixels as f32 / total_pixels as f32
        };

        MaskStatistics {
            total_pixels,
            foreground_pixels,
            background_pixels: total_pixels - foreground_pixels,
            foreground_ratio,
        }
    }
}

/// Statistics about a binary mask
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaskStatistics {
    pub total_pixels: usize,
    pub foreground_pixels: usize,
    pub background_pixels: usize,
    pub foreground_ratio: f32,
}

/// Axis-aligned pixel rectangle, inclusive of `x`/`y`, exclusive of `x + width`/`y + height`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelBounds {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl PixelBounds {
    /// Exclusive right edge
    #[must_use]
    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    /// Exclusive bottom edge
    #[must_use]
    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }
}

/// How the bounds cropper resolved an image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CropOutcome {
    /// Image was trimmed to the bounds of its visible pixels
    Cropped(PixelBounds),
    /// Every pixel was fully transparent; image returned unchanged
    NoContent,
}

impl CropOutcome {
    #[must_use]
    pub fn is_cropped(&self) -> bool {
        matches!(self, Self::Cropped(_))
    }

    #[must_use]
    pub fn bounds(&self) -> Option<PixelBounds> {
        match self {
            Self::Cropped(bounds) => Some(*bounds),
            Self::NoContent => None,
        }
    }

    /// Short tag used in logs and response headers
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cropped(_) => "cropped",
            Self::NoContent => "no-content",
        }
    }
}

/// Output of the bounds cropper: the image plus how it was obtained
#[derive(Debug, Clone)]
pub struct CroppedImage {
    pub image: RgbaImage,
    pub outcome: CropOutcome,
}

/// Detailed timing breakdown for one cutout request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessingTimings {
    /// Model loading time (first call only)
    pub model_load_ms: u64,

    /// Image encoder pass
    pub encode_ms: u64,

    /// Prompt decoder pass and mask selection
    pub predict_ms: u64,

    /// Morphological closing
    pub clean_ms: u64,

    /// Alpha compositing with feathered edges
    pub composite_ms: u64,

    /// Bounds cropping
    pub crop_ms: u64,

    /// Total end-to-end processing time
    pub total_ms: u64,
}

impl ProcessingTimings {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Time spent in post-processing stages
    #[must_use]
    pub fn postprocessing_ms(&self) -> u64 {
        self.clean_ms + self.composite_ms + self.crop_ms
    }

    /// Fraction of the total spent inside the model
    #[must_use]
    pub fn inference_ratio(&self) -> f64 {
        if self.total_ms == 0 {
            0.0
        } else {
            (self.encode_ms + self.predict_ms) as f64 / self.total_ms as f64
        }
    }

    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "Total: {}ms | Encode: {}ms | Predict: {}ms | Clean: {}ms | Composite: {}ms | Crop: {}ms",
            self.total_ms,
            self.encode_ms,
            self.predict_ms,
            self.clean_ms,
            self.composite_ms,
            self.crop_ms
        )
    }
}

/// Result of a cutout operation
#[derive(Debug, Clone)]
pub struct CutoutResult {
    /// Transparent-background cutout, cropped when content was found
    pub image: RgbaImage,

    /// Whether the image was cropped or returned whole
    pub outcome: CropOutcome,

    /// Cleaned mask the alpha channel was derived from
    pub mask: BinaryMask,

    /// Model confidence of the selected mask
    pub score: f32,

    /// Prompt the mask was predicted from
    pub prompt: BoxPrompt,

    /// Source image dimensions
    pub original_dimensions: (u32, u32),

    pub timings: ProcessingTimings,
}

impl CutoutResult {
    /// Encode the cutout as PNG bytes
    ///
    /// # Errors
    /// - PNG encoder failure
    pub fn to_png_bytes(&self) -> Result<Vec<u8>> {
        ImageIOService::encode_png(&self.image)
    }

    /// Save the cutout as a PNG file
    ///
    /// # Errors
    /// - Parent directory cannot be created
    /// - File write or PNG encoder failure
    pub fn save_png<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        ImageIOService::save_png(&self.image, path)
    }

    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    /// True when the model found nothing and the image was not cropped
    #[must_use]
    pub fn is_empty(&self) -> bool {
        !self.outcome.is_cropped()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_box_prompt_parse() {
        let prompt: BoxPrompt = "10, 20,30,40".parse().unwrap();
        assert_eq!(prompt, BoxPrompt::new(10, 20, 30, 40));
        assert_eq!(prompt.width(), 20);
        assert_eq!(prompt.height(), 20);
        assert_eq!(prompt.to_string(), "10,20,30,40");

        assert!("10,20,30".parse::<BoxPrompt>().is_err());
        assert!("a,b,c,d".parse::<BoxPrompt>().is_err());
        assert!(matches!(
            "1,2,3,4,5".parse::<BoxPrompt>(),
            Err(CutoutError::InvalidPrompt(_))
        ));
    }

    #[test]
    fn test_inverted_prompt_has_negative_extent() {
        let prompt = BoxPrompt::new(50, 50, 10, 60);
        assert_eq!(prompt.width(), -40);
        assert_eq!(prompt.height(), 10);
    }

    #[test]
    fn test_mask_construction_checks_length() {
        assert!(BinaryMask::new(vec![true; 6], (3, 2)).is_ok());
        assert!(BinaryMask::new(vec![true; 5], (3, 2)).is_err());
    }

    #[test]
    fn test_mask_gray_conversion() {
        let mask = BinaryMask::from_fn(4, 3, |x, y| x == 1 && y == 2);
        let gray = mask.to_gray();
        assert_eq!(gray.dimensions(), (4, 3));
        assert_eq!(gray.get_pixel(1, 2)[0], 255);
        assert_eq!(gray.get_pixel(0, 0)[0], 0);

        let back = BinaryMask::from_gray(&gray, 127);
        assert_eq!(back, mask);
    }

    #[test]
    fn test_mask_out_of_range_reads_background() {
        let mask = BinaryMask::filled(2, 2, true);
        assert!(mask.get(1, 1));
        assert!(!mask.get(2, 0));
        assert!(!mask.get(0, 5));
    }

    #[test]
    fn test_mask_statistics() {
        let mask = BinaryMask::from_fn(10, 10, |x, _| x < 3);
        let stats = mask.statistics();
        assert_eq!(stats.total_pixels, 100);
        assert_eq!(stats.foreground_pixels, 30);
        assert_eq!(stats.background_pixels, 70);
        assert!((stats.foreground_ratio - 0.3).abs() < f32::EPSILON);
        assert!(!mask.is_empty());
        assert!(BinaryMask::filled(3, 3, false).is_empty());
    }

    #[test]
    fn test_crop_outcome_tags() {
        let bounds = PixelBounds {
            x: 3,
            y: 2,
            width: 6,
            height: 8,
        };
        assert_eq!(bounds.right(), 9);
        assert_eq!(bounds.bottom(), 10);

        let cropped = CropOutcome::Cropped(bounds);
        assert!(cropped.is_cropped());
        assert_eq!(cropped.bounds(), Some(bounds));
        assert_eq!(cropped.as_str(), "cropped");
        assert_eq!(CropOutcome::NoContent.as_str(), "no-content");
        assert_eq!(CropOutcome::NoContent.bounds(), None);
    }

    #[test]
    fn test_timings_summary() {
        let timings = ProcessingTimings {
            encode_ms: 60,
            predict_ms: 20,
            clean_ms: 5,
            composite_ms: 3,
            crop_ms: 2,
            total_ms: 100,
            ..ProcessingTimings::default()
        };
        assert_eq!(timings.postprocessing_ms(), 10);
        assert!((timings.inference_ratio() - 0.8).abs() < 1e-9);
        assert!(timings.summary().contains("Encode: 60ms"));
        assert!(ProcessingTimings::new().inference_ratio().abs() < f64::EPSILON);
    }
}
