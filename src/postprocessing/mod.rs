//! Mask post-processing: clean-up, alpha compositing and cropping

pub mod compositing;
pub mod cropping;
pub mod morphology;

pub use compositing::{gaussian_kernel, AlphaCompositor};
pub use cropping::{content_bounds, BoundsCropper};
pub use morphology::MaskCleaner;

use crate::{
    config::PostprocessConfig,
    error::Result,
    types::{BinaryMask, CroppedImage, ProcessingTimings},
};
use image::DynamicImage;
use std::time::Instant;
use tracing::{debug, span, Level};

/// The three post-processing stages configured together
#[derive(Debug, Clone)]
pub struct PostprocessPipeline {
    pub cleaner: MaskCleaner,
    pub compositor: AlphaCompositor,
    pub cropper: BoundsCropper,
}

impl PostprocessPipeline {
    /// # Errors
    /// - Invalid kernel sizes or sigma
    pub fn from_config(config: &PostprocessConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            cleaner: MaskCleaner::new(config.closing_kernel_size)?,
            compositor: AlphaCompositor::new(config.blur_kernel_size, config.blur_sigma)?,
            cropper: BoundsCropper,
        })
    }

    /// Clean, composite and crop in one go
    ///
    /// # Errors
    /// - Mask and image dimensions differ
    pub fn run(&self, image: &DynamicImage, raw_mask: &BinaryMask) -> Result<CroppedImage> {
        let mut timings = ProcessingTimings::default();
        let (_, cropped) = self.run_with_timings(image, raw_mask, &mut timings)?;
        Ok(cropped)
    }

    /// Like [`Self::run`], recording each stage in `timings` and keeping the cleaned mask
    ///
    /// # Errors
    /// - Mask and image dimensions differ
    pub fn run_with_timings(
        &self,
        image: &DynamicImage,
        raw_mask: &BinaryMask,
        timings: &mut ProcessingTimings,
    ) -> Result<(BinaryMask, CroppedImage)> {
        let cleaned = {
            let _span = span!(Level::DEBUG, "clean", kernel = self.cleaner.kernel_size()).entered();
            let start = Instant::now();
            let cleaned = self.cleaner.clean(raw_mask);
            timings.clean_ms = start.elapsed().as_millis() as u64;
            debug!(
                raw = raw_mask.foreground_count(),
                cleaned = cleaned.foreground_count(),
                foreground_ratio = cleaned.statistics().foreground_ratio,
                "Mask closed"
            );
            cleaned
        };

        let composited = {
            let _span = span!(Level::DEBUG, "composite").entered();
            let start = Instant::now();
            let composited = self.compositor.compose(image, &cleaned)?;
            timings.composite_ms = start.elapsed().as_millis() as u64;
            composited
        };

        let cropped = {
            let _span = span!(Level::DEBUG, "crop").entered();
            let start = Instant::now();
            let cropped = self.cropper.crop(composited);
            timings.crop_ms = start.elapsed().as_millis() as u64;
            cropped
        };

        Ok((cleaned, cropped))
    }
}

impl Default for PostprocessPipeline {
    fn default() -> Self {
        Self {
            cleaner: MaskCleaner::default(),
            compositor: AlphaCompositor::default(),
            cropper: BoundsCropper,
        }
    }
}
