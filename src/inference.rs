//! Segmentation backend abstraction
//!
//! A backend is the box-prompted segmentation oracle. Image state is never kept
//! inside the backend between calls: [`SegmentationBackend::encode`] returns an
//! [`ImageContext`] that the caller hands back to [`SegmentationBackend::predict`].

use crate::{
    config::{CutoutConfig, MaskSelection},
    error::{CutoutError, Result},
    types::{BinaryMask, BoxPrompt},
};
use image::RgbImage;
use ndarray::{ArrayD, IxDyn};
use std::time::Duration;

/// Per-request state produced by the image encoder
#[derive(Debug, Clone)]
pub struct ImageContext {
    /// Encoder output (empty for backends that need none)
    pub embedding: ArrayD<f32>,
    /// Source image size `(width, height)`
    pub original_size: (u32, u32),
    /// Size of the resized image fed to the encoder `(width, height)`
    pub input_size: (u32, u32),
}

impl ImageContext {
    /// Context for backends that work on the source image directly
    #[must_use]
    pub fn without_embedding(original_size: (u32, u32)) -> Self {
        Self {
            embedding: ArrayD::zeros(IxDyn(&[0])),
            original_size,
            input_size: original_size,
        }
    }
}

/// One mask hypothesis returned by a backend
#[derive(Debug, Clone)]
pub struct MaskCandidate {
    pub mask: BinaryMask,
    /// Predicted IoU / confidence
    pub score: f32,
}

/// Trait for box-prompted segmentation backends
pub trait SegmentationBackend: Send {
    /// Initialize the backend with the given configuration
    ///
    /// Returns the model loading time, or `None` when nothing was loaded.
    ///
    /// # Errors
    /// - Model files missing or unreadable
    /// - Runtime session creation failures
    fn initialize(&mut self, config: &CutoutConfig) -> Result<Option<Duration>>;

    /// Run the image encoder and return the per-request context
    ///
    /// # Errors
    /// - Backend not initialized
    /// - Encoder inference failures
    fn encode(&mut self, image: &RgbImage) -> Result<ImageContext>;

    /// Predict masks for one box prompt against an encoded image
    ///
    /// Masks have the context's original size. With `multimask_output == false`
    /// a single best mask is requested.
    ///
    /// # Errors
    /// - Backend not initialized
    /// - Decoder inference failures
    fn predict(
        &mut self,
        context: &ImageContext,
        prompt: &BoxPrompt,
        multimask_output: bool,
    ) -> Result<Vec<MaskCandidate>>;

    /// Short backend name for logs
    fn name(&self) -> &'static str;

    /// Check if backend is initialized
    fn is_initialized(&self) -> bool;
}

/// Pick one candidate according to `selection`
///
/// # Errors
/// - The backend returned no candidates
pub fn select_mask(candidates: Vec<MaskCandidate>, selection: MaskSelection) -> Result<MaskCandidate> {
    let chosen = match selection {
        MaskSelection::First => candidates.into_iter().next(),
        MaskSelection::HighestScore => candidates
            .into_iter()
            .reduce(|best, next| if next.score > best.score { next } else { best }),
    };

    chosen.ok_or_else(|| CutoutError::inference("Segmentation model returned no masks"))
}
