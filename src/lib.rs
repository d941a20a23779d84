#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::uninlined_format_args)]

//! # boxcut
//!
//! Box-prompted object cutouts. A Segment Anything model turns an image and a
//! bounding box into a binary mask; the mask is closed, feathered into an alpha
//! channel and the result is cropped to the visible object as a transparent PNG.
//!
//! ## Features
//!
//! - **SAM ONNX backend**: encoder and prompt decoder run through ONNX Runtime
//! - **Hardware Acceleration**: CUDA, `CoreML`, and CPU execution providers
//! - **Deterministic post-processing**: morphological closing, Gaussian alpha
//!   feathering and bounding-box cropping
//! - **Mock backend**: the whole pipeline runs without model files
//! - **CLI and HTTP service**: `boxcut cut` and `boxcut serve`
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use boxcut::{cutout_from_bytes, BoxPrompt, CutoutConfig, ExecutionProvider};
//!
//! # async fn example(upload: Vec<u8>) -> anyhow::Result<()> {
//! let config = CutoutConfig::builder()
//!     .execution_provider(ExecutionProvider::Auto)
//!     .build()?;
//! let result = cutout_from_bytes(upload, BoxPrompt::new(40, 30, 420, 380), config).await?;
//! result.save_png("cutout.png")?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Post-processing only
//!
//! The stages are usable on their own with masks from any source:
//!
//! ```rust
//! use boxcut::{postprocessing::PostprocessPipeline, BinaryMask, CropOutcome};
//! use image::{DynamicImage, Rgb, RgbImage};
//!
//! let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(40, 40, Rgb([200, 10, 10])));
//! let mask = BinaryMask::from_fn(40, 40, |x, y| (10..30).contains(&x) && (10..30).contains(&y));
//!
//! let cropped = PostprocessPipeline::default().run(&image, &mask).unwrap();
//! assert!(matches!(cropped.outcome, CropOutcome::Cropped(_)));
//! ```
//!
//! ### Feature Flags
//!
//! - `onnx` (default): ONNX Runtime SAM backend
//! - `cli` (default): command-line interface and subscriber setup
//! - `server` (default): axum HTTP service
//! - `tracing-json`: JSON log output

pub mod backends;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod error;
pub mod inference;
pub mod postprocessing;
pub mod processor;
#[cfg(feature = "server")]
pub mod server;
pub mod service;
pub mod services;
pub mod tracing_config;
pub mod types;
pub mod utils;

// Public API exports
pub use backends::*;
pub use config::{
    CutoutConfig, CutoutConfigBuilder, ExecutionProvider, MaskSelection, PostprocessConfig,
    SamModelSpec, ServerConfig,
};
pub use error::{CutoutError, Result};
pub use inference::{select_mask, ImageContext, MaskCandidate, SegmentationBackend};
pub use postprocessing::{AlphaCompositor, BoundsCropper, MaskCleaner, PostprocessPipeline};
pub use processor::{BackendFactory, BackendType, CutoutProcessor, DefaultBackendFactory};
pub use service::SegmentationService;
pub use services::ImageIOService;
pub use types::{
    BinaryMask, BoxPrompt, CropOutcome, CroppedImage, CutoutResult, MaskStatistics, PixelBounds,
    ProcessingTimings,
};

#[cfg(feature = "cli")]
pub use tracing_config::init_cli_tracing;
pub use tracing_config::{spans, TracingConfig, TracingFormat};

/// Cut the object inside `prompt` out of an encoded image
///
/// Decodes the bytes (orientation-corrected), loads the SAM model described by
/// `config` and runs the whole pipeline on a blocking worker. Long-lived callers
/// should build a [`SegmentationService`] once instead of paying the model load
/// on every call.
///
/// # Errors
/// - Undecodable image data
/// - Invalid prompt for the decoded image
/// - Model loading or inference failures
pub async fn cutout_from_bytes(
    image_bytes: Vec<u8>,
    prompt: BoxPrompt,
    config: CutoutConfig,
) -> Result<CutoutResult> {
    let image = ImageIOService::decode_upload(&image_bytes)?;
    cutout_from_image(image, prompt, config).await
}

/// Cut the object inside `prompt` out of an already decoded image
///
/// # Errors
/// - Invalid prompt for the image
/// - Model loading or inference failures
///
/// # Examples
///
/// ```rust,no_run
/// use boxcut::{cutout_from_image, BoxPrompt, CutoutConfig};
///
/// # async fn example() -> anyhow::Result<()> {
/// let image = image::open("photo.jpg")?;
/// let result = cutout_from_image(image, BoxPrompt::new(10, 10, 200, 150), CutoutConfig::default()).await?;
/// println!("{:?}", result.outcome);
/// # Ok(())
/// # }
/// ```
pub async fn cutout_from_image(
    image: image::DynamicImage,
    prompt: BoxPrompt,
    config: CutoutConfig,
) -> Result<CutoutResult> {
    tokio::task::spawn_blocking(move || {
        let mut processor = CutoutProcessor::new(config, BackendType::Onnx)?;
        processor.process_image(&image, &prompt)
    })
    .await
    .map_err(|e| CutoutError::internal(format!("Cutout task failed: {e}")))?
}
