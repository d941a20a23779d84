//! Box-prompted cutout processor
//!
//! `CutoutProcessor` owns one segmentation backend and the post-processing
//! stages. Both the CLI and the HTTP service drive it, so the two surfaces
//! always produce identical cutouts.

use crate::{
    backends::MockBackend,
    config::CutoutConfig,
    error::{CutoutError, Result},
    inference::{select_mask, MaskCandidate, SegmentationBackend},
    postprocessing::PostprocessPipeline,
    services::ImageIOService,
    types::{BinaryMask, BoxPrompt, CutoutResult, ProcessingTimings},
    utils::{validate_image_dimensions, validate_prompt},
};
use image::DynamicImage;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info, instrument, span, Level};

/// Backend type enumeration for runtime selection
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackendType {
    /// ONNX Runtime running the SAM encoder and decoder
    Onnx,
    /// Box-shaped masks, no model files needed
    Mock,
}

impl std::fmt::Display for BackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Onnx => write!(f, "onnx"),
            Self::Mock => write!(f, "mock"),
        }
    }
}

/// Factory trait for creating segmentation backends
pub trait BackendFactory: Send + Sync {
    /// Create a backend instance of the specified type
    ///
    /// # Errors
    /// - Backend type not compiled in
    fn create_backend(&self, backend_type: BackendType) -> Result<Box<dyn SegmentationBackend>>;

    /// List available backend types
    fn available_backends(&self) -> Vec<BackendType>;
}

/// Creates the backends compiled into this build
pub struct DefaultBackendFactory;

impl BackendFactory for DefaultBackendFactory {
    fn create_backend(&self, backend_type: BackendType) -> Result<Box<dyn SegmentationBackend>> {
        match backend_type {
            #[cfg(feature = "onnx")]
            BackendType::Onnx => Ok(Box::new(crate::backends::SamOnnxBackend::new())),
            #[cfg(not(feature = "onnx"))]
            BackendType::Onnx => Err(CutoutError::invalid_config(
                "ONNX backend not compiled in; enable the `onnx` feature",
            )),
            BackendType::Mock => Ok(Box::new(MockBackend::new())),
        }
    }

    fn available_backends(&self) -> Vec<BackendType> {
        let mut backends = Vec::new();
        #[cfg(feature = "onnx")]
        backends.push(BackendType::Onnx);
        backends.push(BackendType::Mock);
        backends
    }
}

/// Segmentation plus mask post-processing for one image at a time
pub struct CutoutProcessor {
    config: CutoutConfig,
    backend: Box<dyn SegmentationBackend>,
    pipeline: PostprocessPipeline,
    /// Load time not yet reported in a result
    pending_load_ms: Option<u64>,
}

impl CutoutProcessor {
    /// Create a processor with a backend from the default factory
    ///
    /// # Errors
    /// - Invalid configuration
    /// - Backend type not compiled in
    pub fn new(config: CutoutConfig, backend_type: BackendType) -> Result<Self> {
        Self::with_factory(config, backend_type, &DefaultBackendFactory)
    }

    /// Create a processor with a backend from a custom factory
    ///
    /// # Errors
    /// - Invalid configuration
    /// - Factory failures
    pub fn with_factory(
        config: CutoutConfig,
        backend_type: BackendType,
        factory: &dyn BackendFactory,
    ) -> Result<Self> {
        let backend = factory.create_backend(backend_type)?;
        Self::with_backend(config, backend)
    }

    /// Create a processor around an already constructed backend
    ///
    /// # Errors
    /// - Invalid configuration
    pub fn with_backend(config: CutoutConfig, backend: Box<dyn SegmentationBackend>) -> Result<Self> {
        config.validate()?;
        let pipeline = PostprocessPipeline::from_config(&config.postprocess)?;
        Ok(Self {
            config,
            backend,
            pipeline,
            pending_load_ms: None,
        })
    }

    /// Load the backend's models; later calls are no-ops
    ///
    /// # Errors
    /// - Model loading failures
    pub fn initialize(&mut self) -> Result<()> {
        if self.backend.is_initialized() {
            return Ok(());
        }

        info!(backend = self.backend.name(), "Initializing cutout processor");
        debug!(model = ?self.config.model, provider = %self.config.execution_provider, "Model configuration");

        let load_time = self.backend.initialize(&self.config)?;
        self.pending_load_ms = load_time.map(|d| d.as_millis() as u64);

        info!(backend = self.backend.name(), "Cutout processor initialized");
        Ok(())
    }

    /// Predict the object mask for `prompt`
    ///
    /// # Errors
    /// - Prompt outside the image or degenerate
    /// - Backend failures
    pub fn segment(&mut self, image: &DynamicImage, prompt: &BoxPrompt) -> Result<BinaryMask> {
        self.segment_candidate(image, prompt, &mut ProcessingTimings::default())
            .map(|candidate| candidate.mask)
    }

    fn segment_candidate(
        &mut self,
        image: &DynamicImage,
        prompt: &BoxPrompt,
        timings: &mut ProcessingTimings,
    ) -> Result<MaskCandidate> {
        let (width, height) = (image.width(), image.height());
        validate_image_dimensions(width, height)?;
        validate_prompt(prompt, width, height)?;
        self.initialize()?;

        let context = {
            let _span = span!(Level::DEBUG, "encode", width, height).entered();
            let start = Instant::now();
            let context = self.backend.encode(&image.to_rgb8())?;
            timings.encode_ms = start.elapsed().as_millis() as u64;
            context
        };

        let candidate = {
            let _span = span!(Level::DEBUG, "predict", prompt = %prompt).entered();
            let start = Instant::now();
            let candidates = self
                .backend
                .predict(&context, prompt, self.config.multimask_output)?;
            debug!(count = candidates.len(), "Mask candidates returned");
            let candidate = select_mask(candidates, self.config.mask_selection)?;
            timings.predict_ms = start.elapsed().as_millis() as u64;
            candidate
        };

        if candidate.mask.dimensions() != (width, height) {
            return Err(CutoutError::shape_mismatch((width, height), candidate.mask.dimensions()));
        }

        Ok(candidate)
    }

    /// Segment, clean, composite and crop
    ///
    /// # Errors
    /// - Prompt outside the image or degenerate
    /// - Backend failures
    /// - Mask and image dimensions differ
    #[instrument(
        skip(self, image, prompt),
        fields(
            backend = self.backend.name(),
            dimensions = %format!("{}x{}", image.width(), image.height()),
            prompt = %prompt
        )
    )]
    pub fn process_image(&mut self, image: &DynamicImage, prompt: &BoxPrompt) -> Result<CutoutResult> {
        let total_start = Instant::now();
        let mut timings = ProcessingTimings::default();
        let original_dimensions = (image.width(), image.height());

        info!("🎯 Starting cutout");

        let candidate = self.segment_candidate(image, prompt, &mut timings)?;
        timings.model_load_ms = self.pending_load_ms.take().unwrap_or(0);

        let (cleaned, cropped) = self
            .pipeline
            .run_with_timings(image, &candidate.mask, &mut timings)?;

        timings.total_ms = total_start.elapsed().as_millis() as u64;

        info!(
            outcome = cropped.outcome.as_str(),
            bounds = ?cropped.outcome.bounds(),
            score = candidate.score,
            total_ms = timings.total_ms,
            inference_ratio = timings.inference_ratio(),
            "✅ Cutout complete"
        );
        if self.config.debug {
            debug!("{}", timings.summary());
        }

        Ok(CutoutResult {
            image: cropped.image,
            outcome: cropped.outcome,
            mask: cleaned,
            score: candidate.score,
            prompt: *prompt,
            original_dimensions,
            timings,
        })
    }

    /// Decode image bytes (orientation-corrected) and process them
    ///
    /// # Errors
    /// - Undecodable image data
    /// - Everything [`Self::process_image`] can return
    pub fn process_bytes(&mut self, image_bytes: &[u8], prompt: &BoxPrompt) -> Result<CutoutResult> {
        let image = ImageIOService::decode_upload(image_bytes)?;
        self.process_image(&image, prompt)
    }

    /// Load an image file and process it
    ///
    /// # Errors
    /// - File I/O or decoding errors
    /// - Everything [`Self::process_image`] can return
    pub fn process_file<P: AsRef<Path>>(&mut self, path: P, prompt: &BoxPrompt) -> Result<CutoutResult> {
        let image = ImageIOService::load_image(path)?;
        self.process_image(&image, prompt)
    }

    #[must_use]
    pub fn config(&self) -> &CutoutConfig {
        &self.config
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.backend.is_initialized()
    }

    #[must_use]
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }
}

impl std::fmt::Debug for CutoutProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CutoutProcessor")
            .field("backend", &self.backend.name())
            .field("initialized", &self.backend.is_initialized())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
