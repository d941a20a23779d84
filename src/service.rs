//! Shared segmentation service for concurrent callers
//!
//! The service is built once at startup and handed to request handlers behind
//! an `Arc`. Model state lives in a single processor guarded by a mutex, so one
//! request runs inference at a time while decoding and I/O stay concurrent.

use crate::{
    config::CutoutConfig,
    error::{CutoutError, Result},
    processor::{BackendType, CutoutProcessor},
    types::{BoxPrompt, CutoutResult},
};
use image::DynamicImage;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

/// Dependency-injected cutout service with one inference slot
#[derive(Clone)]
pub struct SegmentationService {
    processor: Arc<Mutex<CutoutProcessor>>,
    backend_name: &'static str,
}

impl SegmentationService {
    /// Wrap a processor and initialize its backend eagerly
    ///
    /// # Errors
    /// - Model loading failures
    pub fn new(mut processor: CutoutProcessor) -> Result<Self> {
        processor.initialize()?;
        let backend_name = processor.backend_name();
        info!(backend = backend_name, "Segmentation service ready");

        Ok(Self {
            processor: Arc::new(Mutex::new(processor)),
            backend_name,
        })
    }

    /// Build the processor from a configuration and backend type
    ///
    /// # Errors
    /// - Invalid configuration
    /// - Model loading failures
    pub fn from_config(config: CutoutConfig, backend_type: BackendType) -> Result<Self> {
        Self::new(CutoutProcessor::new(config, backend_type)?)
    }

    #[must_use]
    pub fn backend_name(&self) -> &'static str {
        self.backend_name
    }

    /// Run the full cutout pipeline off the async runtime
    ///
    /// Requests queue on the inference slot and each one completes before the
    /// next starts.
    ///
    /// # Errors
    /// - Everything [`CutoutProcessor::process_image`] can return
    /// - The worker task panicked or the slot was poisoned
    pub async fn cutout(&self, image: DynamicImage, prompt: BoxPrompt) -> Result<CutoutResult> {
        let processor = Arc::clone(&self.processor);

        tokio::task::spawn_blocking(move || {
            let mut guard = processor
                .lock()
                .map_err(|_| CutoutError::internal("Inference slot poisoned by an earlier panic"))?;
            debug!(prompt = %prompt, "Inference slot acquired");
            guard.process_image(&image, &prompt)
        })
        .await
        .map_err(|e| CutoutError::internal(format!("Cutout task failed: {e}")))?
    }

    /// Blocking variant of [`Self::cutout`] for synchronous callers
    ///
    /// # Errors
    /// - Everything [`CutoutProcessor::process_image`] can return
    pub fn cutout_blocking(&self, image: &DynamicImage, prompt: &BoxPrompt) -> Result<CutoutResult> {
        let mut guard = self
            .processor
            .lock()
            .map_err(|_| CutoutError::internal("Inference slot poisoned by an earlier panic"))?;
        guard.process_image(image, prompt)
    }
}

impl std::fmt::Debug for SegmentationService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SegmentationService")
            .field("backend", &self.backend_name)
            .finish_non_exhaustive()
    }
}
