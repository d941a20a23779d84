//! Deterministic backend for tests and offline runs
//!
//! [`MockBackend`] needs no model files. By default it answers every prompt with
//! the prompt rectangle itself, clipped to the image. Scripted candidates and
//! failure injection let tests drive every branch of the pipeline.

use crate::{
    config::CutoutConfig,
    error::{CutoutError, Result},
    inference::{ImageContext, MaskCandidate, SegmentationBackend},
    types::{BinaryMask, BoxPrompt},
};
use image::RgbImage;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Score reported for the default box-shaped mask
pub const DEFAULT_MOCK_SCORE: f32 = 0.9;

/// Box-shaped segmentation oracle
#[derive(Debug, Clone, Default)]
pub struct MockBackend {
    initialized: bool,
    /// Candidates returned instead of the box mask; resized masks are not produced
    scripted: Option<Vec<MaskCandidate>>,
    call_history: Arc<Mutex<Vec<String>>>,
    should_fail_init: bool,
    should_fail_encode: bool,
    should_fail_predict: bool,
}

impl MockBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Return these candidates from every `predict` call
    #[must_use]
    pub fn with_candidates(candidates: Vec<MaskCandidate>) -> Self {
        Self {
            scripted: Some(candidates),
            ..Self::default()
        }
    }

    /// Create a mock backend that will fail during initialization
    #[must_use]
    pub fn new_failing_init() -> Self {
        Self {
            should_fail_init: true,
            ..Self::default()
        }
    }

    /// Create a mock backend whose image encoder fails
    #[must_use]
    pub fn new_failing_encode() -> Self {
        Self {
            should_fail_encode: true,
            ..Self::default()
        }
    }

    /// Create a mock backend whose prompt decoder fails
    #[must_use]
    pub fn new_failing_predict() -> Self {
        Self {
            should_fail_predict: true,
            ..Self::default()
        }
    }

    /// Get the call history for verification in tests
    ///
    /// Clones share one history.
    #[must_use]
    pub fn call_history(&self) -> Vec<String> {
        self.call_history
            .lock()
            .map(|history| history.clone())
            .unwrap_or_default()
    }

    pub fn clear_call_history(&self) {
        if let Ok(mut history) = self.call_history.lock() {
            history.clear();
        }
    }

    fn record_call(&self, method: &str) {
        if let Ok(mut history) = self.call_history.lock() {
            history.push(method.to_string());
        }
    }

    /// The prompt rectangle, clipped to `(width, height)`
    #[must_use]
    pub fn box_mask(prompt: &BoxPrompt, width: u32, height: u32) -> BinaryMask {
        BinaryMask::from_fn(width, height, |x, y| {
            let (x, y) = (i64::from(x), i64::from(y));
            x >= i64::from(prompt.x1)
                && x < i64::from(prompt.x2)
                && y >= i64::from(prompt.y1)
                && y < i64::from(prompt.y2)
        })
    }
}

impl SegmentationBackend for MockBackend {
    fn initialize(&mut self, _config: &CutoutConfig) -> Result<Option<Duration>> {
        self.record_call("initialize");

        if self.should_fail_init {
            return Err(CutoutError::model("Mock backend initialization failed"));
        }

        self.initialized = true;
        Ok(Some(Duration::from_millis(1)))
    }

    fn encode(&mut self, image: &RgbImage) -> Result<ImageContext> {
        self.record_call("encode");

        if !self.initialized {
            return Err(CutoutError::inference("Mock backend not initialized"));
        }
        if self.should_fail_encode {
            return Err(CutoutError::inference("Mock image encoder failed"));
        }

        Ok(ImageContext::without_embedding(image.dimensions()))
    }

    fn predict(
        &mut self,
        context: &ImageContext,
        prompt: &BoxPrompt,
        multimask_output: bool,
    ) -> Result<Vec<MaskCandidate>> {
        self.record_call("predict");

        if !self.initialized {
            return Err(CutoutError::inference("Mock backend not initialized"));
        }
        if self.should_fail_predict {
            return Err(CutoutError::inference("Mock prompt decoder failed"));
        }

        if let Some(candidates) = &self.scripted {
            return Ok(candidates.clone());
        }

        let (width, height) = context.original_size;
        let mask = Self::box_mask(prompt, width, height);
        let mut candidates = vec![MaskCandidate {
            mask,
            score: DEFAULT_MOCK_SCORE,
        }];
        if multimask_output {
            candidates.push(MaskCandidate {
                mask: BinaryMask::filled(width, height, false),
                score: 0.1,
            });
        }
        Ok(candidates)
    }

    fn name(&self) -> &'static str {
        "mock"
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }
}
