//! ONNX Runtime backend for Segment Anything
//!
//! Runs the exported SAM image encoder and prompt decoder as two sessions. The
//! decoder graph is the one produced by the official export script: positional
//! inputs `image_embeddings, point_coords, point_labels, mask_input,
//! has_mask_input, orig_im_size` and outputs `masks, iou_predictions, ...`.

use crate::config::{CutoutConfig, ExecutionProvider};
use crate::error::{CutoutError, Result};
use crate::inference::{ImageContext, MaskCandidate, SegmentationBackend};
use crate::types::{BinaryMask, BoxPrompt};
use crate::utils::SamPreprocessor;
use image::RgbImage;
use ndarray::{Array1, Array2, Array3, Array4, ArrayViewD, Ix4};
use ort::execution_providers::{
    CUDAExecutionProvider, CoreMLExecutionProvider, ExecutionProvider as OrtExecutionProvider,
};
use ort::session::{builder::GraphOptimizationLevel, builder::SessionBuilder, Session};
use ort::value::Value;
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Point label for the top-left box corner
const BOX_TOP_LEFT_LABEL: f32 = 2.0;
/// Point label for the bottom-right box corner
const BOX_BOTTOM_RIGHT_LABEL: f32 = 3.0;
/// Side of the low-resolution mask prompt
const MASK_INPUT_SIZE: usize = 256;

fn tensor_error(name: &'static str) -> impl FnOnce(ort::Error) -> CutoutError {
    move |e| CutoutError::processing(format!("Failed to convert {name} tensor: {e}"))
}

/// ONNX Runtime backend for the SAM encoder/decoder pair
#[derive(Debug, Default)]
pub struct SamOnnxBackend {
    encoder: Option<Session>,
    decoder: Option<Session>,
    preprocessor: SamPreprocessor,
    mask_threshold: f32,
    initialized: bool,
}

impl SamOnnxBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// List ONNX Runtime execution providers with availability and description
    ///
    /// # Examples
    /// ```rust,no_run
    /// use boxcut::backends::SamOnnxBackend;
    ///
    /// for (name, available, description) in SamOnnxBackend::list_providers() {
    ///     println!("{name}: {available} - {description}");
    /// }
    /// ```
    #[must_use]
    pub fn list_providers() -> Vec<(String, bool, String)> {
        debug!(
            os = std::env::consts::OS,
            arch = std::env::consts::ARCH,
            "Checking execution providers"
        );

        let cuda_available =
            OrtExecutionProvider::is_available(&CUDAExecutionProvider::default()).unwrap_or(false);
        let coreml_available =
            OrtExecutionProvider::is_available(&CoreMLExecutionProvider::default()).unwrap_or(false);

        vec![
            (
                "CPU".to_string(),
                true,
                "Always available, uses CPU for inference".to_string(),
            ),
            (
                "CUDA".to_string(),
                cuda_available,
                "NVIDIA GPU acceleration (requires CUDA toolkit and compatible GPU)".to_string(),
            ),
            (
                "CoreML".to_string(),
                coreml_available,
                "Apple Silicon GPU acceleration (macOS only)".to_string(),
            ),
        ]
    }

    fn configure_providers(
        session_builder: SessionBuilder,
        provider: ExecutionProvider,
    ) -> Result<SessionBuilder> {
        let cuda = CUDAExecutionProvider::default();
        let coreml = CoreMLExecutionProvider::default();
        let cuda_available = OrtExecutionProvider::is_available(&cuda).unwrap_or(false);
        let coreml_available = OrtExecutionProvider::is_available(&coreml).unwrap_or(false);

        let providers = match provider {
            ExecutionProvider::Auto => {
                let mut providers = Vec::new();
                if cuda_available {
                    info!("🚀 CUDA execution provider is available and will be used");
                    providers.push(cuda.build());
                }
                if coreml_available {
                    info!("🍎 CoreML execution provider is available and will be used");
                    providers.push(coreml.with_subgraphs(true).build());
                }
                if providers.is_empty() {
                    warn!("No hardware acceleration available, falling back to CPU");
                }
                providers
            },
            ExecutionProvider::Cpu => {
                info!("Using CPU execution provider");
                Vec::new()
            },
            ExecutionProvider::Cuda => {
                if cuda_available {
                    info!("Using CUDA execution provider");
                    vec![cuda.build()]
                } else {
                    warn!("CUDA execution provider requested but not available, falling back to CPU");
                    Vec::new()
                }
            },
            ExecutionProvider::CoreMl => {
                if coreml_available {
                    info!("🍎 Using CoreML execution provider (explicitly requested)");
                    vec![coreml.with_subgraphs(true).build()]
                } else {
                    warn!("CoreML execution provider requested but not available, falling back to CPU");
                    Vec::new()
                }
            },
        };

        if providers.is_empty() {
            return Ok(session_builder);
        }

        session_builder.with_execution_providers(providers).map_err(|e| {
            CutoutError::inference(format!("Failed to set execution providers: {e}"))
        })
    }

    fn thread_counts(config: &CutoutConfig) -> (usize, usize) {
        let cores = std::thread::available_parallelism()
            .map(std::num::NonZeroUsize::get)
            .unwrap_or(8);
        let intra = if config.intra_threads > 0 {
            config.intra_threads
        } else {
            cores
        };
        let inter = if config.inter_threads > 0 {
            config.inter_threads
        } else {
            (cores / 4).max(1)
        };
        (intra, inter)
    }

    fn load_session(path: &Path, role: &str, config: &CutoutConfig) -> Result<Session> {
        if !path.is_file() {
            return Err(CutoutError::model_error_with_context(
                "load",
                path,
                &format!("{role} file not found"),
                &[
                    "export the ONNX model with the segment-anything export script",
                    "pass the path with --encoder/--decoder or BOXCUT_ENCODER/BOXCUT_DECODER",
                ],
            ));
        }

        let session_builder = Session::builder()
            .map_err(|e| CutoutError::inference(format!("Failed to create session builder: {e}")))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| CutoutError::inference(format!("Failed to set optimization level: {e}")))?;

        let session_builder = Self::configure_providers(session_builder, config.execution_provider)?;
        let (intra_threads, inter_threads) = Self::thread_counts(config);

        let session = session_builder
            .with_intra_threads(intra_threads)
            .map_err(|e| CutoutError::inference(format!("Failed to set intra threads: {e}")))?
            .with_inter_threads(inter_threads)
            .map_err(|e| CutoutError::inference(format!("Failed to set inter threads: {e}")))?
            .commit_from_file(path)
            .map_err(|e| {
                CutoutError::model_error_with_context("load", path, &e.to_string(), &[])
            })?;

        debug!(
            role,
            path = %path.display(),
            intra_threads,
            inter_threads,
            provider = %config.execution_provider,
            "ONNX Runtime session created"
        );

        Ok(session)
    }

    /// Threshold decoder logits into one mask per candidate channel
    fn masks_from_logits(
        logits: &ArrayViewD<'_, f32>,
        expected: (u32, u32),
        threshold: f32,
    ) -> Result<Vec<BinaryMask>> {
        let logits = logits
            .view()
            .into_dimensionality::<Ix4>()
            .map_err(|e| CutoutError::inference(format!("Expected 4D mask logits: {e}")))?;
        let (_, candidates, height, width) = logits.dim();
        let actual = (width as u32, height as u32);
        if actual != expected {
            return Err(CutoutError::shape_mismatch(expected, actual));
        }

        (0..candidates)
            .map(|c| {
                let channel = logits.slice(ndarray::s![0, c, .., ..]);
                let data: Vec<bool> = channel.iter().map(|&v| v > threshold).collect();
                BinaryMask::new(data, actual)
            })
            .collect()
    }

    /// Pair decoder masks with their scores
    ///
    /// Output 0 comes from the single-mask token; the rest are the multimask
    /// proposals. Decoders exported with a single output keep it in both modes.
    fn decoder_candidates(masks: Vec<BinaryMask>, scores: &[f32], multimask_output: bool) -> Vec<MaskCandidate> {
        let skip = usize::from(multimask_output && masks.len() > 1);
        let take = if multimask_output { usize::MAX } else { 1 };

        masks
            .into_iter()
            .zip(scores.iter().copied().chain(std::iter::repeat(0.0)))
            .skip(skip)
            .take(take)
            .map(|(mask, score)| MaskCandidate { mask, score })
            .collect()
    }
}

impl SegmentationBackend for SamOnnxBackend {
    fn initialize(&mut self, config: &CutoutConfig) -> Result<Option<Duration>> {
        if self.initialized {
            return Ok(None);
        }

        let start = Instant::now();
        self.encoder = Some(Self::load_session(&config.model.encoder_path, "encoder", config)?);
        self.decoder = Some(Self::load_session(&config.model.decoder_path, "decoder", config)?);
        self.mask_threshold = config.mask_threshold;
        self.initialized = true;

        let elapsed = start.elapsed();
        info!(
            load_ms = elapsed.as_millis() as u64,
            "📊 SAM encoder and decoder loaded"
        );
        Ok(Some(elapsed))
    }

    fn encode(&mut self, image: &RgbImage) -> Result<ImageContext> {
        let encoder = self
            .encoder
            .as_mut()
            .ok_or_else(|| CutoutError::inference("Backend not initialized"))?;

        let (input, input_size) = self.preprocessor.preprocess(image)?;
        let input_value = Value::from_array(input).map_err(tensor_error("image"))?;

        let start = Instant::now();
        let outputs = encoder
            .run(ort::inputs![input_value])
            .map_err(|e| CutoutError::inference(format!("Image encoder failed: {e}")))?;

        let keys: Vec<_> = outputs.keys().collect();
        let first_key = keys
            .first()
            .ok_or_else(|| CutoutError::inference("Image encoder produced no outputs"))?;
        let embedding = outputs
            .get(first_key)
            .ok_or_else(|| CutoutError::inference("Image embedding output not found"))?
            .try_extract_array::<f32>()
            .map_err(|e| CutoutError::inference(format!("Failed to extract image embedding: {e}")))?
            .to_owned();

        debug!(
            shape = ?embedding.shape(),
            encode_ms = start.elapsed().as_millis() as u64,
            "Image embedding computed"
        );

        Ok(ImageContext {
            embedding,
            original_size: image.dimensions(),
            input_size,
        })
    }

    fn predict(
        &mut self,
        context: &ImageContext,
        prompt: &BoxPrompt,
        multimask_output: bool,
    ) -> Result<Vec<MaskCandidate>> {
        let decoder = self
            .decoder
            .as_mut()
            .ok_or_else(|| CutoutError::inference("Backend not initialized"))?;

        let (width, height) = context.original_size;
        let [x1, y1, x2, y2] = SamPreprocessor::scale_box(prompt, context.original_size, context.input_size);

        let embedding = context.embedding.clone().into_dimensionality::<Ix4>().map_err(|e| {
            CutoutError::inference(format!("Image embedding has unexpected shape: {e}"))
        })?;
        let point_coords = Array3::from_shape_vec((1, 2, 2), vec![x1, y1, x2, y2])
            .map_err(|e| CutoutError::internal(format!("point coords: {e}")))?;
        let point_labels = Array2::from_shape_vec(
            (1, 2),
            vec![BOX_TOP_LEFT_LABEL, BOX_BOTTOM_RIGHT_LABEL],
        )
        .map_err(|e| CutoutError::internal(format!("point labels: {e}")))?;
        let mask_input = Array4::<f32>::zeros((1, 1, MASK_INPUT_SIZE, MASK_INPUT_SIZE));
        let has_mask_input = Array1::from_vec(vec![0.0_f32]);
        let orig_im_size = Array1::from_vec(vec![height as f32, width as f32]);

        let inputs = ort::inputs![
            Value::from_array(embedding).map_err(tensor_error("image_embeddings"))?,
            Value::from_array(point_coords).map_err(tensor_error("point_coords"))?,
            Value::from_array(point_labels).map_err(tensor_error("point_labels"))?,
            Value::from_array(mask_input).map_err(tensor_error("mask_input"))?,
            Value::from_array(has_mask_input).map_err(tensor_error("has_mask_input"))?,
            Value::from_array(orig_im_size).map_err(tensor_error("orig_im_size"))?
        ];

        let start = Instant::now();
        let outputs = decoder
            .run(inputs)
            .map_err(|e| CutoutError::inference(format!("Prompt decoder failed: {e}")))?;

        let keys: Vec<_> = outputs.keys().collect();
        let (Some(mask_key), Some(score_key)) = (keys.first(), keys.get(1)) else {
            return Err(CutoutError::inference(format!(
                "Prompt decoder returned {} outputs, expected masks and scores",
                keys.len()
            )));
        };

        let logits = outputs
            .get(mask_key)
            .ok_or_else(|| CutoutError::inference("Mask output not found"))?
            .try_extract_array::<f32>()
            .map_err(|e| CutoutError::inference(format!("Failed to extract masks: {e}")))?;
        let scores: Vec<f32> = outputs
            .get(score_key)
            .ok_or_else(|| CutoutError::inference("Score output not found"))?
            .try_extract_array::<f32>()
            .map_err(|e| CutoutError::inference(format!("Failed to extract scores: {e}")))?
            .iter()
            .copied()
            .collect();

        let masks = Self::masks_from_logits(&logits, (width, height), self.mask_threshold)?;
        let candidates = Self::decoder_candidates(masks, &scores, multimask_output);

        debug!(
            candidates = candidates.len(),
            predict_ms = start.elapsed().as_millis() as u64,
            "Masks decoded"
        );

        Ok(candidates)
    }

    fn name(&self) -> &'static str {
        "onnx"
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }
}
