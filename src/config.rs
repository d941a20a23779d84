//! Configuration types for cutout operations

use crate::error::{CutoutError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Largest closing kernel accepted; the morphology radius must fit in a `u8`
pub const MAX_CLOSING_KERNEL_SIZE: u32 = 255;

/// Largest blur kernel accepted
pub const MAX_BLUR_KERNEL_SIZE: u32 = 31;

/// Execution provider options for ONNX Runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionProvider {
    /// Auto-detect best available provider (CUDA > `CoreML` > CPU)
    #[default]
    Auto,
    /// CPU execution (always available)
    Cpu,
    /// NVIDIA CUDA GPU acceleration
    Cuda,
    /// Apple Silicon GPU acceleration
    CoreMl,
}

impl std::fmt::Display for ExecutionProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Cpu => write!(f, "cpu"),
            Self::Cuda => write!(f, "cuda"),
            Self::CoreMl => write!(f, "coreml"),
        }
    }
}

impl std::str::FromStr for ExecutionProvider {
    type Err = CutoutError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "cpu" => Ok(Self::Cpu),
            "cuda" => Ok(Self::Cuda),
            "coreml" => Ok(Self::CoreMl),
            other => Err(CutoutError::invalid_config(format!(
                "Unknown execution provider '{}' (expected auto, cpu, cuda or coreml)",
                other
            ))),
        }
    }
}

/// Which candidate to keep when the model returns several masks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MaskSelection {
    /// First mask in model output order (the single-mask token)
    #[default]
    First,
    /// Mask with the highest predicted IoU
    HighestScore,
}

/// Paths to the two halves of an exported Segment Anything model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SamModelSpec {
    /// Image encoder (image -> embedding)
    pub encoder_path: PathBuf,
    /// Prompt decoder (embedding + box -> masks)
    pub decoder_path: PathBuf,
}

impl Default for SamModelSpec {
    fn default() -> Self {
        Self {
            encoder_path: PathBuf::from("checkpoints/sam_vit_h_encoder.onnx"),
            decoder_path: PathBuf::from("checkpoints/sam_vit_h_decoder.onnx"),
        }
    }
}

/// Mask clean-up and compositing parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostprocessConfig {
    /// Side of the square structuring element used for closing
    pub closing_kernel_size: u32,
    /// Side of the Gaussian kernel applied to the alpha channel
    pub blur_kernel_size: u32,
    /// Gaussian sigma; values <= 0 derive sigma from the kernel size
    pub blur_sigma: f32,
}

impl Default for PostprocessConfig {
    fn default() -> Self {
        Self {
            closing_kernel_size: 15,
            blur_kernel_size: 5,
            blur_sigma: 0.0,
        }
    }
}

impl PostprocessConfig {
    /// Validate kernel sizes
    ///
    /// # Errors
    /// - Closing kernel even, zero or above 255
    /// - Blur kernel even, zero or above 31
    pub fn validate(&self) -> Result<()> {
        let closing = self.closing_kernel_size;
        if closing == 0 || closing % 2 == 0 || closing > MAX_CLOSING_KERNEL_SIZE {
            return Err(CutoutError::config_value_error(
                "closing kernel size",
                closing,
                "odd, 1-255",
                Some(15),
            ));
        }

        let blur = self.blur_kernel_size;
        if blur == 0 || blur % 2 == 0 || blur > MAX_BLUR_KERNEL_SIZE {
            return Err(CutoutError::config_value_error(
                "blur kernel size",
                blur,
                "odd, 1-31",
                Some(5),
            ));
        }

        if !self.blur_sigma.is_finite() {
            return Err(CutoutError::invalid_config("blur sigma must be finite"));
        }

        Ok(())
    }
}

/// Configuration for segmentation and cutout operations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CutoutConfig {
    /// Segment Anything model files
    pub model: SamModelSpec,

    /// Execution provider for ONNX Runtime
    pub execution_provider: ExecutionProvider,

    /// Number of intra-op threads for inference (0 = auto)
    pub intra_threads: usize,

    /// Number of inter-op threads for inference (0 = auto)
    pub inter_threads: usize,

    /// Mask clean-up and compositing parameters
    pub postprocess: PostprocessConfig,

    /// Candidate selection when more than one mask comes back
    pub mask_selection: MaskSelection,

    /// Ask the model for several hypotheses instead of one
    pub multimask_output: bool,

    /// Logit threshold above which a pixel belongs to the object
    pub mask_threshold: f32,

    /// Enable debug mode (additional logging)
    pub debug: bool,
}

impl Default for CutoutConfig {
    fn default() -> Self {
        Self {
            model: SamModelSpec::default(),
            execution_provider: ExecutionProvider::default(),
            intra_threads: 0,
            inter_threads: 0,
            postprocess: PostprocessConfig::default(),
            mask_selection: MaskSelection::default(),
            multimask_output: false,
            mask_threshold: 0.0,
            debug: false,
        }
    }
}

impl CutoutConfig {
    /// Create a new configuration builder
    ///
    /// # Examples
    ///
    /// ```rust
    /// use boxcut::{CutoutConfig, ExecutionProvider};
    ///
    /// let config = CutoutConfig::builder()
    ///     .execution_provider(ExecutionProvider::Cpu)
    ///     .closing_kernel_size(21)
    ///     .build()
    ///     .unwrap();
    /// assert_eq!(config.postprocess.closing_kernel_size, 21);
    /// ```
    #[must_use]
    pub fn builder() -> CutoutConfigBuilder {
        CutoutConfigBuilder::default()
    }

    /// Validate all configuration parameters
    ///
    /// # Errors
    /// - Invalid post-processing kernel sizes
    /// - Non-finite mask threshold
    ///
    /// # Examples
    ///
    /// ```rust
    /// use boxcut::CutoutConfig;
    ///
    /// let mut config = CutoutConfig::default();
    /// assert!(config.validate().is_ok());
    ///
    /// config.postprocess.closing_kernel_size = 14;
    /// assert!(config.validate().is_err());
    /// ```
    pub fn validate(&self) -> Result<()> {
        self.postprocess.validate()?;

        if !self.mask_threshold.is_finite() {
            return Err(CutoutError::invalid_config("mask threshold must be finite"));
        }

        Ok(())
    }
}

/// Builder for `CutoutConfig`
#[derive(Debug, Default)]
pub struct CutoutConfigBuilder {
    config: CutoutConfig,
}

impl CutoutConfigBuilder {
    /// Set the model files
    #[must_use]
    pub fn model(mut self, model: SamModelSpec) -> Self {
        self.config.model = model;
        self
    }

    /// Set execution provider
    #[must_use]
    pub fn execution_provider(mut self, provider: ExecutionProvider) -> Self {
        self.config.execution_provider = provider;
        self
    }

    /// Set number of intra-op threads
    #[must_use]
    pub fn intra_threads(mut self, threads: usize) -> Self {
        self.config.intra_threads = threads;
        self
    }

    /// Set number of inter-op threads
    #[must_use]
    pub fn inter_threads(mut self, threads: usize) -> Self {
        self.config.inter_threads = threads;
        self
    }

    /// Set both intra and inter threads (`threads/2` inter, minimum 1; 0 = auto)
    #[must_use]
    pub fn num_threads(mut self, threads: usize) -> Self {
        self.config.intra_threads = threads;
        self.config.inter_threads = if threads > 0 { (threads / 2).max(1) } else { 0 };
        self
    }

    /// Set closing structuring element size
    #[must_use]
    pub fn closing_kernel_size(mut self, size: u32) -> Self {
        self.config.postprocess.closing_kernel_size = size;
        self
    }

    /// Set alpha blur kernel size
    #[must_use]
    pub fn blur_kernel_size(mut self, size: u32) -> Self {
        self.config.postprocess.blur_kernel_size = size;
        self
    }

    /// Set alpha blur sigma (<= 0 derives it from the kernel size)
    #[must_use]
    pub fn blur_sigma(mut self, sigma: f32) -> Self {
        self.config.postprocess.blur_sigma = sigma;
        self
    }

    /// Set candidate mask selection
    #[must_use]
    pub fn mask_selection(mut self, selection: MaskSelection) -> Self {
        self.config.mask_selection = selection;
        self
    }

    /// Request several mask hypotheses from the model
    #[must_use]
    pub fn multimask_output(mut self, enabled: bool) -> Self {
        self.config.multimask_output = enabled;
        self
    }

    /// Set mask logit threshold
    #[must_use]
    pub fn mask_threshold(mut self, threshold: f32) -> Self {
        self.config.mask_threshold = threshold;
        self
    }

    /// Enable debug mode
    #[must_use]
    pub fn debug(mut self, debug: bool) -> Self {
        self.config.debug = debug;
        self
    }

    /// Build and validate the configuration
    ///
    /// # Errors
    /// - Any parameter rejected by [`CutoutConfig::validate`]
    pub fn build(self) -> Result<CutoutConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Configuration for the HTTP service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Directory cutout PNGs are persisted to
    pub upload_dir: PathBuf,
    /// Origins allowed by the CORS policy
    pub allowed_origins: Vec<String>,
    /// Request body limit in bytes
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            upload_dir: PathBuf::from("uploads"),
            allowed_origins: vec![
                "http://localhost:3000".to_string(),
                "http://127.0.0.1:3000".to_string(),
            ],
            max_upload_bytes: 20 * 1024 * 1024,
        }
    }
}

impl ServerConfig {
    /// Socket address string `host:port`
    #[must_use]
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
