//! Error types for cutout operations

use thiserror::Error;

/// Result type alias for cutout operations
pub type Result<T> = std::result::Result<T, CutoutError>;

/// Error types for segmentation and cutout operations
#[derive(Error, Debug)]
pub enum CutoutError {
    /// Input/output errors (file not found, permission denied, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Image decoding or encoding errors
    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    /// Segmentation model inference errors
    #[error("Inference error: {0}")]
    Inference(String),

    /// Model loading or initialization errors
    #[error("Model error: {0}")]
    Model(String),

    /// Invalid configuration or parameters
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Decodable image the pipeline refuses (zero-sized or oversized)
    #[error("Invalid image: {0}")]
    InvalidImage(String),

    /// Box prompt rejected before reaching the model
    #[error("Invalid box prompt: {0}")]
    InvalidPrompt(String),

    /// Mask and image dimensions disagree between pipeline stages
    #[error("Shape mismatch: expected {}x{}, got {}x{}", expected.0, expected.1, actual.0, actual.1)]
    ShapeMismatch {
        expected: (u32, u32),
        actual: (u32, u32),
    },

    /// Pipeline processing errors
    #[error("Processing error: {0}")]
    Processing(String),

    /// Generic error for unexpected conditions
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CutoutError {
    /// Create a new invalid configuration error
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create a new invalid prompt error
    pub fn invalid_prompt<S: Into<String>>(msg: S) -> Self {
        Self::InvalidPrompt(msg.into())
    }

    /// Create a new invalid image error
    pub fn invalid_image<S: Into<String>>(msg: S) -> Self {
        Self::InvalidImage(msg.into())
    }

    /// Create a new model error
    pub fn model<S: Into<String>>(msg: S) -> Self {
        Self::Model(msg.into())
    }

    /// Create a new processing error
    pub fn processing<S: Into<String>>(msg: S) -> Self {
        Self::Processing(msg.into())
    }

    /// Create a new inference error
    pub fn inference<S: Into<String>>(msg: S) -> Self {
        Self::Inference(msg.into())
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }

    /// Create a shape mismatch error from `(width, height)` pairs
    #[must_use]
    pub fn shape_mismatch(expected: (u32, u32), actual: (u32, u32)) -> Self {
        Self::ShapeMismatch { expected, actual }
    }

    /// Create file I/O error with operation context
    pub fn file_io_error<P: AsRef<std::path::Path>>(
        operation: &str,
        path: P,
        error: &std::io::Error,
    ) -> Self {
        let path_display = path.as_ref().display();
        Self::Io(std::io::Error::new(
            error.kind(),
            format!("Failed to {} '{}': {}", operation, path_display, error),
        ))
    }

    /// Create model error with troubleshooting context
    pub fn model_error_with_context<P: AsRef<std::path::Path>>(
        operation: &str,
        model_path: P,
        error: &str,
        suggestions: &[&str],
    ) -> Self {
        let path_display = model_path.as_ref().display();
        let suggestion_text = if suggestions.is_empty() {
            String::new()
        } else {
            format!(" Suggestions: {}", suggestions.join(", "))
        };

        Self::Model(format!(
            "Failed to {} model '{}': {}.{}",
            operation, path_display, error, suggestion_text
        ))
    }

    /// Create configuration error with valid ranges
    pub fn config_value_error<T: std::fmt::Display>(
        parameter: &str,
        value: T,
        valid_range: &str,
        recommended: Option<T>,
    ) -> Self {
        let recommendation = match recommended {
            Some(rec) => format!(" Recommended: {}", rec),
            None => String::new(),
        };

        Self::InvalidConfig(format!(
            "Invalid {}: {} (valid range: {}).{}",
            parameter, value, valid_range, recommendation
        ))
    }

    /// Create processing error with stage context
    #[must_use]
    pub fn processing_stage_error(stage: &str, details: &str, input_info: Option<&str>) -> Self {
        let input_context = match input_info {
            Some(info) => format!(" (input: {})", info),
            None => String::new(),
        };

        Self::Processing(format!(
            "Processing failed at stage '{}'{}: {}",
            stage, input_context, details
        ))
    }

    /// Whether the error was caused by the caller's input rather than the service
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::InvalidPrompt(_) | Self::InvalidImage(_) | Self::Image(_))
    }

    /// Whether the error came from the segmentation model
    #[must_use]
    pub fn is_upstream_error(&self) -> bool {
        matches!(self, Self::Inference(_) | Self::Model(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_error_creation() {
        let err = CutoutError::invalid_config("test config error");
        assert!(matches!(err, CutoutError::InvalidConfig(_)));

        let err = CutoutError::invalid_prompt("x1 >= x2");
        assert!(matches!(err, CutoutError::InvalidPrompt(_)));
        assert!(err.is_client_error());
        assert!(!err.is_upstream_error());

        let err = CutoutError::invalid_image("0x0");
        assert!(matches!(err, CutoutError::InvalidImage(_)));
        assert!(err.is_client_error());
    }

    #[test]
    fn test_error_display() {
        let err = CutoutError::invalid_config("Invalid model path");
        assert_eq!(err.to_string(), "Invalid configuration: Invalid model path");

        let err = CutoutError::shape_mismatch((640, 480), (320, 240));
        assert_eq!(err.to_string(), "Shape mismatch: expected 640x480, got 320x240");
    }

    #[test]
    fn test_upstream_classification() {
        assert!(CutoutError::inference("decoder failed").is_upstream_error());
        assert!(CutoutError::model("missing encoder").is_upstream_error());
        assert!(!CutoutError::processing("blur").is_upstream_error());
        assert!(!CutoutError::internal("lock poisoned").is_client_error());
    }

    #[test]
    fn test_enhanced_error_context() {
        let io_error = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let err = CutoutError::file_io_error("write cutout", Path::new("/srv/uploads/a.png"), &io_error);
        let error_string = err.to_string();
        assert!(error_string.contains("write cutout"));
        assert!(error_string.contains("/srv/uploads/a.png"));

        let err = CutoutError::model_error_with_context(
            "load",
            Path::new("/models/sam_decoder.onnx"),
            "file not found",
            &["check --decoder path", "export the decoder with opset 17"],
        );
        let error_string = err.to_string();
        assert!(error_string.contains("load"));
        assert!(error_string.contains("/models/sam_decoder.onnx"));
        assert!(error_string.contains("Suggestions"));

        let err = CutoutError::config_value_error("closing kernel size", 14, "odd, 1-255", Some(15));
        let error_string = err.to_string();
        assert!(error_string.contains("closing kernel size"));
        assert!(error_string.contains("14"));
        assert!(error_string.contains("Recommended: 15"));

        let err = CutoutError::processing_stage_error("compositing", "kernel too large", Some("4x4 RGB"));
        let error_string = err.to_string();
        assert!(error_string.contains("compositing"));
        assert!(error_string.contains("4x4 RGB"));
    }
}
