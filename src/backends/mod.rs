//! Segmentation backend implementations
//!
//! - ONNX Runtime backend running the SAM encoder and decoder
//! - Mock backend returning the prompt rectangle, for tests and offline runs

pub mod mock;

#[cfg(feature = "onnx")]
pub mod onnx;

pub use self::mock::MockBackend;

#[cfg(feature = "onnx")]
pub use self::onnx::SamOnnxBackend;
