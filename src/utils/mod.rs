//! Preprocessing and validation helpers

pub mod preprocessing;
pub mod validation;

pub use preprocessing::{SamPreprocessor, SAM_INPUT_SIZE};
pub use validation::{validate_image_dimensions, validate_prompt};
