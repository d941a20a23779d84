//! Input validation ahead of inference

use crate::{
    error::{CutoutError, Result},
    types::BoxPrompt,
};

/// Largest accepted image side
pub const MAX_IMAGE_DIMENSION: u32 = 16384;

/// Reject prompts that do not describe a non-empty rectangle inside the image
///
/// Coordinates are pixels with `x2`/`y2` exclusive, so `x2 == width` is allowed.
///
/// # Errors
/// - `x1 >= x2` or `y1 >= y2`
/// - Any corner outside `0..=width` / `0..=height`
pub fn validate_prompt(prompt: &BoxPrompt, width: u32, height: u32) -> Result<()> {
    if prompt.x1 >= prompt.x2 || prompt.y1 >= prompt.y2 {
        return Err(CutoutError::invalid_prompt(format!(
            "box {prompt} is empty or inverted (need x1 < x2 and y1 < y2)"
        )));
    }

    if prompt.x1 < 0 || prompt.y1 < 0 {
        return Err(CutoutError::invalid_prompt(format!(
            "box {prompt} has negative coordinates"
        )));
    }

    if i64::from(prompt.x2) > i64::from(width) || i64::from(prompt.y2) > i64::from(height) {
        return Err(CutoutError::invalid_prompt(format!(
            "box {prompt} extends beyond the {width}x{height} image"
        )));
    }

    Ok(())
}

/// Validate image dimensions are within reasonable bounds
///
/// # Errors
/// - Zero-sized or oversized images
pub fn validate_image_dimensions(width: u32, height: u32) -> Result<()> {
    if width == 0 || height == 0 {
        return Err(CutoutError::invalid_image(format!(
            "Image dimensions too small: {width}x{height}"
        )));
    }

    if width > MAX_IMAGE_DIMENSION || height > MAX_IMAGE_DIMENSION {
        return Err(CutoutError::invalid_image(format!(
            "Image dimensions too large: {width}x{height}. Maximum: {MAX_IMAGE_DIMENSION}x{MAX_IMAGE_DIMENSION}"
        )));
    }

    Ok(())
}
