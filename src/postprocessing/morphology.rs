//! Mask clean-up by morphological closing

use crate::{
    config::MAX_CLOSING_KERNEL_SIZE,
    error::{CutoutError, Result},
    types::BinaryMask,
};
use imageproc::distance_transform::Norm;
use imageproc::morphology;

/// Binarization midpoint applied to the closed intensity image
const MIDPOINT: u8 = 127;

/// Fills holes and bridges gaps smaller than a square structuring element
///
/// Closing is dilation followed by erosion with the same `k x k` square. The
/// outer silhouette is restored by the erosion while holes narrower than the
/// kernel do not survive the dilation. Pixels outside the image never count as
/// background, so objects touching the border are not eaten away.
#[derive(Debug, Clone, Copy)]
pub struct MaskCleaner {
    kernel_size: u32,
}

impl MaskCleaner {
    /// # Errors
    /// - Kernel size even, zero or larger than 255
    pub fn new(kernel_size: u32) -> Result<Self> {
        if kernel_size == 0 || kernel_size % 2 == 0 || kernel_size > MAX_CLOSING_KERNEL_SIZE {
            return Err(CutoutError::config_value_error(
                "closing kernel size",
                kernel_size,
                "odd, 1-255",
                Some(15),
            ));
        }
        Ok(Self { kernel_size })
    }

    #[must_use]
    pub fn kernel_size(&self) -> u32 {
        self.kernel_size
    }

    /// Chebyshev radius of the square kernel
    fn radius(&self) -> u8 {
        (self.kernel_size / 2) as u8
    }

    /// Close small holes and gaps; output has the input's dimensions
    #[must_use]
    pub fn clean(&self, mask: &BinaryMask) -> BinaryMask {
        let (width, height) = mask.dimensions();

        // Distance transforms cap at width + height when a class is absent,
        // which would flip uniform masks smaller than the kernel.
        if mask.is_empty() {
            return mask.clone();
        }

        let intensity = mask.to_gray();
        let dilated = morphology::dilate(&intensity, Norm::LInf, self.radius());
        if dilated.pixels().all(|p| p[0] > MIDPOINT) {
            return BinaryMask::filled(width, height, true);
        }

        let closed = morphology::erode(&dilated, Norm::LInf, self.radius());
        BinaryMask::from_gray(&closed, MIDPOINT)
    }
}

impl Default for MaskCleaner {
    fn default() -> Self {
        Self { kernel_size: 15 }
    }
}
