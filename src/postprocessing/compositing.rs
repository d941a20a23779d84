//! Alpha compositing with feathered edges

use crate::{
    config::MAX_BLUR_KERNEL_SIZE,
    error::{CutoutError, Result},
    types::BinaryMask,
};
use image::{DynamicImage, GrayImage, RgbaImage};
use ndarray::Array2;

/// Fixed binomial kernels used when no sigma is given for small sizes
const SMALL_KERNELS: [&[f32]; 4] = [
    &[1.0],
    &[0.25, 0.5, 0.25],
    &[0.0625, 0.25, 0.375, 0.25, 0.0625],
    &[0.031_25, 0.109_375, 0.218_75, 0.281_25, 0.218_75, 0.109_375, 0.031_25],
];

/// Build a normalized 1-D Gaussian kernel
///
/// With `sigma <= 0` and a size of at most 7 the binomial approximations are
/// used; otherwise sigma defaults to `0.3 * ((size - 1) * 0.5 - 1) + 0.8`.
#[must_use]
pub fn gaussian_kernel(size: u32, sigma: f32) -> Vec<f32> {
    let size = size.max(1) | 1;

    if sigma <= 0.0 && size <= 7 {
        if let Some(kernel) = SMALL_KERNELS.get((size / 2) as usize) {
            return kernel.to_vec();
        }
    }

    let sigma = if sigma > 0.0 {
        sigma
    } else {
        0.3 * ((size as f32 - 1.0) * 0.5 - 1.0) + 0.8
    };
    let center = (size / 2) as f32;
    let scale = -0.5 / (sigma * sigma);

    let weights: Vec<f32> = (0..size)
        .map(|i| {
            let d = i as f32 - center;
            (scale * d * d).exp()
        })
        .collect();
    let sum: f32 = weights.iter().sum();
    weights.into_iter().map(|w| w / sum).collect()
}

/// Mirror an out-of-range index back into `0..len` without repeating the edge
fn reflect_101(index: i64, len: i64) -> usize {
    if len <= 1 {
        return 0;
    }
    let mut i = index;
    while i < 0 || i >= len {
        i = if i < 0 { -i } else { 2 * (len - 1) - i };
    }
    i as usize
}

// imageproc's separable filters clamp at the border; feathering needs reflect-101.
/// Separable Gaussian blur of an 8-bit plane, rounded back to `u8`
fn blur_plane(plane: &GrayImage, kernel: &[f32]) -> GrayImage {
    let (width, height) = plane.dimensions();
    let (w, h) = (width as usize, height as usize);
    let radius = (kernel.len() / 2) as i64;

    let source = Array2::from_shape_fn((h, w), |(y, x)| {
        f32::from(plane.get_pixel(x as u32, y as u32)[0])
    });

    let horizontal = Array2::from_shape_fn((h, w), |(y, x)| {
        kernel
            .iter()
            .enumerate()
            .map(|(k, weight)| {
                let sx = reflect_101(x as i64 + k as i64 - radius, w as i64);
                weight * source[[y, sx]]
            })
            .sum::<f32>()
    });

    let blurred = Array2::from_shape_fn((h, w), |(y, x)| {
        kernel
            .iter()
            .enumerate()
            .map(|(k, weight)| {
                let sy = reflect_101(y as i64 + k as i64 - radius, h as i64);
                weight * horizontal[[sy, x]]
            })
            .sum::<f32>()
    });

    GrayImage::from_fn(width, height, |x, y| {
        let value = blurred[[y as usize, x as usize]];
        image::Luma([(value + 0.5).floor().clamp(0.0, 255.0) as u8])
    })
}

/// Turns a binary mask into a soft alpha channel on top of the source colors
#[derive(Debug, Clone)]
pub struct AlphaCompositor {
    kernel: Vec<f32>,
}

impl AlphaCompositor {
    /// # Errors
    /// - Kernel size even, zero or larger than 31
    /// - Non-finite sigma
    pub fn new(kernel_size: u32, sigma: f32) -> Result<Self> {
        if kernel_size == 0 || kernel_size % 2 == 0 || kernel_size > MAX_BLUR_KERNEL_SIZE {
            return Err(CutoutError::config_value_error(
                "blur kernel size",
                kernel_size,
                "odd, 1-31",
                Some(5),
            ));
        }
        if !sigma.is_finite() {
            return Err(CutoutError::invalid_config("blur sigma must be finite"));
        }

        Ok(Self {
            kernel: gaussian_kernel(kernel_size, sigma),
        })
    }

    #[must_use]
    pub fn kernel(&self) -> &[f32] {
        &self.kernel
    }

    /// Feathered alpha plane for `mask` (0 or 255 before blurring)
    #[must_use]
    pub fn alpha_from_mask(&self, mask: &BinaryMask) -> GrayImage {
        blur_plane(&mask.to_gray(), &self.kernel)
    }

    /// Compose the source colors with an alpha derived from `mask`
    ///
    /// Color channels are copied unchanged; any existing alpha is replaced.
    ///
    /// # Errors
    /// - Mask and image dimensions differ
    pub fn compose(&self, image: &DynamicImage, mask: &BinaryMask) -> Result<RgbaImage> {
        let image_size = (image.width(), image.height());
        if mask.dimensions() != image_size {
            return Err(CutoutError::shape_mismatch(image_size, mask.dimensions()));
        }

        let alpha = self.alpha_from_mask(mask);
        let mut rgba = image.to_rgba8();
        for (pixel, a) in rgba.pixels_mut().zip(alpha.pixels()) {
            pixel[3] = a[0];
        }

        Ok(rgba)
    }
}

impl Default for AlphaCompositor {
    fn default() -> Self {
        Self {
            kernel: gaussian_kernel(5, 0.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn gradient(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x * 7 % 256) as u8, (y * 13 % 256) as u8, ((x + y) % 256) as u8])
        }))
    }

    #[test]
    fn test_kernel_is_normalized() {
        for (size, sigma) in [(1, 0.0), (3, 0.0), (5, 0.0), (9, 0.0), (5, 2.0), (31, 0.0)] {
            let kernel = gaussian_kernel(size, sigma);
            assert_eq!(kernel.len(), size as usize);
            let sum: f32 = kernel.iter().sum();
            assert!((sum - 1.0).abs() < 1e-5, "size {size} sigma {sigma}: {sum}");
        }
    }

    #[test]
    fn test_default_kernel_is_binomial() {
        let kernel = gaussian_kernel(5, 0.0);
        assert_eq!(kernel, vec![0.0625, 0.25, 0.375, 0.25, 0.0625]);
    }

    #[test]
    fn test_explicit_sigma_kernel_is_symmetric() {
        let kernel = gaussian_kernel(9, 1.5);
        for i in 0..4 {
            assert!((kernel[i] - kernel[8 - i]).abs() < 1e-6);
        }
        assert!(kernel[4] > kernel[3]);
    }

    #[test]
    fn test_reflect_101() {
        assert_eq!(reflect_101(-1, 5), 1);
        assert_eq!(reflect_101(-2, 5), 2);
        assert_eq!(reflect_101(5, 5), 3);
        assert_eq!(reflect_101(6, 5), 2);
        assert_eq!(reflect_101(2, 5), 2);
        assert_eq!(reflect_101(-3, 1), 0);
        assert_eq!(reflect_101(-3, 2), 1);
    }

    #[test]
    fn test_rejects_invalid_kernel() {
        assert!(AlphaCompositor::new(4, 0.0).is_err());
        assert!(AlphaCompositor::new(0, 0.0).is_err());
        assert!(AlphaCompositor::new(33, 0.0).is_err());
        assert!(AlphaCompositor::new(5, f32::NAN).is_err());
    }

    #[test]
    fn test_preserves_color_and_dimensions() {
        let image = gradient(24, 18);
        let mask = BinaryMask::from_fn(24, 18, |x, y| (6..18).contains(&x) && (4..14).contains(&y));
        let rgba = AlphaCompositor::default().compose(&image, &mask).unwrap();

        assert_eq!(rgba.dimensions(), (24, 18));
        let rgb = image.to_rgb8();
        for (x, y, pixel) in rgba.enumerate_pixels() {
            let source = rgb.get_pixel(x, y);
            assert_eq!(&pixel.0[..3], &source.0[..]);
        }
    }

    #[test]
    fn test_alpha_profile() {
        let image = gradient(40, 40);
        let mask = BinaryMask::from_fn(40, 40, |x, y| (10..30).contains(&x) && (10..30).contains(&y));
        let rgba = AlphaCompositor::default().compose(&image, &mask).unwrap();

        // Deep inside the object
        assert_eq!(rgba.get_pixel(20, 20)[3], 255);
        // Far outside the object
        assert_eq!(rgba.get_pixel(2, 2)[3], 0);
        // Feathered edge: partially transparent on both sides of the boundary
        let inside_edge = rgba.get_pixel(10, 20)[3];
        let outside_edge = rgba.get_pixel(9, 20)[3];
        assert!(inside_edge > 0 && inside_edge < 255, "{inside_edge}");
        assert!(outside_edge > 0 && outside_edge < 255, "{outside_edge}");
        assert!(inside_edge > outside_edge);
        // Two pixels out the binomial tail still contributes
        assert_eq!(rgba.get_pixel(8, 20)[3], 16);
        assert_eq!(rgba.get_pixel(7, 20)[3], 0);
    }

    #[test]
    fn test_uniform_masks() {
        let image = gradient(12, 9);
        let compositor = AlphaCompositor::default();

        let opaque = compositor.compose(&image, &BinaryMask::filled(12, 9, true)).unwrap();
        assert!(opaque.pixels().all(|p| p[3] == 255));

        let clear = compositor.compose(&image, &BinaryMask::filled(12, 9, false)).unwrap();
        assert!(clear.pixels().all(|p| p[3] == 0));
    }

    #[test]
    fn test_replaces_existing_alpha() {
        let image = DynamicImage::ImageRgba8(RgbaImage::from_pixel(6, 6, image::Rgba([10, 20, 30, 77])));
        let rgba = AlphaCompositor::default()
            .compose(&image, &BinaryMask::filled(6, 6, true))
            .unwrap();
        assert!(rgba.pixels().all(|p| p.0 == [10, 20, 30, 255]));
    }

    #[test]
    fn test_shape_mismatch() {
        let image = gradient(10, 10);
        let err = AlphaCompositor::default()
            .compose(&image, &BinaryMask::filled(10, 11, true))
            .unwrap_err();
        assert!(matches!(
            err,
            CutoutError::ShapeMismatch {
                expected: (10, 10),
                actual: (10, 11)
            }
        ));
    }

    #[test]
    fn test_tiny_images_do_not_panic() {
        let compositor = AlphaCompositor::new(31, 0.0).unwrap();
        let image = gradient(1, 2);
        let rgba = compositor.compose(&image, &BinaryMask::filled(1, 2, true)).unwrap();
        assert!(rgba.pixels().all(|p| p[3] == 255));
    }
}
