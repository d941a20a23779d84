//! Cropping to the bounds of visible content

use crate::types::{CropOutcome, CroppedImage, PixelBounds};
use image::{imageops, RgbaImage};

/// Smallest rectangle containing every pixel with non-zero alpha
#[must_use]
pub fn content_bounds(image: &RgbaImage) -> Option<PixelBounds> {
    let mut min_x = u32::MAX;
    let mut min_y = u32::MAX;
    let mut max_x = 0;
    let mut max_y = 0;
    let mut found = false;

    for (x, y, pixel) in image.enumerate_pixels() {
        if pixel[3] > 0 {
            found = true;
            min_x = min_x.min(x);
            min_y = min_y.min(y);
            max_x = max_x.max(x);
            max_y = max_y.max(y);
        }
    }

    found.then(|| PixelBounds {
        x: min_x,
        y: min_y,
        width: max_x - min_x + 1,
        height: max_y - min_y + 1,
    })
}

/// Trims fully transparent margins from a composited cutout
#[derive(Debug, Default, Clone, Copy)]
pub struct BoundsCropper;

impl BoundsCropper {
    /// Crop to the content bounds, or return the image unchanged when every
    /// pixel is transparent
    #[must_use]
    pub fn crop(&self, image: RgbaImage) -> CroppedImage {
        match content_bounds(&image) {
            Some(bounds) => {
                let cropped =
                    imageops::crop_imm(&image, bounds.x, bounds.y, bounds.width, bounds.height).to_image();
                CroppedImage {
                    image: cropped,
                    outcome: CropOutcome::Cropped(bounds),
                }
            },
            None => CroppedImage {
                image,
                outcome: CropOutcome::NoContent,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn test_l_shape_crop() {
        let image = RgbaImage::from_fn(20, 20, |x, y| {
            let vertical = x == 3 && (2..=9).contains(&y);
            let horizontal = y == 9 && (3..=8).contains(&x);
            if vertical || horizontal {
                Rgba([200, 100, 50, 255])
            } else {
                Rgba([1, 2, 3, 0])
            }
        });

        let cropped = BoundsCropper.crop(image);
        assert_eq!(cropped.image.dimensions(), (6, 8));
        assert_eq!(
            cropped.outcome,
            CropOutcome::Cropped(PixelBounds {
                x: 3,
                y: 2,
                width: 6,
                height: 8
            })
        );
        assert_eq!(cropped.image.get_pixel(0, 0)[3], 255);
        assert_eq!(cropped.image.get_pixel(5, 7)[3], 255);
        assert_eq!(cropped.image.get_pixel(5, 0)[3], 0);
    }

    #[test]
    fn test_fully_transparent_falls_back() {
        let image = RgbaImage::from_pixel(10, 10, Rgba([9, 9, 9, 0]));
        let cropped = BoundsCropper.crop(image.clone());
        assert_eq!(cropped.outcome, CropOutcome::NoContent);
        assert_eq!(cropped.image, image);
    }

    #[test]
    fn test_faint_alpha_counts_as_content() {
        let mut image = RgbaImage::from_pixel(8, 8, Rgba([0, 0, 0, 0]));
        image.put_pixel(6, 1, Rgba([0, 0, 0, 1]));
        let cropped = BoundsCropper.crop(image);
        assert_eq!(cropped.image.dimensions(), (1, 1));
        assert_eq!(cropped.outcome.bounds().map(|b| (b.x, b.y)), Some((6, 1)));
    }

    #[test]
    fn test_fully_opaque_is_unchanged_size() {
        let image = RgbaImage::from_pixel(5, 7, Rgba([1, 1, 1, 255]));
        let cropped = BoundsCropper.crop(image);
        assert_eq!(cropped.image.dimensions(), (5, 7));
        assert!(cropped.outcome.is_cropped());
    }
}
