//! Post-processing pipeline properties
//!
//! Exercises the cleaner, compositor and cropper on hand-built masks, without
//! any segmentation backend.

use boxcut::{
    postprocessing::{content_bounds, PostprocessPipeline},
    AlphaCompositor, BinaryMask, BoundsCropper, CropOutcome, CutoutError, MaskCleaner, PixelBounds,
};
use image::{DynamicImage, Rgb, RgbImage, Rgba, RgbaImage};

fn white(width: u32, height: u32) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([255, 255, 255])))
}

/// Gradient so color changes are detectable per pixel
fn gradient(width: u32, height: u32) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x * 7 % 256) as u8, (y * 13 % 256) as u8, ((x + y) * 3 % 256) as u8])
    }))
}

fn square_mask(size: u32, from: u32, to: u32) -> BinaryMask {
    BinaryMask::from_fn(size, size, |x, y| (from..to).contains(&x) && (from..to).contains(&y))
}

fn disk_mask(size: u32, radius: f32) -> BinaryMask {
    let center = size as f32 / 2.0;
    BinaryMask::from_fn(size, size, |x, y| {
        let dx = x as f32 + 0.5 - center;
        let dy = y as f32 + 0.5 - center;
        dx * dx + dy * dy <= radius * radius
    })
}

#[test]
fn closing_leaves_hole_free_masks_unchanged() {
    let cleaner = MaskCleaner::default();
    let masks = [
        square_mask(64, 16, 48),
        disk_mask(80, 25.0),
        BinaryMask::filled(30, 30, true),
        BinaryMask::filled(30, 30, false),
    ];

    for mask in &masks {
        assert_eq!(&cleaner.clean(mask), mask);
    }
}

#[test]
fn closing_fills_small_interior_hole() {
    let size = 80;
    let radius = 25.0;
    let with_hole = {
        let disk = disk_mask(size, radius);
        BinaryMask::from_fn(size, size, |x, y| disk.get(x, y) && !((39..42).contains(&x) && (39..42).contains(&y)))
    };
    assert_eq!(with_hole.foreground_count() + 9, disk_mask(size, radius).foreground_count());

    let cleaned = MaskCleaner::default().clean(&with_hole);
    let disk = disk_mask(size, radius);
    for y in 0..size {
        for x in 0..size {
            if disk.get(x, y) {
                assert!(cleaned.get(x, y), "pixel ({x}, {y}) inside the disk stayed open");
            }
        }
    }
}

#[test]
fn every_stage_preserves_or_shrinks_dimensions() {
    let pipeline = PostprocessPipeline::default();

    for (width, height) in [(1, 1), (7, 3), (40, 25), (25, 40)] {
        let mask = BinaryMask::from_fn(width, height, |x, y| (x + y) % 3 == 0);
        let cleaned = pipeline.cleaner.clean(&mask);
        assert_eq!(cleaned.dimensions(), (width, height));

        let composited = pipeline.compositor.compose(&gradient(width, height), &cleaned).unwrap();
        assert_eq!(composited.dimensions(), (width, height));

        let cropped = pipeline.cropper.crop(composited);
        assert!(cropped.image.width() <= width);
        assert!(cropped.image.height() <= height);
    }
}

#[test]
fn compositing_changes_alpha_only() {
    let image = gradient(48, 32);
    let mask = BinaryMask::from_fn(48, 32, |x, y| x > 10 && y < 20);
    let composited = AlphaCompositor::default().compose(&image, &mask).unwrap();
    let source = image.to_rgba8();

    for (x, y, pixel) in composited.enumerate_pixels() {
        let original = source.get_pixel(x, y);
        assert_eq!(pixel.0[..3], original.0[..3], "color changed at ({x}, {y})");
    }
}

#[test]
fn compositing_rejects_mismatched_mask() {
    let err = AlphaCompositor::default()
        .compose(&white(10, 10), &BinaryMask::filled(10, 9, true))
        .unwrap_err();
    assert!(matches!(
        err,
        CutoutError::ShapeMismatch {
            expected: (10, 10),
            actual: (10, 9)
        }
    ));
}

#[test]
fn crop_is_tight_around_l_shape() {
    let mut canvas = RgbaImage::from_pixel(20, 20, Rgba([0, 0, 0, 0]));
    for y in 2..=5 {
        for x in 3..=8 {
            canvas.put_pixel(x, y, Rgba([10, 20, 30, 255]));
        }
    }
    for y in 6..=9 {
        for x in 3..=4 {
            canvas.put_pixel(x, y, Rgba([10, 20, 30, 255]));
        }
    }

    let cropped = BoundsCropper.crop(canvas);
    assert_eq!(
        cropped.outcome,
        CropOutcome::Cropped(PixelBounds {
            x: 3,
            y: 2,
            width: 6,
            height: 8
        })
    );
    assert_eq!(cropped.image.dimensions(), (6, 8));
    // Bottom-right of the crop lies outside the L
    assert_eq!(cropped.image.get_pixel(5, 7).0[3], 0);
    assert_eq!(cropped.image.get_pixel(0, 7).0[3], 255);
}

#[test]
fn transparent_image_falls_back_to_uncropped() {
    let canvas = RgbaImage::from_pixel(10, 10, Rgba([90, 90, 90, 0]));
    assert!(content_bounds(&canvas).is_none());

    let cropped = BoundsCropper.crop(canvas.clone());
    assert_eq!(cropped.outcome, CropOutcome::NoContent);
    assert_eq!(cropped.image, canvas);
}

#[test]
fn empty_mask_runs_through_to_no_content() {
    let cropped = PostprocessPipeline::default()
        .run(&white(30, 20), &BinaryMask::filled(30, 20, false))
        .unwrap();

    assert_eq!(cropped.outcome, CropOutcome::NoContent);
    assert_eq!(cropped.image.dimensions(), (30, 20));
    assert!(cropped.image.pixels().all(|p| p.0[3] == 0));
}

#[test]
fn white_square_end_to_end() {
    let mask = square_mask(100, 20, 80);
    let pipeline = PostprocessPipeline::default();

    assert_eq!(pipeline.cleaner.clean(&mask), mask);

    let cropped = pipeline.run(&white(100, 100), &mask).unwrap();

    // The 5x5 blur bleeds two pixels past each edge of the 60x60 square
    assert_eq!(
        cropped.outcome,
        CropOutcome::Cropped(PixelBounds {
            x: 18,
            y: 18,
            width: 64,
            height: 64
        })
    );
    let (width, height) = cropped.image.dimensions();
    assert!((60..=66).contains(&width));
    assert!((60..=66).contains(&height));

    // Opaque white well inside the square
    for y in 6..58 {
        for x in 6..58 {
            assert_eq!(cropped.image.get_pixel(x, y), &Rgba([255, 255, 255, 255]));
        }
    }

    // Soft transition band at the edge
    let edge = cropped.image.get_pixel(2, 32).0[3];
    let outside = cropped.image.get_pixel(0, 32).0[3];
    assert!(edge > 0 && edge < 255, "edge alpha {edge}");
    assert!(outside > 0 && outside < edge, "outer band alpha {outside}");
}

#[test]
fn larger_closing_kernel_bridges_wider_gaps() {
    // Two bars 9 px apart: bridged by a 15x15 kernel, not by a 5x5 one
    let mask = BinaryMask::from_fn(60, 40, |x, y| (10..30).contains(&y) && ((5..25).contains(&x) || (34..54).contains(&x)));

    let narrow = MaskCleaner::new(5).unwrap().clean(&mask);
    let wide = MaskCleaner::new(15).unwrap().clean(&mask);

    assert!(!narrow.get(29, 20));
    assert!(wide.get(29, 20));
    assert_eq!(wide.dimensions(), (60, 40));
}
