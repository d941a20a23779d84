//! Image I/O operations service
//!
//! Decoding honours EXIF orientation so the pixel grid matches what the user
//! saw when drawing the box. Encoding always produces PNG, the only format
//! that keeps the cutout's alpha channel.

use crate::error::{CutoutError, Result};
use image::{DynamicImage, ImageDecoder, ImageFormat, ImageReader, RgbaImage};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Service for handling image file input/output operations
pub struct ImageIOService;

impl ImageIOService {
    /// Decode image bytes, apply the EXIF orientation and drop any alpha channel
    ///
    /// The result is always `ImageRgb8`; the cutout alpha comes from the mask alone.
    ///
    /// # Errors
    /// - Unknown or corrupt image data
    ///
    /// # Examples
    /// ```rust
    /// use boxcut::services::ImageIOService;
    ///
    /// let png = ImageIOService::encode_png(&image::RgbaImage::new(3, 2))?;
    /// let image = ImageIOService::decode_upload(&png)?;
    /// assert_eq!((image.width(), image.height()), (3, 2));
    /// # Ok::<(), boxcut::CutoutError>(())
    /// ```
    pub fn decode_upload(bytes: &[u8]) -> Result<DynamicImage> {
        let reader = ImageReader::new(Cursor::new(bytes)).with_guessed_format()?;
        let format = reader.format();
        let mut decoder = reader.into_decoder()?;
        let orientation = decoder.orientation()?;
        let mut decoded = DynamicImage::from_decoder(decoder)?;
        decoded.apply_orientation(orientation);
        let source_color = decoded.color();
        let image = DynamicImage::ImageRgb8(decoded.into_rgb8());

        debug!(
            format = ?format,
            ?source_color,
            ?orientation,
            width = image.width(),
            height = image.height(),
            "Decoded image"
        );
        Ok(image)
    }

    /// Load an image from a file path
    ///
    /// # Errors
    /// - File missing or unreadable
    /// - Unknown or corrupt image data
    pub fn load_image<P: AsRef<Path>>(path: P) -> Result<DynamicImage> {
        let path_ref = path.as_ref();
        let data = std::fs::read(path_ref)
            .map_err(|e| CutoutError::file_io_error("read image file", path_ref, &e))?;
        Self::decode_upload(&data)
    }

    /// Encode an RGBA image as PNG bytes
    ///
    /// # Errors
    /// - PNG encoder failure
    pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>> {
        let mut buffer = Cursor::new(Vec::new());
        image.write_to(&mut buffer, ImageFormat::Png)?;
        Ok(buffer.into_inner())
    }

    /// Save an RGBA image as PNG, creating parent directories as needed
    ///
    /// # Errors
    /// - Directory creation or write failures
    pub fn save_png<P: AsRef<Path>>(image: &RgbaImage, path: P) -> Result<()> {
        let path_ref = path.as_ref();
        Self::ensure_parent(path_ref)?;
        let bytes = Self::encode_png(image)?;
        std::fs::write(path_ref, bytes)
            .map_err(|e| CutoutError::file_io_error("write PNG", path_ref, &e))
    }

    /// Write already-encoded PNG bytes under a fresh random name in `dir`
    ///
    /// Returns the path of the written file, `<dir>/<32 hex chars>.png`.
    ///
    /// # Errors
    /// - Directory creation or write failures
    pub fn persist_png<P: AsRef<Path>>(dir: P, png: &[u8]) -> Result<PathBuf> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)
            .map_err(|e| CutoutError::file_io_error("create upload directory", dir, &e))?;

        let path = dir.join(format!("{}.png", uuid::Uuid::new_v4().simple()));
        std::fs::write(&path, png).map_err(|e| CutoutError::file_io_error("write cutout", &path, &e))?;
        debug!(path = %path.display(), bytes = png.len(), "Persisted cutout");
        Ok(path)
    }

    fn ensure_parent(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| CutoutError::file_io_error("create output directory", parent, &e))?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage, Rgba};
    use tempfile::TempDir;

    fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([200, 40, 10])));
        let mut buffer = Cursor::new(Vec::new());
        image.write_to(&mut buffer, ImageFormat::Jpeg).unwrap();
        buffer.into_inner()
    }

    #[test]
    fn test_decode_guesses_format_from_content() {
        let image = ImageIOService::decode_upload(&jpeg_bytes(12, 7)).unwrap();
        assert_eq!((image.width(), image.height()), (12, 7));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let err = ImageIOService::decode_upload(b"definitely not an image").unwrap_err();
        assert!(matches!(err, CutoutError::Image(_)));
        assert!(err.is_client_error());
    }

    #[test]
    fn test_decode_drops_upload_alpha() {
        let image = RgbaImage::from_pixel(4, 3, Rgba([1, 2, 3, 77]));
        let png = ImageIOService::encode_png(&image).unwrap();
        let decoded = ImageIOService::decode_upload(&png).unwrap();

        assert!(matches!(decoded, DynamicImage::ImageRgb8(_)));
        assert_eq!(decoded.to_rgb8(), RgbImage::from_pixel(4, 3, Rgb([1, 2, 3])));
    }

    #[test]
    fn test_decode_converts_gray_alpha_to_rgb() {
        let image = DynamicImage::ImageLumaA8(image::GrayAlphaImage::from_pixel(2, 2, image::LumaA([90, 10])));
        let mut buffer = Cursor::new(Vec::new());
        image.write_to(&mut buffer, ImageFormat::Png).unwrap();

        let decoded = ImageIOService::decode_upload(buffer.get_ref()).unwrap();
        assert!(matches!(decoded, DynamicImage::ImageRgb8(_)));
        assert_eq!(decoded.to_rgb8().get_pixel(1, 1), &Rgb([90, 90, 90]));
    }

    #[test]
    fn test_save_png_creates_parent_dirs() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested/dir/out.png");
        ImageIOService::save_png(&RgbaImage::new(2, 2), &path).unwrap();
        assert!(path.is_file());
    }

    #[test]
    fn test_persist_png_uses_unique_names() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("uploads");
        let png = ImageIOService::encode_png(&RgbaImage::new(1, 1)).unwrap();

        let first = ImageIOService::persist_png(&dir, &png).unwrap();
        let second = ImageIOService::persist_png(&dir, &png).unwrap();
        assert_ne!(first, second);

        let name = first.file_name().unwrap().to_string_lossy().into_owned();
        assert_eq!(name.len(), 36);
        assert!(name.ends_with(".png"));
        assert_eq!(std::fs::read(&first).unwrap(), png);
    }

    #[test]
    fn test_load_missing_file() {
        let err = ImageIOService::load_image("/definitely/missing.png").unwrap_err();
        assert!(matches!(err, CutoutError::Io(_)));
    }
}
