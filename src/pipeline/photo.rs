//! Photo preparation: uploaded image file → raw RGB pixels for the report.
//!
//! The PDF embeds the portrait as an uncompressed DeviceRGB image XObject.
//! Phone photos are routinely 12 MP; the circle they are drawn into is 120 pt
//! across, so the image is centre-cropped to a square and downscaled to
//! [`PHOTO_PIXELS`] first. That keeps the report around 200 KB regardless of
//! the upload.

use image::imageops::FilterType;
use image::ImageReader;
use std::path::Path;
use tracing::debug;

/// Edge length of the embedded square portrait, in pixels.
pub const PHOTO_PIXELS: u32 = 256;

/// A decoded, square, 8-bit RGB portrait.
#[derive(Debug, Clone)]
pub struct PreparedPhoto {
    pub width: u32,
    pub height: u32,
    /// Row-major RGB triplets, `width * height * 3` bytes.
    pub rgb: Vec<u8>,
}

/// Decode `path` (format sniffed from content) and crop it to a square.
///
/// Blocking: call from `spawn_blocking`.
pub fn prepare_photo(path: &Path) -> Result<PreparedPhoto, image::ImageError> {
    let img = ImageReader::open(path)?.with_guessed_format()?.decode()?;
    let (w, h) = (img.width(), img.height());
    let side = w.min(h);
    let square = img.crop_imm((w - side) / 2, (h - side) / 2, side, side);
    let scaled = if side > PHOTO_PIXELS {
        square.resize_exact(PHOTO_PIXELS, PHOTO_PIXELS, FilterType::Triangle)
    } else {
        square
    };
    let rgb = scaled.to_rgb8();
    debug!(
        "Prepared photo {}x{} → {}x{}",
        w,
        h,
        rgb.width(),
        rgb.height()
    );
    Ok(PreparedPhoto {
        width: rgb.width(),
        height: rgb.height(),
        rgb: rgb.into_raw(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn crops_and_downscales_to_square() {
        let dir = tempfile::tempdir().unwrap();
        // Saved with a misleading extension: the format must be sniffed.
        let path = dir.path().join("photo.jpg");
        RgbImage::from_pixel(600, 400, Rgb([200, 10, 10]))
            .save_with_format(&path, image::ImageFormat::Png)
            .unwrap();

        let photo = prepare_photo(&path).expect("decode");
        assert_eq!((photo.width, photo.height), (PHOTO_PIXELS, PHOTO_PIXELS));
        assert_eq!(photo.rgb.len(), (PHOTO_PIXELS * PHOTO_PIXELS * 3) as usize);
        assert_eq!(&photo.rgb[..3], &[200, 10, 10]);
    }

    #[test]
    fn small_images_are_not_upscaled() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tiny.png");
        RgbImage::from_pixel(10, 30, Rgb([0, 0, 255])).save(&path).unwrap();

        let photo = prepare_photo(&path).unwrap();
        assert_eq!((photo.width, photo.height), (10, 10));
    }

    #[test]
    fn garbage_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("not-an-image.jpg");
        std::fs::write(&path, b"definitely not pixels").unwrap();
        assert!(prepare_photo(&path).is_err());
    }
}
