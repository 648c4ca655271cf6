//! Frame decoding and grayscale/color variant derivation
//!
//! **Why**: The processing engine consumes every frame twice, once as an
//! 8-bit luminance buffer (tracking) and once as an 8-bit RGB buffer
//! (colorizing map points). Capture sources may be color or grayscale.
//!
//! **Used by**: Sequence (decode on `read()`), PlaybackWorker (variant split)
//!
//! # Variant Rules
//!
//! - Color source: gray = luminance conversion, color = source as RGB
//! - Gray source: gray = source, color = gray expanded to three channels
//!
//! Higher bit depths (16-bit PNG/TIFF) are narrowed to 8 bits per channel.

use image::{DynamicImage, GrayImage, RgbImage};
use log::debug;
use std::path::{Path, PathBuf};

/// Frame loading errors
#[derive(Debug)]
pub enum FrameError {
    /// File could not be opened or decoded
    Decode { path: PathBuf, source: image::ImageError },
    /// Decoded image has a zero dimension
    Empty(PathBuf),
}

impl std::fmt::Display for FrameError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FrameError::Decode { path, source } => {
                write!(f, "Failed to decode {}: {}", path.display(), source)
            }
            FrameError::Empty(path) => write!(f, "Empty image: {}", path.display()),
        }
    }
}

impl std::error::Error for FrameError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FrameError::Decode { source, .. } => Some(source),
            FrameError::Empty(_) => None,
        }
    }
}

/// Decode a frame from disk, keeping its native channel layout.
pub fn load_frame<P: AsRef<Path>>(path: P) -> Result<DynamicImage, FrameError> {
    let path = path.as_ref();
    debug!("Loading frame: {}", path.display());

    let img = image::open(path).map_err(|source| FrameError::Decode {
        path: path.to_path_buf(),
        source,
    })?;

    if img.width() == 0 || img.height() == 0 {
        return Err(FrameError::Empty(path.to_path_buf()));
    }

    Ok(img)
}

/// Grayscale and color views of one captured frame.
#[derive(Debug, Clone)]
pub struct FramePair {
    pub gray: GrayImage,
    pub color: RgbImage,
}

impl FramePair {
    /// Split a decoded frame into its grayscale and color variants.
    pub fn from_image(img: &DynamicImage) -> Self {
        if is_color(img) {
            Self {
                gray: img.to_luma8(),
                color: img.to_rgb8(),
            }
        } else {
            let gray = img.to_luma8();
            let color = DynamicImage::ImageLuma8(gray.clone()).to_rgb8();
            Self { gray, color }
        }
    }

    /// Frame dimensions (width, height)
    pub fn dimensions(&self) -> (u32, u32) {
        self.gray.dimensions()
    }
}

fn is_color(img: &DynamicImage) -> bool {
    img.color().has_color()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, Rgb};

    /// Test: Load missing file returns error
    /// Validates: Decode failures carry the offending path
    #[test]
    fn test_load_missing_file() {
        let result = load_frame("/nonexistent/path/0001.png");
        match result {
            Err(FrameError::Decode { path, .. }) => {
                assert_eq!(path, PathBuf::from("/nonexistent/path/0001.png"));
            }
            other => panic!("expected decode error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_load_garbage_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.png");
        std::fs::write(&path, b"not a png").unwrap();

        assert!(matches!(load_frame(&path), Err(FrameError::Decode { .. })));
    }

    /// Test: Color source split
    /// Validates: Color is preserved, gray is luminance
    #[test]
    fn test_color_source_split() {
        let rgb = RgbImage::from_pixel(4, 2, Rgb([255, 0, 0]));
        let pair = FramePair::from_image(&DynamicImage::ImageRgb8(rgb));

        assert_eq!(pair.dimensions(), (4, 2));
        assert_eq!(pair.color.get_pixel(0, 0), &Rgb([255, 0, 0]));
        let luma = pair.gray.get_pixel(0, 0)[0];
        assert!(luma > 0 && luma < 255);
    }

    /// Test: Gray source split
    /// Validates: Gray passes through, color replicates the channel
    #[test]
    fn test_gray_source_split() {
        let gray = GrayImage::from_pixel(3, 3, Luma([77]));
        let pair = FramePair::from_image(&DynamicImage::ImageLuma8(gray));

        assert_eq!(pair.gray.get_pixel(1, 1), &Luma([77]));
        assert_eq!(pair.color.get_pixel(1, 1), &Rgb([77, 77, 77]));
    }

    #[test]
    fn test_roundtrip_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("1000.png");
        GrayImage::from_pixel(8, 6, Luma([12])).save(&path).unwrap();

        let img = load_frame(&path).unwrap();
        assert_eq!((img.width(), img.height()), (8, 6));
        assert!(!is_color(&img));
    }
}
