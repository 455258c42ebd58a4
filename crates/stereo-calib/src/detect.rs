//! Image-level checkerboard detection: decode, run the ChESS corner detector
//! (`chess-corners`), then the grid detector.

use crate::correspondence::{BoardDetector, CorrespondenceError};
use chess_corners::{find_chess_corners_image, ChessConfig, CornerDescriptor};
use image::{GrayImage, ImageReader};
use nalgebra::Point2;
use std::path::Path;
use stereo_calib_chessboard::{ChessboardDetector, ChessboardParams};
use stereo_calib_core::{CheckerboardPattern, Corner, Detection, GrayImageView, ImageSize};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Default settings for the `chess-corners` ChESS detector.
pub fn default_chess_config() -> ChessConfig {
    let mut cfg = ChessConfig::single_scale();
    cfg.params.threshold_rel = 0.2;
    cfg.params.nms_radius = 2;
    cfg
}

/// Borrow an `image::GrayImage` as a core image view.
pub fn gray_view(img: &GrayImage) -> GrayImageView<'_> {
    GrayImageView {
        width: img.width() as usize,
        height: img.height() as usize,
        data: img.as_raw(),
    }
}

/// Raw ChESS corners adapted to the core corner type.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "debug", skip(img, cfg), fields(width = img.width(), height = img.height()))
)]
pub fn detect_corners(img: &GrayImage, cfg: &ChessConfig) -> Vec<Corner> {
    find_chess_corners_image(img, cfg)
        .iter()
        .map(adapt_chess_corner)
        .collect()
}

fn adapt_chess_corner(c: &CornerDescriptor) -> Corner {
    Corner {
        position: Point2::new(c.x, c.y),
        orientation: c.orientation,
        strength: c.response,
    }
}

/// Decode any supported image file to 8-bit grayscale.
pub fn load_gray(path: &Path) -> Result<GrayImage, CorrespondenceError> {
    let load_err = |source: image::ImageError| CorrespondenceError::ImageLoad {
        path: path.to_path_buf(),
        source: Box::new(source),
    };
    let img = ImageReader::open(path)
        .map_err(|e| load_err(image::ImageError::IoError(e)))?
        .with_guessed_format()
        .map_err(|e| load_err(image::ImageError::IoError(e)))?
        .decode()
        .map_err(load_err)?;
    Ok(img.to_luma8())
}

/// ChESS corners + grid detector + sub-pixel refinement on image files.
#[derive(Clone)]
pub struct CheckerboardFinder {
    pub chess: ChessConfig,
    pub detector: ChessboardDetector,
}

impl Default for CheckerboardFinder {
    fn default() -> Self {
        Self::new(default_chess_config(), ChessboardParams::default())
    }
}

impl CheckerboardFinder {
    pub fn new(chess: ChessConfig, params: ChessboardParams) -> Self {
        Self {
            chess,
            detector: ChessboardDetector::new(params),
        }
    }

    /// Detect the board in a decoded image.
    pub fn detect_image(&self, img: &GrayImage, pattern: &CheckerboardPattern) -> Detection {
        let corners = detect_corners(img, &self.chess);
        self.detector.detect(&gray_view(img), &corners, pattern)
    }
}

impl BoardDetector for CheckerboardFinder {
    fn detect(
        &self,
        path: &Path,
        pattern: &CheckerboardPattern,
    ) -> Result<(Detection, ImageSize), CorrespondenceError> {
        let img = load_gray(path)?;
        let size = ImageSize::new(img.width(), img.height());
        let detection = self.detect_image(&img, pattern);
        if !detection.is_detected() {
            log::debug!("no {pattern} board in {}", path.display());
        }
        Ok((detection, size))
    }
}
