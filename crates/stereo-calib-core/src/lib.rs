//! Core types for stereo checkerboard calibration.
//!
//! This crate is small and purely geometric: checkerboard layouts, fixed
//! camera intrinsics with OpenCV-style distortion, per-frame detections and
//! stereo correspondences. It does *not* depend on any corner detector,
//! image decoder or solver.

mod camera;
mod corner;
mod correspondence;
mod homography;
mod image;
mod logger;
mod pattern;
pub mod synthetic;

pub use camera::{CameraIntrinsics, DistortionError, DistortionModel, IntrinsicsError};
pub use corner::Corner;
pub use correspondence::{CorrespondenceSet, Detection, FrameCorrespondence, ImageSize};
pub use homography::{estimate_homography, Homography};
pub use image::{sample_bilinear, GrayImage, GrayImageView};
pub use pattern::{CheckerboardPattern, PatternError};

#[cfg(feature = "tracing")]
pub use logger::{init_tracing, init_tracing_with_filter};

pub use logger::{init_with_level, verbosity_level, workspace_filter, DEFAULT_FILTER};
