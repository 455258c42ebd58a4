//! Stereo rig extrinsic calibration from synchronized checkerboard image
//! sequences.
//!
//! This crate provides:
//! - re-exports of the workspace crates (`core`, `chessboard`, `extrinsics`)
//! - frame discovery with natural filename ordering
//! - the correspondence builder pairing per-frame detections of two cameras
//! - the [`StereoRig`] model and its YAML/JSON export
//! - camera-info file I/O and the [`MonocularCalibrator`] capability
//! - (feature `image`) ChESS-based checkerboard detection on image files and
//!   the end-to-end [`calibrate_stereo_checkerboard`] run
//!
//! ## Quickstart
//!
//! ```no_run
//! use stereo_calib::{
//!     calibrate_stereo_checkerboard, load_camera_info, StereoCalibConfig, StereoCalibInput,
//! };
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let input = StereoCalibInput {
//!     frames_dir1: "data/ir".into(),
//!     frames_dir2: "data/rgb".into(),
//!     cam1: load_camera_info("data/ir/camera_info.txt")?,
//!     cam2: load_camera_info("data/rgb/camera_info.txt")?,
//!     pattern: "7x6x70".parse()?,
//! };
//! let run = calibrate_stereo_checkerboard(&input, &StereoCalibConfig::default())?;
//! println!("{}", run.report);
//! run.export("rig.yaml")?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Synchronization
//!
//! Frame `i` of both sequences must depict the same board pose at the same
//! instant. Nothing here can verify that; offset sequences produce a
//! plausible but wrong rig. The solver logs a warning for frames whose
//! relative pose disagrees strongly with the rest.

pub use stereo_calib_chessboard as chessboard;
pub use stereo_calib_core as core;
pub use stereo_calib_extrinsics as extrinsics;

pub use stereo_calib_core::{
    CameraIntrinsics, CheckerboardPattern, CorrespondenceSet, Detection, DistortionModel,
    FrameCorrespondence, ImageSize,
};
pub use stereo_calib_extrinsics::{SolveError, StereoExtrinsicSolver, StereoSolution};

mod camera_info;
mod correspondence;
mod frames;
mod monocular;
mod pipeline;
mod rig;

#[cfg(feature = "image")]
pub mod detect;

pub use camera_info::{
    format_camera_info, load_camera_info, parse_camera_info, save_camera_info, CameraInfoError,
    ParseFailure,
};
pub use correspondence::{BoardDetector, CorrespondenceBuilder, CorrespondenceError};
pub use frames::{
    list_frames, natural_cmp, natural_sort, natural_sort_paths, pair_by_filename, FrameError,
};
pub use monocular::{CameraInfoFile, MonocularCalibrator, MonocularError, CAMERA_INFO_FILE_NAME};
pub use pipeline::{
    calibrate_intrinsics_pair, calibrate_stereo, collect_frame_pairs, ChessCornerSettings,
    ConfigError, FramePairing, StereoCalibConfig, StereoCalibError, StereoCalibInput,
    StereoCalibration, StereoCalibrationReport,
};
pub use rig::{
    check_camera_names, rotation_from_row_major, ExportError, ExportFormat, RigDocument, RigError,
    StereoRig, StereoRigBuilder, DEFAULT_CAM1_NAME, DEFAULT_CAM2_NAME,
};

#[cfg(feature = "image")]
pub use pipeline::calibrate_stereo_checkerboard;
