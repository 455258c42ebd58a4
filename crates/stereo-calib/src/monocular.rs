//! Per-camera intrinsic calibration as a capability.
//!
//! The stereo pipeline only needs fixed intrinsics for each camera; how they
//! are obtained (an SfM engine, a target-based calibrator, a file written by
//! an earlier run) stays behind [`MonocularCalibrator`].

use crate::camera_info::{load_camera_info, CameraInfoError};
use std::path::{Path, PathBuf};
use stereo_calib_core::{CameraIntrinsics, DistortionModel};

/// File name looked up inside an image directory by
/// [`CameraInfoFile::beside_images`].
pub const CAMERA_INFO_FILE_NAME: &str = "camera_info.txt";

#[derive(thiserror::Error, Debug)]
pub enum MonocularError {
    #[error(transparent)]
    CameraInfo(#[from] CameraInfoError),

    #[error("requested {requested} intrinsics, but {source_name} provides {found}")]
    ModelMismatch {
        requested: DistortionModel,
        found: DistortionModel,
        source_name: String,
    },

    #[error("monocular calibration failed for {dir}: {reason}")]
    Failed { dir: PathBuf, reason: String },
}

pub trait MonocularCalibrator {
    /// Intrinsics of the camera that captured the images in `image_dir`,
    /// expressed in `model`.
    fn calibrate(
        &self,
        image_dir: &Path,
        model: DistortionModel,
    ) -> Result<CameraIntrinsics, MonocularError>;
}

/// Serves precomputed intrinsics from a camera-info file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CameraInfoFile {
    path: Option<PathBuf>,
}

impl CameraInfoFile {
    /// Always read `path`, whatever image directory is asked for.
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
        }
    }

    /// Read `camera_info.txt` from the image directory being calibrated.
    pub fn beside_images() -> Self {
        Self { path: None }
    }

    fn resolve(&self, image_dir: &Path) -> PathBuf {
        match &self.path {
            Some(p) => p.clone(),
            None => image_dir.join(CAMERA_INFO_FILE_NAME),
        }
    }
}

impl MonocularCalibrator for CameraInfoFile {
    fn calibrate(
        &self,
        image_dir: &Path,
        model: DistortionModel,
    ) -> Result<CameraIntrinsics, MonocularError> {
        let path = self.resolve(image_dir);
        let camera = load_camera_info(&path)?;
        if camera.model() != model {
            return Err(MonocularError::ModelMismatch {
                requested: model,
                found: camera.model(),
                source_name: path.display().to_string(),
            });
        }
        Ok(camera)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera_info::save_camera_info;

    fn camera() -> CameraIntrinsics {
        CameraIntrinsics::new(
            DistortionModel::PinholeRadtan,
            500.0,
            500.0,
            320.0,
            240.0,
            vec![0.01, 0.0, 0.0, 0.0],
        )
        .unwrap()
    }

    #[test]
    fn serves_file_beside_images() {
        let dir = tempfile::tempdir().unwrap();
        save_camera_info(&camera(), dir.path().join(CAMERA_INFO_FILE_NAME)).unwrap();

        let got = CameraInfoFile::beside_images()
            .calibrate(dir.path(), DistortionModel::PinholeRadtan)
            .unwrap();
        assert_eq!(camera(), got);
    }

    #[test]
    fn model_mismatch_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ir.txt");
        save_camera_info(&camera(), &path).unwrap();

        let err = CameraInfoFile::at(&path)
            .calibrate(Path::new("/unused"), DistortionModel::PinholeRadtanFull)
            .unwrap_err();
        assert!(matches!(
            err,
            MonocularError::ModelMismatch {
                requested: DistortionModel::PinholeRadtanFull,
                found: DistortionModel::PinholeRadtan,
                ..
            }
        ));
        assert!(err.to_string().contains("FULL_OPENCV"));
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = CameraInfoFile::beside_images()
            .calibrate(dir.path(), DistortionModel::PinholeRadtan)
            .unwrap_err();
        assert!(matches!(err, MonocularError::CameraInfo(_)));
    }
}
