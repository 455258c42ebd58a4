//! Calibrated two-camera rig and its exported document.
//!
//! The document is a flat map of number lists:
//!
//! | key | values |
//! |---|---|
//! | `{name1}_k`, `{name2}_k` | `fx, fy, cx, cy` |
//! | `{name1}_d`, `{name2}_d` | distortion coefficients (4 or 8) |
//! | `{name1}_to_{name2}_rotation` | 3x3 rotation, row-major |
//! | `{name1}_to_{name2}_translation` | `tx, ty, tz` |
//!
//! Downstream loaders depend on these key names. Keys are written in sorted
//! order.

use nalgebra::{Isometry3, Matrix3, Rotation3, Translation3, UnitQuaternion, Vector3};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use stereo_calib_core::CameraIntrinsics;
use stereo_calib_extrinsics::{orthonormalize, StereoSolution};

pub const DEFAULT_CAM1_NAME: &str = "cam1";
pub const DEFAULT_CAM2_NAME: &str = "cam2";

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum RigError {
    #[error("stereo rig is incomplete: {0}")]
    Precondition(&'static str),
}

#[derive(thiserror::Error, Debug)]
pub enum ExportError {
    #[error("cannot write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("unsupported export extension for {0}; use .yaml, .yml or .json")]
    UnsupportedExtension(PathBuf),

    #[error("camera names must be non-empty and distinct (got `{0}` and `{1}`)")]
    InvalidCameraNames(String, String),

    #[error(transparent)]
    Precondition(#[from] RigError),
}

/// Camera names must be non-empty and distinct for the document keys to be
/// unambiguous.
pub fn check_camera_names(name1: &str, name2: &str) -> Result<(), ExportError> {
    if name1.is_empty() || name2.is_empty() || name1 == name2 {
        return Err(ExportError::InvalidCameraNames(
            name1.to_string(),
            name2.to_string(),
        ));
    }
    Ok(())
}

/// Flat key -> values document, ordered by key.
pub type RigDocument = BTreeMap<String, Vec<f64>>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExportFormat {
    Yaml,
    Json,
}

impl ExportFormat {
    /// Format from the file extension; no extension means YAML.
    pub fn from_path(path: &Path) -> Result<Self, ExportError> {
        match path.extension().and_then(|e| e.to_str()) {
            None => Ok(Self::Yaml),
            Some(ext) if ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml") => {
                Ok(Self::Yaml)
            }
            Some(ext) if ext.eq_ignore_ascii_case("json") => Ok(Self::Json),
            Some(_) => Err(ExportError::UnsupportedExtension(path.to_path_buf())),
        }
    }
}

/// Intrinsics of both cameras plus the cam1 -> cam2 transform
/// `X_cam2 = R * X_cam1 + t`.
///
/// Only constructed complete, through [`StereoRigBuilder`].
#[derive(Clone, Debug, PartialEq)]
pub struct StereoRig {
    cam1: CameraIntrinsics,
    cam2: CameraIntrinsics,
    rotation: Rotation3<f64>,
    translation: Vector3<f64>,
}

impl StereoRig {
    pub fn builder() -> StereoRigBuilder {
        StereoRigBuilder::default()
    }

    pub fn cam1(&self) -> &CameraIntrinsics {
        &self.cam1
    }

    pub fn cam2(&self) -> &CameraIntrinsics {
        &self.cam2
    }

    pub fn rotation(&self) -> &Rotation3<f64> {
        &self.rotation
    }

    pub fn translation(&self) -> &Vector3<f64> {
        &self.translation
    }

    pub fn cam2_from_cam1(&self) -> Isometry3<f64> {
        Isometry3::from_parts(
            Translation3::from(self.translation),
            UnitQuaternion::from_rotation_matrix(&self.rotation),
        )
    }

    /// Rotation flattened row by row.
    pub fn rotation_row_major(&self) -> [f64; 9] {
        let m = self.rotation.matrix();
        std::array::from_fn(|k| m[(k / 3, k % 3)])
    }

    /// Export document with keys derived from the two camera names.
    pub fn to_document(&self, name1: &str, name2: &str) -> Result<RigDocument, ExportError> {
        check_camera_names(name1, name2)?;
        let mut doc = RigDocument::new();
        doc.insert(format!("{name1}_k"), self.cam1.k().to_vec());
        doc.insert(format!("{name1}_d"), self.cam1.distortion().to_vec());
        doc.insert(format!("{name2}_k"), self.cam2.k().to_vec());
        doc.insert(format!("{name2}_d"), self.cam2.distortion().to_vec());
        doc.insert(
            format!("{name1}_to_{name2}_rotation"),
            self.rotation_row_major().to_vec(),
        );
        doc.insert(
            format!("{name1}_to_{name2}_translation"),
            self.translation.iter().copied().collect(),
        );
        Ok(doc)
    }

    pub fn to_yaml_string(&self, name1: &str, name2: &str) -> Result<String, ExportError> {
        Ok(serde_yaml::to_string(&self.to_document(name1, name2)?)?)
    }

    pub fn to_json_string(&self, name1: &str, name2: &str) -> Result<String, ExportError> {
        Ok(serde_json::to_string_pretty(&self.to_document(name1, name2)?)?)
    }

    pub fn to_string_as(
        &self,
        format: ExportFormat,
        name1: &str,
        name2: &str,
    ) -> Result<String, ExportError> {
        match format {
            ExportFormat::Yaml => self.to_yaml_string(name1, name2),
            ExportFormat::Json => self.to_json_string(name1, name2),
        }
    }

    /// Write the document to `path`, YAML or JSON by extension. Parent
    /// directories are created. Nothing is written if the document cannot be
    /// built.
    pub fn export(
        &self,
        path: impl AsRef<Path>,
        name1: &str,
        name2: &str,
    ) -> Result<(), ExportError> {
        let path = path.as_ref();
        let text = self.to_string_as(ExportFormat::from_path(path)?, name1, name2)?;

        let io_err = |source| ExportError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let mut out = BufWriter::new(File::create(path).map_err(io_err)?);
        out.write_all(text.as_bytes()).map_err(io_err)?;
        out.flush().map_err(io_err)?;
        log::info!("saved stereo rig to {}", path.display());
        Ok(())
    }
}

/// Assembles a [`StereoRig`] in one step; `build` fails on any missing part.
#[derive(Clone, Debug, Default)]
pub struct StereoRigBuilder {
    cam1: Option<CameraIntrinsics>,
    cam2: Option<CameraIntrinsics>,
    rotation: Option<Rotation3<f64>>,
    translation: Option<Vector3<f64>>,
}

impl StereoRigBuilder {
    pub fn cam1(mut self, camera: CameraIntrinsics) -> Self {
        self.cam1 = Some(camera);
        self
    }

    pub fn cam2(mut self, camera: CameraIntrinsics) -> Self {
        self.cam2 = Some(camera);
        self
    }

    pub fn rotation(mut self, rotation: Rotation3<f64>) -> Self {
        self.rotation = Some(rotation);
        self
    }

    pub fn translation(mut self, translation: Vector3<f64>) -> Self {
        self.translation = Some(translation);
        self
    }

    /// Take rotation and translation from a stereo solve.
    pub fn extrinsics(self, solution: &StereoSolution) -> Self {
        self.rotation(solution.rotation)
            .translation(solution.translation)
    }

    pub fn build(self) -> Result<StereoRig, RigError> {
        let cam1 = self
            .cam1
            .ok_or(RigError::Precondition("cam1 intrinsics not set"))?;
        let cam2 = self
            .cam2
            .ok_or(RigError::Precondition("cam2 intrinsics not set"))?;
        let rotation = self
            .rotation
            .ok_or(RigError::Precondition("rotation not set; run calibration first"))?;
        let translation = self
            .translation
            .ok_or(RigError::Precondition("translation not set; run calibration first"))?;
        if !translation.iter().all(|v| v.is_finite()) {
            return Err(RigError::Precondition("translation is not finite"));
        }
        let rotation = orthonormalize(rotation.matrix())
            .ok_or(RigError::Precondition("rotation is not finite"))?;
        Ok(StereoRig {
            cam1,
            cam2,
            rotation,
            translation,
        })
    }
}

/// Rotation from a row-major 3x3 array, projected onto SO(3).
pub fn rotation_from_row_major(values: &[f64; 9]) -> Option<Rotation3<f64>> {
    orthonormalize(&Matrix3::from_row_slice(values))
}
