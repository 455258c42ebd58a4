//! End-to-end stereo calibration: frames -> correspondences -> extrinsics ->
//! rig, plus the JSON run configuration.

use crate::camera_info::CameraInfoError;
use crate::correspondence::{BoardDetector, CorrespondenceBuilder, CorrespondenceError};
use crate::frames::{list_frames, pair_by_filename, FrameError};
use crate::monocular::{MonocularCalibrator, MonocularError};
use crate::rig::{
    check_camera_names, ExportError, RigError, StereoRig, DEFAULT_CAM1_NAME, DEFAULT_CAM2_NAME,
};
use log::info;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use stereo_calib_chessboard::ChessboardParams;
use stereo_calib_core::{
    CameraIntrinsics, CheckerboardPattern, CorrespondenceSet, DistortionModel, ImageSize,
    PatternError,
};
use stereo_calib_extrinsics::{
    SolveError, StereoExtrinsicSolver, StereoSolution, StereoSolverParams,
};

#[cfg(feature = "tracing")]
use tracing::instrument;

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Any failure of a calibration run.
#[derive(thiserror::Error, Debug)]
pub enum StereoCalibError {
    #[error(transparent)]
    Pattern(#[from] PatternError),
    #[error(transparent)]
    Frames(#[from] FrameError),
    #[error(transparent)]
    Correspondence(#[from] CorrespondenceError),
    #[error(transparent)]
    Solve(#[from] SolveError),
    #[error(transparent)]
    Rig(#[from] RigError),
    #[error(transparent)]
    Export(#[from] ExportError),
    #[error(transparent)]
    CameraInfo(#[from] CameraInfoError),
    #[error(transparent)]
    Monocular(#[from] MonocularError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// ChESS corner detector settings exposed in the run configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChessCornerSettings {
    pub threshold_rel: f32,
    pub nms_radius: u32,
}

impl Default for ChessCornerSettings {
    fn default() -> Self {
        Self {
            threshold_rel: 0.2,
            nms_radius: 2,
        }
    }
}

#[cfg(feature = "image")]
impl ChessCornerSettings {
    pub fn to_chess_config(&self) -> chess_corners::ChessConfig {
        let mut cfg = crate::detect::default_chess_config();
        cfg.params.threshold_rel = self.threshold_rel;
        cfg.params.nms_radius = self.nms_radius;
        cfg
    }
}

/// How frame `i` of the second sequence is chosen.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FramePairing {
    /// `i`-th file of each directory in natural order.
    #[default]
    Index,
    /// File of the same name in the second directory.
    FileName,
}

/// Run configuration; every field has a default.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StereoCalibConfig {
    pub chessboard: ChessboardParams,
    pub chess: ChessCornerSettings,
    pub solver: StereoSolverParams,
    pub pairing: FramePairing,
    pub cam1_name: String,
    pub cam2_name: String,
}

impl Default for StereoCalibConfig {
    fn default() -> Self {
        Self {
            chessboard: ChessboardParams::default(),
            chess: ChessCornerSettings::default(),
            solver: StereoSolverParams::default(),
            pairing: FramePairing::default(),
            cam1_name: DEFAULT_CAM1_NAME.to_string(),
            cam2_name: DEFAULT_CAM2_NAME.to_string(),
        }
    }
}

impl StereoCalibConfig {
    /// Load a JSON config from disk.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Settings that would only fail at export time.
    pub fn validate(&self) -> Result<(), ExportError> {
        check_camera_names(&self.cam1_name, &self.cam2_name)
    }

    /// Write this config to disk as pretty JSON.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }
}

/// Summary of a successful run, in the units users read.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StereoCalibrationReport {
    pub cam1_name: String,
    pub cam2_name: String,
    /// RMS reprojection error, pixels.
    pub rms: f64,
    pub iterations: usize,
    pub frames_used: usize,
    pub total_pairs: usize,
    pub dropped_frames: Vec<usize>,
    pub image_size1: Option<ImageSize>,
    pub image_size2: Option<ImageSize>,
    pub rotation: [[f64; 3]; 3],
    pub rotation_vector_deg: [f64; 3],
    pub euler_xyz_deg: [f64; 3],
    pub translation: [f64; 3],
}

impl StereoCalibrationReport {
    pub fn new(
        solution: &StereoSolution,
        set: &CorrespondenceSet,
        cam1_name: &str,
        cam2_name: &str,
    ) -> Self {
        let m = solution.rotation.matrix();
        Self {
            cam1_name: cam1_name.to_string(),
            cam2_name: cam2_name.to_string(),
            rms: solution.rms,
            iterations: solution.iterations,
            frames_used: solution.frames_used,
            total_pairs: set.total_pairs,
            dropped_frames: set.dropped.clone(),
            image_size1: set.image_size1,
            image_size2: set.image_size2,
            rotation: std::array::from_fn(|r| std::array::from_fn(|c| m[(r, c)])),
            rotation_vector_deg: solution.rotation_vector_deg().into(),
            euler_xyz_deg: solution.euler_xyz_deg().into(),
            translation: solution.translation.into(),
        }
    }
}

fn fmt_vec3(v: &[f64; 3]) -> String {
    format!("[{:.6}, {:.6}, {:.6}]", v[0], v[1], v[2])
}

impl fmt::Display for StereoCalibrationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (a, b) = (&self.cam1_name, &self.cam2_name);
        writeln!(f, "-------- RESULTS ----------")?;
        writeln!(
            f,
            "frames used: {}/{} pairs",
            self.frames_used, self.total_pairs
        )?;
        writeln!(f, "final reprojection error: {:.6} px", self.rms)?;
        writeln!(f, "rotation {a} -> {b} (as rotation matrix)")?;
        for row in &self.rotation {
            writeln!(f, "  {}", fmt_vec3(row))?;
        }
        writeln!(f, "rotation {a} -> {b} (as xyz rotation vector, deg)")?;
        writeln!(f, "  {}", fmt_vec3(&self.rotation_vector_deg))?;
        writeln!(f, "translation {a} -> {b}")?;
        write!(f, "  {}", fmt_vec3(&self.translation))
    }
}

/// Everything a successful run produces.
#[derive(Clone, Debug)]
pub struct StereoCalibration {
    pub rig: StereoRig,
    pub solution: StereoSolution,
    pub correspondences: CorrespondenceSet,
    pub report: StereoCalibrationReport,
}

impl StereoCalibration {
    /// Export the rig under the camera names of the report.
    pub fn export(&self, path: impl AsRef<Path>) -> Result<(), ExportError> {
        self.rig
            .export(path, &self.report.cam1_name, &self.report.cam2_name)
    }
}

/// Frame sequences of both cameras, paired according to `pairing`.
pub fn collect_frame_pairs(
    dir1: &Path,
    dir2: &Path,
    pairing: FramePairing,
) -> Result<(Vec<PathBuf>, Vec<PathBuf>), FrameError> {
    let frames1 = list_frames(dir1)?;
    let frames2 = match pairing {
        FramePairing::Index => list_frames(dir2)?,
        FramePairing::FileName => pair_by_filename(&frames1, dir2),
    };
    Ok((frames1, frames2))
}

/// Detect, pair and solve with fixed intrinsics, then assemble the rig.
///
/// Frame `i` of `frames1` and `frames2` must show the same instant.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "info", skip_all, fields(pairs = frames1.len(), pattern = %pattern))
)]
pub fn calibrate_stereo<D: BoardDetector>(
    builder: &CorrespondenceBuilder<D>,
    frames1: &[PathBuf],
    frames2: &[PathBuf],
    pattern: &CheckerboardPattern,
    cam1: &CameraIntrinsics,
    cam2: &CameraIntrinsics,
    config: &StereoCalibConfig,
) -> Result<StereoCalibration, StereoCalibError> {
    config.validate()?;
    let correspondences = builder.build(frames1, frames2, pattern)?;

    let solver = StereoExtrinsicSolver::new(config.solver.clone());
    let solution = solver.solve(
        cam1,
        cam2,
        &correspondences.object_points(),
        &correspondences.frames,
    )?;

    let rig = StereoRig::builder()
        .cam1(cam1.clone())
        .cam2(cam2.clone())
        .extrinsics(&solution)
        .build()?;

    let report = StereoCalibrationReport::new(
        &solution,
        &correspondences,
        &config.cam1_name,
        &config.cam2_name,
    );
    for line in report.to_string().lines() {
        info!("{line}");
    }

    Ok(StereoCalibration {
        rig,
        solution,
        correspondences,
        report,
    })
}

/// Inputs of a checkerboard run on two image directories.
#[derive(Clone, Debug)]
pub struct StereoCalibInput {
    pub frames_dir1: PathBuf,
    pub frames_dir2: PathBuf,
    pub cam1: CameraIntrinsics,
    pub cam2: CameraIntrinsics,
    pub pattern: CheckerboardPattern,
}

/// Full run on image directories with the ChESS-based checkerboard finder.
#[cfg(feature = "image")]
pub fn calibrate_stereo_checkerboard(
    input: &StereoCalibInput,
    config: &StereoCalibConfig,
) -> Result<StereoCalibration, StereoCalibError> {
    config.validate()?;
    let (frames1, frames2) =
        collect_frame_pairs(&input.frames_dir1, &input.frames_dir2, config.pairing)?;
    info!(
        "{} frames for {}, {} for {}",
        frames1.len(),
        config.cam1_name,
        frames2.len(),
        config.cam2_name
    );

    let finder = crate::detect::CheckerboardFinder::new(
        config.chess.to_chess_config(),
        config.chessboard.clone(),
    );
    calibrate_stereo(
        &CorrespondenceBuilder::new(finder),
        &frames1,
        &frames2,
        &input.pattern,
        &input.cam1,
        &input.cam2,
        config,
    )
}

/// Intrinsics of both cameras from a monocular calibrator, one image
/// directory per camera.
pub fn calibrate_intrinsics_pair<M: MonocularCalibrator + ?Sized>(
    calibrator: &M,
    image_dir1: &Path,
    image_dir2: &Path,
    model: DistortionModel,
) -> Result<(CameraIntrinsics, CameraIntrinsics), StereoCalibError> {
    let cam1 = calibrator.calibrate(image_dir1, model)?;
    let cam2 = calibrator.calibrate(image_dir2, model)?;
    Ok((cam1, cam2))
}
