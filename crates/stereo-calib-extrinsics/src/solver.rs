//! Stereo extrinsic calibration with fixed intrinsics.
//!
//! Unknowns are the rig transform `cam2_from_cam1` and one board pose
//! `cam1_from_board` per frame, each parameterised as a scaled rotation axis
//! and a translation. Residuals are the reprojection errors of every pattern
//! point in both cameras.

use crate::backend::{self, TermCriteria};
use crate::pose::{average_isometries, orthonormalize, planar_pose};
use levenberg_marquardt::LeastSquaresProblem;
use log::{debug, info, warn};
use nalgebra::{
    storage::Owned, DMatrix, DVector, Dyn, Isometry3, Point2, Point3, Rotation3, Translation3,
    UnitQuaternion, Vector3,
};
use serde::{Deserialize, Serialize};
use stereo_calib_core::{CameraIntrinsics, FrameCorrespondence};

#[cfg(feature = "tracing")]
use tracing::instrument;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum SolveError {
    #[error("insufficient observations: {usable} usable frame(s), at least {required} required")]
    InsufficientObservations { usable: usize, required: usize },

    #[error(
        "solver did not converge after {iterations} evaluation(s): {reason} (rms: {})",
        fmt_rms(.rms)
    )]
    NumericalDivergence {
        iterations: usize,
        reason: String,
        rms: Option<f64>,
    },

    #[error("frame {frame}: expected {expected} image points, got {got}")]
    PointCountMismatch {
        frame: usize,
        expected: usize,
        got: usize,
    },

    #[error("pattern needs at least 4 object points, got {0}")]
    TooFewObjectPoints(usize),

    #[error("frame {frame}: cannot initialise board pose in camera {camera}")]
    PoseInitialization { frame: usize, camera: u8 },
}

fn fmt_rms(rms: &Option<f64>) -> String {
    rms.map_or_else(|| "n/a".to_string(), |r| format!("{r:.4} px"))
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StereoSolverParams {
    pub criteria: TermCriteria,
    /// Fewest stereo frames accepted for a solve.
    pub min_observations: usize,
}

impl Default for StereoSolverParams {
    fn default() -> Self {
        Self {
            criteria: TermCriteria::default(),
            min_observations: 3,
        }
    }
}

/// Result of a successful stereo solve.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StereoSolution {
    /// Rotation from the cam1 frame to the cam2 frame.
    pub rotation: Rotation3<f64>,
    /// Translation from the cam1 frame to the cam2 frame, in pattern units.
    pub translation: Vector3<f64>,
    /// RMS reprojection error over all points of both cameras, pixels.
    pub rms: f64,
    /// Residual evaluations spent by the minimizer.
    pub iterations: usize,
    pub frames_used: usize,
    /// Refined `cam1_from_board` per input frame.
    pub board_poses: Vec<Isometry3<f64>>,
}

impl StereoSolution {
    /// `X_cam2 = R * X_cam1 + t`.
    pub fn cam2_from_cam1(&self) -> Isometry3<f64> {
        Isometry3::from_parts(
            Translation3::from(self.translation),
            UnitQuaternion::from_rotation_matrix(&self.rotation),
        )
    }

    /// Axis-angle rotation vector, degrees.
    pub fn rotation_vector_deg(&self) -> Vector3<f64> {
        self.rotation.scaled_axis().map(f64::to_degrees)
    }

    /// Extrinsic `x-y-z` Euler angles (`R = Rz * Ry * Rx`), degrees.
    pub fn euler_xyz_deg(&self) -> Vector3<f64> {
        let (roll, pitch, yaw) = self.rotation.euler_angles();
        Vector3::new(roll, pitch, yaw).map(f64::to_degrees)
    }
}

#[derive(Clone, Debug, Default)]
pub struct StereoExtrinsicSolver {
    pub params: StereoSolverParams,
}

impl StereoExtrinsicSolver {
    pub fn new(params: StereoSolverParams) -> Self {
        Self { params }
    }

    /// Estimate the cam1 -> cam2 transform from index-aligned stereo
    /// observations of a planar (`z = 0`) pattern. Intrinsics are held fixed.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "info", skip_all, fields(frames = frames.len(), points = object_points.len()))
    )]
    pub fn solve(
        &self,
        cam1: &CameraIntrinsics,
        cam2: &CameraIntrinsics,
        object_points: &[Point3<f64>],
        frames: &[FrameCorrespondence],
    ) -> Result<StereoSolution, SolveError> {
        let required = self.params.min_observations.max(1);
        if frames.len() < required {
            return Err(SolveError::InsufficientObservations {
                usable: frames.len(),
                required,
            });
        }
        if object_points.len() < 4 {
            return Err(SolveError::TooFewObjectPoints(object_points.len()));
        }
        for f in frames {
            for got in [f.image_points1.len(), f.image_points2.len()] {
                if got != object_points.len() {
                    return Err(SolveError::PointCountMismatch {
                        frame: f.frame_index,
                        expected: object_points.len(),
                        got,
                    });
                }
            }
        }

        let mut problem = StereoProblem {
            cam1,
            cam2,
            object: object_points,
            frames,
            params: DVector::zeros(0),
        };
        problem.params = self.initial_guess(&problem)?;
        if let Some(rms) = problem.rms() {
            debug!("initial stereo rms {rms:.4} px");
        }
        let (problem, iterations) = self.refine(problem)?;
        let rms = problem.rms().ok_or_else(|| SolveError::NumericalDivergence {
            iterations,
            reason: "residuals not computable at the minimum".to_string(),
            rms: None,
        })?;

        let (rig, board_poses) = problem.unpack(&problem.params);
        let rotation = orthonormalize(rig.rotation.to_rotation_matrix().matrix()).ok_or_else(
            || SolveError::NumericalDivergence {
                iterations,
                reason: "rotation is not finite".to_string(),
                rms: Some(rms),
            },
        )?;

        info!(
            "stereo extrinsics from {} frames: rms {:.4} px, {} evaluations",
            frames.len(),
            rms,
            iterations
        );
        if rms > 2.0 {
            warn!("high stereo reprojection error ({rms:.3} px); check frame synchronization and intrinsics");
        }

        Ok(StereoSolution {
            rotation,
            translation: rig.translation.vector,
            rms,
            iterations,
            frames_used: frames.len(),
            board_poses,
        })
    }

    /// Joint Levenberg-Marquardt refinement from `problem.params`.
    fn refine<'a>(
        &self,
        problem: StereoProblem<'a>,
    ) -> Result<(StereoProblem<'a>, usize), SolveError> {
        let (problem, report) = self.params.criteria.levenberg_marquardt().minimize(problem);
        debug!(
            "stereo lm: {:?} after {} evaluations, objective {:.6e}",
            report.termination, report.number_of_evaluations, report.objective_function
        );
        if !backend::converged(&report) {
            return Err(SolveError::NumericalDivergence {
                iterations: report.number_of_evaluations,
                reason: backend::describe(&report.termination),
                rms: problem.rms(),
            });
        }
        Ok((problem, report.number_of_evaluations))
    }

    /// Planar pose of the board in each camera, rig transform averaged over
    /// frames; board poses start at the cam1 estimates.
    fn initial_guess(&self, problem: &StereoProblem<'_>) -> Result<DVector<f64>, SolveError> {
        let mut relative = Vec::with_capacity(problem.frames.len());
        let mut boards = Vec::with_capacity(problem.frames.len());

        for f in problem.frames {
            let pose1 = board_pose(problem.cam1, problem.object, &f.image_points1).ok_or(
                SolveError::PoseInitialization {
                    frame: f.frame_index,
                    camera: 1,
                },
            )?;
            let pose2 = board_pose(problem.cam2, problem.object, &f.image_points2).ok_or(
                SolveError::PoseInitialization {
                    frame: f.frame_index,
                    camera: 2,
                },
            )?;
            relative.push(pose2 * pose1.inverse());
            boards.push(pose1);
        }

        let rig = average_isometries(&relative).ok_or(SolveError::PoseInitialization {
            frame: problem.frames[0].frame_index,
            camera: 2,
        })?;
        debug!(
            "initial rig: t = [{:.3}, {:.3}, {:.3}], angle {:.3} deg",
            rig.translation.x,
            rig.translation.y,
            rig.translation.z,
            rig.rotation.angle().to_degrees()
        );
        warn_on_outlier_frames(problem.frames, &relative, &rig);

        let mut x = DVector::zeros(problem.num_params());
        write_pose(&mut x, 0, &rig);
        for (i, b) in boards.iter().enumerate() {
            write_pose(&mut x, 6 * (i + 1), b);
        }
        Ok(x)
    }
}

/// Relative poses of a synchronized rig agree across frames; a frame far from
/// the mean usually means the two sequences are offset.
fn warn_on_outlier_frames(
    frames: &[FrameCorrespondence],
    relative: &[Isometry3<f64>],
    rig: &Isometry3<f64>,
) {
    const MAX_ANGLE_DEG: f64 = 5.0;
    for (f, pose) in frames.iter().zip(relative) {
        let angle = pose.rotation.angle_to(&rig.rotation).to_degrees();
        if angle > MAX_ANGLE_DEG {
            warn!(
                "frame {}: relative pose is {angle:.1} deg from the rig mean; are the sequences synchronized?",
                f.frame_index
            );
        }
    }
}

fn board_pose(
    cam: &CameraIntrinsics,
    object: &[Point3<f64>],
    pixels: &[Point2<f64>],
) -> Option<Isometry3<f64>> {
    let normalized = pixels
        .iter()
        .map(|&uv| cam.normalize_pixel(uv).ok())
        .collect::<Option<Vec<_>>>()?;
    planar_pose(object, &normalized)
}

fn write_pose(x: &mut DVector<f64>, offset: usize, pose: &Isometry3<f64>) {
    let w = pose.rotation.scaled_axis();
    let t = pose.translation.vector;
    for k in 0..3 {
        x[offset + k] = w[k];
        x[offset + 3 + k] = t[k];
    }
}

fn read_pose(x: &[f64]) -> Isometry3<f64> {
    let w = Vector3::new(x[0], x[1], x[2]);
    Isometry3::from_parts(
        Translation3::new(x[3], x[4], x[5]),
        UnitQuaternion::from_scaled_axis(w),
    )
}

struct StereoProblem<'a> {
    cam1: &'a CameraIntrinsics,
    cam2: &'a CameraIntrinsics,
    object: &'a [Point3<f64>],
    frames: &'a [FrameCorrespondence],
    /// Rig pose then one board pose per frame, 6 values each.
    params: DVector<f64>,
}

impl StereoProblem<'_> {
    fn num_params(&self) -> usize {
        6 * (self.frames.len() + 1)
    }

    fn num_residuals(&self) -> usize {
        self.rows_per_frame() * self.frames.len()
    }

    fn rows_per_frame(&self) -> usize {
        4 * self.object.len()
    }

    fn unpack(&self, x: &DVector<f64>) -> (Isometry3<f64>, Vec<Isometry3<f64>>) {
        let s = x.as_slice();
        let rig = read_pose(&s[0..6]);
        let boards = (0..self.frames.len())
            .map(|i| read_pose(&s[6 * (i + 1)..6 * (i + 2)]))
            .collect();
        (rig, boards)
    }

    /// Residuals of one frame: cam1 block then cam2 block, `(u, v)` pairs.
    /// `None` once a point leaves the front of either camera.
    fn frame_residuals(
        &self,
        rig: &Isometry3<f64>,
        board: &Isometry3<f64>,
        frame: &FrameCorrespondence,
        out: &mut [f64],
    ) -> Option<()> {
        let n = self.object.len();
        let (first, second) = out.split_at_mut(2 * n);
        for (k, p) in self.object.iter().enumerate() {
            let x1 = board.transform_point(p);
            let x2 = rig.transform_point(&x1);
            write_residual(self.cam1.project(&x1)?, frame.image_points1[k], &mut first[2 * k..]);
            write_residual(self.cam2.project(&x2)?, frame.image_points2[k], &mut second[2 * k..]);
        }
        Some(())
    }

    /// RMS over 2-D observations of both cameras at the current parameters.
    fn rms(&self) -> Option<f64> {
        let r = self.residuals()?;
        let observations = 2 * self.object.len() * self.frames.len();
        let rms = (r.norm_squared() / observations as f64).sqrt();
        rms.is_finite().then_some(rms)
    }
}

fn write_residual(uv: Point2<f64>, observed: Point2<f64>, out: &mut [f64]) {
    out[0] = uv.x - observed.x;
    out[1] = uv.y - observed.y;
}

impl LeastSquaresProblem<f64, Dyn, Dyn> for StereoProblem<'_> {
    type ResidualStorage = Owned<f64, Dyn>;
    type JacobianStorage = Owned<f64, Dyn, Dyn>;
    type ParameterStorage = Owned<f64, Dyn>;

    fn set_params(&mut self, x: &DVector<f64>) {
        self.params.clone_from(x);
    }

    fn params(&self) -> DVector<f64> {
        self.params.clone()
    }

    fn residuals(&self) -> Option<DVector<f64>> {
        let (rig, boards) = self.unpack(&self.params);
        let rows = self.rows_per_frame();
        let mut r = DVector::zeros(self.num_residuals());
        for (i, (frame, board)) in self.frames.iter().zip(&boards).enumerate() {
            self.frame_residuals(
                &rig,
                board,
                frame,
                &mut r.as_mut_slice()[i * rows..(i + 1) * rows],
            )?;
        }
        Some(r)
    }

    /// Central differences, exploiting that a board pose only touches its own
    /// frame's rows.
    fn jacobian(&self) -> Option<DMatrix<f64>> {
        let rows = self.rows_per_frame();
        let (rig, boards) = self.unpack(&self.params);
        let mut j = DMatrix::zeros(self.num_residuals(), self.num_params());
        let mut plus = vec![0.0; rows];
        let mut minus = vec![0.0; rows];

        let s = self.params.as_slice();
        for c in 0..6 {
            let h = 1e-6 * s[c].abs().max(1.0);
            let mut p = [s[0], s[1], s[2], s[3], s[4], s[5]];
            p[c] = s[c] + h;
            let rig_p = read_pose(&p);
            p[c] = s[c] - h;
            let rig_m = read_pose(&p);
            for (i, (frame, board)) in self.frames.iter().zip(&boards).enumerate() {
                self.frame_residuals(&rig_p, board, frame, &mut plus)?;
                self.frame_residuals(&rig_m, board, frame, &mut minus)?;
                for row in 0..rows {
                    j[(i * rows + row, c)] = (plus[row] - minus[row]) / (2.0 * h);
                }
            }
        }

        for (i, frame) in self.frames.iter().enumerate() {
            let base = 6 * (i + 1);
            for c in 0..6 {
                let h = 1e-6 * s[base + c].abs().max(1.0);
                let mut p: [f64; 6] = [0.0; 6];
                p.copy_from_slice(&s[base..base + 6]);
                p[c] = s[base + c] + h;
                self.frame_residuals(&rig, &read_pose(&p), frame, &mut plus)?;
                p[c] = s[base + c] - h;
                self.frame_residuals(&rig, &read_pose(&p), frame, &mut minus)?;
                for row in 0..rows {
                    j[(i * rows + row, base + c)] = (plus[row] - minus[row]) / (2.0 * h);
                }
            }
        }
        Some(j)
    }
}
