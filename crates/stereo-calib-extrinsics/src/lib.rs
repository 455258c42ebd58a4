//! Stereo extrinsic calibration with fixed intrinsics.
//!
//! Given index-aligned checkerboard corners seen by two cameras with known
//! intrinsics, estimate the rigid transform `X_cam2 = R * X_cam1 + t`:
//!
//! 1. Undistort and normalize every observation.
//! 2. Recover a board pose per camera and frame from the plane homography.
//! 3. Average the per-frame relative poses into an initial rig transform.
//! 4. Refine the rig and all board poses jointly with the `levenberg-marquardt`
//!    crate on the reprojection error of both cameras.
//!
//! ```no_run
//! use stereo_calib_core::synthetic::{StereoScene, UniformPixelNoise};
//! use stereo_calib_extrinsics::StereoExtrinsicSolver;
//!
//! let scene = StereoScene::demo(10);
//! let frames = scene.observe(&UniformPixelNoise::new(1, 0.3));
//! let solution = StereoExtrinsicSolver::default()
//!     .solve(&scene.cam1, &scene.cam2, &scene.pattern.object_points(), &frames)
//!     .unwrap();
//! println!("rms = {:.3} px", solution.rms);
//! ```

mod backend;
mod pose;
mod solver;

pub use backend::{converged, TermCriteria};
pub use pose::{average_isometries, orthonormalize, planar_pose};
pub use solver::{SolveError, StereoExtrinsicSolver, StereoSolution, StereoSolverParams};
