//! Deterministic synthetic stereo scenes.
//!
//! Used by tests and demos to produce index-aligned correspondences for a
//! known rig pose. Noise is generated with a split-mix hash keyed on
//! `(view, point)`, so datasets are stable across platforms and do not depend
//! on an RNG crate.

use crate::{CameraIntrinsics, CheckerboardPattern, DistortionModel, FrameCorrespondence};
use nalgebra::{Isometry3, Point2, Point3, Translation3, UnitQuaternion, Vector2, Vector3};

/// Deterministic uniform pixel noise in `[-max_abs_px, +max_abs_px]`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct UniformPixelNoise {
    pub seed: u64,
    pub max_abs_px: f64,
}

impl UniformPixelNoise {
    pub fn new(seed: u64, max_abs_px: f64) -> Self {
        Self { seed, max_abs_px }
    }

    /// Noise vector for the `(stream, view, point)` key.
    pub fn sample(&self, stream: u64, view_idx: usize, point_idx: usize) -> Vector2<f64> {
        let max_abs = self.max_abs_px.abs();
        if max_abs == 0.0 {
            return Vector2::zeros();
        }

        let key = mix_key(self.seed ^ stream.wrapping_mul(0xD6E8_FEB8_6659_FD93), view_idx, point_idx);
        let u = u64_to_unit_f64(splitmix64(key));
        let v = u64_to_unit_f64(splitmix64(key ^ 0x94D0_49BB_1331_11EB));

        // [0, 1) -> [-max_abs, +max_abs]
        Vector2::new((u - 0.5) * 2.0 * max_abs, (v - 0.5) * 2.0 * max_abs)
    }
}

#[inline]
fn mix_key(seed: u64, view_idx: usize, point_idx: usize) -> u64 {
    seed ^ (view_idx as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15)
        ^ (point_idx as u64).wrapping_mul(0xBF58_476D_1CE4_E5B9)
}

#[inline]
fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E37_79B9_7F4A_7C15);
    let mut z = x;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

#[inline]
fn u64_to_unit_f64(x: u64) -> f64 {
    // top 53 bits -> [0, 1)
    (x >> 11) as f64 * (1.0 / (1u64 << 53) as f64)
}

/// A two-camera rig looking at a checkerboard from several poses.
#[derive(Clone, Debug)]
pub struct StereoScene {
    pub pattern: CheckerboardPattern,
    pub cam1: CameraIntrinsics,
    pub cam2: CameraIntrinsics,
    /// Maps cam1-frame points into the cam2 frame.
    pub cam2_from_cam1: Isometry3<f64>,
    /// Maps board points into the cam1 frame, one per view.
    pub cam1_from_board: Vec<Isometry3<f64>>,
}

impl StereoScene {
    /// A VGA rig with a horizontal baseline of 60 units and a slight toe-in,
    /// observing a 9x6 board with 30-unit squares.
    pub fn demo(n_views: usize) -> Self {
        let pattern = CheckerboardPattern {
            rows: 9,
            columns: 6,
            square_size: 30.0,
        };
        let cam1 = CameraIntrinsics::unchecked(
            DistortionModel::PinholeRadtan,
            [600.0, 600.0, 320.0, 240.0],
            vec![-0.05, 0.01, 0.0003, -0.0002],
        );
        let cam2 = CameraIntrinsics::unchecked(
            DistortionModel::PinholeRadtanFull,
            [620.0, 615.0, 330.0, 245.0],
            vec![0.04, -0.02, 0.0005, -0.0003, 0.001, 0.01, 0.0, 0.0],
        );
        let cam2_from_cam1 = Isometry3::from_parts(
            Translation3::new(-60.0, 1.5, 3.0),
            UnitQuaternion::from_euler_angles(0.02, 0.08, -0.01),
        );

        Self {
            cam1_from_board: board_poses(&pattern, n_views, 650.0),
            pattern,
            cam1,
            cam2,
            cam2_from_cam1,
        }
    }

    /// Project every view into both cameras, adding `noise`.
    ///
    /// Views where some point does not project in front of a camera are
    /// skipped.
    pub fn observe(&self, noise: &UniformPixelNoise) -> Vec<FrameCorrespondence> {
        let object = self.pattern.object_points();
        self.cam1_from_board
            .iter()
            .enumerate()
            .filter_map(|(view, pose)| {
                let mut image_points1 = Vec::with_capacity(object.len());
                let mut image_points2 = Vec::with_capacity(object.len());
                for (k, p) in object.iter().enumerate() {
                    let x1 = pose.transform_point(p);
                    let x2 = self.cam2_from_cam1.transform_point(&x1);
                    let uv1 = self.cam1.project(&x1)? + noise.sample(1, view, k);
                    let uv2 = self.cam2.project(&x2)? + noise.sample(2, view, k);
                    image_points1.push(uv1);
                    image_points2.push(uv2);
                }
                Some(FrameCorrespondence {
                    frame_index: view,
                    image_points1,
                    image_points2,
                })
            })
            .collect()
    }
}

/// Board poses spread in tilt and depth, each centring the board roughly on
/// the optical axis at distance `z0` and beyond.
pub fn board_poses(pattern: &CheckerboardPattern, n_views: usize, z0: f64) -> Vec<Isometry3<f64>> {
    let center = Vector3::new(
        0.5 * (pattern.rows() - 1) as f64 * pattern.square_size(),
        0.5 * (pattern.columns() - 1) as f64 * pattern.square_size(),
        0.0,
    );
    (0..n_views)
        .map(|v| {
            let t = v as f64;
            let rotation = UnitQuaternion::from_euler_angles(
                0.30 * (1.3 * t).sin(),
                0.35 * (0.7 * t + 0.4).cos(),
                0.15 * (2.1 * t).sin(),
            );
            let position = Vector3::new(
                25.0 * (1.1 * t).sin(),
                20.0 * (1.7 * t).cos(),
                z0 + 40.0 * (v % 5) as f64,
            );
            let translation = position - rotation * center;
            Isometry3::from_parts(Translation3::from(translation), rotation)
        })
        .collect()
}

/// Project `points` (board frame) through `camera` at `pose`, without noise.
pub fn project_points(
    camera: &CameraIntrinsics,
    pose: &Isometry3<f64>,
    points: &[Point3<f64>],
) -> Option<Vec<Point2<f64>>> {
    points
        .iter()
        .map(|p| camera.project(&pose.transform_point(p)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noise_is_deterministic_and_bounded() {
        let noise = UniformPixelNoise::new(7, 0.4);
        assert_eq!(noise.sample(1, 3, 5), noise.sample(1, 3, 5));
        assert_ne!(noise.sample(1, 3, 5), noise.sample(2, 3, 5));
        assert_ne!(noise.sample(1, 3, 5), noise.sample(1, 3, 6));
        for k in 0..500 {
            let n = noise.sample(1, k / 50, k);
            assert!(n.x.abs() <= 0.4 && n.y.abs() <= 0.4);
        }
        assert_eq!(Vector2::zeros(), UniformPixelNoise::default().sample(1, 0, 0));
    }

    #[test]
    fn demo_scene_is_fully_visible() {
        let scene = StereoScene::demo(12);
        let frames = scene.observe(&UniformPixelNoise::default());
        assert_eq!(12, frames.len());
        for f in &frames {
            assert_eq!(scene.pattern.point_count(), f.image_points1.len());
            for uv in f.image_points1.iter().chain(&f.image_points2) {
                assert!(uv.x > 0.0 && uv.x < 640.0, "u out of frame: {}", uv.x);
                assert!(uv.y > 0.0 && uv.y < 480.0, "v out of frame: {}", uv.y);
            }
        }
    }
}
