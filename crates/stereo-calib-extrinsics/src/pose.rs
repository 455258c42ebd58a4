//! Linear initialisation: board poses from homographies and the averaged
//! rig transform.

use nalgebra::{
    Isometry3, Matrix3, Point2, Point3, Quaternion, Rotation3, Translation3, UnitQuaternion,
    Vector3, Vector4,
};
use stereo_calib_core::estimate_homography;

/// Project a near-rotation matrix onto SO(3) (polar decomposition via SVD,
/// determinant forced to +1).
pub fn orthonormalize(m: &Matrix3<f64>) -> Option<Rotation3<f64>> {
    let svd = m.svd(true, true);
    let u = svd.u?;
    let v_t = svd.v_t?;
    let mut r = u * v_t;
    if r.determinant() < 0.0 {
        let mut u_flipped = u;
        u_flipped.column_mut(2).neg_mut();
        r = u_flipped * v_t;
    }
    r.iter()
        .all(|v| v.is_finite())
        .then(|| Rotation3::from_matrix_unchecked(r))
}

/// Pose mapping board points (`z = 0`) into the camera frame, from
/// undistorted normalized image coordinates.
pub fn planar_pose(object: &[Point3<f64>], normalized: &[Point2<f64>]) -> Option<Isometry3<f64>> {
    let plane: Vec<Point2<f64>> = object.iter().map(|p| Point2::new(p.x, p.y)).collect();
    let h = estimate_homography(&plane, normalized)?.h;

    let h1 = h.column(0).into_owned();
    let h2 = h.column(1).into_owned();
    let h3 = h.column(2).into_owned();

    let (n1, n2) = (h1.norm(), h2.norm());
    if n1 <= 1e-12 || n2 <= 1e-12 {
        return None;
    }
    let mut lambda = 2.0 / (n1 + n2);
    // board in front of the camera
    if h3.z < 0.0 {
        lambda = -lambda;
    }

    let r1 = h1 * lambda;
    let r2 = h2 * lambda;
    let r3 = r1.cross(&r2);
    if r3.norm() <= 1e-12 {
        return None;
    }
    let t: Vector3<f64> = h3 * lambda;

    let rotation = orthonormalize(&Matrix3::from_columns(&[r1, r2, r3]))?;
    Some(Isometry3::from_parts(
        Translation3::from(t),
        UnitQuaternion::from_rotation_matrix(&rotation),
    ))
}

/// Mean of rigid transforms: arithmetic mean of translations, normalized
/// mean of hemisphere-aligned quaternions.
pub fn average_isometries(poses: &[Isometry3<f64>]) -> Option<Isometry3<f64>> {
    let first = poses.first()?;
    let n = poses.len() as f64;

    let t = poses
        .iter()
        .fold(Vector3::zeros(), |acc, p| acc + p.translation.vector)
        / n;

    let q0 = first.rotation.coords;
    let acc = poses.iter().fold(Vector4::zeros(), |acc, p| {
        let q = p.rotation.coords;
        // same hemisphere, q and -q are the same rotation
        if q0.dot(&q) < 0.0 {
            acc - q
        } else {
            acc + q
        }
    });
    if acc.norm_squared() <= f64::EPSILON {
        return None;
    }
    let rotation = UnitQuaternion::from_quaternion(Quaternion::from_vector(acc / n));

    Some(Isometry3::from_parts(Translation3::from(t), rotation))
}
