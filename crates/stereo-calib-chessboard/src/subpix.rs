//! Iterative sub-pixel corner refinement.
//!
//! At a saddle corner `q`, every image gradient `g(p)` inside a small window
//! is orthogonal to `p - q`. Each iteration solves the weighted normal
//! equations `Σ w g gᵀ · q = Σ w g gᵀ · p` over the window centred at the
//! current estimate.

use crate::params::SubPixParams;
use nalgebra::Point2;
use stereo_calib_core::{sample_bilinear, GrayImageView};

/// Refine one corner. The coarse position is kept if the estimate drifts
/// outside the search window or the system is degenerate from the start.
pub fn refine_corner(
    image: &GrayImageView<'_>,
    initial: Point2<f64>,
    params: &SubPixParams,
) -> Point2<f64> {
    let half = params.half_window.max(1) as i64;
    let win = half as f64;
    let eps_sq = params.epsilon * params.epsilon;
    let weights = gaussian_weights(half);
    let side = (2 * half + 1) as usize;

    let mut current = initial;
    for _ in 0..params.max_iters.max(1) {
        let patch = sample_patch(image, current, half + 1);
        let patch_side = side + 2;

        let (mut a, mut b, mut c) = (0.0, 0.0, 0.0);
        let (mut bb1, mut bb2) = (0.0, 0.0);
        for row in 0..side {
            let py = row as f64 - win;
            for col in 0..side {
                let px = col as f64 - win;
                let at = |r: usize, c: usize| patch[r * patch_side + c];
                let gx = at(row + 1, col + 2) - at(row + 1, col);
                let gy = at(row + 2, col + 1) - at(row, col + 1);
                let m = weights[row * side + col];

                let gxx = gx * gx * m;
                let gxy = gx * gy * m;
                let gyy = gy * gy * m;
                a += gxx;
                b += gxy;
                c += gyy;
                bb1 += gxx * px + gxy * py;
                bb2 += gxy * px + gyy * py;
            }
        }

        let det = a * c - b * b;
        if det.abs() <= f64::EPSILON * (a * c).abs().max(1.0) {
            break;
        }
        let scale = 1.0 / det;
        let next = Point2::new(
            current.x + c * scale * bb1 - b * scale * bb2,
            current.y - b * scale * bb1 + a * scale * bb2,
        );
        let step_sq = (next - current).norm_squared();
        current = next;

        if (current.x - initial.x).abs() > win || (current.y - initial.y).abs() > win {
            break;
        }
        if step_sq <= eps_sq {
            break;
        }
    }

    if !current.x.is_finite()
        || !current.y.is_finite()
        || (current.x - initial.x).abs() > win
        || (current.y - initial.y).abs() > win
    {
        return initial;
    }
    current
}

/// Refine a set of corners in place.
pub fn refine_corners(image: &GrayImageView<'_>, points: &mut [Point2<f64>], params: &SubPixParams) {
    for p in points.iter_mut() {
        *p = refine_corner(image, *p, params);
    }
}

fn gaussian_weights(half: i64) -> Vec<f64> {
    let win = half as f64;
    let mut w = Vec::with_capacity(((2 * half + 1) * (2 * half + 1)) as usize);
    for i in -half..=half {
        let y = i as f64 / win;
        let vy = (-y * y).exp();
        for j in -half..=half {
            let x = j as f64 / win;
            w.push(vy * (-x * x).exp());
        }
    }
    w
}

/// Bilinearly sampled `(2r+1) x (2r+1)` patch centred at `center`.
fn sample_patch(image: &GrayImageView<'_>, center: Point2<f64>, r: i64) -> Vec<f64> {
    let mut out = Vec::with_capacity(((2 * r + 1) * (2 * r + 1)) as usize);
    for dy in -r..=r {
        for dx in -r..=r {
            out.push(sample_bilinear(
                image,
                center.x + dx as f64,
                center.y + dy as f64,
            ));
        }
    }
    out
}
