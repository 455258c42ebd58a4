//! Pinhole camera with OpenCV-style radial-tangential distortion.
//!
//! Two distortion models are supported:
//! - [`DistortionModel::PinholeRadtan`]: `k1 k2 p1 p2` (COLMAP `OPENCV`),
//! - [`DistortionModel::PinholeRadtanFull`]: `k1 k2 p1 p2 k3 k4 k5 k6`
//!   with rational radial term (COLMAP `FULL_OPENCV`).

use nalgebra::{Matrix3, Point2, Point3};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum IntrinsicsError {
    #[error("{model} expects {expected} distortion coefficients, got {got}")]
    CoefficientCount {
        model: DistortionModel,
        expected: usize,
        got: usize,
    },

    #[error("camera parameter vector must hold 8 (OPENCV) or 12 (FULL_OPENCV) values, got {0}")]
    ParamCount(usize),

    #[error("unsupported camera model `{0}`; supported: OPENCV, FULL_OPENCV")]
    UnknownModel(String),

    #[error("focal lengths must be positive (fx={fx}, fy={fy})")]
    InvalidFocalLength { fx: f64, fy: f64 },

    #[error("camera parameters must be finite")]
    NonFinite,
}

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistortionError {
    #[error("singular jacobian while undistorting")]
    SingularJacobian,
    #[error("undistortion did not converge")]
    NonConvergent,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DistortionModel {
    PinholeRadtan,
    PinholeRadtanFull,
}

impl DistortionModel {
    pub const fn coefficient_count(self) -> usize {
        match self {
            Self::PinholeRadtan => 4,
            Self::PinholeRadtanFull => 8,
        }
    }

    /// COLMAP camera model name.
    pub const fn colmap_name(self) -> &'static str {
        match self {
            Self::PinholeRadtan => "OPENCV",
            Self::PinholeRadtanFull => "FULL_OPENCV",
        }
    }

    /// Model implied by a distortion coefficient count.
    pub fn from_coefficient_count(n: usize) -> Option<Self> {
        match n {
            4 => Some(Self::PinholeRadtan),
            8 => Some(Self::PinholeRadtanFull),
            _ => None,
        }
    }
}

impl fmt::Display for DistortionModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.colmap_name())
    }
}

impl FromStr for DistortionModel {
    type Err = IntrinsicsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "OPENCV" | "PINHOLE_RADTAN" => Ok(Self::PinholeRadtan),
            "FULL_OPENCV" | "PINHOLE_RADTAN_FULL" => Ok(Self::PinholeRadtanFull),
            _ => Err(IntrinsicsError::UnknownModel(s.to_string())),
        }
    }
}

/// Fixed intrinsics of one camera.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawIntrinsics", into = "RawIntrinsics")]
pub struct CameraIntrinsics {
    model: DistortionModel,
    fx: f64,
    fy: f64,
    cx: f64,
    cy: f64,
    distortion: Vec<f64>,
}

#[derive(Serialize, Deserialize)]
struct RawIntrinsics {
    model: DistortionModel,
    fx: f64,
    fy: f64,
    cx: f64,
    cy: f64,
    distortion: Vec<f64>,
}

impl TryFrom<RawIntrinsics> for CameraIntrinsics {
    type Error = IntrinsicsError;

    fn try_from(raw: RawIntrinsics) -> Result<Self, Self::Error> {
        Self::new(raw.model, raw.fx, raw.fy, raw.cx, raw.cy, raw.distortion)
    }
}

impl From<CameraIntrinsics> for RawIntrinsics {
    fn from(c: CameraIntrinsics) -> Self {
        Self {
            model: c.model,
            fx: c.fx,
            fy: c.fy,
            cx: c.cx,
            cy: c.cy,
            distortion: c.distortion,
        }
    }
}

impl CameraIntrinsics {
    pub fn new(
        model: DistortionModel,
        fx: f64,
        fy: f64,
        cx: f64,
        cy: f64,
        distortion: Vec<f64>,
    ) -> Result<Self, IntrinsicsError> {
        let expected = model.coefficient_count();
        if distortion.len() != expected {
            return Err(IntrinsicsError::CoefficientCount {
                model,
                expected,
                got: distortion.len(),
            });
        }
        if ![fx, fy, cx, cy]
            .iter()
            .chain(distortion.iter())
            .all(|v| v.is_finite())
        {
            return Err(IntrinsicsError::NonFinite);
        }
        if fx <= 0.0 || fy <= 0.0 {
            return Err(IntrinsicsError::InvalidFocalLength { fx, fy });
        }
        Ok(Self {
            model,
            fx,
            fy,
            cx,
            cy,
            distortion,
        })
    }

    /// Constructor for parameters known to be consistent.
    pub(crate) fn unchecked(model: DistortionModel, k: [f64; 4], distortion: Vec<f64>) -> Self {
        debug_assert_eq!(model.coefficient_count(), distortion.len());
        Self {
            model,
            fx: k[0],
            fy: k[1],
            cx: k[2],
            cy: k[3],
            distortion,
        }
    }

    /// Build from a flat `fx, fy, cx, cy, k1, ...` vector; the model follows
    /// from its length (8 or 12).
    pub fn from_params(params: &[f64]) -> Result<Self, IntrinsicsError> {
        if params.len() < 4 {
            return Err(IntrinsicsError::ParamCount(params.len()));
        }
        let model = DistortionModel::from_coefficient_count(params.len() - 4)
            .ok_or(IntrinsicsError::ParamCount(params.len()))?;
        Self::new(
            model,
            params[0],
            params[1],
            params[2],
            params[3],
            params[4..].to_vec(),
        )
    }

    /// Flat `fx, fy, cx, cy, k1, ...` vector.
    pub fn params(&self) -> Vec<f64> {
        let mut out = Vec::with_capacity(4 + self.distortion.len());
        out.extend_from_slice(&self.k());
        out.extend_from_slice(&self.distortion);
        out
    }

    #[inline]
    pub fn model(&self) -> DistortionModel {
        self.model
    }

    #[inline]
    pub fn focal_length(&self) -> (f64, f64) {
        (self.fx, self.fy)
    }

    #[inline]
    pub fn principal_point(&self) -> (f64, f64) {
        (self.cx, self.cy)
    }

    /// `[fx, fy, cx, cy]`.
    #[inline]
    pub fn k(&self) -> [f64; 4] {
        [self.fx, self.fy, self.cx, self.cy]
    }

    #[inline]
    pub fn distortion(&self) -> &[f64] {
        &self.distortion
    }

    pub fn camera_matrix(&self) -> Matrix3<f64> {
        Matrix3::new(
            self.fx, 0.0, self.cx, //
            0.0, self.fy, self.cy, //
            0.0, 0.0, 1.0,
        )
    }

    /// Apply lens distortion to normalized image coordinates.
    pub fn distort(&self, p: Point2<f64>) -> Point2<f64> {
        let d = &self.distortion;
        let (k1, k2, p1, p2) = (d[0], d[1], d[2], d[3]);
        let (k3, k4, k5, k6) = match self.model {
            DistortionModel::PinholeRadtan => (0.0, 0.0, 0.0, 0.0),
            DistortionModel::PinholeRadtanFull => (d[4], d[5], d[6], d[7]),
        };

        let (x, y) = (p.x, p.y);
        let r2 = x * x + y * y;
        let r4 = r2 * r2;
        let r6 = r4 * r2;
        let radial = (1.0 + k1 * r2 + k2 * r4 + k3 * r6) / (1.0 + k4 * r2 + k5 * r4 + k6 * r6);

        Point2::new(
            x * radial + 2.0 * p1 * x * y + p2 * (r2 + 2.0 * x * x),
            y * radial + p1 * (r2 + 2.0 * y * y) + 2.0 * p2 * x * y,
        )
    }

    /// Invert [`distort`](Self::distort) by Newton iteration with a
    /// finite-difference jacobian.
    pub fn undistort(&self, pd: Point2<f64>) -> Result<Point2<f64>, DistortionError> {
        if self.distortion.iter().all(|&c| c == 0.0) {
            return Ok(pd);
        }

        let (mut x, mut y) = (pd.x, pd.y);
        for _ in 0..20 {
            let f = self.distort(Point2::new(x, y));
            let rx = pd.x - f.x;
            let ry = pd.y - f.y;
            if rx.abs() < 1e-12 && ry.abs() < 1e-12 {
                return Ok(Point2::new(x, y));
            }

            let eps = 1e-7;
            let fxp = self.distort(Point2::new(x + eps, y));
            let fyp = self.distort(Point2::new(x, y + eps));
            let j11 = (fxp.x - f.x) / eps;
            let j21 = (fxp.y - f.y) / eps;
            let j12 = (fyp.x - f.x) / eps;
            let j22 = (fyp.y - f.y) / eps;

            let det = j11 * j22 - j12 * j21;
            if det.abs() < 1e-18 {
                return Err(DistortionError::SingularJacobian);
            }
            x += (j22 * rx - j12 * ry) / det;
            y += (-j21 * rx + j11 * ry) / det;
        }

        let f = self.distort(Point2::new(x, y));
        if (pd.x - f.x).abs() < 1e-9 && (pd.y - f.y).abs() < 1e-9 {
            Ok(Point2::new(x, y))
        } else {
            Err(DistortionError::NonConvergent)
        }
    }

    /// Project a camera-frame point to pixels. Returns `None` behind the camera.
    pub fn project(&self, pc: &Point3<f64>) -> Option<Point2<f64>> {
        if pc.z <= f64::EPSILON {
            return None;
        }
        let n = self.distort(Point2::new(pc.x / pc.z, pc.y / pc.z));
        Some(Point2::new(
            self.fx * n.x + self.cx,
            self.fy * n.y + self.cy,
        ))
    }

    /// Pixel to undistorted normalized image coordinates.
    pub fn normalize_pixel(&self, uv: Point2<f64>) -> Result<Point2<f64>, DistortionError> {
        let pd = Point2::new((uv.x - self.cx) / self.fx, (uv.y - self.cy) / self.fy);
        self.undistort(pd)
    }
}
