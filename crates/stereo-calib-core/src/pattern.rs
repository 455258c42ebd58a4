//! Planar checkerboard geometry.

use nalgebra::Point3;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum PatternError {
    #[error("checkerboard needs at least 2x2 inner corners (got rows={rows}, columns={columns})")]
    TooSmall { rows: u32, columns: u32 },

    #[error("square size must be positive and finite (got {0})")]
    InvalidSquareSize(f64),

    #[error("invalid checkerboard `{0}`, expected ROWSxCOLUMNSxSQUARE_SIZE (e.g. 7x6x70)")]
    Malformed(String),
}

/// Inner-corner layout of a planar checkerboard target.
///
/// `rows` is the number of inner corners along the fast axis of the point
/// ordering, `columns` the number along the slow axis. Point `k` lies at
/// `((k % rows) * square_size, (k / rows) * square_size, 0)`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawPattern", into = "RawPattern")]
pub struct CheckerboardPattern {
    pub(crate) rows: u32,
    pub(crate) columns: u32,
    pub(crate) square_size: f64,
}

#[derive(Serialize, Deserialize)]
struct RawPattern {
    rows: u32,
    columns: u32,
    square_size: f64,
}

impl TryFrom<RawPattern> for CheckerboardPattern {
    type Error = PatternError;

    fn try_from(raw: RawPattern) -> Result<Self, Self::Error> {
        Self::new(raw.rows, raw.columns, raw.square_size)
    }
}

impl From<CheckerboardPattern> for RawPattern {
    fn from(p: CheckerboardPattern) -> Self {
        Self {
            rows: p.rows,
            columns: p.columns,
            square_size: p.square_size,
        }
    }
}

impl CheckerboardPattern {
    pub fn new(rows: u32, columns: u32, square_size: f64) -> Result<Self, PatternError> {
        if rows < 2 || columns < 2 {
            return Err(PatternError::TooSmall { rows, columns });
        }
        if !square_size.is_finite() || square_size <= 0.0 {
            return Err(PatternError::InvalidSquareSize(square_size));
        }
        Ok(Self {
            rows,
            columns,
            square_size,
        })
    }

    #[inline]
    pub fn rows(&self) -> u32 {
        self.rows
    }

    #[inline]
    pub fn columns(&self) -> u32 {
        self.columns
    }

    #[inline]
    pub fn square_size(&self) -> f64 {
        self.square_size
    }

    /// Number of inner corners, `rows * columns`.
    #[inline]
    pub fn point_count(&self) -> usize {
        self.rows as usize * self.columns as usize
    }

    /// Grid index `(i, j)` of point `k`, `i` along `rows`, `j` along `columns`.
    #[inline]
    pub fn grid_coords(&self, k: usize) -> (u32, u32) {
        let rows = self.rows as usize;
        ((k % rows) as u32, (k / rows) as u32)
    }

    /// Inverse of [`grid_coords`](Self::grid_coords).
    #[inline]
    pub fn index_of(&self, i: u32, j: u32) -> usize {
        j as usize * self.rows as usize + i as usize
    }

    /// Canonical object points on the `z = 0` plane, in pattern index order.
    pub fn object_points(&self) -> Vec<Point3<f64>> {
        (0..self.point_count())
            .map(|k| {
                let (i, j) = self.grid_coords(k);
                Point3::new(
                    i as f64 * self.square_size,
                    j as f64 * self.square_size,
                    0.0,
                )
            })
            .collect()
    }
}

impl FromStr for CheckerboardPattern {
    type Err = PatternError;

    /// Parse `ROWSxCOLUMNSxSQUARE_SIZE`, e.g. `7x6x70` or `9X6x24.5`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || PatternError::Malformed(s.to_string());
        let parts: Vec<&str> = s.trim().split(['x', 'X']).collect();
        let [rows, columns, size] = parts.as_slice() else {
            return Err(malformed());
        };
        let rows = rows.trim().parse::<u32>().map_err(|_| malformed())?;
        let columns = columns.trim().parse::<u32>().map_err(|_| malformed())?;
        let size = size.trim().parse::<f64>().map_err(|_| malformed())?;
        Self::new(rows, columns, size)
    }
}

impl fmt::Display for CheckerboardPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}x{}", self.rows, self.columns, self.square_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_points_cover_grid_on_plane() {
        let pattern = CheckerboardPattern::new(7, 6, 70.0).unwrap();
        let pts = pattern.object_points();
        assert_eq!(42, pts.len());
        assert!(pts.iter().all(|p| p.z == 0.0));

        // rows is the fast axis
        assert_eq!(Point3::new(70.0, 0.0, 0.0), pts[1]);
        assert_eq!(Point3::new(0.0, 70.0, 0.0), pts[7]);
        assert_eq!(Point3::new(6.0 * 70.0, 5.0 * 70.0, 0.0), pts[41]);
    }

    #[test]
    fn object_points_are_deterministic() {
        for (rows, columns) in [(2, 2), (3, 9), (11, 4)] {
            let pattern = CheckerboardPattern::new(rows, columns, 0.5).unwrap();
            let a = pattern.object_points();
            let b = pattern.object_points();
            assert_eq!(a, b);
            assert_eq!(rows as usize * columns as usize, a.len());
            for (k, p) in a.iter().enumerate() {
                let (i, j) = pattern.grid_coords(k);
                assert_eq!(k, pattern.index_of(i, j));
                assert_eq!(p.x, i as f64 * 0.5);
                assert_eq!(p.y, j as f64 * 0.5);
            }
        }
    }

    #[test]
    fn rejects_degenerate_patterns() {
        assert_eq!(
            Err(PatternError::TooSmall {
                rows: 1,
                columns: 6
            }),
            CheckerboardPattern::new(1, 6, 10.0)
        );
        assert!(CheckerboardPattern::new(3, 3, 0.0).is_err());
        assert!(CheckerboardPattern::new(3, 3, -2.0).is_err());
        assert!(CheckerboardPattern::new(3, 3, f64::NAN).is_err());
    }

    #[test]
    fn parses_cli_spec_string() {
        let p: CheckerboardPattern = "7x6x70".parse().unwrap();
        assert_eq!((7, 6, 70.0), (p.rows(), p.columns(), p.square_size()));

        let p: CheckerboardPattern = "9X6x24.5".parse().unwrap();
        assert_eq!(24.5, p.square_size());
        assert_eq!("9x6x24.5", p.to_string());

        assert!(matches!(
            "7x6".parse::<CheckerboardPattern>(),
            Err(PatternError::Malformed(_))
        ));
        assert!(matches!(
            "axbxc".parse::<CheckerboardPattern>(),
            Err(PatternError::Malformed(_))
        ));
        assert!(matches!(
            "1x6x70".parse::<CheckerboardPattern>(),
            Err(PatternError::TooSmall { .. })
        ));
    }

    #[test]
    fn serde_validates_on_load() {
        let p: CheckerboardPattern =
            serde_json::from_str(r#"{"rows":4,"columns":3,"square_size":25.0}"#).unwrap();
        assert_eq!(12, p.point_count());

        let bad = serde_json::from_str::<CheckerboardPattern>(
            r#"{"rows":4,"columns":3,"square_size":-1.0}"#,
        );
        assert!(bad.is_err());
    }
}
