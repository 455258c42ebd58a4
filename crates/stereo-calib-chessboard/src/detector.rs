use crate::gridgraph::{assign_grid_coordinates, connected_components, GridGraph};
use crate::params::ChessboardParams;
use crate::subpix::refine_corners;
use log::debug;
use nalgebra::Point2;
use stereo_calib_core::{CheckerboardPattern, Corner, Detection, GrayImageView};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Checkerboard detector over a cloud of ChESS corners.
///
/// A board is accepted only when a single connected grid component holds
/// exactly `rows x columns` corners in a complete rectangle. Output points
/// follow the pattern index order: the `rows` axis is the one running along
/// image x (or, for a board seen rotated by 90°, along image y), with the
/// first corner nearest the image top-left.
#[derive(Clone, Debug, Default)]
pub struct ChessboardDetector {
    pub params: ChessboardParams,
}

impl ChessboardDetector {
    pub fn new(params: ChessboardParams) -> Self {
        Self { params }
    }

    /// Detect and refine. A miss is a normal outcome, never an error.
    #[cfg_attr(
        feature = "tracing",
        instrument(
            level = "debug",
            skip(self, image, corners, pattern),
            fields(num_corners = corners.len(), rows = pattern.rows(), columns = pattern.columns())
        )
    )]
    pub fn detect(
        &self,
        image: &GrayImageView<'_>,
        corners: &[Corner],
        pattern: &CheckerboardPattern,
    ) -> Detection {
        let Some(mut points) = self.detect_from_corners(corners, pattern) else {
            return Detection::Missed;
        };
        if let Some(subpix) = &self.params.subpix {
            refine_corners(image, &mut points, subpix);
        }
        Detection::Detected(points)
    }

    /// Coarse ordered corner positions, without refinement.
    pub fn detect_from_corners(
        &self,
        corners: &[Corner],
        pattern: &CheckerboardPattern,
    ) -> Option<Vec<Point2<f64>>> {
        let strong: Vec<Corner> = corners
            .iter()
            .copied()
            .filter(|c| c.strength >= self.params.min_strength)
            .collect();

        let needed = pattern.point_count();
        if strong.len() < needed {
            debug!(
                "only {} corners after strength filter, board needs {}",
                strong.len(),
                needed
            );
            return None;
        }

        let graph = GridGraph::new(&strong, &self.params.graph);
        let mut components = connected_components(&graph);
        components.sort_by_key(|c| std::cmp::Reverse(c.len()));

        for component in components.iter().filter(|c| c.len() == needed) {
            if let Some(points) = order_component(&graph, component, &strong, pattern) {
                return Some(points);
            }
        }

        debug!(
            "no complete {}x{} grid among {} components (largest {})",
            pattern.rows(),
            pattern.columns(),
            components.len(),
            components.first().map_or(0, Vec::len)
        );
        None
    }
}

/// Map a complete component onto the pattern index order.
fn order_component(
    graph: &GridGraph,
    component: &[usize],
    corners: &[Corner],
    pattern: &CheckerboardPattern,
) -> Option<Vec<Point2<f64>>> {
    let coords = assign_grid_coordinates(graph, component)?;

    let min_i = coords.iter().map(|c| c.1).min()?;
    let min_j = coords.iter().map(|c| c.2).min()?;
    let width = (coords.iter().map(|c| c.1).max()? - min_i + 1) as u32;
    let height = (coords.iter().map(|c| c.2).max()? - min_j + 1) as u32;

    let (rows, columns) = (pattern.rows(), pattern.columns());
    let rotated = if width == rows && height == columns {
        false
    } else if width == columns && height == rows {
        true
    } else {
        return None;
    };

    let mut ordered = vec![None; pattern.point_count()];
    for &(node, i, j) in &coords {
        let (i, j) = ((i - min_i) as u32, (j - min_j) as u32);
        // a board seen rotated by 90° runs its `rows` axis along image y
        let (pi, pj) = if rotated { (j, width - 1 - i) } else { (i, j) };
        let slot = ordered.get_mut(pattern.index_of(pi, pj))?;
        if slot.is_some() {
            return None;
        }
        let p = corners[node].position;
        *slot = Some(Point2::new(p.x as f64, p.y as f64));
    }

    ordered.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::GridGraphParams;
    use std::f32::consts::{FRAC_PI_2, FRAC_PI_4};

    /// Ideal corners of a `rows x columns` board rotated by `angle`, listed
    /// in pattern index order.
    fn board_corners(
        pattern: &CheckerboardPattern,
        origin: (f32, f32),
        spacing: f32,
        angle: f32,
    ) -> Vec<Corner> {
        let (s, c) = angle.sin_cos();
        (0..pattern.point_count())
            .map(|k| {
                let (i, j) = pattern.grid_coords(k);
                let (u, v) = (i as f32 * spacing, j as f32 * spacing);
                let orientation = if (i + j) % 2 == 0 {
                    FRAC_PI_4
                } else {
                    3.0 * FRAC_PI_4
                };
                Corner::new(
                    origin.0 + c * u - s * v,
                    origin.1 + s * u + c * v,
                    orientation + angle,
                    1.0,
                )
            })
            .collect()
    }

    fn detector() -> ChessboardDetector {
        ChessboardDetector::new(ChessboardParams {
            graph: GridGraphParams {
                max_spacing_pix: 30.0,
                ..Default::default()
            },
            subpix: None,
            ..Default::default()
        })
    }

    fn assert_order(expected: &[Corner], got: &[Point2<f64>]) {
        assert_eq!(expected.len(), got.len());
        for (e, g) in expected.iter().zip(got) {
            assert!((e.position.x as f64 - g.x).abs() < 1e-4);
            assert!((e.position.y as f64 - g.y).abs() < 1e-4);
        }
    }

    #[test]
    fn orders_upright_board_rows_first() {
        let pattern = CheckerboardPattern::new(5, 4, 1.0).unwrap();
        let truth = board_corners(&pattern, (40.0, 30.0), 20.0, 0.1);

        // shuffle input order
        let mut input = truth.clone();
        input.reverse();
        input.swap(3, 11);

        let points = detector().detect_from_corners(&input, &pattern).unwrap();
        assert_order(&truth, &points);
    }

    #[test]
    fn orders_board_rotated_by_quarter_turn() {
        let pattern = CheckerboardPattern::new(4, 3, 1.0).unwrap();
        let truth = board_corners(&pattern, (120.0, 30.0), 20.0, FRAC_PI_2);
        let points = detector().detect_from_corners(&truth, &pattern).unwrap();
        assert_order(&truth, &points);
    }

    #[test]
    fn incomplete_board_is_a_miss() {
        let pattern = CheckerboardPattern::new(5, 4, 1.0).unwrap();
        let mut corners = board_corners(&pattern, (40.0, 30.0), 20.0, 0.0);
        corners.remove(7);
        assert!(detector().detect_from_corners(&corners, &pattern).is_none());

        let image = stereo_calib_core::GrayImage::new(8, 8);
        assert_eq!(
            Detection::Missed,
            detector().detect(&image.view(), &corners, &pattern)
        );
    }

    #[test]
    fn wrong_dimensions_are_a_miss() {
        let detected_as = CheckerboardPattern::new(5, 4, 1.0).unwrap();
        let corners = board_corners(&detected_as, (40.0, 30.0), 20.0, 0.0);
        let expected = CheckerboardPattern::new(10, 2, 1.0).unwrap();
        assert!(detector().detect_from_corners(&corners, &expected).is_none());
    }

    #[test]
    fn weak_corners_are_filtered() {
        let pattern = CheckerboardPattern::new(3, 3, 1.0).unwrap();
        let mut corners = board_corners(&pattern, (40.0, 30.0), 20.0, 0.0);
        corners[4].strength = 0.01;
        let det = ChessboardDetector::new(ChessboardParams {
            min_strength: 0.5,
            subpix: None,
            ..Default::default()
        });
        assert!(det.detect_from_corners(&corners, &pattern).is_none());
    }
}
