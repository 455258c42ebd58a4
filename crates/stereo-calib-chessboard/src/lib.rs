//! Checkerboard detector built on top of `stereo-calib-core`.
//!
//! Pipeline:
//! 1. Filter ChESS corners by response.
//! 2. Link corners into a 4-connected grid graph (orthogonal orientations,
//!    spacing window, edge at ~45° to the corner diagonals), keeping mutual
//!    edges only.
//! 3. BFS each connected component and assign integer grid coordinates.
//! 4. Accept a component that fills exactly a `rows x columns` rectangle
//!    (upright or rotated by 90°) and order it into the pattern index order.
//! 5. Refine every corner iteratively to sub-pixel accuracy.
//!
//! Failure to find the board is reported as [`Detection::Missed`].
//!
//! [`Detection::Missed`]: stereo_calib_core::Detection::Missed

mod detector;
mod geom;
mod gridgraph;
mod params;
mod subpix;

pub use detector::ChessboardDetector;
pub use gridgraph::{
    assign_grid_coordinates, connected_components, GridGraph, NeighborDirection, NodeNeighbor,
};
pub use params::{ChessboardParams, GridGraphParams, SubPixParams};
pub use subpix::{refine_corner, refine_corners};
