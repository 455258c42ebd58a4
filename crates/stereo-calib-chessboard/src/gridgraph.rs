//! 4-connected graph over ChESS corners.
//!
//! Two corners are linked when their orientations are orthogonal, their
//! distance lies within the expected spacing window, and the edge between
//! them runs at ~45° to both corner orientations (a ChESS orientation follows
//! the white-square diagonal, the grid axes are rotated by 45° from it).

use crate::geom::{angle_diff_abs, axis_vec_diff, is_orthogonal};
use crate::params::GridGraphParams;
use kiddo::{KdTree, SquaredEuclidean};
use nalgebra::Vector2;
use std::collections::VecDeque;
use std::f32::consts::{FRAC_PI_2, FRAC_PI_4};
use stereo_calib_core::Corner;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NeighborDirection {
    Right,
    Left,
    Up,
    Down,
}

impl NeighborDirection {
    pub fn opposite(self) -> Self {
        match self {
            Self::Right => Self::Left,
            Self::Left => Self::Right,
            Self::Up => Self::Down,
            Self::Down => Self::Up,
        }
    }

    /// Grid step `(di, dj)`, `i` along image x, `j` along image y.
    fn step(self) -> (i32, i32) {
        match self {
            Self::Right => (1, 0),
            Self::Left => (-1, 0),
            Self::Up => (0, -1),
            Self::Down => (0, 1),
        }
    }

    fn slot(self) -> usize {
        match self {
            Self::Right => 0,
            Self::Left => 1,
            Self::Up => 2,
            Self::Down => 3,
        }
    }
}

#[derive(Clone, Debug)]
pub struct NodeNeighbor {
    pub direction: NeighborDirection,
    pub index: usize,
    pub distance: f32,
    pub score: f32,
}

fn is_good_neighbor(
    corner: &Corner,
    neighbor: &Corner,
    neighbor_index: usize,
    params: &GridGraphParams,
) -> Option<NodeNeighbor> {
    let tol = params.orientation_tolerance_deg.to_radians();

    // 1. Adjacent corners of a checkerboard have orthogonal orientations.
    if !is_orthogonal(corner.orientation, neighbor.orientation, tol) {
        return None;
    }

    // 2. Distance within the expected spacing.
    let vec_to_neighbor = neighbor.position - corner.position;
    let distance = vec_to_neighbor.norm();
    if distance < params.min_spacing_pix || distance > params.max_spacing_pix {
        return None;
    }

    // 3. Edge at ~45° to each corner orientation.
    let edge_angle = vec_to_neighbor.y.atan2(vec_to_neighbor.x);
    let score_corner = (axis_vec_diff(corner.orientation, edge_angle) - FRAC_PI_4).abs();
    let score_neighbor = (axis_vec_diff(neighbor.orientation, edge_angle) - FRAC_PI_4).abs();
    if score_corner > tol || score_neighbor > tol {
        return None;
    }

    let score_orientation =
        (FRAC_PI_2 - angle_diff_abs(corner.orientation, neighbor.orientation)).abs();

    Some(NodeNeighbor {
        direction: direction_quadrant(&vec_to_neighbor),
        index: neighbor_index,
        distance,
        score: score_corner + score_neighbor + score_orientation,
    })
}

fn direction_quadrant(vec_to_neighbor: &Vector2<f32>) -> NeighborDirection {
    if vec_to_neighbor.x.abs() > vec_to_neighbor.y.abs() {
        if vec_to_neighbor.x >= 0.0 {
            NeighborDirection::Right
        } else {
            NeighborDirection::Left
        }
    } else if vec_to_neighbor.y >= 0.0 {
        NeighborDirection::Down
    } else {
        NeighborDirection::Up
    }
}

/// Keep at most one neighbor per direction, choosing the lowest-score candidate.
fn select_neighbors(candidates: Vec<NodeNeighbor>) -> Vec<NodeNeighbor> {
    let mut best: [Option<NodeNeighbor>; 4] = [None, None, None, None];

    for candidate in candidates {
        let slot = &mut best[candidate.direction.slot()];
        let replace = match slot {
            None => true,
            Some(current) => {
                candidate.score < current.score
                    || (candidate.score == current.score && candidate.distance < current.distance)
            }
        };
        if replace {
            *slot = Some(candidate);
        }
    }

    best.into_iter().flatten().collect()
}

pub struct GridGraph {
    /// For each node, its selected neighbors (at most one per direction).
    pub neighbors: Vec<Vec<NodeNeighbor>>,
}

impl GridGraph {
    pub fn new(corners: &[Corner], params: &GridGraphParams) -> Self {
        if corners.is_empty() {
            return Self {
                neighbors: Vec::new(),
            };
        }

        let coords = corners
            .iter()
            .map(|c| [c.position.x, c.position.y])
            .collect::<Vec<_>>();
        let tree: KdTree<f32, 2> = (&coords).into();

        let mut neighbors = Vec::with_capacity(corners.len());
        for (i, corner) in corners.iter().enumerate() {
            let query_point = [corner.position.x, corner.position.y];
            let results = tree.nearest_n::<SquaredEuclidean>(&query_point, params.k_neighbors);

            let candidates = results
                .into_iter()
                .map(|nn| nn.item as usize)
                .filter(|&j| j != i)
                .filter_map(|j| is_good_neighbor(corner, &corners[j], j, params))
                .collect();
            neighbors.push(select_neighbors(candidates));
        }

        Self::keep_mutual(neighbors)
    }

    /// Drop edges that are not confirmed from the other end with the
    /// opposite direction.
    fn keep_mutual(neighbors: Vec<Vec<NodeNeighbor>>) -> Self {
        let mutual: Vec<Vec<NodeNeighbor>> = neighbors
            .iter()
            .enumerate()
            .map(|(i, list)| {
                list.iter()
                    .filter(|n| {
                        neighbors[n.index]
                            .iter()
                            .any(|back| back.index == i && back.direction == n.direction.opposite())
                    })
                    .cloned()
                    .collect()
            })
            .collect();
        Self { neighbors: mutual }
    }

    pub fn len(&self) -> usize {
        self.neighbors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.neighbors.is_empty()
    }
}

pub fn connected_components(graph: &GridGraph) -> Vec<Vec<usize>> {
    let mut visited = vec![false; graph.neighbors.len()];
    let mut components = Vec::new();

    for start in 0..graph.neighbors.len() {
        if visited[start] {
            continue;
        }

        let mut component = Vec::new();
        let mut stack = vec![start];

        while let Some(node) = stack.pop() {
            if visited[node] {
                continue;
            }
            visited[node] = true;
            component.push(node);

            for neighbor in &graph.neighbors[node] {
                if !visited[neighbor.index] {
                    stack.push(neighbor.index);
                }
            }
        }

        components.push(component);
    }

    components
}

/// BFS integer coordinates `(node, i, j)` for a component, starting at its
/// first node. Returns `None` if a node is reached with two different
/// coordinates or two nodes share one.
pub fn assign_grid_coordinates(
    graph: &GridGraph,
    component: &[usize],
) -> Option<Vec<(usize, i32, i32)>> {
    let start = *component.first()?;
    let mut assigned: Vec<Option<(i32, i32)>> = vec![None; graph.neighbors.len()];
    let mut coords = Vec::with_capacity(component.len());
    let mut queue = VecDeque::new();

    assigned[start] = Some((0, 0));
    queue.push_back(start);

    while let Some(node) = queue.pop_front() {
        let (i, j) = assigned[node]?;
        coords.push((node, i, j));

        for neighbor in &graph.neighbors[node] {
            let (di, dj) = neighbor.direction.step();
            let expected = (i + di, j + dj);
            match assigned[neighbor.index] {
                Some(existing) if existing != expected => return None,
                Some(_) => {}
                None => {
                    assigned[neighbor.index] = Some(expected);
                    queue.push_back(neighbor.index);
                }
            }
        }
    }

    let mut seen: Vec<(i32, i32)> = coords.iter().map(|&(_, i, j)| (i, j)).collect();
    seen.sort_unstable();
    seen.dedup();
    (seen.len() == coords.len()).then_some(coords)
}
