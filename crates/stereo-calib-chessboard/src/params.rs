use serde::{Deserialize, Serialize};

/// Neighbour search parameters for the 4-connected corner graph.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct GridGraphParams {
    pub min_spacing_pix: f32,
    pub max_spacing_pix: f32,
    pub k_neighbors: usize,
    pub orientation_tolerance_deg: f32,
}

impl Default for GridGraphParams {
    fn default() -> Self {
        Self {
            min_spacing_pix: 5.0,
            max_spacing_pix: 150.0,
            k_neighbors: 8,
            orientation_tolerance_deg: 22.5,
        }
    }
}

/// Iterative sub-pixel corner refinement.
///
/// Iteration stops at whichever bound is hit first: `max_iters` updates, or
/// an update shorter than `epsilon` pixels.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SubPixParams {
    /// Half size of the search window; 5 gives an 11x11 window.
    pub half_window: usize,
    pub max_iters: usize,
    pub epsilon: f64,
}

impl Default for SubPixParams {
    fn default() -> Self {
        Self {
            half_window: 5,
            max_iters: 100,
            epsilon: 1e-4,
        }
    }
}

/// Parameters specific to the checkerboard detector.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ChessboardParams {
    /// Minimal ChESS response to consider a corner.
    pub min_strength: f32,

    pub graph: GridGraphParams,

    /// Sub-pixel refinement; `None` keeps the ChESS positions.
    pub subpix: Option<SubPixParams>,
}

impl Default for ChessboardParams {
    fn default() -> Self {
        Self {
            min_strength: 0.0,
            graph: GridGraphParams::default(),
            subpix: Some(SubPixParams::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let params: ChessboardParams =
            serde_json::from_str(r#"{"graph":{"max_spacing_pix":80.0}}"#).unwrap();
        assert_eq!(80.0, params.graph.max_spacing_pix);
        assert_eq!(8, params.graph.k_neighbors);
        assert_eq!(Some(SubPixParams::default()), params.subpix);

        let params: ChessboardParams = serde_json::from_str(r#"{"subpix":null}"#).unwrap();
        assert!(params.subpix.is_none());
    }
}
