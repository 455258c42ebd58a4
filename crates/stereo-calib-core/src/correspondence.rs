use crate::CheckerboardPattern;
use nalgebra::{Point2, Point3};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome of running a checkerboard detector on one image.
///
/// A miss is an expected result, not an error: the frame is simply not an
/// observation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Detection {
    /// All inner corners found, in pattern index order.
    Detected(Vec<Point2<f64>>),
    Missed,
}

impl Detection {
    #[inline]
    pub fn is_detected(&self) -> bool {
        matches!(self, Self::Detected(_))
    }

    pub fn points(&self) -> Option<&[Point2<f64>]> {
        match self {
            Self::Detected(points) => Some(points),
            Self::Missed => None,
        }
    }

    pub fn into_points(self) -> Option<Vec<Point2<f64>>> {
        match self {
            Self::Detected(points) => Some(points),
            Self::Missed => None,
        }
    }
}

/// One stereo observation of the pattern: index-aligned image points of the
/// same board pose seen by both cameras.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FrameCorrespondence {
    /// Index of the source pair in the input sequences.
    pub frame_index: usize,
    pub image_points1: Vec<Point2<f64>>,
    pub image_points2: Vec<Point2<f64>>,
}

impl FrameCorrespondence {
    /// Pair two detections; `None` unless both are [`Detection::Detected`].
    pub fn from_detections(
        frame_index: usize,
        first: Detection,
        second: Detection,
    ) -> Option<Self> {
        match (first, second) {
            (Detection::Detected(image_points1), Detection::Detected(image_points2)) => {
                Some(Self {
                    frame_index,
                    image_points1,
                    image_points2,
                })
            }
            _ => None,
        }
    }
}

/// Image dimensions in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageSize {
    pub width: u32,
    pub height: u32,
}

impl ImageSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl fmt::Display for ImageSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Usable stereo observations of one calibration run, plus bookkeeping on
/// the frames that did not make it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CorrespondenceSet {
    pub pattern: CheckerboardPattern,
    /// Pairs where the board was found in both images, in input order.
    pub frames: Vec<FrameCorrespondence>,
    /// Number of input pairs examined.
    pub total_pairs: usize,
    /// Input indices of pairs with a miss in at least one image.
    pub dropped: Vec<usize>,
    pub image_size1: Option<ImageSize>,
    pub image_size2: Option<ImageSize>,
}

impl CorrespondenceSet {
    pub fn new(pattern: CheckerboardPattern) -> Self {
        Self {
            pattern,
            frames: Vec::new(),
            total_pairs: 0,
            dropped: Vec::new(),
            image_size1: None,
            image_size2: None,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Canonical pattern points, shared by every frame.
    pub fn object_points(&self) -> Vec<Point3<f64>> {
        self.pattern.object_points()
    }

    /// Pattern points replicated once per usable frame.
    pub fn object_points_per_frame(&self) -> Vec<Vec<Point3<f64>>> {
        let points = self.object_points();
        vec![points; self.frames.len()]
    }
}
