//! Correspondence builder: detect the board in every synchronized pair and
//! keep the pairs where both detections succeed.

use log::{debug, info, warn};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use stereo_calib_core::{
    CheckerboardPattern, CorrespondenceSet, Detection, FrameCorrespondence, ImageSize,
};

#[cfg(feature = "tracing")]
use tracing::instrument;

#[derive(thiserror::Error, Debug)]
pub enum CorrespondenceError {
    #[error("frame sequences differ in length ({first} vs {second}); frame i of both must show the same instant")]
    FrameCountMismatch { first: usize, second: usize },

    #[error("cannot load image {path}: {source}")]
    ImageLoad {
        path: PathBuf,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("camera {camera}, frame {frame}: image size {got} differs from {expected}")]
    InconsistentImageSize {
        camera: u8,
        frame: usize,
        expected: ImageSize,
        got: ImageSize,
    },
}

/// Finds a checkerboard in one image file.
///
/// A miss is reported as [`Detection::Missed`]; errors are reserved for
/// frames that cannot be read at all.
pub trait BoardDetector: Sync {
    fn detect(
        &self,
        path: &Path,
        pattern: &CheckerboardPattern,
    ) -> Result<(Detection, ImageSize), CorrespondenceError>;
}

/// Per-frame detection runs in parallel; results are merged in input order.
#[derive(Clone, Debug)]
pub struct CorrespondenceBuilder<D> {
    detector: D,
}

struct PairDetection {
    first: Detection,
    size1: ImageSize,
    second: Detection,
    size2: ImageSize,
}

impl<D: BoardDetector> CorrespondenceBuilder<D> {
    pub fn new(detector: D) -> Self {
        Self { detector }
    }

    pub fn detector(&self) -> &D {
        &self.detector
    }

    /// Pair up detections of two index-aligned frame sequences.
    ///
    /// Frame `i` of `frames1` must depict the same board pose at the same
    /// instant as frame `i` of `frames2`. This is not (and cannot be)
    /// verified; violating it yields a wrong rig without an error.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "info", skip_all, fields(pairs = frames1.len()))
    )]
    pub fn build(
        &self,
        frames1: &[PathBuf],
        frames2: &[PathBuf],
        pattern: &CheckerboardPattern,
    ) -> Result<CorrespondenceSet, CorrespondenceError> {
        if frames1.len() != frames2.len() {
            return Err(CorrespondenceError::FrameCountMismatch {
                first: frames1.len(),
                second: frames2.len(),
            });
        }

        let detections = frames1
            .par_iter()
            .zip(frames2.par_iter())
            .map(|(a, b)| -> Result<PairDetection, CorrespondenceError> {
                let (first, size1) = self.detector.detect(a, pattern)?;
                let (second, size2) = self.detector.detect(b, pattern)?;
                Ok(PairDetection {
                    first,
                    size1,
                    second,
                    size2,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut set = CorrespondenceSet::new(*pattern);
        set.total_pairs = detections.len();
        for (frame, pair) in detections.into_iter().enumerate() {
            check_size(&mut set.image_size1, pair.size1, 1, frame)?;
            check_size(&mut set.image_size2, pair.size2, 2, frame)?;

            let (hit1, hit2) = (pair.first.is_detected(), pair.second.is_detected());
            match FrameCorrespondence::from_detections(frame, pair.first, pair.second) {
                Some(correspondence) => set.frames.push(correspondence),
                None => {
                    debug!(
                        "frame {frame}: board {} in camera 1, {} in camera 2; pair dropped",
                        found(hit1),
                        found(hit2)
                    );
                    set.dropped.push(frame);
                }
            }
        }

        info!(
            "board found in both views of {}/{} frame pairs",
            set.len(),
            set.total_pairs
        );
        if set.is_empty() && set.total_pairs > 0 {
            warn!("no frame pair has the board in both views");
        }
        Ok(set)
    }
}

fn found(hit: bool) -> &'static str {
    if hit {
        "found"
    } else {
        "missed"
    }
}

fn check_size(
    expected: &mut Option<ImageSize>,
    got: ImageSize,
    camera: u8,
    frame: usize,
) -> Result<(), CorrespondenceError> {
    match expected {
        Some(size) if *size != got => Err(CorrespondenceError::InconsistentImageSize {
            camera,
            frame,
            expected: *size,
            got,
        }),
        Some(_) => Ok(()),
        None => {
            *expected = Some(got);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Point2;
    use std::collections::HashMap;

    /// Detector answering from a table keyed by file name.
    struct Table(HashMap<&'static str, (bool, ImageSize)>);

    impl BoardDetector for Table {
        fn detect(
            &self,
            path: &Path,
            pattern: &CheckerboardPattern,
        ) -> Result<(Detection, ImageSize), CorrespondenceError> {
            let name = path.to_string_lossy();
            let &(hit, size) =
                self.0
                    .get(name.as_ref())
                    .ok_or_else(|| CorrespondenceError::ImageLoad {
                        path: path.to_path_buf(),
                        source: "missing".into(),
                    })?;
            let detection = if hit {
                Detection::Detected(vec![Point2::new(1.0, 2.0); pattern.point_count()])
            } else {
                Detection::Missed
            };
            Ok((detection, size))
        }
    }

    const VGA: ImageSize = ImageSize {
        width: 640,
        height: 480,
    };

    fn paths(names: &[&str]) -> Vec<PathBuf> {
        names.iter().map(PathBuf::from).collect()
    }

    fn pattern() -> CheckerboardPattern {
        CheckerboardPattern::new(3, 3, 1.0).unwrap()
    }

    #[test]
    fn keeps_only_pairs_detected_in_both_views() {
        let table = Table(HashMap::from([
            ("a0", (true, VGA)),
            ("b0", (true, VGA)),
            ("a1", (true, VGA)),
            ("b1", (false, VGA)),
            ("a2", (false, VGA)),
            ("b2", (true, VGA)),
            ("a3", (true, VGA)),
            ("b3", (true, VGA)),
        ]));
        let set = CorrespondenceBuilder::new(table)
            .build(
                &paths(&["a0", "a1", "a2", "a3"]),
                &paths(&["b0", "b1", "b2", "b3"]),
                &pattern(),
            )
            .unwrap();

        assert_eq!(4, set.total_pairs);
        assert_eq!(vec![0, 3], set.frames.iter().map(|f| f.frame_index).collect::<Vec<_>>());
        assert_eq!(vec![1, 2], set.dropped);
        assert_eq!(Some(VGA), set.image_size1);
        assert_eq!(2, set.object_points_per_frame().len());
    }

    #[test]
    fn zero_successes_is_an_empty_set() {
        let table = Table(HashMap::from([("a", (false, VGA)), ("b", (true, VGA))]));
        let set = CorrespondenceBuilder::new(table)
            .build(&paths(&["a"]), &paths(&["b"]), &pattern())
            .unwrap();
        assert!(set.is_empty());
        assert_eq!(vec![0], set.dropped);
    }

    #[test]
    fn unequal_sequences_are_rejected() {
        let table = Table(HashMap::new());
        let err = CorrespondenceBuilder::new(table)
            .build(&paths(&["a", "b"]), &paths(&["c"]), &pattern())
            .unwrap_err();
        assert!(matches!(
            err,
            CorrespondenceError::FrameCountMismatch {
                first: 2,
                second: 1
            }
        ));
    }

    #[test]
    fn image_size_change_is_rejected() {
        let other = ImageSize::new(1280, 720);
        let table = Table(HashMap::from([
            ("a0", (true, VGA)),
            ("b0", (true, VGA)),
            ("a1", (false, VGA)),
            ("b1", (false, other)),
        ]));
        let err = CorrespondenceBuilder::new(table)
            .build(&paths(&["a0", "a1"]), &paths(&["b0", "b1"]), &pattern())
            .unwrap_err();
        assert!(matches!(
            err,
            CorrespondenceError::InconsistentImageSize {
                camera: 2,
                frame: 1,
                ..
            }
        ));
    }

    #[test]
    fn unreadable_frame_is_an_error() {
        let table = Table(HashMap::from([("a0", (true, VGA))]));
        let err = CorrespondenceBuilder::new(table)
            .build(&paths(&["a0"]), &paths(&["missing"]), &pattern())
            .unwrap_err();
        assert!(matches!(err, CorrespondenceError::ImageLoad { .. }));
    }
}
