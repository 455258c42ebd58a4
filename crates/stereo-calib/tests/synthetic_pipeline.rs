use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use nalgebra::{Matrix3, UnitQuaternion};
use stereo_calib::core::synthetic::{StereoScene, UniformPixelNoise};
use stereo_calib::{
    calibrate_stereo, BoardDetector, CheckerboardPattern, CorrespondenceBuilder,
    CorrespondenceError, Detection, ImageSize, SolveError, StereoCalibConfig, StereoCalibError,
};

/// Serves synthetic detections keyed by path, as if decoded from 640x480 frames.
struct SyntheticDetector {
    detections: HashMap<PathBuf, Detection>,
}

impl BoardDetector for SyntheticDetector {
    fn detect(
        &self,
        path: &Path,
        _pattern: &CheckerboardPattern,
    ) -> Result<(Detection, ImageSize), CorrespondenceError> {
        let detection = self
            .detections
            .get(path)
            .cloned()
            .unwrap_or(Detection::Missed);
        Ok((detection, ImageSize::new(640, 480)))
    }
}

struct Fixture {
    scene: StereoScene,
    frames1: Vec<PathBuf>,
    frames2: Vec<PathBuf>,
    detector: SyntheticDetector,
}

/// `n` synchronized pairs; the listed frames miss the board in camera 2.
fn fixture(n: usize, noise: f64, missed_in_cam2: &[usize]) -> Fixture {
    let scene = StereoScene::demo(n);
    let observed = scene.observe(&UniformPixelNoise::new(2024, noise));
    assert_eq!(n, observed.len());

    let mut detections = HashMap::new();
    let mut frames1 = Vec::new();
    let mut frames2 = Vec::new();
    for f in observed {
        let p1 = PathBuf::from(format!("cam1/frame{}.png", f.frame_index));
        let p2 = PathBuf::from(format!("cam2/frame{}.png", f.frame_index));
        detections.insert(p1.clone(), Detection::Detected(f.image_points1));
        if !missed_in_cam2.contains(&f.frame_index) {
            detections.insert(p2.clone(), Detection::Detected(f.image_points2));
        }
        frames1.push(p1);
        frames2.push(p2);
    }
    Fixture {
        scene,
        frames1,
        frames2,
        detector: SyntheticDetector { detections },
    }
}

#[test]
fn recovers_known_rig_from_ten_noisy_pairs() {
    let _ = env_logger::builder().is_test(true).try_init();
    let fx = fixture(10, 0.4, &[]);
    let run = calibrate_stereo(
        &CorrespondenceBuilder::new(fx.detector),
        &fx.frames1,
        &fx.frames2,
        &fx.scene.pattern,
        &fx.scene.cam1,
        &fx.scene.cam2,
        &StereoCalibConfig::default(),
    )
    .unwrap();

    let truth = fx.scene.cam2_from_cam1;
    let estimated = UnitQuaternion::from_rotation_matrix(run.rig.rotation());
    assert!(estimated.angle_to(&truth.rotation).to_degrees() < 1.0);
    let t = truth.translation.vector;
    assert!((run.rig.translation() - t).norm() / t.norm() < 0.02);

    let r = run.rig.rotation().matrix();
    assert!((r * r.transpose() - Matrix3::identity()).amax() < 1e-9);
    assert!((r.determinant() - 1.0).abs() < 1e-9);

    assert_eq!(10, run.report.frames_used);
    assert_eq!(10, run.report.total_pairs);
    assert!(run.report.dropped_frames.is_empty());
    assert_eq!(Some(ImageSize::new(640, 480)), run.report.image_size1);
    assert!(run.report.rms < 0.5);
}

#[test]
fn pairs_missing_a_view_are_dropped() {
    let fx = fixture(8, 0.2, &[2, 5]);
    let run = calibrate_stereo(
        &CorrespondenceBuilder::new(fx.detector),
        &fx.frames1,
        &fx.frames2,
        &fx.scene.pattern,
        &fx.scene.cam1,
        &fx.scene.cam2,
        &StereoCalibConfig::default(),
    )
    .unwrap();

    assert_eq!(vec![2, 5], run.report.dropped_frames);
    assert_eq!(6, run.correspondences.len());
    assert!(run
        .correspondences
        .frames
        .iter()
        .all(|f| f.frame_index != 2 && f.frame_index != 5));
    assert_eq!(6, run.solution.board_poses.len());
}

#[test]
fn no_mutual_detection_fails_with_insufficient_observations() {
    let all: Vec<usize> = (0..4).collect();
    let fx = fixture(4, 0.0, &all);
    let err = calibrate_stereo(
        &CorrespondenceBuilder::new(fx.detector),
        &fx.frames1,
        &fx.frames2,
        &fx.scene.pattern,
        &fx.scene.cam1,
        &fx.scene.cam2,
        &StereoCalibConfig::default(),
    )
    .unwrap_err();

    assert!(matches!(
        err,
        StereoCalibError::Solve(SolveError::InsufficientObservations { usable: 0, .. })
    ));
    assert!(err.to_string().contains("0 usable frame"));
}

#[test]
fn exported_run_uses_configured_names() {
    let fx = fixture(5, 0.1, &[]);
    let config = StereoCalibConfig {
        cam1_name: "depth".into(),
        cam2_name: "rgb".into(),
        ..Default::default()
    };
    let run = calibrate_stereo(
        &CorrespondenceBuilder::new(fx.detector),
        &fx.frames1,
        &fx.frames2,
        &fx.scene.pattern,
        &fx.scene.cam1,
        &fx.scene.cam2,
        &config,
    )
    .unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out/rig.yaml");
    run.export(&path).unwrap();

    let doc: BTreeMap<String, Vec<f64>> =
        serde_yaml::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(4, doc["depth_d"].len());
    assert_eq!(8, doc["rgb_d"].len());
    assert_eq!(9, doc["depth_to_rgb_rotation"].len());
    assert_eq!(3, doc["depth_to_rgb_translation"].len());
    assert_eq!(fx.scene.cam1.k().to_vec(), doc["depth_k"]);
}
