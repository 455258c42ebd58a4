use std::collections::BTreeMap;
use std::fs;

use approx::assert_relative_eq;
use nalgebra::{Rotation3, Vector3};
use stereo_calib::{CameraIntrinsics, DistortionModel, ExportError, StereoRig};

fn camera() -> CameraIntrinsics {
    CameraIntrinsics::new(
        DistortionModel::PinholeRadtan,
        600.0,
        600.0,
        320.0,
        240.0,
        vec![0.0; 4],
    )
    .unwrap()
}

fn rig() -> StereoRig {
    StereoRig::builder()
        .cam1(camera())
        .cam2(camera())
        .rotation(Rotation3::identity())
        .translation(Vector3::new(10.0, 0.0, 0.0))
        .build()
        .unwrap()
}

fn check_document(doc: &BTreeMap<String, Vec<f64>>) {
    assert_eq!(6, doc.len());
    assert_eq!(vec![600.0, 600.0, 320.0, 240.0], doc["cam1_k"]);
    assert_eq!(vec![600.0, 600.0, 320.0, 240.0], doc["cam2_k"]);
    assert_eq!(vec![0.0; 4], doc["cam1_d"]);
    assert_eq!(vec![0.0; 4], doc["cam2_d"]);
    let identity = [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0];
    for (e, v) in identity.iter().zip(&doc["cam1_to_cam2_rotation"]) {
        assert_relative_eq!(*e, *v, epsilon = 1e-12);
    }
    assert_eq!(vec![10.0, 0.0, 0.0], doc["cam1_to_cam2_translation"]);
}

#[test]
fn yaml_round_trip_reproduces_values() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("rig.yaml");
    rig().export(&path, "cam1", "cam2").unwrap();

    let text = fs::read_to_string(&path).unwrap();
    let doc: BTreeMap<String, Vec<f64>> = serde_yaml::from_str(&text).unwrap();
    check_document(&doc);

    // keys are written sorted
    let first_keys: Vec<&str> = text
        .lines()
        .filter(|l| !l.starts_with(['-', ' ']))
        .map(|l| l.trim_end_matches(':'))
        .collect();
    assert_eq!(
        vec![
            "cam1_d",
            "cam1_k",
            "cam1_to_cam2_rotation",
            "cam1_to_cam2_translation",
            "cam2_d",
            "cam2_k"
        ],
        first_keys
    );
}

#[test]
fn json_round_trip_reproduces_values() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("rig.json");
    rig().export(&path, "cam1", "cam2").unwrap();

    let doc: BTreeMap<String, Vec<f64>> =
        serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    check_document(&doc);
}

#[test]
fn export_before_calibration_is_impossible() {
    let err = StereoRig::builder().cam1(camera()).cam2(camera()).build();
    assert!(err.is_err());

    let err: ExportError = err.unwrap_err().into();
    assert!(err.to_string().contains("incomplete"));
}
