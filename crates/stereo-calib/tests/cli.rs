#![cfg(all(feature = "cli", feature = "image"))]

use std::fs;
use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// Two frame folders holding blank images and two camera info files.
fn workspace(frames1: usize, frames2: usize) -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    for (name, count) in [("cam1", frames1), ("cam2", frames2)] {
        let frames = dir.path().join(name);
        fs::create_dir_all(&frames).unwrap();
        for i in 0..count {
            image::GrayImage::from_pixel(80, 60, image::Luma([128u8]))
                .save(frames.join(format!("frame{i}.png")))
                .unwrap();
        }
        fs::write(
            dir.path().join(format!("{name}_info.txt")),
            "600 600 320 240 0 0 0 0\n",
        )
        .unwrap();
    }
    dir
}

fn stereo_calib(root: &Path) -> Command {
    let mut cmd = Command::cargo_bin("stereo-calib").unwrap();
    cmd.current_dir(root).args([
        "cam1",
        "cam2",
        "cam1_info.txt",
        "cam2_info.txt",
        "--checkerboard",
        "7x6x70",
        "-q",
    ]);
    cmd
}

#[test]
fn malformed_checkerboard_is_rejected() {
    let dir = workspace(1, 1);
    Command::cargo_bin("stereo-calib")
        .unwrap()
        .current_dir(dir.path())
        .args(["cam1", "cam2", "cam1_info.txt", "cam2_info.txt"])
        .args(["--checkerboard", "7x6"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("ROWSxCOLUMNSxSQUARE_SIZE"));
}

#[test]
fn answering_no_aborts_without_output() {
    let dir = workspace(2, 2);
    stereo_calib(dir.path())
        .args(["--savepath", "rig.yaml"])
        .write_stdin("n\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("Aborted"));
    assert!(!dir.path().join("rig.yaml").exists());
}

#[test]
fn closed_stdin_without_yes_fails() {
    let dir = workspace(2, 2);
    stereo_calib(dir.path())
        .write_stdin("")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("--yes"));
}

#[test]
fn frames_without_board_fail_with_insufficient_observations() {
    let dir = workspace(3, 3);
    stereo_calib(dir.path())
        .args(["--yes", "--savepath", "rig.yaml"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("insufficient observations"));
    assert!(!dir.path().join("rig.yaml").exists());
}

#[test]
fn bad_savepath_is_rejected_before_the_prompt() {
    let dir = workspace(3, 3);
    stereo_calib(dir.path())
        .args(["--savepath", "rig.txt"])
        .write_stdin("")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("unsupported export extension"))
        .stdout(predicate::str::contains("synchronized").not());
}

#[test]
fn equal_camera_names_are_rejected() {
    let dir = workspace(3, 3);
    stereo_calib(dir.path())
        .args(["--yes", "--cam1-name", "rgb", "--cam2-name", "rgb"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("distinct"))
        .stderr(predicate::str::contains("insufficient observations").not());
}

#[test]
fn unequal_sequences_are_rejected() {
    let dir = workspace(3, 2);
    stereo_calib(dir.path())
        .arg("--yes")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("differ in length"));
}

#[test]
fn missing_camera_info_is_reported() {
    let dir = workspace(1, 1);
    fs::remove_file(dir.path().join("cam2_info.txt")).unwrap();
    stereo_calib(dir.path())
        .arg("--yes")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("cam2_info.txt"));
}
