//! Black-box tests driving the installed binary.

use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;

fn stepmesh() -> Command {
    Command::cargo_bin("stepmesh").unwrap()
}

fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("../stepmesh/tests/fixtures")
        .join(name)
}

#[test]
fn test_converts_to_every_format() {
    for ext in ["gltf", "glb", "obj", "stl"] {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join(format!("cube.{ext}"));

        stepmesh()
            .arg(fixture("cube.step"))
            .arg(&out)
            .assert()
            .success()
            .stdout(predicate::str::contains("100%"));

        assert!(out.exists(), "no {ext} output written");
        assert!(std::fs::metadata(&out).unwrap().len() > 0);
    }
}

#[test]
fn test_gltf_output_brings_sibling_buffer() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("model.gltf");

    stepmesh()
        .arg(fixture("cube.step"))
        .arg(&out)
        .assert()
        .success();

    assert!(dir.path().join("model.bin").exists());
}

#[test]
fn test_assembly_to_glb() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("assembly.glb");

    stepmesh()
        .arg(fixture("assembly.step"))
        .arg(&out)
        .assert()
        .success();

    let bytes = std::fs::read(&out).unwrap();
    assert_eq!(&bytes[0..4], b"glTF");
}

#[test]
fn test_verbose_prints_stage_banners() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("cube.glb");

    stepmesh()
        .arg("-v")
        .arg(fixture("cube.step"))
        .arg(&out)
        .assert()
        .success()
        .stdout(
            predicate::str::contains("Loading")
                .and(predicate::str::contains("Parsing STEP ..."))
                .and(predicate::str::contains(
                    "Meshing shapes (linear 0.1, angular 0.5) ...",
                ))
                .and(predicate::str::contains("Saving to glb ...")),
        );
}

#[test]
fn test_unknown_output_extension_fails_without_writing() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("cube.xyz");

    stepmesh()
        .arg(fixture("cube.step"))
        .arg(&out)
        .assert()
        .failure()
        .stderr(predicate::str::contains(
            "output filename shall have .gltf, .glb, .stl or .obj extension.",
        ));

    assert!(!out.exists());
}

#[test]
fn test_missing_input_reports_import_error() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out.stl");

    stepmesh()
        .arg(dir.path().join("nope.step"))
        .arg(&out)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error: failed to read STEP file"));

    assert!(!out.exists());
}

#[test]
fn test_garbage_input_reports_import_error() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("junk.step");
    std::fs::write(&input, "MIME-Version: 1.0\n").unwrap();
    let out = dir.path().join("out.obj");

    stepmesh()
        .arg(&input)
        .arg(&out)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error:"));

    assert!(!out.exists());
}

#[test]
fn test_negative_deflection_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out.stl");

    stepmesh()
        .arg(fixture("cube.step"))
        .arg(&out)
        .arg("--linear=-0.5")
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid linear deflection"));

    assert!(!out.exists());
}

#[test]
fn test_no_arguments_is_a_usage_error() {
    stepmesh()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn test_help_shares_the_fatal_exit_code() {
    stepmesh()
        .arg("--help")
        .assert()
        .failure()
        .stdout(predicate::str::contains("Usage"));
}
