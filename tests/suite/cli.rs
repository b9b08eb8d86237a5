//! The `fcs` binary's configuration handling.

use std::process::Command;

fn fcs(home: &std::path::Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_fcs"));
    cmd.env("HOME", home)
        .env_remove("FCS_ENGINE_PATH")
        .env_remove("RUST_LOG")
        .current_dir(home);
    cmd
}

#[test]
fn missing_engine_is_a_configuration_error() {
    let home = tempfile::tempdir().unwrap();
    let output = fcs(home.path()).args(["test"]).output().unwrap();
    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("engine path is not configured"), "{stderr}");
}

#[test]
fn engine_flag_must_exist() {
    let home = tempfile::tempdir().unwrap();
    let output = fcs(home.path())
        .args(["inspect", "foo.fcs", "--engine", "/nonexistent/fcs-engine"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("not found"), "{stderr}");
}

#[test]
fn malformed_config_is_a_configuration_error() {
    let home = tempfile::tempdir().unwrap();
    std::fs::create_dir(home.path().join(".fcs")).unwrap();
    std::fs::write(home.path().join(".fcs/config.toml"), "[engine\npath = 1").unwrap();

    let output = fcs(home.path()).args(["test"]).output().unwrap();
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn no_definitions_is_not_a_failure() {
    let home = tempfile::tempdir().unwrap();
    let engine = crate::common::engine_script(home.path());
    let empty = home.path().join("empty");
    std::fs::create_dir(&empty).unwrap();

    let output = fcs(home.path())
        .arg("test")
        .arg("--dir")
        .arg(&empty)
        .arg("--engine")
        .arg(&engine)
        .output()
        .unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("No test definition files"), "{stdout}");
}
