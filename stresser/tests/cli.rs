use std::path::Path;
use std::process::{Command, Output};

const STRESSER_EXE: &str = env!("CARGO_BIN_EXE_stresser");

fn stresser(storage: &Path) -> Command {
    let mut command = Command::new(STRESSER_EXE);
    command
        .env_remove("RUST_LOG")
        .env_remove("AWS_ENDPOINT_URL")
        .env_remove("AWS_REGION")
        .env_remove("S3_BUCKET")
        .env("STRESSER__STORAGE__TYPE", "filesystem")
        .env("STRESSER__STORAGE__PATH", storage);
    command
}

fn assert_success(output: &Output) {
    assert!(
        output.status.success(),
        "stresser exited with {:?}\nstderr:\n{}",
        output.status.code(),
        String::from_utf8_lossy(&output.stderr)
    );
}

#[test]
fn prints_version() {
    let output = Command::new(STRESSER_EXE).arg("version").output().unwrap();
    assert_success(&output);

    let stdout = String::from_utf8(output.stdout).unwrap();
    assert_eq!(stdout.trim(), format!("stresser {}", env!("CARGO_PKG_VERSION")));
}

#[test]
fn generates_then_reads_objects() {
    let tempdir = tempfile::tempdir().unwrap();
    let storage = tempdir.path().join("objects");
    let manifest = tempdir.path().join("manifest.txt");
    let write_csv = tempdir.path().join("write.csv");
    let read_csv = tempdir.path().join("read.csv");

    let output = stresser(&storage)
        .args(["run", "--op", "write", "--files", "5", "--put-size", "1KiB", "-n", "2"])
        .arg(&manifest)
        .arg("-o")
        .arg(&write_csv)
        .output()
        .unwrap();
    assert_success(&output);

    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("Total Requests: 5"), "{stdout}");
    assert_eq!(std::fs::read_to_string(&manifest).unwrap().lines().count(), 5);
    assert_eq!(std::fs::read_to_string(&write_csv).unwrap().lines().count(), 6);

    let output = stresser(&storage)
        .args(["run", "-d", "300ms", "-n", "2", "-r"])
        .arg(&manifest)
        .arg("-o")
        .arg(&read_csv)
        .output()
        .unwrap();
    assert_success(&output);

    let csv = std::fs::read_to_string(&read_csv).unwrap();
    assert!(csv.lines().count() > 1);
    assert!(csv.lines().skip(1).all(|line| line.contains(",GET,")));
    // The read run must not touch the manifest.
    assert_eq!(std::fs::read_to_string(&manifest).unwrap().lines().count(), 5);
}

#[test]
fn missing_manifest_fails() {
    let tempdir = tempfile::tempdir().unwrap();

    let output = stresser(tempdir.path())
        .args(["run", "-d", "1s"])
        .arg(tempdir.path().join("missing.txt"))
        .output()
        .unwrap();
    assert!(!output.status.success());

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("failed to read manifest file"), "{stderr}");
}

#[test]
fn rejects_invalid_duration() {
    let tempdir = tempfile::tempdir().unwrap();

    let output = stresser(tempdir.path())
        .args(["run", "--op", "write", "-d", "soon"])
        .output()
        .unwrap();
    assert!(!output.status.success());

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("failed to load configuration"), "{stderr}");
}
