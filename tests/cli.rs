use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;

fn wslswitch() -> assert_cmd::Command {
    cargo_bin_cmd!("wslswitch").into()
}

#[test]
fn help_works() {
    wslswitch()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("WSL1 Linux rootfs"));
}

#[test]
fn install_unknown_catalog_entry_fails() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("wslswitch.toml");
    std::fs::write(&config_path, "").unwrap();

    wslswitch()
        .args([
            "--config",
            config_path.to_str().unwrap(),
            "install",
            "nonexistent-distro:latest",
        ])
        .assert()
        .failure();
}

#[test]
fn get_local_path_copies_archive_without_network() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("custom.tar.gz");
    std::fs::write(&source, b"fake archive contents").unwrap();
    let output_dir = dir.path().join("out");

    wslswitch()
        .args([
            "get",
            source.to_str().unwrap(),
            "--output",
            output_dir.to_str().unwrap(),
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("Wrote"));

    let copied = output_dir.join("custom.tar.gz");
    assert_eq!(std::fs::read(copied).unwrap(), b"fake archive contents");
}

#[test]
fn malformed_config_shows_parse_error() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("wslswitch.toml");
    std::fs::write(&config_path, "legacy_label = [this is not valid toml").unwrap();

    wslswitch()
        .args([
            "--config",
            config_path.to_str().unwrap(),
            "get",
            "ubuntu:noble",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to parse config"));
}

#[test]
fn invalid_legacy_label_in_config_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("wslswitch.toml");
    std::fs::write(&config_path, "legacy_label = \"has space\"\n").unwrap();

    wslswitch()
        .args([
            "--config",
            config_path.to_str().unwrap(),
            "get",
            "ubuntu:noble",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("legacy_label"));
}
