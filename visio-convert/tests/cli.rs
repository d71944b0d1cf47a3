use assert_cmd::Command;
use predicates::prelude::*;
use std::fs::write;
use tempfile::{tempdir, NamedTempFile};

/// Nothing listens on the discard port, so every request fails fast.
const UNREACHABLE_API: &str = "http://127.0.0.1:9";

fn visio_convert() -> Command {
    let mut cmd = Command::cargo_bin("visio-convert").expect("Binary exists");
    cmd.env("VISIO_CONVERT_API_URL", UNREACHABLE_API)
        .env("RUST_LOG", "error");
    cmd
}

#[test]
fn help_lists_every_subcommand() {
    let mut cmd = visio_convert();
    cmd.arg("--help");
    cmd.assert().success().stdout(
        predicate::str::contains("convert")
            .and(predicate::str::contains("list"))
            .and(predicate::str::contains("status"))
            .and(predicate::str::contains("retry"))
            .and(predicate::str::contains("delete"))
            .and(predicate::str::contains("download")),
    );
}

#[test]
fn convert_rejects_wrong_file_type_before_contacting_the_service() {
    let dir = tempdir().expect("temp dir");
    let input = dir.path().join("notes.txt");
    write(&input, b"plain text").expect("write input");

    let mut cmd = visio_convert();
    cmd.arg("convert").arg(&input).arg("--no-download");
    cmd.assert()
        .failure()
        .stderr(
            predicate::str::contains("Invalid file type. Only .vsd and .vsdx files are allowed")
                .and(predicate::str::contains("Network error").not()),
        );
}

#[test]
fn convert_rejects_oversized_file_without_reading_it() {
    let dir = tempdir().expect("temp dir");
    let input = dir.path().join("huge.vsdx");
    let file = std::fs::File::create(&input).expect("create input");
    // Sparse: the size is reported by metadata but no data blocks are written.
    file.set_len(3 * 1024 * 1024 * 1024).expect("extend input");
    drop(file);

    let mut cmd = visio_convert();
    cmd.arg("convert").arg(&input).arg("--no-download");
    cmd.assert().failure().stderr(
        predicate::str::contains("[ERROR] File size too large. Maximum size is 1000MB")
            .and(predicate::str::contains("Network error").not()),
    );
}

#[test]
fn convert_reports_unreadable_input() {
    let dir = tempdir().expect("temp dir");
    let missing = dir.path().join("missing.vsdx");

    let mut cmd = visio_convert();
    cmd.arg("convert").arg(&missing);
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read"));
}

#[test]
fn invalid_config_yaml_fails_before_any_command_runs() {
    let config = NamedTempFile::new().expect("Creating temp config file failed");
    write(config.path(), b"controller: [not, a, mapping\n").expect("Writing temp config failed");

    let mut cmd = visio_convert();
    cmd.arg("list").arg("--config").arg(config.path());
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Failed to parse config YAML"));
}

#[test]
fn list_surfaces_network_errors() {
    let mut cmd = visio_convert();
    cmd.arg("list");
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("[ERROR] Network error"));
}

#[test]
fn delete_of_unknown_file_is_reported() {
    let mut cmd = visio_convert();
    cmd.arg("delete").arg("no-such-id");
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("[ERROR]"));
}
