use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::tempdir;

fn panwctl() -> Command {
    Command::cargo_bin("panwctl").unwrap()
}

#[test]
fn help_lists_the_tool_family() {
    panwctl()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("api-key"))
        .stdout(predicate::str::contains("firewalls"))
        .stdout(predicate::str::contains("interfaces"))
        .stdout(predicate::str::contains("config"))
        .stdout(predicate::str::contains("run"));
}

#[test]
fn firewalls_help_documents_terse_and_state() {
    panwctl()
        .args(["firewalls", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--terse"))
        .stdout(predicate::str::contains("--state"));
}

#[test]
fn no_targets_anywhere_is_a_resolution_error() {
    let config = tempdir().unwrap();
    panwctl()
        .env("PANWCTL_CONFIG_DIR", config.path())
        .current_dir(config.path())
        .args(["interfaces", "--key", "abc"])
        .write_stdin("")
        .assert()
        .failure()
        .stderr(predicate::str::contains("no targets"));
}

#[test]
fn missing_credentials_fail_before_any_query() {
    let config = tempdir().unwrap();
    // Targets are piped, so interactive key acquisition is off the table.
    panwctl()
        .env("PANWCTL_CONFIG_DIR", config.path())
        .current_dir(config.path())
        .arg("interfaces")
        .write_stdin("fw01.example.net\n")
        .assert()
        .failure()
        .stderr(predicate::str::contains("no API key"));
}

#[test]
fn configure_then_config_show_masks_the_key() {
    let config = tempdir().unwrap();

    panwctl()
        .env("PANWCTL_CONFIG_DIR", config.path())
        .current_dir(config.path())
        .args([
            "configure",
            "--api-key",
            "super-secret-key",
            "--user",
            "svc-api",
            "--panorama",
            "panorama.example.net",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("Saved settings to"));

    panwctl()
        .env("PANWCTL_CONFIG_DIR", config.path())
        .current_dir(config.path())
        .arg("config-show")
        .assert()
        .success()
        .stdout(predicate::str::contains("*****"))
        .stdout(predicate::str::contains("svc-api"))
        .stdout(predicate::str::contains("panorama.example.net"))
        .stdout(predicate::str::contains("super-secret-key").not());
}
