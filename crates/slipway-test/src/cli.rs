//! CLI regression tests for the `slipway` binary.
//!
//! These tests invoke the binary as a subprocess to catch regressions in flag
//! names, exit codes, and output formats that the library tests can't catch.
//!
//! Run with: `cargo test -p slipway-test`
//! Requires the `slipway` binary to be built first (`cargo build -p slipway`).

use assert_cmd::Command;
use predicates::str::contains;
use tempfile::TempDir;

use crate::project::TestProject;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Returns an assert_cmd Command wrapping the `slipway` binary, isolated from
/// the caller's environment.
fn slipway() -> Command {
    // cargo_bin is deprecated for custom build-dir setups; fine for standard workspace use.
    #[allow(deprecated)]
    let mut cmd = Command::cargo_bin("slipway")
        .expect("slipway binary not found, run `cargo build -p slipway` first");
    cmd.env_remove("SLIPWAY_HOME")
        .env_remove("SLIPWAY_WORKSPACE")
        .env_remove("SLIPWAY_PUSH_COMMAND")
        .env_remove("RUST_LOG");
    cmd
}

/// `slipway` pointed at a fresh petstore home.
fn slipway_in(project: &TestProject) -> Command {
    let mut cmd = slipway();
    cmd.arg("--home").arg(project.home());
    cmd
}

// ---------------------------------------------------------------------------
// slipway push
// ---------------------------------------------------------------------------

#[test]
fn push_without_arguments_exits_two() {
    slipway().arg("push").assert().failure().code(2);
}

#[test]
fn push_wrong_target_exits_one() {
    let project = TestProject::petstore().expect("fixture");
    slipway_in(&project)
        .args(["push", "app", "petstore"])
        .assert()
        .failure()
        .code(1)
        .stderr(contains("E2000"))
        .stderr(contains("wrong push target"));
}

#[test]
fn push_missing_namespace_exits_one() {
    let project = TestProject::petstore().expect("fixture");
    slipway_in(&project)
        .args(["push", "api"])
        .assert()
        .failure()
        .code(1)
        .stderr(contains("E2000"));
}

#[test]
fn push_unknown_api_exits_one() {
    let project = TestProject::petstore().expect("fixture");
    slipway_in(&project)
        .args(["push", "api", "inventory", "dev"])
        .assert()
        .failure()
        .code(1)
        .stderr(contains("E2010"));
}

#[test]
fn push_parent_dir_namespace_exits_one_and_keeps_home() {
    let project = TestProject::petstore().expect("fixture");
    slipway_in(&project)
        .args(["push", "api", ".."])
        .assert()
        .failure()
        .code(1)
        .stderr(contains("E2020"));
    assert!(project.home().join("recipes.yaml").exists());
    assert!(project.home().join("workspace/projects/petstore/api.yaml").exists());
}

#[test]
fn push_unknown_selector_exits_one() {
    let project = TestProject::petstore().expect("fixture");
    slipway_in(&project)
        .args(["push", "api", "petstore", "staging"])
        .assert()
        .failure()
        .code(1)
        .stderr(contains("E2002"));
}

#[test]
fn push_invalid_version_exits_one() {
    let project = TestProject::petstore().expect("fixture");
    slipway_in(&project)
        .args(["push", "api", "petstore", "dev", "--release-version", "1.0"])
        .assert()
        .failure()
        .code(1)
        .stderr(contains("E2020"));
    assert!(!project.build_dir().join("petstore").exists());
}

#[test]
fn push_without_push_command_warns() {
    let project = TestProject::petstore().expect("fixture");
    slipway_in(&project)
        .args(["push", "api", "petstore", "dev", "--keep-build"])
        .assert()
        .success()
        .stderr(contains("W2041"))
        .stderr(contains("built petstore-2"));
    assert!(project.build_dir().join("petstore-2/api.json").exists());
}

#[test]
fn push_no_install_skips_push_command() {
    let project = TestProject::petstore().expect("fixture");
    slipway_in(&project)
        .args(["push", "api", "petstore", "dev", "--no-install"])
        .args(["--push-command", "false"])
        .assert()
        .success()
        .stderr(contains("built petstore-2"));
    assert!(!project.build_dir().join("petstore-2").exists());
}

#[cfg(unix)]
#[test]
fn push_runs_push_command_from_env() {
    let project = TestProject::petstore().expect("fixture");
    slipway_in(&project)
        .args(["push", "api", "petstore", "prod"])
        .env("SLIPWAY_PUSH_COMMAND", "sh -c 'echo {namespace} > pushed.txt'")
        .assert()
        .success()
        .stderr(contains("pushed petstore-3 with"));

    let pushed = std::fs::read_to_string(project.build_dir().join("pushed.txt"))
        .expect("push command output");
    assert_eq!(pushed.trim(), "petstore-3");
    assert!(!project.build_dir().join("petstore-3").exists());
}

#[cfg(unix)]
#[test]
fn push_failing_push_command_exits_one() {
    let project = TestProject::petstore().expect("fixture");
    slipway_in(&project)
        .args(["push", "api", "petstore", "dev", "--push-command", "false"])
        .assert()
        .failure()
        .code(1)
        .stderr(contains("E2040"));
    assert!(!project.build_dir().join("petstore-2").exists());
}

#[test]
fn push_copies_to_configured_folder() {
    let project = TestProject::petstore().expect("fixture");
    let dist = TempDir::new().expect("temp dir");
    project
        .write(
            "recipes.yaml",
            &format!(
                "common:\n  copyTo: {}\n  install: false\nship:\n  version: \"7\"\n",
                dist.path().display()
            ),
        )
        .expect("write recipes");

    slipway_in(&project)
        .args(["push", "api", "petstore", "ship"])
        .assert()
        .success()
        .stderr(contains("copied to"));

    let copied = dist.path().join("petstore-7");
    assert!(copied.join("api.json").exists());
    assert!(copied.join("resources/services/GetPets.json").exists());
}

#[test]
fn push_uses_workspace_flag() {
    let project = TestProject::petstore().expect("fixture");
    let workspace = project.home().join("workspace/projects");
    project
        .write("settings.yaml", "release:\n  notes: moved\n")
        .expect("write settings");

    slipway_in(&project)
        .args(["push", "api", "petstore", "dev", "--keep-build", "--workspace"])
        .arg(&workspace)
        .args(["--notes", "from cli"])
        .assert()
        .success();

    let api = project
        .read_json("build/petstore-2/api.json")
        .expect("api spec");
    assert_eq!(api["release"]["notes"], "from cli");
}

// ---------------------------------------------------------------------------
// slipway resolve
// ---------------------------------------------------------------------------

#[test]
fn resolve_prints_effective_config() {
    let project = TestProject::petstore().expect("fixture");
    let output = slipway_in(&project)
        .args(["resolve", "dev"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let s = String::from_utf8(output).expect("stdout should be valid UTF-8");
    let v: serde_json::Value = serde_json::from_str(&s).expect("resolve should print JSON");
    assert_eq!(v["vendor"], "acme");
    assert_eq!(v["version"], "2");
    assert_eq!(v["timeout"], 30);
    assert_eq!(v["api"]["prefix"], "/v1");
}

#[test]
fn resolve_without_selector_prints_common() {
    let project = TestProject::petstore().expect("fixture");
    let output = slipway_in(&project)
        .arg("resolve")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let v: serde_json::Value = serde_json::from_slice(&output).expect("resolve should print JSON");
    assert_eq!(v["vendor"], "acme");
    assert!(v.get("version").is_none());
}

#[test]
fn resolve_non_object_selector_exits_one() {
    let project = TestProject::petstore().expect("fixture");
    slipway_in(&project)
        .args(["resolve", "broken"])
        .assert()
        .failure()
        .code(1)
        .stderr(contains("E2003"));
}

#[test]
fn resolve_selector_without_config_exits_one() {
    let home = TempDir::new().expect("temp dir");
    slipway()
        .arg("--home")
        .arg(home.path())
        .args(["resolve", "dev"])
        .assert()
        .failure()
        .code(1)
        .stderr(contains("E2001"));
}

#[test]
fn unknown_log_format_exits_one() {
    let project = TestProject::petstore().expect("fixture");
    slipway_in(&project)
        .args(["--log-format", "xml", "resolve"])
        .assert()
        .failure()
        .code(1)
        .stderr(contains("unknown log format"));
}
