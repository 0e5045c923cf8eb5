use std::process::Command;

use tempfile::tempdir;

fn welearn() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_welearn"));
    cmd.env_remove("WELEARN_LOG").env_remove("RUST_LOG");
    cmd
}

#[test]
fn help_lists_actions() {
    let output = welearn().arg("--help").output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    for action in ["files", "assignments", "submissions", "urls", "courses", "whoami"] {
        assert!(stdout.contains(action), "missing {action} in help:\n{stdout}");
    }
    assert!(stdout.contains("--pathprefix"));
}

#[test]
fn missing_prefix_exits_with_not_a_directory() {
    let dir = tempdir().unwrap();
    let output = welearn()
        .current_dir(dir.path())
        .env("WELEARN_CONFIG", dir.path().join("absent.toml"))
        .env("WELEARN_USERNAME", "student")
        .env("WELEARN_PASSWORD", "secret")
        .env("WELEARN_BASEURL", "http://127.0.0.1:9/")
        .args(["files", "MA1101", "-p"])
        .arg(dir.path().join("nowhere"))
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(20));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("does not exist"), "stderr: {stderr}");
}

#[test]
fn assignment_flags_with_other_actions_exit_with_usage_error() {
    let dir = tempdir().unwrap();
    let output = welearn()
        .current_dir(dir.path())
        .env("WELEARN_CONFIG", dir.path().join("absent.toml"))
        .args(["files", "MA1101", "--dueassignments"])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("Can only use --dueassignments"));
}

#[test]
fn unknown_action_exits_with_usage_error() {
    let dir = tempdir().unwrap();
    let output = welearn()
        .current_dir(dir.path())
        .env("WELEARN_CONFIG", dir.path().join("absent.toml"))
        .arg("download")
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("Invalid action!"));
}
