use assert_cmd::prelude::*;
use predicates::prelude::*;
use rstest::rstest;
use std::fs;
use std::path::PathBuf;
use std::process::Command;
use tempfile::tempdir;

fn write_valid_config(dir: &tempfile::TempDir) -> PathBuf {
    let toml = r#"
[printer]
address = "192.168.1.50"
mainboard_id = "mb-test"

[pins]
# pins are unused by the simulated backend
runout = 12
motion = 13

[pause]
start_print_timeout_ms = 1000

[protocol]
tick_ms = 20
"#;
    let path = dir.path().join("cfg.toml");
    fs::write(&path, toml).unwrap();
    path
}

fn write_script(dir: &tempfile::TempDir, text: &str) -> PathBuf {
    let path = dir.path().join("script.jsonl");
    fs::write(&path, text).unwrap();
    path
}

#[rstest]
#[case(&["--help"], 0, "Usage:", "stdout")]
#[case(&["self-check"], 0, "Self-check OK", "stdout")]
#[case(&["replay"], 2, "--script", "stderr")]
#[case(&["replay", "--script", "/definitely/not/here.jsonl"], 3, "could not be read", "stderr")]
fn cli_table_cases(
    #[case] args: &[&str],
    #[case] exit_code: i32,
    #[case] needle: &str,
    #[case] stream: &str,
) {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);

    let mut cmd = Command::cargo_bin("flowguard").unwrap();
    cmd.arg("--config").arg(&cfg);
    for a in args {
        cmd.arg(a);
    }

    let assert = cmd.assert().code(exit_code);
    match stream {
        "stdout" => {
            assert.stdout(predicate::str::contains(needle));
        }
        "stderr" => {
            assert.stderr(predicate::str::contains(needle));
        }
        other => panic!("unknown stream: {other}"),
    }
}

#[rstest]
#[case("[pins]\nrunout = 5\nmotion = 5\n", "must differ")]
#[case("[tracking]\nmm_per_pulse = 0.0\n", "mm_per_pulse")]
#[case("[protocol]\ntick_ms = 0\n", "tick_ms")]
#[case("[logging]\nrotation = \"weekly\"\n", "rotation")]
#[case("this is = = not toml", "parse config")]
fn invalid_config_exits_with_two(#[case] toml: &str, #[case] needle: &str) {
    let dir = tempdir().unwrap();
    let path = dir.path().join("bad.toml");
    fs::write(&path, toml).unwrap();

    Command::cargo_bin("flowguard")
        .unwrap()
        .arg("--config")
        .arg(&path)
        .arg("self-check")
        .assert()
        .code(2)
        .stderr(predicate::str::contains(needle));
}

#[test]
fn missing_config_file_is_a_config_error() {
    let dir = tempdir().unwrap();
    Command::cargo_bin("flowguard")
        .unwrap()
        .arg("--config")
        .arg(dir.path().join("nope.toml"))
        .arg("self-check")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Invalid configuration"));
}

#[test]
fn self_check_runs_on_builtin_defaults() {
    Command::cargo_bin("flowguard")
        .unwrap()
        .arg("self-check")
        .assert()
        .success()
        .stdout(predicate::str::contains("classifier"));
}

#[test]
fn replay_prints_outbound_frames_and_report() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);
    let script = write_script(
        &dir,
        r#"{"at_ms": 0, "event": "connected"}
{"at_ms": 40, "event": "runout", "high": false}
{"at_ms": 100, "event": "disconnected"}
"#,
    );

    Command::cargo_bin("flowguard")
        .unwrap()
        .args(["--log-level", "error", "--config"])
        .arg(&cfg)
        .arg("replay")
        .arg("--script")
        .arg(&script)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"MainboardID\":\"mb-test\""))
        .stdout(predicate::str::contains("Replay complete: 6 ticks"))
        .stdout(predicate::str::contains("phase idle"));
}

#[rstest]
#[case("{\"at_ms\": 10, \"event\": \"connected\"}\n{\"at_ms\": 5, \"event\": \"disconnected\"}\n", "line 2")]
#[case("{\"at_ms\": 0, \"event\": \"connected\"}\nnot json\n", "line 2")]
#[case("{\"event\": \"connected\"}\n", "line 1")]
fn bad_scripts_exit_with_three(#[case] text: &str, #[case] needle: &str) {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);
    let script = write_script(&dir, text);

    Command::cargo_bin("flowguard")
        .unwrap()
        .arg("--config")
        .arg(&cfg)
        .arg("replay")
        .arg("--script")
        .arg(&script)
        .assert()
        .code(3)
        .stderr(predicate::str::contains(needle));
}
