use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

fn write_config(dir: &TempDir, body: &str) -> std::path::PathBuf {
    let path = dir.path().join("audit-relay.toml");
    fs::write(&path, body).unwrap();
    path
}

#[test]
fn forwards_matching_events_to_the_log_file() {
    let dir = TempDir::new().unwrap();
    let log_path = dir.path().join("out").join("audit.log");
    let config = write_config(
        &dir,
        &format!(
            r#"
log_level = "debug"

[destinations.file]
enabled = true
path = "{}"

[destinations.file.alert_rules]
operator = "OR"
rules = [{{ type = "level", levels = ["error", "critical"] }}]
"#,
            log_path.display()
        ),
    );

    let input = dir.path().join("events.ndjson");
    fs::write(
        &input,
        concat!(
            r#"{"id":1,"date":"2024-01-01 00:00:00","logger":"SimpleUserLogger","level":"error","initiator":"wp_user","message":"Failed login for {login}","context":{"login":"admin","_message_key":"user_login_failed"}}"#,
            "\n",
            "this is not json\n",
            r#"{"id":2,"date":"2024-01-01 00:00:01","logger":"SimplePostLogger","level":"info","initiator":"wp_user","message":"Updated post","context":{}}"#,
            "\n",
        ),
    )
    .unwrap();

    Command::cargo_bin("audit-relay")
        .unwrap()
        .arg("--config")
        .arg(&config)
        .arg("--hostname")
        .arg("example.org")
        .arg("--input")
        .arg(&input)
        .assert()
        .success()
        .stderr(predicate::str::contains("Skipping malformed event"));

    let content = fs::read_to_string(&log_path).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines.len(), 1);
    assert!(lines[0].starts_with("<11>1 2024-01-01T00:00:00Z example.org audit-relay - user_login_failed ["));
    assert!(lines[0].ends_with("] Failed login for admin"));
}

#[test]
fn reads_events_from_stdin_in_gelf() {
    let dir = TempDir::new().unwrap();
    let log_path = dir.path().join("audit.jsonl");
    let config = write_config(
        &dir,
        &format!(
            "[destinations.file]\nenabled = true\npath = \"{}\"\nformat = \"gelf\"\n",
            log_path.display()
        ),
    );

    Command::cargo_bin("audit-relay")
        .unwrap()
        .arg("--config")
        .arg(&config)
        .arg("--hostname")
        .arg("example.org")
        .write_stdin(r#"{"logger":"L","level":"warning","message":"Hello","context":{"_user_id":3}}"#)
        .assert()
        .success();

    let content = fs::read_to_string(&log_path).unwrap();
    let gelf: serde_json::Value = serde_json::from_str(content.trim_end()).unwrap();
    assert_eq!(gelf["host"], "example.org");
    assert_eq!(gelf["short_message"], "Hello");
    assert_eq!(gelf["level"], 4);
    assert_eq!(gelf["_user_id"], 3);
}

#[test]
fn invalid_destination_settings_fail_startup() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir, "[destinations.file]\nenabled = true\n");

    Command::cargo_bin("audit-relay")
        .unwrap()
        .arg("--config")
        .arg(&config)
        .write_stdin("")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Log file path is required."));
}
