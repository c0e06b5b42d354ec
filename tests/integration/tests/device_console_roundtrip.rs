use std::time::Duration;

use httpmock::prelude::*;
use lxsh_client::{Console, LxdSession, PromptPattern, SessionConfig};
use lxsh_core::TranscriptLimits;
use serde_json::{json, Value};

/// Minimal device driver written only against the console contract.
fn read_firmware_version(console: &mut dyn Console) -> Result<String, String> {
    console.login().map_err(|error| error.to_string())?;
    let prompt = [PromptPattern::literal("/ #"), PromptPattern::literal("# ")];
    console.await_pattern(&prompt, Duration::from_secs(2));
    console.send("cat /version.txt");
    console.await_pattern(&prompt, Duration::from_secs(2));
    let version = console.last_output();
    if version.starts_with("ERROR:") {
        return Err(version);
    }
    Ok(version.trim().to_string())
}

fn mock_command(server: &MockServer, command: &str, operation_id: &str, stdout: &str) {
    let command = command.to_string();
    let exec_id = operation_id.to_string();
    server.mock(move |when, then| {
        when.method(POST)
            .path("/1.0/instances/gw-01/exec")
            .json_body_includes(json!({"command": ["sh", "-c", command]}).to_string());
        then.status(202)
            .json_body(json!({"type": "async", "metadata": {"id": exec_id}}));
    });

    let operation_path = format!("/1.0/operations/{operation_id}");
    let stdout_path = format!("/1.0/instances/gw-01/logs/exec_{operation_id}.stdout");
    let recorded = stdout_path.clone();
    server.mock(move |when, then| {
        when.method(GET).path(operation_path);
        then.status(200).json_body(json!({
            "type": "sync",
            "metadata": {
                "status": "Success",
                "err": "",
                "metadata": {"output": {"1": recorded}, "return": 0}
            }
        }));
    });

    let body = stdout.to_string();
    server.mock(move |when, then| {
        when.method(GET).path(stdout_path);
        then.status(200).body(body);
    });
}

fn gateway_session(server: &MockServer, transcript: std::path::PathBuf) -> LxdSession {
    let mut config = SessionConfig::new("gateway.console", "gw-01");
    config.endpoint = server.base_url();
    config.shell = "sh".to_string();
    config.timeout_ms = 5_000;
    config.shell_prompt = vec![r"/ #".to_string()];
    config.console_log = Some(transcript);
    config.transcript_limits = TranscriptLimits {
        max_bytes: 256,
        keep_rotated: 2,
    };
    LxdSession::new(config).expect("session should be created")
}

#[test]
fn integration_device_driver_reads_version_through_console_contract() {
    let temp = tempfile::tempdir().expect("tempdir");
    let transcript = temp.path().join("logs").join("gateway.ndjson");
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/1.0/instances/gw-01");
        then.status(200)
            .json_body(json!({"type": "sync", "metadata": {"name": "gw-01", "status": "Running"}}));
    });
    mock_command(
        &server,
        "echo 'LXD connection established'",
        "login",
        "LXD connection established\n",
    );
    mock_command(&server, "echo $PS1 || echo '# '", "prompt", "\n");
    mock_command(&server, "cat /version.txt", "version", "RDKB-2024q3\n");

    let mut session = gateway_session(&server, transcript.clone());
    let version = read_firmware_version(&mut session).expect("driver should succeed");
    assert_eq!(version, "RDKB-2024q3");
    assert_eq!(session.after(), Some("# "));

    Console::close(&mut session);
    assert!(session.is_closed());

    let records = std::fs::read_to_string(&transcript)
        .expect("transcript")
        .lines()
        .map(|line| serde_json::from_str::<Value>(line).expect("record"))
        .collect::<Vec<_>>();
    let commands = records
        .iter()
        .map(|record| record["command"].as_str().unwrap_or_default().to_string())
        .collect::<Vec<_>>();
    assert_eq!(commands, vec!["cat /version.txt".to_string()]);
    assert!(records.iter().all(|record| record["container"] == "gw-01"));
}

#[test]
fn integration_transcript_rolls_over_once_it_outgrows_its_limits() {
    let temp = tempfile::tempdir().expect("tempdir");
    let transcript = temp.path().join("gateway.ndjson");
    let server = MockServer::start();
    mock_command(&server, "dmesg | tail -n 1", "dmesg", &"x".repeat(180));

    let mut session = gateway_session(&server, transcript.clone());
    for _ in 0..3 {
        let result = session.send("dmesg | tail -n 1");
        assert!(!result.is_error(), "unexpected error: {}", result.text());
    }

    let rotated = temp.path().join("gateway.ndjson.1");
    assert!(transcript.exists());
    assert!(rotated.exists());
    let current = std::fs::read_to_string(&transcript).expect("current transcript");
    assert_eq!(current.lines().count(), 1);
}
