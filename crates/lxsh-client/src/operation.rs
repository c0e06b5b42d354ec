//! Asynchronous exec operations: submission and completion polling.
//!
//! An exec request is accepted by the control plane as a background
//! operation. Submission only yields the operation id; the caller then polls
//! `/operations/<id>` until the status turns terminal. Polling is a plain
//! sleep-and-recheck loop, so the calling thread blocks for the duration.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use reqwest::Method;
use serde::Serialize;
use serde_json::Value;

use crate::transport::ApiClient;
use crate::LxdError;

pub const OPERATION_POLL_INTERVAL: Duration = Duration::from_millis(100);
pub const EXEC_PATH_ENV: &str = "/usr/local/sbin:/usr/local/bin:/usr/sbin:/usr/bin:/sbin:/bin";
pub const EXEC_TERM_ENV: &str = "dumb";

#[derive(Debug, Clone, PartialEq, Eq)]
/// Enumerates control-plane operation states.
pub enum OperationStatus {
    Pending,
    Running,
    Cancelling,
    Success,
    Failure,
    Cancelled,
    Other(String),
}

impl OperationStatus {
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "Pending" => Self::Pending,
            "Running" => Self::Running,
            "Cancelling" => Self::Cancelling,
            "Success" => Self::Success,
            "Failure" => Self::Failure,
            "Cancelled" => Self::Cancelled,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Pending => "Pending",
            Self::Running => "Running",
            Self::Cancelling => "Cancelling",
            Self::Success => "Success",
            Self::Failure => "Failure",
            Self::Cancelled => "Cancelled",
            Self::Other(raw) => raw.as_str(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failure | Self::Cancelled)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Per-command progress of a session. Every command ends back in `Idle`.
pub enum CommandPhase {
    Idle,
    Submitted,
    Polling,
    Completed,
    Failed,
    TimedOut,
}

impl CommandPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Submitted => "submitted",
            Self::Polling => "polling",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::TimedOut => "timed_out",
        }
    }

    pub(crate) fn after_error(error: &LxdError) -> Self {
        if error.is_timeout() {
            Self::TimedOut
        } else {
            Self::Failed
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
/// Snapshot of one operation as returned by `GET /<ver>/operations/<id>`.
pub struct Operation {
    pub id: String,
    pub status: OperationStatus,
    /// Result metadata (`metadata.metadata`); `Null` when the server sent none.
    pub metadata: Value,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
/// Recorded output artifact paths keyed by file descriptor.
pub struct OutputPaths {
    pub stdout: Option<String>,
    pub stderr: Option<String>,
}

impl OutputPaths {
    pub fn is_empty(&self) -> bool {
        self.stdout.is_none() && self.stderr.is_none()
    }
}

impl Operation {
    /// Parses a status response. `operation_id` is used when the envelope omits its id.
    pub fn from_response(operation_id: &str, response: &Value) -> Result<Self, String> {
        let envelope = response
            .get("metadata")
            .and_then(Value::as_object)
            .ok_or_else(|| "operation response has no metadata object".to_string())?;
        let status = envelope
            .get("status")
            .and_then(Value::as_str)
            .map(OperationStatus::parse)
            .ok_or_else(|| "operation response has no metadata.status".to_string())?;
        let id = envelope
            .get("id")
            .and_then(Value::as_str)
            .filter(|id| !id.trim().is_empty())
            .unwrap_or(operation_id)
            .to_string();
        let error = envelope
            .get("err")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|err| !err.is_empty())
            .map(str::to_string);

        Ok(Self {
            id,
            status,
            metadata: envelope.get("metadata").cloned().unwrap_or(Value::Null),
            error,
        })
    }

    pub fn output_paths(&self) -> OutputPaths {
        let Some(output) = self.metadata.get("output").and_then(Value::as_object) else {
            return OutputPaths::default();
        };
        let path_for = |fd: &str| {
            output
                .get(fd)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|path| !path.is_empty())
                .map(str::to_string)
        };
        OutputPaths {
            stdout: path_for("1"),
            stderr: path_for("2"),
        }
    }

    /// Inline text some servers place directly in `metadata.output`.
    pub fn inline_output(&self) -> Option<&str> {
        self.metadata.get("output").and_then(Value::as_str)
    }

    pub fn exit_code(&self) -> Option<i64> {
        self.metadata.get("return").and_then(Value::as_i64)
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
/// Body of `POST /<ver>/instances/<name>/exec`.
pub struct ExecRequest {
    pub command: Vec<String>,
    pub wait_for_websocket: bool,
    pub record_output: bool,
    pub interactive: bool,
    pub environment: BTreeMap<String, String>,
}

impl ExecRequest {
    /// Non-interactive `<shell> -c <command>` with recorded output and a fixed environment.
    pub fn shell(shell: &str, command: &str) -> Self {
        let mut environment = BTreeMap::new();
        environment.insert("PATH".to_string(), EXEC_PATH_ENV.to_string());
        environment.insert("TERM".to_string(), EXEC_TERM_ENV.to_string());
        Self {
            command: vec![shell.to_string(), "-c".to_string(), command.to_string()],
            wait_for_websocket: false,
            record_output: true,
            interactive: false,
            environment,
        }
    }
}

/// Extracts the operation id from an exec response, rejecting anything but an async envelope.
pub fn operation_id_from_exec_response(response: &Value) -> Result<String, LxdError> {
    let kind = response
        .get("type")
        .and_then(Value::as_str)
        .unwrap_or_default();
    if kind != "async" {
        return Err(LxdError::Execution(format!(
            "expected async operation from LXD exec, got: {response}"
        )));
    }
    response
        .get("metadata")
        .and_then(|metadata| metadata.get("id"))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .ok_or_else(|| {
            LxdError::Execution(format!("no operation ID in LXD response: {response}"))
        })
}

pub(crate) fn submit(
    api: &ApiClient,
    instance: &str,
    shell: &str,
    command: &str,
) -> Result<String, LxdError> {
    let path = api.api_path(&format!("instances/{instance}/exec"));
    let body = serde_json::to_value(ExecRequest::shell(shell, command)).map_err(|error| {
        LxdError::Execution(format!("failed to encode exec request: {error}"))
    })?;
    let response = api.request_json(Method::POST, &path, Some(&body))?;
    operation_id_from_exec_response(&response)
}

pub(crate) fn await_completion(
    api: &ApiClient,
    operation_id: &str,
    timeout: Duration,
) -> Result<Operation, LxdError> {
    let path = api.api_path(&format!("operations/{operation_id}"));
    poll_until_terminal(operation_id, timeout, OPERATION_POLL_INTERVAL, || {
        let response = api.request_json(Method::GET, &path, None)?;
        Operation::from_response(operation_id, &response).map_err(|detail| LxdError::Protocol {
            method: Method::GET.to_string(),
            path: path.clone(),
            detail,
        })
    })
}

fn finish(operation_id: &str, operation: Operation) -> Result<Operation, LxdError> {
    match operation.status {
        OperationStatus::Success => Ok(operation),
        OperationStatus::Failure => Err(LxdError::Execution(
            operation
                .error
                .unwrap_or_else(|| "unknown error".to_string()),
        )),
        _ => Err(LxdError::Execution(format!(
            "operation {operation_id} was cancelled"
        ))),
    }
}

/// Re-fetches an operation every `interval` until it turns terminal or `timeout` elapses.
pub(crate) fn poll_until_terminal<F>(
    operation_id: &str,
    timeout: Duration,
    interval: Duration,
    mut fetch: F,
) -> Result<Operation, LxdError>
where
    F: FnMut() -> Result<Operation, LxdError>,
{
    let started = Instant::now();
    let mut polls = 0_u64;
    while started.elapsed() < timeout {
        let operation = fetch()?;
        polls += 1;
        tracing::debug!(
            operation_id = operation_id,
            status = operation.status.as_str(),
            polls = polls,
            "lxd operation polled"
        );
        if operation.status.is_terminal() {
            return finish(operation_id, operation);
        }

        let remaining = timeout.saturating_sub(started.elapsed());
        std::thread::sleep(interval.min(remaining));
    }

    Err(LxdError::Timeout {
        operation_id: operation_id.to_string(),
        timeout_ms: timeout.as_millis().try_into().unwrap_or(u64::MAX),
    })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::{json, Value};

    use super::{
        operation_id_from_exec_response, poll_until_terminal, ExecRequest, Operation,
        OperationStatus,
    };
    use crate::LxdError;

    fn operation(status: &str, err: &str) -> Operation {
        Operation::from_response(
            "op1",
            &json!({"metadata": {"id": "op1", "status": status, "err": err}}),
        )
        .expect("operation")
    }

    #[test]
    fn unit_exec_request_serializes_kebab_case_wire_fields() {
        let body = serde_json::to_value(ExecRequest::shell("bash", "echo hello")).expect("json");
        assert_eq!(body["command"], json!(["bash", "-c", "echo hello"]));
        assert_eq!(body["wait-for-websocket"], json!(false));
        assert_eq!(body["record-output"], json!(true));
        assert_eq!(body["interactive"], json!(false));
        assert_eq!(body["environment"]["TERM"], json!("dumb"));
        assert!(body["environment"]["PATH"]
            .as_str()
            .expect("path")
            .starts_with("/usr/local/sbin"));
    }

    #[test]
    fn unit_exec_response_requires_async_type_and_operation_id() {
        let ok = json!({"type": "async", "metadata": {"id": "op1"}});
        assert_eq!(operation_id_from_exec_response(&ok).expect("id"), "op1");

        let sync = json!({"type": "sync", "metadata": {"id": "op1"}});
        let error = operation_id_from_exec_response(&sync).expect_err("sync must fail");
        assert!(error.to_string().contains("expected async operation"));

        let missing = json!({"type": "async", "metadata": {}});
        let error = operation_id_from_exec_response(&missing).expect_err("missing id");
        assert!(matches!(error, LxdError::Execution(_)));
        assert!(error.to_string().contains("no operation ID"));
    }

    #[test]
    fn unit_operation_parses_output_paths_exit_code_and_error() {
        let parsed = Operation::from_response(
            "op1",
            &json!({
                "type": "sync",
                "metadata": {
                    "status": "Success",
                    "err": "",
                    "metadata": {
                        "output": {"1": "/1.0/instances/rdk/logs/exec_1.stdout", "2": " "},
                        "return": 3
                    }
                }
            }),
        )
        .expect("operation");
        assert_eq!(parsed.id, "op1");
        assert_eq!(parsed.status, OperationStatus::Success);
        assert_eq!(parsed.error, None);
        assert_eq!(parsed.exit_code(), Some(3));
        let paths = parsed.output_paths();
        assert_eq!(
            paths.stdout.as_deref(),
            Some("/1.0/instances/rdk/logs/exec_1.stdout")
        );
        assert_eq!(paths.stderr, None);
        assert_eq!(parsed.inline_output(), None);
    }

    #[test]
    fn regression_operation_without_status_is_rejected() {
        let error = Operation::from_response("op1", &json!({"metadata": {"id": "op1"}}))
            .expect_err("missing status");
        assert!(error.contains("metadata.status"));
        assert!(Operation::from_response("op1", &Value::Null).is_err());
    }

    #[test]
    fn functional_poller_reports_failure_after_running_states() {
        let mut script = vec![
            operation("Running", ""),
            operation("Running", ""),
            operation("Running", ""),
            operation("Failure", "boom"),
        ]
        .into_iter();
        let mut fetches = 0;
        let error = poll_until_terminal(
            "op1",
            Duration::from_secs(5),
            Duration::from_millis(1),
            || {
                fetches += 1;
                Ok(script.next().expect("script exhausted"))
            },
        )
        .expect_err("failure must raise");
        assert_eq!(fetches, 4);
        assert!(matches!(error, LxdError::Execution(ref message) if message.contains("boom")));
    }

    #[test]
    fn functional_poller_returns_operation_on_success() {
        let mut script = vec![operation("Pending", ""), operation("Success", "")].into_iter();
        let operation = poll_until_terminal(
            "op1",
            Duration::from_secs(5),
            Duration::from_millis(1),
            || Ok(script.next().expect("script exhausted")),
        )
        .expect("success");
        assert_eq!(operation.status, OperationStatus::Success);
    }

    #[test]
    fn regression_poller_times_out_instead_of_failing_execution() {
        let error = poll_until_terminal(
            "op1",
            Duration::from_millis(40),
            Duration::from_millis(5),
            || Ok(operation("Running", "")),
        )
        .expect_err("must time out");
        assert!(error.is_timeout(), "unexpected error: {error}");
    }

    #[test]
    fn regression_failure_without_error_text_reports_unknown_error() {
        let error = poll_until_terminal(
            "op1",
            Duration::from_secs(1),
            Duration::from_millis(1),
            || Ok(operation("Failure", "  ")),
        )
        .expect_err("failure");
        assert_eq!(error.to_string(), "command execution failed: unknown error");
    }

    #[test]
    fn regression_cancelled_operation_is_an_execution_error() {
        let error = poll_until_terminal(
            "op9",
            Duration::from_secs(1),
            Duration::from_millis(1),
            || Ok(operation("Cancelled", "")),
        )
        .expect_err("cancelled");
        assert!(matches!(error, LxdError::Execution(_)));
        assert!(error.to_string().contains("op9 was cancelled"));
    }

    #[test]
    fn regression_cancelling_and_unknown_states_keep_polling() {
        let mut script = vec![
            operation("Cancelling", ""),
            operation("Frozen", ""),
            operation("Cancelled", ""),
        ]
        .into_iter();
        let mut fetches = 0;
        let error = poll_until_terminal(
            "op3",
            Duration::from_secs(5),
            Duration::from_millis(1),
            || {
                fetches += 1;
                Ok(script.next().expect("script exhausted"))
            },
        )
        .expect_err("cancelled");
        assert_eq!(fetches, 3);
        assert!(error.to_string().contains("op3 was cancelled"));
    }

    #[test]
    fn unit_unknown_status_is_not_terminal() {
        assert!(!OperationStatus::parse("Frozen").is_terminal());
        assert_eq!(OperationStatus::parse("Frozen").as_str(), "Frozen");
        assert!(OperationStatus::parse("Success").is_terminal());
    }
}
