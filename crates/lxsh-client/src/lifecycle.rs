use std::time::{Duration, Instant};

use reqwest::Method;
use serde_json::{json, Value};

use crate::transport::ApiClient;
use crate::LxdError;

pub const STATE_CHANGE_TIMEOUT_SECS: u64 = 30;
pub const START_POLL_INTERVAL: Duration = Duration::from_secs(1);
pub const RUNNING_STATUS: &str = "Running";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Enumerates supported instance state changes.
pub enum InstanceAction {
    Start,
    Stop,
    Restart,
}

impl InstanceAction {
    pub fn as_str(self) -> &'static str {
        match self {
            InstanceAction::Start => "start",
            InstanceAction::Stop => "stop",
            InstanceAction::Restart => "restart",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
/// Instance record as returned by `GET /<ver>/instances/<name>`.
pub struct InstanceInfo {
    pub name: String,
    pub status: String,
    pub status_code: Option<i64>,
    /// Full `metadata` object for callers that need more than the status.
    pub raw: Value,
}

impl InstanceInfo {
    pub fn from_response(instance: &str, response: &Value) -> Result<Self, String> {
        let metadata = response
            .get("metadata")
            .filter(|metadata| metadata.is_object())
            .ok_or_else(|| "instance response has no metadata object".to_string())?;
        let status = metadata
            .get("status")
            .and_then(Value::as_str)
            .ok_or_else(|| "instance response has no metadata.status".to_string())?;
        let name = metadata
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or(instance);
        Ok(Self {
            name: name.to_string(),
            status: status.to_string(),
            status_code: metadata.get("status_code").and_then(Value::as_i64),
            raw: metadata.clone(),
        })
    }

    pub fn is_running(&self) -> bool {
        self.status == RUNNING_STATUS
    }
}

pub(crate) fn instance_info(api: &ApiClient, instance: &str) -> Result<InstanceInfo, LxdError> {
    let path = api.api_path(&format!("instances/{instance}"));
    let response = api
        .request_json(Method::GET, &path, None)
        .map_err(|error| {
            if error.is_not_found() {
                LxdError::Connection(format!("instance {instance} not found"))
            } else {
                error
            }
        })?;
    InstanceInfo::from_response(instance, &response).map_err(|detail| LxdError::Protocol {
        method: Method::GET.to_string(),
        path,
        detail,
    })
}

pub(crate) fn change_state(
    api: &ApiClient,
    instance: &str,
    action: InstanceAction,
) -> Result<Value, LxdError> {
    let path = api.api_path(&format!("instances/{instance}/state"));
    tracing::info!(instance = instance, action = action.as_str(), "lxd instance state change");
    api.request_json(
        Method::PUT,
        &path,
        Some(&json!({"action": action.as_str(), "timeout": STATE_CHANGE_TIMEOUT_SECS})),
    )
}

/// Starts the instance when it is not running and waits up to `start_timeout` for it.
pub(crate) fn ensure_running(
    api: &ApiClient,
    instance: &str,
    start_timeout: Duration,
) -> Result<(), LxdError> {
    let info = instance_info(api, instance)?;
    if info.is_running() {
        return Ok(());
    }
    tracing::info!(instance = instance, status = %info.status, "lxd instance not running");
    change_state(api, instance, InstanceAction::Start)?;
    wait_for_running(instance, start_timeout, START_POLL_INTERVAL, || {
        instance_info(api, instance)
    })
}

pub(crate) fn wait_for_running<F>(
    instance: &str,
    timeout: Duration,
    interval: Duration,
    mut fetch: F,
) -> Result<(), LxdError>
where
    F: FnMut() -> Result<InstanceInfo, LxdError>,
{
    let started = Instant::now();
    while started.elapsed() < timeout {
        if fetch()?.is_running() {
            return Ok(());
        }
        let remaining = timeout.saturating_sub(started.elapsed());
        std::thread::sleep(interval.min(remaining));
    }
    Err(LxdError::Connection(format!(
        "instance {instance} failed to start"
    )))
}
