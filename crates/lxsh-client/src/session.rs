//! Blocking terminal-style session over LXD exec operations.
//!
//! `LxdSession` gives device drivers the send/expect/read contract of an
//! interactive console while every command actually runs as a separate
//! asynchronous exec operation: submit, poll until terminal, then fetch the
//! recorded stdout/stderr. Only the latest `send` result is retained, which is
//! all the prompt-matching shim needs to answer `before()`/`last_output()`.

use std::time::Duration;

use serde::Serialize;
use serde_json::Value;

use lxsh_core::{current_unix_timestamp_ms, ConsoleTranscript};

use crate::auth::{AuthOutcome, Authenticator};
use crate::config::SessionConfig;
use crate::lifecycle::{self, InstanceAction, InstanceInfo};
use crate::operation::{await_completion, submit, CommandPhase, Operation};
use crate::output::collect;
use crate::prompt::{
    compile_prompt_patterns, match_prompt, CommandProbe, EchoPromptProvider, PromptPattern,
    PromptProvider,
};
use crate::transport::ApiClient;
use crate::LxdError;

pub const SEND_TIMEOUT: Duration = Duration::from_secs(30);
pub const LOGIN_VERIFY_COMMAND: &str = "echo 'LXD connection established'";
const CONNECTION_FAILED_PREFIX: &str = "Connection failed to LXD container";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
/// Outcome of one command issued through a session.
pub struct CommandResult {
    pub command: String,
    /// Stdout, followed by a `STDERR:` segment when stderr was not blank.
    pub output: String,
    pub exit_code: Option<i64>,
    /// Set when the command could not be executed at all.
    pub error: Option<String>,
}

impl CommandResult {
    pub fn empty(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            output: String::new(),
            exit_code: None,
            error: None,
        }
    }

    pub fn failed(command: impl Into<String>, error: &LxdError) -> Self {
        Self {
            command: command.into(),
            output: String::new(),
            exit_code: None,
            error: Some(error.to_string()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Text a terminal client would have seen: the output, or `ERROR: ...`.
    pub fn text(&self) -> String {
        match &self.error {
            Some(error) => format!("ERROR: {error}"),
            None => self.output.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
struct TranscriptRecord<'a> {
    unix_ms: u64,
    session: &'a str,
    container: &'a str,
    #[serde(flatten)]
    result: &'a CommandResult,
}

/// Submits, polls and collects exec operations. Owns the HTTP client.
struct Executor {
    api: Option<ApiClient>,
    session_name: String,
    instance: String,
    shell: String,
    default_timeout: Duration,
}

impl Executor {
    fn api(&self) -> Result<&ApiClient, LxdError> {
        self.api
            .as_ref()
            .ok_or_else(|| LxdError::Connection("session is closed".to_string()))
    }

    fn effective_timeout(&self, timeout: Option<Duration>) -> Duration {
        timeout
            .filter(|timeout| !timeout.is_zero())
            .unwrap_or(self.default_timeout)
    }

    fn trace_phase(&self, phase: CommandPhase, operation_id: &str) {
        tracing::debug!(
            session = %self.session_name,
            phase = phase.as_str(),
            operation_id = operation_id,
            "lxd command phase"
        );
    }

    fn run_operation(
        &self,
        command: &str,
        timeout: Duration,
    ) -> Result<(Operation, String), LxdError> {
        let api = self.api()?;
        let outcome = submit(api, &self.instance, &self.shell, command).and_then(|operation_id| {
            self.trace_phase(CommandPhase::Submitted, &operation_id);
            self.trace_phase(CommandPhase::Polling, &operation_id);
            await_completion(api, &operation_id, timeout)
        });
        match outcome {
            Ok(operation) => {
                self.trace_phase(CommandPhase::Completed, &operation.id);
                let output = collect(api, &operation);
                self.trace_phase(CommandPhase::Idle, &operation.id);
                Ok((operation, output))
            }
            Err(error) => {
                self.trace_phase(CommandPhase::after_error(&error), "");
                self.trace_phase(CommandPhase::Idle, "");
                Err(error)
            }
        }
    }
}

impl CommandProbe for Executor {
    fn probe_output(&mut self, command: &str, timeout: Duration) -> Result<String, LxdError> {
        self.run_operation(command, timeout)
            .map(|(_, output)| output)
    }
}

/// Console session bound to one LXD instance.
pub struct LxdSession {
    config: SessionConfig,
    prompt_patterns: Vec<PromptPattern>,
    executor: Executor,
    auth: Authenticator,
    prompt_provider: Box<dyn PromptProvider>,
    synthetic_prompt: Option<String>,
    last: Option<CommandResult>,
    transcript: Option<ConsoleTranscript>,
}

impl LxdSession {
    pub fn new(config: SessionConfig) -> Result<Self, LxdError> {
        config.validate()?;
        let material = config.auth_material()?;
        let prompt_patterns = compile_prompt_patterns(&config.shell_prompt)?;
        let api = ApiClient::new(&config, &material)?;
        let executor = Executor {
            api: Some(api),
            session_name: config.name.clone(),
            instance: config.container_name.clone(),
            shell: config.shell.clone(),
            default_timeout: Duration::from_millis(config.timeout_ms),
        };
        tracing::debug!(
            session = %config.name,
            container = %config.container_name,
            endpoint = config.base_url(),
            auth_mode = material.as_str(),
            "lxd session created"
        );

        let transcript = config
            .console_log
            .as_ref()
            .filter(|path| !path.as_os_str().is_empty())
            .map(|path| ConsoleTranscript::new(path, config.transcript_limits));

        Ok(Self {
            config,
            prompt_patterns,
            executor,
            auth: Authenticator::new(material),
            prompt_provider: Box::new(EchoPromptProvider::default()),
            synthetic_prompt: None,
            last: None,
            transcript,
        })
    }

    pub fn with_prompt_provider(mut self, provider: impl PromptProvider + 'static) -> Self {
        self.prompt_provider = Box::new(provider);
        self.synthetic_prompt = None;
        self
    }

    pub fn transcript(&self) -> Option<&ConsoleTranscript> {
        self.transcript.as_ref()
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn prompt_patterns(&self) -> &[PromptPattern] {
        &self.prompt_patterns
    }

    pub fn is_authenticated(&self) -> bool {
        self.auth.outcome().is_some()
    }

    pub fn auth_outcome(&self) -> Option<AuthOutcome> {
        self.auth.outcome()
    }

    pub fn is_closed(&self) -> bool {
        self.executor.api.is_none()
    }

    pub fn ensure_authenticated(&mut self) -> Result<AuthOutcome, LxdError> {
        let api = self.executor.api()?;
        self.auth.ensure_authenticated(api)
    }

    /// Authenticates, makes sure the instance runs and verifies exec works.
    pub fn login(&mut self) -> Result<(), LxdError> {
        if self.prompt_patterns.is_empty() {
            return Err(LxdError::PromptUnavailable);
        }
        if self.auth.material().is_configured() {
            self.ensure_authenticated()?;
        }

        let start_timeout = Duration::from_millis(self.config.start_timeout_ms);
        lifecycle::ensure_running(
            self.executor.api()?,
            &self.config.container_name,
            start_timeout,
        )?;

        self.execute_unrecorded(LOGIN_VERIFY_COMMAND, None)
            .map_err(|error| LxdError::Connection(format!("{CONNECTION_FAILED_PREFIX}: {error}")))?;
        tracing::info!(
            session = %self.config.name,
            container = %self.config.container_name,
            "lxd session established"
        );
        Ok(())
    }

    /// Runs one command line the way a terminal would see it. Never fails:
    /// execution errors come back as a result whose text starts with `ERROR:`.
    pub fn send(&mut self, command: &str) -> CommandResult {
        let result = if command.trim().is_empty() {
            CommandResult::empty(command.trim())
        } else {
            match self.execute(command, Some(SEND_TIMEOUT)) {
                Ok(result) => result,
                Err(error) => {
                    let result = CommandResult::failed(command.trim(), &error);
                    self.record(&result);
                    result
                }
            }
        };
        self.last = Some(result.clone());
        result
    }

    /// Index of the first pattern matching the synthetic prompt, or 0.
    pub fn await_pattern(&mut self, patterns: &[PromptPattern], timeout: Duration) -> usize {
        let prompt = self.synthetic_prompt(timeout);
        match_prompt(patterns, &prompt).index()
    }

    /// [`Self::await_pattern`] against the configured shell prompt patterns.
    pub fn await_prompt(&mut self, timeout: Duration) -> usize {
        let prompt = self.synthetic_prompt(timeout);
        match_prompt(&self.prompt_patterns, &prompt).index()
    }

    pub fn expect_exact(&mut self, _pattern: &str, _timeout: Duration) -> usize {
        0
    }

    fn synthetic_prompt(&mut self, timeout: Duration) -> String {
        if let Some(prompt) = &self.synthetic_prompt {
            return prompt.clone();
        }
        let timeout = self.executor.effective_timeout(Some(timeout));
        let prompt = self
            .prompt_provider
            .discover_prompt(&mut self.executor, timeout);
        tracing::debug!(session = %self.config.name, prompt = %prompt, "synthetic prompt discovered");
        self.synthetic_prompt = Some(prompt.clone());
        prompt
    }

    pub fn last_result(&self) -> Option<&CommandResult> {
        self.last.as_ref()
    }

    pub fn last_output(&self) -> String {
        self.last
            .as_ref()
            .map(CommandResult::text)
            .unwrap_or_default()
    }

    /// Output preceding the last prompt match.
    pub fn before(&self) -> String {
        self.last_output()
    }

    /// The synthetic prompt, once discovered.
    pub fn after(&self) -> Option<&str> {
        self.synthetic_prompt.as_deref()
    }

    /// Runs a command and returns its output together with the exit code.
    ///
    /// `timeout` of `None` or zero uses the session default.
    pub fn execute(
        &mut self,
        command: &str,
        timeout: Option<Duration>,
    ) -> Result<CommandResult, LxdError> {
        let result = self.execute_unrecorded(command, timeout)?;
        self.record(&result);
        Ok(result)
    }

    fn execute_unrecorded(
        &self,
        command: &str,
        timeout: Option<Duration>,
    ) -> Result<CommandResult, LxdError> {
        let timeout = self.executor.effective_timeout(timeout);
        let (operation, collected) = self.executor.run_operation(command, timeout)?;
        let output = if !collected.is_empty() {
            collected
        } else if let Some(inline) = operation.inline_output() {
            inline.to_string()
        } else if operation.metadata.is_object() || operation.metadata.is_null() {
            String::new()
        } else {
            return Err(LxdError::Protocol {
                method: "GET".to_string(),
                path: self
                    .executor
                    .api()?
                    .api_path(&format!("operations/{}", operation.id)),
                detail: format!("unexpected result structure: {}", operation.metadata),
            });
        };

        Ok(CommandResult {
            command: command.trim().to_string(),
            output,
            exit_code: operation.exit_code(),
            error: None,
        })
    }

    /// Runs a command and returns its trimmed output.
    ///
    /// Output wins over the exit code. Only an empty output paired with a
    /// non-zero exit code is reported as an execution error.
    pub fn run(&mut self, command: &str, timeout: Option<Duration>) -> Result<String, LxdError> {
        let result = self.execute(command, timeout)?;
        let trimmed = result.output.trim();
        if !trimmed.is_empty() {
            return Ok(trimmed.to_string());
        }
        match result.exit_code {
            Some(code) if code != 0 => Err(LxdError::Execution(format!(
                "command failed with exit code {code}"
            ))),
            _ => Ok(String::new()),
        }
    }

    pub fn instance_info(&self) -> Result<InstanceInfo, LxdError> {
        lifecycle::instance_info(self.executor.api()?, &self.config.container_name)
    }

    pub fn start(&self) -> Result<Value, LxdError> {
        self.change_state(InstanceAction::Start)
    }

    pub fn stop(&self) -> Result<Value, LxdError> {
        self.change_state(InstanceAction::Stop)
    }

    pub fn restart(&self) -> Result<Value, LxdError> {
        self.change_state(InstanceAction::Restart)
    }

    fn change_state(&self, action: InstanceAction) -> Result<Value, LxdError> {
        lifecycle::change_state(self.executor.api()?, &self.config.container_name, action)
    }

    /// Releases the HTTP client. Later calls are no-ops.
    pub fn close(&mut self) {
        if self.executor.api.take().is_some() {
            tracing::debug!(session = %self.config.name, "lxd session closed");
        }
    }

    fn record(&self, result: &CommandResult) {
        let Some(transcript) = &self.transcript else {
            return;
        };
        let record = TranscriptRecord {
            unix_ms: current_unix_timestamp_ms(),
            session: &self.config.name,
            container: &self.config.container_name,
            result,
        };
        if let Err(error) = transcript.append(&record) {
            tracing::warn!(
                session = %self.config.name,
                path = %transcript.path().display(),
                error = %error,
                "failed to append console transcript"
            );
        }
    }
}
