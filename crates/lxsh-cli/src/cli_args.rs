use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use lxsh_client::SessionConfig;

const DEFAULT_SESSION_NAME: &str = "lxsh";

fn parse_positive_u64(value: &str) -> Result<u64, String> {
    let parsed = value
        .parse::<u64>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

#[derive(Debug, Parser)]
#[command(
    name = "lxsh",
    about = "Console sessions over LXD exec operations",
    version
)]
pub(crate) struct Cli {
    #[arg(
        long,
        env = "LXSH_CONFIG",
        help = "JSON session config file; flags and LXSH_* variables override its fields"
    )]
    pub config: Option<PathBuf>,

    #[arg(long, env = "LXSH_SESSION_NAME", help = "Session name used in log records")]
    pub name: Option<String>,

    #[arg(long, env = "LXSH_CONTAINER", help = "Target LXD instance name")]
    pub container: Option<String>,

    #[arg(long, env = "LXSH_ENDPOINT", help = "LXD API base URL")]
    pub endpoint: Option<String>,

    #[arg(long = "api-version", env = "LXSH_API_VERSION")]
    pub api_version: Option<String>,

    #[arg(long, env = "LXSH_SHELL", help = "Shell used to wrap commands as <shell> -c")]
    pub shell: Option<String>,

    #[arg(
        long = "timeout-ms",
        env = "LXSH_TIMEOUT_MS",
        value_parser = parse_positive_u64,
        help = "Default command timeout in milliseconds"
    )]
    pub timeout_ms: Option<u64>,

    #[arg(
        long = "start-timeout-ms",
        env = "LXSH_START_TIMEOUT_MS",
        value_parser = parse_positive_u64
    )]
    pub start_timeout_ms: Option<u64>,

    #[arg(
        long = "prompt",
        env = "LXSH_PROMPT",
        value_delimiter = ',',
        help = "Shell prompt regex; repeat or comma-separate for several"
    )]
    pub prompt: Vec<String>,

    #[arg(long = "trust-password", env = "LXSH_TRUST_PASSWORD", hide_env_values = true)]
    pub trust_password: Option<String>,

    #[arg(long = "cert-file", env = "LXSH_CERT_FILE")]
    pub cert_file: Option<PathBuf>,

    #[arg(long = "key-file", env = "LXSH_KEY_FILE")]
    pub key_file: Option<PathBuf>,

    #[arg(
        long = "verify-tls",
        env = "LXSH_VERIFY_TLS",
        action = ArgAction::Set,
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true",
        help = "Verify the server certificate instead of accepting self-signed ones"
    )]
    pub verify_tls: Option<bool>,

    #[arg(
        long = "console-log",
        env = "LXSH_CONSOLE_LOG",
        help = "Append an NDJSON record per command to this file"
    )]
    pub console_log: Option<PathBuf>,

    #[arg(
        long = "transcript-max-bytes",
        env = "LXSH_TRANSCRIPT_MAX_BYTES",
        help = "Roll the console transcript over once it would exceed this size (0 disables)"
    )]
    pub transcript_max_bytes: Option<u64>,

    #[arg(
        long = "transcript-keep",
        env = "LXSH_TRANSCRIPT_KEEP_ROTATED",
        help = "Rolled-over transcript files to keep (0 keeps none)"
    )]
    pub transcript_keep: Option<usize>,

    #[arg(
        short = 'v',
        long = "verbose",
        action = ArgAction::Count,
        global = true,
        help = "Raise log verbosity (-v info, -vv debug, -vvv trace); LXSH_LOG overrides"
    )]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub(crate) enum CliCommand {
    /// Run one command and print its trimmed output.
    Run {
        #[arg(required = true, num_args = 1.., trailing_var_arg = true)]
        command: Vec<String>,
    },
    /// Log in, then send each stdin line as a command.
    Shell {
        #[arg(long = "no-login", help = "Skip login (instance start and exec check)")]
        no_login: bool,
    },
    /// Print instance name and status.
    Info,
    Start,
    Stop,
    Restart,
}

impl Cli {
    /// Builds the session config: file first, then CLI/environment overrides.
    pub(crate) fn session_config(&self) -> Result<SessionConfig> {
        let mut config = match &self.config {
            Some(path) => SessionConfig::load(path)
                .with_context(|| format!("failed to load {}", path.display()))?,
            None => {
                let Some(container) = self.container.as_deref() else {
                    bail!("--container (or LXSH_CONTAINER) is required without --config");
                };
                SessionConfig::new(DEFAULT_SESSION_NAME, container)
            }
        };

        if let Some(name) = &self.name {
            config.name = name.clone();
        }
        if let Some(container) = &self.container {
            config.container_name = container.clone();
        }
        if let Some(endpoint) = &self.endpoint {
            config.endpoint = endpoint.clone();
        }
        if let Some(api_version) = &self.api_version {
            config.api_version = api_version.clone();
        }
        if let Some(shell) = &self.shell {
            config.shell = shell.clone();
        }
        if let Some(timeout_ms) = self.timeout_ms {
            config.timeout_ms = timeout_ms;
        }
        if let Some(start_timeout_ms) = self.start_timeout_ms {
            config.start_timeout_ms = start_timeout_ms;
        }
        if !self.prompt.is_empty() {
            config.shell_prompt = self.prompt.clone();
        }
        if self.trust_password.is_some() {
            config.trust_password = self.trust_password.clone();
        }
        if self.cert_file.is_some() || self.key_file.is_some() {
            config.cert_file = self.cert_file.clone();
            config.key_file = self.key_file.clone();
        }
        if let Some(verify_tls) = self.verify_tls {
            config.verify_tls = verify_tls;
        }
        if self.console_log.is_some() {
            config.console_log = self.console_log.clone();
        }
        if let Some(max_bytes) = self.transcript_max_bytes {
            config.transcript_limits.max_bytes = max_bytes;
        }
        if let Some(keep_rotated) = self.transcript_keep {
            config.transcript_limits.keep_rotated = keep_rotated;
        }

        config.validate()?;
        Ok(config)
    }
}
