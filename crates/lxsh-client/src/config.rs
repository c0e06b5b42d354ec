use std::path::{Path, PathBuf};

use lxsh_core::TranscriptLimits;
use serde::{Deserialize, Serialize};

use crate::LxdError;

pub const DEFAULT_LXD_ENDPOINT: &str = "https://127.0.0.1:8443";
pub const DEFAULT_LXD_API_VERSION: &str = "1.0";
pub const DEFAULT_EXEC_SHELL: &str = "bash";
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_START_TIMEOUT_MS: u64 = 30_000;

fn default_endpoint() -> String {
    DEFAULT_LXD_ENDPOINT.to_string()
}

fn default_api_version() -> String {
    DEFAULT_LXD_API_VERSION.to_string()
}

fn default_shell() -> String {
    DEFAULT_EXEC_SHELL.to_string()
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

fn default_start_timeout_ms() -> u64 {
    DEFAULT_START_TIMEOUT_MS
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Settings for one [`crate::LxdSession`].
pub struct SessionConfig {
    /// Connection name, used to tag log records.
    pub name: String,
    pub container_name: String,
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_api_version")]
    pub api_version: String,
    /// Prompt regexes the device layer waits for; required by `login`.
    #[serde(default)]
    pub shell_prompt: Vec<String>,
    /// Interpreter used to wrap every command as `<shell> -c <command>`.
    #[serde(default = "default_shell")]
    pub shell: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_start_timeout_ms")]
    pub start_timeout_ms: u64,
    #[serde(default)]
    pub trust_password: Option<String>,
    #[serde(default)]
    pub cert_file: Option<PathBuf>,
    #[serde(default)]
    pub key_file: Option<PathBuf>,
    /// Verify the server certificate. LXD hosts usually serve a self-signed one.
    #[serde(default)]
    pub verify_tls: bool,
    /// NDJSON console transcript, one record per command.
    #[serde(default)]
    pub console_log: Option<PathBuf>,
    #[serde(default)]
    pub transcript_limits: TranscriptLimits,
}

impl SessionConfig {
    pub fn new(name: impl Into<String>, container_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            container_name: container_name.into(),
            endpoint: default_endpoint(),
            api_version: default_api_version(),
            shell_prompt: Vec::new(),
            shell: default_shell(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            start_timeout_ms: DEFAULT_START_TIMEOUT_MS,
            trust_password: None,
            cert_file: None,
            key_file: None,
            verify_tls: false,
            console_log: None,
            transcript_limits: TranscriptLimits::default(),
        }
    }

    pub fn from_json_str(raw: &str) -> Result<Self, LxdError> {
        serde_json::from_str(raw)
            .map_err(|error| LxdError::Config(format!("failed to parse session config: {error}")))
    }

    pub fn load(path: &Path) -> Result<Self, LxdError> {
        let raw = std::fs::read_to_string(path).map_err(|error| {
            LxdError::Config(format!(
                "failed to read session config {}: {error}",
                path.display()
            ))
        })?;
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> Result<(), LxdError> {
        if self.container_name.trim().is_empty() {
            return Err(LxdError::Config("container_name cannot be empty".to_string()));
        }
        if self.endpoint.trim().is_empty() {
            return Err(LxdError::Config("endpoint cannot be empty".to_string()));
        }
        if self.shell.trim().is_empty() {
            return Err(LxdError::Config("shell cannot be empty".to_string()));
        }
        if self.timeout_ms == 0 {
            return Err(LxdError::Config(
                "timeout_ms must be greater than 0".to_string(),
            ));
        }
        self.auth_material().map(|_| ())
    }

    /// Endpoint without trailing slashes.
    pub fn base_url(&self) -> &str {
        self.endpoint.trim().trim_end_matches('/')
    }

    /// Picks the authentication strategy. A certificate pair wins over a trust password.
    pub fn auth_material(&self) -> Result<AuthMaterial, LxdError> {
        match (&self.cert_file, &self.key_file) {
            (Some(cert_file), Some(key_file)) => {
                return Ok(AuthMaterial::Certificate {
                    cert_file: cert_file.clone(),
                    key_file: key_file.clone(),
                })
            }
            (Some(_), None) => {
                return Err(LxdError::Config(
                    "cert_file is set but key_file is missing".to_string(),
                ))
            }
            (None, Some(_)) => {
                return Err(LxdError::Config(
                    "key_file is set but cert_file is missing".to_string(),
                ))
            }
            (None, None) => {}
        }

        match self.trust_password.as_deref().map(str::trim) {
            Some(password) if !password.is_empty() => {
                Ok(AuthMaterial::TrustPassword(password.to_string()))
            }
            _ => Ok(AuthMaterial::None),
        }
    }
}

#[derive(Clone, PartialEq, Eq)]
/// Credential a session presents to the control plane.
pub enum AuthMaterial {
    None,
    Certificate { cert_file: PathBuf, key_file: PathBuf },
    TrustPassword(String),
}

impl AuthMaterial {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthMaterial::None => "none",
            AuthMaterial::Certificate { .. } => "certificate",
            AuthMaterial::TrustPassword(_) => "trust_password",
        }
    }

    pub fn is_configured(&self) -> bool {
        !matches!(self, AuthMaterial::None)
    }
}

impl std::fmt::Debug for AuthMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthMaterial::None => f.write_str("None"),
            AuthMaterial::Certificate {
                cert_file,
                key_file,
            } => f
                .debug_struct("Certificate")
                .field("cert_file", cert_file)
                .field("key_file", key_file)
                .finish(),
            AuthMaterial::TrustPassword(_) => f.write_str("TrustPassword(<redacted>)"),
        }
    }
}
