use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Coarse classification of [`LxdError`] values.
pub enum LxdErrorKind {
    Config,
    Connection,
    Authentication,
    Execution,
    Timeout,
    Protocol,
    PromptUnavailable,
}

impl LxdErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            LxdErrorKind::Config => "config",
            LxdErrorKind::Connection => "connection",
            LxdErrorKind::Authentication => "authentication",
            LxdErrorKind::Execution => "execution",
            LxdErrorKind::Timeout => "timeout",
            LxdErrorKind::Protocol => "protocol",
            LxdErrorKind::PromptUnavailable => "prompt_unavailable",
        }
    }
}

#[derive(Debug, Error)]
/// Errors raised by LXD sessions.
pub enum LxdError {
    #[error("invalid session config: {0}")]
    Config(String),
    #[error("connection failed: {0}")]
    Connection(String),
    #[error("LXD API request failed: {method} {path}: {source}")]
    Transport {
        method: String,
        path: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("LXD API request failed: {method} {path} -> status {status}{}", format_detail(.detail))]
    HttpStatus {
        method: String,
        path: String,
        status: u16,
        detail: Option<String>,
    },
    #[error("authentication failed: {0}")]
    Authentication(String),
    #[error("command execution failed: {0}")]
    Execution(String),
    #[error("operation {operation_id} did not complete within {timeout_ms}ms")]
    Timeout { operation_id: String, timeout_ms: u64 },
    #[error("unexpected response from {method} {path}: {detail}")]
    Protocol {
        method: String,
        path: String,
        detail: String,
    },
    #[error("shell prompt is not available")]
    PromptUnavailable,
}

fn format_detail(detail: &Option<String>) -> String {
    match detail {
        Some(detail) => format!(" - {detail}"),
        None => String::new(),
    }
}

impl LxdError {
    pub fn kind(&self) -> LxdErrorKind {
        match self {
            LxdError::Config(_) => LxdErrorKind::Config,
            LxdError::Connection(_) | LxdError::Transport { .. } | LxdError::HttpStatus { .. } => {
                LxdErrorKind::Connection
            }
            LxdError::Authentication(_) => LxdErrorKind::Authentication,
            LxdError::Execution(_) => LxdErrorKind::Execution,
            LxdError::Timeout { .. } => LxdErrorKind::Timeout,
            LxdError::Protocol { .. } => LxdErrorKind::Protocol,
            LxdError::PromptUnavailable => LxdErrorKind::PromptUnavailable,
        }
    }

    /// HTTP status carried by the error, when the control plane answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            LxdError::HttpStatus { status, .. } => Some(*status),
            LxdError::Transport { source, .. } => source.status().map(|status| status.as_u16()),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }

    pub fn is_timeout(&self) -> bool {
        self.kind() == LxdErrorKind::Timeout
    }
}
