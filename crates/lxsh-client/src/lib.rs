//! Terminal-style console sessions over the LXD REST API.
//!
//! Commands run as exec operations against a container instance; a session
//! hides the submit/poll/collect cycle behind a blocking send/expect surface.

mod auth;
mod config;
mod console;
mod error;
mod lifecycle;
mod operation;
mod output;
mod prompt;
mod session;
mod transport;

pub use auth::AuthOutcome;
pub use config::{
    AuthMaterial, SessionConfig, DEFAULT_EXEC_SHELL, DEFAULT_LXD_API_VERSION,
    DEFAULT_LXD_ENDPOINT, DEFAULT_START_TIMEOUT_MS, DEFAULT_TIMEOUT_MS,
};
pub use console::Console;
pub use error::{LxdError, LxdErrorKind};
pub use lifecycle::{InstanceAction, InstanceInfo, STATE_CHANGE_TIMEOUT_SECS};
pub use operation::{
    operation_id_from_exec_response, CommandPhase, ExecRequest, Operation, OperationStatus,
    OutputPaths, OPERATION_POLL_INTERVAL,
};
pub use output::STDERR_MARKER;
pub use prompt::{
    compile_prompt_patterns, match_prompt, CommandProbe, EchoPromptProvider, PromptMatch,
    PromptPattern, PromptProvider, StaticPromptProvider, DEFAULT_SYNTHETIC_PROMPT,
    GENERIC_PROMPT_MARKER,
};
pub use session::{CommandResult, LxdSession, LOGIN_VERIFY_COMMAND, SEND_TIMEOUT};
