use std::time::Duration;

use crate::prompt::PromptPattern;
use crate::session::{CommandResult, LxdSession};
use crate::LxdError;

/// Send/expect contract device drivers script against.
///
/// Implemented by [`LxdSession`]; serial or ssh consoles can implement it too
/// so driver code stays transport agnostic.
pub trait Console {
    fn login(&mut self) -> Result<(), LxdError>;
    fn send(&mut self, command: &str) -> CommandResult;
    fn await_pattern(&mut self, patterns: &[PromptPattern], timeout: Duration) -> usize;
    fn expect_exact(&mut self, pattern: &str, timeout: Duration) -> usize;
    fn run(&mut self, command: &str, timeout: Option<Duration>) -> Result<String, LxdError>;
    fn last_output(&self) -> String;
    fn close(&mut self);
}

impl Console for LxdSession {
    fn login(&mut self) -> Result<(), LxdError> {
        LxdSession::login(self)
    }

    fn send(&mut self, command: &str) -> CommandResult {
        LxdSession::send(self, command)
    }

    fn await_pattern(&mut self, patterns: &[PromptPattern], timeout: Duration) -> usize {
        LxdSession::await_pattern(self, patterns, timeout)
    }

    fn expect_exact(&mut self, pattern: &str, timeout: Duration) -> usize {
        LxdSession::expect_exact(self, pattern, timeout)
    }

    fn run(&mut self, command: &str, timeout: Option<Duration>) -> Result<String, LxdError> {
        LxdSession::run(self, command, timeout)
    }

    fn last_output(&self) -> String {
        LxdSession::last_output(self)
    }

    fn close(&mut self) {
        LxdSession::close(self)
    }
}
