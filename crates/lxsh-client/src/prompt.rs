//! Synthetic shell prompts.
//!
//! Exec operations have no terminal attached, so there is never a real prompt
//! to wait for. A [`PromptProvider`] produces a stand-in prompt string once per
//! session and expected patterns are matched against it. The result is a
//! heuristic: callers get an index to continue with, not proof that a shell is
//! idle.

use std::time::Duration;

use regex::Regex;

use crate::LxdError;

pub const GENERIC_PROMPT_MARKER: &str = "# ";
pub const DEFAULT_SYNTHETIC_PROMPT: &str = "# ";
pub const PROMPT_PROBE_COMMAND: &str = "echo $PS1 || echo '# '";
pub const PROMPT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Runs a throwaway command on the target and returns its collected output.
pub trait CommandProbe {
    fn probe_output(&mut self, command: &str, timeout: Duration) -> Result<String, LxdError>;
}

/// Source of the prompt string that expected patterns are matched against.
pub trait PromptProvider: Send {
    fn discover_prompt(&mut self, probe: &mut dyn CommandProbe, timeout: Duration) -> String;
}

#[derive(Debug, Clone)]
/// Asks the target to echo its prompt variable, falling back to a fixed marker.
pub struct EchoPromptProvider {
    pub command: String,
    pub fallback: String,
}

impl Default for EchoPromptProvider {
    fn default() -> Self {
        Self {
            command: PROMPT_PROBE_COMMAND.to_string(),
            fallback: DEFAULT_SYNTHETIC_PROMPT.to_string(),
        }
    }
}

impl PromptProvider for EchoPromptProvider {
    fn discover_prompt(&mut self, probe: &mut dyn CommandProbe, timeout: Duration) -> String {
        match probe.probe_output(&self.command, timeout.min(PROMPT_PROBE_TIMEOUT)) {
            Ok(output) if !output.trim().is_empty() => output.trim().to_string(),
            Ok(_) => self.fallback.clone(),
            Err(error) => {
                tracing::debug!(error = %error, "prompt probe failed; using fallback prompt");
                self.fallback.clone()
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// A prompt known up front; never touches the network.
pub struct StaticPromptProvider(pub String);

impl PromptProvider for StaticPromptProvider {
    fn discover_prompt(&mut self, _probe: &mut dyn CommandProbe, _timeout: Duration) -> String {
        self.0.clone()
    }
}

#[derive(Debug, Clone)]
/// A pattern to wait for: plain substring or regular expression.
pub enum PromptPattern {
    Literal(String),
    Regex(Regex),
}

impl PromptPattern {
    pub fn literal(text: impl Into<String>) -> Self {
        Self::Literal(text.into())
    }

    pub fn regex(pattern: &str) -> Result<Self, LxdError> {
        Regex::new(pattern)
            .map(Self::Regex)
            .map_err(|error| LxdError::Config(format!("invalid prompt pattern '{pattern}': {error}")))
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Literal(text) => text,
            Self::Regex(regex) => regex.as_str(),
        }
    }

    pub fn is_match(&self, prompt: &str) -> bool {
        match self {
            Self::Literal(text) => prompt.contains(text.as_str()),
            Self::Regex(regex) => regex.is_match(prompt),
        }
    }
}

/// Compiles configured prompt strings as regexes.
pub fn compile_prompt_patterns(raw: &[String]) -> Result<Vec<PromptPattern>, LxdError> {
    raw.iter().map(|pattern| PromptPattern::regex(pattern)).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Outcome of matching patterns against a synthetic prompt.
pub enum PromptMatch {
    Pattern(usize),
    GenericMarker,
    Fallback,
}

impl PromptMatch {
    pub fn index(self) -> usize {
        match self {
            Self::Pattern(index) => index,
            Self::GenericMarker | Self::Fallback => 0,
        }
    }
}

pub fn match_prompt(patterns: &[PromptPattern], prompt: &str) -> PromptMatch {
    if let Some(index) = patterns.iter().position(|pattern| pattern.is_match(prompt)) {
        return PromptMatch::Pattern(index);
    }
    if prompt.contains(GENERIC_PROMPT_MARKER) {
        return PromptMatch::GenericMarker;
    }
    PromptMatch::Fallback
}
