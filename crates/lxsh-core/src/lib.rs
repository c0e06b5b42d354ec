//! Foundational low-level utilities shared across lxsh crates.
//!
//! Provides the rotating console transcript writer and the clock helpers used
//! to timestamp transcript records.

pub mod time_utils;
pub mod transcript;

pub use time_utils::current_unix_timestamp_ms;
pub use transcript::{
    ConsoleTranscript, TranscriptLimits, DEFAULT_TRANSCRIPT_KEEP_ROTATED,
    DEFAULT_TRANSCRIPT_MAX_BYTES,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_current_unix_timestamp_ms_is_monotonic_enough() {
        let first = current_unix_timestamp_ms();
        let second = current_unix_timestamp_ms();
        assert!(first > 1_600_000_000_000);
        assert!(second >= first);
    }
}
