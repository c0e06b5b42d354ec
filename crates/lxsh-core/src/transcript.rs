//! Console transcripts: one JSON record per line, rolled over by size.
//!
//! The live file is `<path>`; rolled-over generations are `<path>.1` (newest)
//! through `<path>.<keep_rotated>` (oldest). A record is never split across
//! generations, and a single oversized record still lands in an empty live file.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub const DEFAULT_TRANSCRIPT_MAX_BYTES: u64 = 10 * 1024 * 1024;
pub const DEFAULT_TRANSCRIPT_KEEP_ROTATED: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
/// Size ceiling for the live transcript and how many rolled-over files survive.
pub struct TranscriptLimits {
    /// `0` disables rollover.
    pub max_bytes: u64,
    /// `0` discards the live file instead of keeping a generation.
    pub keep_rotated: usize,
}

impl Default for TranscriptLimits {
    fn default() -> Self {
        Self {
            max_bytes: DEFAULT_TRANSCRIPT_MAX_BYTES,
            keep_rotated: DEFAULT_TRANSCRIPT_KEEP_ROTATED,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsoleTranscript {
    path: PathBuf,
    limits: TranscriptLimits,
}

impl ConsoleTranscript {
    pub fn new(path: impl Into<PathBuf>, limits: TranscriptLimits) -> Self {
        Self {
            path: path.into(),
            limits,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn limits(&self) -> TranscriptLimits {
        self.limits
    }

    pub fn rotated_path(&self, generation: usize) -> PathBuf {
        let mut raw = self.path.clone().into_os_string();
        raw.push(format!(".{generation}"));
        PathBuf::from(raw)
    }

    /// Serializes `record` as one NDJSON line and appends it.
    pub fn append<T: Serialize>(&self, record: &T) -> Result<()> {
        let mut line = serde_json::to_vec(record).context("failed to encode transcript record")?;
        line.push(b'\n');

        if let Some(parent) = self.path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        self.make_room(line.len() as u64)?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("failed to open transcript {}", self.path.display()))?;
        file.write_all(&line)
            .with_context(|| format!("failed to write transcript {}", self.path.display()))?;
        Ok(())
    }

    fn make_room(&self, incoming: u64) -> Result<()> {
        if self.limits.max_bytes == 0 {
            return Ok(());
        }
        let live = match fs::metadata(&self.path) {
            Ok(metadata) => metadata.len(),
            Err(error) if error.kind() == ErrorKind::NotFound => return Ok(()),
            Err(error) => {
                return Err(error)
                    .with_context(|| format!("failed to stat {}", self.path.display()))
            }
        };
        if live == 0 || live.saturating_add(incoming) <= self.limits.max_bytes {
            return Ok(());
        }
        self.roll_over()
    }

    fn roll_over(&self) -> Result<()> {
        let keep = self.limits.keep_rotated;
        if keep == 0 {
            return remove_if_present(&self.path);
        }
        remove_if_present(&self.rotated_path(keep))?;
        for generation in (1..keep).rev() {
            rename_if_present(&self.rotated_path(generation), &self.rotated_path(generation + 1))?;
        }
        rename_if_present(&self.path, &self.rotated_path(1))
    }
}

fn remove_if_present(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Err(error) if error.kind() != ErrorKind::NotFound => {
            Err(error).with_context(|| format!("failed to remove {}", path.display()))
        }
        _ => Ok(()),
    }
}

fn rename_if_present(from: &Path, to: &Path) -> Result<()> {
    match fs::rename(from, to) {
        Err(error) if error.kind() != ErrorKind::NotFound => Err(error).with_context(|| {
            format!("failed to roll {} over to {}", from.display(), to.display())
        }),
        _ => Ok(()),
    }
}
