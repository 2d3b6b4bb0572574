//! Incremental sync: decides which messages to fetch, archives them in UID
//! order and advances the checkpoint.

mod engine;

use std::path::PathBuf;
use std::time::Duration;

use crate::archive::WriteError;
use crate::checkpoint::CheckpointError;
use crate::mail::MessageId;
use crate::mail::parser::MalformedMessage;

pub use engine::SyncEngine;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    OneShot,
    /// Repeat passes forever, sleeping this long in between
    Continuous(Duration),
}

#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Label for log output, normally the folder name
    pub folder: String,
    /// Start the first pass from the stored checkpoint
    pub resume: bool,
    /// Stop retrying a message after this many failed passes
    pub retry_limit: Option<u32>,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            folder: crate::constants::DEFAULT_FOLDER.to_string(),
            resume: true,
            retry_limit: None,
        }
    }
}

/// Fatal for the current pass.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("connection error: {0:#}")]
    Connection(anyhow::Error),
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),
}

/// Result of handling one message. Skips never stop the pass.
#[derive(Debug)]
pub enum MessageOutcome {
    Archived { dir: PathBuf },
    Skipped(SkipReason),
}

#[derive(Debug, thiserror::Error)]
pub enum SkipReason {
    #[error("malformed message: {0}")]
    Malformed(#[from] MalformedMessage),
    #[error(transparent)]
    Write(#[from] WriteError),
    #[error("message no longer exists on the server")]
    Vanished,
    #[error("archive task failed: {0}")]
    Task(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassReport {
    /// Ids the server reported above the checkpoint
    pub listed: usize,
    pub archived: usize,
    pub skipped: usize,
    /// Ids skipped without fetching: archived earlier in this process or given up on
    pub already_handled: usize,
    pub checkpoint: Option<MessageId>,
}
