//! Application-wide constants
//!
//! Archive layout details live here so the naming stays stable across releases.

/// Characters stripped from subjects and attachment names before they touch the filesystem.
pub const INVALID_FILENAME_CHARS: &[char] = &['\\', '/', '*', '?', ':', '"', '<', '>', '|'];

/// Timestamp prefix of every archive directory.
pub const DIR_TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

/// Prefix of the hidden directory a message is staged in before it is renamed into place.
pub const STAGING_DIR_PREFIX: &str = ".partial-";

/// Default file name of the checkpoint inside the output directory.
pub const CHECKPOINT_FILE_NAME: &str = ".mailkeep-checkpoint";

/// Default seconds between passes in daemon mode.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 60;

pub const DEFAULT_IMAP_PORT: u16 = 993;

pub const DEFAULT_FOLDER: &str = "INBOX";

/// Upper bound for `_n` suffixes when resolving name collisions.
pub const MAX_COLLISION_SUFFIX: u32 = 10_000;

/// Seconds to wait for the server to acknowledge LOGOUT before exiting anyway.
pub const CLOSE_TIMEOUT_SECS: u64 = 5;

/// Longest subject, in bytes, used in directory and `.eml` names.
pub const MAX_SUBJECT_BYTES: usize = 200;
