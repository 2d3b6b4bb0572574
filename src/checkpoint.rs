//! Durable resume marker: the largest UID known to be fully archived.
//!
//! Stored as one decimal number in a text file. Empty or whitespace-only
//! content means no message has been archived yet.

use std::fs::{self, File, OpenOptions};
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};

use crate::mail::MessageId;

#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    #[error("failed to read checkpoint {}: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },
    #[error("failed to persist checkpoint {}: {source}", path.display())]
    Write { path: PathBuf, source: io::Error },
    #[error("checkpoint {} holds {value:?}, expected a UID", path.display())]
    Corrupt { path: PathBuf, value: String },
}

#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Option<MessageId>, CheckpointError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(CheckpointError::Read {
                    path: self.path.clone(),
                    source,
                });
            }
        };

        let value = content.trim();
        if value.is_empty() {
            return Ok(None);
        }

        value
            .parse()
            .map(Some)
            .map_err(|_| CheckpointError::Corrupt {
                path: self.path.clone(),
                value: value.to_string(),
            })
    }

    /// Persist `id`. The value is on stable storage once this returns.
    pub fn save(&self, id: MessageId) -> Result<(), CheckpointError> {
        self.write_atomically(id.to_string().as_bytes())
            .map_err(|source| CheckpointError::Write {
                path: self.path.clone(),
                source,
            })
    }

    fn write_atomically(&self, data: &[u8]) -> io::Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;

        let mut tmp_name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "checkpoint".into());
        tmp_name.push(".tmp");
        let tmp_path = dir.join(tmp_name);

        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp_path)?;
        if let Err(e) = file.write_all(data).and_then(|_| file.sync_all()) {
            fs::remove_file(&tmp_path).ok();
            return Err(e);
        }
        drop(file);

        fs::rename(&tmp_path, &self.path)?;
        sync_dir(&dir)
    }
}

/// Flush the directory entry so the rename itself survives a crash.
#[cfg(unix)]
fn sync_dir(dir: &Path) -> io::Result<()> {
    File::open(dir)?.sync_all()
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> io::Result<()> {
    Ok(())
}
