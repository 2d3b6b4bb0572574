//! Materializes an [`ArchivePlan`] as a directory on disk.
//!
//! A message is assembled in a hidden staging directory and renamed into
//! place only once every file is flushed, so a crash never leaves a
//! half-written archive directory under its final name.

use std::fs::{self, File, OpenOptions};
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};

use crate::constants::{MAX_COLLISION_SUFFIX, STAGING_DIR_PREFIX};
use crate::mail::MessageId;

use super::naming::{ArchivePlan, numbered};

#[derive(Debug, thiserror::Error)]
#[error("failed to write {}: {source}", path.display())]
pub struct WriteError {
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

trait IoResultExt<T> {
    fn at(self, path: &Path) -> Result<T, WriteError>;
}

impl<T> IoResultExt<T> for io::Result<T> {
    fn at(self, path: &Path) -> Result<T, WriteError> {
        self.map_err(|source| WriteError {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[derive(Debug, Clone)]
pub struct ArchiveWriter {
    output_dir: PathBuf,
}

impl ArchiveWriter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Write one message and return the directory it ended up in.
    ///
    /// `eml_text` is the raw message already decoded to text. Nothing that
    /// exists on disk before the call is modified.
    pub fn write(
        &self,
        uid: MessageId,
        plan: &ArchivePlan,
        eml_text: &str,
    ) -> Result<PathBuf, WriteError> {
        fs::create_dir_all(&self.output_dir).at(&self.output_dir)?;

        let staging = self
            .output_dir
            .join(format!("{}{}", STAGING_DIR_PREFIX, uid));
        if staging.exists() {
            tracing::debug!("Removing stale staging directory {}", staging.display());
            fs::remove_dir_all(&staging).at(&staging)?;
        }
        fs::create_dir(&staging).at(&staging)?;

        // Ensure that we remove the staging directory on failure
        let mut cleanup = RemoveOnError {
            path: Some(staging.clone()),
        };

        write_new_file(&staging, &plan.eml_name, eml_text.as_bytes())?;

        for attachment in &plan.attachments {
            let path = write_new_file(&staging, &attachment.name, &attachment.payload)?;
            tracing::debug!("Wrote attachment {}", path.display());
        }
        sync_dir(&staging).at(&staging)?;

        let target = self.claim_dir_name(&plan.dir_name)?;
        fs::rename(&staging, &target).at(&target)?;
        cleanup.path.take();
        sync_dir(&self.output_dir).at(&self.output_dir)?;

        Ok(target)
    }

    /// First of `name`, `name_1`, `name_2`, ... that does not exist yet.
    fn claim_dir_name(&self, name: &str) -> Result<PathBuf, WriteError> {
        let candidate = self.output_dir.join(name);
        if !exists(&candidate) {
            return Ok(candidate);
        }

        for n in 1..=MAX_COLLISION_SUFFIX {
            let candidate = self.output_dir.join(format!("{}_{}", name, n));
            if !exists(&candidate) {
                tracing::info!(
                    "Directory {} already exists, archiving into {}",
                    name,
                    candidate.display()
                );
                return Ok(candidate);
            }
        }

        let path = self.output_dir.join(name);
        Err(WriteError {
            source: io::Error::new(ErrorKind::AlreadyExists, "no free directory name"),
            path,
        })
    }
}

/// Create `name` inside `dir`, or `stem_n.ext` if it is taken, and fill it.
/// `create_new` makes the existence check and the creation one step.
fn write_new_file(dir: &Path, name: &str, data: &[u8]) -> Result<PathBuf, WriteError> {
    let mut n = 0;
    let (path, mut file) = loop {
        let candidate = if n == 0 {
            dir.join(name)
        } else {
            dir.join(numbered(name, n))
        };

        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&candidate)
        {
            Ok(file) => break (candidate, file),
            Err(e) if e.kind() == ErrorKind::AlreadyExists && n < MAX_COLLISION_SUFFIX => n += 1,
            Err(e) => return Err(e).at(&candidate),
        }
    };

    file.write_all(data).at(&path)?;
    file.sync_all().at(&path)?;
    Ok(path)
}

fn exists(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok()
}

#[cfg(unix)]
fn sync_dir(dir: &Path) -> io::Result<()> {
    File::open(dir)?.sync_all()
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> io::Result<()> {
    Ok(())
}

struct RemoveOnError {
    path: Option<PathBuf>,
}

impl Drop for RemoveOnError {
    fn drop(&mut self) {
        if let Some(path) = self.path.take() {
            // Best effort; a leftover is removed by the next attempt for this uid
            fs::remove_dir_all(path).ok();
        }
    }
}
