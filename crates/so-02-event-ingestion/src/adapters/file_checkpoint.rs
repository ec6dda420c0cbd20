//! # File Checkpoint Store
//!
//! The checkpoint is one JSON object followed by a newline: the last processed
//! block and the protocol state folded up to it.
//!
//! A write happens in two phases:
//!
//! 1. `stage`: create `<path>.tmp`, write, `sync_all`, close.
//! 2. `commit`: rename `<path>.tmp` over `<path>`, then fsync the directory.
//!
//! A crash between the two leaves `<path>` holding the previous value.
//! `<path>.lock` carries an exclusive `fs2` lock for the store's lifetime.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use shared_types::BlockHeight;
use tracing::{debug, info};

use crate::domain::{Checkpoint, CheckpointError};
use crate::ports::CheckpointStore;

fn io_err(path: &Path) -> impl FnOnce(io::Error) -> CheckpointError + '_ {
    move |source| CheckpointError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

// =============================================================================
// LOCK
// =============================================================================

/// Exclusive advisory lock on a checkpoint; released on drop.
#[derive(Debug)]
pub struct CheckpointLock {
    file: File,
    path: PathBuf,
}

impl CheckpointLock {
    /// Take the lock without waiting.
    ///
    /// Fails with `CheckpointError::Locked` if another store (in this or any
    /// other process) holds it.
    pub fn acquire(path: &Path) -> Result<Self, CheckpointError> {
        let mut file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(path)
            .map_err(io_err(path))?;

        if file.try_lock_exclusive().is_err() {
            let mut content = String::new();
            let pid = file
                .read_to_string(&mut content)
                .ok()
                .and_then(|_| content.trim().parse().ok());
            return Err(CheckpointError::Locked {
                path: path.to_path_buf(),
                pid,
            });
        }

        // Holder's PID, for the error message of the next contender.
        file.set_len(0).map_err(io_err(path))?;
        file.seek(SeekFrom::Start(0)).map_err(io_err(path))?;
        writeln!(file, "{}", std::process::id()).map_err(io_err(path))?;
        file.sync_all().map_err(io_err(path))?;

        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    /// Lock file path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for CheckpointLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

// =============================================================================
// STORE
// =============================================================================

/// Checkpoint persisted in a JSON file.
#[derive(Debug)]
pub struct FileCheckpointStore {
    path: PathBuf,
    staging_path: PathBuf,
    last: Option<BlockHeight>,
    _lock: CheckpointLock,
}

impl FileCheckpointStore {
    /// Open the store at `path`, creating the parent directory if needed.
    ///
    /// Takes the writer lock and validates the current content, so a corrupt
    /// checkpoint is reported here.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, CheckpointError> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err(parent))?;
        }

        let lock = CheckpointLock::acquire(&with_suffix(&path, ".lock"))?;
        let staging_path = with_suffix(&path, ".tmp");
        let last = read_checkpoint(&path)?.map(|c| c.last_processed_block);
        info!(path = %path.display(), checkpoint = ?last, "[so-02] Checkpoint store opened");

        Ok(Self {
            path,
            staging_path,
            last,
            _lock: lock,
        })
    }

    /// Checkpoint file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Phase one: durably write `checkpoint` to the staging file.
    pub fn stage(&self, checkpoint: &Checkpoint) -> Result<(), CheckpointError> {
        let encoded =
            serde_json::to_string(checkpoint).map_err(|e| CheckpointError::Encode {
                path: self.path.clone(),
                reason: e.to_string(),
            })?;
        let staging = &self.staging_path;
        let mut file = File::create(staging).map_err(io_err(staging))?;
        writeln!(file, "{encoded}").map_err(io_err(staging))?;
        file.sync_all().map_err(io_err(staging))?;
        Ok(())
    }

    /// Phase two: atomically replace the checkpoint with the staged value.
    pub fn commit(&self) -> Result<(), CheckpointError> {
        fs::rename(&self.staging_path, &self.path).map_err(io_err(&self.path))?;
        sync_parent(&self.path)
    }
}

impl CheckpointStore for FileCheckpointStore {
    fn read(&self) -> Result<Option<Checkpoint>, CheckpointError> {
        read_checkpoint(&self.path)
    }

    fn write(&mut self, checkpoint: &Checkpoint) -> Result<(), CheckpointError> {
        let block = checkpoint.last_processed_block;
        debug_assert!(
            self.last.map_or(true, |last| block >= last),
            "checkpoint moved backwards: {block} < {:?}",
            self.last
        );
        self.stage(checkpoint)?;
        self.commit()?;
        self.last = Some(block);
        debug!(block, "[so-02] Checkpoint written");
        Ok(())
    }
}

fn read_checkpoint(path: &Path) -> Result<Option<Checkpoint>, CheckpointError> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(io_err(path)(e)),
    };
    serde_json::from_str::<Checkpoint>(content.trim())
        .map(Some)
        .map_err(|_| CheckpointError::Corrupt {
            path: path.to_path_buf(),
            content,
        })
}

#[cfg(unix)]
fn sync_parent(path: &Path) -> Result<(), CheckpointError> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    File::open(parent)
        .and_then(|dir| dir.sync_all())
        .map_err(io_err(parent))
}

#[cfg(not(unix))]
fn sync_parent(_path: &Path) -> Result<(), CheckpointError> {
    Ok(())
}
