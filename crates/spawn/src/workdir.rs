// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-spawn scratch directory.
//!
//! The work directory hosts the filesystem rendezvous between parent and
//! child: the dumped spawn arguments, the child's response files and its
//! environment dumps. It is private to the resolved identity (0700) and is
//! removed on every exit path, success or failure.

use std::fs;
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use nix::sys::stat::Mode;
use nix::unistd::{chown, mkfifo, Gid, Uid};

#[derive(Debug, thiserror::Error)]
pub enum WorkDirError {
    #[error("cannot create spawn work directory: {source}")]
    Create {
        #[source]
        source: io::Error,
    },
    #[error("cannot create directory {path}: {source}")]
    Mkdir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cannot create FIFO {path}: {source}")]
    Fifo {
        path: PathBuf,
        #[source]
        source: nix::Error,
    },
    #[error("cannot change ownership of {path}: {source}")]
    Chown {
        path: PathBuf,
        #[source]
        source: nix::Error,
    },
    #[error("cannot write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// A uniquely named scratch directory owned by the spawn identity.
///
/// Removal happens on drop, which covers success, failure and cancellation
/// alike.
#[derive(Debug)]
pub struct WorkDir {
    dir: tempfile::TempDir,
    uid: Uid,
    gid: Gid,
}

impl WorkDir {
    /// Create the directory under the system temp root with mode 0700,
    /// owned by `uid:gid`.
    pub fn new(uid: Uid, gid: Gid) -> Result<Self, WorkDirError> {
        let dir = tempfile::Builder::new()
            .prefix("roost.spawn.")
            .permissions(fs::Permissions::from_mode(0o700))
            .tempdir()
            .map_err(|source| WorkDirError::Create { source })?;
        chown(dir.path(), Some(uid), Some(gid)).map_err(|source| WorkDirError::Chown {
            path: dir.path().to_path_buf(),
            source,
        })?;
        Ok(WorkDir { dir, uid, gid })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Create a sub-directory with mode 0700, owned by the spawn identity.
    pub fn make_subdir(&self, relative: &str) -> Result<PathBuf, WorkDirError> {
        let path = self.dir.path().join(relative);
        fs::create_dir_all(&path)
            .map_err(|source| WorkDirError::Mkdir { path: path.clone(), source })?;
        fs::set_permissions(&path, fs::Permissions::from_mode(0o700))
            .map_err(|source| WorkDirError::Mkdir { path: path.clone(), source })?;
        chown(&path, Some(self.uid), Some(self.gid))
            .map_err(|source| WorkDirError::Chown { path: path.clone(), source })?;
        Ok(path)
    }

    /// Create a FIFO with mode 0600, owned by the spawn identity.
    pub fn make_fifo(&self, relative: &str) -> Result<PathBuf, WorkDirError> {
        let path = self.dir.path().join(relative);
        mkfifo(&path, Mode::S_IRUSR | Mode::S_IWUSR)
            .map_err(|source| WorkDirError::Fifo { path: path.clone(), source })?;
        chown(&path, Some(self.uid), Some(self.gid))
            .map_err(|source| WorkDirError::Chown { path: path.clone(), source })?;
        Ok(path)
    }

    /// Write a file with mode 0600, owned by the spawn identity.
    pub fn write_file(&self, relative: &str, contents: &str) -> Result<PathBuf, WorkDirError> {
        let path = self.dir.path().join(relative);
        fs::write(&path, contents)
            .map_err(|source| WorkDirError::Write { path: path.clone(), source })?;
        fs::set_permissions(&path, fs::Permissions::from_mode(0o600))
            .map_err(|source| WorkDirError::Write { path: path.clone(), source })?;
        chown(&path, Some(self.uid), Some(self.gid))
            .map_err(|source| WorkDirError::Chown { path: path.clone(), source })?;
        Ok(path)
    }
}

#[cfg(test)]
#[path = "workdir_tests.rs"]
mod tests;
