// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Spawn failure categories and their wire representation.
//!
//! Subprocesses report a category through `response/error/category`; the
//! parent classifies its own failures with the same closed set so that error
//! pages and logs speak one language.

use std::fmt;

/// Classifies what kind of thing went wrong during a spawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Internal,
    FileSystem,
    OperatingSystem,
    Io,
    Timeout,
    Unknown,
}

impl ErrorCategory {
    /// Parse the wire string written by a subprocess.
    ///
    /// Anything unrecognized maps to `Unknown`, which callers treat as a
    /// reporting bug in the subprocess rather than a valid category.
    pub fn parse(value: &str) -> Self {
        match value {
            "INTERNAL_ERROR" => ErrorCategory::Internal,
            "FILE_SYSTEM_ERROR" => ErrorCategory::FileSystem,
            "OPERATING_SYSTEM_ERROR" => ErrorCategory::OperatingSystem,
            "IO_ERROR" => ErrorCategory::Io,
            "TIMEOUT_ERROR" => ErrorCategory::Timeout,
            _ => ErrorCategory::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Internal => "INTERNAL_ERROR",
            ErrorCategory::FileSystem => "FILE_SYSTEM_ERROR",
            ErrorCategory::OperatingSystem => "OPERATING_SYSTEM_ERROR",
            ErrorCategory::Io => "IO_ERROR",
            ErrorCategory::Timeout => "TIMEOUT_ERROR",
            ErrorCategory::Unknown => "UNKNOWN_ERROR_CATEGORY",
        }
    }

    /// Classify an I/O error from the handshake machinery itself.
    ///
    /// Path-shaped failures (missing files, permissions, directory problems)
    /// count as filesystem errors; everything else is a plain I/O error.
    pub fn from_io(err: &std::io::Error) -> Self {
        use std::io::ErrorKind;
        match err.kind() {
            ErrorKind::NotFound
            | ErrorKind::PermissionDenied
            | ErrorKind::AlreadyExists
            | ErrorKind::NotADirectory
            | ErrorKind::IsADirectory
            | ErrorKind::DirectoryNotEmpty
            | ErrorKind::ReadOnlyFilesystem
            | ErrorKind::StorageFull => ErrorCategory::FileSystem,
            _ => ErrorCategory::Io,
        }
    }

    /// The generic one-line summary used when a failure carries no more
    /// specific message.
    pub fn default_summary(&self) -> &'static str {
        match self {
            ErrorCategory::Internal | ErrorCategory::Unknown => {
                "An internal error occurred while spawning an application process."
            }
            ErrorCategory::FileSystem => {
                "A filesystem error occurred while spawning an application process."
            }
            ErrorCategory::OperatingSystem => {
                "An operating system error occurred while spawning an application process."
            }
            ErrorCategory::Io => "An I/O error occurred while spawning an application process.",
            ErrorCategory::Timeout => {
                "A timeout error occurred while spawning an application process."
            }
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
#[path = "category_tests.rs"]
mod tests;
