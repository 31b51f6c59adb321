// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared server context for spawning.
//!
//! One `Context` exists per server instance and is shared by every spawn.
//! It carries installation facts reported to subprocesses and owns the
//! wrapping free-port counter.

use std::ops::RangeInclusive;
use std::path::PathBuf;

use parking_lot::Mutex;

/// Server-wide state shared across spawns.
#[derive(Debug)]
pub struct Context {
    /// Installation root reported to subprocesses as `roost_root`.
    pub root_dir: PathBuf,
    /// Server version reported to subprocesses.
    pub version: String,
    /// How the server is integrated, e.g. "standalone" or "nginx".
    pub integration_mode: String,
    /// Per-instance runtime directory, when the server runs with one.
    pub instance_dir: Option<PathBuf>,
    port_range: RangeInclusive<u16>,
    next_port: Mutex<u16>,
}

impl Context {
    pub fn new(root_dir: impl Into<PathBuf>, version: impl Into<String>) -> Self {
        Context {
            root_dir: root_dir.into(),
            version: version.into(),
            integration_mode: "standalone".to_string(),
            instance_dir: None,
            port_range: 5000..=65535,
            next_port: Mutex::new(5000),
        }
    }

    /// Restrict the port pool to the given inclusive range. The counter is
    /// reset to the start of the new range.
    pub fn with_port_range(mut self, range: RangeInclusive<u16>) -> Self {
        self.next_port = Mutex::new(*range.start());
        self.port_range = range;
        self
    }

    pub fn port_range(&self) -> RangeInclusive<u16> {
        self.port_range.clone()
    }

    /// Number of candidate ports in the pool.
    pub fn port_range_len(&self) -> u32 {
        u32::from(*self.port_range.end()) - u32::from(*self.port_range.start()) + 1
    }

    /// Take the next candidate port, advancing the shared counter and
    /// wrapping at the end of the range.
    pub fn take_port_candidate(&self) -> u16 {
        let mut next = self.next_port.lock();
        let candidate = *next;
        *next = if candidate >= *self.port_range.end() {
            *self.port_range.start()
        } else {
            candidate + 1
        };
        candidate
    }
}

#[cfg(test)]
#[path = "context_tests.rs"]
mod tests;
