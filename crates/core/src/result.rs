// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The outcome of a successful spawn: process identity, standard streams,
//! timing and listening sockets.

use std::os::fd::OwnedFd;
use std::time::{Instant, SystemTime};

use nix::unistd::Pid;

use crate::id::generate_gupid;

/// One socket the spawned process listens on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocketInfo {
    /// e.g. `tcp://127.0.0.1:3000` or `unix:/path/to.sock`.
    pub address: String,
    /// e.g. `http`, `session` or `preloader`.
    pub protocol: String,
    /// Number of concurrent connections the socket handles; -1 = unbounded.
    pub concurrency: i32,
    /// Whether HTTP requests may be routed to this socket.
    pub accept_http_requests: bool,
    pub description: String,
}

impl Default for SocketInfo {
    fn default() -> Self {
        SocketInfo {
            address: String::new(),
            protocol: String::new(),
            concurrency: 0,
            accept_http_requests: false,
            description: String::new(),
        }
    }
}

/// Everything the caller needs to know about a process that finished
/// spawning successfully.
#[derive(Debug)]
pub struct SpawnResult {
    pub pid: Option<Pid>,
    pub stdin_fd: Option<OwnedFd>,
    pub stdout_and_err_fd: Option<OwnedFd>,
    pub spawn_start_time: SystemTime,
    pub spawn_end_time: Option<SystemTime>,
    pub spawn_start_time_monotonic: Instant,
    pub spawn_end_time_monotonic: Option<Instant>,
    /// Globally unique per-process identifier, at most 20 bytes.
    pub gupid: String,
    /// VCS revision of the deployed code, when it could be inferred.
    pub code_revision: String,
    pub sockets: Vec<SocketInfo>,
}

impl SpawnResult {
    /// Start a result record for a spawn beginning now. The gupid is
    /// generated here so it can be handed to the subprocess in the args.
    pub fn new() -> Self {
        SpawnResult {
            pid: None,
            stdin_fd: None,
            stdout_and_err_fd: None,
            spawn_start_time: SystemTime::now(),
            spawn_end_time: None,
            spawn_start_time_monotonic: Instant::now(),
            spawn_end_time_monotonic: None,
            gupid: generate_gupid(),
            code_revision: String::new(),
            sockets: Vec::new(),
        }
    }

    /// Check internal consistency.
    ///
    /// Errors are split into two buckets because the remediation wording
    /// differs: `internal` problems are bugs in us, `app_supplied` problems
    /// are bugs in what the subprocess reported.
    pub fn validate(&self) -> (Vec<String>, Vec<String>) {
        let mut internal = Vec::new();
        let mut app_supplied = Vec::new();

        if self.pid.is_none() {
            internal.push("'pid' is not set".to_string());
        }
        if self.gupid.is_empty() {
            internal.push("'gupid' is not set".to_string());
        }
        match self.spawn_end_time {
            None => internal.push("'spawn_end_time' is not set".to_string()),
            Some(end) if end < self.spawn_start_time => {
                internal.push("'spawn_end_time' lies before 'spawn_start_time'".to_string());
            }
            Some(_) => {}
        }
        match self.spawn_end_time_monotonic {
            None => internal.push("'spawn_end_time_monotonic' is not set".to_string()),
            Some(end) if end < self.spawn_start_time_monotonic => {
                internal.push(
                    "'spawn_end_time_monotonic' lies before 'spawn_start_time_monotonic'"
                        .to_string(),
                );
            }
            Some(_) => {}
        }

        if self.sockets.is_empty() {
            app_supplied.push("sockets are not supplied".to_string());
        }
        for (i, socket) in self.sockets.iter().enumerate() {
            if socket.address.is_empty() {
                app_supplied.push(format!("'sockets[{i}].address' must be non-empty"));
            }
            if socket.protocol.is_empty() {
                app_supplied.push(format!("'sockets[{i}].protocol' must be non-empty"));
            }
            if socket.concurrency < -1 {
                app_supplied.push(format!("'sockets[{i}].concurrency' must be -1 or greater"));
            }
        }

        (internal, app_supplied)
    }
}

impl Default for SpawnResult {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "result_tests.rs"]
mod tests;
