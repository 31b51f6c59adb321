// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! roost-spawn: the application-spawning handshake core of Roost.
//!
//! The caller builds a [`HandshakeSession`], runs [`prepare`], forks and
//! execs the child itself, then runs [`perform`] with the child's pid and
//! stdio pipes. The outcome is either a validated
//! [`roost_core::SpawnResult`] or a [`roost_core::SpawnError`] carrying the
//! journey and all harvested diagnostics.

pub mod capture;
pub mod perform;
pub mod port;
pub mod prepare;
mod response;
pub mod session;
pub mod workdir;

use nix::unistd::Pid;
use roost_core::{SpawnError, SpawnResult};

pub use capture::OutputCapturer;
pub use perform::{HandshakePerform, PerformOptions};
pub use port::{find_free_port, ping_tcp_server, PortLookup};
pub use prepare::HandshakePrepare;
pub use session::HandshakeSession;
pub use workdir::{WorkDir, WorkDirError};

/// Run handshake phase 1 on the session.
pub async fn prepare(session: &mut HandshakeSession) -> Result<(), Box<SpawnError>> {
    HandshakePrepare::new(session, serde_json::Map::new()).execute().await
}

/// Run handshake phase 2 against the forked child.
pub async fn perform(
    session: &mut HandshakeSession,
    pid: Pid,
    options: PerformOptions,
) -> Result<SpawnResult, Box<SpawnError>> {
    HandshakePerform::new(session, pid, options).execute().await
}
