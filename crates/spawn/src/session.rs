// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-spawn handshake state, threaded through both phases.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use nix::unistd::{Gid, Uid};
use roost_core::{Config, Context, Journey, JourneyType, SpawnResult};

use crate::workdir::WorkDir;

/// Everything one spawn accumulates between `prepare` and `perform`.
///
/// Created by the caller, populated by [`crate::prepare::HandshakePrepare`],
/// consumed by [`crate::perform::HandshakePerform`]. Dropping the session
/// removes the work directory.
pub struct HandshakeSession {
    pub context: Arc<Context>,
    pub config: Config,
    pub journey: Journey,
    pub result: SpawnResult,

    pub work_dir: Option<WorkDir>,
    pub response_dir: PathBuf,
    pub env_dump_dir: PathBuf,

    pub uid: Option<Uid>,
    pub gid: Option<Gid>,
    pub home_dir: String,
    pub shell: String,

    /// Remaining spawn deadline; decremented as phases consume time.
    pub timeout: Duration,
    /// Port the app is expected to start on; 0 when not applicable.
    pub expected_start_port: u16,
}

impl HandshakeSession {
    pub fn new(context: Arc<Context>, config: Config, journey_type: JourneyType) -> Self {
        let uses_wrapper = !config.generic_app && config.starts_using_wrapper;
        let timeout = Duration::from_millis(config.start_timeout_msec);
        HandshakeSession {
            context,
            journey: Journey::new(journey_type, uses_wrapper),
            result: SpawnResult::new(),
            work_dir: None,
            response_dir: PathBuf::new(),
            env_dump_dir: PathBuf::new(),
            uid: None,
            gid: None,
            home_dir: String::new(),
            shell: String::new(),
            timeout,
            expected_start_port: 0,
            config,
        }
    }

    pub fn finish_fifo_path(&self) -> PathBuf {
        self.response_dir.join("finish")
    }
}
