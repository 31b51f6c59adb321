// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Handshake phase 1: prepare the spawn.
//!
//! Resolves the target UNIX identity, materializes the work directory and
//! its rendezvous sub-paths, allocates a free port when the app needs one,
//! dumps the spawn arguments for the child, and arms the deadline.

use std::fs;
use std::path::Path;
use std::time::Instant;

use nix::unistd::{Gid, Group, Uid, User};
use roost_core::{ErrorCategory, JourneyStep, SpawnError, SpawnResult};
use serde_json::{json, Map, Value};

use crate::port::{self, PortLookup};
use crate::session::HandshakeSession;
use crate::workdir::WorkDir;

/// Maximum usable length of a UNIX domain socket path on this platform
/// (the `sun_path` capacity minus the trailing NUL).
#[cfg(target_os = "linux")]
pub const UNIX_PATH_MAX: usize = 107;
#[cfg(not(target_os = "linux"))]
pub const UNIX_PATH_MAX: usize = 103;

enum PrepareIssue {
    /// A fully-worded spawn error, journey already marked.
    Spawn(Box<SpawnError>),
    /// A plain system failure to wrap generically.
    Sys { category: ErrorCategory, message: String },
}

impl PrepareIssue {
    fn sys(category: ErrorCategory, message: impl Into<String>) -> Self {
        PrepareIssue::Sys { category, message: message.into() }
    }
}

impl From<crate::workdir::WorkDirError> for PrepareIssue {
    fn from(err: crate::workdir::WorkDirError) -> Self {
        PrepareIssue::sys(ErrorCategory::FileSystem, err.to_string())
    }
}

/// Phase 1 orchestrator. Consumes itself on execution; all outcomes land in
/// the session.
pub struct HandshakePrepare<'a> {
    session: &'a mut HandshakeSession,
    args: Map<String, Value>,
    started: Instant,
}

impl<'a> HandshakePrepare<'a> {
    /// `extra_args` are caller-supplied entries merged under the predefined
    /// and config-derived ones.
    pub fn new(session: &'a mut HandshakeSession, extra_args: Map<String, Value>) -> Self {
        HandshakePrepare { session, args: extra_args, started: Instant::now() }
    }

    /// Run the preparation steps. On failure the `preparation` journey step
    /// is marked errored and a spawn error is returned.
    ///
    /// The caller drives the journey's own step state (it may want to do
    /// additional preparation of its own before marking it performed).
    pub async fn execute(mut self) -> Result<(), Box<SpawnError>> {
        match self.run().await {
            Ok(()) => Ok(()),
            Err(issue) => {
                let _ = self
                    .session
                    .journey
                    .set_step_errored(JourneyStep::Preparation, true);
                Err(match issue {
                    PrepareIssue::Spawn(e) => e,
                    PrepareIssue::Sys { category, message } => {
                        let mut e =
                            SpawnError::new(category, self.session.journey.clone());
                        e.set_summary(message);
                        e.finalize(&self.session.config)
                    }
                })
            }
        }
    }

    async fn run(&mut self) -> Result<(), PrepareIssue> {
        self.resolve_user_and_group()?;
        self.create_work_dir()?;
        self.session.result = SpawnResult::new();
        self.infer_application_info();
        if self.session.config.generic_app || self.session.config.find_free_port {
            self.find_free_port().await?;
        }
        self.prepare_predefined_args();
        self.prepare_args_from_app_config();
        self.dump_args_into_work_dir()?;
        self.adjust_timeout();
        Ok(())
    }

    fn resolve_user_and_group(&mut self) -> Result<(), PrepareIssue> {
        let username = self.session.config.user.clone();
        match User::from_name(&username) {
            Ok(Some(user)) => {
                self.session.uid = Some(user.uid);
                self.session.home_dir = user.dir.to_string_lossy().into_owned();
                self.session.shell = user.shell.to_string_lossy().into_owned();
            }
            Ok(None) => {
                self.session.uid =
                    Some(Uid::from_raw(fall_back_to_numeric_id(&username, "user", None)?));
            }
            Err(errno) => {
                self.session.uid =
                    Some(Uid::from_raw(fall_back_to_numeric_id(&username, "user", Some(errno))?));
            }
        }

        let groupname = self.session.config.group.clone();
        match Group::from_name(&groupname) {
            Ok(Some(group)) => {
                self.session.gid = Some(group.gid);
            }
            Ok(None) => {
                self.session.gid =
                    Some(Gid::from_raw(fall_back_to_numeric_id(&groupname, "group", None)?));
            }
            Err(errno) => {
                self.session.gid = Some(Gid::from_raw(fall_back_to_numeric_id(
                    &groupname,
                    "group",
                    Some(errno),
                )?));
            }
        }
        Ok(())
    }

    fn create_work_dir(&mut self) -> Result<(), PrepareIssue> {
        let (Some(uid), Some(gid)) = (self.session.uid, self.session.gid) else {
            return Err(PrepareIssue::sys(
                ErrorCategory::Internal,
                "spawn identity was not resolved before work directory creation",
            ));
        };
        let work_dir = WorkDir::new(uid, gid)?;

        self.session.env_dump_dir = work_dir.make_subdir("envdump")?;
        work_dir.make_subdir("envdump/annotations")?;
        self.session.response_dir = work_dir.make_subdir("response")?;
        work_dir.make_fifo("response/finish")?;
        work_dir.make_subdir("response/error")?;
        work_dir.make_subdir("response/steps")?;

        self.session.work_dir = Some(work_dir);
        Ok(())
    }

    /// Read the deployed code revision: a `REVISION` file in the app root,
    /// or failing that the basename of the `current` deployment symlink
    /// (Capistrano convention).
    fn infer_application_info(&mut self) {
        let app_root = Path::new(&self.session.config.app_root);
        let revision_file = app_root.join("REVISION");
        match fs::read_to_string(&revision_file) {
            Ok(contents) => {
                self.session.result.code_revision = contents.trim().to_string();
                return;
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(path = %revision_file.display(), error = %e, "cannot read REVISION file");
            }
        }

        if app_root.file_name().is_some_and(|name| name == "current") {
            match fs::read_link(app_root) {
                Ok(target) => {
                    if let Some(name) = target.file_name() {
                        self.session.result.code_revision =
                            name.to_string_lossy().into_owned();
                    }
                }
                // Not a symlink: nothing to infer.
                Err(e) if e.kind() == std::io::ErrorKind::InvalidInput => {}
                Err(e) => {
                    tracing::warn!(path = %app_root.display(), error = %e, "cannot read deployment symlink");
                }
            }
        }
    }

    async fn find_free_port(&mut self) -> Result<(), PrepareIssue> {
        let lookup = port::find_free_port(
            &self.session.context,
            self.started,
            self.session.timeout,
        )
        .await;
        match lookup {
            PortLookup::Found(port) => {
                self.session.expected_start_port = port;
                Ok(())
            }
            PortLookup::Exhausted => Err(PrepareIssue::Spawn(self.port_exhausted_error())),
            PortLookup::DeadlineExceeded => {
                Err(PrepareIssue::Spawn(self.port_timeout_error()))
            }
        }
    }

    fn port_timeout_error(&mut self) -> Box<SpawnError> {
        let _ = self
            .session
            .journey
            .set_step_errored(JourneyStep::Preparation, true);
        let range = self.session.context.port_range();
        let mut e = SpawnError::new(ErrorCategory::Timeout, self.session.journey.clone());
        e.set_problem_description_html(
            "<p>The Roost application server tried to look for a free TCP port for \
             the web application to start on. But this took too much time, so Roost \
             put a stop to that.</p>",
        );
        e.set_solution_description_html(format!(
            "<div class=\"multiple-solutions\"><h3>Check whether the server is low \
             on resources</h3><p>Maybe the server is currently so low on resources \
             that all the work that needed to be done could not finish within the \
             given time limit. If so, either increase the spawn timeout (currently \
             configured at {} sec) or find a way to lower the server's resource \
             utilization.</p><h3>Limit the port range that Roost searches in</h3>\
             <p>The port range is currently configured at {}-{}. If it contains \
             few free ports, configure a range that is known to have many.</p></div>",
            self.session.config.start_timeout_msec / 1000,
            range.start(),
            range.end(),
        ));
        e.finalize(&self.session.config)
    }

    fn port_exhausted_error(&mut self) -> Box<SpawnError> {
        let _ = self
            .session
            .journey
            .set_step_errored(JourneyStep::Preparation, true);
        let range = self.session.context.port_range();
        let mut e = SpawnError::new(ErrorCategory::Internal, self.session.journey.clone());
        e.set_summary("Could not find a free port to spawn the application on.");
        e.set_problem_description_html(
            "<p>The Roost application server tried to look for a free TCP port for \
             the web application to start on, but was unable to find one.</p>",
        );
        e.set_solution_description_html(format!(
            "<div class=\"sole-solutions\"><p>Maybe the port range in which Roost \
             tried to search for a free port had very few or no free ports. The \
             port range is currently configured at {}-{}; if needed, configure a \
             range that is known to have many free ports.</p></div>",
            range.start(),
            range.end(),
        ));
        e.finalize(&self.session.config)
    }

    fn prepare_predefined_args(&mut self) {
        let ctx = &self.session.context;
        self.args.insert(
            "roost_root".into(),
            json!(ctx.root_dir.to_string_lossy()),
        );
        self.args.insert("roost_version".into(), json!(ctx.version));
        self.args
            .insert("integration_mode".into(), json!(ctx.integration_mode));
        self.args.insert("gupid".into(), json!(self.session.result.gupid));
        self.args.insert("UNIX_PATH_MAX".into(), json!(UNIX_PATH_MAX));
        if self.session.config.generic_app || self.session.config.find_free_port {
            self.args
                .insert("expected_start_port".into(), json!(self.session.expected_start_port));
        }
        if !self.session.config.api_key.is_empty() {
            self.args
                .insert("connect_password".into(), json!(self.session.config.api_key));
        }
        if let Some(instance_dir) = &ctx.instance_dir {
            self.args
                .insert("instance_dir".into(), json!(instance_dir.to_string_lossy()));
            self.args.insert(
                "socket_dir".into(),
                json!(instance_dir.join("apps.s").to_string_lossy()),
            );
        }
    }

    fn prepare_args_from_app_config(&mut self) {
        if let Value::Object(fields) = self.session.config.fields_to_pass_to_app() {
            for (key, value) in fields {
                self.args.insert(key, value);
            }
        }
    }

    fn dump_args_into_work_dir(&mut self) -> Result<(), PrepareIssue> {
        let Some(work_dir) = &self.session.work_dir else {
            return Err(PrepareIssue::sys(
                ErrorCategory::Internal,
                "work directory missing while dumping spawn arguments",
            ));
        };
        let doc = Value::Object(self.args.clone());
        tracing::debug!(args = %doc, "spawn arguments prepared");

        let pretty = to_pretty(&doc);
        work_dir.write_file("args.json", &pretty)?;

        work_dir.make_subdir("args")?;
        for (key, value) in &self.args {
            match value {
                Value::Object(_) | Value::Array(_) => {
                    work_dir.write_file(&format!("args/{key}.json"), &to_pretty(value))?;
                }
                _ => {
                    work_dir.write_file(&format!("args/{key}"), &scalar_to_string(value))?;
                }
            }
        }
        Ok(())
    }

    fn adjust_timeout(&mut self) {
        self.session.timeout = self.session.timeout.saturating_sub(self.started.elapsed());
    }
}

/// Render a scalar argument the way shell scripts want to read it: no JSON
/// quoting, null as the empty string.
fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(true) => "true".to_string(),
        Value::Bool(false) => "false".to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        other => to_pretty(other),
    }
}

fn to_pretty(value: &Value) -> String {
    // Serializing a Value cannot fail; fall back to compact just in case.
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

/// When a user/group lookup yields nothing, an all-digits name is taken to
/// be a raw numeric id, with a warning. `lookup_error` is `None` when the
/// database simply has no such entry.
fn fall_back_to_numeric_id(
    name: &str,
    kind: &str,
    lookup_error: Option<nix::Error>,
) -> Result<u32, PrepareIssue> {
    let all_digits = !name.is_empty() && name.bytes().all(|b| b.is_ascii_digit());
    if all_digits {
        if let Ok(id) = name.parse::<u32>() {
            tracing::warn!(
                name,
                error = ?lookup_error,
                "cannot look up system {kind} database entry; assuming the name is a numeric id"
            );
            return Ok(id);
        }
    }
    Err(match lookup_error {
        None => PrepareIssue::sys(
            ErrorCategory::OperatingSystem,
            format!("The operating system {kind} '{name}' does not exist"),
        ),
        Some(errno) => PrepareIssue::sys(
            ErrorCategory::OperatingSystem,
            format!("Cannot look up system {kind} database entry for {kind} '{name}': {errno}"),
        ),
    })
}

#[cfg(test)]
#[path = "prepare_tests.rs"]
mod tests;
