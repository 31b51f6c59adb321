// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Handshake phase 2: watch the spawned child until it is ready or dead.
//!
//! Four watchers run as peer tasks — process exit, the finish FIFO, TCP
//! pingability and the output capturer — and all report through one shared
//! state guarded by a mutex plus one wakeup [`Notify`]. The main loop sleeps
//! on the notify under the remaining deadline and re-evaluates the full
//! predicate on every wake; watcher firing order never decides the outcome,
//! only the predicate does.

use std::io::Read;
use std::os::fd::OwnedFd;
use std::os::unix::fs::OpenOptionsExt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::Pid;
use parking_lot::Mutex;
use roost_core::{
    wording, AppKind, ErrorCategory, JourneyStep, JourneyType, SocketInfo, SpawnError,
    SpawnResult,
};
use serde_json::Value;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::capture::{self, OutputCapturer};
use crate::port;
use crate::response::{self, InvalidStepReport, ReportedCategory};
use crate::session::HandshakeSession;

/// Grace period before harvesting diagnostics, letting the capturer drain
/// last-moment output.
const GRACE_SLEEP: Duration = Duration::from_millis(50);
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(20);
const FINISH_POLL_INTERVAL: Duration = Duration::from_millis(20);
const PING_RETRY_SLEEP: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum FinishState {
    #[default]
    NotFinished,
    Success,
    Error,
    InternalError,
}

#[derive(Default)]
struct WatchState {
    process_exited: bool,
    finish_state: FinishState,
    finish_error: Option<(ErrorCategory, String)>,
    socket_is_now_pingable: bool,
}

/// Optional inputs to [`HandshakePerform`].
#[derive(Default)]
pub struct PerformOptions {
    pub stdin_fd: Option<OwnedFd>,
    /// Read end of the child's combined stdout+stderr pipe.
    pub stdout_and_err_fd: Option<OwnedFd>,
    /// Output the caller already consumed before handing the pipe over.
    pub already_read: Vec<u8>,
}

/// Phase 2 orchestrator.
pub struct HandshakePerform<'a> {
    session: &'a mut HandshakeSession,
    pid: Pid,
    stdin_fd: Option<OwnedFd>,
    stdout_and_err_fd: Option<OwnedFd>,
    already_read: Vec<u8>,
    capturer: Option<OutputCapturer>,
    state: Arc<Mutex<WatchState>>,
    wakeup: Arc<Notify>,
    watchers: Vec<JoinHandle<()>>,
}

impl<'a> HandshakePerform<'a> {
    pub fn new(session: &'a mut HandshakeSession, pid: Pid, options: PerformOptions) -> Self {
        HandshakePerform {
            session,
            pid,
            stdin_fd: options.stdin_fd,
            stdout_and_err_fd: options.stdout_and_err_fd,
            already_read: options.already_read,
            capturer: None,
            state: Arc::new(Mutex::new(WatchState::default())),
            wakeup: Arc::new(Notify::new()),
            watchers: Vec::new(),
        }
    }

    /// Watch the child until it is ready, dead or out of time. Watchers are
    /// always stopped and joined before returning, on every path.
    ///
    /// The caller drives the `handshake_perform` journey step's own state,
    /// mirroring `prepare`.
    pub async fn execute(mut self) -> Result<SpawnResult, Box<SpawnError>> {
        if let Err(e) = self.initialize_stdio_capturing() {
            let err = self
                .startup_failure(
                    ErrorCategory::from_io(&e),
                    format!("Cannot start capturing the application's output: {e}"),
                )
                .await;
            self.shutdown().await;
            return Err(err);
        }
        self.start_watchers();

        let outcome = self.run().await;
        self.shutdown().await;
        outcome
    }

    async fn run(&mut self) -> Result<SpawnResult, Box<SpawnError>> {
        self.wait_until_spawning_finished().await?;
        let result = self.handle_response().await?;
        if let Err(invalid) =
            response::load_journey_state(&mut self.session.journey, &self.session.response_dir)
        {
            return Err(self.invalid_report_error("progress step state", invalid).await);
        }
        Ok(result)
    }

    // ------------------------------------------------------------------
    // Watchers
    // ------------------------------------------------------------------

    fn initialize_stdio_capturing(&mut self) -> std::io::Result<()> {
        let Some(fd) = &self.stdout_and_err_fd else {
            return Ok(());
        };
        let dup = fd.try_clone()?;
        self.capturer = Some(OutputCapturer::start(
            dup,
            &self.already_read,
            capture::DEFAULT_CAPACITY,
            Arc::clone(&self.wakeup),
        )?);
        Ok(())
    }

    fn start_watchers(&mut self) {
        self.watchers.push(tokio::spawn(watch_process_exit(
            self.pid,
            Arc::clone(&self.state),
            Arc::clone(&self.wakeup),
        )));
        if self.session.config.generic_app || self.session.config.find_free_port {
            self.watchers.push(tokio::spawn(watch_socket_pingability(
                self.session.expected_start_port,
                Arc::clone(&self.state),
                Arc::clone(&self.wakeup),
            )));
        }
        if !self.session.config.generic_app {
            self.watchers.push(tokio::spawn(watch_finish_signal(
                self.session.finish_fifo_path(),
                Arc::clone(&self.state),
                Arc::clone(&self.wakeup),
            )));
        }
    }

    async fn shutdown(&mut self) {
        for handle in self.watchers.drain(..) {
            handle.abort();
            let _ = handle.await;
        }
        if let Some(capturer) = &mut self.capturer {
            capturer.stop();
        }
    }

    // ------------------------------------------------------------------
    // Main coordination loop
    // ------------------------------------------------------------------

    async fn wait_until_spawning_finished(&mut self) -> Result<(), Box<SpawnError>> {
        loop {
            let (process_exited, finish_state, socket_pingable) = {
                let state = self.state.lock();
                (state.process_exited, state.finish_state, state.socket_is_now_pingable)
            };
            let output_ended = self.capturer.as_ref().is_some_and(|c| c.end_reached());

            // A child that exited wins over any success signal latched in the
            // same interval: exiting before the handshake completed is a
            // failure even if the exit status was zero.
            if output_ended || process_exited {
                return Err(self.child_died_error().await);
            }
            if self.session.timeout.is_zero() {
                return Err(self.timeout_error().await);
            }

            let generic = self.session.config.generic_app;
            let done = (generic && socket_pingable)
                || (!generic && finish_state != FinishState::NotFinished);
            if done {
                return Ok(());
            }

            let begin = Instant::now();
            let _ = tokio::time::timeout(self.session.timeout, self.wakeup.notified()).await;
            self.session.timeout = self.session.timeout.saturating_sub(begin.elapsed());
        }
    }

    async fn handle_response(&mut self) -> Result<SpawnResult, Box<SpawnError>> {
        let (finish_state, socket_pingable, finish_error) = {
            let state = self.state.lock();
            (state.finish_state, state.socket_is_now_pingable, state.finish_error.clone())
        };
        match finish_state {
            FinishState::Success => self.handle_success_response(socket_pingable).await,
            FinishState::Error => Err(self.error_response_error().await),
            FinishState::InternalError => Err(self.internal_error(finish_error).await),
            FinishState::NotFinished => {
                let message =
                    "the spawning coordination loop finished in an unexpected state";
                Err(self.startup_failure(ErrorCategory::Internal, message).await)
            }
        }
    }

    // ------------------------------------------------------------------
    // Success handling
    // ------------------------------------------------------------------

    async fn handle_success_response(
        &mut self,
        socket_pingable: bool,
    ) -> Result<SpawnResult, Box<SpawnError>> {
        self.session.result.pid = Some(self.pid);
        self.session.result.stdin_fd = self.stdin_fd.take();
        self.session.result.stdout_and_err_fd = self.stdout_and_err_fd.take();
        self.session.result.spawn_end_time = Some(SystemTime::now());
        self.session.result.spawn_end_time_monotonic = Some(Instant::now());

        if socket_pingable {
            self.session.result.sockets.push(SocketInfo {
                address: format!("tcp://127.0.0.1:{}", self.session.expected_start_port),
                protocol: "http".to_string(),
                concurrency: -1,
                accept_http_requests: true,
                description: String::new(),
            });
        }

        let properties_path = self.session.response_dir.join("properties.json");
        if properties_path.exists() {
            self.load_result_properties(&properties_path, !socket_pingable).await?;

            let journey_type = self.session.journey.journey_type();
            if journey_type == JourneyType::StartPreloader
                && !self.session.result.sockets.iter().any(|s| s.protocol == "preloader")
            {
                return Err(
                    self.missing_sockets_error(wording::ResponseFault::NoPreloaderSockets).await
                );
            } else if journey_type != JourneyType::StartPreloader
                && !self.session.result.sockets.iter().any(|s| s.accept_http_requests)
            {
                return Err(
                    self.missing_sockets_error(wording::ResponseFault::NoHttpSockets).await
                );
            }
        }

        let (internal_errors, app_errors) = self.session.result.validate();
        if !internal_errors.is_empty() || !app_errors.is_empty() {
            return Err(self.validation_errors_error(internal_errors, app_errors).await);
        }

        Ok(std::mem::take(&mut self.session.result))
    }

    async fn load_result_properties(
        &mut self,
        path: &std::path::Path,
        sockets_required: bool,
    ) -> Result<(), Box<SpawnError>> {
        // The existence check already happened; a read failure here is a
        // filesystem problem of ours, not a malformed response.
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) => {
                let message = format!("Cannot read {}: {e}", path.display());
                return Err(self.startup_failure(ErrorCategory::from_io(&e), message).await);
            }
        };
        let doc: Value = match serde_json::from_str(&raw) {
            Ok(doc) => doc,
            Err(e) => {
                let errors = vec![format!("Error parsing {}: {e}", path.display())];
                return Err(self.validation_errors_error(Vec::new(), errors).await);
            }
        };
        match response::parse_properties(&doc, sockets_required) {
            Ok(sockets) => {
                self.session.result.sockets.extend(sockets);
                Ok(())
            }
            Err(mut errors) => {
                errors.insert(
                    0,
                    format!("The following errors were detected in {}:", path.display()),
                );
                Err(self.validation_errors_error(Vec::new(), errors).await)
            }
        }
    }

    // ------------------------------------------------------------------
    // Failure construction
    // ------------------------------------------------------------------

    fn stdout_err_data(&self) -> String {
        match &self.capturer {
            Some(capturer) => capturer.data(),
            None => "(not available)".to_string(),
        }
    }

    async fn sleep_shortly_to_capture_more_output(&self) {
        tokio::time::sleep(GRACE_SLEEP).await;
    }

    /// Reload child-reported journey state; a garbled report becomes its own
    /// spawn error.
    fn reload_journey_state(&mut self) -> Result<(), InvalidStepReport> {
        response::load_journey_state(&mut self.session.journey, &self.session.response_dir)
    }

    /// Category reported by the child, or `default`; a garbled report
    /// becomes its own spawn error.
    fn reported_category_or(
        &mut self,
        default: ErrorCategory,
    ) -> Result<ErrorCategory, (PathBuf, String)> {
        match response::reported_error_category(&self.session.response_dir) {
            ReportedCategory::Absent => Ok(default),
            ReportedCategory::Valid(category) => Ok(category),
            ReportedCategory::Invalid { file, content } => Err((file, content)),
        }
    }

    async fn child_died_error(&mut self) -> Box<SpawnError> {
        self.sleep_shortly_to_capture_more_output().await;
        if let Err(invalid) = self.reload_journey_state() {
            return self.invalid_report_error("progress step state", invalid).await;
        }
        if self.session.journey.first_failed_step().is_none() {
            let _ = self
                .session
                .journey
                .set_step_errored(JourneyStep::SubprocessBeforeFirstExec, true);
        }

        let category = match self.reported_category_or(ErrorCategory::Internal) {
            Ok(category) => category,
            Err((file, content)) => {
                return self
                    .invalid_report_error(
                        "error category",
                        InvalidStepReport { file, content },
                    )
                    .await;
            }
        };
        let mut e = SpawnError::new(category, self.session.journey.clone());
        e.set_summary("The application process exited prematurely.");
        e.set_stdout_and_err_data(self.stdout_err_data());
        response::load_subprocess_diagnostics(
            &mut e,
            &self.session.response_dir,
            &self.session.env_dump_dir,
        );
        e.finalize(&self.session.config)
    }

    async fn timeout_error(&mut self) -> Box<SpawnError> {
        self.sleep_shortly_to_capture_more_output().await;
        let _ = self
            .session
            .journey
            .set_step_errored(JourneyStep::HandshakePerform, true);
        if let Err(invalid) = self.reload_journey_state() {
            return self.invalid_report_error("progress step state", invalid).await;
        }
        let mut e = SpawnError::new(ErrorCategory::Timeout, self.session.journey.clone());
        e.set_stdout_and_err_data(self.stdout_err_data());
        response::load_subprocess_diagnostics(
            &mut e,
            &self.session.response_dir,
            &self.session.env_dump_dir,
        );
        e.finalize(&self.session.config)
    }

    /// The child committed `'0'` into the finish FIFO.
    async fn error_response_error(&mut self) -> Box<SpawnError> {
        self.sleep_shortly_to_capture_more_output().await;
        if let Err(invalid) = self.reload_journey_state() {
            return self.invalid_report_error("progress step state", invalid).await;
        }
        if self.session.journey.first_failed_step().is_none() {
            // The child did not say which step failed; blame the most
            // specific load step present on this journey.
            for step in [
                JourneyStep::SubprocessWrapperPreparation,
                JourneyStep::SubprocessAppLoadOrExec,
                JourneyStep::SubprocessPrepareAfterForkingFromPreloader,
            ] {
                if self.session.journey.has_step(step) {
                    let _ = self.session.journey.set_step_errored(step, true);
                    break;
                }
            }
        }

        let category = match self.reported_category_or(ErrorCategory::Internal) {
            Ok(category) => category,
            Err((file, content)) => {
                return self
                    .invalid_report_error(
                        "error category",
                        InvalidStepReport { file, content },
                    )
                    .await;
            }
        };
        let mut e = SpawnError::new(category, self.session.journey.clone());
        e.set_summary("The web application aborted with an error during startup.");
        e.set_stdout_and_err_data(self.stdout_err_data());
        response::load_subprocess_diagnostics(
            &mut e,
            &self.session.response_dir,
            &self.session.env_dump_dir,
        );
        e.finalize(&self.session.config)
    }

    /// The finish-signal watcher itself failed.
    async fn internal_error(
        &mut self,
        finish_error: Option<(ErrorCategory, String)>,
    ) -> Box<SpawnError> {
        self.sleep_shortly_to_capture_more_output().await;
        let _ = self
            .session
            .journey
            .set_step_errored(JourneyStep::HandshakePerform, true);
        if let Err(invalid) = self.reload_journey_state() {
            return self.invalid_report_error("progress step state", invalid).await;
        }
        let (category, message) = finish_error.unwrap_or((
            ErrorCategory::Internal,
            "the finish signal watcher failed without details".to_string(),
        ));
        let mut e = SpawnError::new(category, self.session.journey.clone());
        e.set_summary(format!(
            "An internal error occurred while spawning an application process: {message}"
        ));
        e.set_advanced_problem_details(message);
        e.set_stdout_and_err_data(self.stdout_err_data());
        e.finalize(&self.session.config)
    }

    /// The response finished but named no socket of the required protocol.
    async fn missing_sockets_error(&mut self, fault: wording::ResponseFault) -> Box<SpawnError> {
        self.sleep_shortly_to_capture_more_output().await;
        let step = if !self.session.config.generic_app && self.session.config.starts_using_wrapper
        {
            JourneyStep::SubprocessWrapperPreparation
        } else {
            JourneyStep::SubprocessAppLoadOrExec
        };
        let _ = self.session.journey.set_step_errored(step, true);
        if let Err(invalid) = self.reload_journey_state() {
            return self.invalid_report_error("progress step state", invalid).await;
        }

        let kind = AppKind::of(&self.session.config);
        let mut e = SpawnError::new(ErrorCategory::Internal, self.session.journey.clone());
        e.set_summary(wording::fault_summary(kind, fault, ""));
        e.set_problem_description_html(wording::fault_problem_html(kind, fault, &[]));
        e.set_solution_description_html(wording::fault_solution_html(kind, &self.session.config));
        e.set_stdout_and_err_data(self.stdout_err_data());
        response::load_annotations(&mut e, &self.session.env_dump_dir);
        e.finalize(&self.session.config)
    }

    /// The spawn result failed validation, through our fault or the child's.
    async fn validation_errors_error(
        &mut self,
        internal_errors: Vec<String>,
        app_errors: Vec<String>,
    ) -> Box<SpawnError> {
        self.sleep_shortly_to_capture_more_output().await;

        if !internal_errors.is_empty() {
            let _ = self
                .session
                .journey
                .set_step_errored(JourneyStep::HandshakePerform, true);
            if let Err(invalid) = self.reload_journey_state() {
                return self.invalid_report_error("progress step state", invalid).await;
            }
            let joined = internal_errors.join(", ");
            let mut e =
                SpawnError::new(ErrorCategory::Internal, self.session.journey.clone());
            e.set_summary(wording::internal_validation_summary(&joined));
            e.set_advanced_problem_details(joined);
            e.set_problem_description_html(problem_list_html(
                "<p>The Roost application server tried to start the web application, \
                 but encountered a bug in Roost itself. The errors are as follows:</p>",
                &internal_errors,
            ));
            e.set_solution_description_html(wording::fault_solution_html(
                AppKind::OurWrapper,
                &self.session.config,
            ));
            e.set_stdout_and_err_data(self.stdout_err_data());
            return e.finalize(&self.session.config);
        }

        let step = if !self.session.config.generic_app && self.session.config.starts_using_wrapper
        {
            JourneyStep::SubprocessWrapperPreparation
        } else {
            JourneyStep::SubprocessAppLoadOrExec
        };
        let _ = self.session.journey.set_step_errored(step, true);
        if let Err(invalid) = self.reload_journey_state() {
            return self.invalid_report_error("progress step state", invalid).await;
        }

        let kind = AppKind::of(&self.session.config);
        let joined = app_errors.join(", ");
        let mut e = SpawnError::new(ErrorCategory::Internal, self.session.journey.clone());
        e.set_summary(wording::fault_summary(
            kind,
            wording::ResponseFault::InvalidResponse,
            &joined,
        ));
        e.set_advanced_problem_details(joined);
        e.set_problem_description_html(wording::fault_problem_html(
            kind,
            wording::ResponseFault::InvalidResponse,
            &app_errors,
        ));
        e.set_solution_description_html(wording::fault_solution_html(kind, &self.session.config));
        e.set_stdout_and_err_data(self.stdout_err_data());
        response::load_annotations(&mut e, &self.session.env_dump_dir);
        e.finalize(&self.session.config)
    }

    /// The child reported progress or a category in an unreadable format.
    async fn invalid_report_error(
        &mut self,
        what: &str,
        invalid: InvalidStepReport,
    ) -> Box<SpawnError> {
        let kind = AppKind::of(&self.session.config);
        let mut e = SpawnError::new(ErrorCategory::Internal, self.session.journey.clone());
        e.set_summary(wording::invalid_report_summary(kind, what, &invalid.content));
        e.set_problem_description_html(wording::invalid_report_problem_html(
            kind,
            &invalid.file.display().to_string(),
            &invalid.content,
        ));
        e.set_solution_description_html(wording::fault_solution_html(kind, &self.session.config));
        e.set_stdout_and_err_data(self.stdout_err_data());
        response::load_annotations(&mut e, &self.session.env_dump_dir);
        e.finalize(&self.session.config)
    }

    /// A failure in the perform machinery itself (not the child).
    async fn startup_failure(
        &mut self,
        category: ErrorCategory,
        message: impl Into<String>,
    ) -> Box<SpawnError> {
        self.sleep_shortly_to_capture_more_output().await;
        let _ = self
            .session
            .journey
            .set_step_errored(JourneyStep::HandshakePerform, true);
        // Best effort: a garbled child report must not mask this failure.
        let _ = self.reload_journey_state();
        let mut e = SpawnError::new(category, self.session.journey.clone());
        e.set_summary(message.into());
        e.set_stdout_and_err_data(self.stdout_err_data());
        e.finalize(&self.session.config)
    }
}

fn problem_list_html(intro: &str, items: &[String]) -> String {
    let mut html = intro.to_string();
    html.push_str("<ul>");
    for item in items {
        html.push_str("<li>");
        html.push_str(&roost_core::escape_html(item));
        html.push_str("</li>");
    }
    html.push_str("</ul>");
    html
}

// ----------------------------------------------------------------------
// Watcher tasks
// ----------------------------------------------------------------------

/// Poll for child exit. EPERM counts as exited (the pid is no longer ours
/// to query); ECHILD means the pid is not our child at all, in which case
/// there is nothing to watch.
async fn watch_process_exit(pid: Pid, state: Arc<Mutex<WatchState>>, wakeup: Arc<Notify>) {
    loop {
        match waitpid(pid, Some(WaitPidFlag::WNOHANG)) {
            Ok(WaitStatus::Exited(..)) | Ok(WaitStatus::Signaled(..)) | Err(Errno::EPERM) => {
                state.lock().process_exited = true;
                wakeup.notify_one();
                return;
            }
            Ok(_) => tokio::time::sleep(EXIT_POLL_INTERVAL).await,
            Err(Errno::EINTR) => {}
            Err(_) => return,
        }
    }
}

/// Wait for the child's one-byte commit on the finish FIFO.
///
/// The FIFO is opened read-write so that our own handle keeps a writer
/// alive: reads then block (well, poll) until the child actually writes,
/// instead of hitting a spurious EOF.
async fn watch_finish_signal(path: PathBuf, state: Arc<Mutex<WatchState>>, wakeup: Arc<Notify>) {
    let open_result = std::fs::OpenOptions::new()
        .read(true)
        .write(true)
        .custom_flags(OFlag::O_NONBLOCK.bits())
        .open(&path);
    let mut fifo = match open_result {
        Ok(fifo) => fifo,
        Err(e) => {
            let mut state = state.lock();
            state.finish_state = FinishState::InternalError;
            state.finish_error = Some((
                ErrorCategory::from_io(&e),
                format!("Error opening FIFO {}: {e}", path.display()),
            ));
            drop(state);
            wakeup.notify_one();
            return;
        }
    };

    let mut buf = [0u8; 1];
    loop {
        match fifo.read(&mut buf) {
            Ok(0) => tokio::time::sleep(FINISH_POLL_INTERVAL).await,
            Ok(_) => {
                let mut state = state.lock();
                state.finish_state = if buf[0] == b'1' {
                    FinishState::Success
                } else {
                    FinishState::Error
                };
                drop(state);
                wakeup.notify_one();
                return;
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                tokio::time::sleep(FINISH_POLL_INTERVAL).await;
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
            Err(e) => {
                let mut state = state.lock();
                state.finish_state = FinishState::InternalError;
                state.finish_error = Some((
                    ErrorCategory::from_io(&e),
                    format!("Error reading from FIFO {}: {e}", path.display()),
                ));
                drop(state);
                wakeup.notify_one();
                return;
            }
        }
    }
}

/// Poll TCP reachability of the expected start port. Success also latches
/// the overall finish state; the generic-app path has no finish FIFO.
async fn watch_socket_pingability(
    port: u16,
    state: Arc<Mutex<WatchState>>,
    wakeup: Arc<Notify>,
) {
    loop {
        let reachable = port::ping_tcp_server(
            std::net::IpAddr::V4(std::net::Ipv4Addr::LOCALHOST),
            port,
            port::PROBE_TIMEOUT,
        )
        .await;
        if reachable {
            let mut state = state.lock();
            state.socket_is_now_pingable = true;
            state.finish_state = FinishState::Success;
            drop(state);
            wakeup.notify_one();
            return;
        }
        tokio::time::sleep(PING_RETRY_SLEEP).await;
    }
}

#[cfg(test)]
#[path = "perform_tests.rs"]
mod tests;
