// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Readers for the child's side of the filesystem rendezvous: journey
//! progress, error diagnostics, environment dumps and the readiness report.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use roost_core::{escape_html, ErrorCategory, Journey, JourneyStep, SocketInfo, SpawnError, StepState};
use serde_json::Value;

/// Read a file as text, trimmed, if it exists and is readable.
pub(crate) fn read_trimmed(path: &Path) -> Option<String> {
    fs::read_to_string(path).ok().map(|s| s.trim().to_string())
}

fn read_raw(path: &Path) -> Option<String> {
    fs::read_to_string(path).ok()
}

/// A subprocess wrote something unparseable into a step state file.
#[derive(Debug)]
pub(crate) struct InvalidStepReport {
    pub file: PathBuf,
    pub content: String,
}

/// Fold the child-reported step states and durations from
/// `response/steps/<step>/` into the journey.
///
/// Child states are applied with force: the child knows better than our
/// bookkeeping how far it actually got. The `duration` file holds an integer
/// number of seconds; it is converted to the journey's microsecond-precision
/// representation here.
pub(crate) fn load_journey_state(
    journey: &mut Journey,
    response_dir: &Path,
) -> Result<(), InvalidStepReport> {
    for step in JourneyStep::subprocess_steps() {
        if !journey.has_step(*step) {
            continue;
        }
        let step_dir = response_dir.join("steps").join(step.as_str());
        let state_file = step_dir.join("state");
        let Some(raw) = read_trimmed(&state_file) else {
            continue;
        };
        let Some(state) = StepState::parse(&raw) else {
            let _ = journey.set_step_errored(*step, true);
            return Err(InvalidStepReport { file: state_file, content: raw });
        };
        if journey.step_info(*step).state != state {
            let _ = match state {
                StepState::NotStarted => Ok(()),
                StepState::InProgress => journey.set_step_in_progress(*step, true),
                StepState::Performed => journey.set_step_performed(*step, true),
                StepState::Errored => journey.set_step_errored(*step, true),
            };
        }
        if let Some(duration) = read_trimmed(&step_dir.join("duration")) {
            let seconds = duration.parse::<u64>().unwrap_or(0);
            journey.set_step_execution_duration(*step, Duration::from_secs(seconds));
        }
    }
    Ok(())
}

/// The child's `error/category` report: absent, valid, or garbage (carrying
/// the raw content for the error page).
pub(crate) enum ReportedCategory {
    Absent,
    Valid(ErrorCategory),
    Invalid { file: PathBuf, content: String },
}

pub(crate) fn reported_error_category(response_dir: &Path) -> ReportedCategory {
    let file = response_dir.join("error").join("category");
    match read_trimmed(&file) {
        None => ReportedCategory::Absent,
        Some(raw) => match ErrorCategory::parse(&raw) {
            ErrorCategory::Unknown => ReportedCategory::Invalid { file, content: raw },
            category => ReportedCategory::Valid(category),
        },
    }
}

/// Attach the child's own error messages and environment dumps to a spawn
/// error. HTML descriptions are preferred; plain-text fallbacks are
/// HTML-escaped.
pub(crate) fn load_subprocess_diagnostics(
    e: &mut SpawnError,
    response_dir: &Path,
    env_dump_dir: &Path,
) {
    let error_dir = response_dir.join("error");

    if let Some(summary) = read_trimmed(&error_dir.join("summary")) {
        e.set_summary(summary);
    }
    if e.advanced_problem_details().is_empty() {
        if let Some(details) = read_trimmed(&error_dir.join("advanced_problem_details")) {
            e.set_advanced_problem_details(details);
        }
    }
    if let Some(html) = read_raw(&error_dir.join("problem_description.html")) {
        e.set_problem_description_html(html);
    } else if let Some(text) = read_trimmed(&error_dir.join("problem_description.txt")) {
        e.set_problem_description_html(escape_html(&text));
    }
    if let Some(html) = read_raw(&error_dir.join("solution_description.html")) {
        e.set_solution_description_html(html);
    } else if let Some(text) = read_trimmed(&error_dir.join("solution_description.txt")) {
        e.set_solution_description_html(escape_html(&text));
    }

    if let Some(envvars) = read_raw(&env_dump_dir.join("envvars")) {
        e.set_subprocess_envvars(envvars);
    }
    if let Some(user_info) = read_raw(&env_dump_dir.join("user_info")) {
        e.set_subprocess_user_info(user_info);
    }
    if let Some(ulimits) = read_raw(&env_dump_dir.join("ulimits")) {
        e.set_subprocess_ulimits(ulimits);
    }

    load_annotations(e, env_dump_dir);
}

/// Attach `envdump/annotations/*` files as annotations keyed by basename.
pub(crate) fn load_annotations(e: &mut SpawnError, env_dump_dir: &Path) {
    let Ok(entries) = fs::read_dir(env_dump_dir.join("annotations")) else {
        return;
    };
    for entry in entries.flatten() {
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with('.') {
            continue;
        }
        if let Some(value) = read_trimmed(&entry.path()) {
            e.set_annotation(name, value);
        }
    }
}

/// Validate `properties.json` and extract its sockets.
///
/// `sockets_required` is false when readiness was already proven through
/// port pinging; the child may then omit the socket list entirely.
pub(crate) fn parse_properties(
    doc: &Value,
    sockets_required: bool,
) -> Result<Vec<SocketInfo>, Vec<String>> {
    let mut errors = Vec::new();

    let sockets = match doc.get("sockets") {
        None => {
            if sockets_required {
                errors.push("'sockets' must be specified".to_string());
                return Err(errors);
            }
            return Ok(Vec::new());
        }
        Some(Value::Array(sockets)) => sockets,
        Some(_) => {
            errors.push("'sockets' must be an array".to_string());
            return Err(errors);
        }
    };

    if sockets_required && sockets.is_empty() {
        errors.push("'sockets' must be non-empty".to_string());
        return Err(errors);
    }

    for (i, socket) in sockets.iter().enumerate() {
        if !socket.is_object() {
            errors.push(format!("'sockets[{i}]' must be an object"));
            continue;
        }
        check_string_field(socket, "address", i, true, &mut errors);
        check_string_field(socket, "protocol", i, true, &mut errors);
        check_string_field(socket, "description", i, false, &mut errors);
        match socket.get("concurrency") {
            None => errors.push(format!("'sockets[{i}].concurrency' must be specified")),
            Some(v) if !v.is_i64() => {
                errors.push(format!("'sockets[{i}].concurrency' must be an integer"));
            }
            Some(_) => {}
        }
        if let Some(v) = socket.get("accept_http_requests") {
            if !v.is_boolean() {
                errors.push(format!("'sockets[{i}].accept_http_requests' must be a boolean"));
            }
        }
    }

    if !errors.is_empty() {
        return Err(errors);
    }

    Ok(sockets
        .iter()
        .map(|socket| SocketInfo {
            address: string_field(socket, "address"),
            protocol: string_field(socket, "protocol"),
            concurrency: socket
                .get("concurrency")
                .and_then(Value::as_i64)
                .unwrap_or(0) as i32,
            accept_http_requests: socket
                .get("accept_http_requests")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            description: string_field(socket, "description"),
        })
        .collect())
}

fn string_field(socket: &Value, key: &str) -> String {
    socket
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn check_string_field(
    socket: &Value,
    key: &str,
    index: usize,
    required: bool,
    errors: &mut Vec<String>,
) {
    match socket.get(key) {
        None => {
            if required {
                errors.push(format!("'sockets[{index}].{key}' must be specified"));
            }
        }
        Some(Value::String(s)) => {
            if s.is_empty() {
                errors.push(format!("'sockets[{index}].{key}' must be non-empty"));
            }
        }
        Some(_) => errors.push(format!("'sockets[{index}].{key}' must be a string")),
    }
}

#[cfg(test)]
#[path = "response_tests.rs"]
mod tests;
