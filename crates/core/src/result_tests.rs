// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::time::Duration;

fn finished_result() -> SpawnResult {
    let mut result = SpawnResult::new();
    result.pid = Some(Pid::from_raw(1234));
    result.spawn_end_time = Some(SystemTime::now());
    result.spawn_end_time_monotonic = Some(Instant::now());
    result.sockets.push(SocketInfo {
        address: "tcp://127.0.0.1:3000".into(),
        protocol: "http".into(),
        concurrency: 1,
        accept_http_requests: true,
        description: String::new(),
    });
    result
}

#[test]
fn complete_result_validates_cleanly() {
    let (internal, app) = finished_result().validate();
    assert!(internal.is_empty(), "{internal:?}");
    assert!(app.is_empty(), "{app:?}");
}

#[test]
fn end_times_must_not_precede_start_times() {
    let mut result = finished_result();
    result.spawn_end_time = Some(result.spawn_start_time - Duration::from_secs(1));
    let (internal, _) = result.validate();
    assert!(internal.iter().any(|e| e.contains("spawn_end_time")));
}

#[test]
fn missing_pid_is_an_internal_error() {
    let mut result = finished_result();
    result.pid = None;
    let (internal, _) = result.validate();
    assert!(internal.iter().any(|e| e.contains("pid")));
}

#[test]
fn missing_sockets_are_an_app_supplied_error() {
    let mut result = finished_result();
    result.sockets.clear();
    let (internal, app) = result.validate();
    assert!(internal.is_empty());
    assert_eq!(app, ["sockets are not supplied"]);
}

#[test]
fn socket_field_violations_name_the_field_path() {
    let mut result = finished_result();
    result.sockets.push(SocketInfo { concurrency: -2, ..SocketInfo::default() });
    let (_, app) = result.validate();
    assert!(app.iter().any(|e| e.contains("'sockets[1].address'")));
    assert!(app.iter().any(|e| e.contains("'sockets[1].protocol'")));
    assert!(app.iter().any(|e| e.contains("'sockets[1].concurrency'")));
}

#[test]
fn gupid_is_generated_at_creation() {
    let result = SpawnResult::new();
    assert!(!result.gupid.is_empty());
    assert!(result.gupid.len() <= crate::id::GUPID_MAX_LEN);
}
