// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::io::Write;
use std::time::Duration;

fn make_pipe() -> (OwnedFd, std::fs::File) {
    let (read_end, write_end) = nix::unistd::pipe().unwrap();
    (read_end, std::fs::File::from(write_end))
}

async fn wait_for_end(capturer: &OutputCapturer) {
    for _ in 0..200 {
        if capturer.end_reached() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("capturer never reached end of output");
}

#[tokio::test]
async fn captures_until_eof() {
    let (read_end, mut write_end) = make_pipe();
    let notify = Arc::new(Notify::new());
    let capturer =
        OutputCapturer::start(read_end, b"", DEFAULT_CAPACITY, Arc::clone(&notify)).unwrap();

    write_end.write_all(b"hi\n").unwrap();
    drop(write_end);

    wait_for_end(&capturer).await;
    assert_eq!(capturer.data(), "hi\n");
}

#[tokio::test]
async fn preloaded_bytes_come_first() {
    let (read_end, mut write_end) = make_pipe();
    let capturer =
        OutputCapturer::start(read_end, b"early ", DEFAULT_CAPACITY, Arc::new(Notify::new()))
            .unwrap();

    write_end.write_all(b"late").unwrap();
    drop(write_end);

    wait_for_end(&capturer).await;
    assert_eq!(capturer.data(), "early late");
}

#[tokio::test]
async fn eof_notifies_the_given_wakeup() {
    let (read_end, write_end) = make_pipe();
    let notify = Arc::new(Notify::new());
    let capturer =
        OutputCapturer::start(read_end, b"", DEFAULT_CAPACITY, Arc::clone(&notify)).unwrap();

    let notified = notify.notified();
    drop(write_end);
    tokio::time::timeout(Duration::from_secs(2), notified)
        .await
        .expect("wakeup should fire on EOF");
    assert!(capturer.end_reached());
}

#[tokio::test]
async fn capacity_caps_the_buffer_but_draining_continues() {
    let (read_end, mut write_end) = make_pipe();
    let capturer = OutputCapturer::start(read_end, b"", 4, Arc::new(Notify::new())).unwrap();

    write_end.write_all(b"abcdefgh").unwrap();
    drop(write_end);

    wait_for_end(&capturer).await;
    assert_eq!(capturer.data(), "abcd");
}

#[tokio::test]
async fn stop_is_idempotent_and_keeps_data() {
    let (read_end, mut write_end) = make_pipe();
    let mut capturer =
        OutputCapturer::start(read_end, b"", DEFAULT_CAPACITY, Arc::new(Notify::new())).unwrap();

    write_end.write_all(b"kept").unwrap();
    drop(write_end);
    wait_for_end(&capturer).await;

    capturer.stop();
    capturer.stop();
    assert_eq!(capturer.data(), "kept");
}
