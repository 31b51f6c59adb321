// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Background capture of the subprocess's combined stdout and stderr.
//!
//! While the handshake is in progress the child's output is drained into an
//! in-memory buffer so that a failed spawn can attach it to the error page.
//! Reaching end-of-file doubles as a child-died signal for the main loop.

use std::io;
use std::os::fd::OwnedFd;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::io::AsyncReadExt;
use tokio::net::unix::pipe;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

/// Default cap on captured output.
pub const DEFAULT_CAPACITY: usize = 1024 * 1024;

#[derive(Default)]
struct CaptureState {
    data: Vec<u8>,
    end_reached: bool,
}

/// Drains a pipe read end on a background task, accumulating up to a size
/// cap. Once the cap is hit the pipe keeps being drained so the child never
/// blocks on a full pipe, but further bytes are discarded.
pub struct OutputCapturer {
    state: Arc<Mutex<CaptureState>>,
    handle: Option<JoinHandle<()>>,
}

impl OutputCapturer {
    /// Start draining `fd`. `already_read` seeds the buffer with bytes the
    /// caller consumed before handing the pipe over. `on_end` is notified
    /// when EOF is reached.
    pub fn start(
        fd: OwnedFd,
        already_read: &[u8],
        capacity: usize,
        on_end: Arc<Notify>,
    ) -> io::Result<Self> {
        let receiver = pipe::Receiver::from_file(std::fs::File::from(fd))?;
        let state = Arc::new(Mutex::new(CaptureState {
            data: already_read.to_vec(),
            end_reached: false,
        }));

        let task_state = Arc::clone(&state);
        let handle = tokio::spawn(async move {
            drain(receiver, task_state, capacity, on_end).await;
        });

        Ok(OutputCapturer { state, handle: Some(handle) })
    }

    /// The output captured so far, lossily decoded.
    pub fn data(&self) -> String {
        String::from_utf8_lossy(&self.state.lock().data).into_owned()
    }

    /// Whether the pipe reached end-of-file (the child closed its end,
    /// usually because it exited).
    pub fn end_reached(&self) -> bool {
        self.state.lock().end_reached
    }

    /// Stop draining. Idempotent and non-blocking; already-captured data
    /// stays available.
    pub fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

impl Drop for OutputCapturer {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn drain(
    mut receiver: pipe::Receiver,
    state: Arc<Mutex<CaptureState>>,
    capacity: usize,
    on_end: Arc<Notify>,
) {
    let mut chunk = [0u8; 8192];
    loop {
        match receiver.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => {
                let mut state = state.lock();
                let room = capacity.saturating_sub(state.data.len());
                let take = room.min(n);
                if take > 0 {
                    state.data.extend_from_slice(&chunk[..take]);
                }
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(_) => break,
        }
    }
    state.lock().end_reached = true;
    on_end.notify_one();
}

#[cfg(test)]
#[path = "capture_tests.rs"]
mod tests;
