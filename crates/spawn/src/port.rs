// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! TCP port probing and free-port allocation.
//!
//! Probing serves two masters: during preparation an *unreachable* port is a
//! free one worth handing to the app, and during the handshake a *reachable*
//! port means the app is up.

use std::net::{IpAddr, Ipv4Addr};
use std::time::{Duration, Instant};

use roost_core::Context;
use tokio::net::TcpStream;

/// How long a single connect attempt may take.
pub const PROBE_TIMEOUT: Duration = Duration::from_millis(100);

/// Try to establish a TCP connection, abandoning the attempt after
/// `timeout`. Returns whether something answered.
pub async fn ping_tcp_server(host: IpAddr, port: u16, timeout: Duration) -> bool {
    matches!(
        tokio::time::timeout(timeout, TcpStream::connect((host, port))).await,
        Ok(Ok(_))
    )
}

/// Outcome of walking the shared port pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortLookup {
    Found(u16),
    /// Every candidate in the range was taken.
    Exhausted,
    /// The spawn deadline expired while probing.
    DeadlineExceeded,
}

/// Walk the shared port counter looking for a free port.
///
/// Each candidate is double-probed on the loopback and wildcard addresses;
/// a port counts as free only when neither answers. `started`/`deadline`
/// bound the total search time against the spawn deadline.
pub async fn find_free_port(ctx: &Context, started: Instant, deadline: Duration) -> PortLookup {
    let max_tries = ctx.port_range_len();
    let mut try_count: u32 = 0;

    loop {
        let port = ctx.take_port_candidate();
        try_count += 1;

        let loopback_answers =
            ping_tcp_server(IpAddr::V4(Ipv4Addr::LOCALHOST), port, PROBE_TIMEOUT).await;
        let wildcard_answers = loopback_answers
            || ping_tcp_server(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port, PROBE_TIMEOUT).await;

        if !wildcard_answers {
            return PortLookup::Found(port);
        } else if try_count >= max_tries {
            return PortLookup::Exhausted;
        } else if started.elapsed() >= deadline {
            return PortLookup::DeadlineExceeded;
        }
    }
}

#[cfg(test)]
#[path = "port_tests.rs"]
mod tests;
