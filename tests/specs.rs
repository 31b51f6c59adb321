//! Workspace-level end-to-end scenario tests.
//!
//! Each scenario drives a full prepare + fork/exec + perform cycle against a
//! real shell child that plays the application's side of the filesystem
//! handshake.

#[path = "specs/handshake/mod.rs"]
mod handshake;
#[path = "specs/prelude.rs"]
mod prelude;
