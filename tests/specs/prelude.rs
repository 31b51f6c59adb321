//! Shared fixtures for the handshake scenario specs.

use std::process::{Child, Command, Stdio};
use std::sync::Arc;

use nix::unistd::{Gid, Group, Uid, User};
use roost_core::{Config, Context, JourneyStep, JourneyType};
use roost_spawn::HandshakeSession;

/// A context with a private port range per scenario run, so parallel specs
/// never fight over candidates.
pub fn context(port_range: std::ops::RangeInclusive<u16>) -> Arc<Context> {
    Arc::new(Context::new("/opt/roost", "1.0.0").with_port_range(port_range))
}

/// A valid config running as the current user.
pub fn config() -> Config {
    Config {
        app_root: "/tmp/myapp".to_string(),
        start_command: "echo hi".to_string(),
        app_type: "wsgi".to_string(),
        spawn_method: "direct".to_string(),
        user: User::from_uid(Uid::current()).unwrap().unwrap().name,
        group: Group::from_gid(Gid::current()).unwrap().unwrap().name,
        ..Config::default()
    }
}

/// Build a session and run the prepare phase, driving the parent-side
/// journey steps the way a real caller does.
pub async fn prepared_session(
    config: Config,
    journey_type: JourneyType,
    port_range: std::ops::RangeInclusive<u16>,
) -> HandshakeSession {
    assert!(config.validate().is_empty(), "config must be valid");
    let mut session = HandshakeSession::new(context(port_range), config, journey_type);
    session.journey.set_step_in_progress(JourneyStep::Preparation, false).unwrap();
    roost_spawn::prepare(&mut session).await.unwrap();
    session.journey.set_step_performed(JourneyStep::Preparation, false).unwrap();
    session.journey.set_step_in_progress(JourneyStep::HandshakePerform, false).unwrap();
    session
        .journey
        .set_step_in_progress(JourneyStep::SubprocessBeforeFirstExec, false)
        .unwrap();
    session
}

/// Spawn a shell child playing the application's side of the handshake.
/// The work directory path is exported as `$WORK_DIR`.
pub fn spawn_app(session: &HandshakeSession, script: &str) -> Child {
    let work_dir = session.work_dir.as_ref().unwrap().path();
    Command::new("sh")
        .arg("-c")
        .arg(script)
        .env("WORK_DIR", work_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .unwrap()
}

pub fn pid_of(child: &Child) -> nix::unistd::Pid {
    nix::unistd::Pid::from_raw(child.id() as i32)
}

/// Kill and reap a scenario child that may still be running.
pub fn reap(mut child: Child) {
    child.kill().ok();
    child.wait().ok();
}
