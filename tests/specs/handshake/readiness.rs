//! Readiness scenarios: generic TCP pingability and the finish-signal path.

use crate::prelude::*;
use roost_core::{JourneyStep, JourneyType, StepState};
use roost_spawn::PerformOptions;

/// A generic app never touches the handshake files; readiness is inferred
/// purely from the allocated port becoming reachable.
#[tokio::test]
async fn generic_app_becomes_ready_through_its_port() {
    let mut cfg = config();
    cfg.generic_app = true;
    cfg.start_command = "./server --port $PORT".to_string();
    let mut session = prepared_session(cfg, JourneyType::SpawnDirectly, 47400..=47499).await;

    let port = session.expected_start_port;
    let _server = std::net::TcpListener::bind(("127.0.0.1", port)).unwrap();
    let child = spawn_app(&session, "sleep 5");

    let result = roost_spawn::perform(&mut session, pid_of(&child), PerformOptions::default())
        .await
        .unwrap();
    reap(child);

    assert_eq!(result.sockets.len(), 1);
    assert_eq!(result.sockets[0].address, format!("tcp://127.0.0.1:{port}"));
    assert_eq!(result.sockets[0].protocol, "http");
    assert_eq!(result.sockets[0].concurrency, -1);
    assert!(result.sockets[0].accept_http_requests);
}

/// A handshake-aware app reports its sockets in properties.json, marks its
/// progress, and commits with '1' on the finish FIFO.
#[tokio::test]
async fn finish_success_with_properties_mirrors_the_report() {
    let mut session = prepared_session(config(), JourneyType::SpawnDirectly, 47500..=47599).await;

    let child = spawn_app(
        &session,
        r#"
        cat > "$WORK_DIR/response/properties.json" <<'EOF'
        { "sockets": [ { "address": "tcp://127.0.0.1:3000", "protocol": "http",
                         "concurrency": 1, "accept_http_requests": true } ] }
EOF
        mkdir -p "$WORK_DIR/response/steps/subprocess_listen"
        printf STEP_PERFORMED > "$WORK_DIR/response/steps/subprocess_listen/state"
        printf 1 > "$WORK_DIR/response/finish"
        sleep 5
        "#,
    );

    let result = roost_spawn::perform(&mut session, pid_of(&child), PerformOptions::default())
        .await
        .unwrap();
    reap(child);

    assert_eq!(result.sockets.len(), 1);
    assert_eq!(result.sockets[0].address, "tcp://127.0.0.1:3000");
    assert_eq!(result.sockets[0].protocol, "http");
    assert_eq!(result.sockets[0].concurrency, 1);
    assert!(result.sockets[0].accept_http_requests);

    assert_eq!(
        session.journey.step_info(JourneyStep::SubprocessListen).state,
        StepState::Performed
    );
    assert!(result.spawn_end_time.unwrap() >= result.spawn_start_time);
    assert!(result.spawn_end_time_monotonic.unwrap() >= result.spawn_start_time_monotonic);
}
