//! Failure scenarios: premature exits, deadlines, and bad readiness reports.

use crate::prelude::*;
use roost_core::{ErrorCategory, JourneyStep, JourneyType};
use roost_spawn::PerformOptions;

#[tokio::test]
async fn premature_exit_without_any_handshake() {
    let mut session = prepared_session(config(), JourneyType::SpawnDirectly, 47600..=47699).await;
    let child = spawn_app(&session, "exit 1");

    let err = roost_spawn::perform(&mut session, pid_of(&child), PerformOptions::default())
        .await
        .unwrap_err();
    reap(child);

    assert_eq!(err.summary(), "The application process exited prematurely.");
    assert_eq!(
        err.journey().first_failed_step(),
        Some(JourneyStep::SubprocessBeforeFirstExec)
    );
}

#[tokio::test]
async fn slow_app_hits_the_deadline() {
    let mut cfg = config();
    cfg.start_timeout_msec = 50;
    let mut session = prepared_session(cfg, JourneyType::SpawnDirectly, 47700..=47799).await;
    let child = spawn_app(&session, "sleep 1");

    let err = roost_spawn::perform(&mut session, pid_of(&child), PerformOptions::default())
        .await
        .unwrap_err();
    reap(child);

    assert_eq!(err.category(), ErrorCategory::Timeout);
    assert!(err.summary().contains("timeout"), "{}", err.summary());
}

#[tokio::test]
async fn malformed_properties_report() {
    let mut session = prepared_session(config(), JourneyType::SpawnDirectly, 47800..=47899).await;
    let child = spawn_app(
        &session,
        r#"
        printf '{ "sockets": {} }' > "$WORK_DIR/response/properties.json"
        printf 1 > "$WORK_DIR/response/finish"
        sleep 5
        "#,
    );

    let err = roost_spawn::perform(&mut session, pid_of(&child), PerformOptions::default())
        .await
        .unwrap_err();
    reap(child);

    assert!(
        err.summary().contains("'sockets' must be an array"),
        "{}",
        err.summary()
    );
}

#[tokio::test]
async fn preloader_that_reports_no_command_sockets() {
    let mut session = prepared_session(config(), JourneyType::StartPreloader, 47900..=47999).await;
    let child = spawn_app(
        &session,
        r#"
        cat > "$WORK_DIR/response/properties.json" <<'EOF'
        { "sockets": [ { "address": "tcp://127.0.0.1:3000", "protocol": "http",
                         "concurrency": 1, "accept_http_requests": true } ] }
EOF
        printf 1 > "$WORK_DIR/response/finish"
        sleep 5
        "#,
    );

    let err = roost_spawn::perform(&mut session, pid_of(&child), PerformOptions::default())
        .await
        .unwrap_err();
    reap(child);

    assert!(
        err.summary()
            .contains("did not report any sockets to receive preloader commands on"),
        "{}",
        err.summary()
    );
}
