//! Diagnostics scenarios: child-supplied error pages, env dumps, argument
//! dumps and work directory hygiene.

use crate::prelude::*;
use roost_core::JourneyType;
use roost_spawn::PerformOptions;

/// The child aborts with '0' after writing its own error description. HTML
/// files are taken verbatim; txt files are escaped.
#[tokio::test]
async fn child_supplied_error_pages_are_harvested() {
    let mut session = prepared_session(config(), JourneyType::SpawnDirectly, 48000..=48099).await;
    let child = spawn_app(
        &session,
        r#"
        printf 'the summary' > "$WORK_DIR/response/error/summary"
        printf 'the <problem>' > "$WORK_DIR/response/error/problem_description.txt"
        printf 'the <b>solution</b>' > "$WORK_DIR/response/error/solution_description.html"
        printf 'PATH=/bin' > "$WORK_DIR/envdump/envvars"
        printf 'went sideways' > "$WORK_DIR/envdump/annotations/phase"
        printf 0 > "$WORK_DIR/response/finish"
        sleep 5
        "#,
    );

    let err = roost_spawn::perform(&mut session, pid_of(&child), PerformOptions::default())
        .await
        .unwrap_err();
    reap(child);

    assert_eq!(err.summary(), "the summary");
    assert_eq!(err.problem_description_html(), "the &lt;problem&gt;");
    assert_eq!(err.solution_description_html(), "the <b>solution</b>");
    assert_eq!(err.subprocess_envvars(), "PATH=/bin");
    assert_eq!(err.annotations().get("phase").map(String::as_str), Some("went sideways"));
}

/// The dumped scalar args are readable by plain shell children and agree
/// with args.json.
#[tokio::test]
async fn children_can_read_scalar_args_without_a_json_parser() {
    let mut session = prepared_session(config(), JourneyType::SpawnDirectly, 48100..=48199).await;
    let gupid = session.result.gupid.clone();
    let child = spawn_app(
        &session,
        r#"
        cp "$WORK_DIR/args/gupid" "$WORK_DIR/response/error/summary"
        printf 0 > "$WORK_DIR/response/finish"
        "#,
    );

    let err = roost_spawn::perform(&mut session, pid_of(&child), PerformOptions::default())
        .await
        .unwrap_err();
    reap(child);

    assert_eq!(err.summary(), gupid);
}

/// The work directory disappears with the session, on failure paths too.
#[tokio::test]
async fn work_dir_is_gone_after_the_session_drops() {
    let mut session = prepared_session(config(), JourneyType::SpawnDirectly, 48200..=48299).await;
    let work_dir = session.work_dir.as_ref().unwrap().path().to_path_buf();
    let child = spawn_app(&session, "exit 1");

    let _ = roost_spawn::perform(&mut session, pid_of(&child), PerformOptions::default()).await;
    reap(child);

    assert!(work_dir.exists());
    drop(session);
    assert!(!work_dir.exists());
}
