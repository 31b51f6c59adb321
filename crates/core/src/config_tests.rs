// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn valid_config() -> Config {
    Config {
        app_root: "/tmp/myapp".into(),
        start_command: "exec ./server".into(),
        app_type: "wsgi".into(),
        spawn_method: "direct".into(),
        user: "web".into(),
        group: "web".into(),
        ..Config::default()
    }
}

#[test]
fn valid_config_has_no_errors() {
    assert!(valid_config().validate().is_empty());
}

#[test]
fn missing_required_fields_are_all_reported() {
    let errors = Config::default().validate();
    for field in ["app_root", "start_command", "app_type", "spawn_method", "user", "group"] {
        assert!(
            errors.iter().any(|e| e.contains(field)),
            "expected an error about {field}: {errors:?}"
        );
    }
}

#[test]
fn startup_file_required_only_with_wrapper() {
    let mut config = valid_config();
    config.starts_using_wrapper = true;
    let errors = config.validate();
    assert!(errors.iter().any(|e| e.contains("startup_file")));

    config.generic_app = true;
    assert!(config.validate().is_empty());
}

#[test]
fn union_station_key_required_only_with_analytics() {
    let mut config = valid_config();
    config.analytics_support = true;
    assert!(config.validate().iter().any(|e| e.contains("union_station_key")));
    config.union_station_key = "key".into();
    assert!(config.validate().is_empty());
}

#[test]
fn zero_timeout_is_rejected() {
    let mut config = valid_config();
    config.start_timeout_msec = 0;
    assert!(config.validate().iter().any(|e| e.contains("start_timeout_msec")));
}

#[test]
fn app_fields_include_required_scalars() {
    let doc = valid_config().fields_to_pass_to_app();
    assert_eq!(doc["app_root"], "/tmp/myapp");
    assert_eq!(doc["start_command"], "exec ./server");
    assert_eq!(doc["app_env"], "production");
    assert_eq!(doc["base_uri"], "/");
    assert_eq!(doc["generic_app"], false);
}

#[test]
fn optional_fields_are_omitted_when_empty_or_zero() {
    let doc = valid_config().fields_to_pass_to_app();
    for key in [
        "process_title",
        "union_station_key",
        "sticky_session_id",
        "api_key",
        "group_uuid",
        "file_descriptor_ulimit",
    ] {
        assert!(doc.get(key).is_none(), "{key} should be omitted");
    }
}

#[test]
fn optional_fields_travel_when_set() {
    let mut config = valid_config();
    config.process_title = "roost: myapp".into();
    config.api_key = "secret".into();
    config.sticky_session_id = "abc".into();
    config.group_uuid = "uuid-1".into();
    config.file_descriptor_ulimit = 1024;
    let doc = config.fields_to_pass_to_app();
    assert_eq!(doc["process_title"], "roost: myapp");
    assert_eq!(doc["api_key"], "secret");
    assert_eq!(doc["sticky_session_id"], "abc");
    assert_eq!(doc["group_uuid"], "uuid-1");
    assert_eq!(doc["file_descriptor_ulimit"], 1024);
}

#[test]
fn union_station_key_gated_on_analytics() {
    let mut config = valid_config();
    config.union_station_key = "key".into();
    assert!(config.fields_to_pass_to_app().get("union_station_key").is_none());
    config.analytics_support = true;
    assert_eq!(config.fields_to_pass_to_app()["union_station_key"], "key");
}

#[test]
fn wrapper_fields_omitted_for_generic_apps() {
    let mut config = valid_config();
    config.generic_app = true;
    config.starts_using_wrapper = true;
    config.startup_file = "app.py".into();
    let doc = config.fields_to_pass_to_app();
    assert!(doc.get("starts_using_wrapper").is_none());
    assert!(doc.get("startup_file").is_none());
}

#[test]
fn startup_file_travels_with_wrapper() {
    let mut config = valid_config();
    config.starts_using_wrapper = true;
    config.startup_file = "app.py".into();
    let doc = config.fields_to_pass_to_app();
    assert_eq!(doc["starts_using_wrapper"], true);
    assert_eq!(doc["startup_file"], "app.py");
}

#[test]
fn environment_variables_preserve_insertion_order() {
    let mut config = valid_config();
    config.environment_variables.insert("ZEBRA".into(), "1".into());
    config.environment_variables.insert("ALPHA".into(), "2".into());
    let doc = config.fields_to_pass_to_app();
    let keys: Vec<&String> = doc["environment_variables"]
        .as_object()
        .unwrap()
        .keys()
        .collect();
    assert_eq!(keys, ["ZEBRA", "ALPHA"]);
}
