// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Spawn configuration: the validated bag of parameters for one spawn.
//!
//! A subset of these fields is serialized and handed to the subprocess
//! during the handshake; each field carries its own inclusion rule (always,
//! only when meaningful, or only when non-empty / non-zero).

use indexmap::IndexMap;
use serde_json::{json, Map, Value};

/// Parameters for spawning one application process.
///
/// `validate` reports everything wrong at once instead of failing on the
/// first problem, so callers can surface a complete configuration report.
#[derive(Debug, Clone)]
pub struct Config {
    /// Root directory of the application. The start command runs from here.
    pub app_root: String,
    /// Log verbosity to forward to the subprocess.
    pub log_level: i32,
    /// Generic apps do not speak our handshake; readiness is inferred from
    /// TCP reachability alone.
    pub generic_app: bool,
    /// Whether a non-generic app is loaded through a wrapper script.
    /// Only used to pick error wording.
    pub starts_using_wrapper: bool,
    /// Whether the wrapper comes from a third party rather than from us.
    /// Only used to pick error wording.
    pub wrapper_supplied_by_third_party: bool,
    /// Whether to allocate a free TCP port for a non-generic app.
    /// (Always done for generic apps.)
    pub find_free_port: bool,
    /// Whether the subprocess should load shell startup files before exec.
    pub load_shell_envvars: bool,
    pub analytics_support: bool,
    /// Command that starts the app, the wrapper, or the preloader.
    pub start_command: String,
    /// The app's entry point file. Only meaningful with a wrapper.
    pub startup_file: String,
    /// Process title to set on the spawned application, if any.
    pub process_title: String,
    /// Application type name, e.g. "rack" or "node". Error wording only.
    pub app_type: String,
    /// Deployment environment name, e.g. "production".
    pub app_env: String,
    /// Spawn method: "smart" or "direct".
    pub spawn_method: String,
    /// Base URI the app is mounted on; "/" for the root.
    pub base_uri: String,
    /// UNIX user to run the app as.
    pub user: String,
    /// UNIX group to run the app as.
    pub group: String,
    /// Extra environment variables, in insertion order.
    pub environment_variables: IndexMap<String, String>,
    pub union_station_key: String,
    pub sticky_session_id: String,
    /// API key of the pool group the process will belong to. Doubles as the
    /// subprocess's connect password.
    pub api_key: String,
    pub group_uuid: String,
    /// Minimum uid from which entering LVE/CageFS is allowed.
    pub lve_min_uid: u32,
    /// File descriptor ulimit for the app; 0 leaves the limit untouched.
    pub file_descriptor_ulimit: u32,
    /// Spawn deadline in milliseconds.
    pub start_timeout_msec: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            app_root: String::new(),
            log_level: 3,
            generic_app: false,
            starts_using_wrapper: false,
            wrapper_supplied_by_third_party: false,
            find_free_port: false,
            load_shell_envvars: false,
            analytics_support: false,
            start_command: String::new(),
            startup_file: String::new(),
            process_title: String::new(),
            app_type: String::new(),
            app_env: "production".to_string(),
            spawn_method: String::new(),
            base_uri: "/".to_string(),
            user: String::new(),
            group: String::new(),
            environment_variables: IndexMap::new(),
            union_station_key: String::new(),
            sticky_session_id: String::new(),
            api_key: String::new(),
            group_uuid: String::new(),
            lve_min_uid: 500,
            file_descriptor_ulimit: 0,
            start_timeout_msec: 90_000,
        }
    }
}

impl Config {
    /// Check the configuration, returning every violation found.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        let require = |errors: &mut Vec<String>, value: &str, name: &str| {
            if value.is_empty() {
                errors.push(format!("'{name}' must be non-empty"));
            }
        };

        require(&mut errors, &self.app_root, "app_root");
        require(&mut errors, &self.start_command, "start_command");
        require(&mut errors, &self.app_type, "app_type");
        require(&mut errors, &self.app_env, "app_env");
        require(&mut errors, &self.spawn_method, "spawn_method");
        require(&mut errors, &self.base_uri, "base_uri");
        require(&mut errors, &self.user, "user");
        require(&mut errors, &self.group, "group");
        if !self.generic_app && self.starts_using_wrapper {
            require(&mut errors, &self.startup_file, "startup_file");
        }
        if self.analytics_support {
            require(&mut errors, &self.union_station_key, "union_station_key");
        }
        if self.start_timeout_msec == 0 {
            errors.push("'start_timeout_msec' must be greater than 0".to_string());
        }
        errors
    }

    /// The subset of fields handed to the subprocess during the handshake.
    ///
    /// Gating rules: wrapper-related fields are omitted for generic apps,
    /// optional identifiers only travel when non-empty, and the fd ulimit
    /// only when it actually changes something.
    pub fn fields_to_pass_to_app(&self) -> Value {
        let mut doc = Map::new();
        doc.insert("app_root".into(), json!(self.app_root));
        doc.insert("log_level".into(), json!(self.log_level));
        doc.insert("generic_app".into(), json!(self.generic_app));
        doc.insert("load_shell_envvars".into(), json!(self.load_shell_envvars));
        doc.insert("analytics_support".into(), json!(self.analytics_support));
        doc.insert("start_command".into(), json!(self.start_command));
        doc.insert("app_type".into(), json!(self.app_type));
        doc.insert("app_env".into(), json!(self.app_env));
        doc.insert("spawn_method".into(), json!(self.spawn_method));
        doc.insert("base_uri".into(), json!(self.base_uri));
        doc.insert("user".into(), json!(self.user));
        doc.insert("group".into(), json!(self.group));
        doc.insert(
            "environment_variables".into(),
            Value::Object(
                self.environment_variables
                    .iter()
                    .map(|(k, v)| (k.clone(), json!(v)))
                    .collect(),
            ),
        );

        if !self.generic_app {
            doc.insert("starts_using_wrapper".into(), json!(self.starts_using_wrapper));
            if self.starts_using_wrapper {
                doc.insert("startup_file".into(), json!(self.startup_file));
            }
        }
        if !self.process_title.is_empty() {
            doc.insert("process_title".into(), json!(self.process_title));
        }
        if self.analytics_support && !self.union_station_key.is_empty() {
            doc.insert("union_station_key".into(), json!(self.union_station_key));
        }
        if !self.sticky_session_id.is_empty() {
            doc.insert("sticky_session_id".into(), json!(self.sticky_session_id));
        }
        if !self.api_key.is_empty() {
            doc.insert("api_key".into(), json!(self.api_key));
        }
        if !self.group_uuid.is_empty() {
            doc.insert("group_uuid".into(), json!(self.group_uuid));
        }
        if self.file_descriptor_ulimit > 0 {
            doc.insert("file_descriptor_ulimit".into(), json!(self.file_descriptor_ulimit));
        }

        Value::Object(doc)
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
