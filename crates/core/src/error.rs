// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Structured spawn failure: category, operator-facing wording, and all
//! diagnostics harvested from the subprocess.
//!
//! Problem and solution texts depend on two axes: who supplied the startup
//! code (us, a third-party wrapper, or the application itself) and what went
//! wrong. The combinations live in the `wording` table below rather than in
//! nested conditionals at the failure sites.

use indexmap::IndexMap;

use crate::category::ErrorCategory;
use crate::config::Config;
use crate::journey::Journey;

/// Escape a user-supplied string for embedding in problem/solution HTML.
pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Who supplied the code whose startup sequence failed. Picks the error
/// wording variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppKind {
    /// App does not speak our handshake at all.
    Generic,
    /// App speaks our handshake directly, no wrapper.
    Direct,
    /// App is loaded through a wrapper that we ship.
    OurWrapper,
    /// App is loaded through a wrapper someone else ships.
    ThirdPartyWrapper,
}

impl AppKind {
    pub fn of(config: &Config) -> Self {
        if config.generic_app {
            AppKind::Generic
        } else if !config.starts_using_wrapper {
            AppKind::Direct
        } else if config.wrapper_supplied_by_third_party {
            AppKind::ThirdPartyWrapper
        } else {
            AppKind::OurWrapper
        }
    }
}

/// A failed spawn, with everything an operator needs to diagnose it.
#[derive(Debug, thiserror::Error)]
#[error("{summary}")]
pub struct SpawnError {
    category: ErrorCategory,
    summary: String,
    advanced_problem_details: String,
    problem_description_html: String,
    solution_description_html: String,
    journey: Journey,
    stdout_and_err_data: String,
    subprocess_envvars: String,
    subprocess_user_info: String,
    subprocess_ulimits: String,
    annotations: IndexMap<String, String>,
}

impl SpawnError {
    pub fn new(category: ErrorCategory, journey: Journey) -> Self {
        SpawnError {
            category,
            summary: String::new(),
            advanced_problem_details: String::new(),
            problem_description_html: String::new(),
            solution_description_html: String::new(),
            journey,
            stdout_and_err_data: String::new(),
            subprocess_envvars: String::new(),
            subprocess_user_info: String::new(),
            subprocess_ulimits: String::new(),
            annotations: IndexMap::new(),
        }
    }

    /// Fill any wording still unset with defaults derived from the category
    /// and the app kind. Call this exactly once, last.
    pub fn finalize(mut self, config: &Config) -> Box<Self> {
        if self.summary.is_empty() {
            self.summary = self.category.default_summary().to_string();
        }
        if self.problem_description_html.is_empty() {
            self.problem_description_html =
                format!("<p>{}</p>", escape_html(&self.summary));
        }
        if self.solution_description_html.is_empty() {
            self.solution_description_html =
                wording::default_solution(self.category, AppKind::of(config), config);
        }
        Box::new(self)
    }

    pub fn category(&self) -> ErrorCategory {
        self.category
    }

    pub fn summary(&self) -> &str {
        &self.summary
    }

    pub fn set_summary(&mut self, summary: impl Into<String>) {
        self.summary = summary.into();
    }

    pub fn advanced_problem_details(&self) -> &str {
        &self.advanced_problem_details
    }

    pub fn set_advanced_problem_details(&mut self, details: impl Into<String>) {
        self.advanced_problem_details = details.into();
    }

    pub fn problem_description_html(&self) -> &str {
        &self.problem_description_html
    }

    pub fn set_problem_description_html(&mut self, html: impl Into<String>) {
        self.problem_description_html = html.into();
    }

    pub fn solution_description_html(&self) -> &str {
        &self.solution_description_html
    }

    pub fn set_solution_description_html(&mut self, html: impl Into<String>) {
        self.solution_description_html = html.into();
    }

    pub fn journey(&self) -> &Journey {
        &self.journey
    }

    pub fn journey_mut(&mut self) -> &mut Journey {
        &mut self.journey
    }

    pub fn stdout_and_err_data(&self) -> &str {
        &self.stdout_and_err_data
    }

    pub fn set_stdout_and_err_data(&mut self, data: impl Into<String>) {
        self.stdout_and_err_data = data.into();
    }

    pub fn subprocess_envvars(&self) -> &str {
        &self.subprocess_envvars
    }

    pub fn set_subprocess_envvars(&mut self, data: impl Into<String>) {
        self.subprocess_envvars = data.into();
    }

    pub fn subprocess_user_info(&self) -> &str {
        &self.subprocess_user_info
    }

    pub fn set_subprocess_user_info(&mut self, data: impl Into<String>) {
        self.subprocess_user_info = data.into();
    }

    pub fn subprocess_ulimits(&self) -> &str {
        &self.subprocess_ulimits
    }

    pub fn set_subprocess_ulimits(&mut self, data: impl Into<String>) {
        self.subprocess_ulimits = data.into();
    }

    pub fn annotations(&self) -> &IndexMap<String, String> {
        &self.annotations
    }

    pub fn set_annotation(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.annotations.insert(name.into(), value.into());
    }
}

/// The (app kind × fault) wording table.
pub mod wording {
    use super::{escape_html, AppKind};
    use crate::category::ErrorCategory;
    use crate::config::Config;

    /// What the subprocess's spawn response failed to deliver.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum ResponseFault {
        /// No socket accepting HTTP requests was reported.
        NoHttpSockets,
        /// No socket speaking the preloader protocol was reported.
        NoPreloaderSockets,
        /// The response was present but malformed.
        InvalidResponse,
    }

    const REPORT_BUG_TO_US: &str = "<p class=\"sole-solution\">This is a bug in Roost. \
         Please report this bug to the Roost authors.</p>";

    const REPORT_BUG_TO_APP: &str = "<p class=\"sole-solution\">Since this is a bug in the \
         web application, please report this problem to the application's developer. \
         This problem is outside Roost's control.</p>";

    fn report_bug_to_wrapper(config: &Config) -> String {
        format!(
            "<p class=\"sole-solution\">This is a bug in the wrapper, so please contact \
             the author of the wrapper. This problem is outside Roost's control. Below \
             follows the command that Roost tried to execute, so that you can infer which \
             wrapper was used:</p><pre>{}</pre>",
            escape_html(&config.start_command)
        )
    }

    /// Short phrase naming who failed, for summary sentences.
    fn actor(kind: AppKind) -> &'static str {
        match kind {
            AppKind::Generic | AppKind::Direct => "the application",
            AppKind::OurWrapper => "a Roost-internal application wrapper",
            AppKind::ThirdPartyWrapper => "a third-party application wrapper",
        }
    }

    /// Summary for a missing-sockets or bad-schema response.
    pub fn fault_summary(kind: AppKind, fault: ResponseFault, details: &str) -> String {
        match (fault, kind) {
            (ResponseFault::NoHttpSockets, AppKind::Generic | AppKind::Direct) => {
                "Error spawning the web application: the application did not report \
                 any sockets to receive requests on."
                    .to_string()
            }
            (ResponseFault::NoHttpSockets, kind) => format!(
                "Error spawning the web application: {} did not report any sockets \
                 to receive requests on.",
                actor(kind)
            ),
            (ResponseFault::NoPreloaderSockets, AppKind::Generic | AppKind::Direct) => {
                "Error spawning the web application: the application did not report \
                 any sockets to receive preloader commands on."
                    .to_string()
            }
            (ResponseFault::NoPreloaderSockets, kind) => format!(
                "Error spawning the web application: {} did not report any sockets \
                 to receive preloader commands on.",
                actor(kind)
            ),
            (ResponseFault::InvalidResponse, AppKind::Generic | AppKind::Direct) => format!(
                "Error spawning the web application: the application's spawn response \
                 is invalid: {details}"
            ),
            (ResponseFault::InvalidResponse, AppKind::OurWrapper) => format!(
                "Error spawning the web application: a bug in a Roost-internal \
                 application wrapper caused the spawn result to be invalid: {details}"
            ),
            (ResponseFault::InvalidResponse, AppKind::ThirdPartyWrapper) => format!(
                "Error spawning the web application: a bug in a third-party \
                 application wrapper caused the spawn result to be invalid: {details}"
            ),
        }
    }

    /// Summary for a spawn result that our own bookkeeping rendered invalid.
    pub fn internal_validation_summary(details: &str) -> String {
        format!(
            "Error spawning the web application: a bug in Roost caused the \
             spawn result to be invalid: {details}"
        )
    }

    /// Problem description for a missing-sockets or bad-schema response.
    pub fn fault_problem_html(kind: AppKind, fault: ResponseFault, detail_items: &[String]) -> String {
        let expectation = match fault {
            ResponseFault::NoHttpSockets => {
                "to report a socket to receive requests on, but the startup sequence \
                 finished without reporting such a socket"
            }
            ResponseFault::NoPreloaderSockets => {
                "to report a socket to receive preloader commands on, but the startup \
                 sequence finished without reporting such a socket"
            }
            ResponseFault::InvalidResponse => {
                "to communicate back various information about the startup sequence, \
                 but it did not communicate back correctly"
            }
        };
        let intro = match kind {
            AppKind::Generic | AppKind::Direct => format!(
                "<p>The Roost application server tried to start the web application, \
                 but encountered a bug in the application. Roost expected the \
                 application {expectation}.</p>"
            ),
            AppKind::OurWrapper => format!(
                "<p>The Roost application server tried to start the web application \
                 through a Roost-internal helper tool called the \"wrapper\", but \
                 Roost encountered a bug in this helper tool. Roost expected the \
                 helper tool {expectation}.</p>"
            ),
            AppKind::ThirdPartyWrapper => format!(
                "<p>The Roost application server tried to start the web application \
                 through a helper tool called the \"wrapper\". This helper tool is \
                 not part of Roost. Roost expected the helper tool {expectation}.</p>"
            ),
        };
        if detail_items.is_empty() {
            intro
        } else {
            let mut html = intro;
            html.push_str("<p>The errors are as follows:</p><ul>");
            for item in detail_items {
                html.push_str("<li>");
                html.push_str(&escape_html(item));
                html.push_str("</li>");
            }
            html.push_str("</ul>");
            html
        }
    }

    /// Solution description for a faulty response, by responsible party.
    pub fn fault_solution_html(kind: AppKind, config: &Config) -> String {
        match kind {
            AppKind::Generic | AppKind::Direct => REPORT_BUG_TO_APP.to_string(),
            AppKind::OurWrapper => REPORT_BUG_TO_US.to_string(),
            AppKind::ThirdPartyWrapper => report_bug_to_wrapper(config),
        }
    }

    /// Summary for invalid progress or category reports from the subprocess.
    pub fn invalid_report_summary(kind: AppKind, what: &str, value: &str) -> String {
        match kind {
            AppKind::Generic | AppKind::Direct => format!(
                "An error occurred while spawning an application process: the \
                 application reported an invalid {what}: {value}"
            ),
            AppKind::OurWrapper => format!(
                "An error occurred while spawning an application process: a \
                 Roost-internal application wrapper reported an invalid {what}: {value}"
            ),
            AppKind::ThirdPartyWrapper => format!(
                "An error occurred while spawning an application process: a \
                 third-party application wrapper reported an invalid {what}: {value}"
            ),
        }
    }

    /// Problem description naming the offending response file and content.
    pub fn invalid_report_problem_html(kind: AppKind, file: &str, content: &str) -> String {
        let intro = match kind {
            AppKind::Generic | AppKind::Direct => {
                "<p>The Roost application server tried to start the web application \
                 and expected it to report about its startup progress. But the \
                 application communicated back in an invalid format:</p>"
            }
            AppKind::OurWrapper => {
                "<p>The Roost application server tried to start the web application \
                 through a Roost-internal helper tool called the \"wrapper\", but \
                 this helper tool communicated back in an invalid format:</p>"
            }
            AppKind::ThirdPartyWrapper => {
                "<p>The Roost application server tried to start the web application \
                 through a helper tool called the \"wrapper\". This helper tool is \
                 not part of Roost, and it communicated back in an invalid format:</p>"
            }
        };
        format!(
            "{intro}<ul><li>In file: {}</li><li>Content: <code>{}</code></li></ul>",
            escape_html(file),
            escape_html(content)
        )
    }

    /// Default solution text when a failure site supplied none.
    pub fn default_solution(category: ErrorCategory, kind: AppKind, config: &Config) -> String {
        match category {
            ErrorCategory::Timeout => format!(
                "<div class=\"multiple-solutions\"><h3>Check whether the server is \
                 low on resources</h3><p>Maybe the server is currently so low on \
                 resources that all the work that needed to be done could not finish \
                 within the given time limit. Please inspect the server resource \
                 utilization statistics to verify this.</p><h3>Increase the spawn \
                 timeout</h3><p>The spawn timeout is currently configured at {} \
                 seconds. If the application legitimately needs more time to start, \
                 increase it.</p></div>",
                config.start_timeout_msec / 1000
            ),
            ErrorCategory::Internal | ErrorCategory::Unknown => REPORT_BUG_TO_US.to_string(),
            _ => match kind {
                AppKind::ThirdPartyWrapper => report_bug_to_wrapper(config),
                _ => {
                    "<p class=\"sole-solution\">Please inspect the attached error \
                     details and the application's output to determine what went \
                     wrong in the environment, then correct it and restart the \
                     application.</p>"
                        .to_string()
                }
            },
        }
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
