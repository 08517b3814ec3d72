//! Probe scenario files: TOML types, defaults, and validation.
//!
//! A scenario describes one probe run: the server command to launch, how to
//! tell when it is ready, which requests to issue, and which log lines to
//! surface in the report. Every field the operator is likely to leave alone
//! has a documented default.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while parsing or validating a scenario file.
#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("server command must not be empty")]
    EmptyCommand,

    #[error("request {index} has an empty URL")]
    EmptyUrl { index: usize },

    #[error("request {index} has unsupported method {method:?}")]
    UnsupportedMethod { index: usize, method: String },
}

/// Top-level structure of a scenario TOML file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProbeScenario {
    /// The server under test, in `[server]`.
    pub server: ServerSection,
    /// Requests to issue once the server is ready, as `[[request]]` entries.
    /// An empty list is valid: the run still collects and reports logs.
    #[serde(default, rename = "request")]
    pub requests: Vec<RequestToml>,
    /// Trailing log collection, in `[collect]`.
    #[serde(default)]
    pub collect: CollectSection,
}

/// The `[server]` section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerSection {
    /// Shell command that starts the server (e.g. `npm run dev`).
    pub command: String,
    /// Working directory for the command.
    #[serde(default = "default_cwd")]
    pub cwd: String,
    /// How long to wait for readiness before giving up.
    #[serde(default = "default_ready_timeout")]
    pub ready_timeout_secs: u64,
    /// Substrings whose appearance in the server output signal readiness.
    #[serde(default = "default_ready_markers")]
    pub ready_markers: Vec<String>,
    /// Endpoint polled for liveness; any response counts as ready. When
    /// absent, readiness is detected from log markers alone.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probe_url: Option<String>,
}

/// A single `[[request]]` entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RequestToml {
    #[serde(default = "default_method")]
    pub method: String,
    pub url: String,
}

/// The `[collect]` section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CollectSection {
    /// How long to wait after the last request for asynchronous log output.
    #[serde(default = "default_window")]
    pub window_secs: u64,
    /// Substrings selecting the middleware subset for the report.
    #[serde(default = "default_keywords")]
    pub keywords: Vec<String>,
}

impl Default for CollectSection {
    fn default() -> Self {
        Self {
            window_secs: default_window(),
            keywords: default_keywords(),
        }
    }
}

fn default_cwd() -> String {
    ".".to_string()
}

fn default_ready_timeout() -> u64 {
    30
}

fn default_ready_markers() -> Vec<String> {
    vec![
        "Ready in".to_string(),
        "started server".to_string(),
        "localhost:3000".to_string(),
    ]
}

fn default_method() -> String {
    "GET".to_string()
}

fn default_window() -> u64 {
    3
}

fn default_keywords() -> Vec<String> {
    vec!["[Middleware]".to_string()]
}

/// Methods the harness knows how to issue.
const SUPPORTED_METHODS: &[&str] = &["GET", "HEAD", "POST", "PUT", "PATCH", "DELETE", "OPTIONS"];

/// Parse and validate a scenario TOML string.
pub fn parse_scenario_toml(content: &str) -> Result<ProbeScenario, ScenarioError> {
    let scenario: ProbeScenario = toml::from_str(content)?;
    validate(&scenario)?;
    Ok(scenario)
}

fn validate(scenario: &ProbeScenario) -> Result<(), ScenarioError> {
    if scenario.server.command.trim().is_empty() {
        return Err(ScenarioError::EmptyCommand);
    }

    for (index, request) in scenario.requests.iter().enumerate() {
        if request.url.trim().is_empty() {
            return Err(ScenarioError::EmptyUrl { index });
        }
        if !SUPPORTED_METHODS.contains(&request.method.as_str()) {
            return Err(ScenarioError::UnsupportedMethod {
                index,
                method: request.method.clone(),
            });
        }
    }

    Ok(())
}
