//! Core library for sonda: launch a dev server, wait for it to become
//! ready, fire a fixed sequence of HTTP requests at it, and collect the
//! middleware log lines those requests provoke.
//!
//! The [`probe`] module holds the harness itself; [`scenario`] defines the
//! TOML file that configures a run; [`logs`] is the ordered accumulator
//! and keyword filter used for the final report.

pub mod logs;
pub mod probe;
pub mod scenario;

pub use probe::{ProbeReport, run_probe};
pub use scenario::{ProbeScenario, parse_scenario_toml};
