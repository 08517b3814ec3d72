//! `sonda probe` command: run a scenario and print the report.

use anyhow::{Context, Result};

use sonda_core::probe::run_probe;
use sonda_core::scenario::parse_scenario_toml;

pub async fn run_probe_cmd(
    scenario_path: &str,
    cwd: Option<&str>,
    ready_timeout_secs: Option<u64>,
    collect_window_secs: Option<u64>,
) -> Result<()> {
    let contents = std::fs::read_to_string(scenario_path)
        .with_context(|| format!("failed to read scenario file {scenario_path}"))?;
    let mut scenario = parse_scenario_toml(&contents)
        .with_context(|| format!("invalid scenario file {scenario_path}"))?;

    if let Some(cwd) = cwd {
        scenario.server.cwd = cwd.to_string();
    }
    if let Some(timeout) = ready_timeout_secs {
        scenario.server.ready_timeout_secs = timeout;
    }
    if let Some(window) = collect_window_secs {
        scenario.collect.window_secs = window;
    }

    println!("Probing: {}", scenario.server.command);
    println!("  Working directory: {}", scenario.server.cwd);
    println!("  Readiness timeout: {}s", scenario.server.ready_timeout_secs);
    println!("  Requests: {}", scenario.requests.len());
    println!();

    // Readiness timeout (or a failed launch) is the only way this errors;
    // failed requests are part of the report, not a failure of the run.
    let report = run_probe(&scenario).await?;
    report.print();

    Ok(())
}
