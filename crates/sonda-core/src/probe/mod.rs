//! The probe harness: run one scenario from launch to report.
//!
//! ```text
//! run_probe(scenario)
//!     |
//!     v
//! ServerProcess::spawn ---- reader task ----> output queue
//!     |
//! await_ready  (drain + marker match | liveness GET, every 500 ms)
//!     |
//! issue_requests  (sequential, redirects off, failures recorded)
//!     |
//! collect_trailing  (sleep the window, drain, keyword filter)
//!     |
//! terminate  (graceful, then kill)
//!     |
//!     v
//! ProbeReport
//! ```
//!
//! The only fatal conditions are a failed launch and a readiness timeout;
//! in both cases the child is terminated before the error is returned.
//! Everything else is recorded in the report.

pub mod process;
pub mod requests;

use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::logs::{LogAccumulator, filter_lines};
use crate::scenario::ProbeScenario;
use process::ServerProcess;
use requests::{RequestOutcome, RequestResult, issue_requests, probe_alive};

/// Readiness poll interval.
const POLL_INTERVAL: Duration = Duration::from_millis(500);
/// Grace period between the termination request and a hard kill.
const KILL_GRACE: Duration = Duration::from_secs(5);

/// Everything one probe run observed.
#[derive(Debug)]
pub struct ProbeReport {
    /// Total server log lines captured over the whole run.
    pub total_log_lines: usize,
    /// One entry per configured request, in issue order.
    pub outcomes: Vec<RequestOutcome>,
    /// Post-request lines matching the keyword filter, in emission order.
    /// The association with a specific request is a trailing-window
    /// heuristic, not a causal link.
    pub middleware_lines: Vec<String>,
}

impl ProbeReport {
    /// Print the operator-facing summary.
    pub fn print(&self) {
        println!();
        println!("Probe summary");
        println!("  server log lines captured: {}", self.total_log_lines);
        for outcome in &self.outcomes {
            match &outcome.result {
                RequestResult::Responded {
                    status,
                    location: Some(location),
                    ..
                } => {
                    println!(
                        "  {} {} -> {} (Location: {})",
                        outcome.method, outcome.url, status, location
                    );
                }
                RequestResult::Responded { status, .. } => {
                    println!("  {} {} -> {}", outcome.method, outcome.url, status);
                }
                RequestResult::Failed { error } => {
                    println!(
                        "  {} {} -> request failed: {}",
                        outcome.method, outcome.url, error
                    );
                }
            }
        }
        println!("  middleware lines: {}", self.middleware_lines.len());
        for line in &self.middleware_lines {
            println!("    {line}");
        }
    }
}

/// Run a probe scenario end to end.
pub async fn run_probe(scenario: &ProbeScenario) -> Result<ProbeReport> {
    let client = requests::build_client()?;

    let mut server = ServerProcess::spawn(
        &scenario.server.command,
        Path::new(&scenario.server.cwd),
    )?;
    info!(
        pid = ?server.pid(),
        command = %scenario.server.command,
        "server launched"
    );

    let mut log = LogAccumulator::new();

    let ready = await_ready(
        &mut server,
        &mut log,
        &client,
        Duration::from_secs(scenario.server.ready_timeout_secs),
        &scenario.server.ready_markers,
        scenario.server.probe_url.as_deref(),
    )
    .await;

    if !ready {
        warn!(
            timeout_secs = scenario.server.ready_timeout_secs,
            "server never became ready, terminating"
        );
        server.terminate(KILL_GRACE).await?;
        anyhow::bail!(
            "server not ready after {}s",
            scenario.server.ready_timeout_secs
        );
    }

    let outcomes = issue_requests(&client, &scenario.requests).await;

    let middleware_lines = collect_trailing(
        &mut server,
        &mut log,
        Duration::from_secs(scenario.collect.window_secs),
        &scenario.collect.keywords,
    )
    .await;

    server.terminate(KILL_GRACE).await?;

    Ok(ProbeReport {
        total_log_lines: log.len(),
        outcomes,
        middleware_lines,
    })
}

/// Poll until the server looks ready or `timeout` elapses.
///
/// Two independent checks per tick, either of which wins: a marker
/// substring in a newly queued log line, or any HTTP response from the
/// probe URL. Requiring either is more robust than requiring both -- a
/// dev server may print its ready banner before it accepts connections,
/// or the other way round.
///
/// Drained lines are echoed to the operator and pushed into `log`.
/// Returns `false` no earlier than `timeout` after the call, with at most
/// one poll interval of lateness when no probe URL is configured.
pub async fn await_ready(
    server: &mut ServerProcess,
    log: &mut LogAccumulator,
    client: &reqwest::Client,
    timeout: Duration,
    markers: &[String],
    probe_url: Option<&str>,
) -> bool {
    let deadline = Instant::now() + timeout;

    loop {
        let mut marker_seen = false;
        for line in server.drain() {
            println!("{line}");
            if markers.iter().any(|m| line.contains(m.as_str())) {
                info!(line = %line, "ready marker matched");
                marker_seen = true;
            }
            log.push(line);
        }
        if marker_seen {
            return true;
        }

        if let Some(url) = probe_url {
            if probe_alive(client, url).await {
                info!(url, "probe endpoint is answering");
                return true;
            }
        }

        if Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

/// Wait out the trailing window so asynchronous log output can catch up,
/// drain what accumulated, and return the keyword-filtered subset.
pub async fn collect_trailing(
    server: &mut ServerProcess,
    log: &mut LogAccumulator,
    window: Duration,
    keywords: &[String],
) -> Vec<String> {
    tokio::time::sleep(window).await;

    let trailing = server.drain();
    info!(lines = trailing.len(), "trailing collection drained");

    let subset = filter_lines(&trailing, keywords);
    log.extend(trailing);
    subset
}
