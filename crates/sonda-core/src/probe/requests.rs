//! Probe request issuance and the readiness liveness check.
//!
//! Requests are fired sequentially with redirects disabled; only status
//! and headers are read, never the body. A failed request is recorded in
//! its outcome and the sequence continues.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::header::LOCATION;
use reqwest::redirect;
use tracing::{debug, info, warn};

use crate::scenario::RequestToml;

/// Per-request wall-time limit.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);
/// Pause between consecutive requests so their log output does not overlap.
const INTER_REQUEST_DELAY: Duration = Duration::from_millis(500);
/// The readiness liveness GET must not hold up the poll loop.
const PROBE_TIMEOUT: Duration = Duration::from_secs(1);

/// What one probe request produced.
#[derive(Debug, Clone)]
pub struct RequestOutcome {
    pub method: String,
    pub url: String,
    pub result: RequestResult,
}

#[derive(Debug, Clone)]
pub enum RequestResult {
    /// The server answered. Redirects are never followed, so a 3xx shows
    /// up here with its Location header rather than being chased.
    Responded {
        status: u16,
        /// Value of the Location header, when present.
        location: Option<String>,
        headers: Vec<(String, String)>,
    },
    /// The request itself failed (connection refused, timeout, ...).
    Failed { error: String },
}

/// Build the client used for all harness HTTP traffic: redirects off,
/// bounded timeout.
pub fn build_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .redirect(redirect::Policy::none())
        .timeout(REQUEST_TIMEOUT)
        .build()
        .context("failed to build HTTP client")
}

/// Liveness probe used by the readiness loop.
///
/// Any response at all counts, error statuses included: this only asks
/// whether something is listening, not whether it is healthy.
pub async fn probe_alive(client: &reqwest::Client, url: &str) -> bool {
    match client.get(url).timeout(PROBE_TIMEOUT).send().await {
        Ok(response) => {
            debug!(url, status = %response.status(), "probe endpoint responded");
            true
        }
        Err(_) => false,
    }
}

/// Issue each configured request in order, returning one outcome per
/// request. Nothing here aborts the sequence.
pub async fn issue_requests(
    client: &reqwest::Client,
    requests: &[RequestToml],
) -> Vec<RequestOutcome> {
    let mut outcomes = Vec::with_capacity(requests.len());
    for (i, request) in requests.iter().enumerate() {
        if i > 0 {
            tokio::time::sleep(INTER_REQUEST_DELAY).await;
        }
        outcomes.push(issue_one(client, request).await);
    }
    outcomes
}

async fn issue_one(client: &reqwest::Client, request: &RequestToml) -> RequestOutcome {
    info!(method = %request.method, url = %request.url, "issuing probe request");

    let method = match request.method.parse::<reqwest::Method>() {
        Ok(method) => method,
        Err(e) => {
            // Scenario validation should have caught this; record it
            // rather than aborting the sequence.
            warn!(method = %request.method, "unparseable method");
            return RequestOutcome {
                method: request.method.clone(),
                url: request.url.clone(),
                result: RequestResult::Failed {
                    error: format!("invalid method: {e}"),
                },
            };
        }
    };

    let result = match client.request(method, &request.url).send().await {
        Ok(response) => {
            let status = response.status().as_u16();
            let location = response
                .headers()
                .get(LOCATION)
                .and_then(|v| v.to_str().ok())
                .map(str::to_owned);
            let headers = response
                .headers()
                .iter()
                .map(|(name, value)| {
                    (
                        name.to_string(),
                        String::from_utf8_lossy(value.as_bytes()).into_owned(),
                    )
                })
                .collect();
            info!(url = %request.url, status, location = ?location, "probe request answered");
            RequestResult::Responded {
                status,
                location,
                headers,
            }
        }
        Err(e) => {
            warn!(url = %request.url, error = %e, "probe request failed");
            RequestResult::Failed {
                error: e.to_string(),
            }
        }
    };

    RequestOutcome {
        method: request.method.clone(),
        url: request.url.clone(),
        result,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn probe_alive_is_false_when_nothing_listens() {
        let client = build_client().unwrap();
        // Reserve a port, then drop the listener so the address is dead.
        let addr = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap()
        };
        assert!(!probe_alive(&client, &format!("http://{addr}/")).await);
    }

    #[tokio::test]
    async fn failed_request_is_recorded_not_raised() {
        let client = build_client().unwrap();
        let addr = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap()
        };
        let requests = vec![RequestToml {
            method: "GET".to_string(),
            url: format!("http://{addr}/"),
        }];

        let outcomes = issue_requests(&client, &requests).await;
        assert_eq!(outcomes.len(), 1);
        assert!(matches!(outcomes[0].result, RequestResult::Failed { .. }));
    }

    #[tokio::test]
    async fn empty_request_list_yields_no_outcomes() {
        let client = build_client().unwrap();
        let outcomes = issue_requests(&client, &[]).await;
        assert!(outcomes.is_empty());
    }
}
