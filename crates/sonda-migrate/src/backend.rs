//! SQL execution backends and the trait they share.
//!
//! A backend is one way of getting a SQL batch executed against the
//! hosted database. The executor holds them in an ordered chain; each
//! backend either applies the whole batch or fails and hands over to the
//! next one.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use tracing::debug;

use crate::config::MigrateConfig;

/// One way of executing a SQL batch.
///
/// Object-safe so the executor can hold `Vec<Box<dyn SqlBackend>>`.
#[async_trait]
pub trait SqlBackend: Send + Sync {
    /// Short name used in logs and the failure summary.
    fn name(&self) -> &str;

    /// Execute the whole batch. Any error means this backend is done and
    /// the executor moves on to the next one.
    async fn apply(&self, sql: &str) -> Result<()>;
}

// Compile-time assertion: SqlBackend must be object-safe.
const _: () = {
    fn _assert_object_safe(_: &dyn SqlBackend) {}
};

/// How long one RPC call may take. Migration batches can be slow on the
/// hosted side, so this is much longer than an interactive request.
const RPC_TIMEOUT: Duration = Duration::from_secs(30);

/// Primary path: the backend's `exec_sql` remote procedure over REST.
pub struct RpcBackend {
    client: reqwest::Client,
    api_url: String,
    service_key: String,
}

impl RpcBackend {
    pub fn new(config: &MigrateConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(RPC_TIMEOUT)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            client,
            api_url: config.api_url.clone(),
            service_key: config.service_key.clone(),
        })
    }

    /// Explicit constructor for tests pointing at a stub endpoint.
    pub fn with_endpoint(
        api_url: impl Into<String>,
        service_key: impl Into<String>,
    ) -> Result<Self> {
        Ok(Self {
            client: reqwest::Client::builder()
                .timeout(RPC_TIMEOUT)
                .build()
                .context("failed to build HTTP client")?,
            api_url: api_url.into(),
            service_key: service_key.into(),
        })
    }
}

#[async_trait]
impl SqlBackend for RpcBackend {
    fn name(&self) -> &str {
        "rpc"
    }

    async fn apply(&self, sql: &str) -> Result<()> {
        let url = format!("{}/rest/v1/rpc/exec_sql", self.api_url);
        debug!(url = %url, bytes = sql.len(), "posting SQL batch to RPC endpoint");

        let response = self
            .client
            .post(&url)
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
            .json(&serde_json::json!({ "sql": sql }))
            .send()
            .await
            .context("exec_sql request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("exec_sql returned {status}: {body}");
        }
        Ok(())
    }
}

/// Fallback path: a direct PostgreSQL connection.
///
/// Connects fresh per batch; migrations are rare enough that pooling
/// across calls buys nothing.
pub struct DirectBackend {
    database_url: String,
}

impl DirectBackend {
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
        }
    }
}

#[async_trait]
impl SqlBackend for DirectBackend {
    fn name(&self) -> &str {
        "direct"
    }

    async fn apply(&self, sql: &str) -> Result<()> {
        let pool = PgPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(Duration::from_secs(10))
            .connect(&self.database_url)
            .await
            .with_context(|| {
                format!("failed to connect to database at {}", self.database_url)
            })?;

        // The batch may hold multiple statements, so it goes through the
        // raw-SQL path rather than a prepared statement.
        sqlx::raw_sql(sql)
            .execute(&pool)
            .await
            .context("SQL batch execution failed")?;

        pool.close().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backends_are_usable_as_trait_objects() {
        let direct: Box<dyn SqlBackend> =
            Box::new(DirectBackend::new("postgresql://localhost:5432/app"));
        assert_eq!(direct.name(), "direct");

        let rpc: Box<dyn SqlBackend> =
            Box::new(RpcBackend::with_endpoint("https://backend.example.com", "key").unwrap());
        assert_eq!(rpc.name(), "rpc");
    }

    #[tokio::test]
    async fn direct_backend_fails_cleanly_when_unreachable() {
        // Reserve a port, then drop the listener so nothing is there.
        let addr = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap()
        };
        let backend =
            DirectBackend::new(format!("postgresql://postgres@{addr}/app"));

        let err = backend.apply("SELECT 1;").await.unwrap_err();
        assert!(
            format!("{err:#}").contains("failed to connect"),
            "unexpected error: {err:#}"
        );
    }
}
