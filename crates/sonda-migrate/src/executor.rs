//! The backend fallback chain.

use std::path::Path;

use anyhow::Context;
use thiserror::Error;
use tracing::{info, warn};

use crate::backend::{DirectBackend, RpcBackend, SqlBackend};
use crate::config::MigrateConfig;

/// Errors the executor reports to its caller.
#[derive(Debug, Error)]
pub enum MigrateError {
    #[error("no execution backend is configured")]
    NoBackends,

    #[error("all execution backends failed: {summary}")]
    AllBackendsFailed { summary: String },
}

/// Runs a SQL batch through an ordered chain of backends.
pub struct MigrationExecutor {
    backends: Vec<Box<dyn SqlBackend>>,
}

impl MigrationExecutor {
    /// The standard chain for `config`: RPC first, then a direct
    /// connection when a database URL is configured.
    pub fn from_config(config: &MigrateConfig) -> anyhow::Result<Self> {
        let mut backends: Vec<Box<dyn SqlBackend>> = vec![Box::new(RpcBackend::new(config)?)];
        if let Some(ref url) = config.database_url {
            backends.push(Box::new(DirectBackend::new(url.clone())));
        }
        Ok(Self { backends })
    }

    /// Build an executor from an explicit chain.
    pub fn with_backends(backends: Vec<Box<dyn SqlBackend>>) -> Self {
        Self { backends }
    }

    /// Execute `sql` through the chain; the first backend that succeeds
    /// wins. When every backend fails, the raw SQL is printed so the
    /// operator can run it by hand, and the accumulated failures are
    /// returned in the error.
    pub async fn run(&self, sql: &str) -> Result<(), MigrateError> {
        if self.backends.is_empty() {
            return Err(MigrateError::NoBackends);
        }

        let mut failures = Vec::new();
        for backend in &self.backends {
            match backend.apply(sql).await {
                Ok(()) => {
                    info!(backend = backend.name(), "SQL batch applied");
                    return Ok(());
                }
                Err(e) => {
                    warn!(backend = backend.name(), error = %e, "backend failed, trying next");
                    failures.push(format!("{}: {e:#}", backend.name()));
                }
            }
        }

        println!("All execution paths failed. Run the following SQL manually:");
        println!("----------------------------------------------------------------");
        println!("{sql}");
        println!("----------------------------------------------------------------");

        Err(MigrateError::AllBackendsFailed {
            summary: failures.join("; "),
        })
    }
}

/// Read a SQL file into a string. Empty files are rejected early rather
/// than round-tripped to the backend.
pub fn load_sql_file(path: &Path) -> anyhow::Result<String> {
    let sql = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read SQL file {}", path.display()))?;
    if sql.trim().is_empty() {
        anyhow::bail!("SQL file {} is empty", path.display());
    }
    Ok(sql)
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use anyhow::Result;
    use async_trait::async_trait;

    use super::*;

    /// Test backend that succeeds or fails on demand, recording call
    /// order into a shared log.
    struct ScriptedBackend {
        name: &'static str,
        succeed: bool,
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    impl ScriptedBackend {
        fn boxed(
            name: &'static str,
            succeed: bool,
            log: &Arc<Mutex<Vec<&'static str>>>,
        ) -> Box<dyn SqlBackend> {
            Box::new(Self {
                name,
                succeed,
                log: Arc::clone(log),
            })
        }
    }

    #[async_trait]
    impl SqlBackend for ScriptedBackend {
        fn name(&self) -> &str {
            self.name
        }

        async fn apply(&self, _sql: &str) -> Result<()> {
            self.log.lock().unwrap().push(self.name);
            if self.succeed {
                Ok(())
            } else {
                anyhow::bail!("{} is scripted to fail", self.name)
            }
        }
    }

    #[tokio::test]
    async fn first_success_short_circuits() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let executor = MigrationExecutor::with_backends(vec![
            ScriptedBackend::boxed("first", true, &log),
            ScriptedBackend::boxed("second", true, &log),
        ]);

        executor.run("SELECT 1;").await.unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["first"]);
    }

    #[tokio::test]
    async fn failure_falls_through_in_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let executor = MigrationExecutor::with_backends(vec![
            ScriptedBackend::boxed("rpc", false, &log),
            ScriptedBackend::boxed("direct", true, &log),
        ]);

        executor.run("SELECT 1;").await.unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["rpc", "direct"]);
    }

    #[tokio::test]
    async fn total_failure_reports_every_backend() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let executor = MigrationExecutor::with_backends(vec![
            ScriptedBackend::boxed("rpc", false, &log),
            ScriptedBackend::boxed("direct", false, &log),
        ]);

        let err = executor.run("SELECT 1;").await.unwrap_err();
        match err {
            MigrateError::AllBackendsFailed { summary } => {
                assert!(summary.contains("rpc"), "summary: {summary}");
                assert!(summary.contains("direct"), "summary: {summary}");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn empty_chain_is_an_error() {
        let executor = MigrationExecutor::with_backends(vec![]);
        let err = executor.run("SELECT 1;").await.unwrap_err();
        assert!(matches!(err, MigrateError::NoBackends));
    }

    #[test]
    fn load_sql_file_rejects_empty_files() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("empty.sql");
        std::fs::write(&path, "   \n\n").unwrap();

        let err = load_sql_file(&path).unwrap_err();
        assert!(err.to_string().contains("is empty"));
    }

    #[test]
    fn load_sql_file_reads_contents() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("add_column.sql");
        std::fs::write(&path, "ALTER TABLE eventos ADD COLUMN notas text;\n").unwrap();

        let sql = load_sql_file(&path).unwrap();
        assert!(sql.contains("ALTER TABLE eventos"));
    }

    #[test]
    fn load_sql_file_errors_on_missing_file() {
        let err = load_sql_file(Path::new("/nonexistent/sonda/migration.sql")).unwrap_err();
        assert!(format!("{err:#}").contains("failed to read SQL file"));
    }
}
