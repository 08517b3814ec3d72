use std::env;

use anyhow::{Context, Result};

/// Connection settings for the hosted backend.
///
/// Read from `SONDA_API_URL`, `SONDA_SERVICE_KEY` and (optionally)
/// `SONDA_DATABASE_URL`. The CLI layers its flag/config-file resolution
/// on top of this.
#[derive(Debug, Clone)]
pub struct MigrateConfig {
    /// Base URL of the backend's REST API, without a trailing slash.
    pub api_url: String,
    /// Service-role key, used both as the `apikey` header and as the
    /// bearer token.
    pub service_key: String,
    /// Direct PostgreSQL URL for the fallback path, when available.
    pub database_url: Option<String>,
}

impl MigrateConfig {
    /// Build a config from the environment. The API URL and service key
    /// are required; the database URL is optional.
    pub fn from_env() -> Result<Self> {
        let api_url = env::var("SONDA_API_URL").context("SONDA_API_URL is not set")?;
        let service_key =
            env::var("SONDA_SERVICE_KEY").context("SONDA_SERVICE_KEY is not set")?;
        let database_url = env::var("SONDA_DATABASE_URL").ok();
        Ok(Self::new(api_url, service_key, database_url))
    }

    /// Build a config from explicit values (CLI flags, tests).
    pub fn new(
        api_url: impl Into<String>,
        service_key: impl Into<String>,
        database_url: Option<String>,
    ) -> Self {
        Self {
            api_url: api_url.into().trim_end_matches('/').to_string(),
            service_key: service_key.into(),
            database_url,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Env-mutating tests share one lock so they cannot interleave.
    static ENV_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

    #[test]
    fn api_url_trailing_slash_is_stripped() {
        let config = MigrateConfig::new("https://backend.example.com/", "key", None);
        assert_eq!(config.api_url, "https://backend.example.com");
    }

    #[test]
    fn from_env_requires_api_url() {
        let _lock = ENV_LOCK.lock().unwrap();

        unsafe { env::remove_var("SONDA_API_URL") };
        unsafe { env::set_var("SONDA_SERVICE_KEY", "svc-key") };

        let err = MigrateConfig::from_env().unwrap_err();
        assert!(err.to_string().contains("SONDA_API_URL"));

        unsafe { env::remove_var("SONDA_SERVICE_KEY") };
    }

    #[test]
    fn from_env_reads_all_three_vars() {
        let _lock = ENV_LOCK.lock().unwrap();

        unsafe { env::set_var("SONDA_API_URL", "https://backend.example.com") };
        unsafe { env::set_var("SONDA_SERVICE_KEY", "svc-key") };
        unsafe { env::set_var("SONDA_DATABASE_URL", "postgresql://localhost:5432/app") };

        let config = MigrateConfig::from_env().unwrap();
        assert_eq!(config.api_url, "https://backend.example.com");
        assert_eq!(config.service_key, "svc-key");
        assert_eq!(
            config.database_url.as_deref(),
            Some("postgresql://localhost:5432/app")
        );

        unsafe { env::remove_var("SONDA_API_URL") };
        unsafe { env::remove_var("SONDA_SERVICE_KEY") };
        unsafe { env::remove_var("SONDA_DATABASE_URL") };
    }

    #[test]
    fn database_url_is_optional() {
        let _lock = ENV_LOCK.lock().unwrap();

        unsafe { env::set_var("SONDA_API_URL", "https://backend.example.com") };
        unsafe { env::set_var("SONDA_SERVICE_KEY", "svc-key") };
        unsafe { env::remove_var("SONDA_DATABASE_URL") };

        let config = MigrateConfig::from_env().unwrap();
        assert!(config.database_url.is_none());

        unsafe { env::remove_var("SONDA_API_URL") };
        unsafe { env::remove_var("SONDA_SERVICE_KEY") };
    }
}
