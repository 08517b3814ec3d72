//! Configuration file management for sonda.
//!
//! Provides a TOML-based config file at `~/.config/sonda/config.toml` and a
//! resolution chain: CLI flag > env var > config file > default/error.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use sonda_migrate::MigrateConfig;

// -----------------------------------------------------------------------
// Config file types
// -----------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
pub struct ConfigFile {
    pub api: ApiSection,
    #[serde(default)]
    pub database: DatabaseSection,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiSection {
    /// Base URL of the hosted backend's REST API.
    pub url: String,
    /// Service-role key. Filled in by the operator after `sonda init`.
    #[serde(default)]
    pub service_key: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct DatabaseSection {
    /// Direct PostgreSQL URL for the migration fallback path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

// -----------------------------------------------------------------------
// Paths
// -----------------------------------------------------------------------

/// Return the sonda config directory.
///
/// Always uses XDG layout: `$XDG_CONFIG_HOME/sonda` or `~/.config/sonda`.
pub fn config_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("sonda");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("sonda")
}

/// Return the path to the sonda config file.
pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

// -----------------------------------------------------------------------
// Read / write
// -----------------------------------------------------------------------

/// Load and parse the config file. Returns an error if it does not exist.
pub fn load_config() -> Result<ConfigFile> {
    let path = config_path();
    let contents = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read config file at {}", path.display()))?;
    let config: ConfigFile = toml::from_str(&contents).context("failed to parse config file")?;
    Ok(config)
}

/// Serialize and write the config file, creating parent dirs as needed.
/// Sets file permissions to 0600 on Unix -- the file holds a service key.
pub fn save_config(config: &ConfigFile) -> Result<()> {
    let path = config_path();
    let dir = config_dir();
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create config directory {}", dir.display()))?;

    let contents = toml::to_string_pretty(config).context("failed to serialize config")?;
    std::fs::write(&path, &contents)
        .with_context(|| format!("failed to write config file at {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        std::fs::set_permissions(&path, perms)
            .with_context(|| format!("failed to set permissions on {}", path.display()))?;
    }

    Ok(())
}

/// Execute the `sonda init` command: write the config file.
pub fn cmd_init(api_url: &str, force: bool) -> Result<()> {
    let path = config_path();

    if path.exists() && !force {
        bail!(
            "config file already exists at {}\nUse --force to overwrite.",
            path.display()
        );
    }

    let cfg = ConfigFile {
        api: ApiSection {
            url: api_url.to_string(),
            service_key: String::new(),
        },
        database: DatabaseSection::default(),
    };

    save_config(&cfg)?;

    println!("Config written to {}", path.display());
    println!("  api.url = {api_url}");
    println!();
    println!("Next: fill in api.service_key (and optionally database.url for");
    println!("the direct fallback path), or set SONDA_SERVICE_KEY instead.");

    Ok(())
}

// -----------------------------------------------------------------------
// Resolved config
// -----------------------------------------------------------------------

/// Fully resolved configuration, ready for use.
#[derive(Debug)]
pub struct SondaConfig {
    pub migrate: MigrateConfig,
}

impl SondaConfig {
    /// Resolve configuration using the chain: CLI flag > env var >
    /// config file > error (URL/key) or None (database URL).
    pub fn resolve(cli_api_url: Option<&str>, cli_db_url: Option<&str>) -> Result<Self> {
        let file_config = load_config().ok();

        let api_url = if let Some(url) = cli_api_url {
            url.to_string()
        } else if let Ok(url) = std::env::var("SONDA_API_URL") {
            url
        } else if let Some(ref cfg) = file_config {
            cfg.api.url.clone()
        } else {
            bail!("backend API URL not found; set SONDA_API_URL or run `sonda init`");
        };

        let service_key = if let Ok(key) = std::env::var("SONDA_SERVICE_KEY") {
            key
        } else if let Some(key) = file_config
            .as_ref()
            .map(|cfg| cfg.api.service_key.clone())
            .filter(|key| !key.is_empty())
        {
            key
        } else {
            bail!(
                "service key not found; set SONDA_SERVICE_KEY or fill in api.service_key in the config file"
            );
        };

        let database_url = if let Some(url) = cli_db_url {
            Some(url.to_string())
        } else if let Ok(url) = std::env::var("SONDA_DATABASE_URL") {
            Some(url)
        } else {
            file_config.as_ref().and_then(|cfg| cfg.database.url.clone())
        };

        Ok(Self {
            migrate: MigrateConfig::new(api_url, service_key, database_url),
        })
    }
}

// -----------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------
