mod config;
mod migrate_cmd;
mod probe_cmd;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "sonda", about = "Dev-server smoke probe and migration runner")]
struct Cli {
    /// Backend API URL (overrides SONDA_API_URL env var)
    #[arg(long, global = true)]
    api_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a sonda config file (pass --api-url to set the backend URL)
    Init {
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
    /// Launch a dev server, probe it, and report the middleware logs
    Probe {
        /// Path to the scenario TOML file
        scenario: String,
        /// Override the scenario's working directory
        #[arg(long)]
        cwd: Option<String>,
        /// Override the readiness timeout in seconds
        #[arg(long)]
        ready_timeout_secs: Option<u64>,
        /// Override the trailing collection window in seconds
        #[arg(long)]
        collect_window_secs: Option<u64>,
    },
    /// Execute SQL migration files against the hosted backend
    Migrate {
        /// SQL files to execute, in order
        #[arg(required = true)]
        files: Vec<String>,
        /// Direct PostgreSQL URL for the fallback path
        /// (overrides SONDA_DATABASE_URL)
        #[arg(long)]
        database_url: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init { force } => {
            let api_url = cli.api_url.as_deref().unwrap_or("http://localhost:54321");
            config::cmd_init(api_url, force)?;
        }
        Commands::Probe {
            scenario,
            cwd,
            ready_timeout_secs,
            collect_window_secs,
        } => {
            probe_cmd::run_probe_cmd(
                &scenario,
                cwd.as_deref(),
                ready_timeout_secs,
                collect_window_secs,
            )
            .await?;
        }
        Commands::Migrate {
            files,
            database_url,
        } => {
            let resolved =
                config::SondaConfig::resolve(cli.api_url.as_deref(), database_url.as_deref())?;
            migrate_cmd::run_migrate(&resolved, &files).await?;
        }
    }

    Ok(())
}
