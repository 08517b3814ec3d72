//! `sonda migrate` command: execute SQL files through the backend chain.

use std::path::Path;

use anyhow::{Context, Result};

use sonda_migrate::{MigrationExecutor, load_sql_file};

use crate::config::SondaConfig;

pub async fn run_migrate(config: &SondaConfig, files: &[String]) -> Result<()> {
    let executor = MigrationExecutor::from_config(&config.migrate)?;

    for file in files {
        println!("Applying {file}...");
        let sql = load_sql_file(Path::new(file))?;
        executor
            .run(&sql)
            .await
            .with_context(|| format!("migration {file} failed"))?;
        println!("  done.");
    }

    println!("All migrations applied.");
    Ok(())
}
