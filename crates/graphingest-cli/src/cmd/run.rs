//! `graphingest run` - ingest every configured file

use anyhow::{Context, Result};
use clap::Args;

use graphingest_core::ProgressContext;
use graphingest_load::IngestConfig;
use graphingest_neo4j::HttpStore;

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Concurrency degree for every file, overriding per-file settings
    #[arg(short = 'j', long)]
    pub concurrency: Option<usize>,

    /// Target database (overrides the config file)
    #[arg(long)]
    pub database: Option<String>,
}

pub fn run(args: RunArgs, mut config: IngestConfig, progress: &ProgressContext) -> Result<()> {
    apply_overrides(&args, &mut config)?;

    let store = HttpStore::new(
        &config.server_uri,
        &config.admin_user,
        &config.admin_pass,
        config.database.as_deref(),
    );
    log::info!(
        "Ingesting {} file(s) into {}",
        config.files.len(),
        store.endpoint()
    );

    let summary = graphingest_load::run(&config, &store, progress).context("ingest aborted")?;

    if !summary.is_success() {
        anyhow::bail!(
            "{} of {} file(s) failed",
            summary.failed_files,
            summary.total_files
        );
    }
    Ok(())
}

fn apply_overrides(args: &RunArgs, config: &mut IngestConfig) -> Result<()> {
    if let Some(n) = args.concurrency {
        anyhow::ensure!(n >= 1, "--concurrency must be at least 1");
        config.concurrency = n;
        for file in &mut config.files {
            file.concurrency = None;
        }
    }
    if let Some(database) = &args.database {
        config.database = Some(database.clone());
    }
    Ok(())
}
