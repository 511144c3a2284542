//! `graphingest check` - show how each file will be read

use anyhow::Result;
use comfy_table::{Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};

use graphingest_load::{FailurePolicy, IngestConfig};

pub fn run(config: &IngestConfig) -> Result<()> {
    let mut settings = Table::new();
    settings
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec![
            Cell::new("Setting").fg(Color::Cyan),
            Cell::new("Value").fg(Color::Cyan),
        ]);
    settings.add_row(vec!["Server", &config.server_uri]);
    settings.add_row(vec![
        "Database",
        config
            .database
            .as_deref()
            .unwrap_or(graphingest_neo4j::DEFAULT_DATABASE),
    ]);
    settings.add_row(vec!["User", &config.admin_user]);
    settings.add_row(vec![
        "Password",
        if config.admin_pass.is_empty() {
            "not set"
        } else {
            "configured"
        },
    ]);
    settings.add_row(vec!["Write attempts", &config.write_attempts.to_string()]);
    settings.add_row(vec![
        "Retry backoff",
        &format!("{}ms", config.retry_backoff_ms),
    ]);
    settings.add_row(vec![
        "On batch failure",
        &match config.on_batch_failure {
            Some(FailurePolicy::Abort) => "abort".to_string(),
            Some(FailurePolicy::Continue) => "continue".to_string(),
            None => "abort (sequential) / continue (concurrent)".to_string(),
        },
    ]);
    settings.add_row(vec![
        "Statements",
        &format!(
            "{} pre / {} post",
            config.pre_ingest.len(),
            config.post_ingest.len()
        ),
    ]);
    eprintln!("\n{settings}");

    let mut files = Table::new();
    files
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(
            ["#", "URL", "Format", "Compression", "Batch", "Sessions", "Status"]
                .into_iter()
                .map(|h| Cell::new(h).fg(Color::Cyan)),
        );

    for (i, job) in config.jobs().into_iter().enumerate() {
        let entry = (i + 1).to_string();
        match job {
            Ok(job) => {
                let status = if job.skip {
                    Cell::new("skip").fg(Color::Yellow)
                } else {
                    Cell::new("ok").fg(Color::Green)
                };
                files.add_row(vec![
                    Cell::new(entry),
                    Cell::new(&job.url),
                    Cell::new(job.format),
                    Cell::new(job.compression),
                    Cell::new(job.batch_size),
                    Cell::new(job.concurrency),
                    status,
                ]);
            }
            Err(e) => {
                let url = config.files[i].url.as_str();
                files.add_row(vec![
                    Cell::new(entry),
                    Cell::new(url),
                    Cell::new("-"),
                    Cell::new("-"),
                    Cell::new("-"),
                    Cell::new("-"),
                    Cell::new(e).fg(Color::Red),
                ]);
            }
        }
    }
    eprintln!("{files}");
    Ok(())
}
