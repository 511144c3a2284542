//! Configuration file discovery

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use graphingest_load::IngestConfig;

/// File name looked up in the current directory
const LOCAL_CONFIG: &str = "graphingest.toml";

/// Find the configuration file.
///
/// Search order:
/// 1. the path given with `--config`
/// 2. ./graphingest.toml (current directory)
/// 3. ~/.config/graphingest/config.toml
pub fn locate(explicit: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path);
    }

    let local_config = PathBuf::from(LOCAL_CONFIG);
    if local_config.exists() {
        return Ok(local_config);
    }

    if let Some(config_dir) = directories::ProjectDirs::from("", "", "graphingest") {
        let user_config = config_dir.config_dir().join("config.toml");
        if user_config.exists() {
            return Ok(user_config);
        }
    }

    anyhow::bail!("no config file found (pass --config or create ./{LOCAL_CONFIG})")
}

pub fn load(path: &Path) -> Result<IngestConfig> {
    IngestConfig::from_file(path)
        .with_context(|| format!("Failed to load config file: {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_path_wins() {
        let path = PathBuf::from("/nonexistent/ingest.toml");
        assert_eq!(locate(Some(path.clone())).unwrap(), path);
    }

    #[test]
    fn load_reports_path() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "server_uri = \"http://localhost:7474\"\n").unwrap();
        let err = load(&path).unwrap_err();
        let text = format!("{err:#}");
        assert!(text.contains("bad.toml"));
        assert!(text.contains("admin_user"));
    }

    #[test]
    fn load_valid_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("ingest.toml");
        std::fs::write(
            &path,
            r#"
server_uri = "http://localhost:7474"
admin_user = "neo4j"
admin_pass = "pw"

[[files]]
url = "https://example.org/people.csv"
statement = "UNWIND $dict.rows AS row CREATE (:P {id: row.id})"
"#,
        )
        .unwrap();
        let config = load(&path).unwrap();
        assert_eq!(config.files.len(), 1);
    }
}
