//! Ingest configuration loaded from TOML and resolved into per-file jobs

use std::path::Path;
use std::time::Duration;

use graphingest_core::{Compression, WritePolicy, stream};
use serde::Deserialize;

use crate::decode::{Format, JsonNumbers};
use crate::dispatch::FailurePolicy;
use crate::error::IngestError;

/// Top-level configuration file.
#[derive(Debug, Clone, Deserialize)]
pub struct IngestConfig {
    /// Store endpoint, e.g. `http://localhost:7474`
    #[serde(default, deserialize_with = "deserialize_env_string")]
    pub server_uri: String,
    #[serde(default, deserialize_with = "deserialize_env_string")]
    pub admin_user: String,
    #[serde(default, deserialize_with = "deserialize_env_string")]
    pub admin_pass: String,
    #[serde(default, deserialize_with = "deserialize_env_var")]
    pub database: Option<String>,
    /// Replaces a leading `$BASE` in file URLs
    #[serde(default, deserialize_with = "deserialize_env_var")]
    pub basepath: Option<String>,

    /// Default concurrency degree for files without their own
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Total attempts per batch write, including the first
    #[serde(default = "default_write_attempts")]
    pub write_attempts: u32,
    #[serde(default)]
    pub retry_backoff_ms: u64,
    /// Unset: sequential files abort, concurrent files continue
    pub on_batch_failure: Option<FailurePolicy>,

    #[serde(default)]
    pub pre_ingest: Vec<String>,
    #[serde(default)]
    pub post_ingest: Vec<String>,
    #[serde(default)]
    pub files: Vec<FileSpec>,
}

fn default_concurrency() -> usize {
    1
}

fn default_write_attempts() -> u32 {
    2
}

/// One `[[files]]` entry as written.
#[derive(Debug, Clone, Deserialize)]
pub struct FileSpec {
    #[serde(default)]
    pub url: String,
    #[serde(default, alias = "cql")]
    pub statement: String,
    /// `csv`, `txt`, `json` or `ttl`; inferred from the URL when absent
    #[serde(rename = "type")]
    pub format: Option<String>,
    /// `none`, `gzip`, `bz2` or `zip`; inferred from the URL when absent
    pub compression: Option<String>,
    #[serde(default)]
    pub skip_records: u64,
    #[serde(default)]
    pub skip_chunks: u64,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_field_separator")]
    pub field_separator: String,
    #[serde(default)]
    pub skip_file: bool,
    pub concurrency: Option<usize>,
    #[serde(default)]
    pub json_numbers: JsonNumbers,
}

fn default_chunk_size() -> usize {
    1000
}

fn default_field_separator() -> String {
    ",".into()
}

/// A file spec resolved against the global settings.
#[derive(Debug, Clone, PartialEq)]
pub struct FileJob {
    pub url: String,
    pub format: Format,
    pub compression: Compression,
    pub statement: String,
    pub skip_records: u64,
    pub skip_chunks: u64,
    pub batch_size: usize,
    pub field_separator: String,
    pub concurrency: usize,
    pub skip: bool,
    pub json_numbers: JsonNumbers,
}

/// Deserialize a string that may be an environment variable reference like `${VAR}`
fn deserialize_env_var<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let opt: Option<String> = Option::deserialize(deserializer)?;
    Ok(opt.and_then(|s| expand_env_var(&s)))
}

/// Like [`deserialize_env_var`]; an unset variable becomes an empty string
fn deserialize_env_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    Ok(expand_env_var(&s).unwrap_or_default())
}

/// Expand `${VAR}` to the environment variable's value
fn expand_env_var(s: &str) -> Option<String> {
    if let Some(var_name) = s.strip_prefix("${").and_then(|s| s.strip_suffix('}')) {
        std::env::var(var_name).ok()
    } else {
        Some(s.to_string())
    }
}

/// URI schemes the HTTP store speaks
const SUPPORTED_SCHEMES: [&str; 2] = ["http://", "https://"];

impl IngestConfig {
    /// Load configuration from a specific file
    pub fn from_file(path: &Path) -> Result<Self, IngestError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            IngestError::Configuration(format!(
                "failed to read config file {}: {e}",
                path.display()
            ))
        })?;
        let config = Self::from_toml(&content).map_err(|e| match e {
            IngestError::Configuration(msg) => {
                IngestError::Configuration(format!("{}: {msg}", path.display()))
            }
            other => other,
        })?;
        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Parse and validate configuration text
    pub fn from_toml(content: &str) -> Result<Self, IngestError> {
        let config: Self = toml::from_str(content)
            .map_err(|e| IngestError::Configuration(format!("failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would fail before the first write.
    pub fn validate(&self) -> Result<(), IngestError> {
        let missing: Vec<&str> = [
            (self.server_uri.trim().is_empty(), "server_uri"),
            (self.admin_user.trim().is_empty(), "admin_user"),
        ]
        .iter()
        .filter(|(is_missing, _)| *is_missing)
        .map(|(_, name)| *name)
        .collect();
        if !missing.is_empty() {
            return Err(IngestError::Configuration(format!(
                "missing configuration key(s): {}",
                missing.join(", ")
            )));
        }

        let uri = self.server_uri.to_ascii_lowercase();
        if !SUPPORTED_SCHEMES.iter().any(|s| uri.starts_with(s)) {
            return Err(IngestError::Configuration(format!(
                "unsupported server_uri '{}': expected http:// or https://",
                self.server_uri
            )));
        }
        if self.concurrency == 0 {
            return Err(IngestError::Configuration(
                "concurrency must be at least 1".into(),
            ));
        }
        if self.write_attempts == 0 {
            return Err(IngestError::Configuration(
                "write_attempts must be at least 1".into(),
            ));
        }

        for (i, file) in self.files.iter().enumerate() {
            let entry = i + 1;
            if file.url.trim().is_empty() {
                return Err(IngestError::Configuration(format!(
                    "files[{entry}]: url is empty"
                )));
            }
            if !file.skip_file && file.statement.trim().is_empty() {
                return Err(IngestError::Configuration(format!(
                    "files[{entry}] ({}): statement is empty",
                    file.url
                )));
            }
            if file.chunk_size == 0 {
                return Err(IngestError::Configuration(format!(
                    "files[{entry}] ({}): chunk_size must be at least 1",
                    file.url
                )));
            }
            if file.concurrency == Some(0) {
                return Err(IngestError::Configuration(format!(
                    "files[{entry}] ({}): concurrency must be at least 1",
                    file.url
                )));
            }
            if file.field_separator.is_empty() {
                return Err(IngestError::Configuration(format!(
                    "files[{entry}] ({}): field_separator is empty",
                    file.url
                )));
            }
            if !file.skip_file {
                let url = file.expanded_url(self.basepath.as_deref());
                if let Some(path) = stream::local_path(&url) {
                    if !path.is_file() {
                        return Err(IngestError::Configuration(format!(
                            "files[{entry}] ({url}): file not found"
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    pub fn write_policy(&self) -> WritePolicy {
        WritePolicy {
            max_attempts: self.write_attempts,
            backoff: Duration::from_millis(self.retry_backoff_ms),
        }
    }

    /// Resolve every file spec, in configuration order.
    ///
    /// Unsupported formats or codecs surface per file so the caller can skip
    /// that file and carry on with the rest.
    pub fn jobs(&self) -> Vec<Result<FileJob, IngestError>> {
        self.files
            .iter()
            .map(|spec| spec.resolve(self.basepath.as_deref(), self.concurrency))
            .collect()
    }
}

impl FileSpec {
    /// URL with a leading `$BASE` replaced by `basepath`
    fn expanded_url(&self, basepath: Option<&str>) -> String {
        match (basepath, self.url.strip_prefix("$BASE")) {
            (Some(base), Some(rest)) => format!("{base}{rest}"),
            _ => self.url.clone(),
        }
    }

    pub fn resolve(
        &self,
        basepath: Option<&str>,
        default_concurrency: usize,
    ) -> Result<FileJob, IngestError> {
        let url = self.expanded_url(basepath);

        let format = match self.format.as_deref() {
            Some(name) => Format::from_name(name).ok_or_else(|| IngestError::UnsupportedFormat {
                url: url.clone(),
                format: name.to_string(),
            })?,
            None => Format::infer(&url),
        };

        let compression = match self.compression.as_deref() {
            Some(name) => {
                Compression::from_name(name).ok_or_else(|| IngestError::UnsupportedCompression {
                    url: url.clone(),
                    codec: name.to_string(),
                })?
            }
            None => Compression::infer(&url),
        };

        Ok(FileJob {
            url,
            format,
            compression,
            statement: self.statement.clone(),
            skip_records: self.skip_records,
            skip_chunks: self.skip_chunks,
            batch_size: self.chunk_size,
            field_separator: self.field_separator.clone(),
            concurrency: self.concurrency.unwrap_or(default_concurrency),
            skip: self.skip_file,
            json_numbers: self.json_numbers,
        })
    }
}
