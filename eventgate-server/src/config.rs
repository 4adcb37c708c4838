use anyhow::{Context, Result};
use eventgate_core::ClassifierConfig;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::dispatch::RetryPolicy;

/// Name of the SQLite database file inside `state_dir`.
pub const DATABASE_FILE_NAME: &str = "eventgate-state.db";

#[derive(Debug, Clone)]
pub struct Config {
    /// Directory for persistent state (SQLite database).
    /// Defaults to current working directory.
    pub state_dir: PathBuf,
    pub port: u16,
    pub classifier: ClassifierConfig,
    pub retry: RetryPolicy,
    /// Upper bound on classifications running at once.
    pub max_concurrency: usize,
    pub sweep_interval: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let state_dir = lookup("STATE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));

        let port = lookup("PORT")
            .unwrap_or_else(|| "3000".to_string())
            .parse::<u16>()
            .context("PORT must be a valid number")?;

        let program = lookup("CLASSIFIER_PROGRAM").unwrap_or_else(|| "python3".to_string());
        let args = parse_args(
            &lookup("CLASSIFIER_ARGS")
                .unwrap_or_else(|| "-u scripts/spam_check_single.py".to_string()),
        )
        .context("CLASSIFIER_ARGS must be a JSON array of strings or a plain word list")?;

        let timeout_secs = parse_number::<u64>(&lookup, "CLASSIFIER_TIMEOUT_SECS", 1800)?;
        let max_attempts = parse_number::<u32>(&lookup, "CLASSIFIER_MAX_ATTEMPTS", 3)?;
        if max_attempts == 0 {
            anyhow::bail!("CLASSIFIER_MAX_ATTEMPTS must be at least 1");
        }

        let max_concurrency = parse_number::<usize>(
            &lookup,
            "CLASSIFIER_MAX_CONCURRENCY",
            default_concurrency(),
        )?;
        if max_concurrency == 0 {
            anyhow::bail!("CLASSIFIER_MAX_CONCURRENCY must be at least 1");
        }

        let sweep_secs = parse_number::<u64>(&lookup, "SWEEP_INTERVAL_SECS", 3600)?;
        if sweep_secs == 0 {
            anyhow::bail!("SWEEP_INTERVAL_SECS must be at least 1");
        }

        Ok(Config {
            state_dir,
            port,
            classifier: ClassifierConfig::new(program, args)
                .with_timeout(Duration::from_secs(timeout_secs)),
            retry: RetryPolicy {
                max_attempts,
                ..RetryPolicy::default()
            },
            max_concurrency,
            sweep_interval: Duration::from_secs(sweep_secs),
        })
    }

    pub fn database_path(&self) -> PathBuf {
        self.state_dir.join(DATABASE_FILE_NAME)
    }
}

/// Parse a classifier argument list.
///
/// A value starting with `[` is a JSON array of strings, which can carry
/// arguments containing spaces (`["--model", "/opt/my models/spam"]`).
/// Anything else is split on whitespace.
pub fn parse_args(value: &str) -> Result<Vec<String>> {
    let trimmed = value.trim();
    if trimmed.starts_with('[') {
        return serde_json::from_str(trimmed)
            .with_context(|| format!("invalid JSON argument list '{}'", trimmed));
    }
    Ok(trimmed.split_whitespace().map(str::to_string).collect())
}

fn parse_number<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(value) => value
            .trim()
            .parse::<T>()
            .with_context(|| format!("{} must be a valid number, got '{}'", key, value)),
        None => Ok(default),
    }
}

fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}
