//! Configuration types.

use std::path::PathBuf;
use std::str::FromStr;

use secrecy::SecretString;

use crate::error::ConfigError;
use crate::provider::gmail::{DEFAULT_API_BASE, MAX_LIST_RESULTS};
use crate::rules::runner::MatchStrategy;
use crate::sync::SyncWindow;

/// Runtime configuration for one sync-and-apply pass.
#[derive(Debug, Clone)]
pub struct Config {
    /// libSQL database file.
    pub db_path: PathBuf,
    /// Rule document.
    pub rules_path: PathBuf,
    /// Sync window in days.
    pub fetch_days: u32,
    /// Provider page size, capped at 500.
    pub max_results: u32,
    /// Concurrent message detail fetches during sync.
    pub fetch_concurrency: usize,
    pub strategy: MatchStrategy,
    pub gmail_token: SecretString,
    pub gmail_api_base: String,
}

impl Config {
    /// Load from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let gmail_token = lookup("GMAIL_ACCESS_TOKEN")
            .filter(|t| !t.trim().is_empty())
            .map(SecretString::from)
            .ok_or_else(|| ConfigError::MissingEnvVar("GMAIL_ACCESS_TOKEN".into()))?;

        let max_results: u32 = parse_or(&lookup, "MAIL_RULES_MAX_RESULTS", MAX_LIST_RESULTS)?;
        if max_results == 0 || max_results > MAX_LIST_RESULTS {
            return Err(ConfigError::InvalidValue {
                key: "MAIL_RULES_MAX_RESULTS".into(),
                message: format!("must be between 1 and {MAX_LIST_RESULTS}"),
            });
        }

        let fetch_concurrency: usize = parse_or(&lookup, "MAIL_RULES_FETCH_CONCURRENCY", 5)?;
        if fetch_concurrency == 0 {
            return Err(ConfigError::InvalidValue {
                key: "MAIL_RULES_FETCH_CONCURRENCY".into(),
                message: "must be at least 1".into(),
            });
        }

        Ok(Self {
            db_path: lookup("MAIL_RULES_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./data/emails.db")),
            rules_path: lookup("MAIL_RULES_RULES_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./rules.json")),
            fetch_days: parse_or(&lookup, "MAIL_RULES_FETCH_DAYS", 3)?,
            max_results,
            fetch_concurrency,
            strategy: parse_or(&lookup, "MAIL_RULES_STRATEGY", MatchStrategy::InMemory)?,
            gmail_token,
            gmail_api_base: lookup("GMAIL_API_BASE").unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
        })
    }

    pub fn sync_window(&self) -> SyncWindow {
        SyncWindow {
            days: self.fetch_days,
            max_results: self.max_results,
            concurrency: self.fetch_concurrency,
        }
    }
}

fn parse_or<T, F>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        }),
    }
}
