//! Resolver configuration.
//!
//! Lookup order: explicit path, then `CWCOT_SCOUT_CONFIG`, then
//! `./cwcot-scout.json`, then defaults. Budget env overrides apply last.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::invoker::RetryPolicy;
use crate::locator::LocatorConfig;

pub const CONFIG_ENV: &str = "CWCOT_SCOUT_CONFIG";
pub const BUDGET_ENV: &str = "CWCOT_SCOUT_BUDGET_MS";
pub const EXTENSION_ENV: &str = "CWCOT_SCOUT_EXTENSION_MS";
pub const DEFAULT_CONFIG_FILE: &str = "cwcot-scout.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    pub retry: RetryPolicy,
    /// Whole-page attempts on transient context loss.
    pub page_attempts: u32,
    /// How long to wait for the document region to populate.
    pub tile_wait_ms: u64,
    pub navigation_timeout_ms: u64,
    pub budget_ms: u64,
    pub extension_ms: u64,
    /// Pages of artifact text handed to the classifier.
    pub extract_pages: usize,
    pub locator: LocatorConfig,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            page_attempts: 3,
            tile_wait_ms: 8_000,
            navigation_timeout_ms: 30_000,
            budget_ms: 90_000,
            extension_ms: 60_000,
            extract_pages: 3,
            locator: LocatorConfig::default(),
        }
    }
}

impl ResolverConfig {
    /// Parse a JSON config file. Missing fields take their defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("invalid config {}", path.display()))
    }

    /// Resolve and load the configuration, then apply env overrides.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut config = match config_path(explicit) {
            Some(path) => {
                debug!(path = %path.display(), "loading config");
                Self::from_file(&path)?
            }
            None => Self::default(),
        };
        config.apply_env()?;
        Ok(config)
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(ms) = env_millis(BUDGET_ENV)? {
            self.budget_ms = ms;
        }
        if let Some(ms) = env_millis(EXTENSION_ENV)? {
            self.extension_ms = ms;
        }
        Ok(())
    }

    pub fn budget(&self) -> Duration {
        Duration::from_millis(self.budget_ms)
    }

    pub fn extension(&self) -> Duration {
        Duration::from_millis(self.extension_ms)
    }

    pub fn tile_wait(&self) -> Duration {
        Duration::from_millis(self.tile_wait_ms)
    }
}

fn config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    if let Ok(path) = std::env::var(CONFIG_ENV) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }
    let local = PathBuf::from(DEFAULT_CONFIG_FILE);
    local.exists().then_some(local)
}

fn env_millis(name: &str) -> Result<Option<u64>> {
    match std::env::var(name) {
        Ok(value) if !value.trim().is_empty() => value
            .trim()
            .parse()
            .map(Some)
            .with_context(|| format!("{name} must be a number of milliseconds")),
        _ => Ok(None),
    }
}
