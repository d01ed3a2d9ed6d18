//! Runtime configuration for an [`AddressLedger`](crate::ledger::AddressLedger).

use crate::constants::{
    DEFAULT_LOG_LEVEL, DEFAULT_SCOPE, ENV_AUDIT, ENV_DEFAULT_SCOPE, ENV_LOG_LEVEL,
};
use crate::errors::{Error, Result};
use crate::window::{resolve_window, WindowQuery};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Window used when a query names neither a scope nor a full range.
    pub default_scope: String,
    pub log_level: String,
    /// Emit one audit record per committed mutation.
    pub audit: bool,
    /// Seed the sixteen Tier0 blocks into a fresh in-memory store.
    pub seed_tier0: bool,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            default_scope: DEFAULT_SCOPE.to_string(),
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            audit: true,
            seed_tier0: true,
        }
    }
}

impl LedgerConfig {
    /// Load from a YAML file, then validate.
    pub fn load(path: &Path) -> Result<Self> {
        info!("Loading ledger configuration from: {:?}", path);
        let file = File::open(path).map_err(|e| Error::Config(format!("{path:?}: {e}")))?;
        let config: LedgerConfig =
            serde_yaml::from_reader(file).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_str(s: &str) -> Result<Self> {
        let config: LedgerConfig =
            serde_yaml::from_str(s).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Override fields from `MCASTMAP_*` environment variables.
    pub fn apply_env(mut self) -> Result<Self> {
        if let Ok(scope) = std::env::var(ENV_DEFAULT_SCOPE) {
            self.default_scope = scope;
        }
        if let Ok(level) = std::env::var(ENV_LOG_LEVEL) {
            self.log_level = level;
        }
        if let Ok(raw) = std::env::var(ENV_AUDIT) {
            match parse_bool(&raw) {
                Some(v) => self.audit = v,
                None => warn!("ignoring {ENV_AUDIT}={raw:?}: expected a boolean"),
            }
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        let query = WindowQuery::scope(&self.default_scope);
        resolve_window(&query, &self.default_scope)
            .map_err(|e| Error::Config(format!("default_scope: {e}")))?;
        if self.log_level.trim().is_empty() {
            return Err(Error::Config("log_level must not be empty".into()));
        }
        Ok(())
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
