//! Session configuration.
//!
//! Timing and quoting parameters of a bond session. Loaded from a JSON file
//! or from `BLUSD_*` environment variables and validated before use.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::core::token::AccountId;
use crate::error::{Error, Result};
use crate::utils::constants::*;
use crate::utils::math::Decimal;

// ═══════════════════════════════════════════════════════════════════════════════
// SESSION CONFIGURATION
// ═══════════════════════════════════════════════════════════════════════════════

/// Configuration of a bond session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Account whose bonds and balances are tracked
    pub account: AccountId,
    /// Seconds between periodic refreshes
    pub sync_interval_secs: u64,
    /// Seconds between allowance polls
    pub approval_poll_secs: u64,
    /// Seconds a fetched APY set stays fresh
    pub apy_cache_ttl_secs: u64,
    /// bLUSD amount used for the marginal price quote
    pub marginal_quote_input: Decimal,
    /// Spawn allowance watchers when the session starts
    pub watch_approvals: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        let (mantissa, scale) = MARGINAL_QUOTE_INPUT;
        Self {
            account: AccountId::from("0x0000000000000000000000000000000000000000"),
            sync_interval_secs: DEFAULT_SYNC_INTERVAL_SECS,
            approval_poll_secs: DEFAULT_APPROVAL_POLL_SECS,
            apy_cache_ttl_secs: DEFAULT_APY_CACHE_TTL_SECS,
            marginal_quote_input: Decimal::new(mantissa, scale),
            watch_approvals: true,
        }
    }
}

impl SessionConfig {
    /// Create a configuration for an account
    pub fn new(account: AccountId) -> Self {
        Self {
            account,
            ..Default::default()
        }
    }

    /// Refresh interval
    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_secs)
    }

    /// Allowance poll interval
    pub fn approval_poll_interval(&self) -> Duration {
        Duration::from_secs(self.approval_poll_secs)
    }

    /// APY cache time-to-live
    pub fn apy_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.apy_cache_ttl_secs)
    }

    /// Load from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;

        let config: Self = serde_json::from_str(&content)
            .map_err(|e| Error::Deserialization(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save to a JSON file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| Error::Serialization(e.to_string()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::Config(format!("{}: {}", parent.display(), e)))?;
        }

        std::fs::write(path, content)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }

    /// Load from environment variables, falling back to defaults
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(account) = std::env::var("BLUSD_ACCOUNT") {
            config.account = AccountId(account);
        }

        if let Some(secs) = env_u64("BLUSD_SYNC_INTERVAL") {
            config.sync_interval_secs = secs;
        }

        if let Some(secs) = env_u64("BLUSD_APPROVAL_POLL") {
            config.approval_poll_secs = secs;
        }

        if let Some(secs) = env_u64("BLUSD_APY_TTL") {
            config.apy_cache_ttl_secs = secs;
        }

        if let Ok(amount) = std::env::var("BLUSD_MARGINAL_INPUT") {
            if let Ok(amount) = amount.parse() {
                config.marginal_quote_input = amount;
            }
        }

        config
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.account.0.is_empty() {
            return Err(Error::Config("account cannot be empty".into()));
        }

        if self.sync_interval_secs == 0 {
            return Err(Error::Config("sync interval must be greater than 0".into()));
        }

        if self.approval_poll_secs == 0 {
            return Err(Error::Config("approval poll interval must be greater than 0".into()));
        }

        if !self.marginal_quote_input.is_positive() {
            return Err(Error::Config("marginal quote input must be positive".into()));
        }

        Ok(())
    }
}

fn env_u64(name: &str) -> Option<u64> {
    std::env::var(name).ok().and_then(|value| value.parse().ok())
}
