//! Engine configuration.

use std::path::Path;

use alloy::primitives::Address;
use pmpool_core::PRICE_DENOMINATOR;
use serde::{Deserialize, Serialize};

use crate::error::{LedgerError, LedgerResult};

/// Pool engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Engine's own account at the outcome-token collaborator. Holds pooled
    /// inventory and unclaimed proceeds.
    #[serde(default = "default_custody_account")]
    pub custody_account: Address,

    /// Capacity of the event broadcast channel. Slow subscribers lag rather
    /// than block operations.
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,

    /// Fill cap as a share of current pool inventory (bps), applied when a
    /// fill request carries none. `None` = no cap.
    #[serde(default)]
    pub default_max_fill_bps: Option<u16>,

    /// Smallest accepted deposit in collaborator units.
    #[serde(default = "default_min_deposit")]
    pub min_deposit: u64,
}

fn default_custody_account() -> Address {
    Address::repeat_byte(0xcc)
}

fn default_event_channel_capacity() -> usize {
    1_024
}

fn default_min_deposit() -> u64 {
    1
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            custody_account: default_custody_account(),
            event_channel_capacity: default_event_channel_capacity(),
            default_max_fill_bps: None,
            min_deposit: default_min_deposit(),
        }
    }
}

impl EngineConfig {
    /// Load from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> LedgerResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| LedgerError::Config(format!("Failed to read config: {e}")))?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate TOML.
    pub fn from_toml_str(content: &str) -> LedgerResult<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| LedgerError::Config(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> LedgerResult<()> {
        if self.custody_account == Address::ZERO {
            return Err(LedgerError::Config(
                "custody_account must not be the zero address".to_string(),
            ));
        }
        if self.event_channel_capacity == 0 {
            return Err(LedgerError::Config(
                "event_channel_capacity must be > 0".to_string(),
            ));
        }
        if let Some(bps) = self.default_max_fill_bps {
            if bps == 0 || bps > PRICE_DENOMINATOR {
                return Err(LedgerError::Config(format!(
                    "default_max_fill_bps {bps} outside [1, {PRICE_DENOMINATOR}]"
                )));
            }
        }
        if self.min_deposit == 0 {
            return Err(LedgerError::Config("min_deposit must be > 0".to_string()));
        }
        Ok(())
    }
}
