//! Engine configuration.

use serde::{Deserialize, Serialize};

use crate::error::{EscrowError, Result};

/// Share of a release between the releasing party and the counterparty.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct SplitRatio {
    pub local: u64,
    pub counterparty: u64,
}

impl SplitRatio {
    /// `None` when the two shares overflow a u64.
    pub fn total(&self) -> Option<u64> {
        self.local.checked_add(self.counterparty)
    }
}

impl Default for SplitRatio {
    fn default() -> Self {
        Self {
            local: 1,
            counterparty: 2,
        }
    }
}

/// Values the escrow engine needs at construction time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EscrowConfig {
    /// Sent as `version` in every outbound envelope.
    pub marketplace_version: String,
    /// Fee reserved per created output, in BTC.
    pub release_fee: f64,
    pub release_split: SplitRatio,
    pub multisig_required: u32,
    pub use_bech32: bool,
}

impl Default for EscrowConfig {
    fn default() -> Self {
        Self {
            marketplace_version: "0.0.1.0".to_string(),
            release_fee: 0.0001,
            release_split: SplitRatio::default(),
            multisig_required: 2,
            use_bech32: false,
        }
    }
}

impl EscrowConfig {
    pub fn validate(&self) -> Result<()> {
        if self.marketplace_version.is_empty() {
            return Err(EscrowError::Config(
                "marketplace_version must not be empty".to_string(),
            ));
        }
        if !self.release_fee.is_finite() || self.release_fee < 0.0 {
            return Err(EscrowError::Config(format!(
                "release_fee must be a non-negative amount, got {}",
                self.release_fee
            )));
        }
        match self.release_split.total() {
            Some(0) => {
                return Err(EscrowError::Config(
                    "release_split must have a non-zero total".to_string(),
                ))
            }
            None => {
                return Err(EscrowError::Config(
                    "release_split total overflows".to_string(),
                ))
            }
            Some(_) => {}
        }
        if self.multisig_required == 0 {
            return Err(EscrowError::Config(
                "multisig_required must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
