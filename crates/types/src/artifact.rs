//! The `rawtx` protocol artifact.
//!
//! The same order item object holds a negotiated transaction, a broadcast
//! reference or a partially/fully signed transaction depending on how far the
//! protocol has progressed. Storing the phase next to the value lets every step
//! check that it consumes what it expects instead of guessing from context.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{EscrowError, Result};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum RawTxPhase {
    /// Unsigned or buyer-signable transaction agreed during bidding.
    NegotiatedHex,
    /// Transaction id returned by the node after broadcast.
    BroadcastRef,
    /// Carries one of the required signatures.
    PartialHex,
    /// Fully signed, not yet confirmed as broadcast.
    FinalHex,
}

impl RawTxPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            RawTxPhase::NegotiatedHex => "negotiated-hex",
            RawTxPhase::BroadcastRef => "broadcast-ref",
            RawTxPhase::PartialHex => "partial-hex",
            RawTxPhase::FinalHex => "final-hex",
        }
    }
}

impl fmt::Display for RawTxPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RawTxArtifact {
    pub phase: RawTxPhase,
    pub value: String,
}

impl RawTxArtifact {
    /// Tag a value, rejecting empty values and non-hex transaction bodies.
    pub fn new(phase: RawTxPhase, value: impl Into<String>) -> Result<Self> {
        let value = value.into();
        if value.is_empty() {
            return Err(EscrowError::protocol(format!("Empty rawtx for phase {}", phase)));
        }
        if hex::decode(&value).is_err() {
            return Err(EscrowError::protocol(format!(
                "rawtx for phase {} is not valid hex",
                phase
            )));
        }
        Ok(Self { phase, value })
    }

    /// Read a stored `rawtx` object value.
    ///
    /// Values written before phases were tracked are plain strings; those can
    /// only come from bid negotiation and are read as [`RawTxPhase::NegotiatedHex`].
    pub fn parse(stored: &str) -> Result<Self> {
        let trimmed = stored.trim();
        if trimmed.starts_with('{') {
            let tagged: RawTxArtifact = serde_json::from_str(trimmed)?;
            return Self::new(tagged.phase, tagged.value);
        }
        Self::new(RawTxPhase::NegotiatedHex, trimmed)
    }

    pub fn to_stored(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Borrow the value if it is in `phase`, otherwise fail with a protocol violation.
    pub fn expect_phase(&self, phase: RawTxPhase) -> Result<&str> {
        if self.phase != phase {
            return Err(EscrowError::protocol(format!(
                "Expected rawtx in phase {}, found {}",
                phase, self.phase
            )));
        }
        Ok(&self.value)
    }
}
