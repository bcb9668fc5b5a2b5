//! Wallet operations the escrow protocol needs from the node.

use std::collections::BTreeMap;

use async_trait::async_trait;
use bitcoin::Amount;
use serde::{Deserialize, Serialize};

use escrow_types::Result;

/// Outpoint spent by a created transaction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TxInput {
    pub txid: String,
    pub vout: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TxOutput {
    #[serde(with = "bitcoin::amount::serde::as_btc")]
    pub value: Amount,
    pub n: u32,
}

/// Subset of `decoderawtransaction` the protocol reads.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DecodedTransaction {
    pub txid: String,
    #[serde(default)]
    pub vout: Vec<TxOutput>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SignError {
    pub error: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SignRawTransactionResult {
    pub hex: String,
    pub complete: bool,
    #[serde(default)]
    pub errors: Option<Vec<SignError>>,
}

/// Raw transaction and wallet RPCs used while locking and releasing escrow.
#[async_trait]
pub trait RawTransactionClient: Send + Sync {
    /// Create a `required`-of-N multisig address and add it to the wallet.
    async fn add_multisig_address(
        &self,
        required: u32,
        pubkeys: &[String],
        label: &str,
    ) -> Result<String>;

    async fn get_new_address(&self, labels: &[String], bech32: bool) -> Result<String>;

    /// Fetch the hex of a transaction by id.
    async fn get_raw_transaction(&self, txid: &str) -> Result<String>;

    async fn decode_raw_transaction(&self, hex: &str) -> Result<DecodedTransaction>;

    async fn create_raw_transaction(
        &self,
        inputs: &[TxInput],
        outputs: &BTreeMap<String, Amount>,
    ) -> Result<String>;

    /// Sign with the wallet keys. `None` when the node returned no result.
    async fn sign_raw_transaction(&self, hex: &str) -> Result<Option<SignRawTransactionResult>>;

    /// Broadcast, returning the transaction id.
    async fn send_raw_transaction(&self, hex: &str) -> Result<String>;
}
