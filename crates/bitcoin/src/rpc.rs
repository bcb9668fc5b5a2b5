//! JSON-RPC client for the wallet daemon.
//!
//! Implements [`RawTransactionClient`] on top of the node's wallet RPCs. The
//! generic [`BitcoinRpcClient::call`] is public so other daemon services (secure
//! messaging) can share one authenticated connection.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use bitcoin::Amount;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use escrow_types::{EscrowError, Result};

use crate::client::{
    DecodedTransaction, RawTransactionClient, SignRawTransactionResult, TxInput,
};

/// RPC endpoint configuration.
#[derive(Debug, Clone)]
pub struct RpcConfig {
    pub url: String,
    pub user: String,
    pub password: String,
    pub timeout_secs: u64,
}

impl RpcConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let url = std::env::var("BITCOIN_RPC_URL")
            .unwrap_or_else(|_| "http://localhost:51735".to_string());
        let user = std::env::var("BITCOIN_RPC_USER").unwrap_or_else(|_| "test".to_string());
        let password =
            std::env::var("BITCOIN_RPC_PASSWORD").unwrap_or_else(|_| "test".to_string());

        Self {
            url,
            user,
            password,
            timeout_secs: 30,
        }
    }
}

pub struct BitcoinRpcClient {
    config: RpcConfig,
    client: reqwest::Client,
}

impl BitcoinRpcClient {
    pub fn new(config: RpcConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| EscrowError::Rpc(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { config, client })
    }

    pub fn from_env() -> Result<Self> {
        Self::new(RpcConfig::from_env())
    }

    /// Make an RPC call, treating a null result as an error.
    pub async fn call<T: DeserializeOwned>(&self, method: &str, params: Vec<Value>) -> Result<T> {
        self.call_optional(method, params)
            .await?
            .ok_or_else(|| EscrowError::Rpc(format!("{} returned null result", method)))
    }

    /// Make an RPC call that may legitimately return null.
    pub async fn call_optional<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Vec<Value>,
    ) -> Result<Option<T>> {
        debug!(method, "rpc call");

        let body = json!({
            "jsonrpc": "1.0",
            "id": "escrowd",
            "method": method,
            "params": params,
        });

        let response = self
            .client
            .post(&self.config.url)
            .basic_auth(&self.config.user, Some(&self.config.password))
            .json(&body)
            .send()
            .await
            .map_err(|e| EscrowError::Rpc(format!("RPC request failed: {}", e)))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| EscrowError::Rpc(format!("Failed to read RPC response: {}", e)))?;

        // Bitcoin Core answers RPC errors with HTTP 500 and a JSON error body.
        let parsed: RpcResponse<T> = match serde_json::from_str(&text) {
            Ok(parsed) => parsed,
            Err(_) if !status.is_success() => {
                return Err(EscrowError::Rpc(format!("RPC error {}: {}", status, text)));
            }
            Err(e) => {
                return Err(EscrowError::Serialization(format!(
                    "Failed to parse {} response: {}",
                    method, e
                )));
            }
        };

        if let Some(error) = parsed.error {
            return Err(EscrowError::Rpc(format!(
                "RPC error {}: {}",
                error.code, error.message
            )));
        }
        if !status.is_success() {
            return Err(EscrowError::Rpc(format!("RPC error {}: {}", status, text)));
        }

        Ok(parsed.result)
    }
}

#[async_trait]
impl RawTransactionClient for BitcoinRpcClient {
    async fn add_multisig_address(
        &self,
        required: u32,
        pubkeys: &[String],
        label: &str,
    ) -> Result<String> {
        let result: MultisigResult = self
            .call(
                "addmultisigaddress",
                vec![json!(required), json!(pubkeys), json!(label)],
            )
            .await?;
        Ok(result.into_address())
    }

    async fn get_new_address(&self, labels: &[String], bech32: bool) -> Result<String> {
        let mut params: Vec<Value> = labels.iter().map(|l| json!(l)).collect();
        params.push(json!(bech32));
        self.call("getnewaddress", params).await
    }

    async fn get_raw_transaction(&self, txid: &str) -> Result<String> {
        self.call("getrawtransaction", vec![json!(txid)]).await
    }

    async fn decode_raw_transaction(&self, hex: &str) -> Result<DecodedTransaction> {
        self.call("decoderawtransaction", vec![json!(hex)]).await
    }

    async fn create_raw_transaction(
        &self,
        inputs: &[TxInput],
        outputs: &BTreeMap<String, Amount>,
    ) -> Result<String> {
        let outputs: serde_json::Map<String, Value> = outputs
            .iter()
            .map(|(address, amount)| (address.clone(), json!(amount.to_btc())))
            .collect();
        self.call(
            "createrawtransaction",
            vec![json!(inputs), Value::Object(outputs)],
        )
        .await
    }

    async fn sign_raw_transaction(&self, hex: &str) -> Result<Option<SignRawTransactionResult>> {
        self.call_optional("signrawtransactionwithwallet", vec![json!(hex)])
            .await
    }

    async fn send_raw_transaction(&self, hex: &str) -> Result<String> {
        self.call("sendrawtransaction", vec![json!(hex)]).await
    }
}

// ============================================================================
// RPC Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i32,
    message: String,
}

/// Older wallets return the bare address, newer ones an object.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum MultisigResult {
    Address(String),
    Detailed { address: String },
}

impl MultisigResult {
    fn into_address(self) -> String {
        match self {
            MultisigResult::Address(address) | MultisigResult::Detailed { address } => address,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
