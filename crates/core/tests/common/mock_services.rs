//! Mock wallet RPC for integration tests.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use escrow_bitcoin::{
    Amount, DecodedTransaction, RawTransactionClient, SignError, SignRawTransactionResult,
    TxInput, TxOutput,
};
use escrow_types::{EscrowError, Result};

/// Hex returned by `createrawtransaction`.
pub const UNSIGNED_SPEND: &str = "02000000ee";
/// Suffix appended by each signature.
pub const SIGNATURE: &str = "aa";

#[derive(Debug, Clone)]
pub struct CreatedTransaction {
    pub inputs: Vec<TxInput>,
    pub outputs: BTreeMap<String, Amount>,
}

#[derive(Debug, Default)]
struct MockState {
    calls: Vec<String>,
    new_addresses: u32,
    multisig: Vec<(u32, Vec<String>, String)>,
    created: Vec<CreatedTransaction>,
    signed: Vec<String>,
    broadcasts: Vec<String>,
    requested_txids: Vec<String>,
    sign_override: Option<Option<SignRawTransactionResult>>,
    fail_broadcast: bool,
}

/// Wallet double that behaves like one side of a 2-of-2 multisig.
///
/// Signing the freshly created spend yields a partial signature with the
/// node's "missing key" error; signing anything else completes it.
pub struct MockRawTransactionClient {
    escrow_value: Amount,
    state: Mutex<MockState>,
}

impl MockRawTransactionClient {
    pub fn new(escrow_value: Amount) -> Self {
        Self {
            escrow_value,
            state: Mutex::new(MockState::default()),
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn multisig_requests(&self) -> Vec<(u32, Vec<String>, String)> {
        self.state.lock().unwrap().multisig.clone()
    }

    pub fn created(&self) -> Vec<CreatedTransaction> {
        self.state.lock().unwrap().created.clone()
    }

    pub fn signed(&self) -> Vec<String> {
        self.state.lock().unwrap().signed.clone()
    }

    pub fn broadcasts(&self) -> Vec<String> {
        self.state.lock().unwrap().broadcasts.clone()
    }

    pub fn requested_txids(&self) -> Vec<String> {
        self.state.lock().unwrap().requested_txids.clone()
    }

    /// Answer every subsequent sign request with `result`.
    pub fn set_sign_result(&self, result: Option<SignRawTransactionResult>) {
        self.state.lock().unwrap().sign_override = Some(result);
    }

    pub fn set_fail_broadcast(&self, fail: bool) {
        self.state.lock().unwrap().fail_broadcast = fail;
    }

    fn record(&self, call: &str) {
        self.state.lock().unwrap().calls.push(call.to_string());
    }
}

/// Deterministic txid for the n-th broadcast.
pub fn txid_for(n: usize) -> String {
    format!("{:064x}", n + 1)
}

#[async_trait]
impl RawTransactionClient for MockRawTransactionClient {
    async fn add_multisig_address(
        &self,
        required: u32,
        pubkeys: &[String],
        label: &str,
    ) -> Result<String> {
        self.record("addmultisigaddress");
        self.state
            .lock()
            .unwrap()
            .multisig
            .push((required, pubkeys.to_vec(), label.to_string()));
        Ok("2MsEscrowMultisig".to_string())
    }

    async fn get_new_address(&self, _labels: &[String], _bech32: bool) -> Result<String> {
        self.record("getnewaddress");
        let mut state = self.state.lock().unwrap();
        state.new_addresses += 1;
        Ok(format!("release-addr-{}", state.new_addresses))
    }

    async fn get_raw_transaction(&self, txid: &str) -> Result<String> {
        self.record("getrawtransaction");
        self.state
            .lock()
            .unwrap()
            .requested_txids
            .push(txid.to_string());
        Ok(format!("0200lock{}", txid))
    }

    async fn decode_raw_transaction(&self, hex: &str) -> Result<DecodedTransaction> {
        self.record("decoderawtransaction");
        let txid = hex.trim_start_matches("0200lock").to_string();
        Ok(DecodedTransaction {
            txid,
            vout: vec![
                TxOutput {
                    value: Amount::from_sat(12_345),
                    n: 1,
                },
                TxOutput {
                    value: self.escrow_value,
                    n: 0,
                },
            ],
        })
    }

    async fn create_raw_transaction(
        &self,
        inputs: &[TxInput],
        outputs: &BTreeMap<String, Amount>,
    ) -> Result<String> {
        self.record("createrawtransaction");
        self.state.lock().unwrap().created.push(CreatedTransaction {
            inputs: inputs.to_vec(),
            outputs: outputs.clone(),
        });
        Ok(UNSIGNED_SPEND.to_string())
    }

    async fn sign_raw_transaction(&self, hex: &str) -> Result<Option<SignRawTransactionResult>> {
        self.record("signrawtransactionwithwallet");
        let mut state = self.state.lock().unwrap();
        state.signed.push(hex.to_string());
        if let Some(result) = &state.sign_override {
            return Ok(result.clone());
        }

        let partial = hex == UNSIGNED_SPEND;
        Ok(Some(SignRawTransactionResult {
            hex: format!("{}{}", hex, SIGNATURE),
            complete: !partial,
            errors: partial.then(|| {
                vec![SignError {
                    error: "Unable to sign input, invalid stack size (possibly missing key)"
                        .to_string(),
                }]
            }),
        }))
    }

    async fn send_raw_transaction(&self, hex: &str) -> Result<String> {
        self.record("sendrawtransaction");
        let mut state = self.state.lock().unwrap();
        if state.fail_broadcast {
            return Err(EscrowError::Rpc("RPC error -26: bad-txns-inputs-missingorspent".into()));
        }
        state.broadcasts.push(hex.to_string());
        Ok(txid_for(state.broadcasts.len() - 1))
    }
}
