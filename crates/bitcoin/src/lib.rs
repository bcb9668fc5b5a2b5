//! Bitcoin-family wallet access for the escrow engine.

pub mod amounts;
pub mod client;
pub mod rpc;

pub use client::{
    DecodedTransaction, RawTransactionClient, SignError, SignRawTransactionResult, TxInput,
    TxOutput,
};
pub use rpc::{BitcoinRpcClient, RpcConfig};

pub use bitcoin::Amount;
