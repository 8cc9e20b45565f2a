//! Ledger transport abstraction.
//!
//! The gateways talk to the Registry and Asset contracts through
//! [`LedgerClient`], which exposes the three primitives every EVM-style node
//! offers: a read call, a transaction submission from the signing identity,
//! and a receipt lookup.

use async_trait::async_trait;
use ethers::types::{Address, Bytes, H256};
use std::fmt;

pub mod abi;
pub mod mock;
pub mod revert;
pub mod rpc;

pub use mock::MockLedger;
pub use revert::{classify_revert, RevertReason};
pub use rpc::JsonRpcLedger;

/// One emitted log record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub address: Address,
    pub topics: Vec<H256>,
    pub data: Bytes,
}

/// Finalized outcome of a submitted transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    pub tx_hash: H256,
    pub block_number: Option<u64>,
    /// `Some(1)` on success; `Some(0)` when execution reverted.
    pub status: Option<u64>,
    pub logs: Vec<LogRecord>,
}

impl Receipt {
    pub fn succeeded(&self) -> bool {
        self.status == Some(1)
    }
}

#[async_trait]
pub trait LedgerClient: Send + Sync + fmt::Debug {
    /// Executes a read-only call against `to` and returns the raw return data.
    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, LedgerError>;

    /// Submits a state-changing transaction signed by `from`.
    ///
    /// Returns the pending transaction hash. Execution rejected at submission
    /// time surfaces as [`LedgerError::Reverted`].
    async fn send_transaction(
        &self,
        from: Address,
        to: Address,
        data: Bytes,
    ) -> Result<H256, LedgerError>;

    /// Looks up the receipt of a transaction; `None` while it is not yet final.
    async fn transaction_receipt(&self, tx_hash: H256) -> Result<Option<Receipt>, LedgerError>;
}

/// Error type for ledger transport operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// Network error (connection refused, timeout, DNS failure)
    NetworkError(String),
    /// HTTP error from the node endpoint
    HttpError { status: u16, message: String },
    /// JSON-RPC error object without revert data
    RpcError { code: i64, message: String },
    /// Execution reverted; `data` holds the raw revert payload
    Reverted { data: Bytes, message: String },
    /// Response could not be parsed
    ParseError(String),
}

impl fmt::Display for LedgerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LedgerError::NetworkError(msg) => write!(f, "Network error: {}", msg),
            LedgerError::HttpError { status, message } => {
                write!(f, "HTTP error {}: {}", status, message)
            }
            LedgerError::RpcError { code, message } => {
                write!(f, "RPC error {}: {}", code, message)
            }
            LedgerError::Reverted { data, message } => {
                write!(f, "Execution reverted ({}): 0x{}", message, hex::encode(data))
            }
            LedgerError::ParseError(msg) => write!(f, "Parse error: {}", msg),
        }
    }
}

impl std::error::Error for LedgerError {}
