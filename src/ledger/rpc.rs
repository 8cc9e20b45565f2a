//! JSON-RPC 2.0 ledger client over HTTP.

use super::{LedgerClient, LedgerError, LogRecord, Receipt};
use async_trait::async_trait;
use ethers::types::{Address, Bytes, Log, H256, U64};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::debug;

/// Upper bound on a single JSON-RPC round trip.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Ledger client talking to an EVM-compatible node.
///
/// Reads go through `eth_call` against the latest block. Writes go through
/// `eth_sendTransaction`, so the node (or a signer proxy in front of it) holds
/// the key for the configured signing identity.
#[derive(Debug)]
pub struct JsonRpcLedger {
    client: Client,
    url: String,
    next_id: AtomicU64,
}

impl JsonRpcLedger {
    pub fn new(url: String) -> Self {
        Self {
            client: Client::new(),
            url,
            next_id: AtomicU64::new(1),
        }
    }

    async fn request(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<serde_json::Value, LedgerError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let payload = serde_json::json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        debug!(method, id, "json-rpc request");

        let response = self
            .client
            .post(&self.url)
            .timeout(REQUEST_TIMEOUT)
            .json(&payload)
            .send()
            .await
            .map_err(|e| LedgerError::NetworkError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(LedgerError::HttpError {
                status: status.as_u16(),
                message: status
                    .canonical_reason()
                    .unwrap_or("Unexpected status")
                    .to_string(),
            });
        }

        let body: RpcResponse = response
            .json()
            .await
            .map_err(|e| LedgerError::ParseError(e.to_string()))?;

        if let Some(error) = body.error {
            return Err(error.into_ledger_error());
        }
        Ok(body.result.unwrap_or(serde_json::Value::Null))
    }
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    result: Option<serde_json::Value>,
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
    #[serde(default)]
    data: Option<serde_json::Value>,
}

impl RpcErrorObject {
    /// Nodes report revert data either as a bare hex string or nested as
    /// `{ "data": "0x…" }`.
    fn revert_data(&self) -> Option<Bytes> {
        let raw = match self.data.as_ref()? {
            serde_json::Value::String(s) => s.as_str(),
            serde_json::Value::Object(map) => map.get("data")?.as_str()?,
            _ => return None,
        };
        serde_json::from_value(serde_json::Value::String(raw.to_string())).ok()
    }

    fn into_ledger_error(self) -> LedgerError {
        match self.revert_data() {
            Some(data) => LedgerError::Reverted {
                data,
                message: self.message,
            },
            None => LedgerError::RpcError {
                code: self.code,
                message: self.message,
            },
        }
    }
}

fn decode_result<T: DeserializeOwned>(
    value: serde_json::Value,
    what: &str,
) -> Result<T, LedgerError> {
    serde_json::from_value(value)
        .map_err(|e| LedgerError::ParseError(format!("Expected {}: {}", what, e)))
}

/// Receipt fields this client needs; values use the node's hex encoding.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawReceipt {
    transaction_hash: H256,
    block_number: Option<U64>,
    status: Option<U64>,
    #[serde(default)]
    logs: Vec<Log>,
}

fn parse_receipt(value: serde_json::Value) -> Result<Option<Receipt>, LedgerError> {
    let Some(raw) = decode_result::<Option<RawReceipt>>(value, "receipt")? else {
        return Ok(None);
    };
    Ok(Some(Receipt {
        tx_hash: raw.transaction_hash,
        block_number: raw.block_number.map(|n| n.as_u64()),
        status: raw.status.map(|s| s.as_u64()),
        logs: raw
            .logs
            .into_iter()
            .map(|log| LogRecord {
                address: log.address,
                topics: log.topics,
                data: log.data,
            })
            .collect(),
    }))
}

#[async_trait]
impl LedgerClient for JsonRpcLedger {
    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, LedgerError> {
        let params = serde_json::json!([{ "to": to, "data": data }, "latest"]);
        let result = self.request("eth_call", params).await?;
        decode_result(result, "hex call result")
    }

    async fn send_transaction(
        &self,
        from: Address,
        to: Address,
        data: Bytes,
    ) -> Result<H256, LedgerError> {
        let params = serde_json::json!([{ "from": from, "to": to, "data": data }]);
        let result = self.request("eth_sendTransaction", params).await?;
        decode_result(result, "transaction hash")
    }

    async fn transaction_receipt(&self, tx_hash: H256) -> Result<Option<Receipt>, LedgerError> {
        let params = serde_json::json!([tx_hash]);
        let result = self.request("eth_getTransactionReceipt", params).await?;
        parse_receipt(result)
    }
}
