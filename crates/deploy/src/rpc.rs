//! JSON-RPC transaction submission.
//!
//! [`RpcSubmitter`] deploys contracts through `eth_sendTransaction` from an account managed by
//! the node, then polls `eth_getTransactionReceipt` until the creation is mined.

use std::time::Duration;

use alloy_core::primitives::{Address, B256, Bytes};
use anyhow::Context;
use backon::{ConstantBuilder, Retryable};
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::Value;
use url::Url;

use crate::{ArgValue, DeployError, Deployment, TxSubmitter, encode_constructor_args};

/// Per-request HTTP timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

pub fn create_client() -> Result<reqwest::Client, anyhow::Error> {
    reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .context("Failed to build RPC client")
}

/// Call `method` on the node at `url` and deserialize its `result`.
///
/// A JSON-RPC `error` object is turned into an error carrying its code and message.
pub async fn json_rpc_call<T: DeserializeOwned>(
    client: &reqwest::Client,
    url: &Url,
    method: &str,
    params: Vec<Value>,
) -> Result<T, anyhow::Error> {
    let body = serde_json::json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": method,
        "params": params,
    });

    let mut reply: Value = client
        .post(url.clone())
        .json(&body)
        .send()
        .await
        .with_context(|| format!("{method} request to {url} failed"))?
        .json()
        .await
        .with_context(|| format!("{method} returned a non-JSON reply"))?;

    if let Some(error) = reply.get("error") {
        let code = error.get("code").and_then(Value::as_i64).unwrap_or_default();
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("no message");
        anyhow::bail!("{method} failed with RPC error {code}: {message}");
    }

    let result = reply
        .get_mut("result")
        .map(Value::take)
        .with_context(|| format!("{method} reply has no result"))?;

    serde_json::from_value(result).with_context(|| format!("Unexpected {method} result"))
}

/// Parse a `0x`-prefixed hex quantity.
fn parse_quantity(s: &str) -> Result<u64, anyhow::Error> {
    u64::from_str_radix(s.trim_start_matches("0x"), 16)
        .with_context(|| format!("Invalid hex quantity: {s}"))
}

/// First account managed by the node behind `rpc_url` (`eth_accounts`).
pub async fn first_node_account(rpc_url: &Url) -> Result<Address, anyhow::Error> {
    let client = create_client()?;
    let accounts: Vec<Address> =
        json_rpc_call(&client, rpc_url, "eth_accounts", vec![]).await?;

    accounts
        .into_iter()
        .next()
        .context("Node manages no accounts; set network.deployer to an unlocked account")
}

/// Subset of a transaction receipt needed to confirm a contract creation.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransactionReceipt {
    transaction_hash: B256,
    contract_address: Option<Address>,
    /// `0x1` on success, `0x0` on revert. Absent on pre-Byzantium chains.
    status: Option<String>,
}

impl TransactionReceipt {
    fn into_deployment(self) -> Result<Deployment, DeployError> {
        if self.status.as_deref() == Some("0x0") {
            return Err(DeployError::Reverted {
                tx_hash: self.transaction_hash,
            });
        }

        let address = self.contract_address.ok_or_else(|| {
            DeployError::SubmissionError(format!(
                "receipt for {} has no contract address",
                self.transaction_hash
            ))
        })?;

        Ok(Deployment {
            address,
            tx_hash: self.transaction_hash,
        })
    }
}

/// Settings for [`RpcSubmitter`].
#[derive(Debug, Clone)]
pub struct RpcSubmitterConfig {
    /// JSON-RPC endpoint.
    pub rpc_url: Url,
    /// Node-managed account that sends the creation transactions.
    pub from: Address,
    /// Optional gas limit; the node estimates it when unset.
    pub gas_limit: Option<u64>,
    /// How long to wait for a receipt before giving up.
    pub confirmation_timeout: Duration,
    /// Delay between two receipt polls.
    pub poll_interval: Duration,
}

/// [`TxSubmitter`] backed by an Ethereum JSON-RPC endpoint.
#[derive(Debug, Clone)]
pub struct RpcSubmitter {
    client: reqwest::Client,
    config: RpcSubmitterConfig,
}

impl RpcSubmitter {
    pub fn new(config: RpcSubmitterConfig) -> Result<Self, anyhow::Error> {
        Ok(Self {
            client: create_client()?,
            config,
        })
    }

    pub fn config(&self) -> &RpcSubmitterConfig {
        &self.config
    }

    /// Query `eth_chainId`.
    pub async fn chain_id(&self) -> Result<u64, anyhow::Error> {
        let id: String =
            json_rpc_call(&self.client, &self.config.rpc_url, "eth_chainId", vec![])
                .await?;
        parse_quantity(&id)
    }

    /// Fail unless the endpoint serves `expected`.
    pub async fn verify_chain_id(&self, expected: u64) -> Result<(), anyhow::Error> {
        let actual = self
            .chain_id()
            .await
            .context("Failed to query chain id - is the RPC endpoint reachable?")?;

        if actual != expected {
            anyhow::bail!(
                "RPC endpoint {} serves chain {}, expected {}",
                self.config.rpc_url,
                actual,
                expected
            );
        }

        Ok(())
    }

    fn creation_tx(&self, bytecode: &Bytes, constructor_args: &[ArgValue]) -> Value {
        let mut data = bytecode.to_vec();
        data.extend(encode_constructor_args(constructor_args));

        let mut tx = serde_json::json!({
            "from": self.config.from,
            "data": format!("0x{}", hex::encode(data)),
        });
        if let Some(gas) = self.config.gas_limit {
            tx["gas"] = Value::String(format!("0x{gas:x}"));
        }
        tx
    }

    async fn wait_for_receipt(&self, tx_hash: B256) -> Result<TransactionReceipt, DeployError> {
        let client = &self.client;
        let url = &self.config.rpc_url;
        let fetch = || async move {
            let receipt: Option<TransactionReceipt> = json_rpc_call(
                client,
                url,
                "eth_getTransactionReceipt",
                vec![serde_json::json!(tx_hash)],
            )
            .await
            .map_err(ReceiptPoll::Failed)?;
            receipt.ok_or(ReceiptPoll::Pending)
        };

        let polling = fetch
            .retry(
                ConstantBuilder::default()
                    .with_delay(self.config.poll_interval)
                    .with_max_times(usize::MAX),
            )
            .when(|e| matches!(e, ReceiptPoll::Pending))
            .notify(|_, _| {
                tracing::trace!(%tx_hash, "Receipt not available yet, retrying...");
            });

        let timed_out = || DeployError::ConfirmationTimeout {
            tx_hash,
            timeout_secs: self.config.confirmation_timeout.as_secs(),
        };

        match tokio::time::timeout(self.config.confirmation_timeout, polling).await {
            Ok(Ok(receipt)) => Ok(receipt),
            Ok(Err(ReceiptPoll::Failed(e))) => Err(DeployError::SubmissionError(format!(
                "receipt query for {tx_hash} failed: {e:#}"
            ))),
            Ok(Err(ReceiptPoll::Pending)) | Err(_) => Err(timed_out()),
        }
    }
}

/// Outcome of one failed receipt poll.
#[derive(Debug)]
enum ReceiptPoll {
    /// The node has no receipt yet.
    Pending,
    /// The query itself failed.
    Failed(anyhow::Error),
}

impl TxSubmitter for RpcSubmitter {
    async fn deploy(
        &self,
        bytecode: Bytes,
        constructor_args: &[ArgValue],
    ) -> Result<Deployment, DeployError> {
        let tx = self.creation_tx(&bytecode, constructor_args);

        let tx_hash: B256 = json_rpc_call(
            &self.client,
            &self.config.rpc_url,
            "eth_sendTransaction",
            vec![tx],
        )
        .await
        .map_err(|e| DeployError::SubmissionError(format!("{e:#}")))?;

        tracing::info!(%tx_hash, from = %self.config.from, "Creation transaction sent");

        self.wait_for_receipt(tx_hash).await?.into_deployment()
    }
}

#[cfg(test)]
mod tests {
    use alloy_core::primitives::address;

    use super::*;

    fn submitter(gas_limit: Option<u64>) -> RpcSubmitter {
        RpcSubmitter::new(RpcSubmitterConfig {
            rpc_url: Url::parse("http://localhost:8545").unwrap(),
            from: address!("0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266"),
            gas_limit,
            confirmation_timeout: Duration::from_secs(1),
            poll_interval: Duration::from_millis(10),
        })
        .unwrap()
    }

    #[test]
    fn test_parse_quantity() {
        assert_eq!(parse_quantity("0x92").unwrap(), 146);
        assert_eq!(parse_quantity("0x1").unwrap(), 1);
        assert!(parse_quantity("0xzz").is_err());
    }

    #[test]
    fn test_creation_tx_appends_args() {
        let tx = submitter(None).creation_tx(
            &Bytes::from_static(&[0x60, 0x80]),
            &[ArgValue::Address(Address::with_last_byte(1))],
        );

        let data = tx["data"].as_str().unwrap();
        assert_eq!(data.len(), 2 + 4 + 64);
        assert!(data.starts_with("0x6080"));
        assert!(data.ends_with("01"));
        assert!(tx.get("to").is_none());
        assert!(tx.get("gas").is_none());
        assert_eq!(
            tx["from"].as_str().unwrap().to_lowercase(),
            "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266"
        );
    }

    #[test]
    fn test_creation_tx_gas_limit() {
        let tx = submitter(Some(3_000_000)).creation_tx(&Bytes::new(), &[]);
        assert_eq!(tx["gas"], "0x2dc6c0");
        assert_eq!(tx["data"], "0x");
    }

    #[test]
    fn test_receipt_success() {
        let receipt: TransactionReceipt = serde_json::from_value(serde_json::json!({
            "transactionHash": format!("0x{}", "ab".repeat(32)),
            "contractAddress": "0x5fbdb2315678afecb367f032d93f642f64180aa3",
            "status": "0x1",
            "blockNumber": "0x10"
        }))
        .unwrap();

        let deployment = receipt.into_deployment().unwrap();
        assert_eq!(
            deployment.address,
            address!("0x5FbDB2315678afecb367f032d93F642f64180aa3")
        );
        assert_eq!(deployment.tx_hash, B256::repeat_byte(0xab));
    }

    #[test]
    fn test_receipt_reverted() {
        let receipt: TransactionReceipt = serde_json::from_value(serde_json::json!({
            "transactionHash": format!("0x{}", "cd".repeat(32)),
            "contractAddress": null,
            "status": "0x0"
        }))
        .unwrap();

        assert!(matches!(
            receipt.into_deployment(),
            Err(DeployError::Reverted { tx_hash }) if tx_hash == B256::repeat_byte(0xcd)
        ));
    }

    #[test]
    fn test_receipt_without_contract_address() {
        let receipt: TransactionReceipt = serde_json::from_value(serde_json::json!({
            "transactionHash": format!("0x{}", "01".repeat(32)),
            "status": "0x1"
        }))
        .unwrap();

        assert!(matches!(
            receipt.into_deployment(),
            Err(DeployError::SubmissionError(_))
        ));
    }
}
