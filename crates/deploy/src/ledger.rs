//! Ledger access: submitting creation transactions and waiting for confirmation.

use std::{future::Future, time::Duration};

use alloy_core::primitives::{Address, B256, Bytes};
use backon::{ConstantBuilder, Retryable};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{
    error::DeploymentFailure,
    rpc::{self, RpcError},
};

/// Default gas limit for a creation transaction (Ganache's default block gas limit).
pub const DEFAULT_GAS_LIMIT: u64 = 6_721_975;

/// Default interval between receipt polls.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 500;

/// Default number of receipt polls before giving up.
pub const DEFAULT_MAX_POLLS: usize = 240;

/// A confirmed contract creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Confirmation {
    /// The address the ledger assigned to the new contract.
    pub address: Address,
    /// The hash of the creation transaction.
    pub transaction_hash: B256,
}

/// A ledger that can create contracts.
///
/// `deploy` blocks until the ledger reports a definite outcome. Implementations
/// must not retry a failed creation: every submitted creation may consume gas.
pub trait Ledger: Send + Sync {
    /// The endpoint this ledger talks to, for logging.
    fn endpoint(&self) -> &str;

    /// Submit `init_code` (creation bytecode followed by encoded constructor
    /// arguments) and wait for the contract to be confirmed.
    fn deploy(
        &self,
        contract: &str,
        init_code: Bytes,
    ) -> impl Future<Output = Result<Confirmation, DeploymentFailure>> + Send;
}

/// Configuration for the JSON-RPC ledger client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Sender account. Defaults to the node's first unlocked account.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<Address>,
    /// Gas limit for each creation transaction.
    pub gas_limit: u64,
    /// Interval between receipt polls, in milliseconds.
    pub poll_interval_ms: u64,
    /// Number of receipt polls before the creation is reported unconfirmed.
    pub max_polls: usize,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            from: None,
            gas_limit: DEFAULT_GAS_LIMIT,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            max_polls: DEFAULT_MAX_POLLS,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransactionReceipt {
    #[serde(default)]
    contract_address: Option<Address>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    gas_used: Option<String>,
}

/// Outcome of a single receipt poll.
#[derive(Debug)]
enum ReceiptPoll {
    Pending,
    Failed(RpcError),
}

/// A [`Ledger`] backed by an Ethereum JSON-RPC node with unlocked accounts
/// (Ganache, Anvil, Hardhat).
#[derive(Debug, Clone)]
pub struct JsonRpcLedger {
    client: reqwest::Client,
    url: String,
    config: LedgerConfig,
}

impl JsonRpcLedger {
    pub fn new(url: impl Into<String>, config: LedgerConfig) -> Result<Self, anyhow::Error> {
        Ok(Self {
            client: rpc::create_client()?,
            url: url.into(),
            config,
        })
    }

    fn classify(&self, contract: &str, err: RpcError) -> DeploymentFailure {
        if err.is_transport() {
            DeploymentFailure::Unreachable {
                contract: contract.to_string(),
                endpoint: self.url.clone(),
                source: Box::new(err),
            }
        } else {
            DeploymentFailure::Rejected {
                contract: contract.to_string(),
                reason: err.to_string(),
            }
        }
    }

    async fn sender(&self, contract: &str) -> Result<Address, DeploymentFailure> {
        if let Some(from) = self.config.from {
            return Ok(from);
        }

        let accounts: Vec<Address> =
            rpc::json_rpc_call(&self.client, &self.url, "eth_accounts", vec![])
                .await
                .map_err(|e| self.classify(contract, e))?;

        accounts
            .first()
            .copied()
            .ok_or_else(|| DeploymentFailure::Rejected {
                contract: contract.to_string(),
                reason: "node exposes no unlocked account to deploy from".to_string(),
            })
    }

    async fn poll_receipt(&self, tx_hash: B256) -> Result<TransactionReceipt, ReceiptPoll> {
        let receipt: Option<TransactionReceipt> = rpc::json_rpc_call(
            &self.client,
            &self.url,
            "eth_getTransactionReceipt",
            vec![json!(tx_hash)],
        )
        .await
        .map_err(ReceiptPoll::Failed)?;

        receipt.ok_or(ReceiptPoll::Pending)
    }

    async fn wait_for_receipt(
        &self,
        contract: &str,
        tx_hash: B256,
    ) -> Result<TransactionReceipt, DeploymentFailure> {
        let backoff = ConstantBuilder::default()
            .with_delay(Duration::from_millis(self.config.poll_interval_ms))
            .with_max_times(self.config.max_polls);

        (|| self.poll_receipt(tx_hash))
            .retry(backoff)
            .when(|e| matches!(e, ReceiptPoll::Pending))
            .notify(|_, delay| {
                tracing::trace!(contract, %tx_hash, ?delay, "Receipt not yet available");
            })
            .await
            .map_err(|e| match e {
                ReceiptPoll::Pending => DeploymentFailure::Unconfirmed {
                    contract: contract.to_string(),
                    transaction_hash: tx_hash,
                },
                ReceiptPoll::Failed(err) => self.classify(contract, err),
            })
    }

    async fn has_code(&self, contract: &str, address: Address) -> Result<bool, DeploymentFailure> {
        let code: Bytes = rpc::json_rpc_call(
            &self.client,
            &self.url,
            "eth_getCode",
            vec![json!(address), json!("latest")],
        )
        .await
        .map_err(|e| self.classify(contract, e))?;

        Ok(!code.is_empty())
    }
}

impl Ledger for JsonRpcLedger {
    fn endpoint(&self) -> &str {
        &self.url
    }

    async fn deploy(&self, contract: &str, init_code: Bytes) -> Result<Confirmation, DeploymentFailure> {
        let from = self.sender(contract).await?;

        let transaction_hash: B256 = rpc::json_rpc_call(
            &self.client,
            &self.url,
            "eth_sendTransaction",
            vec![json!({
                "from": from,
                "data": init_code,
                "gas": format!("0x{:x}", self.config.gas_limit),
            })],
        )
        .await
        .map_err(|e| self.classify(contract, e))?;

        tracing::info!(contract, %from, %transaction_hash, "Creation transaction sent");

        let receipt = self.wait_for_receipt(contract, transaction_hash).await?;
        let confirmation = check_receipt(contract, transaction_hash, self.config.gas_limit, &receipt)?;

        if !self.has_code(contract, confirmation.address).await? {
            return Err(DeploymentFailure::MissingCode {
                contract: contract.to_string(),
                address: confirmation.address,
            });
        }

        Ok(confirmation)
    }
}

/// Turn a mined receipt into a confirmation, or the reason the creation failed.
fn check_receipt(
    contract: &str,
    transaction_hash: B256,
    gas_limit: u64,
    receipt: &TransactionReceipt,
) -> Result<Confirmation, DeploymentFailure> {
    // Pre-Byzantium nodes omit `status`; treat that as success and rely on the code check.
    let succeeded = receipt
        .status
        .as_deref()
        .and_then(rpc::parse_hex_u64)
        .is_none_or(|status| status == 1);

    if !succeeded {
        let gas_used = receipt.gas_used.as_deref().and_then(rpc::parse_hex_u64);
        return Err(if gas_used == Some(gas_limit) {
            DeploymentFailure::OutOfGas {
                contract: contract.to_string(),
                transaction_hash,
                gas_limit,
            }
        } else {
            DeploymentFailure::Reverted {
                contract: contract.to_string(),
                transaction_hash,
            }
        });
    }

    let address = receipt
        .contract_address
        .ok_or_else(|| DeploymentFailure::Rejected {
            contract: contract.to_string(),
            reason: format!("receipt for {transaction_hash} carries no contract address"),
        })?;

    Ok(Confirmation {
        address,
        transaction_hash,
    })
}

/// Append the ABI encoding of a single `address` constructor argument to `bytecode`.
pub fn encode_address_argument(bytecode: &Bytes, argument: Address) -> Bytes {
    let mut init_code = Vec::with_capacity(bytecode.len() + 32);
    init_code.extend_from_slice(bytecode);
    init_code.extend_from_slice(&[0u8; 12]);
    init_code.extend_from_slice(argument.as_slice());
    Bytes::from(init_code)
}
