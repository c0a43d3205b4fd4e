//! Compiled and deployed contract artifacts.

use std::path::Path;

use alloy_core::primitives::{Address, B256, Bytes};
use anyhow::{Context, Result};
use derive_more::{Deref, From};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The interface descriptor (ABI) of a contract, exactly as the compiler emitted it.
///
/// The document is opaque to the pipeline: it is read once from the compiled
/// artifact and handed to the publisher untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Deref, From)]
#[serde(transparent)]
pub struct InterfaceDescriptor(Value);

impl InterfaceDescriptor {
    /// Solidity types of the constructor inputs, in declaration order.
    ///
    /// An ABI without a constructor entry has an implicit no-argument constructor.
    pub fn constructor_inputs(&self) -> Vec<String> {
        let Some(entries) = self.0.as_array() else {
            return Vec::new();
        };

        entries
            .iter()
            .find(|entry| entry.get("type").and_then(Value::as_str) == Some("constructor"))
            .and_then(|ctor| ctor.get("inputs"))
            .and_then(Value::as_array)
            .map(|inputs| {
                inputs
                    .iter()
                    .map(|input| {
                        input
                            .get("type")
                            .and_then(Value::as_str)
                            .unwrap_or_default()
                            .to_string()
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn into_inner(self) -> Value {
        self.0
    }
}

/// Bytecode as it appears in Truffle (`"0x..."`) or Foundry (`{ "object": "0x..." }`) output.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawBytecode {
    Hex(Bytes),
    Object { object: Bytes },
}

impl From<RawBytecode> for Bytes {
    fn from(raw: RawBytecode) -> Self {
        match raw {
            RawBytecode::Hex(bytes) | RawBytecode::Object { object: bytes } => bytes,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawArtifact {
    contract_name: Option<String>,
    abi: Value,
    bytecode: RawBytecode,
}

/// A contract as produced by the compiler, before deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledContract {
    /// Contract name, used for logging and error reporting.
    pub name: String,
    /// The interface descriptor.
    pub abi: InterfaceDescriptor,
    /// Creation bytecode, without constructor arguments.
    pub bytecode: Bytes,
}

impl CompiledContract {
    pub fn new(name: impl Into<String>, abi: impl Into<InterfaceDescriptor>, bytecode: Bytes) -> Self {
        Self {
            name: name.into(),
            abi: abi.into(),
            bytecode,
        }
    }

    /// Parse a compiled artifact JSON document.
    ///
    /// `fallback_name` is used when the artifact carries no `contractName`
    /// (Foundry output does not).
    pub fn from_json(content: &str, fallback_name: &str) -> Result<Self> {
        let raw: RawArtifact =
            serde_json::from_str(content).context("Failed to parse compiled artifact JSON")?;

        if !raw.abi.is_array() {
            anyhow::bail!("Artifact ABI must be a JSON array");
        }

        Ok(Self {
            name: raw
                .contract_name
                .unwrap_or_else(|| fallback_name.to_string()),
            abi: InterfaceDescriptor(raw.abi),
            bytecode: raw.bytecode.into(),
        })
    }

    /// Load a compiled artifact from a file.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .context(format!("Failed to read artifact from {}", path.display()))?;

        let fallback_name = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or("contract");

        let contract = Self::from_json(&content, fallback_name)
            .context(format!("Invalid artifact {}", path.display()))?;

        tracing::debug!(
            path = %path.display(),
            contract = %contract.name,
            bytecode_len = contract.bytecode.len(),
            "Compiled artifact loaded"
        );

        Ok(contract)
    }
}

/// The data and app contracts of one pipeline run.
#[derive(Debug, Clone)]
pub struct ContractPair {
    /// The dependency-free contract, deployed first.
    pub data: CompiledContract,
    /// The contract whose constructor takes the data contract's address.
    pub app: CompiledContract,
}

impl ContractPair {
    /// Check that both contracts can be deployed in sequence.
    ///
    /// The data contract must take no constructor arguments and the app
    /// contract exactly one `address`.
    pub fn validate(&self) -> Result<(), String> {
        for contract in [&self.data, &self.app] {
            if contract.bytecode.is_empty() {
                return Err(format!("{} has no creation bytecode", contract.name));
            }
        }

        let data_inputs = self.data.abi.constructor_inputs();
        if !data_inputs.is_empty() {
            return Err(format!(
                "{} constructor must take no arguments, found ({})",
                self.data.name,
                data_inputs.join(",")
            ));
        }

        let app_inputs = self.app.abi.constructor_inputs();
        if app_inputs != ["address"] {
            return Err(format!(
                "{} constructor must take a single address, found ({})",
                self.app.name,
                app_inputs.join(",")
            ));
        }

        Ok(())
    }
}

/// A contract confirmed on-chain.
///
/// Only the sequencer creates these, so the address is always one the ledger
/// actually reported for a successful deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployedContract {
    name: String,
    address: Address,
    transaction_hash: B256,
    abi: InterfaceDescriptor,
}

impl DeployedContract {
    pub(crate) fn new(
        contract: &CompiledContract,
        address: Address,
        transaction_hash: B256,
    ) -> Self {
        Self {
            name: contract.name.clone(),
            address,
            transaction_hash,
            abi: contract.abi.clone(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn transaction_hash(&self) -> B256 {
        self.transaction_hash
    }

    pub fn abi(&self) -> &InterfaceDescriptor {
        &self.abi
    }
}
