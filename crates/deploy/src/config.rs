//! The network configuration record handed to downstream consumers.

use std::collections::BTreeMap;

use alloy_core::primitives::Address;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::sequencer::{ConfirmedApp, ConfirmedData};

/// Default network name written to the config document.
pub const DEFAULT_NETWORK_NAME: &str = "localhost";

/// Default RPC endpoint (Ganache GUI).
pub const DEFAULT_RPC_URL: &str = "http://localhost:7545";

/// Where the deployed contracts live and how to reach them.
///
/// Built once per run by [`assemble`] and never modified afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkConfig {
    network_name: String,
    rpc_endpoint: String,
    data_address: Address,
    app_address: Address,
}

/// One network entry of the config document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkEntry {
    pub url: String,
    pub data_address: String,
    pub app_address: String,
}

/// Build the configuration record for a run.
///
/// Rejects an app deployment that was not linked against `data`: combining
/// results from different runs, or from out-of-order calls, is a programming
/// error and never produces a record.
pub fn assemble(
    network_name: &str,
    rpc_endpoint: &str,
    data: &ConfirmedData,
    app: &ConfirmedApp,
) -> Result<NetworkConfig, String> {
    validate_network(network_name, rpc_endpoint)?;

    if app.linked_data() != data.address() {
        return Err(format!(
            "app contract {} was deployed against data contract {}, not {}",
            app.address(),
            app.linked_data(),
            data.address()
        ));
    }

    Ok(NetworkConfig {
        network_name: network_name.to_string(),
        rpc_endpoint: rpc_endpoint.to_string(),
        data_address: data.address(),
        app_address: app.address(),
    })
}

/// Check the caller-supplied network identity.
pub fn validate_network(network_name: &str, rpc_endpoint: &str) -> Result<(), String> {
    if network_name.trim().is_empty() {
        return Err("network name must not be empty".to_string());
    }

    Url::parse(rpc_endpoint).map_err(|e| format!("invalid RPC endpoint {rpc_endpoint:?}: {e}"))?;

    Ok(())
}

impl NetworkConfig {
    pub fn network_name(&self) -> &str {
        &self.network_name
    }

    pub fn rpc_endpoint(&self) -> &str {
        &self.rpc_endpoint
    }

    pub fn data_address(&self) -> Address {
        self.data_address
    }

    pub fn app_address(&self) -> Address {
        self.app_address
    }

    /// The document shape consumers read: `{ <network>: { url, dataAddress, appAddress } }`.
    ///
    /// Addresses are EIP-55 checksummed.
    pub fn to_document(&self) -> BTreeMap<String, NetworkEntry> {
        BTreeMap::from([(
            self.network_name.clone(),
            NetworkEntry {
                url: self.rpc_endpoint.clone(),
                data_address: self.data_address.to_checksum(None),
                app_address: self.app_address.to_checksum(None),
            },
        )])
    }

    /// Read a published config document back.
    ///
    /// Fails unless the document holds exactly one network.
    pub fn from_document(bytes: &[u8]) -> Result<Self, anyhow::Error> {
        let document: BTreeMap<String, NetworkEntry> =
            serde_json::from_slice(bytes).context("Failed to parse config document")?;

        let mut entries = document.into_iter();
        let (network_name, entry) = entries.next().context("Config document is empty")?;
        if entries.next().is_some() {
            anyhow::bail!("Config document must describe exactly one network");
        }

        Ok(Self {
            network_name,
            rpc_endpoint: entry.url,
            data_address: entry
                .data_address
                .parse()
                .context("Invalid dataAddress in config document")?,
            app_address: entry
                .app_address
                .parse()
                .context("Invalid appAddress in config document")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        sequencer::DeploymentSequencer,
        test_utils::{ScriptedLedger, contract_pair},
    };

    async fn deploy(data: Address, app: Address) -> (ConfirmedData, ConfirmedApp) {
        let sequencer =
            DeploymentSequencer::new(ScriptedLedger::new().confirm(data).confirm(app));
        let deployments = sequencer.deploy(&contract_pair()).await.unwrap();
        (deployments.data, deployments.app)
    }

    #[tokio::test]
    async fn test_assemble_document_shape() {
        let (data, app) = deploy(Address::repeat_byte(0xaa), Address::repeat_byte(0xbb)).await;

        let config = assemble("localhost", "http://localhost:7545", &data, &app).unwrap();
        let document = serde_json::to_value(config.to_document()).unwrap();

        assert_eq!(
            document,
            serde_json::json!({
                "localhost": {
                    "url": "http://localhost:7545",
                    "dataAddress": Address::repeat_byte(0xaa).to_checksum(None),
                    "appAddress": Address::repeat_byte(0xbb).to_checksum(None),
                }
            })
        );
    }

    #[tokio::test]
    async fn test_assemble_rejects_app_from_another_run() {
        let (data_1, _) = deploy(Address::repeat_byte(0x01), Address::repeat_byte(0x02)).await;
        let (_, app_2) = deploy(Address::repeat_byte(0x03), Address::repeat_byte(0x04)).await;

        let err = assemble("localhost", DEFAULT_RPC_URL, &data_1, &app_2).unwrap_err();
        assert!(err.contains("was deployed against data contract"));
    }

    #[tokio::test]
    async fn test_assemble_rejects_bad_inputs() {
        let (data, app) = deploy(Address::repeat_byte(0xaa), Address::repeat_byte(0xbb)).await;

        assert!(assemble("  ", DEFAULT_RPC_URL, &data, &app).is_err());
        assert!(assemble("localhost", "not a url", &data, &app).is_err());
    }

    #[tokio::test]
    async fn test_document_parses_back() {
        let (data, app) = deploy(Address::repeat_byte(0xaa), Address::repeat_byte(0xbb)).await;
        let config = assemble("localhost", DEFAULT_RPC_URL, &data, &app).unwrap();

        let bytes = serde_json::to_vec(&config.to_document()).unwrap();
        assert_eq!(NetworkConfig::from_document(&bytes).unwrap(), config);
    }

    #[test]
    fn test_from_document_rejects_multiple_networks() {
        let bytes = br#"{
            "a": {"url": "http://a", "dataAddress": "0x0000000000000000000000000000000000000001", "appAddress": "0x0000000000000000000000000000000000000002"},
            "b": {"url": "http://b", "dataAddress": "0x0000000000000000000000000000000000000001", "appAddress": "0x0000000000000000000000000000000000000002"}
        }"#;
        assert!(NetworkConfig::from_document(bytes).is_err());
    }
}
