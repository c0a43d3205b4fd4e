//! Wiring the sequencer, assembler and publisher into one run, and its TOML configuration.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::{
    artifact::{CompiledContract, ContractPair},
    config::{self, DEFAULT_NETWORK_NAME, DEFAULT_RPC_URL, NetworkConfig},
    error::PipelineError,
    ledger::{JsonRpcLedger, Ledger, LedgerConfig},
    publish::{
        ArtifactPublisher, Descriptors, DocumentKind, DocumentSpec, FsSink, PublishReport,
        PublishTarget,
    },
    sequencer::{DeploymentSequencer, Deployments},
};

/// The default name for the pipeline configuration file.
pub const PIPELINE_CONF_FILENAME: &str = "FlightSurety.toml";

/// Default directory holding the web and server consumers.
pub const DEFAULT_PAGES_ROOT: &str = "flightsurety_app/pages";

/// Default compiled artifact of the data contract.
pub const DEFAULT_DATA_ARTIFACT: &str = "build/contracts/FlightSuretyData.json";

/// Default compiled artifact of the app contract.
pub const DEFAULT_APP_ARTIFACT: &str = "build/contracts/FlightSuretyApp.json";

/// Compiled artifact locations for both contracts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractsConfig {
    /// Artifact of the dependency-free data contract.
    pub data: PathBuf,
    /// Artifact of the app contract, whose constructor takes the data address.
    pub app: PathBuf,
}

impl Default for ContractsConfig {
    fn default() -> Self {
        Self {
            data: PathBuf::from(DEFAULT_DATA_ARTIFACT),
            app: PathBuf::from(DEFAULT_APP_ARTIFACT),
        }
    }
}

impl ContractsConfig {
    pub fn load(&self) -> Result<ContractPair> {
        Ok(ContractPair {
            data: CompiledContract::load_from_file(&self.data)
                .context("Failed to load data contract artifact")?,
            app: CompiledContract::load_from_file(&self.app)
                .context("Failed to load app contract artifact")?,
        })
    }
}

/// A directory that receives published documents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Unique name, used in logs and failure reports.
    pub name: String,
    /// Directory the documents are written to.
    pub path: PathBuf,
    /// Documents this target receives.
    pub documents: Vec<DocumentSpec>,
}

impl TargetConfig {
    /// The browser and backend directories of the FlightSurety dapp under `pages_root`.
    pub fn defaults(pages_root: &Path) -> Vec<Self> {
        vec![
            Self {
                name: "web".to_string(),
                path: pages_root.join("json_config"),
                documents: vec![
                    DocumentSpec::new(DocumentKind::Config, "config.json"),
                    DocumentSpec::new(DocumentKind::DataAbi, "fsData_ABI.json"),
                    DocumentSpec::new(DocumentKind::AppAbi, "fsApp_ABI.json"),
                ],
            },
            Self {
                name: "server".to_string(),
                path: pages_root.join("server"),
                documents: vec![DocumentSpec::new(DocumentKind::Config, "config.json")],
            },
        ]
    }

    fn into_target(self) -> PublishTarget {
        PublishTarget::new(self.name, self.documents, FsSink::new(self.path))
    }
}

/// Everything needed for one deploy-and-publish run.
///
/// Serialized to/from TOML so a run can be repeated with the same settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Network key written into the config document.
    pub network_name: String,
    /// JSON-RPC endpoint used for deployment and written into the config document.
    pub rpc_url: String,
    /// Compiled artifacts.
    pub contracts: ContractsConfig,
    /// Ledger client settings.
    #[serde(default)]
    pub ledger: LedgerConfig,
    /// Publish targets.
    pub targets: Vec<TargetConfig>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            network_name: DEFAULT_NETWORK_NAME.to_string(),
            rpc_url: DEFAULT_RPC_URL.to_string(),
            contracts: ContractsConfig::default(),
            ledger: LedgerConfig::default(),
            targets: TargetConfig::defaults(Path::new(DEFAULT_PAGES_ROOT)),
        }
    }
}

impl PipelineConfig {
    /// Save the configuration to a TOML file.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let content =
            toml::to_string_pretty(self).context("Failed to serialize pipeline config to TOML")?;
        std::fs::write(path, content)
            .context(format!("Failed to write config to {}", path.display()))?;
        tracing::info!(path = %path.display(), "Configuration saved");
        Ok(())
    }

    /// Load the configuration from a TOML file, or from the default file inside a directory.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(anyhow::anyhow!(
                "Configuration file or directory not found: {}",
                path.display()
            ));
        }

        let config_path = if path.is_dir() {
            path.join(PIPELINE_CONF_FILENAME)
        } else {
            path.to_path_buf()
        };

        let content = std::fs::read_to_string(&config_path)
            .context(format!("Failed to read config from {}", config_path.display()))?;
        let config: Self =
            toml::from_str(&content).context("Failed to parse config file as TOML")?;
        tracing::info!(path = %config_path.display(), "Configuration loaded");
        Ok(config)
    }

    /// Build the publisher over the configured directories.
    pub fn publisher(&self) -> Result<ArtifactPublisher, PipelineError> {
        ArtifactPublisher::new(
            self.targets
                .iter()
                .cloned()
                .map(TargetConfig::into_target)
                .collect(),
        )
        .map_err(PipelineError::Precondition)
    }

    /// Load the artifacts, deploy both contracts over JSON-RPC and publish the results.
    pub async fn run(self) -> Result<PipelineOutcome> {
        tracing::info!(
            network = %self.network_name,
            rpc_url = %self.rpc_url,
            targets = self.targets.len(),
            "Starting deployment pipeline..."
        );

        let contracts = self.contracts.load()?;
        let publisher = self.publisher()?;
        let ledger = JsonRpcLedger::new(self.rpc_url.clone(), self.ledger.clone())?;

        let outcome = Pipeline::new(ledger, publisher, self.network_name, self.rpc_url)
            .run(&contracts)
            .await?;

        Ok(outcome)
    }
}

/// Result of a successful run.
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub deployments: Deployments,
    pub config: NetworkConfig,
    pub report: PublishReport,
}

/// Sequencer, assembler and publisher wired together for one network.
#[derive(Debug)]
pub struct Pipeline<L> {
    sequencer: DeploymentSequencer<L>,
    publisher: ArtifactPublisher,
    network_name: String,
    rpc_endpoint: String,
}

impl<L: Ledger> Pipeline<L> {
    pub fn new(
        ledger: L,
        publisher: ArtifactPublisher,
        network_name: impl Into<String>,
        rpc_endpoint: impl Into<String>,
    ) -> Self {
        Self {
            sequencer: DeploymentSequencer::new(ledger),
            publisher,
            network_name: network_name.into(),
            rpc_endpoint: rpc_endpoint.into(),
        }
    }

    pub fn sequencer(&self) -> &DeploymentSequencer<L> {
        &self.sequencer
    }

    /// Deploy both contracts, assemble the config and publish it.
    ///
    /// Inputs are checked before anything is sent to the ledger. Nothing is
    /// published unless both deployments are confirmed.
    pub async fn run(&self, contracts: &ContractPair) -> Result<PipelineOutcome, PipelineError> {
        config::validate_network(&self.network_name, &self.rpc_endpoint)
            .map_err(PipelineError::Precondition)?;
        contracts.validate().map_err(PipelineError::Precondition)?;

        let deployments = self.sequencer.deploy(contracts).await?;

        let config = config::assemble(
            &self.network_name,
            &self.rpc_endpoint,
            &deployments.data,
            &deployments.app,
        )
        .map_err(PipelineError::Precondition)?;

        let report = self
            .publisher
            .publish(
                &config,
                Descriptors {
                    data: deployments.data.contract().abi(),
                    app: deployments.app.contract().abi(),
                },
            )
            .await?;

        tracing::info!(
            network = config.network_name(),
            rpc_endpoint = config.rpc_endpoint(),
            data_address = %config.data_address(),
            data_transaction = %deployments.data.contract().transaction_hash(),
            app_address = %config.app_address(),
            app_transaction = %deployments.app.contract().transaction_hash(),
            config_digest = %report.config_digest,
            "✓ Deployment published"
        );

        Ok(PipelineOutcome {
            deployments,
            config,
            report,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempdir::TempDir;

    #[test]
    fn test_default_targets_match_dapp_layout() {
        let targets = TargetConfig::defaults(Path::new("pages"));

        assert_eq!(targets.len(), 2);
        assert_eq!(targets[0].path, PathBuf::from("pages/json_config"));
        assert_eq!(
            targets[0]
                .documents
                .iter()
                .map(|d| d.file.as_str())
                .collect::<Vec<_>>(),
            vec!["config.json", "fsData_ABI.json", "fsApp_ABI.json"]
        );
        assert_eq!(targets[1].path, PathBuf::from("pages/server"));
        assert_eq!(targets[1].documents.len(), 1);
    }

    #[test]
    fn test_config_save_and_load() {
        let temp_dir = TempDir::new("flightsurety-test").expect("Failed to create temp dir");
        let mut config = PipelineConfig::default();
        config.network_name = "ganache".to_string();
        config.ledger.gas_limit = 8_000_000;

        config.save_to_file(&temp_dir.path().join(PIPELINE_CONF_FILENAME)).unwrap();

        // Loading from the directory picks up the default file name.
        let loaded = PipelineConfig::load_from_file(temp_dir.path()).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_config_load_missing_file() {
        let temp_dir = TempDir::new("flightsurety-test").expect("Failed to create temp dir");
        assert!(PipelineConfig::load_from_file(&temp_dir.path().join("missing.toml")).is_err());
    }

    #[test]
    fn test_config_parses_handwritten_toml() {
        let config: PipelineConfig = toml::from_str(
            r#"
            network_name = "localhost"
            rpc_url = "http://localhost:8545"

            [contracts]
            data = "out/Data.json"
            app = "out/App.json"

            [[targets]]
            name = "server"
            path = "srv"
            documents = [{ kind = "config", file = "config.json" }]
            "#,
        )
        .unwrap();

        assert_eq!(config.ledger, LedgerConfig::default());
        assert_eq!(config.targets[0].documents[0].kind, DocumentKind::Config);

        let publisher = config.publisher().unwrap();
        assert_eq!(publisher.targets().len(), 1);
        assert_eq!(publisher.targets()[0].name(), "server");
        assert_eq!(
            publisher.targets()[0].documents(),
            &[DocumentSpec::new(DocumentKind::Config, "config.json")]
        );
    }

    #[test]
    fn test_publisher_rejects_empty_targets() {
        let config = PipelineConfig {
            targets: vec![],
            ..Default::default()
        };
        assert!(matches!(config.publisher(), Err(PipelineError::Precondition(_))));
    }
}
