use std::path::PathBuf;

use alloy_core::primitives::Address;
use clap::Parser;
use flightsurety_deploy::{
    ContractsConfig, DEFAULT_APP_ARTIFACT, DEFAULT_DATA_ARTIFACT, DEFAULT_NETWORK_NAME,
    DEFAULT_PAGES_ROOT, DEFAULT_RPC_URL, LedgerConfig, PipelineConfig, TargetConfig,
};
use tracing::level_filters::LevelFilter;

/// Prefix shared by every environment variable the binary reads.
pub const ENV_PREFIX: &str = "FLIGHTSURETY_";

#[derive(Parser)]
#[command(name = "flightsurety")]
#[command(
    author,
    version,
    about = "Deploy the FlightSurety contracts and publish their addresses to the dapp"
)]
pub struct Cli {
    /// The verbosity level.
    #[arg(short, long, env = "FLIGHTSURETY_VERBOSITY", default_value_t = LevelFilter::INFO)]
    pub verbosity: LevelFilter,

    /// Network key written into the published config.
    #[arg(short, long, visible_alias = "name", env = "FLIGHTSURETY_NETWORK_NAME", default_value = DEFAULT_NETWORK_NAME)]
    pub network: String,

    /// JSON-RPC endpoint of the ledger.
    ///
    /// The same URL is published to the dapp, so it must be reachable from the web and server consumers.
    #[arg(long, alias = "rpc", env = "FLIGHTSURETY_RPC_URL", default_value = DEFAULT_RPC_URL)]
    pub rpc_url: String,

    /// Compiled artifact of the data contract.
    #[arg(long, env = "FLIGHTSURETY_DATA_ARTIFACT", default_value = DEFAULT_DATA_ARTIFACT)]
    pub data_artifact: PathBuf,

    /// Compiled artifact of the app contract.
    #[arg(long, env = "FLIGHTSURETY_APP_ARTIFACT", default_value = DEFAULT_APP_ARTIFACT)]
    pub app_artifact: PathBuf,

    /// Directory holding the `json_config` and `server` consumers.
    #[arg(long, alias = "pages", env = "FLIGHTSURETY_PAGES_ROOT", default_value = DEFAULT_PAGES_ROOT)]
    pub pages_root: PathBuf,

    /// Account that sends the deployment transactions.
    ///
    /// If not provided, the first account unlocked on the node is used.
    #[arg(long, env = "FLIGHTSURETY_FROM")]
    pub from: Option<Address>,

    /// Path to a FlightSurety.toml configuration file (or a directory containing one).
    ///
    /// When provided, the run uses the configuration from this file, with
    /// `FLIGHTSURETY_` environment variables layered on top, instead of the flags above.
    #[arg(long, alias = "conf", env = "FLIGHTSURETY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Save the effective configuration to this path before deploying.
    #[arg(long, env = "FLIGHTSURETY_SAVE_CONFIG")]
    pub save_config: Option<PathBuf>,
}

impl Cli {
    /// The pipeline configuration described by the flags alone.
    pub fn to_config(&self) -> PipelineConfig {
        PipelineConfig {
            network_name: self.network.clone(),
            rpc_url: self.rpc_url.clone(),
            contracts: ContractsConfig {
                data: self.data_artifact.clone(),
                app: self.app_artifact.clone(),
            },
            ledger: LedgerConfig {
                from: self.from,
                ..Default::default()
            },
            targets: TargetConfig::defaults(&self.pages_root),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;

    #[test]
    fn test_defaults_match_local_ganache_layout() {
        let cli = Cli::try_parse_from(["flightsurety"]).unwrap();
        let config = cli.to_config();

        assert_eq!(config.network_name, DEFAULT_NETWORK_NAME);
        assert_eq!(config.rpc_url, DEFAULT_RPC_URL);
        assert_eq!(config.ledger.from, None);
        assert_eq!(
            config.targets,
            TargetConfig::defaults(Path::new(DEFAULT_PAGES_ROOT))
        );
    }

    #[test]
    fn test_flags_override_defaults() {
        let cli = Cli::try_parse_from([
            "flightsurety",
            "--network",
            "development",
            "--rpc-url",
            "http://127.0.0.1:8545",
            "--pages-root",
            "dapp/pages",
            "--from",
            "0x627306090abaB3A6e1400e9345bC60c78a8BEf57",
        ])
        .unwrap();
        let config = cli.to_config();

        assert_eq!(config.network_name, "development");
        assert_eq!(config.rpc_url, "http://127.0.0.1:8545");
        assert_eq!(config.targets[0].path, PathBuf::from("dapp/pages/json_config"));
        assert!(config.ledger.from.is_some());
    }

    #[test]
    fn test_rejects_malformed_sender() {
        assert!(Cli::try_parse_from(["flightsurety", "--from", "0x1234"]).is_err());
    }
}
