//! flightsurety-deploy - Deployment and publish pipeline for the FlightSurety contracts.
//!
//! This crate deploys the data contract, then the app contract linked against
//! it, and publishes the resulting network config and interface descriptors to
//! every consumer directory in one all-or-nothing step.

mod artifact;
mod config;
mod error;
mod fs;
mod ledger;
mod pipeline;
pub mod publish;
mod rpc;
mod sequencer;

#[cfg(test)]
mod test_utils;

pub use artifact::{CompiledContract, ContractPair, DeployedContract, InterfaceDescriptor};
pub use config::{
    DEFAULT_NETWORK_NAME, DEFAULT_RPC_URL, NetworkConfig, NetworkEntry, assemble,
    validate_network,
};
pub use error::{DeploymentFailure, PipelineError, PublishFailure, TargetFailure};
pub use ledger::{
    Confirmation, DEFAULT_GAS_LIMIT, DEFAULT_MAX_POLLS, DEFAULT_POLL_INTERVAL_MS, JsonRpcLedger,
    Ledger, LedgerConfig, encode_address_argument,
};
pub use pipeline::{
    ContractsConfig, DEFAULT_APP_ARTIFACT, DEFAULT_DATA_ARTIFACT, DEFAULT_PAGES_ROOT,
    PIPELINE_CONF_FILENAME, Pipeline, PipelineConfig, PipelineOutcome, TargetConfig,
};
pub use publish::{
    ArtifactPublisher, Descriptors, DocumentKind, DocumentSpec, FsSink, MemorySink,
    PublishReport, PublishTarget, PublishedTarget,
};
pub use sequencer::{ConfirmedApp, ConfirmedData, DeploymentSequencer, Deployments};
