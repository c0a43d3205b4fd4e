//! Error kinds surfaced by the pipeline stages.

use std::fmt;

use alloy_core::primitives::{Address, B256};
use thiserror::Error;

/// A contract creation that did not end with confirmed code on-chain.
///
/// Never retried by the pipeline: the caller decides whether to run again.
#[derive(Debug, Error)]
pub enum DeploymentFailure {
    /// The ledger could not be reached.
    #[error("cannot deploy {contract}: ledger at {endpoint} is unreachable")]
    Unreachable {
        contract: String,
        endpoint: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// The node refused the creation (failed gas estimation, insufficient funds, no sender).
    #[error("{contract} deployment rejected: {reason}")]
    Rejected { contract: String, reason: String },
    /// The constructor reverted.
    #[error("{contract} constructor reverted in transaction {transaction_hash}")]
    Reverted {
        contract: String,
        transaction_hash: B256,
    },
    /// The creation consumed its whole gas limit.
    #[error("{contract} deployment ran out of gas (limit {gas_limit}) in transaction {transaction_hash}")]
    OutOfGas {
        contract: String,
        transaction_hash: B256,
        gas_limit: u64,
    },
    /// No receipt arrived before polling gave up.
    #[error("{contract} creation transaction {transaction_hash} was not confirmed in time")]
    Unconfirmed {
        contract: String,
        transaction_hash: B256,
    },
    /// The receipt reported success but no code lives at the address.
    #[error("{contract} reported at {address} but no code is deployed there")]
    MissingCode { contract: String, address: Address },
}

/// A single target that failed to stage or commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetFailure {
    pub target: String,
    pub reason: String,
}

impl fmt::Display for TargetFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.target, self.reason)
    }
}

fn join_failures(failures: &[TargetFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// A publish that did not reach every target.
#[derive(Debug, Error)]
pub enum PublishFailure {
    /// The documents could not be rendered. Nothing was written.
    #[error("failed to render {document}: {reason}")]
    Render { document: String, reason: String },
    /// At least one target could not stage its writes. Every target still holds its prior state.
    #[error("staging failed, no target was modified ({})", join_failures(.failures))]
    Staging { failures: Vec<TargetFailure> },
    /// Some targets swapped in the new documents and others did not.
    ///
    /// Each failed target was rolled back to its previous documents, but the
    /// targets now disagree and must be repaired out of band, for example by
    /// running the publish again.
    #[error(
        "targets are inconsistent: committed [{}], failed ({})",
        .committed.join(", "),
        join_failures(.failures)
    )]
    Inconsistent {
        committed: Vec<String>,
        failures: Vec<TargetFailure>,
    },
}

impl PublishFailure {
    /// Whether targets were left holding different runs' documents.
    pub fn is_inconsistent(&self) -> bool {
        matches!(self, Self::Inconsistent { .. })
    }
}

/// Any failure of a pipeline run, tagged with the stage that produced it.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Inputs the caller controls are invalid. Detected before any gas is spent,
    /// or when stages are combined out of order.
    #[error("precondition violated: {0}")]
    Precondition(String),
    #[error("deployment stage failed")]
    Deployment(#[from] DeploymentFailure),
    #[error("publish stage failed")]
    Publish(#[from] PublishFailure),
}
