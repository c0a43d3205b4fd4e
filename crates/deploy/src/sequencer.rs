//! Ordered deployment of the data and app contracts.
//!
//! The app contract's constructor needs the data contract's address, so the
//! data contract always goes first. [`ConfirmedData`] can only come out of a
//! successful data deployment, which makes the order a property of the types:
//! there is no way to call [`DeploymentSequencer::deploy_app_contract`] without one.

use alloy_core::primitives::Address;

use crate::{
    artifact::{CompiledContract, ContractPair, DeployedContract},
    error::DeploymentFailure,
    ledger::{Ledger, encode_address_argument},
};

/// The data contract, confirmed on-chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmedData {
    contract: DeployedContract,
}

impl ConfirmedData {
    pub fn address(&self) -> Address {
        self.contract.address()
    }

    pub fn contract(&self) -> &DeployedContract {
        &self.contract
    }
}

/// The app contract, confirmed on-chain, together with the data address its
/// constructor received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmedApp {
    contract: DeployedContract,
    linked_data: Address,
}

impl ConfirmedApp {
    pub fn address(&self) -> Address {
        self.contract.address()
    }

    /// The data contract address passed to the app constructor.
    pub fn linked_data(&self) -> Address {
        self.linked_data
    }

    pub fn contract(&self) -> &DeployedContract {
        &self.contract
    }
}

/// Both contracts of a run, deployed in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deployments {
    pub data: ConfirmedData,
    pub app: ConfirmedApp,
}

/// Deploys the data contract, then the app contract.
#[derive(Debug, Clone)]
pub struct DeploymentSequencer<L> {
    ledger: L,
}

impl<L: Ledger> DeploymentSequencer<L> {
    pub fn new(ledger: L) -> Self {
        Self { ledger }
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    /// Deploy the dependency-free data contract.
    pub async fn deploy_data_contract(
        &self,
        data: &CompiledContract,
    ) -> Result<ConfirmedData, DeploymentFailure> {
        tracing::info!(
            contract = %data.name,
            endpoint = self.ledger.endpoint(),
            "Deploying data contract..."
        );

        let confirmation = self.ledger.deploy(&data.name, data.bytecode.clone()).await?;

        tracing::info!(
            contract = %data.name,
            address = %confirmation.address,
            transaction_hash = %confirmation.transaction_hash,
            "Data contract deployed"
        );

        Ok(ConfirmedData {
            contract: DeployedContract::new(
                data,
                confirmation.address,
                confirmation.transaction_hash,
            ),
        })
    }

    /// Deploy the app contract, passing the confirmed data address to its constructor.
    pub async fn deploy_app_contract(
        &self,
        app: &CompiledContract,
        data: &ConfirmedData,
    ) -> Result<ConfirmedApp, DeploymentFailure> {
        let linked_data = data.address();

        tracing::info!(
            contract = %app.name,
            data_address = %linked_data,
            "Deploying app contract..."
        );

        let init_code = encode_address_argument(&app.bytecode, linked_data);
        let confirmation = self.ledger.deploy(&app.name, init_code).await?;

        tracing::info!(
            contract = %app.name,
            address = %confirmation.address,
            transaction_hash = %confirmation.transaction_hash,
            "App contract deployed"
        );

        Ok(ConfirmedApp {
            contract: DeployedContract::new(
                app,
                confirmation.address,
                confirmation.transaction_hash,
            ),
            linked_data,
        })
    }

    /// Deploy both contracts in order, stopping at the first failure.
    pub async fn deploy(&self, contracts: &ContractPair) -> Result<Deployments, DeploymentFailure> {
        let data = self.deploy_data_contract(&contracts.data).await?;

        let app = match self.deploy_app_contract(&contracts.app, &data).await {
            Ok(app) => app,
            Err(err) => {
                // The data contract exists on-chain now, but nothing will reference it.
                tracing::warn!(
                    contract = data.contract().name(),
                    address = %data.address(),
                    transaction_hash = %data.contract().transaction_hash(),
                    error = %err,
                    "App deployment failed, data contract left unpublished"
                );
                return Err(err);
            }
        };

        Ok(Deployments { data, app })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{ScriptedLedger, contract_pair};
    use alloy_core::primitives::B256;

    #[tokio::test]
    async fn test_deploys_data_then_app_with_linked_address() {
        let data_address = Address::repeat_byte(0xaa);
        let app_address = Address::repeat_byte(0xbb);
        let sequencer = DeploymentSequencer::new(
            ScriptedLedger::new()
                .confirm(data_address)
                .confirm(app_address),
        );
        let contracts = contract_pair();

        let deployments = sequencer.deploy(&contracts).await.unwrap();

        assert_eq!(deployments.data.address(), data_address);
        assert_eq!(deployments.app.address(), app_address);
        assert_eq!(deployments.app.linked_data(), data_address);
        assert_eq!(deployments.app.contract().abi(), &contracts.app.abi);
        assert_eq!(deployments.data.contract().name(), "FlightSuretyData");
        assert_eq!(
            deployments.app.contract().transaction_hash(),
            B256::with_last_byte(0xbb)
        );

        let calls = sequencer.ledger().calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].0, "FlightSuretyData");
        assert_eq!(calls[0].1, contracts.data.bytecode);
        assert_eq!(calls[1].0, "FlightSuretyApp");
        assert_eq!(
            calls[1].1,
            encode_address_argument(&contracts.app.bytecode, data_address)
        );
    }

    #[tokio::test]
    async fn test_data_failure_stops_before_app() {
        let sequencer = DeploymentSequencer::new(ScriptedLedger::new().fail(
            DeploymentFailure::Rejected {
                contract: "FlightSuretyData".to_string(),
                reason: "insufficient funds".to_string(),
            },
        ));

        let err = sequencer.deploy(&contract_pair()).await.unwrap_err();

        assert!(matches!(err, DeploymentFailure::Rejected { .. }));
        assert_eq!(sequencer.ledger().calls().len(), 1);
    }

    #[tokio::test]
    async fn test_app_failure_is_returned_without_retry() {
        let sequencer = DeploymentSequencer::new(
            ScriptedLedger::new()
                .confirm(Address::repeat_byte(0xaa))
                .fail(DeploymentFailure::Reverted {
                    contract: "FlightSuretyApp".to_string(),
                    transaction_hash: B256::ZERO,
                }),
        );

        let err = sequencer.deploy(&contract_pair()).await.unwrap_err();

        assert!(matches!(err, DeploymentFailure::Reverted { .. }));
        assert_eq!(sequencer.ledger().calls().len(), 2);
    }
}
