//! Test doubles shared by the unit tests.

use std::{collections::VecDeque, sync::Mutex};

use alloy_core::primitives::{Address, B256, Bytes};
use serde_json::json;

use crate::{
    artifact::{CompiledContract, ContractPair},
    error::DeploymentFailure,
    ledger::{Confirmation, Ledger},
};

/// A ledger that replays scripted outcomes, one per `deploy` call.
#[derive(Debug, Default)]
pub struct ScriptedLedger {
    outcomes: Mutex<VecDeque<Result<Confirmation, DeploymentFailure>>>,
    calls: Mutex<Vec<(String, Bytes)>>,
}

impl ScriptedLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn confirm(self, address: Address) -> Self {
        self.outcomes.lock().unwrap().push_back(Ok(Confirmation {
            address,
            transaction_hash: B256::with_last_byte(address.0[19]),
        }));
        self
    }

    pub fn fail(self, failure: DeploymentFailure) -> Self {
        self.outcomes.lock().unwrap().push_back(Err(failure));
        self
    }

    /// Contract names and init code of every deploy call, in order.
    pub fn calls(&self) -> Vec<(String, Bytes)> {
        self.calls.lock().unwrap().clone()
    }
}

impl Ledger for ScriptedLedger {
    fn endpoint(&self) -> &str {
        "scripted"
    }

    async fn deploy(&self, contract: &str, init_code: Bytes) -> Result<Confirmation, DeploymentFailure> {
        self.calls
            .lock()
            .unwrap()
            .push((contract.to_string(), init_code));
        self.outcomes
            .lock()
            .unwrap()
            .pop_front()
            .expect("unexpected deploy call")
    }
}

pub fn contract_pair() -> ContractPair {
    ContractPair {
        data: CompiledContract::new(
            "FlightSuretyData",
            json!([
                {"type": "function", "name": "isOperational", "inputs": [], "outputs": [{"name": "", "type": "bool"}]}
            ]),
            Bytes::from(vec![0x60, 0x80, 0x60, 0x40]),
        ),
        app: CompiledContract::new(
            "FlightSuretyApp",
            json!([
                {"type": "constructor", "inputs": [{"name": "dataContract", "type": "address"}], "stateMutability": "nonpayable"},
                {"type": "event", "name": "FlightStatusInfo", "anonymous": false, "inputs": []}
            ]),
            Bytes::from(vec![0x60, 0x80, 0x60, 0x41]),
        ),
    }
}
