pub mod artifact;
pub mod contract;
pub mod provider;
pub mod utils;

use alloy::primitives::{Address, B256, B64, U256};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::Result;
use artifact::ContractArtifact;

#[derive(Debug, Clone, Serialize)]
pub struct TransactionSummary {
    pub hash: B256,
    pub from: Address,
    pub to: Option<Address>,
    pub value: U256,
}

#[derive(Debug, Clone, Serialize)]
pub struct BlockSummary {
    pub number: u64,
    pub hash: B256,
    pub parent_hash: B256,
    pub nonce: Option<B64>,
    /// Every transaction in the block, in block order
    pub transaction_hashes: Vec<B256>,
    /// Full bodies, only present when the block was fetched with transactions
    pub transactions: Vec<TransactionSummary>,
}

/// A contract event decoded against the artifact ABI.
#[derive(Debug, Clone, Serialize)]
pub struct EmittedEvent {
    pub name: String,
    pub fields: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CallReceipt {
    pub transaction_hash: B256,
    pub block_number: Option<u64>,
    pub gas_used: u64,
    pub status: bool,
    pub events: Vec<EmittedEvent>,
}

impl CallReceipt {
    /// First value of `field` on the first event called `event`.
    pub fn event_field(&self, event: &str, field: &str) -> Option<&Value> {
        self.events
            .iter()
            .find(|e| e.name == event)
            .and_then(|e| e.fields.get(field))
    }
}

/// The node operations the OTP workflow depends on.
#[async_trait]
pub trait Chain: Send + Sync {
    async fn current_block_number(&self) -> Result<u64>;

    async fn list_accounts(&self) -> Result<Vec<Address>>;

    async fn get_balance(&self, address: Address) -> Result<U256>;

    async fn get_block(&self, number: u64, include_transactions: bool) -> Result<BlockSummary>;

    /// Submits a state-changing call from `sender` and waits for its receipt.
    async fn call_contract_method(
        &self,
        artifact: &ContractArtifact,
        method: &str,
        args: &Value,
        sender: Address,
    ) -> Result<CallReceipt>;
}
