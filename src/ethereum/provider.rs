use crate::config::ChainConfig;
use crate::error::{OtpError, Result};
use alloy::{
    eips::BlockNumberOrTag,
    network::{ReceiptResponse, TransactionBuilder},
    primitives::{Address, B256, B64, U256},
    providers::{Provider, ProviderBuilder, RootProvider},
    rpc::types::TransactionRequest,
    transports::http::{reqwest, Client, Http},
};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use super::{
    artifact::ContractArtifact, contract, utils, BlockSummary, CallReceipt, Chain,
    TransactionSummary,
};

/// JSON-RPC connection to a single node
#[derive(Debug)]
pub struct ChainClient {
    provider: RootProvider<Http<Client>>,
    rpc_url: String,
    gas_limit: Option<u64>,
}

impl ChainClient {
    pub fn new(config: &ChainConfig) -> anyhow::Result<Self> {
        let url = config
            .rpc_url
            .parse::<reqwest::Url>()
            .map_err(|e| anyhow::anyhow!("Invalid RPC URL '{}': {}", config.rpc_url, e))?;
        let provider = ProviderBuilder::new().on_http(url);

        Ok(Self {
            provider,
            rpc_url: config.rpc_url.clone(),
            gas_limit: config.gas_limit,
        })
    }

    pub fn rpc_url(&self) -> &str {
        &self.rpc_url
    }

    pub async fn check_connection(&self) -> bool {
        match self.provider.get_block_number().await {
            Ok(_) => true,
            Err(e) => {
                tracing::debug!("Connection check failed for {}: {}", self.rpc_url, e);
                false
            }
        }
    }
}

#[async_trait]
impl Chain for ChainClient {
    async fn current_block_number(&self) -> Result<u64> {
        Ok(self.provider.get_block_number().await?)
    }

    async fn list_accounts(&self) -> Result<Vec<Address>> {
        Ok(self.provider.get_accounts().await?)
    }

    async fn get_balance(&self, address: Address) -> Result<U256> {
        Ok(self.provider.get_balance(address).await?)
    }

    async fn get_block(&self, number: u64, include_transactions: bool) -> Result<BlockSummary> {
        let block: Option<RpcBlock> = self
            .provider
            .raw_request(
                "eth_getBlockByNumber".into(),
                (BlockNumberOrTag::Number(number), include_transactions),
            )
            .await?;

        block
            .map(|block| block.into_summary(number))
            .ok_or(OtpError::BlockNotFound(number))
    }

    async fn call_contract_method(
        &self,
        artifact: &ContractArtifact,
        method: &str,
        args: &Value,
        sender: Address,
    ) -> Result<CallReceipt> {
        let function = contract::find_function(&artifact.abi, method)
            .map_err(|e| OtpError::ContractCall(e.to_string()))?;
        let calldata = contract::encode_function_call(function, args).map_err(|e| {
            OtpError::ContractCall(format!("Failed to encode call to '{}': {}", method, e))
        })?;

        // The node signs with its unlocked account
        let mut tx_request = TransactionRequest::default()
            .from(sender)
            .to(artifact.address)
            .input(calldata.into());
        if let Some(gas) = self.gas_limit {
            tx_request = tx_request.with_gas_limit(gas);
        }

        tracing::info!(
            "Sending {}.{} from {:?}",
            artifact.display_name(),
            method,
            sender
        );

        let pending_tx = self.provider.send_transaction(tx_request).await.map_err(|e| {
            OtpError::ContractCall(format!(
                "Failed to send '{}': {}",
                method,
                utils::interpret_rpc_error(&e.to_string())
            ))
        })?;

        let tx_hash = *pending_tx.tx_hash();
        tracing::debug!("Transaction sent with hash: {:?}", tx_hash);

        // Wait for the transaction to be mined
        let receipt = pending_tx.get_receipt().await.map_err(|e| {
            OtpError::ContractCall(format!(
                "Transaction was sent but confirmation failed: {}. Transaction hash: 0x{:x}",
                e, tx_hash
            ))
        })?;

        ensure_succeeded(method, tx_hash, receipt.status())?;

        let events = contract::decode_event_logs(
            &artifact.abi,
            receipt.inner.logs().iter().map(|log| log.data()),
        );

        let call_receipt = CallReceipt {
            transaction_hash: tx_hash,
            block_number: receipt.block_number,
            gas_used: receipt.gas_used() as u64,
            status: true,
            events,
        };
        tracing::debug!(
            "Receipt: {}",
            serde_json::to_string(&call_receipt).unwrap_or_default()
        );

        Ok(call_receipt)
    }
}

/// A mined transaction with a failed status is a contract call error, not a result
fn ensure_succeeded(method: &str, tx_hash: B256, status: bool) -> Result<()> {
    if status {
        return Ok(());
    }
    Err(OtpError::ContractCall(format!(
        "'{}' reverted in transaction 0x{:x}",
        method, tx_hash
    )))
}

/// Subset of an `eth_getBlockByNumber` result
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcBlock {
    hash: B256,
    parent_hash: B256,
    #[serde(default)]
    nonce: Option<B64>,
    #[serde(default)]
    transactions: RpcBlockTransactions,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RpcBlockTransactions {
    Full(Vec<RpcTransaction>),
    Hashes(Vec<B256>),
}

impl Default for RpcBlockTransactions {
    fn default() -> Self {
        RpcBlockTransactions::Hashes(Vec::new())
    }
}

#[derive(Debug, Deserialize)]
struct RpcTransaction {
    hash: B256,
    from: Address,
    #[serde(default)]
    to: Option<Address>,
    value: U256,
}

impl RpcBlock {
    fn into_summary(self, number: u64) -> BlockSummary {
        let (transaction_hashes, transactions) = match self.transactions {
            RpcBlockTransactions::Full(txs) => {
                let hashes = txs.iter().map(|tx| tx.hash).collect();
                let summaries = txs
                    .into_iter()
                    .map(|tx| TransactionSummary {
                        hash: tx.hash,
                        from: tx.from,
                        to: tx.to,
                        value: tx.value,
                    })
                    .collect();
                (hashes, summaries)
            }
            // Node was asked for hashes only, there are no bodies to summarise
            RpcBlockTransactions::Hashes(hashes) => (hashes, Vec::new()),
        };

        BlockSummary {
            number,
            hash: self.hash,
            parent_hash: self.parent_hash,
            nonce: self.nonce,
            transaction_hashes,
            transactions,
        }
    }
}
