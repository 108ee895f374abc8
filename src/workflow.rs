//! The OTP round trip: chain status, generate, ask the operator, validate,
//! then show the block the transactions landed in.
//!
//! Every stage is its own recovery boundary. A failed stage is logged and
//! recorded in the [`RunReport`]; later stages only run when the outcomes they
//! depend on completed.

use std::fmt;
use std::future::Future;
use std::io::Write;

use alloy::primitives::{Address, B256, U256};
use serde_json::{json, Value};
use tokio::io::{AsyncBufRead, AsyncWrite};
use tracing::{error, info, warn};

use crate::config::{Config, ContractConfig};
use crate::error::{OtpError, Result};
use crate::ethereum::{
    artifact::ContractArtifact,
    contract,
    utils::{format_ether_display, parse_ether_display},
    Chain,
};
use crate::prompt::Prompt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Idle,
    Checking,
    Generating,
    AwaitingUserInput,
    Validating,
    ReportingBlock,
    Done,
    Aborted,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Idle => "idle",
            Stage::Checking => "checking",
            Stage::Generating => "generating",
            Stage::AwaitingUserInput => "awaiting-user-input",
            Stage::Validating => "validating",
            Stage::ReportingBlock => "reporting-block",
            Stage::Done => "done",
            Stage::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

#[derive(Debug)]
pub enum StageOutcome<T> {
    Completed(T),
    Failed(OtpError),
    Skipped,
}

impl<T> StageOutcome<T> {
    fn record(stage: Stage, context: &str, result: Result<T>) -> Self {
        match result {
            Ok(value) => StageOutcome::Completed(value),
            Err(e) => {
                error!(stage = %stage, "{}: {}", context, e);
                StageOutcome::Failed(e)
            }
        }
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            StageOutcome::Completed(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, StageOutcome::Skipped)
    }
}

#[derive(Debug, Clone)]
pub struct ChainStatus {
    pub block_number: u64,
    pub accounts: Vec<Address>,
    pub balance: U256,
}

#[derive(Debug, Clone)]
pub struct GeneratedOtp {
    pub account: Address,
    pub value: String,
    pub transaction_hash: B256,
}

#[derive(Debug, Clone)]
pub struct ValidationOutcome {
    pub input: String,
    pub is_valid: bool,
    pub transaction_hash: B256,
}

#[derive(Debug)]
pub struct RunReport {
    pub status: StageOutcome<ChainStatus>,
    pub generation: StageOutcome<GeneratedOtp>,
    pub user_input: StageOutcome<String>,
    pub validation: StageOutcome<ValidationOutcome>,
    pub block: StageOutcome<crate::ethereum::BlockSummary>,
    pub final_stage: Stage,
    pub prompt_closed: bool,
}

impl RunReport {
    fn new() -> Self {
        Self {
            status: StageOutcome::Skipped,
            generation: StageOutcome::Skipped,
            user_input: StageOutcome::Skipped,
            validation: StageOutcome::Skipped,
            block: StageOutcome::Skipped,
            final_stage: Stage::Idle,
            prompt_closed: false,
        }
    }

    fn enter(&mut self, stage: Stage) {
        tracing::debug!("{} -> {}", self.final_stage, stage);
        self.final_stage = stage;
    }

    /// The operator is only asked when a non-empty OTP was generated.
    fn ready_for_input(&self) -> bool {
        self.generation
            .value()
            .map_or(false, |otp| !otp.value.is_empty())
    }
}

/// Everything one workflow run needs, owned in one place
pub struct OtpSession<C, R, W, O> {
    chain: C,
    artifact: ContractArtifact,
    contract: ContractConfig,
    prompt_message: String,
    low_balance: Option<U256>,
    prompt: Prompt<R, W>,
    out: O,
}

impl<C, R, W, O> OtpSession<C, R, W, O>
where
    C: Chain,
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
    O: Write,
{
    pub fn new(
        chain: C,
        artifact: ContractArtifact,
        config: &Config,
        prompt: Prompt<R, W>,
        out: O,
    ) -> Self {
        let low_balance = config
            .chain
            .low_balance_warning
            .as_deref()
            .and_then(|ether| parse_ether_display(ether).ok());

        Self {
            chain,
            artifact,
            contract: config.contract.clone(),
            prompt_message: config.prompt.message.clone(),
            low_balance,
            prompt,
            out,
        }
    }

    /// Drive the workflow to `Done` or `Aborted`. `cancel` interrupts the
    /// wait for operator input. The prompt is closed on every path.
    pub async fn run<F>(&mut self, cancel: F) -> RunReport
    where
        F: Future<Output = ()>,
    {
        let mut report = RunReport::new();

        report.enter(Stage::Checking);
        let status = self.check_chain().await;
        report.status =
            StageOutcome::record(Stage::Checking, "Error interacting with blockchain", status);

        report.enter(Stage::Generating);
        let generation = self.generate_otp().await;
        report.generation =
            StageOutcome::record(Stage::Generating, "Error generating OTP", generation);

        if report.ready_for_input() {
            report.enter(Stage::AwaitingUserInput);
            let answer = self
                .prompt
                .ask_or_cancel(&self.prompt_message, cancel)
                .await;
            report.user_input = StageOutcome::record(
                Stage::AwaitingUserInput,
                "Error reading OTP input",
                answer,
            );
        } else {
            info!("No OTP was generated, skipping validation");
        }

        // Block details are shown whether or not validation succeeded
        if let Some(input) = report.user_input.value().cloned() {
            report.enter(Stage::Validating);
            let validation = self.validate_otp(&input).await;
            report.validation =
                StageOutcome::record(Stage::Validating, "Error validating OTP", validation);

            report.enter(Stage::ReportingBlock);
            let block = self.report_latest_block().await;
            report.block =
                StageOutcome::record(Stage::ReportingBlock, "Error fetching block details", block);
        }

        self.prompt.close().await;
        report.prompt_closed = self.prompt.is_closed();

        // Done once the block stage was entered, even if it failed
        let last = if report.block.is_skipped() {
            Stage::Aborted
        } else {
            Stage::Done
        };
        report.enter(last);
        report
    }

    fn emit(&mut self, line: impl fmt::Display) -> Result<()> {
        writeln!(self.out, "{}", line)?;
        Ok(())
    }

    async fn sender(&self) -> Result<Address> {
        self.chain
            .list_accounts()
            .await?
            .first()
            .copied()
            .ok_or(OtpError::NoAccounts)
    }

    async fn check_chain(&mut self) -> Result<ChainStatus> {
        let block_number = self.chain.current_block_number().await?;
        self.emit(format_args!("Current Block Number: {}", block_number))?;

        let accounts = self.chain.list_accounts().await?;
        self.emit("Available Accounts:")?;
        for (index, account) in accounts.iter().enumerate() {
            self.emit(format_args!("{}: {}", index, account))?;
        }

        let first = *accounts.first().ok_or(OtpError::NoAccounts)?;
        let balance = self.chain.get_balance(first).await?;
        self.emit(format_args!(
            "Balance of {}: {} ETH",
            first,
            format_ether_display(balance)
        ))?;

        if let Some(threshold) = self.low_balance {
            if balance < threshold {
                warn!(
                    "Account {} holds less than {} ETH, transactions may fail",
                    first,
                    format_ether_display(threshold)
                );
            }
        }

        Ok(ChainStatus {
            block_number,
            accounts,
            balance,
        })
    }

    async fn generate_otp(&mut self) -> Result<GeneratedOtp> {
        let account = self.sender().await?;
        let receipt = self
            .chain
            .call_contract_method(
                &self.artifact,
                &self.contract.generate_method,
                &json!([]),
                account,
            )
            .await?;

        // The OTP only exists in the event log, there is no return value
        let value = receipt
            .event_field(&self.contract.generated_event, &self.contract.otp_field)
            .filter(|value| !value.is_null())
            .map(contract::display_value)
            .filter(|value| !value.is_empty())
            .ok_or_else(|| {
                OtpError::ContractCall(format!(
                    "transaction 0x{:x} emitted no {}.{} value",
                    receipt.transaction_hash,
                    self.contract.generated_event,
                    self.contract.otp_field
                ))
            })?;

        self.emit(format_args!("Generated OTP for {}: {}", account, value))?;

        Ok(GeneratedOtp {
            account,
            value,
            transaction_hash: receipt.transaction_hash,
        })
    }

    async fn validate_otp(&mut self, input: &str) -> Result<ValidationOutcome> {
        let account = self.sender().await?;
        let receipt = self
            .chain
            .call_contract_method(
                &self.artifact,
                &self.contract.validate_method,
                &json!([input]),
                account,
            )
            .await?;

        let is_valid = receipt
            .event_field(&self.contract.validated_event, &self.contract.result_field)
            .and_then(Value::as_bool)
            .ok_or_else(|| {
                OtpError::ContractCall(format!(
                    "transaction 0x{:x} emitted no {}.{} flag",
                    receipt.transaction_hash,
                    self.contract.validated_event,
                    self.contract.result_field
                ))
            })?;

        self.emit(format_args!(
            "Validation result for OTP {}: {}",
            input, is_valid
        ))?;

        Ok(ValidationOutcome {
            input: input.to_string(),
            is_valid,
            transaction_hash: receipt.transaction_hash,
        })
    }

    async fn report_latest_block(&mut self) -> Result<crate::ethereum::BlockSummary> {
        // Latest block, which holds the validation transaction when it was mined
        let number = self.chain.current_block_number().await?;
        let block = self.chain.get_block(number, true).await?;

        self.emit(format_args!("\nDetails of Block Number: {}", number))?;
        self.emit(format_args!("Hash: {}", block.hash))?;
        self.emit(format_args!("Parent Hash: {}", block.parent_hash))?;
        match block.nonce {
            Some(nonce) => self.emit(format_args!("Nonce: {}", nonce))?,
            None => self.emit("Nonce: n/a")?,
        }
        self.emit("Transactions:")?;

        if block.transaction_hashes.is_empty() {
            self.emit("  No transactions in this block.")?;
        } else if block.transactions.is_empty() {
            // Hashes only
            for hash in &block.transaction_hashes {
                self.emit(format_args!("  - Hash: {}", hash))?;
            }
        } else {
            for tx in &block.transactions {
                let to = tx
                    .to
                    .map(|address| address.to_string())
                    .unwrap_or_else(|| "contract creation".to_string());
                self.emit(format_args!(
                    "  - Hash: {}, From: {}, To: {}, Value: {} ETH",
                    tx.hash,
                    tx.from,
                    to,
                    format_ether_display(tx.value)
                ))?;
            }
        }

        Ok(block)
    }

    #[cfg(test)]
    fn into_parts(self) -> (C, O) {
        (self.chain, self.out)
    }
}
