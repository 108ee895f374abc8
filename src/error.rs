use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::ethereum::utils::interpret_rpc_error;

pub type Result<T> = std::result::Result<T, OtpError>;

#[derive(Error, Debug)]
pub enum OtpError {
    #[error("Contract artifact not found at {}", .0.display())]
    ArtifactNotFound(PathBuf),

    #[error("Malformed contract artifact: {0}")]
    ArtifactMalformed(String),

    #[error("{0}")]
    Rpc(String),

    #[error("Block {0} not found")]
    BlockNotFound(u64),

    #[error("Contract call failed: {0}")]
    ContractCall(String),

    #[error("The node returned no accounts")]
    NoAccounts,

    #[error("No input received within {}s", .0.as_secs())]
    PromptTimeout(Duration),

    #[error("Input stream closed")]
    PromptClosed,

    #[error("Input cancelled")]
    PromptCancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<alloy::transports::TransportError> for OtpError {
    fn from(e: alloy::transports::TransportError) -> Self {
        OtpError::Rpc(interpret_rpc_error(&e.to_string()))
    }
}
