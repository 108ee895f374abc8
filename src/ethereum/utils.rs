use alloy::primitives::{
    utils::{format_ether, parse_ether},
    Address, U256,
};
use anyhow::{anyhow, Result};
use std::str::FromStr;

/// Validates and normalizes an Ethereum address
pub fn validate_address(address: &str) -> Result<Address> {
    let address = address.trim();

    if address.is_empty() {
        return Err(anyhow!("Address cannot be empty"));
    }

    if !address.starts_with("0x") && !address.starts_with("0X") {
        return Err(anyhow!(
            "Invalid address format: '{}'. Ethereum addresses must start with '0x'",
            address
        ));
    }

    if address.len() != 42 {
        return Err(anyhow!(
            "Invalid address length: '{}'. Ethereum addresses must be exactly 42 characters (0x + 40 hex characters)",
            address
        ));
    }

    // Check if all characters after 0x are valid hex
    let hex_part = &address[2..];
    if !hex_part.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(anyhow!(
            "Invalid address format: '{}'. Contains non-hexadecimal characters",
            address
        ));
    }

    // Parse using Alloy's Address type which handles checksumming
    Address::from_str(address)
        .map_err(|e| anyhow!("Invalid Ethereum address: '{}'. Error: {}", address, e))
}

/// Validates a Solidity identifier (method, event or field name)
pub fn validate_identifier(name: &str) -> Result<()> {
    let first = match name.chars().next() {
        Some(c) => c,
        None => return Err(anyhow!("Identifier cannot be empty")),
    };

    if !first.is_ascii_alphabetic() && first != '_' {
        return Err(anyhow!(
            "Invalid identifier: '{}'. Identifiers must start with a letter or underscore",
            name
        ));
    }

    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(anyhow!(
            "Invalid identifier: '{}'. Identifiers can only contain letters, numbers, and underscores",
            name
        ));
    }

    Ok(())
}

/// Renders a wei amount in ether, without trailing zeros
pub fn format_ether_display(wei: U256) -> String {
    // format_ether always pads the fraction to 18 digits
    let formatted = format_ether(wei);
    match formatted.split_once('.') {
        Some((whole, fraction)) => {
            let fraction = fraction.trim_end_matches('0');
            if fraction.is_empty() {
                whole.to_string()
            } else {
                format!("{}.{}", whole, fraction)
            }
        }
        None => formatted,
    }
}

/// Inverse of [`format_ether_display`]
pub fn parse_ether_display(ether: &str) -> Result<U256> {
    let ether = ether.trim();

    // parse_ether accepts a sign and hands back the magnitude
    if ether.starts_with('-') {
        return Err(anyhow!("Invalid ether amount '{}': cannot be negative", ether));
    }

    parse_ether(ether).map_err(|e| anyhow!("Invalid ether amount '{}': {}", ether, e))
}

/// Creates user-friendly error messages for common RPC errors
pub fn interpret_rpc_error(error: &str) -> String {
    if error.contains("revert") {
        "Transaction failed: The contract function reverted execution. This usually means the function's requirements were not met or an assertion failed.".to_string()
    } else if error.contains("insufficient funds") {
        "Transaction failed: Insufficient funds to cover gas costs. Make sure your account has enough ETH for gas fees.".to_string()
    } else if error.contains("out of gas") || error.contains("gas required exceeds allowance") {
        "Transaction failed: Gas limit too low. Try increasing chain.gas_limit in the configuration."
            .to_string()
    } else if error.contains("sender account not recognized") || error.contains("unknown account") {
        "Transaction failed: The sending account is not unlocked on this node.".to_string()
    } else if error.contains("connection refused") || error.contains("network unreachable") {
        "Network error: Cannot connect to RPC endpoint. Check that the node is running and the RPC URL is correct.".to_string()
    } else if error.contains("timeout") {
        "Network error: Request timed out. The RPC endpoint may be overloaded or unreachable."
            .to_string()
    } else if error.contains("method not found") {
        "RPC error: The requested method is not supported by this RPC endpoint.".to_string()
    } else {
        format!("RPC error: {}", error)
    }
}
