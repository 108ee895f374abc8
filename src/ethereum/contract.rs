use alloy::{
    dyn_abi::{DynSolValue, EventExt, JsonAbiExt, Word},
    json_abi::{Function, JsonAbi},
    primitives::{Address, Bytes, LogData, I256, U256},
};
use anyhow::{anyhow, Result};
use serde_json::{Map, Value};
use std::str::FromStr;
use tracing::debug;

use super::EmittedEvent;

/// Find a function by name in the ABI
pub fn find_function<'a>(abi: &'a JsonAbi, name: &str) -> Result<&'a Function> {
    abi.functions().find(|f| f.name == name).ok_or_else(|| {
        let available_functions: Vec<String> = abi.functions().map(|f| f.name.clone()).collect();

        if available_functions.is_empty() {
            anyhow!(
                "Function '{}' not found. The contract ABI contains no functions.",
                name
            )
        } else {
            anyhow!(
                "Function '{}' not found in contract ABI. Available functions: {}",
                name,
                available_functions.join(", ")
            )
        }
    })
}

/// Encode function parameters for a contract call
pub fn encode_function_call(function: &Function, parameters: &Value) -> Result<Bytes> {
    let params: Vec<Value> = match parameters {
        Value::Array(params) => params.clone(),
        Value::Null => Vec::new(),
        // A bare value is the single argument
        other => vec![other.clone()],
    };

    if params.len() != function.inputs.len() {
        let expected_params: Vec<String> = function
            .inputs
            .iter()
            .map(|input| format!("{} {}", input.ty, input.name))
            .collect();

        return Err(anyhow!(
            "Parameter count mismatch for function '{}': expected {} parameters, got {}.\nExpected parameters: [{}]",
            function.name,
            function.inputs.len(),
            params.len(),
            expected_params.join(", ")
        ));
    }

    let mut inputs = Vec::with_capacity(params.len());
    for (i, (param_value, input)) in params.iter().zip(&function.inputs).enumerate() {
        let dyn_value = json_to_dyn_sol_value(param_value, &input.ty).map_err(|e| {
            anyhow!(
                "Invalid parameter #{} ('{}' of type '{}'): {}",
                i + 1,
                input.name,
                input.ty,
                e
            )
        })?;
        inputs.push(dyn_value);
    }

    let encoded = function
        .abi_encode_input(&inputs)
        .map_err(|e| anyhow!("Failed to encode function inputs: {}", e))?;

    Ok(encoded.into())
}

fn parse_uint(value: &Value) -> Result<U256> {
    match value {
        // JSON numbers above u64 lose precision, pass those as strings
        Value::Number(n) => n
            .as_u64()
            .map(U256::from)
            .ok_or_else(|| anyhow!("Invalid uint value: {}", n)),
        Value::String(s) => {
            let s = s.trim();
            if let Some(hex_digits) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
                U256::from_str_radix(hex_digits, 16)
                    .map_err(|_| anyhow!("Invalid hex uint string: {}", s))
            } else {
                U256::from_str_radix(s, 10).map_err(|_| anyhow!("Invalid uint string: {}", s))
            }
        }
        _ => Err(anyhow!("Uint must be a number or string")),
    }
}

/// Convert JSON value to DynSolValue based on expected Solidity type
fn json_to_dyn_sol_value(value: &Value, sol_type: &str) -> Result<DynSolValue> {
    match sol_type {
        "address" => {
            let addr_str = value
                .as_str()
                .ok_or_else(|| anyhow!("Address must be a string"))?;
            let address = Address::from_str(addr_str.trim())?;
            Ok(DynSolValue::Address(address))
        }
        ty if ty.ends_with("[]") => {
            let array = value
                .as_array()
                .ok_or_else(|| anyhow!("Array parameter must be an array"))?;
            // Strip "[]" and convert each element
            let element_type = &ty[..ty.len() - 2];
            let mut dyn_array = Vec::new();
            for element in array {
                dyn_array.push(json_to_dyn_sol_value(element, element_type)?);
            }
            Ok(DynSolValue::Array(dyn_array))
        }
        // "uint" alone means uint256
        ty if ty.starts_with("uint") => {
            let bits = bit_width(&ty[4..])?;
            Ok(DynSolValue::Uint(parse_uint(value)?, bits))
        }
        ty if ty.starts_with("int") => {
            let bits = bit_width(&ty[3..])?;
            let num = match value {
                Value::Number(n) => I256::from_dec_str(&n.to_string())
                    .map_err(|_| anyhow!("Invalid int value: {}", n))?,
                Value::String(s) => I256::from_dec_str(s.trim())
                    .map_err(|_| anyhow!("Invalid int string: {}", s))?,
                _ => return Err(anyhow!("Int must be a number or string")),
            };
            Ok(DynSolValue::Int(num, bits))
        }
        "string" => match value {
            Value::String(s) => Ok(DynSolValue::String(s.clone())),
            Value::Number(n) => Ok(DynSolValue::String(n.to_string())),
            _ => Err(anyhow!("String parameter must be a string")),
        },
        "bool" => {
            let b = match value {
                Value::Bool(b) => *b,
                Value::String(s) if s.trim() == "true" => true,
                Value::String(s) if s.trim() == "false" => false,
                _ => return Err(anyhow!("Bool parameter must be a boolean")),
            };
            Ok(DynSolValue::Bool(b))
        }
        ty if ty.starts_with("bytes") && ty != "bytes" => {
            // Fixed bytes (e.g., bytes32)
            let size: usize = ty[5..]
                .parse()
                .map_err(|_| anyhow!("Invalid fixed bytes type: {}", ty))?;
            let hex_str = value
                .as_str()
                .ok_or_else(|| anyhow!("Bytes must be a hex string"))?;
            let bytes = hex::decode(hex_str.trim_start_matches("0x"))
                .map_err(|_| anyhow!("Invalid hex string: {}", hex_str))?;
            if bytes.len() > size || size > 32 {
                return Err(anyhow!("Value does not fit in {}", ty));
            }

            // Left-aligned in the word, like Solidity
            let mut word_bytes = [0u8; 32];
            word_bytes[..bytes.len()].copy_from_slice(&bytes);
            Ok(DynSolValue::FixedBytes(Word::from(word_bytes), size))
        }
        "bytes" => {
            let hex_str = value
                .as_str()
                .ok_or_else(|| anyhow!("Bytes must be a hex string"))?;
            let bytes = hex::decode(hex_str.trim_start_matches("0x"))
                .map_err(|_| anyhow!("Invalid hex string: {}", hex_str))?;
            Ok(DynSolValue::Bytes(bytes))
        }
        _ => Err(anyhow!("Unsupported Solidity type: {}", sol_type)),
    }
}

fn bit_width(suffix: &str) -> Result<usize> {
    if suffix.is_empty() {
        return Ok(256);
    }
    suffix
        .parse()
        .map_err(|_| anyhow!("Invalid integer width: {}", suffix))
}

/// Convert single DynSolValue to JSON
pub fn dyn_sol_value_to_json(value: &DynSolValue) -> Result<Value> {
    match value {
        DynSolValue::Address(addr) => Ok(Value::String(format!("{}", addr))),
        DynSolValue::Uint(num, _) => Ok(Value::String(num.to_string())),
        DynSolValue::Int(num, _) => Ok(Value::String(num.to_string())),
        DynSolValue::Bool(b) => Ok(Value::Bool(*b)),
        DynSolValue::String(s) => Ok(Value::String(s.clone())),
        DynSolValue::Bytes(bytes) => Ok(Value::String(format!("0x{}", hex::encode(bytes)))),
        DynSolValue::FixedBytes(word, size) => Ok(Value::String(format!(
            "0x{}",
            hex::encode(&word[..*size])
        ))),
        DynSolValue::Array(items) | DynSolValue::FixedArray(items) | DynSolValue::Tuple(items) => {
            let mut json_arr = Vec::new();
            for item in items {
                json_arr.push(dyn_sol_value_to_json(item)?);
            }
            Ok(Value::Array(json_arr))
        }
        _ => Err(anyhow!("Unsupported DynSolValue type: {:?}", value)),
    }
}

/// Render an event field the way it is shown to the user
pub fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Decode receipt logs against the ABI, skipping logs that match no event
pub fn decode_event_logs<'a, I>(abi: &JsonAbi, logs: I) -> Vec<EmittedEvent>
where
    I: IntoIterator<Item = &'a LogData>,
{
    logs.into_iter()
        .filter_map(|log| decode_event_log(abi, log))
        .collect()
}

fn decode_event_log(abi: &JsonAbi, log: &LogData) -> Option<EmittedEvent> {
    // topic0 is the selector, anonymous events carry none
    let topic0 = log.topics().first()?;
    let event = abi
        .events()
        .find(|e| !e.anonymous && e.selector() == *topic0)?;

    let decoded = match event.decode_log(log, true) {
        Ok(decoded) => decoded,
        Err(e) => {
            debug!("Failed to decode {} log: {}", event.name, e);
            return None;
        }
    };

    // Decoded values come back split, zip them onto the inputs in ABI order
    let mut indexed = decoded.indexed.into_iter();
    let mut body = decoded.body.into_iter();
    let mut fields = Map::new();
    for input in &event.inputs {
        let value = if input.indexed {
            indexed.next()
        } else {
            body.next()
        };
        if let Some(value) = value {
            let json = dyn_sol_value_to_json(&value).unwrap_or(Value::Null);
            fields.insert(input.name.clone(), json);
        }
    }

    Some(EmittedEvent {
        name: event.name.clone(),
        fields,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ethereum::artifact::tests::sample_artifact;
    use alloy::primitives::B256;

    #[test]
    fn test_find_function_reports_available_names() {
        let artifact = sample_artifact();

        assert!(find_function(&artifact.abi, "generateOTP").is_ok());
        let err = find_function(&artifact.abi, "resetOTP").unwrap_err().to_string();
        assert!(err.contains("generateOTP"));
        assert!(err.contains("validateOTP"));
    }

    #[test]
    fn test_encodes_decimal_string_as_uint() {
        let artifact = sample_artifact();
        let function = find_function(&artifact.abi, "validateOTP").unwrap();

        let calldata = encode_function_call(function, &serde_json::json!(["123456"])).unwrap();
        assert_eq!(&calldata[..4], function.selector().as_slice());

        let decoded = function.abi_decode_input(&calldata[4..], true).unwrap();
        assert_eq!(decoded, vec![DynSolValue::Uint(U256::from(123456u64), 256)]);
    }

    #[test]
    fn test_encodes_hex_string_as_uint() {
        let artifact = sample_artifact();
        let function = find_function(&artifact.abi, "validateOTP").unwrap();

        let calldata = encode_function_call(function, &serde_json::json!(["0x10"])).unwrap();
        let decoded = function.abi_decode_input(&calldata[4..], true).unwrap();
        assert_eq!(decoded, vec![DynSolValue::Uint(U256::from(16u64), 256)]);
    }

    #[test]
    fn test_rejects_non_numeric_input_for_uint() {
        let artifact = sample_artifact();
        let function = find_function(&artifact.abi, "validateOTP").unwrap();

        let err = encode_function_call(function, &serde_json::json!(["abc-123"]))
            .unwrap_err()
            .to_string();
        assert!(err.contains("_otp"));
    }

    #[test]
    fn test_parameter_count_mismatch() {
        let artifact = sample_artifact();
        let function = find_function(&artifact.abi, "generateOTP").unwrap();

        assert!(encode_function_call(function, &serde_json::json!([])).is_ok());
        assert!(encode_function_call(function, &serde_json::json!(["1"])).is_err());
    }

    #[test]
    fn test_string_parameters() {
        assert_eq!(
            json_to_dyn_sol_value(&serde_json::json!("042"), "string").unwrap(),
            DynSolValue::String("042".to_string())
        );
        assert_eq!(
            json_to_dyn_sol_value(&serde_json::json!(["1", "2"]), "uint8[]").unwrap(),
            DynSolValue::Array(vec![
                DynSolValue::Uint(U256::from(1u64), 8),
                DynSolValue::Uint(U256::from(2u64), 8),
            ])
        );
    }

    #[test]
    fn test_decodes_generated_event() {
        let artifact = sample_artifact();
        let event = &artifact.abi.event("OTPGenerated").unwrap()[0];
        let user = Address::repeat_byte(0x11);

        let data = DynSolValue::Tuple(vec![DynSolValue::Uint(U256::from(424242u64), 256)])
            .abi_encode_params();
        let log = LogData::new_unchecked(vec![event.selector(), user.into_word()], data.into());

        let events = decode_event_logs(&artifact.abi, [&log]);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].name, "OTPGenerated");
        assert_eq!(events[0].fields["otp"], Value::String("424242".to_string()));
        assert_eq!(events[0].fields["user"], Value::String(user.to_string()));
    }

    #[test]
    fn test_skips_unknown_logs() {
        let artifact = sample_artifact();
        let unrelated = LogData::new_unchecked(vec![B256::repeat_byte(0xab)], Bytes::new());
        let empty = LogData::new_unchecked(vec![], Bytes::new());

        assert!(decode_event_logs(&artifact.abi, [&unrelated, &empty]).is_empty());
    }

    #[test]
    fn test_display_value() {
        assert_eq!(display_value(&Value::String("991823".into())), "991823");
        assert_eq!(display_value(&Value::Bool(true)), "true");
    }
}
