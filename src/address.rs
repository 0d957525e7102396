//! Address parsing and output script helpers

use std::str::FromStr;

use crate::bitcoin::{Address, ScriptBuf};
use crate::error::{Result, WasmOrdinalsError};
use crate::networks::Network;

/// Parse an address string and check it belongs to `network`
pub fn parse_address(address: &str, network: Network) -> Result<Address> {
    if address.trim().is_empty() {
        return Err(WasmOrdinalsError::InvalidAddress("empty address".to_string()));
    }
    Address::from_str(address)
        .map_err(|e| WasmOrdinalsError::InvalidAddress(format!("{}: {}", address, e)))?
        .require_network(network.to_bitcoin_network())
        .map_err(|e| WasmOrdinalsError::InvalidAddress(format!("{}: {}", address, e)))
}

/// Output script for an address on `network`
pub fn to_output_script(address: &str, network: Network) -> Result<ScriptBuf> {
    Ok(parse_address(address, network)?.script_pubkey())
}

/// Output script for an address that must be pay-to-taproot
///
/// Inscriptions and traded assets are only ever sent to taproot outputs.
pub fn to_taproot_output_script(address: &str, network: Network) -> Result<ScriptBuf> {
    let script = to_output_script(address, network)?;
    if !script.is_p2tr() {
        return Err(WasmOrdinalsError::NonTaprootRecipient(address.to_string()));
    }
    Ok(script)
}

/// Address string for an output script, if it has one
pub fn from_output_script(script: &ScriptBuf, network: Network) -> Result<String> {
    Address::from_script(script, network.to_bitcoin_network())
        .map(|a| a.to_string())
        .map_err(|e| WasmOrdinalsError::InvalidAddress(format!("{}", e)))
}

/// scriptSig of a nested segwit spend: a push of the 22-byte P2WPKH redeem script
pub const NESTED_SEGWIT_SCRIPT_SIG_SIZE: usize = 23;
const TAPROOT_KEY_SPEND_WITNESS_SIZE: usize = 66;
const P2WPKH_WITNESS_SIZE: usize = 108;

/// Bytes a signed single-key spend adds to an input beyond its 41-byte base
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SpendSize {
    /// scriptSig bytes, not counting the length prefix already in the base
    pub script_sig: usize,
    pub witness: usize,
}

/// Size of a single-key spend of `script`
///
/// Taproot key path: count(1) + len(1) + schnorr(64).
/// Segwit v0 key hash: count(1) + len(1) + der(72) + len(1) + pubkey(33).
/// P2SH is taken to be nested P2WPKH: the same witness plus the redeem script push.
///
/// Legacy key hash spends need the full previous transaction in the PSBT and
/// script hash spends have no fixed size, so both are refused.
pub fn key_spend_size(script: &ScriptBuf) -> Result<SpendSize> {
    if script.is_p2tr() {
        Ok(SpendSize {
            script_sig: 0,
            witness: TAPROOT_KEY_SPEND_WITNESS_SIZE,
        })
    } else if script.is_p2wpkh() {
        Ok(SpendSize {
            script_sig: 0,
            witness: P2WPKH_WITNESS_SIZE,
        })
    } else if script.is_p2sh() {
        Ok(SpendSize {
            script_sig: NESTED_SEGWIT_SCRIPT_SIG_SIZE,
            witness: P2WPKH_WITNESS_SIZE,
        })
    } else {
        Err(WasmOrdinalsError::UnsupportedScriptType(script.to_hex_string()))
    }
}
