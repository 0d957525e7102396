//! Error types for wasm-ordinals

use thiserror::Error;
use wasm_bindgen::prelude::*;

/// Main error type for wasm-ordinals operations
#[derive(Debug, Error)]
pub enum WasmOrdinalsError {
    /// Malformed caller input (empty identifier, bad hex, zero chunk count)
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Invalid address: {0}")]
    InvalidAddress(String),
    /// A taproot output was required but a different script type was given
    #[error("Recipient must be a taproot address: {0}")]
    NonTaprootRecipient(String),
    /// Payer script whose signed size cannot be estimated
    #[error("Unsupported payer script type: {0}")]
    UnsupportedScriptType(String),
    /// Inscription back-reference that does not decode to a 32-byte txid
    #[error("Invalid relation reference: {0}")]
    InvalidRelationReference(String),
    #[error("Insufficient funds: required {required} sats, available {available} sats")]
    InsufficientFunds { required: u64, available: u64 },
    #[error("Insufficient satoshis for {requested} chunks, only {produced} produced")]
    InsufficientChunks { requested: usize, produced: usize },
    /// Seller listing that is not a single-input/single-output SINGLE|ANYONECANPAY PSBT
    #[error("Invalid partial transaction: {0}")]
    InvalidPartialTransaction(String),
    /// Internal consistency check failed; always a defect
    #[error("Invariant violated: {0}")]
    Invariant(String),
    /// Failure reported by the wallet, fee oracle or broadcaster, passed through verbatim
    #[error("{0}")]
    External(String),
    /// The dummy-funding transaction is on the network but the swap could not be built
    #[error("Dummy outputs funded in {dummy_txid} but swap build failed: {source}")]
    SwapAfterDummyFunding {
        dummy_txid: String,
        #[source]
        source: Box<WasmOrdinalsError>,
    },
    #[error("Invalid order transition from {from} to {to}")]
    InvalidOrderTransition { from: String, to: String },
    #[error("UTXO registry lock poisoned")]
    RegistryPoisoned,
}

pub type Result<T> = std::result::Result<T, WasmOrdinalsError>;

impl WasmOrdinalsError {
    pub fn new(message: &str) -> Self {
        WasmOrdinalsError::InvalidInput(message.to_string())
    }

    pub fn invariant(message: impl Into<String>) -> Self {
        WasmOrdinalsError::Invariant(message.into())
    }

    /// Txid of the dummy-funding transaction if this error happened after it was broadcast
    pub fn dummy_funding_txid(&self) -> Option<&str> {
        match self {
            WasmOrdinalsError::SwapAfterDummyFunding { dummy_txid, .. } => Some(dummy_txid),
            _ => None,
        }
    }
}

impl From<&str> for WasmOrdinalsError {
    fn from(s: &str) -> Self {
        WasmOrdinalsError::InvalidInput(s.to_string())
    }
}

impl From<String> for WasmOrdinalsError {
    fn from(s: String) -> Self {
        WasmOrdinalsError::InvalidInput(s)
    }
}

impl From<serde_json::Error> for WasmOrdinalsError {
    fn from(err: serde_json::Error) -> Self {
        WasmOrdinalsError::InvalidInput(format!("JSON error: {}", err))
    }
}

impl From<hex::FromHexError> for WasmOrdinalsError {
    fn from(err: hex::FromHexError) -> Self {
        WasmOrdinalsError::InvalidInput(format!("Hex decode error: {}", err))
    }
}

// Converts to JS Error with stack trace
impl From<WasmOrdinalsError> for JsValue {
    fn from(err: WasmOrdinalsError) -> Self {
        js_sys::Error::new(&err.to_string()).into()
    }
}
