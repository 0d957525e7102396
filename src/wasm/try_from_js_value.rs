use std::ops::Deref;

use serde::de::DeserializeOwned;
use wasm_bindgen::JsValue;

use crate::error::WasmOrdinalsError;

// =============================================================================
// TryFromJsValue trait
// =============================================================================

/// Trait for converting JsValue to Rust types
pub(crate) trait TryFromJsValue: Sized {
    fn try_from_js_value(value: &JsValue) -> Result<Self, WasmOrdinalsError>;
}

// =============================================================================
// Bytes<N>: Fixed-size byte array wrapper
// =============================================================================

/// Fixed-size byte array read from a `Uint8Array`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Bytes<const N: usize>(pub [u8; N]);

impl<const N: usize> Deref for Bytes<N> {
    type Target = [u8; N];
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<const N: usize> TryFromJsValue for Bytes<N> {
    fn try_from_js_value(value: &JsValue) -> Result<Self, WasmOrdinalsError> {
        let buffer = js_sys::Uint8Array::new(value);
        if buffer.length() as usize != N {
            return Err(WasmOrdinalsError::InvalidInput(format!(
                "Expected {} bytes, got {}",
                N,
                buffer.length()
            )));
        }
        let mut bytes = [0u8; N];
        buffer.copy_to(&mut bytes);
        Ok(Bytes(bytes))
    }
}

// =============================================================================
// Plain JS objects
// =============================================================================

/// Deserialize a plain JS object into any serde type
///
/// `what` names the argument in the error message.
pub(crate) fn from_js<T: DeserializeOwned>(value: JsValue, what: &str) -> Result<T, WasmOrdinalsError> {
    serde_wasm_bindgen::from_value(value)
        .map_err(|e| WasmOrdinalsError::InvalidInput(format!("Invalid {}: {}", what, e)))
}
