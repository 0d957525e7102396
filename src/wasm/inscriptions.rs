//! WASM bindings for envelope construction

use wasm_bindgen::prelude::*;

use super::parse_network;
use super::try_from_js_value::{from_js, Bytes, TryFromJsValue};
use super::try_into_js_value::TryIntoJsValue;
use crate::error::WasmOrdinalsError;
use crate::inscriptions::{
    decode_offset as decode_offset_impl, encode_cbor, encode_offset as encode_offset_impl,
    Envelope, EphemeralKey, Inscription,
};

/// Namespace for inscription-related functions
#[wasm_bindgen]
pub struct InscriptionsNamespace;

#[wasm_bindgen]
impl InscriptionsNamespace {
    /// Build the taproot envelope committing to a list of inscriptions
    ///
    /// # Arguments
    /// * `inscriptions` - Array of `{ content, offset?, metadata? }` objects
    /// * `private_key` - The ephemeral private key (32 bytes)
    /// * `network` - "bitcoin", "testnet", "signet" or "regtest"
    ///
    /// # Returns
    /// An object containing `script`, `leafHash`, `internalKey`, `outputKey`,
    /// `controlBlock` (all hex), `fundingAddress` and `witnessSize`
    #[wasm_bindgen(js_name = buildEnvelope)]
    pub fn build_envelope(
        inscriptions: JsValue,
        private_key: JsValue,
        network: &str,
    ) -> Result<JsValue, WasmOrdinalsError> {
        let inscriptions: Vec<Inscription> = from_js(inscriptions, "inscriptions")?;
        let secret = Bytes::<32>::try_from_js_value(&private_key)?;
        let key = EphemeralKey::from_slice(secret.as_slice())?;
        let envelope = Envelope::build(&inscriptions, &key, parse_network(network)?)?;
        envelope.try_to_js_value()
    }

    /// Generate a fresh ephemeral private key (32 bytes)
    #[wasm_bindgen(js_name = generateKey)]
    pub fn generate_key() -> Result<Vec<u8>, WasmOrdinalsError> {
        Ok(EphemeralKey::generate()?.secret_key().secret_bytes().to_vec())
    }

    /// Minimal little-endian pointer encoding of an output offset
    #[wasm_bindgen(js_name = encodeOffset)]
    pub fn encode_offset(offset: u32) -> Vec<u8> {
        encode_offset_impl(offset)
    }

    #[wasm_bindgen(js_name = decodeOffset)]
    pub fn decode_offset(bytes: &[u8]) -> Result<u32, WasmOrdinalsError> {
        decode_offset_impl(bytes)
    }

    /// CBOR encoding of a JSON metadata object, as placed in the envelope
    #[wasm_bindgen(js_name = encodeMetadata)]
    pub fn encode_metadata(metadata: JsValue) -> Result<Vec<u8>, WasmOrdinalsError> {
        let value: serde_json::Value = from_js(metadata, "metadata")?;
        encode_cbor(&value)
    }
}
