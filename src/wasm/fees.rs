//! WASM bindings for fee estimation

use wasm_bindgen::prelude::*;

use crate::error::WasmOrdinalsError;
use crate::fees::{
    estimate_fee as estimate_fee_impl, estimate_reveal_fee as estimate_reveal_fee_impl,
    estimate_vsize as estimate_vsize_impl, FeeRate, OutputLayout,
};

fn parse_layout(layout: &str) -> Result<OutputLayout, WasmOrdinalsError> {
    match layout {
        "tight" => Ok(OutputLayout::Tight),
        "separate" => Ok(OutputLayout::Separate),
        other => Err(WasmOrdinalsError::InvalidInput(format!(
            "Unknown output layout '{}', expected 'tight' or 'separate'",
            other
        ))),
    }
}

/// Namespace for fee estimation
#[wasm_bindgen]
pub struct FeesNamespace;

#[wasm_bindgen]
impl FeesNamespace {
    /// Estimated virtual size of a transaction shape
    ///
    /// `witness_size` is the combined witness bytes of all inputs.
    #[wasm_bindgen(js_name = estimateVsize)]
    pub fn estimate_vsize(input_count: u32, output_count: u32, witness_size: u32) -> u64 {
        estimate_vsize_impl(
            input_count as usize,
            output_count as usize,
            witness_size as usize,
        )
    }

    /// Estimated fee in sats for a transaction shape at `fee_rate` sat/vB
    #[wasm_bindgen(js_name = estimateFee)]
    pub fn estimate_fee(
        input_count: u32,
        output_count: u32,
        witness_size: u32,
        fee_rate: f64,
    ) -> Result<u64, WasmOrdinalsError> {
        Ok(estimate_fee_impl(
            input_count as usize,
            output_count as usize,
            witness_size as usize,
            FeeRate::from_decimal(fee_rate)?,
        ))
    }

    /// Fee for a reveal transaction spending one envelope output
    ///
    /// # Arguments
    /// * `content_count` - Number of inscriptions revealed
    /// * `layout` - "tight" (one output) or "separate" (one output per inscription)
    /// * `envelope_witness_size` - `witnessSize` of the envelope
    /// * `fee_rate` - sat/vB
    #[wasm_bindgen(js_name = estimateRevealFee)]
    pub fn estimate_reveal_fee(
        content_count: u32,
        layout: &str,
        envelope_witness_size: u32,
        fee_rate: f64,
    ) -> Result<u64, WasmOrdinalsError> {
        Ok(estimate_reveal_fee_impl(
            content_count as usize,
            parse_layout(layout)?,
            envelope_witness_size as usize,
            FeeRate::from_decimal(fee_rate)?,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_layout() {
        assert_eq!(parse_layout("tight").unwrap(), OutputLayout::Tight);
        assert_eq!(parse_layout("separate").unwrap(), OutputLayout::Separate);
        assert!(parse_layout("Tight").is_err());
    }
}
