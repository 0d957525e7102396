//! WASM bindings for satoshi range partitioning

use wasm_bindgen::prelude::*;

use super::parse_config;
use super::try_from_js_value::from_js;
use super::try_into_js_value::{js_obj, psbt_to_base64, TryIntoJsValue};
use crate::address::to_output_script;
use crate::assembler::{plan_split as plan_split_impl, FundingOptions};
use crate::error::WasmOrdinalsError;
use crate::fees::FeeRate;
use crate::sats::{
    split_even as split_even_impl, split_rare as split_rare_impl, SatoshiRange, Utxo,
};

/// Namespace for splitting sat ranges into outputs
#[wasm_bindgen]
pub struct SatsNamespace;

#[wasm_bindgen]
impl SatsNamespace {
    /// Split ranges into up to `chunks` chunks of exactly `amount` sats
    ///
    /// # Arguments
    /// * `ranges` - Array of `{ start, size, offset?, attributes? }`
    /// * `amount` - Sats per chunk
    /// * `chunks` - Number of chunks wanted
    /// * `min_output_value` - Smallest acceptable `amount`
    ///
    /// # Returns
    /// Array of `{ ranges, total }`. Offsets are positions inside each chunk and
    /// leftover sats are dropped; fewer chunks than requested means the
    /// ranges ran out.
    #[wasm_bindgen(js_name = splitEven)]
    pub fn split_even(
        ranges: JsValue,
        amount: u64,
        chunks: u32,
        min_output_value: u64,
    ) -> Result<JsValue, WasmOrdinalsError> {
        let ranges: Vec<SatoshiRange> = from_js(ranges, "ranges")?;
        split_even_impl(ranges, amount, chunks as usize, min_output_value)?.try_to_js_value()
    }

    /// Like `splitEven`, but offsets stay relative to the source UTXO and
    /// leftover sats are returned as one final, possibly short, chunk
    #[wasm_bindgen(js_name = splitRare)]
    pub fn split_rare(
        ranges: JsValue,
        amount: u64,
        chunks: u32,
        min_output_value: u64,
    ) -> Result<JsValue, WasmOrdinalsError> {
        let ranges: Vec<SatoshiRange> = from_js(ranges, "ranges")?;
        split_rare_impl(ranges, amount, chunks as usize, min_output_value)?.try_to_js_value()
    }

    /// Build a transaction splitting one UTXO into `chunks` outputs of `amount` sats
    ///
    /// # Arguments
    /// * `utxo` - The UTXO to split; its ranges must cover it from offset 0
    /// * `amount` - Sats per new output
    /// * `chunks` - Number of new outputs
    /// * `utxos` - Extra payer UTXOs used when `utxo` cannot cover the fee
    /// * `payer_address` - Owner of all inputs; receives the outputs and change
    /// * `fee_rate` - sat/vB
    /// * `config` - Market configuration
    ///
    /// # Returns
    /// An object containing `psbt` (base64), `chunks` (ranges per output),
    /// `fee` and `change`
    #[wasm_bindgen(js_name = planSplit)]
    pub fn plan_split(
        utxo: JsValue,
        amount: u64,
        chunks: u32,
        utxos: JsValue,
        payer_address: &str,
        fee_rate: f64,
        config: JsValue,
    ) -> Result<JsValue, WasmOrdinalsError> {
        let utxo: Utxo = from_js(utxo, "utxo")?;
        let utxos: Vec<Utxo> = from_js(utxos, "utxos")?;
        let config = parse_config(config)?;
        let options = FundingOptions::new(
            to_output_script(payer_address, config.network)?,
            FeeRate::from_decimal(fee_rate)?,
            config.min_output_value,
        );
        let plan = plan_split_impl(&utxo, amount, chunks as usize, &utxos, &options)?;
        js_obj!(
            "psbt" => psbt_to_base64(&plan.funded.psbt),
            "chunks" => &plan.chunks,
            "fee" => plan.funded.fee,
            "change" => plan.funded.change
        )
    }
}
