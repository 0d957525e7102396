//! WASM bindings for mint orders
//!
//! Orders cross the boundary as plain objects. The application persists them
//! between calls and passes them back for every status change.

use miniscript::bitcoin::consensus;
use miniscript::bitcoin::Transaction;
use wasm_bindgen::prelude::*;

use super::parse_config;
use super::try_from_js_value::from_js;
use super::try_into_js_value::{js_obj, psbt_to_base64, TryIntoJsValue};
use crate::assembler::{plan_mint, plan_rare_mint, MintPlan, MintRequest};
use crate::error::WasmOrdinalsError;
use crate::inscriptions::EphemeralKey;
use crate::orders::{Order, OrderKind};
use crate::sats::Utxo;

fn plan_to_js(plan: &MintPlan, order: &Order) -> Result<JsValue, WasmOrdinalsError> {
    js_obj!(
        "order" => order,
        "commitPsbt" => psbt_to_base64(&plan.commit.psbt),
        "fundingAddress" => plan.envelope.funding_address(),
        "commitValue" => plan.commit_value,
        "revealFee" => plan.reveal_fee,
        "commitFee" => plan.commit.fee,
        "selected" => &plan.commit.selected
    )
}

fn update<F>(order: JsValue, change: F) -> Result<JsValue, WasmOrdinalsError>
where
    F: FnOnce(&mut Order) -> Result<(), WasmOrdinalsError>,
{
    let mut order: Order = from_js(order, "order")?;
    change(&mut order)?;
    order.try_to_js_value()
}

/// Namespace for mint order planning and lifecycle
#[wasm_bindgen]
pub struct OrdersNamespace;

#[wasm_bindgen]
impl OrdersNamespace {
    /// Plan a mint and open a pending order for it
    ///
    /// A fresh ephemeral key is generated and stored in the order.
    ///
    /// # Arguments
    /// * `request` - `{ contents, receiveAddress, payerAddress, feeRate, layout?, metadata? }`
    /// * `config` - Market configuration; missing fields take their defaults
    /// * `utxos` - The payer's spendable UTXOs
    /// * `created_at` - Milliseconds since the Unix epoch
    ///
    /// # Returns
    /// An object containing:
    /// - `order`: The pending order, to be persisted
    /// - `commitPsbt`: Unsigned funding PSBT (base64); the envelope output is output 0
    /// - `fundingAddress`, `commitValue`, `revealFee`, `commitFee`, `selected`
    #[wasm_bindgen(js_name = planMint)]
    pub fn plan_mint(
        request: JsValue,
        config: JsValue,
        utxos: JsValue,
        created_at: u64,
    ) -> Result<JsValue, WasmOrdinalsError> {
        let request: MintRequest = from_js(request, "mint request")?;
        let config = parse_config(config)?;
        let utxos: Vec<Utxo> = from_js(utxos, "utxos")?;
        let key = EphemeralKey::generate()?;
        let plan = plan_mint(&request, &key, &config, &utxos)?;
        let order = Order::new(OrderKind::Mint, &plan, &request, key, created_at);
        plan_to_js(&plan, &order)
    }

    /// Plan a mint onto rare sats held in `rare_utxos`
    ///
    /// Same result shape as `planMint`. The rare UTXOs are spent first in the
    /// commit and are never used as plain funding.
    #[wasm_bindgen(js_name = planRareMint)]
    pub fn plan_rare_mint(
        request: JsValue,
        config: JsValue,
        rare_utxos: JsValue,
        utxos: JsValue,
        created_at: u64,
    ) -> Result<JsValue, WasmOrdinalsError> {
        let request: MintRequest = from_js(request, "mint request")?;
        let config = parse_config(config)?;
        let rare_utxos: Vec<Utxo> = from_js(rare_utxos, "rare utxos")?;
        let utxos: Vec<Utxo> = from_js(utxos, "utxos")?;
        let key = EphemeralKey::generate()?;
        let plan = plan_rare_mint(&request, &key, &config, &rare_utxos, &utxos)?;
        let order = Order::new(OrderKind::RareMint, &plan, &request, key, created_at);
        plan_to_js(&plan, &order)
    }

    /// Sign the reveal transaction of a paid order
    ///
    /// # Arguments
    /// * `order` - The persisted order, status `paid`
    /// * `commit_tx` - The broadcast funding transaction (consensus bytes)
    ///
    /// # Returns
    /// The signed reveal transaction (consensus bytes)
    #[wasm_bindgen(js_name = signReveal)]
    pub fn sign_reveal(order: JsValue, commit_tx: &[u8]) -> Result<Vec<u8>, WasmOrdinalsError> {
        let order: Order = from_js(order, "order")?;
        let commit_tx: Transaction = consensus::deserialize(commit_tx).map_err(|e| {
            WasmOrdinalsError::InvalidInput(format!("Invalid commit transaction: {}", e))
        })?;
        let reveal = order.sign_reveal(&commit_tx)?;
        Ok(consensus::serialize(&reveal))
    }

    #[wasm_bindgen(js_name = markPaid)]
    pub fn mark_paid(order: JsValue, funding_txid: String) -> Result<JsValue, WasmOrdinalsError> {
        update(order, |o| o.mark_paid(funding_txid))
    }

    #[wasm_bindgen(js_name = markInscribed)]
    pub fn mark_inscribed(
        order: JsValue,
        reveal_txid: String,
    ) -> Result<JsValue, WasmOrdinalsError> {
        update(order, |o| o.mark_inscribed(reveal_txid))
    }

    #[wasm_bindgen(js_name = markFailed)]
    pub fn mark_failed(order: JsValue, reason: String) -> Result<JsValue, WasmOrdinalsError> {
        update(order, |o| o.mark_failed(reason))
    }

    /// Move a failed order back to `paid` so the reveal can be attempted again
    pub fn retry(order: JsValue) -> Result<JsValue, WasmOrdinalsError> {
        update(order, Order::retry)
    }
}
