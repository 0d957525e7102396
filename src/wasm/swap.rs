//! WASM bindings for buying listed inscriptions

use std::str::FromStr;

use miniscript::bitcoin::Txid;
use serde::Serialize;
use wasm_bindgen::prelude::*;

use super::parse_config;
use super::try_from_js_value::from_js;
use super::try_into_js_value::{js_obj, psbt_to_base64, TryIntoJsValue};
use crate::error::WasmOrdinalsError;
use crate::fees::FeeRate;
use crate::sats::Utxo;
use crate::swap::{Buyer, Purchase, PurchaseFlow, SellerListing, SwapPlan};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SwapSummary {
    psbt: String,
    seller_inputs: Vec<usize>,
    buyer_inputs: Vec<usize>,
    asset_vout: u32,
    platform_fee: u64,
    fee: u64,
    change_vout: Option<u32>,
    new_dummy_vouts: Vec<u32>,
}

impl From<&SwapPlan> for SwapSummary {
    fn from(plan: &SwapPlan) -> Self {
        SwapSummary {
            psbt: psbt_to_base64(&plan.funded.psbt),
            seller_inputs: plan.seller_inputs.clone().collect(),
            buyer_inputs: plan.buyer_inputs(),
            asset_vout: plan.asset_vout,
            platform_fee: plan.platform_fee,
            fee: plan.funded.fee,
            change_vout: plan.funded.change_vout(),
            new_dummy_vouts: plan.new_dummy_vouts.clone().collect(),
        }
    }
}

fn parse_listings(listings: Vec<String>) -> Result<Vec<SellerListing>, WasmOrdinalsError> {
    listings.iter().map(|l| SellerListing::parse(l)).collect()
}

/// Namespace for seller listings
#[wasm_bindgen]
pub struct SwapNamespace;

#[wasm_bindgen]
impl SwapNamespace {
    /// Validate a seller's SINGLE|ANYONECANPAY listing (base64 or hex PSBT)
    ///
    /// # Returns
    /// An object containing `outpoint`, `assetValue`, `price` and `witnessSize`
    #[wasm_bindgen(js_name = parseListing)]
    pub fn parse_listing(encoded: &str) -> Result<JsValue, WasmOrdinalsError> {
        let listing = SellerListing::parse(encoded)?;
        js_obj!(
            "outpoint" => listing.outpoint().to_string(),
            "assetValue" => listing.asset_value(),
            "price" => listing.price(),
            "witnessSize" => listing.witness_size()
        )
    }
}

/// A purchase in progress
///
/// When the buyer lacks dummy outputs, `prepPsbt` returns the transaction that
/// creates them. It must be signed and broadcast, and its txid passed to
/// `dummiesBroadcast`, before `buildSwap` succeeds.
#[wasm_bindgen]
pub struct WasmPurchase {
    flow: PurchaseFlow,
}

#[wasm_bindgen]
impl WasmPurchase {
    /// # Arguments
    /// * `listings` - Seller PSBTs (base64 or hex)
    /// * `receive_address` - Taproot address receiving the purchased inscriptions
    /// * `payer_address` - Address holding `utxos`; change returns here
    /// * `fee_rate` - sat/vB
    /// * `config` - Market configuration
    /// * `utxos` - Everything the buyer can spend, dummies included
    #[wasm_bindgen(constructor)]
    pub fn new(
        listings: Vec<String>,
        receive_address: &str,
        payer_address: &str,
        fee_rate: f64,
        config: JsValue,
        utxos: JsValue,
    ) -> Result<WasmPurchase, WasmOrdinalsError> {
        let config = parse_config(config)?;
        let utxos: Vec<Utxo> = from_js(utxos, "utxos")?;
        let buyer = Buyer::new(
            receive_address,
            payer_address,
            FeeRate::from_decimal(fee_rate)?,
            &config,
        )?;
        let purchase = Purchase {
            listings: parse_listings(listings)?,
            buyer,
            config,
        };
        Ok(WasmPurchase {
            flow: PurchaseFlow::start(purchase, utxos)?,
        })
    }

    /// Unsigned dummy funding PSBT (base64), or undefined when none is needed
    #[wasm_bindgen(js_name = prepPsbt)]
    pub fn prep_psbt(&self) -> Option<String> {
        self.flow.prep_psbt().map(psbt_to_base64)
    }

    /// Record the txid of the broadcast dummy funding transaction
    #[wasm_bindgen(js_name = dummiesBroadcast)]
    pub fn dummies_broadcast(&mut self, txid: &str) -> Result<(), WasmOrdinalsError> {
        let txid = Txid::from_str(txid)
            .map_err(|e| WasmOrdinalsError::InvalidInput(format!("Invalid txid: {}", e)))?;
        self.flow = self.flow.clone().dummies_broadcast(txid)?;
        Ok(())
    }

    /// Build the unsigned swap
    ///
    /// # Returns
    /// An object containing:
    /// - `psbt`: Unsigned swap PSBT (base64) with seller signatures in place
    /// - `sellerInputs` / `buyerInputs`: Input indices by signer
    /// - `assetVout`, `platformFee`, `fee`, `changeVout`, `newDummyVouts`
    #[wasm_bindgen(js_name = buildSwap)]
    pub fn build_swap(&self) -> Result<JsValue, WasmOrdinalsError> {
        let plan = self.flow.build_swap()?;
        SwapSummary::from(&plan).try_to_js_value()
    }
}
