//! WASM bindings for wasm-ordinals
//!
//! Thin `#[wasm_bindgen]` wrappers that decode JS arguments, delegate to the
//! core modules and encode the result. Structured arguments are plain JS
//! objects with camelCase keys; PSBTs travel as base64.

mod fees;
mod inscriptions;
mod orders;
mod sats;
mod swap;
mod try_from_js_value;
mod try_into_js_value;

pub use fees::FeesNamespace;
pub use inscriptions::InscriptionsNamespace;
pub use orders::OrdersNamespace;
pub use sats::SatsNamespace;
pub use swap::{SwapNamespace, WasmPurchase};

use std::str::FromStr;

use wasm_bindgen::JsValue;

use crate::config::MarketConfig;
use crate::error::WasmOrdinalsError;
use crate::networks::Network;

fn parse_network(network: &str) -> Result<Network, WasmOrdinalsError> {
    Network::from_str(network).map_err(WasmOrdinalsError::InvalidInput)
}

/// `undefined` or `null` selects the default mainnet configuration
fn parse_config(config: JsValue) -> Result<MarketConfig, WasmOrdinalsError> {
    if config.is_undefined() || config.is_null() {
        return Ok(MarketConfig::default());
    }
    let config: MarketConfig = try_from_js_value::from_js(config, "config")?;
    config.validate()?;
    Ok(config)
}
