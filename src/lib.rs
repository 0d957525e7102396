//! wasm-ordinals: inscription minting and inscription trading on Bitcoin
//!
//! This crate provides:
//! - Inscription envelopes committed to a one-time taproot key
//! - Fee estimation and funding of commit, split and swap transactions
//! - Sat range partitioning for rare-sat mints and UTXO splits
//! - Seller listing validation and dummy-output swaps for buyers
//! - Mint order lifecycle, persisted as plain JSON
//!
//! The core modules are plain Rust and never sign for the user; the only key
//! they sign with is an order's own ephemeral key. `wasm` holds the
//! `#[wasm_bindgen]` wrappers.

pub mod address;
pub mod assembler;
pub mod config;
pub mod error;
pub mod fees;
pub mod inscriptions;
#[cfg(not(target_arch = "wasm32"))]
pub mod logging;
pub mod networks;
pub mod orders;
pub mod sats;
pub mod swap;
pub mod wasm;

// re-export bitcoin from the miniscript crate
pub use ::miniscript::bitcoin;

pub use assembler::{
    build_funded_transaction, plan_mint, plan_rare_mint, plan_split, FundedTransaction,
    FundingOptions, MintPlan, MintRequest, SplitPlan, UtxoRegistry,
};
pub use config::{MarketConfig, ServiceFeeConfig};
pub use error::{Result, WasmOrdinalsError};
pub use fees::{FeeBreakdown, FeeRate, OutputLayout};
pub use inscriptions::{ContentItem, Envelope, EphemeralKey, Inscription, InscriptionId};
pub use networks::Network;
pub use orders::{Order, OrderKind, OrderStatus};
pub use sats::{SatoshiRange, Utxo};
pub use swap::{build_swap, Buyer, Purchase, PurchaseFlow, SellerListing, SwapPlan};
