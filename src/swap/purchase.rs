//! Two-phase purchases: fund missing dummies, then build the swap
//!
//! The dummy funding transaction is a real, broadcast dependency of the swap.
//! Once it is on the network any later failure is reported as
//! [`WasmOrdinalsError::SwapAfterDummyFunding`] carrying its txid, so the
//! caller keeps track of the new dummy outputs.

use std::collections::HashSet;

use miniscript::bitcoin::psbt::Psbt;
use miniscript::bitcoin::Txid;
use tracing::{info, warn};

use super::dummy::{build_dummy_funding, dummy_funding_outputs, BuyerUtxos};
use super::{build_swap, Buyer, SellerListing, SwapPlan};
use crate::assembler::FundedTransaction;
use crate::config::MarketConfig;
use crate::error::{Result, WasmOrdinalsError};
use crate::sats::Utxo;

/// Signing and broadcasting live outside this crate
pub trait WalletBoundary {
    /// Sign the buyer inputs of `psbt`, broadcast it and return its txid
    ///
    /// Failures should come back as [`WasmOrdinalsError::External`].
    fn sign_and_broadcast(&mut self, psbt: &Psbt) -> Result<Txid>;
}

#[derive(Debug, Clone)]
pub struct Purchase {
    pub listings: Vec<SellerListing>,
    pub buyer: Buyer,
    pub config: MarketConfig,
}

#[derive(Debug, Clone)]
pub enum PurchaseFlow {
    /// `prep` must be signed and broadcast before the swap can be built
    NeedsDummies {
        purchase: Purchase,
        utxos: Vec<Utxo>,
        prep: FundedTransaction,
        missing: usize,
    },
    Ready {
        purchase: Purchase,
        utxos: Vec<Utxo>,
        /// Set when this purchase funded its own dummies
        dummy_txid: Option<Txid>,
    },
}

impl PurchaseFlow {
    pub fn start(purchase: Purchase, utxos: Vec<Utxo>) -> Result<Self> {
        let sorted = BuyerUtxos::sort(&utxos, &purchase.config);
        let missing = sorted.missing_dummies(&purchase.config);
        if missing == 0 {
            return Ok(PurchaseFlow::Ready {
                purchase,
                utxos,
                dummy_txid: None,
            });
        }
        let prep = build_dummy_funding(
            missing,
            &sorted.funding,
            &purchase.buyer.funding,
            &purchase.config,
        )?;
        info!(missing, "purchase needs dummy funding first");
        Ok(PurchaseFlow::NeedsDummies {
            purchase,
            utxos,
            prep,
            missing,
        })
    }

    /// The dummy funding PSBT to sign, if this purchase still needs one
    pub fn prep_psbt(&self) -> Option<&Psbt> {
        match self {
            PurchaseFlow::NeedsDummies { prep, .. } => Some(&prep.psbt),
            PurchaseFlow::Ready { .. } => None,
        }
    }

    /// Record that the dummy funding transaction was broadcast as `txid`
    ///
    /// Its inputs leave the buyer's UTXO set; its dummy and change outputs join it.
    pub fn dummies_broadcast(self, txid: Txid) -> Result<Self> {
        match self {
            PurchaseFlow::NeedsDummies {
                purchase,
                utxos,
                prep,
                missing,
            } => {
                let spent: HashSet<_> = prep.selected.iter().map(Utxo::outpoint).collect();
                let mut utxos: Vec<Utxo> = utxos
                    .into_iter()
                    .filter(|u| !spent.contains(&u.outpoint()))
                    .collect();
                utxos.extend(dummy_funding_outputs(prep.unsigned_tx(), txid, missing));
                Ok(PurchaseFlow::Ready {
                    purchase,
                    utxos,
                    dummy_txid: Some(txid),
                })
            }
            PurchaseFlow::Ready { .. } => Err(WasmOrdinalsError::new(
                "purchase has no pending dummy funding",
            )),
        }
    }

    pub fn dummy_txid(&self) -> Option<Txid> {
        match self {
            PurchaseFlow::Ready { dummy_txid, .. } => *dummy_txid,
            PurchaseFlow::NeedsDummies { .. } => None,
        }
    }

    /// Build the swap; only possible once dummies are in place
    pub fn build_swap(&self) -> Result<SwapPlan> {
        match self {
            PurchaseFlow::Ready {
                purchase,
                utxos,
                dummy_txid,
            } => build_swap(&purchase.listings, &purchase.buyer, utxos, &purchase.config)
                .map_err(|e| after_dummy_funding(*dummy_txid, e)),
            PurchaseFlow::NeedsDummies { .. } => Err(WasmOrdinalsError::new(
                "dummy funding transaction must be broadcast first",
            )),
        }
    }
}

fn after_dummy_funding(dummy_txid: Option<Txid>, err: WasmOrdinalsError) -> WasmOrdinalsError {
    match dummy_txid {
        Some(txid) => {
            warn!(%txid, error = %err, "swap failed after dummy funding broadcast");
            WasmOrdinalsError::SwapAfterDummyFunding {
                dummy_txid: txid.to_string(),
                source: Box::new(err),
            }
        }
        None => err,
    }
}

#[derive(Debug, Clone)]
pub struct PurchaseOutcome {
    pub dummy_txid: Option<Txid>,
    pub swap_txid: Txid,
    pub swap: SwapPlan,
}

/// Drive both phases of a purchase through `wallet`
pub fn execute_purchase<W: WalletBoundary>(
    wallet: &mut W,
    purchase: Purchase,
    utxos: Vec<Utxo>,
) -> Result<PurchaseOutcome> {
    let mut flow = PurchaseFlow::start(purchase, utxos)?;
    let prep_txid = match flow.prep_psbt() {
        Some(prep) => Some(wallet.sign_and_broadcast(prep)?),
        None => None,
    };
    if let Some(txid) = prep_txid {
        flow = flow.dummies_broadcast(txid)?;
    }
    let dummy_txid = flow.dummy_txid();
    let swap = flow.build_swap()?;
    let swap_txid = wallet
        .sign_and_broadcast(&swap.funded.psbt)
        .map_err(|e| after_dummy_funding(dummy_txid, e))?;
    info!(%swap_txid, dummy_txid = ?dummy_txid, "purchase broadcast");
    Ok(PurchaseOutcome {
        dummy_txid,
        swap_txid,
        swap,
    })
}
