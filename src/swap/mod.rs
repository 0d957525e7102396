//! Atomic buy transactions built from seller listings
//!
//! Layout for `k = required_dummy_count` and `n` listings:
//!
//! ```text
//! inputs:  [dummy x (k+1)] [seller 1..n]  [buyer funding ...]
//! outputs: [dummy x k]     [asset]         [seller payment 1..n] [platform fee?] [new dummy x (k+1)] [change?]
//! ```
//!
//! The first `k` outputs absorb exactly the value of the dummy inputs, so the
//! sats of the seller inputs flow into the single asset output. Seller input
//! `i` and its payment output both sit at index `k + 1 + i`, which is what
//! their SINGLE|ANYONECANPAY signatures commit to.

mod dummy;
mod listing;
mod purchase;

pub use dummy::{build_dummy_funding, dummy_funding_outputs, is_dummy, BuyerUtxos};
pub use listing::SellerListing;
pub use purchase::{execute_purchase, Purchase, PurchaseFlow, PurchaseOutcome, WalletBoundary};

use std::collections::HashSet;
use std::ops::Range;

use miniscript::bitcoin::{Amount, OutPoint, ScriptBuf, TxOut, Txid};
use tracing::{debug, info};

use crate::address::{to_output_script, to_taproot_output_script};
use crate::assembler::{fund, FixedInput, FundedTransaction, FundingOptions, SpendsOutpoints};
use crate::config::MarketConfig;
use crate::error::{Result, WasmOrdinalsError};
use crate::fees::FeeRate;
use crate::sats::Utxo;

/// The buyer's side of a purchase
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Buyer {
    /// Taproot script receiving the purchased assets
    pub receive_script: ScriptBuf,
    pub funding: FundingOptions,
}

impl Buyer {
    pub fn new(
        receive_address: &str,
        payer_address: &str,
        fee_rate: FeeRate,
        config: &MarketConfig,
    ) -> Result<Self> {
        Ok(Buyer {
            receive_script: to_taproot_output_script(receive_address, config.network)?,
            funding: FundingOptions::new(
                to_output_script(payer_address, config.network)?,
                fee_rate,
                config.min_output_value,
            ),
        })
    }
}

/// An unsigned swap transaction and where its parts ended up
#[derive(Debug, Clone)]
pub struct SwapPlan {
    pub funded: FundedTransaction,
    /// Input indices the seller signatures already cover
    pub seller_inputs: Range<usize>,
    pub asset_vout: u32,
    pub platform_fee: u64,
    /// Fresh dummy outputs for the buyer's next purchase
    pub new_dummy_vouts: Range<u32>,
}

impl SwapPlan {
    /// Input indices the buyer's wallet must sign
    pub fn buyer_inputs(&self) -> Vec<usize> {
        (0..self.funded.unsigned_tx().input.len())
            .filter(|i| !self.seller_inputs.contains(i))
            .collect()
    }

    /// Buyer UTXOs this swap creates once `txid` is broadcast: new dummies, then change
    pub fn buyer_outputs(&self, txid: Txid) -> Vec<Utxo> {
        let tx = self.funded.unsigned_tx();
        self.new_dummy_vouts
            .clone()
            .chain(self.funded.change_vout())
            .map(|vout| Utxo::new(txid, vout, tx.output[vout as usize].value.to_sat()))
            .collect()
    }
}

impl SpendsOutpoints for SwapPlan {
    fn spent_outpoints(&self) -> Vec<OutPoint> {
        let tx = self.funded.unsigned_tx();
        self.buyer_inputs()
            .into_iter()
            .map(|i| tx.input[i].previous_output)
            .collect()
    }
}

fn platform_fee_output(listings: &[SellerListing], config: &MarketConfig) -> Result<Option<TxOut>> {
    let Some(address) = &config.platform_fee_address else {
        return Ok(None);
    };
    let total_price: u64 = listings.iter().map(SellerListing::price).sum();
    let fee = total_price * u64::from(config.platform_fee_bps) / 10_000;
    if fee < config.min_output_value {
        debug!(fee, "platform fee below minimum output value, skipped");
        return Ok(None);
    }
    Ok(Some(TxOut {
        value: Amount::from_sat(fee),
        script_pubkey: to_output_script(address, config.network)?,
    }))
}

fn check_listings(listings: &[SellerListing]) -> Result<()> {
    if listings.is_empty() {
        return Err(WasmOrdinalsError::new("purchase needs at least one listing"));
    }
    let mut seen = HashSet::new();
    for listing in listings {
        if !seen.insert(listing.outpoint()) {
            return Err(WasmOrdinalsError::InvalidPartialTransaction(format!(
                "{} is listed twice",
                listing.outpoint()
            )));
        }
    }
    Ok(())
}

/// Build the unsigned swap for `listings`
///
/// `utxos` is everything the buyer can spend; dummies are taken from it first
/// and the rest funds the purchase.
pub fn build_swap(
    listings: &[SellerListing],
    buyer: &Buyer,
    utxos: &[Utxo],
    config: &MarketConfig,
) -> Result<SwapPlan> {
    check_listings(listings)?;
    let sorted = BuyerUtxos::sort(utxos, config);
    let needed = config.dummies_needed();
    if sorted.dummies.len() < needed {
        return Err(WasmOrdinalsError::InvalidInput(format!(
            "buyer holds {} dummy outputs, swap needs {}",
            sorted.dummies.len(),
            needed
        )));
    }
    let dummies = &sorted.dummies[..needed];
    let options = &buyer.funding;

    let mut fixed: Vec<FixedInput> = dummies
        .iter()
        .map(|u| FixedInput::from_wallet_utxo(u, options))
        .collect::<Result<_>>()?;
    fixed.extend(listings.iter().map(SellerListing::fixed_input));

    // k front outputs holding exactly the dummy input value
    let front_count = config.required_dummy_count;
    let dummy_total: u64 = dummies.iter().map(|u| u.value).sum();
    let mut outputs: Vec<TxOut> = Vec::new();
    if front_count > 0 {
        let passed: Vec<u64> = dummies[..front_count - 1].iter().map(|u| u.value).collect();
        let last = dummy_total - passed.iter().sum::<u64>();
        outputs.extend(
            passed
                .into_iter()
                .chain(std::iter::once(last))
                .map(|value| TxOut {
                    value: Amount::from_sat(value),
                    script_pubkey: options.payer_script.clone(),
                }),
        );
    }

    let asset_value: u64 = listings.iter().map(SellerListing::asset_value).sum();
    let asset_vout = outputs.len() as u32;
    outputs.push(TxOut {
        value: Amount::from_sat(if front_count == 0 {
            asset_value + dummy_total
        } else {
            asset_value
        }),
        script_pubkey: buyer.receive_script.clone(),
    });

    let seller_start = needed;
    if outputs.len() != seller_start {
        return Err(WasmOrdinalsError::invariant(format!(
            "seller payments would start at output {} but input {}",
            outputs.len(),
            seller_start
        )));
    }
    outputs.extend(listings.iter().map(|l| l.payment_output().clone()));

    let platform_output = platform_fee_output(listings, config)?;
    let platform_fee = platform_output
        .as_ref()
        .map(|o| o.value.to_sat())
        .unwrap_or(0);
    outputs.extend(platform_output);

    let dummy_start = outputs.len() as u32;
    outputs.extend((0..needed).map(|_| TxOut {
        value: Amount::from_sat(config.dummy_value),
        script_pubkey: options.payer_script.clone(),
    }));
    let new_dummy_vouts = dummy_start..outputs.len() as u32;

    let exclude: HashSet<OutPoint> = dummies.iter().map(Utxo::outpoint).collect();
    let mut funded = fund(fixed, outputs, &sorted.funding, options, &exclude)?;

    for (i, listing) in listings.iter().enumerate() {
        funded.psbt.outputs[seller_start + i] = listing.psbt_output();
    }

    info!(
        listings = listings.len(),
        asset_value,
        platform_fee,
        fee = funded.fee,
        "built swap transaction"
    );

    Ok(SwapPlan {
        funded,
        seller_inputs: seller_start..seller_start + listings.len(),
        asset_vout,
        platform_fee,
        new_dummy_vouts,
    })
}

#[cfg(test)]
mod tests {
    use super::listing::test_utils::listing;
    use super::*;
    use crate::assembler::test_utils::{PAYER, payer_script};
    use crate::sats::test_utils::utxo;

    fn buyer(config: &MarketConfig) -> Buyer {
        Buyer::new(PAYER, PAYER, FeeRate::from_sat_per_vb(2), config).unwrap()
    }

    fn wallet() -> Vec<Utxo> {
        vec![utxo(1, 600), utxo(2, 600), utxo(3, 500_000)]
    }

    #[test]
    fn test_single_purchase_layout() {
        let config = MarketConfig::default();
        let seller = listing(1, 546, 100_000);
        let plan = build_swap(&[seller.clone()], &buyer(&config), &wallet(), &config).unwrap();
        let tx = plan.funded.unsigned_tx();

        assert_eq!(tx.input[0].previous_output, utxo(1, 0).outpoint());
        assert_eq!(tx.input[1].previous_output, utxo(2, 0).outpoint());
        assert_eq!(tx.input[2], seller.psbt().unsigned_tx.input[0]);
        assert_eq!(tx.input[3].previous_output, utxo(3, 0).outpoint());

        assert_eq!(tx.output[0].value.to_sat(), 1_200);
        assert_eq!(plan.asset_vout, 1);
        assert_eq!(tx.output[1].value.to_sat(), 546);
        assert_eq!(tx.output[2], *seller.payment_output());
        assert_eq!(plan.new_dummy_vouts, 3..5);
        assert_eq!(plan.funded.change_vout(), Some(5));
        assert_eq!(plan.funded.psbt.inputs[2], seller.psbt().inputs[0]);
        assert_eq!(plan.buyer_inputs(), vec![0, 1, 3]);
    }

    #[test]
    fn test_batch_keeps_seller_pairs_aligned() {
        let config = MarketConfig::default();
        let listings = vec![
            listing(1, 546, 10_000),
            listing(2, 10_000, 20_000),
            listing(3, 546, 30_000),
        ];
        let plan = build_swap(&listings, &buyer(&config), &wallet(), &config).unwrap();
        let tx = plan.funded.unsigned_tx();
        for (i, listing) in listings.iter().enumerate() {
            let index = plan.seller_inputs.start + i;
            assert_eq!(tx.input[index].previous_output, listing.outpoint());
            assert_eq!(tx.output[index], *listing.payment_output());
        }
        assert_eq!(tx.output[plan.asset_vout as usize].value.to_sat(), 11_092);

        let inputs: u64 = plan.funded.input_total();
        let outputs: u64 = tx.output.iter().map(|o| o.value.to_sat()).sum();
        assert_eq!(inputs, outputs + plan.funded.fee);
    }

    #[test]
    fn test_platform_fee_output() {
        let config = MarketConfig::default().with_platform_fee(PAYER, 200);
        let plan = build_swap(
            &[listing(1, 546, 100_000)],
            &buyer(&config),
            &wallet(),
            &config,
        )
        .unwrap();
        assert_eq!(plan.platform_fee, 2_000);
        let tx = plan.funded.unsigned_tx();
        assert_eq!(tx.output[3].value.to_sat(), 2_000);
        assert_eq!(tx.output[3].script_pubkey, payer_script());
    }

    #[test]
    fn test_not_enough_dummies() {
        let config = MarketConfig::default();
        let err = build_swap(
            &[listing(1, 546, 100_000)],
            &buyer(&config),
            &[utxo(1, 600), utxo(3, 500_000)],
            &config,
        )
        .unwrap_err();
        assert!(matches!(err, WasmOrdinalsError::InvalidInput(_)));
    }

    #[test]
    fn test_duplicate_listing_rejected() {
        let config = MarketConfig::default();
        let l = listing(1, 546, 100_000);
        assert!(build_swap(&[l.clone(), l], &buyer(&config), &wallet(), &config).is_err());
    }

    #[test]
    fn test_buyer_cannot_afford() {
        let config = MarketConfig::default();
        let err = build_swap(
            &[listing(1, 546, 1_000_000)],
            &buyer(&config),
            &wallet(),
            &config,
        )
        .unwrap_err();
        assert!(matches!(err, WasmOrdinalsError::InsufficientFunds { .. }));
    }

    #[test]
    fn test_three_front_dummies() {
        let config = MarketConfig::default().with_required_dummy_count(3);
        let utxos = vec![
            utxo(1, 600),
            utxo(2, 700),
            utxo(4, 800),
            utxo(5, 900),
            utxo(3, 500_000),
        ];
        let plan = build_swap(&[listing(1, 546, 5_000)], &buyer(&config), &utxos, &config).unwrap();
        let tx = plan.funded.unsigned_tx();
        let front: Vec<u64> = tx.output[..3].iter().map(|o| o.value.to_sat()).collect();
        assert_eq!(front, vec![600, 700, 1_700]);
        assert_eq!(plan.asset_vout, 3);
        assert_eq!(plan.seller_inputs, 4..5);
    }
}
