//! Dummy UTXOs: low-value outputs placed ahead of the traded input
//!
//! A buyer needs `required_dummy_count + 1` of them before a swap. When short,
//! a preparatory transaction pays `dummy_value` to the buyer once per missing
//! dummy.

use std::collections::HashSet;

use miniscript::bitcoin::{Amount, Transaction, TxOut, Txid};
use tracing::info;

use crate::assembler::{build_funded_transaction, FundedTransaction, FundingOptions};
use crate::config::MarketConfig;
use crate::error::Result;
use crate::sats::Utxo;

/// Buyer UTXOs sorted into dummies and spendable funding
///
/// UTXOs carrying rare sats are set aside entirely; they are never spent as
/// dummies or as funding.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuyerUtxos {
    pub dummies: Vec<Utxo>,
    pub funding: Vec<Utxo>,
}

impl BuyerUtxos {
    pub fn sort(utxos: &[Utxo], config: &MarketConfig) -> Self {
        let mut sorted = BuyerUtxos::default();
        for utxo in utxos.iter().filter(|u| !u.has_rare_sats()) {
            if is_dummy(utxo, config) {
                sorted.dummies.push(utxo.clone());
            } else {
                sorted.funding.push(utxo.clone());
            }
        }
        sorted
    }

    /// How many more dummies the buyer needs before a swap
    pub fn missing_dummies(&self, config: &MarketConfig) -> usize {
        config.dummies_needed().saturating_sub(self.dummies.len())
    }
}

pub fn is_dummy(utxo: &Utxo, config: &MarketConfig) -> bool {
    utxo.value >= config.min_output_value && utxo.value <= config.dummy_max_value
}

/// Unsigned transaction creating `missing` dummy outputs for the buyer
///
/// Dummy outputs come first, followed by change.
pub fn build_dummy_funding(
    missing: usize,
    funding: &[Utxo],
    options: &FundingOptions,
    config: &MarketConfig,
) -> Result<FundedTransaction> {
    let outputs: Vec<TxOut> = (0..missing)
        .map(|_| TxOut {
            value: Amount::from_sat(config.dummy_value),
            script_pubkey: options.payer_script.clone(),
        })
        .collect();
    let funded = build_funded_transaction(funding, outputs, options, &HashSet::new())?;
    info!(missing, fee = funded.fee, "built dummy funding transaction");
    Ok(funded)
}

/// Buyer UTXOs created by a broadcast dummy funding transaction: the dummies, then change
pub fn dummy_funding_outputs(tx: &Transaction, txid: Txid, missing: usize) -> Vec<Utxo> {
    tx.output
        .iter()
        .enumerate()
        .map(|(vout, out)| Utxo::new(txid, vout as u32, out.value.to_sat()))
        .take(missing + 1)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::test_utils::options;
    use crate::sats::test_utils::utxo;
    use crate::sats::SatoshiRange;

    #[test]
    fn test_sort_buyer_utxos() {
        let config = MarketConfig::default();
        let rare = utxo(3, 600).with_ranges(vec![SatoshiRange::new(0, 600).with_attribute("black")]);
        let sorted = BuyerUtxos::sort(&[utxo(1, 600), utxo(2, 50_000), rare, utxo(4, 1_000)], &config);
        assert_eq!(sorted.dummies, vec![utxo(1, 600), utxo(4, 1_000)]);
        assert_eq!(sorted.funding, vec![utxo(2, 50_000)]);
        assert_eq!(sorted.missing_dummies(&config), 0);
    }

    #[test]
    fn test_missing_dummies() {
        let config = MarketConfig::default().with_required_dummy_count(2);
        let sorted = BuyerUtxos::sort(&[utxo(1, 600), utxo(2, 50_000)], &config);
        assert_eq!(sorted.missing_dummies(&config), 2);
    }

    #[test]
    fn test_dummy_funding_transaction() {
        let config = MarketConfig::default();
        let funded = build_dummy_funding(2, &[utxo(2, 50_000)], &options(3), &config).unwrap();
        let tx = funded.unsigned_tx();
        assert_eq!(tx.output[0].value.to_sat(), 600);
        assert_eq!(tx.output[1].value.to_sat(), 600);
        assert_eq!(funded.change_vout(), Some(2));

        let txid = tx.compute_txid();
        let created = dummy_funding_outputs(tx, txid, 2);
        assert_eq!(created.len(), 3);
        assert!(created[..2].iter().all(|u| is_dummy(u, &config)));
        assert_eq!(tx.input[0].previous_output, utxo(2, 0).outpoint());
    }
}
