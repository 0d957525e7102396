//! Splitting one range-carrying UTXO into equal outputs

use std::collections::HashSet;

use miniscript::bitcoin::{Amount, OutPoint, TxOut};
use tracing::info;

use super::registry::SpendsOutpoints;
use super::{fund, FixedInput, FundedTransaction, FundingOptions};
use crate::error::{Result, WasmOrdinalsError};
use crate::sats::{require_chunks, split_even, Chunk, Utxo};

/// A split transaction and the sat ranges each new output will carry
#[derive(Debug, Clone)]
pub struct SplitPlan {
    /// `chunks[i]` lands in output `i`; range offsets are positions within that output
    pub chunks: Vec<Chunk>,
    pub funded: FundedTransaction,
}

impl SpendsOutpoints for SplitPlan {
    fn spent_outpoints(&self) -> Vec<OutPoint> {
        self.funded.psbt.spent_outpoints()
    }
}

/// Ranges must describe the UTXO from its first sat with no gaps, otherwise
/// chunk `i` would not match the sats that flow into output `i`
fn check_contiguous(utxo: &Utxo) -> Result<()> {
    utxo.validate()?;
    let mut expected = 0u64;
    for range in utxo.ranges.iter().filter(|r| r.size > 0) {
        if range.offset != expected {
            return Err(WasmOrdinalsError::InvalidInput(format!(
                "{}: ranges must cover the output from offset 0 without gaps (gap at {})",
                utxo.outpoint(),
                expected
            )));
        }
        expected += range.size;
    }
    Ok(())
}

/// Turn `utxo` into `chunks` outputs of `amount` sats paid to the payer
///
/// The split UTXO is the first input. Its value beyond `amount * chunks`
/// pays the fee and returns as change; `utxos` tops it up when short.
pub fn plan_split(
    utxo: &Utxo,
    amount: u64,
    chunks: usize,
    utxos: &[Utxo],
    options: &FundingOptions,
) -> Result<SplitPlan> {
    check_contiguous(utxo)?;
    let split = split_even(utxo.ranges.clone(), amount, chunks, options.min_output_value)?;
    require_chunks(&split, chunks, amount)?;

    let outputs: Vec<TxOut> = (0..chunks)
        .map(|_| TxOut {
            value: Amount::from_sat(amount),
            script_pubkey: options.payer_script.clone(),
        })
        .collect();
    let fixed = vec![FixedInput::from_wallet_utxo(utxo, options)?];
    let exclude: HashSet<OutPoint> = [utxo.outpoint()].into_iter().collect();
    let funded = fund(fixed, outputs, utxos, options, &exclude)?;

    info!(
        outpoint = %utxo.outpoint(),
        amount,
        chunks,
        fee = funded.fee,
        "planned utxo split"
    );
    Ok(SplitPlan {
        chunks: split,
        funded,
    })
}
