//! Transaction assembly: input selection and fee convergence
//!
//! [`build_funded_transaction`] turns a list of outputs into an unsigned PSBT
//! whose inputs pay for those outputs plus the estimated fee. Signing happens
//! outside this crate; every wallet input carries its `witness_utxo` so an
//! external signer can produce segwit/taproot signatures.

mod mint;
mod registry;
mod split;

pub use mint::{plan_mint, plan_rare_mint, MintPlan, MintRequest};
pub use registry::{SpendsOutpoints, UtxoRegistry};
pub use split::{plan_split, SplitPlan};

use std::collections::HashSet;

use miniscript::bitcoin::psbt::{self, Psbt};
use miniscript::bitcoin::{
    absolute, transaction, Amount, OutPoint, ScriptBuf, Sequence, Transaction, TxIn, TxOut,
    Witness,
};
use tracing::{debug, info, warn};

use crate::address::{key_spend_size, SpendSize};
use crate::error::{Result, WasmOrdinalsError};
use crate::fees::{estimate_fee_with_script_sig, FeeRate};
use crate::sats::Utxo;

/// UTXOs chosen by [`select_inputs`] and their combined value
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Selection {
    pub utxos: Vec<Utxo>,
    pub total: u64,
}

impl Selection {
    pub fn covers(&self, target: u64) -> bool {
        self.total >= target
    }
}

/// Greedily take UTXOs in the given order until `target` is reached
///
/// Outpoints in `exclude` are skipped. If the candidates run out first the
/// returned selection holds everything eligible and `covers(target)` is false.
pub fn select_inputs(candidates: &[Utxo], target: u64, exclude: &HashSet<OutPoint>) -> Selection {
    let mut selection = Selection::default();
    for utxo in candidates {
        if selection.covers(target) {
            break;
        }
        if exclude.contains(&utxo.outpoint()) {
            continue;
        }
        selection.total += utxo.value;
        selection.utxos.push(utxo.clone());
    }
    selection
}

/// Who pays and at what rate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FundingOptions {
    /// Script every candidate UTXO is locked to
    pub payer_script: ScriptBuf,
    pub change_script: ScriptBuf,
    pub fee_rate: FeeRate,
    /// Residuals below this are folded into the fee
    pub min_output_value: u64,
}

impl FundingOptions {
    pub fn new(payer_script: ScriptBuf, fee_rate: FeeRate, min_output_value: u64) -> Self {
        FundingOptions {
            change_script: payer_script.clone(),
            payer_script,
            fee_rate,
            min_output_value,
        }
    }

    pub fn with_change_script(mut self, change_script: ScriptBuf) -> Self {
        self.change_script = change_script;
        self
    }

    fn wallet_input(&self, utxo: &Utxo) -> (TxIn, psbt::Input) {
        let tx_in = TxIn {
            previous_output: utxo.outpoint(),
            script_sig: ScriptBuf::new(),
            sequence: Sequence::ENABLE_RBF_NO_LOCKTIME,
            witness: Witness::default(),
        };
        let psbt_input = psbt::Input {
            witness_utxo: Some(TxOut {
                value: Amount::from_sat(utxo.value),
                script_pubkey: self.payer_script.clone(),
            }),
            ..Default::default()
        };
        (tx_in, psbt_input)
    }
}

/// An input placed ahead of the selected wallet inputs, in order
///
/// Used for inputs the caller has already decided on: a seller's signed
/// listing input, the buyer's dummy UTXOs, the UTXO being split.
#[derive(Debug, Clone)]
pub(crate) struct FixedInput {
    pub tx_in: TxIn,
    pub psbt_input: psbt::Input,
    pub value: u64,
    /// scriptSig and witness bytes this input will carry once signed
    pub spend_size: SpendSize,
}

impl FixedInput {
    pub fn from_wallet_utxo(utxo: &Utxo, options: &FundingOptions) -> Result<Self> {
        let (tx_in, psbt_input) = options.wallet_input(utxo);
        Ok(FixedInput {
            tx_in,
            psbt_input,
            value: utxo.value,
            spend_size: key_spend_size(&options.payer_script)?,
        })
    }
}

/// An unsigned, fully funded transaction
#[derive(Debug, Clone)]
pub struct FundedTransaction {
    pub psbt: Psbt,
    /// Wallet UTXOs picked by selection, in input order after any fixed inputs
    pub selected: Vec<Utxo>,
    pub fee: u64,
    /// Value of the change output, always the last output when present
    pub change: Option<u64>,
}

impl FundedTransaction {
    pub fn unsigned_tx(&self) -> &Transaction {
        &self.psbt.unsigned_tx
    }

    pub fn input_total(&self) -> u64 {
        self.psbt
            .inputs
            .iter()
            .filter_map(|input| input.witness_utxo.as_ref())
            .map(|utxo| utxo.value.to_sat())
            .sum()
    }

    pub fn change_vout(&self) -> Option<u32> {
        self.change
            .map(|_| self.psbt.unsigned_tx.output.len() as u32 - 1)
    }
}

/// Select inputs from `utxos` to pay for `outputs` at `options.fee_rate`
///
/// Selection is repeated with a raised target until the chosen inputs cover
/// outputs plus the fee for the now-known input count. When the pool runs
/// out, returns [`WasmOrdinalsError::InsufficientFunds`].
pub fn build_funded_transaction(
    utxos: &[Utxo],
    outputs: Vec<TxOut>,
    options: &FundingOptions,
    exclude: &HashSet<OutPoint>,
) -> Result<FundedTransaction> {
    fund(Vec::new(), outputs, utxos, options, exclude)
}

pub(crate) fn fund(
    fixed: Vec<FixedInput>,
    outputs: Vec<TxOut>,
    utxos: &[Utxo],
    options: &FundingOptions,
    exclude: &HashSet<OutPoint>,
) -> Result<FundedTransaction> {
    if outputs.is_empty() {
        return Err(WasmOrdinalsError::new("transaction needs at least one output"));
    }
    if let Some(dust) = outputs
        .iter()
        .find(|o| o.value.to_sat() < options.min_output_value)
    {
        return Err(WasmOrdinalsError::InvalidInput(format!(
            "output of {} sats is below the minimum output value {}",
            dust.value, options.min_output_value
        )));
    }

    let rate = options.fee_rate;
    let output_total: u64 = outputs.iter().map(|o| o.value.to_sat()).sum();
    let fixed_total: u64 = fixed.iter().map(|f| f.value).sum();
    let wallet = key_spend_size(&options.payer_script)?;
    let fixed_script_sig: usize = fixed.iter().map(|f| f.spend_size.script_sig).sum();
    let fixed_witness: usize = fixed.iter().map(|f| f.spend_size.witness).sum();
    let fixed_count = fixed.len();
    let fee_for = |wallet_inputs: usize, output_count: usize| {
        estimate_fee_with_script_sig(
            fixed_count + wallet_inputs,
            output_count,
            fixed_script_sig + wallet.script_sig * wallet_inputs,
            fixed_witness + wallet.witness * wallet_inputs,
            rate,
        )
    };

    // first guess assumes a single wallet input
    let first_fee = fee_for(1, outputs.len());
    let mut target = (output_total + first_fee).saturating_sub(fixed_total);

    for round in 0..utxos.len() + 2 {
        let selection = select_inputs(utxos, target, exclude);
        let input_count = fixed_count + selection.utxos.len();
        let fee_no_change = fee_for(selection.utxos.len(), outputs.len());
        let available = fixed_total + selection.total;
        let required = output_total + fee_no_change;

        debug!(
            round,
            target,
            inputs = input_count,
            available,
            required,
            "input selection pass"
        );

        if available < required {
            if !selection.covers(target) {
                return Err(WasmOrdinalsError::InsufficientFunds {
                    required,
                    available,
                });
            }
            target = required - fixed_total;
            continue;
        }

        let residual = available - output_total;
        let fee_with_change = fee_for(selection.utxos.len(), outputs.len() + 1);
        let (fee, change) = if residual >= fee_with_change + options.min_output_value {
            (fee_with_change, Some(residual - fee_with_change))
        } else {
            if residual > fee_no_change {
                warn!(
                    dust = residual - fee_no_change,
                    "residual below minimum output value folded into fee"
                );
            }
            (residual, None)
        };

        return assemble(fixed, outputs, selection.utxos, options, fee, change);
    }

    Err(WasmOrdinalsError::invariant(
        "input selection did not converge",
    ))
}

fn assemble(
    fixed: Vec<FixedInput>,
    mut outputs: Vec<TxOut>,
    selected: Vec<Utxo>,
    options: &FundingOptions,
    fee: u64,
    change: Option<u64>,
) -> Result<FundedTransaction> {
    if let Some(change) = change {
        outputs.push(TxOut {
            value: Amount::from_sat(change),
            script_pubkey: options.change_script.clone(),
        });
    }

    let mut tx_ins = Vec::with_capacity(fixed.len() + selected.len());
    let mut psbt_inputs = Vec::with_capacity(fixed.len() + selected.len());
    let mut input_total = 0u64;
    for f in fixed {
        input_total += f.value;
        tx_ins.push(f.tx_in);
        psbt_inputs.push(f.psbt_input);
    }
    for utxo in &selected {
        input_total += utxo.value;
        let (tx_in, psbt_input) = options.wallet_input(utxo);
        tx_ins.push(tx_in);
        psbt_inputs.push(psbt_input);
    }

    let output_total: u64 = outputs.iter().map(|o| o.value.to_sat()).sum();
    if output_total + fee != input_total {
        return Err(WasmOrdinalsError::invariant(format!(
            "outputs {} + fee {} != inputs {}",
            output_total, fee, input_total
        )));
    }

    let tx = Transaction {
        version: transaction::Version::TWO,
        lock_time: absolute::LockTime::ZERO,
        input: tx_ins,
        output: outputs,
    };
    let mut psbt = Psbt::from_unsigned_tx(tx)
        .map_err(|e| WasmOrdinalsError::invariant(format!("unsigned transaction: {}", e)))?;
    psbt.inputs = psbt_inputs;

    info!(
        inputs = psbt.unsigned_tx.input.len(),
        outputs = psbt.unsigned_tx.output.len(),
        fee,
        change = change.unwrap_or(0),
        "built funded transaction"
    );

    Ok(FundedTransaction {
        psbt,
        selected,
        fee,
        change,
    })
}
