//! Inscription reveal transaction creation and signing
//!
//! The reveal spends the envelope output by script path and moves the
//! inscribed sats to the destination outputs.

use miniscript::bitcoin::hashes::Hash;
use miniscript::bitcoin::secp256k1::{Message, Secp256k1};
use miniscript::bitcoin::sighash::{Prevouts, SighashCache};
use miniscript::bitcoin::taproot::{LeafVersion, TapLeafHash};
use miniscript::bitcoin::{
    absolute, transaction, Amount, OutPoint, ScriptBuf, Sequence, TapSighashType, Transaction,
    TxIn, TxOut, Witness,
};
use tracing::debug;

use super::envelope::Envelope;
use super::key::EphemeralKey;
use crate::error::{Result, WasmOrdinalsError};
use crate::fees::{estimate_fee, FeeRate, OutputLayout};

/// Destination outputs of a reveal transaction
///
/// `Tight` puts every inscription in one output worth `postage * count`;
/// `Separate` gives each inscription its own `postage` output.
pub fn reveal_outputs(
    destination: &ScriptBuf,
    layout: OutputLayout,
    inscription_count: usize,
    postage: u64,
) -> Vec<TxOut> {
    match layout {
        OutputLayout::Tight => vec![TxOut {
            value: Amount::from_sat(postage * inscription_count as u64),
            script_pubkey: destination.clone(),
        }],
        OutputLayout::Separate => (0..inscription_count)
            .map(|_| TxOut {
                value: Amount::from_sat(postage),
                script_pubkey: destination.clone(),
            })
            .collect(),
    }
}

/// Fee of the reveal transaction for `outputs`
pub fn reveal_fee(envelope: &Envelope, output_count: usize, fee_rate: FeeRate) -> u64 {
    estimate_fee(1, output_count, envelope.witness_size(), fee_rate)
}

/// Value the envelope output must hold so the reveal can pay `outputs` plus its fee
pub fn required_commit_value(envelope: &Envelope, outputs: &[TxOut], fee_rate: FeeRate) -> u64 {
    outputs.iter().map(|o| o.value.to_sat()).sum::<u64>()
        + reveal_fee(envelope, outputs.len(), fee_rate)
}

fn find_envelope_output(envelope: &Envelope, commit_tx: &Transaction) -> Result<(u32, TxOut)> {
    let commit_script = envelope.output_script();
    let matching: Vec<_> = commit_tx
        .output
        .iter()
        .enumerate()
        .filter(|(_, out)| out.script_pubkey == commit_script)
        .collect();

    match matching.as_slice() {
        [] => Err(WasmOrdinalsError::InvalidInput(
            "envelope output not found in commit transaction".to_string(),
        )),
        [(vout, output)] => Ok((*vout as u32, (*output).clone())),
        many => Err(WasmOrdinalsError::InvalidInput(format!(
            "expected exactly one envelope output, found {}",
            many.len()
        ))),
    }
}

/// Build the unsigned reveal transaction
///
/// The envelope output must cover `outputs` plus the estimated reveal fee;
/// anything above that goes to miners.
pub fn build_reveal_transaction(
    envelope: &Envelope,
    commit_outpoint: OutPoint,
    commit_value: u64,
    outputs: Vec<TxOut>,
    fee_rate: FeeRate,
) -> Result<Transaction> {
    if outputs.is_empty() {
        return Err(WasmOrdinalsError::new("reveal needs at least one output"));
    }
    let required = required_commit_value(envelope, &outputs, fee_rate);
    if commit_value < required {
        return Err(WasmOrdinalsError::InsufficientFunds {
            required,
            available: commit_value,
        });
    }

    Ok(Transaction {
        version: transaction::Version::TWO,
        lock_time: absolute::LockTime::ZERO,
        input: vec![TxIn {
            previous_output: commit_outpoint,
            script_sig: ScriptBuf::new(),
            sequence: Sequence::ENABLE_RBF_NO_LOCKTIME,
            witness: Witness::new(),
        }],
        output: outputs,
    })
}

/// Build and sign the reveal transaction with the order's ephemeral key
///
/// # Arguments
/// * `key` - The key the envelope was built with
/// * `envelope` - The envelope from [`Envelope::build`]
/// * `commit_tx` - The broadcast funding transaction holding the envelope output
/// * `outputs` - Destination outputs, usually from [`reveal_outputs`]
/// * `fee_rate` - Rate used to check the envelope output covers the reveal
///
/// # Returns
/// The fully signed reveal transaction, ready to broadcast
pub fn sign_reveal_transaction(
    key: &EphemeralKey,
    envelope: &Envelope,
    commit_tx: &Transaction,
    outputs: Vec<TxOut>,
    fee_rate: FeeRate,
) -> Result<Transaction> {
    let secp = Secp256k1::new();

    if key.x_only_public_key() != envelope.internal_key()? {
        return Err(WasmOrdinalsError::new("key does not control this envelope"));
    }

    let (vout, commit_output) = find_envelope_output(envelope, commit_tx)?;
    let commit_outpoint = OutPoint {
        txid: commit_tx.compute_txid(),
        vout,
    };
    let mut reveal_tx = build_reveal_transaction(
        envelope,
        commit_outpoint,
        commit_output.value.to_sat(),
        outputs,
        fee_rate,
    )?;

    let script = envelope.script();
    let control_block = envelope.control_block()?;
    let leaf_hash = TapLeafHash::from_script(&script, LeafVersion::TapScript);
    let prevouts = vec![commit_output];

    let mut sighash_cache = SighashCache::new(&reveal_tx);
    let sighash = sighash_cache
        .taproot_script_spend_signature_hash(
            0,
            &Prevouts::All(&prevouts),
            leaf_hash,
            TapSighashType::Default,
        )
        .map_err(|e| WasmOrdinalsError::invariant(format!("Failed to compute sighash: {}", e)))?;

    let keypair = key.keypair();
    let message = Message::from_digest(sighash.to_byte_array());
    let signature = secp.sign_schnorr_no_aux_rand(&message, &keypair);

    // Build witness: <signature> <script> <control_block>
    let tap_sig = miniscript::bitcoin::taproot::Signature {
        signature,
        sighash_type: TapSighashType::Default,
    };

    let mut witness = Witness::new();
    witness.push(tap_sig.to_vec());
    witness.push(script.as_bytes());
    witness.push(control_block.serialize());
    reveal_tx.input[0].witness = witness;

    debug!(
        txid = %reveal_tx.compute_txid(),
        vsize = reveal_tx.vsize(),
        "signed reveal transaction"
    );

    Ok(reveal_tx)
}
