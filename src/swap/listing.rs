//! Seller listings: single-input, single-output PSBTs signed SINGLE|ANYONECANPAY
//!
//! A listing is copied into the swap untouched. Only what the buyer needs to
//! know is read out of it: the value of the asset input, the seller's price,
//! and how many scriptSig and witness bytes the seller's input will carry.

use base64::prelude::*;
use miniscript::bitcoin::ecdsa;
use miniscript::bitcoin::psbt::{self, Psbt};
use miniscript::bitcoin::sighash::TapSighashType;
use miniscript::bitcoin::{OutPoint, TxIn, TxOut};

use crate::address::{SpendSize, NESTED_SEGWIT_SCRIPT_SIG_SIZE};
use crate::assembler::FixedInput;
use crate::error::{Result, WasmOrdinalsError};

const SINGLE_ANYONECANPAY: u8 = 0x83;

/// count(1) + len(1) + schnorr(64) + sighash(1)
const TAP_KEY_SPEND_WITNESS_SIZE: usize = 67;
/// count(1) + len(1) + der(72) + len(1) + pubkey(33)
const P2WPKH_WITNESS_SIZE: usize = 108;

#[derive(Debug, Clone, PartialEq)]
pub struct SellerListing {
    psbt: Psbt,
    spend_size: SpendSize,
}

fn invalid(message: impl Into<String>) -> WasmOrdinalsError {
    WasmOrdinalsError::InvalidPartialTransaction(message.into())
}

/// Sighash bytes of every signature found on the input
fn signature_sighashes(input: &psbt::Input) -> Vec<u8> {
    let mut found = Vec::new();
    if let Some(sig) = &input.tap_key_sig {
        found.push(sig.sighash_type as u8);
    }
    found.extend(
        input
            .tap_script_sigs
            .values()
            .map(|sig| sig.sighash_type as u8),
    );
    found.extend(
        input
            .partial_sigs
            .values()
            .map(|sig: &ecdsa::Signature| sig.sighash_type as u8),
    );
    if let Some(witness) = &input.final_script_witness {
        // key-path spends carry the signature first; a 64-byte schnorr sig means Default
        if let Some(first) = witness.nth(0) {
            match first.len() {
                64 => found.push(TapSighashType::Default as u8),
                len if len > 0 => found.push(first[len - 1]),
                _ => {}
            }
        }
    }
    found
}

fn spend_size(input: &psbt::Input) -> SpendSize {
    let witness = if let Some(witness) = &input.final_script_witness {
        witness.size()
    } else if input.tap_key_sig.is_some() {
        TAP_KEY_SPEND_WITNESS_SIZE
    } else {
        P2WPKH_WITNESS_SIZE
    };
    let nested = input
        .witness_utxo
        .as_ref()
        .is_some_and(|utxo| utxo.script_pubkey.is_p2sh());
    let script_sig = match &input.final_script_sig {
        Some(script_sig) => script_sig.len(),
        None if nested => NESTED_SEGWIT_SCRIPT_SIG_SIZE,
        None => 0,
    };
    SpendSize {
        script_sig,
        witness,
    }
}

impl SellerListing {
    pub fn from_psbt(psbt: Psbt) -> Result<Self> {
        if psbt.unsigned_tx.input.len() != 1 || psbt.inputs.len() != 1 {
            return Err(invalid(format!(
                "expected exactly 1 input, found {}",
                psbt.unsigned_tx.input.len()
            )));
        }
        if psbt.unsigned_tx.output.len() != 1 || psbt.outputs.len() != 1 {
            return Err(invalid(format!(
                "expected exactly 1 output, found {}",
                psbt.unsigned_tx.output.len()
            )));
        }
        let input = &psbt.inputs[0];
        if input.witness_utxo.is_none() {
            return Err(invalid("input is missing witness_utxo"));
        }

        let sighashes = signature_sighashes(input);
        if sighashes.is_empty() {
            return Err(invalid("input is not signed"));
        }
        if let Some(other) = sighashes.iter().find(|s| **s != SINGLE_ANYONECANPAY) {
            return Err(invalid(format!(
                "signature uses sighash 0x{:02x}, expected SINGLE|ANYONECANPAY",
                other
            )));
        }
        if let Some(declared) = input.sighash_type {
            if declared.to_u32() != u32::from(SINGLE_ANYONECANPAY) {
                return Err(invalid(format!("declared sighash type {}", declared)));
            }
        }

        let spend_size = spend_size(input);
        Ok(SellerListing { psbt, spend_size })
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let psbt = Psbt::deserialize(bytes).map_err(|e| invalid(format!("{}", e)))?;
        Self::from_psbt(psbt)
    }

    pub fn from_base64(encoded: &str) -> Result<Self> {
        let bytes = BASE64_STANDARD
            .decode(encoded.trim())
            .map_err(|e| invalid(format!("base64: {}", e)))?;
        Self::from_bytes(&bytes)
    }

    /// Accepts base64 or hex, as marketplaces hand out either
    pub fn parse(encoded: &str) -> Result<Self> {
        let trimmed = encoded.trim();
        match hex::decode(trimmed) {
            Ok(bytes) => Self::from_bytes(&bytes),
            Err(_) => Self::from_base64(trimmed),
        }
    }

    pub fn psbt(&self) -> &Psbt {
        &self.psbt
    }

    pub fn outpoint(&self) -> OutPoint {
        self.psbt.unsigned_tx.input[0].previous_output
    }

    /// Value of the input being sold
    pub fn asset_value(&self) -> u64 {
        self.psbt.inputs[0]
            .witness_utxo
            .as_ref()
            .map(|utxo| utxo.value.to_sat())
            .unwrap_or(0)
    }

    pub fn payment_output(&self) -> &TxOut {
        &self.psbt.unsigned_tx.output[0]
    }

    /// What the seller asks for, paid to their own output
    pub fn price(&self) -> u64 {
        self.payment_output().value.to_sat()
    }

    pub fn witness_size(&self) -> usize {
        self.spend_size.witness
    }

    pub fn script_sig_size(&self) -> usize {
        self.spend_size.script_sig
    }

    pub(crate) fn fixed_input(&self) -> FixedInput {
        let tx_in: TxIn = self.psbt.unsigned_tx.input[0].clone();
        FixedInput {
            tx_in,
            psbt_input: self.psbt.inputs[0].clone(),
            value: self.asset_value(),
            spend_size: self.spend_size,
        }
    }

    pub(crate) fn psbt_output(&self) -> psbt::Output {
        self.psbt.outputs[0].clone()
    }
}

#[cfg(test)]
pub(crate) mod test_utils {
    use miniscript::bitcoin::secp256k1::{Keypair, Message, Secp256k1, SecretKey};
    use miniscript::bitcoin::taproot;
    use miniscript::bitcoin::{
        absolute, transaction, Amount, ScriptBuf, Sequence, Transaction, Witness,
    };

    use super::*;
    use crate::assembler::test_utils::payer_script;
    use crate::sats::test_utils::txid;

    pub fn signed_psbt(n: u8, asset_value: u64, price: u64, sighash: TapSighashType) -> Psbt {
        let tx = Transaction {
            version: transaction::Version::TWO,
            lock_time: absolute::LockTime::ZERO,
            input: vec![TxIn {
                previous_output: OutPoint {
                    txid: txid(100 + n),
                    vout: 0,
                },
                script_sig: ScriptBuf::new(),
                sequence: Sequence::MAX,
                witness: Witness::default(),
            }],
            output: vec![TxOut {
                value: Amount::from_sat(price),
                script_pubkey: payer_script(),
            }],
        };
        let mut psbt = Psbt::from_unsigned_tx(tx).unwrap();
        let secp = Secp256k1::new();
        let keypair = Keypair::from_secret_key(&secp, &SecretKey::from_slice(&[n; 32]).unwrap());
        let signature = secp.sign_schnorr_no_aux_rand(&Message::from_digest([n; 32]), &keypair);
        psbt.inputs[0].witness_utxo = Some(TxOut {
            value: Amount::from_sat(asset_value),
            script_pubkey: payer_script(),
        });
        psbt.inputs[0].tap_key_sig = Some(taproot::Signature {
            signature,
            sighash_type: sighash,
        });
        psbt
    }

    pub fn listing(n: u8, asset_value: u64, price: u64) -> SellerListing {
        SellerListing::from_psbt(signed_psbt(
            n,
            asset_value,
            price,
            TapSighashType::SinglePlusAnyoneCanPay,
        ))
        .unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::test_utils::*;
    use super::*;
    use miniscript::bitcoin::Witness;

    #[test]
    fn test_accepts_single_anyonecanpay() {
        let listing = listing(1, 546, 50_000);
        assert_eq!(listing.asset_value(), 546);
        assert_eq!(listing.price(), 50_000);
        assert_eq!(listing.witness_size(), 67);
        assert_eq!(listing.script_sig_size(), 0);
    }

    #[test]
    fn test_rejects_default_sighash() {
        let psbt = signed_psbt(1, 546, 50_000, TapSighashType::Default);
        let err = SellerListing::from_psbt(psbt).unwrap_err();
        assert!(matches!(err, WasmOrdinalsError::InvalidPartialTransaction(_)));
    }

    #[test]
    fn test_rejects_unsigned_and_missing_utxo() {
        let mut psbt = signed_psbt(1, 546, 50_000, TapSighashType::SinglePlusAnyoneCanPay);
        psbt.inputs[0].tap_key_sig = None;
        assert!(SellerListing::from_psbt(psbt.clone()).is_err());

        let mut psbt = signed_psbt(1, 546, 50_000, TapSighashType::SinglePlusAnyoneCanPay);
        psbt.inputs[0].witness_utxo = None;
        assert!(SellerListing::from_psbt(psbt).is_err());
    }

    #[test]
    fn test_rejects_extra_output() {
        let mut psbt = signed_psbt(1, 546, 50_000, TapSighashType::SinglePlusAnyoneCanPay);
        let extra = psbt.unsigned_tx.output[0].clone();
        psbt.unsigned_tx.output.push(extra);
        psbt.outputs.push(Default::default());
        assert!(SellerListing::from_psbt(psbt).is_err());
    }

    #[test]
    fn test_finalized_witness_detected() {
        let mut psbt = signed_psbt(1, 546, 50_000, TapSighashType::SinglePlusAnyoneCanPay);
        let sig = psbt.inputs[0].tap_key_sig.take().unwrap();
        psbt.inputs[0].final_script_witness = Some(Witness::from_slice(&[sig.to_vec()]));
        let listing = SellerListing::from_psbt(psbt).unwrap();
        assert_eq!(listing.witness_size(), 67);
    }

    #[test]
    fn test_parse_base64_and_hex() {
        let psbt = signed_psbt(2, 1_000, 20_000, TapSighashType::SinglePlusAnyoneCanPay);
        let bytes = psbt.serialize();
        let from_b64 = SellerListing::parse(&BASE64_STANDARD.encode(&bytes)).unwrap();
        let from_hex = SellerListing::parse(&hex::encode(&bytes)).unwrap();
        assert_eq!(from_b64, from_hex);
        assert!(SellerListing::parse("not a psbt").is_err());
    }
}
