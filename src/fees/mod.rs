//! Virtual-size fee estimation.
//!
//! Sizes are fixed per input and per output; only the witness payload varies,
//! and it is discounted at a quarter of its byte size.

mod breakdown;

pub use breakdown::FeeBreakdown;

use serde::{Deserialize, Serialize};

use crate::error::{Result, WasmOrdinalsError};

// ============================================================================
// Size constants
// ============================================================================

/// version(4) + locktime(4) + varint for ins(1) + varint for outs(1)
pub const TX_OVERHEAD_SIZE: u64 = 10;
/// marker(1) + flag(1), in weight units
pub const TX_SEGWIT_MARKER_WEIGHT: u64 = 2;
/// prevout(36) + scriptSig len(1) + sequence(4)
pub const INPUT_BASE_SIZE: u64 = 41;
/// Upper bound for a non-witness output: value(8) + len(1) + script(<=43)
pub const OUTPUT_BASE_SIZE: u64 = 52;

const MILLI: u64 = 1_000;

// ============================================================================
// FeeRate
// ============================================================================

/// Fee rate in sat/vB, kept to three decimal places so fees stay integer-exact
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct FeeRate {
    milli_sat_per_vb: u64,
}

impl FeeRate {
    pub fn from_sat_per_vb(rate: u64) -> Self {
        FeeRate {
            milli_sat_per_vb: rate * MILLI,
        }
    }

    /// Accept a decimal rate as reported by fee oracles (e.g. 12.5)
    pub fn from_decimal(rate: f64) -> Result<Self> {
        if !rate.is_finite() || rate <= 0.0 {
            return Err(WasmOrdinalsError::InvalidInput(format!(
                "fee rate must be a positive number, got {}",
                rate
            )));
        }
        let milli = (rate * MILLI as f64).round();
        if milli < 1.0 || milli > u32::MAX as f64 {
            return Err(WasmOrdinalsError::InvalidInput(format!(
                "fee rate out of range: {}",
                rate
            )));
        }
        Ok(FeeRate {
            milli_sat_per_vb: milli as u64,
        })
    }

    pub fn as_sat_per_vb(&self) -> f64 {
        self.milli_sat_per_vb as f64 / MILLI as f64
    }

    /// ceil(vsize * rate)
    pub fn fee_for_vsize(&self, vsize: u64) -> u64 {
        (vsize * self.milli_sat_per_vb).div_ceil(MILLI)
    }
}

impl TryFrom<f64> for FeeRate {
    type Error = WasmOrdinalsError;

    fn try_from(rate: f64) -> Result<Self> {
        FeeRate::from_decimal(rate)
    }
}

impl From<FeeRate> for f64 {
    fn from(rate: FeeRate) -> f64 {
        rate.as_sat_per_vb()
    }
}

// ============================================================================
// Estimation
// ============================================================================

/// How inscription outputs are laid out in the reveal transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputLayout {
    /// All contents share one output
    Tight,
    /// One output per content
    #[default]
    Separate,
}

impl OutputLayout {
    pub fn output_count(&self, content_count: usize) -> usize {
        match self {
            OutputLayout::Tight => content_count.min(1),
            OutputLayout::Separate => content_count,
        }
    }
}

/// Size without any witness data, as a pre-segwit transaction would be counted
pub fn estimate_base_size(input_count: usize, output_count: usize) -> u64 {
    TX_OVERHEAD_SIZE + INPUT_BASE_SIZE * input_count as u64 + OUTPUT_BASE_SIZE * output_count as u64
}

pub fn estimate_weight(input_count: usize, output_count: usize, witness_size: usize) -> u64 {
    let base_weight = 4 * estimate_base_size(input_count, output_count);
    if witness_size == 0 {
        base_weight
    } else {
        base_weight + TX_SEGWIT_MARKER_WEIGHT + witness_size as u64
    }
}

pub fn estimate_vsize(input_count: usize, output_count: usize, witness_size: usize) -> u64 {
    estimate_weight(input_count, output_count, witness_size).div_ceil(4)
}

/// Estimated fee for a transaction of the given shape
///
/// `witness_size` is the total serialized witness of all inputs.
pub fn estimate_fee(
    input_count: usize,
    output_count: usize,
    witness_size: usize,
    fee_rate: FeeRate,
) -> u64 {
    fee_rate.fee_for_vsize(estimate_vsize(input_count, output_count, witness_size))
}

/// Like [`estimate_fee`], for inputs that also carry `script_sig_size` bytes
/// of scriptSig in total
pub fn estimate_fee_with_script_sig(
    input_count: usize,
    output_count: usize,
    script_sig_size: usize,
    witness_size: usize,
    fee_rate: FeeRate,
) -> u64 {
    let weight =
        estimate_weight(input_count, output_count, witness_size) + 4 * script_sig_size as u64;
    fee_rate.fee_for_vsize(weight.div_ceil(4))
}

/// Fee for a reveal transaction spending one envelope output
pub fn estimate_reveal_fee(
    content_count: usize,
    layout: OutputLayout,
    envelope_witness_size: usize,
    fee_rate: FeeRate,
) -> u64 {
    estimate_fee(
        1,
        layout.output_count(content_count),
        envelope_witness_size,
        fee_rate,
    )
}
