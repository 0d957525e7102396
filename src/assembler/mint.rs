//! Mint planning: envelope, reveal outputs and the funding (commit) transaction
//!
//! The commit pays the envelope address enough for the reveal outputs plus the
//! reveal fee, and pays the platform service fee when one is configured.

use std::collections::HashSet;

use miniscript::bitcoin::{Amount, OutPoint, TxOut};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::registry::SpendsOutpoints;
use super::{fund, FixedInput, FundedTransaction, FundingOptions};
use crate::address::{to_output_script, to_taproot_output_script};
use crate::config::{MarketConfig, ServiceFeeConfig};
use crate::error::{Result, WasmOrdinalsError};
use crate::fees::{FeeBreakdown, FeeRate, OutputLayout};
use crate::inscriptions::{
    layout_offsets, required_commit_value, reveal_fee, reveal_outputs, ContentItem, Envelope,
    EphemeralKey, Inscription,
};
use crate::sats::{require_chunks, split_rare, SatoshiRange, Utxo};

/// What the user asked to inscribe and who pays for it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MintRequest {
    pub contents: Vec<ContentItem>,
    /// Taproot address receiving the inscriptions
    pub receive_address: String,
    /// Address holding the funding UTXOs; change returns here
    pub payer_address: String,
    pub fee_rate: FeeRate,
    #[serde(default)]
    pub layout: OutputLayout,
    /// CBOR metadata attached to every non-blog inscription
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

/// Everything needed to fund, persist and later reveal a mint
#[derive(Debug, Clone)]
pub struct MintPlan {
    pub envelope: Envelope,
    pub inscriptions: Vec<Inscription>,
    pub reveal_outputs: Vec<TxOut>,
    pub reveal_fee: u64,
    /// Value locked in the envelope output
    pub commit_value: u64,
    /// Unsigned funding transaction; the envelope output is output 0
    pub commit: FundedTransaction,
    pub fee_breakdown: FeeBreakdown,
}

impl SpendsOutpoints for MintPlan {
    fn spent_outpoints(&self) -> Vec<OutPoint> {
        self.commit.psbt.spent_outpoints()
    }
}

impl MintRequest {
    fn validate(&self) -> Result<()> {
        if self.contents.is_empty() {
            return Err(WasmOrdinalsError::new("mint needs at least one content item"));
        }
        Ok(())
    }

    fn inscriptions(&self, offsets: &[u32]) -> Vec<Inscription> {
        self.contents
            .iter()
            .zip(offsets)
            .map(|(content, offset)| {
                let inscription = Inscription::new(content.clone()).with_offset(*offset);
                match (&self.metadata, content) {
                    (Some(metadata), ContentItem::Plain { .. })
                    | (Some(metadata), ContentItem::ParentLinked { .. })
                    | (Some(metadata), ContentItem::RelationLinked { .. }) => {
                        inscription.with_metadata(metadata.clone())
                    }
                    _ => inscription,
                }
            })
            .collect()
    }

    fn total_content_size(&self) -> u64 {
        self.contents.iter().map(ContentItem::content_size).sum()
    }

    fn funding_options(&self, config: &MarketConfig) -> Result<FundingOptions> {
        let payer_script = to_output_script(&self.payer_address, config.network)?;
        Ok(FundingOptions::new(
            payer_script,
            self.fee_rate,
            config.min_output_value,
        ))
    }
}

/// Service fee actually charged, and the output paying it
///
/// Nothing is charged without a platform address, or when the discounted fee
/// would be a dust output.
fn service_fee_terms(
    config: &MarketConfig,
    inscription_count: usize,
) -> Result<(ServiceFeeConfig, Option<TxOut>)> {
    let waived = ServiceFeeConfig {
        per_inscription: 0,
        discount_bps: 0,
    };
    let Some(address) = &config.platform_fee_address else {
        return Ok((waived, None));
    };
    let due = FeeBreakdown::compute(0, inscription_count, 0, 0, &config.service_fee)
        .discount_service_fee;
    if due < config.min_output_value {
        debug!(due, "service fee below minimum output value, waived");
        return Ok((waived, None));
    }
    let output = TxOut {
        value: Amount::from_sat(due),
        script_pubkey: to_output_script(address, config.network)?,
    };
    Ok((config.service_fee, Some(output)))
}

struct RevealShape {
    inscriptions: Vec<Inscription>,
    outputs: Vec<TxOut>,
}

fn finish_plan(
    request: &MintRequest,
    key: &EphemeralKey,
    config: &MarketConfig,
    shape: RevealShape,
    fixed: Vec<FixedInput>,
    utxos: &[Utxo],
    exclude: &HashSet<OutPoint>,
) -> Result<MintPlan> {
    let envelope = Envelope::build(&shape.inscriptions, key, config.network)?;
    let reveal_fee = reveal_fee(&envelope, shape.outputs.len(), request.fee_rate);
    let commit_value = required_commit_value(&envelope, &shape.outputs, request.fee_rate);

    let (service, service_output) = service_fee_terms(config, shape.inscriptions.len())?;
    let mut commit_outputs = vec![TxOut {
        value: Amount::from_sat(commit_value),
        script_pubkey: envelope.output_script(),
    }];
    commit_outputs.extend(service_output);

    let options = request.funding_options(config)?;
    let commit = fund(fixed, commit_outputs, utxos, &options, exclude)?;

    let postage_total: u64 = shape.outputs.iter().map(|o| o.value.to_sat()).sum();
    let fee_breakdown = FeeBreakdown::compute(
        commit.fee + reveal_fee,
        shape.inscriptions.len(),
        request.total_content_size(),
        postage_total,
        &service,
    );

    info!(
        inscriptions = shape.inscriptions.len(),
        address = envelope.funding_address(),
        commit_value,
        total_fee = fee_breakdown.total_fee,
        "planned mint"
    );

    Ok(MintPlan {
        envelope,
        inscriptions: shape.inscriptions,
        reveal_outputs: shape.outputs,
        reveal_fee,
        commit_value,
        commit,
        fee_breakdown,
    })
}

/// Plan a mint of `request.contents` funded from `utxos`
///
/// Each inscription is pointed at its own `postage`-sized slot of the reveal
/// outputs, whichever layout is used.
pub fn plan_mint(
    request: &MintRequest,
    key: &EphemeralKey,
    config: &MarketConfig,
    utxos: &[Utxo],
) -> Result<MintPlan> {
    request.validate()?;
    let destination = to_taproot_output_script(&request.receive_address, config.network)?;
    let count = request.contents.len();
    let offsets = layout_offsets(count, config.postage)?;
    let shape = RevealShape {
        inscriptions: request.inscriptions(&offsets),
        outputs: reveal_outputs(&destination, request.layout, count, config.postage),
    };
    finish_plan(request, key, config, shape, Vec::new(), utxos, &HashSet::new())
}

/// Rare ranges of `utxos` with offsets measured from the start of their
/// concatenated values, the order the commit transaction spends them in
fn stream_anchored_rare_ranges(utxos: &[Utxo]) -> Result<Vec<SatoshiRange>> {
    let mut base = 0u64;
    let mut ranges = Vec::new();
    for utxo in utxos {
        utxo.validate()?;
        ranges.extend(utxo.ranges.iter().filter(|r| r.is_rare()).map(|r| {
            let mut anchored = r.clone();
            anchored.offset += base;
            anchored
        }));
        base += utxo.value;
    }
    Ok(ranges)
}

/// Plan a mint that inscribes on rare sats held in `rare_utxos`
///
/// The rare UTXOs are spent first, so a sat at position `p` of their combined
/// value sits at position `p` of the envelope output and then of the single
/// reveal output. Each inscription points at the first sat of its rare chunk.
pub fn plan_rare_mint(
    request: &MintRequest,
    key: &EphemeralKey,
    config: &MarketConfig,
    rare_utxos: &[Utxo],
    utxos: &[Utxo],
) -> Result<MintPlan> {
    request.validate()?;
    let destination = to_taproot_output_script(&request.receive_address, config.network)?;
    let count = request.contents.len();

    let ranges = stream_anchored_rare_ranges(rare_utxos)?;
    let chunks = split_rare(ranges, config.postage, count, config.min_output_value)?;
    require_chunks(&chunks, count, config.postage)?;

    let offsets = chunks
        .iter()
        .take(count)
        .map(|chunk| {
            let first = chunk
                .ranges
                .first()
                .ok_or_else(|| WasmOrdinalsError::invariant("full chunk without ranges"))?;
            u32::try_from(first.offset).map_err(|_| {
                WasmOrdinalsError::InvalidInput(format!(
                    "rare sat at offset {} is out of pointer range",
                    first.offset
                ))
            })
        })
        .collect::<Result<Vec<u32>>>()?;

    let highest = offsets.iter().copied().max().unwrap_or(0);
    let output_value = (u64::from(highest) + config.postage).max(config.postage * count as u64);
    let shape = RevealShape {
        inscriptions: request.inscriptions(&offsets),
        outputs: reveal_outputs(&destination, OutputLayout::Tight, 1, output_value),
    };

    let options = request.funding_options(config)?;
    let fixed: Vec<FixedInput> = rare_utxos
        .iter()
        .map(|u| FixedInput::from_wallet_utxo(u, &options))
        .collect::<Result<Vec<FixedInput>>>()?;
    let exclude: HashSet<OutPoint> = rare_utxos.iter().map(Utxo::outpoint).collect();

    debug!(
        rare_utxos = rare_utxos.len(),
        ?offsets,
        output_value,
        "rare sats allocated"
    );
    finish_plan(request, key, config, shape, fixed, utxos, &exclude)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::test_utils::PAYER;
    use crate::sats::test_utils::{txid, utxo};

    fn key() -> EphemeralKey {
        EphemeralKey::from_slice(&[3u8; 32]).unwrap()
    }

    fn request(count: usize, layout: OutputLayout) -> MintRequest {
        MintRequest {
            contents: (0..count)
                .map(|i| ContentItem::plain("text/plain", format!("item {}", i).into_bytes()))
                .collect(),
            receive_address: PAYER.to_string(),
            payer_address: PAYER.to_string(),
            fee_rate: FeeRate::from_sat_per_vb(3),
            layout,
            metadata: None,
        }
    }

    #[test]
    fn test_plan_mint_separate_outputs() {
        let plan = plan_mint(
            &request(3, OutputLayout::Separate),
            &key(),
            &MarketConfig::default(),
            &[utxo(1, 100_000)],
        )
        .unwrap();
        assert_eq!(plan.reveal_outputs.len(), 3);
        let offsets: Vec<u32> = plan.inscriptions.iter().map(|i| i.offset).collect();
        assert_eq!(offsets, vec![0, 546, 1_092]);

        let envelope_output = &plan.commit.unsigned_tx().output[0];
        assert_eq!(envelope_output.script_pubkey, plan.envelope.output_script());
        assert_eq!(
            envelope_output.value.to_sat(),
            3 * 546 + plan.reveal_fee
        );
        // no platform address, no service fee
        assert_eq!(plan.fee_breakdown.discount_service_fee, 0);
        assert_eq!(
            plan.fee_breakdown.total_fee,
            plan.commit.fee + plan.reveal_fee + 3 * 546
        );
    }

    #[test]
    fn test_tight_layout_is_cheaper() {
        let config = MarketConfig::default();
        let utxos = [utxo(1, 100_000)];
        let tight = plan_mint(&request(3, OutputLayout::Tight), &key(), &config, &utxos).unwrap();
        let separate =
            plan_mint(&request(3, OutputLayout::Separate), &key(), &config, &utxos).unwrap();
        assert_eq!(tight.reveal_outputs.len(), 1);
        assert!(tight.reveal_fee < separate.reveal_fee);
    }

    #[test]
    fn test_service_fee_output() {
        let config = MarketConfig::default().with_platform_fee(PAYER, 0);
        let plan = plan_mint(
            &request(2, OutputLayout::Separate),
            &key(),
            &config,
            &[utxo(1, 100_000)],
        )
        .unwrap();
        let outputs = &plan.commit.unsigned_tx().output;
        assert_eq!(outputs[1].value.to_sat(), 2_000);
        assert_eq!(plan.fee_breakdown.service_fee, 2_000);
        assert_eq!(plan.fee_breakdown.discount_service_fee, 2_000);
    }

    #[test]
    fn test_non_taproot_receiver_rejected() {
        let mut req = request(1, OutputLayout::Separate);
        req.receive_address = "bc1qar0srrr7xfkvy5l643lydnw9re59gtzzwf5mdq".to_string();
        let err = plan_mint(&req, &key(), &MarketConfig::default(), &[utxo(1, 100_000)])
            .unwrap_err();
        assert!(matches!(err, WasmOrdinalsError::NonTaprootRecipient(_)));
    }

    #[test]
    fn test_empty_contents_rejected() {
        let req = request(0, OutputLayout::Separate);
        assert!(plan_mint(&req, &key(), &MarketConfig::default(), &[utxo(1, 100_000)]).is_err());
    }

    #[test]
    fn test_insufficient_funds() {
        let err = plan_mint(
            &request(1, OutputLayout::Separate),
            &key(),
            &MarketConfig::default(),
            &[utxo(1, 600)],
        )
        .unwrap_err();
        assert!(matches!(err, WasmOrdinalsError::InsufficientFunds { .. }));
    }

    #[test]
    fn test_metadata_skips_blog() {
        let mut req = request(1, OutputLayout::Separate);
        req.contents.push(ContentItem::Blog {
            related_inscription: format!("{}i0", "11".repeat(32)).parse().unwrap(),
            metadata: serde_json::json!({"title": "t"}),
        });
        req.metadata = Some(serde_json::json!({"collection": "c"}));
        let inscriptions = req.inscriptions(&[0, 546]);
        assert!(inscriptions[0].metadata.is_some());
        assert!(inscriptions[1].metadata.is_none());
    }

    #[test]
    fn test_rare_mint_points_at_rare_sats() {
        let rare = Utxo::new(txid(7), 0, 10_000).with_ranges(vec![
            SatoshiRange::new(5_000_000, 1_000).with_offset(0),
            SatoshiRange::new(9_000_000, 600)
                .with_offset(1_000)
                .with_attribute("uncommon"),
            SatoshiRange::new(9_500_000, 600)
                .with_offset(1_600)
                .with_attribute("uncommon"),
        ]);
        let plan = plan_rare_mint(
            &request(2, OutputLayout::Separate),
            &key(),
            &MarketConfig::default(),
            &[rare.clone()],
            &[utxo(1, 100_000)],
        )
        .unwrap();

        let offsets: Vec<u32> = plan.inscriptions.iter().map(|i| i.offset).collect();
        assert_eq!(offsets, vec![1_000, 1_546]);
        assert_eq!(plan.reveal_outputs.len(), 1);
        assert_eq!(plan.reveal_outputs[0].value.to_sat(), 1_546 + 546);
        // rare UTXO is the first input so its sats open the envelope output
        assert_eq!(
            plan.commit.unsigned_tx().input[0].previous_output,
            rare.outpoint()
        );
        assert!(plan.commit_value > 1_546);
    }

    #[test]
    fn test_rare_mint_needs_enough_rare_sats() {
        let rare = Utxo::new(txid(7), 0, 10_000).with_ranges(vec![SatoshiRange::new(9_000_000, 600)
            .with_attribute("uncommon")]);
        let err = plan_rare_mint(
            &request(2, OutputLayout::Separate),
            &key(),
            &MarketConfig::default(),
            &[rare],
            &[utxo(1, 100_000)],
        )
        .unwrap_err();
        assert!(matches!(err, WasmOrdinalsError::InsufficientChunks { .. }));
    }
}
