//! Mint orders and their status
//!
//! An order is created `pending`, becomes `paid` once its funding transaction
//! is broadcast, and ends `inscribe_success` or `inscribe_fail` depending on
//! the reveal. A failed reveal can be retried, which puts the order back to
//! `paid`. The serialized order holds everything needed to resume a reveal.

use std::fmt;

use miniscript::bitcoin::hashes::{sha256, Hash, HashEngine};
use miniscript::bitcoin::{Amount, ScriptBuf, Transaction, TxOut};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::assembler::{MintPlan, MintRequest};
use crate::error::{Result, WasmOrdinalsError};
use crate::fees::{FeeBreakdown, FeeRate};
use crate::inscriptions::{sign_reveal_transaction, ContentItem, Envelope, EphemeralKey};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderKind {
    Mint,
    RareMint,
    Blog,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Paid,
    InscribeSuccess,
    InscribeFail,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Paid => "paid",
            OrderStatus::InscribeSuccess => "inscribe_success",
            OrderStatus::InscribeFail => "inscribe_fail",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A reveal output kept in serializable form
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevealOutput {
    #[serde(with = "hex::serde")]
    pub script: Vec<u8>,
    pub value: u64,
}

impl From<&TxOut> for RevealOutput {
    fn from(out: &TxOut) -> Self {
        RevealOutput {
            script: out.script_pubkey.to_bytes(),
            value: out.value.to_sat(),
        }
    }
}

impl From<&RevealOutput> for TxOut {
    fn from(out: &RevealOutput) -> Self {
        TxOut {
            value: Amount::from_sat(out.value),
            script_pubkey: ScriptBuf::from_bytes(out.script.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: OrderKind,
    pub envelope: Envelope,
    pub ephemeral_key: EphemeralKey,
    pub fee_breakdown: FeeBreakdown,
    pub receive_address: String,
    pub payer_address: String,
    pub reveal_outputs: Vec<RevealOutput>,
    pub fee_rate: FeeRate,
    pub status: OrderStatus,
    /// Milliseconds since the Unix epoch, supplied by the caller
    pub created_at: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub funding_txid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reveal_txid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

/// Hex sha256 of the envelope script followed by the big-endian creation time
fn order_id(envelope: &Envelope, created_at: u64) -> String {
    let mut engine = sha256::Hash::engine();
    engine.input(envelope.script_bytes());
    engine.input(&created_at.to_be_bytes());
    sha256::Hash::from_engine(engine).to_string()
}

impl Order {
    pub fn new(
        kind: OrderKind,
        plan: &MintPlan,
        request: &MintRequest,
        key: EphemeralKey,
        created_at: u64,
    ) -> Self {
        let kind = match kind {
            OrderKind::Mint
                if request
                    .contents
                    .iter()
                    .any(|c| matches!(c, ContentItem::Blog { .. })) =>
            {
                OrderKind::Blog
            }
            other => other,
        };
        Order {
            id: order_id(&plan.envelope, created_at),
            kind,
            envelope: plan.envelope.clone(),
            ephemeral_key: key,
            fee_breakdown: plan.fee_breakdown,
            receive_address: request.receive_address.clone(),
            payer_address: request.payer_address.clone(),
            reveal_outputs: plan.reveal_outputs.iter().map(RevealOutput::from).collect(),
            fee_rate: request.fee_rate,
            status: OrderStatus::Pending,
            created_at,
            funding_txid: None,
            reveal_txid: None,
            failure: None,
        }
    }

    fn transition(&mut self, allowed_from: &[OrderStatus], to: OrderStatus) -> Result<()> {
        if !allowed_from.contains(&self.status) {
            return Err(WasmOrdinalsError::InvalidOrderTransition {
                from: self.status.to_string(),
                to: to.to_string(),
            });
        }
        info!(order = %self.id, from = %self.status, to = %to, "order status changed");
        self.status = to;
        Ok(())
    }

    /// Funding transaction broadcast
    pub fn mark_paid(&mut self, funding_txid: impl Into<String>) -> Result<()> {
        self.transition(&[OrderStatus::Pending], OrderStatus::Paid)?;
        self.funding_txid = Some(funding_txid.into());
        Ok(())
    }

    pub fn mark_inscribed(&mut self, reveal_txid: impl Into<String>) -> Result<()> {
        self.transition(&[OrderStatus::Paid], OrderStatus::InscribeSuccess)?;
        self.reveal_txid = Some(reveal_txid.into());
        self.failure = None;
        Ok(())
    }

    pub fn mark_failed(&mut self, reason: impl Into<String>) -> Result<()> {
        self.transition(&[OrderStatus::Paid], OrderStatus::InscribeFail)?;
        self.failure = Some(reason.into());
        Ok(())
    }

    /// Manual retry after a failed reveal
    pub fn retry(&mut self) -> Result<()> {
        self.transition(&[OrderStatus::InscribeFail], OrderStatus::Paid)
    }

    /// Sign the reveal against the broadcast funding transaction
    ///
    /// Only a paid order can be revealed; the key never leaves the order.
    pub fn sign_reveal(&self, commit_tx: &Transaction) -> Result<Transaction> {
        if self.status != OrderStatus::Paid {
            return Err(WasmOrdinalsError::InvalidOrderTransition {
                from: self.status.to_string(),
                to: OrderStatus::InscribeSuccess.to_string(),
            });
        }
        if let Some(expected) = &self.funding_txid {
            let actual = commit_tx.compute_txid().to_string();
            if &actual != expected {
                return Err(WasmOrdinalsError::InvalidInput(format!(
                    "commit transaction {} does not match funding txid {}",
                    actual, expected
                )));
            }
        }
        let outputs: Vec<TxOut> = self.reveal_outputs.iter().map(TxOut::from).collect();
        sign_reveal_transaction(
            &self.ephemeral_key,
            &self.envelope,
            commit_tx,
            outputs,
            self.fee_rate,
        )
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
