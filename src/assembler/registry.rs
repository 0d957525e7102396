//! Shared view of the wallet's spendable UTXOs
//!
//! In-flight orders reserve the outpoints they spend so a second build against
//! the same wallet cannot pick them again. The registry is an explicit handle:
//! clone it to share, there is no process-wide instance.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use miniscript::bitcoin::psbt::Psbt;
use miniscript::bitcoin::{OutPoint, Transaction};
use tracing::debug;

use super::FundedTransaction;
use crate::error::{Result, WasmOrdinalsError};
use crate::sats::Utxo;

/// Anything that consumes wallet outpoints once broadcast
pub trait SpendsOutpoints {
    fn spent_outpoints(&self) -> Vec<OutPoint>;
}

impl SpendsOutpoints for Transaction {
    fn spent_outpoints(&self) -> Vec<OutPoint> {
        self.input.iter().map(|i| i.previous_output).collect()
    }
}

impl SpendsOutpoints for Psbt {
    fn spent_outpoints(&self) -> Vec<OutPoint> {
        self.unsigned_tx.spent_outpoints()
    }
}

impl SpendsOutpoints for FundedTransaction {
    fn spent_outpoints(&self) -> Vec<OutPoint> {
        self.selected.iter().map(Utxo::outpoint).collect()
    }
}

#[derive(Debug, Default)]
struct RegistryState {
    /// Wallet order is kept; selection is greedy over it
    utxos: Vec<Utxo>,
    reserved: HashSet<OutPoint>,
}

#[derive(Debug, Clone, Default)]
pub struct UtxoRegistry {
    inner: Arc<Mutex<RegistryState>>,
}

impl UtxoRegistry {
    pub fn new(utxos: Vec<Utxo>) -> Self {
        UtxoRegistry {
            inner: Arc::new(Mutex::new(RegistryState {
                utxos,
                reserved: HashSet::new(),
            })),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, RegistryState>> {
        self.inner
            .lock()
            .map_err(|_| WasmOrdinalsError::RegistryPoisoned)
    }

    /// Replace the wallet view after a refresh
    ///
    /// Reservations on outpoints that are gone from the wallet are dropped.
    pub fn refresh(&self, utxos: Vec<Utxo>) -> Result<()> {
        let mut guard = self.lock()?;
        let present: HashSet<OutPoint> = utxos.iter().map(Utxo::outpoint).collect();
        guard.reserved.retain(|o| present.contains(o));
        guard.utxos = utxos;
        debug!(
            utxos = guard.utxos.len(),
            reserved = guard.reserved.len(),
            "registry refreshed"
        );
        Ok(())
    }

    /// Add outputs created by a broadcast transaction (dummy outputs, change)
    pub fn add(&self, utxos: impl IntoIterator<Item = Utxo>) -> Result<()> {
        let mut guard = self.lock()?;
        for utxo in utxos {
            if !guard.utxos.iter().any(|u| u.outpoint() == utxo.outpoint()) {
                guard.utxos.push(utxo);
            }
        }
        Ok(())
    }

    /// Wallet UTXOs not reserved by any in-flight order
    pub fn available(&self) -> Result<Vec<Utxo>> {
        let guard = self.lock()?;
        Ok(guard
            .utxos
            .iter()
            .filter(|u| !guard.reserved.contains(&u.outpoint()))
            .cloned()
            .collect())
    }

    pub fn is_reserved(&self, outpoint: &OutPoint) -> Result<bool> {
        Ok(self.lock()?.reserved.contains(outpoint))
    }

    /// Reserve all of `outpoints` or none of them
    pub fn reserve(&self, outpoints: &[OutPoint]) -> Result<()> {
        let mut guard = self.lock()?;
        Self::reserve_locked(&mut guard, outpoints)
    }

    fn reserve_locked(guard: &mut RegistryState, outpoints: &[OutPoint]) -> Result<()> {
        if let Some(taken) = outpoints.iter().find(|o| guard.reserved.contains(o)) {
            return Err(WasmOrdinalsError::InvalidInput(format!(
                "{} is already reserved",
                taken
            )));
        }
        guard.reserved.extend(outpoints.iter().copied());
        Ok(())
    }

    pub fn release(&self, outpoints: &[OutPoint]) -> Result<()> {
        let mut guard = self.lock()?;
        for outpoint in outpoints {
            guard.reserved.remove(outpoint);
        }
        Ok(())
    }

    /// Build against the available UTXOs and reserve what the result spends
    ///
    /// The lock is held across the build, so two concurrent callers can never
    /// select the same outpoint.
    pub fn build_and_reserve<T, F>(&self, build: F) -> Result<T>
    where
        T: SpendsOutpoints,
        F: FnOnce(&[Utxo]) -> Result<T>,
    {
        let mut guard = self.lock()?;
        let available: Vec<Utxo> = guard
            .utxos
            .iter()
            .filter(|u| !guard.reserved.contains(&u.outpoint()))
            .cloned()
            .collect();
        let built = build(&available)?;
        Self::reserve_locked(&mut guard, &built.spent_outpoints())?;
        Ok(built)
    }

    /// Forget every wallet UTXO `tx` spends; returns how many were removed
    pub fn mark_spent(&self, tx: &impl SpendsOutpoints) -> Result<usize> {
        let spent: HashSet<OutPoint> = tx.spent_outpoints().into_iter().collect();
        let mut guard = self.lock()?;
        let before = guard.utxos.len();
        guard.utxos.retain(|u| !spent.contains(&u.outpoint()));
        guard.reserved.retain(|o| !spent.contains(o));
        let removed = before - guard.utxos.len();
        debug!(removed, "registry marked outpoints spent");
        Ok(removed)
    }
}
