//! Splitting satoshi ranges into value-bounded chunks
//!
//! Both strategies walk the flattened range list once. A range that crosses
//! a chunk boundary is cut at the boundary and its tail opens the next chunk.
//!
//! - [`split_even`] stops after `chunks` full chunks and drops whatever is left.
//! - [`split_rare`] keeps each sub-range anchored to its position in the source
//!   UTXO and appends anything left over as one final, possibly short chunk.

use std::iter::FusedIterator;
use std::mem;
use std::vec;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::SatoshiRange;
use crate::error::{Result, WasmOrdinalsError};

/// One output's worth of sat ranges
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Chunk {
    pub ranges: Vec<SatoshiRange>,
    pub total: u64,
}

impl Chunk {
    fn push(&mut self, range: SatoshiRange) {
        self.total += range.size;
        self.ranges.push(range);
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn has_rare_sats(&self) -> bool {
        self.ranges.iter().any(SatoshiRange::is_rare)
    }
}

/// What a sub-range's `offset` is measured against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OffsetAnchor {
    /// Position inside the chunk being built
    Chunk,
    /// Position inside the UTXO the range came from
    Utxo,
}

/// Iterator yielding full chunks of exactly `amount` sats
///
/// Once it returns `None` it stays exhausted; [`RangeSplitter::into_remainder`]
/// hands back whatever was not placed into a full chunk.
pub struct RangeSplitter {
    ranges: vec::IntoIter<SatoshiRange>,
    carry: Option<SatoshiRange>,
    pending: Chunk,
    amount: u64,
    anchor: OffsetAnchor,
    exhausted: bool,
}

impl RangeSplitter {
    pub fn new(ranges: Vec<SatoshiRange>, amount: u64, anchor: OffsetAnchor) -> Self {
        RangeSplitter {
            ranges: ranges.into_iter(),
            carry: None,
            pending: Chunk::default(),
            amount,
            anchor,
            exhausted: amount == 0,
        }
    }

    fn next_range(&mut self) -> Option<SatoshiRange> {
        if let Some(carry) = self.carry.take() {
            return Some(carry);
        }
        self.ranges.by_ref().find(|r| r.size > 0)
    }

    fn place(&self, mut range: SatoshiRange, chunk: &Chunk) -> SatoshiRange {
        if self.anchor == OffsetAnchor::Chunk {
            range.offset = chunk.total;
        }
        range
    }

    /// Ranges not placed into a full chunk, in their original order
    pub fn into_remainder(mut self) -> Vec<SatoshiRange> {
        let mut rest = mem::take(&mut self.pending.ranges);
        rest.extend(self.carry.take());
        rest.extend(self.ranges.filter(|r| r.size > 0));
        rest
    }
}

impl Iterator for RangeSplitter {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        if self.exhausted {
            return None;
        }
        let mut chunk = Chunk::default();
        while let Some(range) = self.next_range() {
            let needed = self.amount - chunk.total;
            if range.size < needed {
                let placed = self.place(range, &chunk);
                chunk.push(placed);
                continue;
            }
            if range.size == needed {
                let placed = self.place(range, &chunk);
                chunk.push(placed);
            } else {
                let (head, tail) = range.split_at(needed);
                let placed = self.place(head, &chunk);
                chunk.push(placed);
                self.carry = Some(tail);
            }
            return Some(chunk);
        }
        self.exhausted = true;
        self.pending = chunk;
        None
    }
}

impl FusedIterator for RangeSplitter {}

fn check_request(amount: u64, chunks: usize, min_output_value: u64) -> Result<()> {
    if chunks == 0 {
        return Err(WasmOrdinalsError::new("chunk count must be positive"));
    }
    if amount < min_output_value {
        return Err(WasmOrdinalsError::InvalidInput(format!(
            "chunk amount {} is below the minimum output value {}",
            amount, min_output_value
        )));
    }
    Ok(())
}

/// Even split: up to `chunks` chunks of exactly `amount` sats; leftovers are dropped
///
/// Offsets in the result are positions within each chunk. Fewer chunks than
/// requested means the ranges did not cover `amount * chunks`.
pub fn split_even(
    ranges: Vec<SatoshiRange>,
    amount: u64,
    chunks: usize,
    min_output_value: u64,
) -> Result<Vec<Chunk>> {
    check_request(amount, chunks, min_output_value)?;
    let result: Vec<Chunk> = RangeSplitter::new(ranges, amount, OffsetAnchor::Chunk)
        .take(chunks)
        .collect();
    if result.len() < chunks {
        warn!(requested = chunks, produced = result.len(), "even split came up short");
    }
    debug!(amount, chunks = result.len(), "even split");
    Ok(result)
}

/// Rare-range split: like [`split_even`], but offsets stay anchored to the source
/// UTXO and any leftover ranges become one final chunk
pub fn split_rare(
    ranges: Vec<SatoshiRange>,
    amount: u64,
    chunks: usize,
    min_output_value: u64,
) -> Result<Vec<Chunk>> {
    check_request(amount, chunks, min_output_value)?;
    let mut splitter = RangeSplitter::new(ranges, amount, OffsetAnchor::Utxo);
    let mut result: Vec<Chunk> = splitter.by_ref().take(chunks).collect();
    let leftover = splitter.into_remainder();
    if !leftover.is_empty() {
        let mut last = Chunk::default();
        for range in leftover {
            last.push(range);
        }
        debug!(sats = last.total, "rare split keeps trailing chunk");
        result.push(last);
    }
    Ok(result)
}

/// Fail when fewer than `requested` full chunks of `amount` were produced
pub fn require_chunks(chunks: &[Chunk], requested: usize, amount: u64) -> Result<()> {
    let produced = chunks.iter().filter(|c| c.total == amount).count();
    if produced < requested {
        return Err(WasmOrdinalsError::InsufficientChunks {
            requested,
            produced,
        });
    }
    Ok(())
}
