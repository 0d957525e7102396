//! UTXO descriptors with their satoshi ranges
//!
//! A UTXO descriptor is `{txid, vout, value, ranges:[{start,size,offset,attributes}]}`,
//! where each range is a contiguous run of ordinal numbers anchored at `offset`
//! inside the output.

mod partition;

pub use partition::{
    require_chunks, split_even, split_rare, Chunk, OffsetAnchor, RangeSplitter,
};

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::bitcoin::{OutPoint, Txid};
use crate::error::{Result, WasmOrdinalsError};

/// A contiguous run of satoshis inside one UTXO
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SatoshiRange {
    /// Absolute ordinal number of the first sat
    pub start: u64,
    pub size: u64,
    /// Position of the first sat within its UTXO
    #[serde(default)]
    pub offset: u64,
    /// Rarity tags such as "uncommon" or "vintage"
    #[serde(default)]
    pub attributes: BTreeSet<String>,
}

impl SatoshiRange {
    pub fn new(start: u64, size: u64) -> Self {
        SatoshiRange {
            start,
            size,
            ..Default::default()
        }
    }

    pub fn with_offset(mut self, offset: u64) -> Self {
        self.offset = offset;
        self
    }

    pub fn with_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.attributes.insert(attribute.into());
        self
    }

    pub fn end(&self) -> u64 {
        self.start + self.size
    }

    pub fn is_rare(&self) -> bool {
        !self.attributes.is_empty()
    }

    /// Split into `[start, start+at)` and the remainder
    ///
    /// Both halves keep the attributes; the remainder's offset moves with it.
    pub fn split_at(&self, at: u64) -> (SatoshiRange, SatoshiRange) {
        debug_assert!(at > 0 && at < self.size, "split must be strictly inside the range");
        let head = SatoshiRange {
            start: self.start,
            size: at,
            offset: self.offset,
            attributes: self.attributes.clone(),
        };
        let tail = SatoshiRange {
            start: self.start + at,
            size: self.size - at,
            offset: self.offset + at,
            attributes: self.attributes.clone(),
        };
        (head, tail)
    }
}

/// A spendable output together with the sat ranges it carries
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utxo {
    #[serde(with = "txid_string")]
    pub txid: Txid,
    pub vout: u32,
    pub value: u64,
    #[serde(default)]
    pub ranges: Vec<SatoshiRange>,
}

impl Utxo {
    pub fn new(txid: Txid, vout: u32, value: u64) -> Self {
        Utxo {
            txid,
            vout,
            value,
            ranges: Vec::new(),
        }
    }

    pub fn with_ranges(mut self, ranges: Vec<SatoshiRange>) -> Self {
        self.ranges = ranges;
        self
    }

    pub fn outpoint(&self) -> OutPoint {
        OutPoint {
            txid: self.txid,
            vout: self.vout,
        }
    }

    pub fn range_total(&self) -> u64 {
        self.ranges.iter().map(|r| r.size).sum()
    }

    pub fn has_rare_sats(&self) -> bool {
        self.ranges.iter().any(SatoshiRange::is_rare)
    }

    /// Ranges must fit in the value and must not overlap inside the output
    pub fn validate(&self) -> Result<()> {
        if self.range_total() > self.value {
            return Err(WasmOrdinalsError::InvalidInput(format!(
                "{}: ranges cover {} sats but value is {}",
                self.outpoint(),
                self.range_total(),
                self.value
            )));
        }
        let mut next_free = 0u64;
        for range in &self.ranges {
            if range.offset < next_free {
                return Err(WasmOrdinalsError::InvalidInput(format!(
                    "{}: range at offset {} overlaps previous range",
                    self.outpoint(),
                    range.offset
                )));
            }
            next_free = range.offset + range.size;
        }
        if next_free > self.value {
            return Err(WasmOrdinalsError::InvalidInput(format!(
                "{}: range ends at offset {} beyond value {}",
                self.outpoint(),
                next_free,
                self.value
            )));
        }
        Ok(())
    }
}

/// All ranges of `utxos`, in order
pub fn flatten_ranges(utxos: &[Utxo]) -> Vec<SatoshiRange> {
    utxos.iter().flat_map(|u| u.ranges.iter().cloned()).collect()
}

pub fn total_value(utxos: &[Utxo]) -> u64 {
    utxos.iter().map(|u| u.value).sum()
}

pub(crate) mod txid_string {
    use std::str::FromStr;

    use serde::{Deserialize, Deserializer, Serializer};

    use crate::bitcoin::Txid;

    pub fn serialize<S: Serializer>(txid: &Txid, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(txid)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Txid, D::Error> {
        let s = String::deserialize(deserializer)?;
        Txid::from_str(&s).map_err(serde::de::Error::custom)
    }
}


#[cfg(test)]
mod tests {
    use super::test_utils::*;
    use super::*;

    #[test]
    fn test_split_at_moves_offset() {
        let range = SatoshiRange::new(100, 500)
            .with_offset(20)
            .with_attribute("uncommon");
        let (head, tail) = range.split_at(330);
        assert_eq!((head.start, head.size, head.offset), (100, 330, 20));
        assert_eq!((tail.start, tail.size, tail.offset), (430, 170, 350));
        assert!(tail.is_rare());
    }

    #[test]
    fn test_validate_ranges() {
        let ok = utxo(1, 1_000).with_ranges(vec![
            SatoshiRange::new(5_000, 400),
            SatoshiRange::new(9_000, 600).with_offset(400),
        ]);
        assert!(ok.validate().is_ok());

        let overlapping = utxo(1, 1_000).with_ranges(vec![
            SatoshiRange::new(5_000, 400),
            SatoshiRange::new(9_000, 600).with_offset(300),
        ]);
        assert!(overlapping.validate().is_err());

        let oversized = utxo(1, 100).with_ranges(vec![SatoshiRange::new(0, 101)]);
        assert!(oversized.validate().is_err());
    }

    #[test]
    fn test_utxo_json_descriptor() {
        let json = format!(
            r#"{{"txid":"{}","vout":1,"value":10000,"ranges":[{{"start":7,"size":10000,"offset":0,"attributes":["rare"]}}]}}"#,
            "11".repeat(32)
        );
        let parsed: Utxo = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.outpoint().vout, 1);
        assert!(parsed.has_rare_sats());
        let back = serde_json::to_string(&parsed).unwrap();
        assert_eq!(serde_json::from_str::<Utxo>(&back).unwrap(), parsed);
    }
}
