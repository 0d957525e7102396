//! Inscription content and the field encodings indexers read back

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Result, WasmOrdinalsError};

/// Tag pushed before the content type
pub const TAG_CONTENT_TYPE: u8 = 1;
/// Tag pushed before the encoded offset
pub const TAG_POINTER: u8 = 2;
/// Tag pushed before a back-reference to another inscription
pub const TAG_PARENT: u8 = 3;
/// Tag pushed before CBOR metadata
pub const TAG_METADATA: u8 = 5;

pub const PROTOCOL_ID: &[u8] = b"ord";
pub const BLOG_PROTOCOL_ID: &[u8] = b"blog";

const TXID_LEN: usize = 32;

// ============================================================================
// Offset codec
// ============================================================================

/// Little-endian bytes of `offset` with trailing zero bytes removed
///
/// Zero encodes to an empty vector; it is never pushed as a pointer.
pub fn encode_offset(offset: u32) -> Vec<u8> {
    let mut bytes = offset.to_le_bytes().to_vec();
    while bytes.last() == Some(&0) {
        bytes.pop();
    }
    bytes
}

pub fn decode_offset(bytes: &[u8]) -> Result<u32> {
    if bytes.len() > 4 {
        return Err(WasmOrdinalsError::InvalidInput(format!(
            "offset must be at most 4 bytes, got {}",
            bytes.len()
        )));
    }
    let mut buf = [0u8; 4];
    buf[..bytes.len()].copy_from_slice(bytes);
    Ok(u32::from_le_bytes(buf))
}

// ============================================================================
// InscriptionId
// ============================================================================

/// `<txid>i<index>` reference to an existing inscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InscriptionId {
    /// Txid bytes in display (big-endian hex) order
    txid: [u8; TXID_LEN],
    index: u32,
}

impl InscriptionId {
    pub fn new(txid_hex: &str, index: u32) -> Result<Self> {
        let bytes = hex::decode(txid_hex).map_err(|e| {
            WasmOrdinalsError::InvalidRelationReference(format!("{}: {}", txid_hex, e))
        })?;
        let txid: [u8; TXID_LEN] = bytes.as_slice().try_into().map_err(|_| {
            WasmOrdinalsError::InvalidRelationReference(format!(
                "txid must be {} bytes, got {}",
                TXID_LEN,
                bytes.len()
            ))
        })?;
        Ok(InscriptionId { txid, index })
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    /// Serialized back-reference: txid in internal byte order, then the trimmed index
    pub fn to_reference_bytes(&self) -> Vec<u8> {
        let mut bytes: Vec<u8> = self.txid.iter().rev().copied().collect();
        bytes.extend(encode_offset(self.index));
        bytes
    }
}

impl fmt::Display for InscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}i{}", hex::encode(self.txid), self.index)
    }
}

impl FromStr for InscriptionId {
    type Err = WasmOrdinalsError;

    fn from_str(s: &str) -> Result<Self> {
        let (txid, index) = s.rsplit_once('i').ok_or_else(|| {
            WasmOrdinalsError::InvalidRelationReference(format!("missing index separator: {}", s))
        })?;
        let index = index.parse::<u32>().map_err(|e| {
            WasmOrdinalsError::InvalidRelationReference(format!("{}: {}", s, e))
        })?;
        InscriptionId::new(txid, index)
    }
}

impl Serialize for InscriptionId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for InscriptionId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        InscriptionId::from_str(&s).map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// ContentItem
// ============================================================================

/// What gets inscribed. Each variant carries only the fields it needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ContentItem {
    Plain {
        mimetype: String,
        #[serde(with = "hex::serde")]
        payload: Vec<u8>,
    },
    /// Main content plus an auxiliary file inscribed alongside it
    ParentLinked {
        mimetype: String,
        #[serde(with = "hex::serde")]
        payload: Vec<u8>,
        parent_mimetype: String,
        #[serde(with = "hex::serde")]
        parent_payload: Vec<u8>,
    },
    /// Content pointing back at an existing inscription
    RelationLinked {
        mimetype: String,
        #[serde(with = "hex::serde")]
        payload: Vec<u8>,
        related_inscription: InscriptionId,
    },
    Blog {
        related_inscription: InscriptionId,
        metadata: serde_json::Value,
    },
}

impl ContentItem {
    pub fn plain(mimetype: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        ContentItem::Plain {
            mimetype: mimetype.into(),
            payload: payload.into(),
        }
    }

    /// Bytes of content carried, used for the order's size total
    pub fn content_size(&self) -> u64 {
        let size = match self {
            ContentItem::Plain { payload, .. } | ContentItem::RelationLinked { payload, .. } => {
                payload.len()
            }
            ContentItem::ParentLinked {
                payload,
                parent_payload,
                ..
            } => payload.len() + parent_payload.len(),
            ContentItem::Blog { metadata, .. } => metadata.to_string().len(),
        };
        size as u64
    }
}

/// A content item placed at `offset` sats into the reveal transaction's outputs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Inscription {
    pub content: ContentItem,
    #[serde(default)]
    pub offset: u32,
    /// CBOR-encoded into the envelope when present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl Inscription {
    pub fn new(content: ContentItem) -> Self {
        Inscription {
            content,
            offset: 0,
            metadata: None,
        }
    }

    pub fn with_offset(mut self, offset: u32) -> Self {
        self.offset = offset;
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Offsets for `count` inscriptions, each owning `postage` sats in output order
pub fn layout_offsets(count: usize, postage: u64) -> Result<Vec<u32>> {
    (0..count as u64)
        .map(|i| {
            u32::try_from(i * postage).map_err(|_| {
                WasmOrdinalsError::InvalidInput(format!("offset {} exceeds u32", i * postage))
            })
        })
        .collect()
}

pub fn encode_cbor(value: &serde_json::Value) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::into_writer(value, &mut buf)
        .map_err(|e| WasmOrdinalsError::InvalidInput(format!("CBOR encode error: {}", e)))?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0, "")]
    #[case(1, "01")]
    #[case(255, "ff")]
    #[case(256, "0001")]
    #[case(330, "4a01")]
    #[case(65_536, "000001")]
    #[case(16_777_216, "00000001")]
    #[case(u32::MAX, "ffffffff")]
    fn test_encode_offset(#[case] offset: u32, #[case] expected: &str) {
        let encoded = encode_offset(offset);
        assert_eq!(hex::encode(&encoded), expected);
        assert_eq!(hex::encode(&encoded).len() % 2, 0);
        assert_eq!(decode_offset(&encoded).unwrap(), offset);
    }

    #[test]
    fn test_offset_roundtrip_sampled() {
        let mut x: u32 = 1;
        for _ in 0..10_000 {
            assert_eq!(decode_offset(&encode_offset(x)).unwrap(), x);
            x = x.wrapping_mul(2_654_435_761).wrapping_add(12_345);
        }
        for shift in 0..32 {
            let v = 1u32 << shift;
            assert_eq!(decode_offset(&encode_offset(v)).unwrap(), v);
            assert_eq!(decode_offset(&encode_offset(v - 1)).unwrap(), v - 1);
        }
    }

    #[test]
    fn test_decode_offset_rejects_long_input() {
        assert!(decode_offset(&[1, 2, 3, 4, 5]).is_err());
    }

    #[test]
    fn test_inscription_id_reference_bytes() {
        let txid = format!("{}{}", "00".repeat(31), "ff");
        let id = InscriptionId::from_str(&format!("{}i1", txid)).unwrap();
        let bytes = id.to_reference_bytes();
        assert_eq!(bytes.len(), 33);
        assert_eq!(bytes[0], 0xff);
        assert_eq!(bytes[32], 0x01);

        let first = InscriptionId::new(&txid, 0).unwrap();
        assert_eq!(first.to_reference_bytes().len(), 32);
        assert_eq!(first.to_string(), format!("{}i0", txid));
    }

    #[rstest]
    #[case("abcd")]
    #[case("zz")]
    #[case("")]
    fn test_inscription_id_rejects_bad_txid(#[case] txid: &str) {
        let err = InscriptionId::new(txid, 0).unwrap_err();
        assert!(matches!(err, WasmOrdinalsError::InvalidRelationReference(_)));
    }

    #[test]
    fn test_inscription_id_requires_separator() {
        assert!(InscriptionId::from_str(&"ab".repeat(32)).is_err());
    }

    #[test]
    fn test_content_item_json() {
        let item: ContentItem = serde_json::from_str(
            r#"{"type":"plain","mimetype":"text/plain","payload":"68656c6c6f"}"#,
        )
        .unwrap();
        assert_eq!(item, ContentItem::plain("text/plain", b"hello".to_vec()));
        assert_eq!(item.content_size(), 5);

        let related = format!("{}i0", "11".repeat(32));
        let blog: ContentItem = serde_json::from_value(serde_json::json!({
            "type": "blog",
            "relatedInscription": related,
            "metadata": {"title": "hi"}
        }))
        .unwrap();
        assert!(matches!(blog, ContentItem::Blog { .. }));
    }

    #[test]
    fn test_layout_offsets() {
        assert_eq!(layout_offsets(3, 546).unwrap(), vec![0, 546, 1092]);
        assert!(layout_offsets(2, u64::from(u32::MAX) + 1).is_err());
    }
}
