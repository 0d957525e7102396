//! Inscription envelope script builder
//!
//! Creates the taproot leaf script carrying the inscriptions, and the
//! single-leaf taproot output that commits to it.

use miniscript::bitcoin::hashes::Hash;
use miniscript::bitcoin::opcodes::all::{OP_CHECKSIG, OP_ENDIF, OP_IF, OP_PUSHBYTES_0};
use miniscript::bitcoin::opcodes::OP_FALSE;
use miniscript::bitcoin::script::{Builder, PushBytesBuf};
use miniscript::bitcoin::secp256k1::{Secp256k1, XOnlyPublicKey};
use miniscript::bitcoin::taproot::{ControlBlock, LeafVersion, TapLeafHash, TaprootBuilder};
use miniscript::bitcoin::{Address, ScriptBuf, Witness};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::content::{
    encode_cbor, encode_offset, ContentItem, Inscription, BLOG_PROTOCOL_ID, PROTOCOL_ID,
    TAG_CONTENT_TYPE, TAG_METADATA, TAG_PARENT, TAG_POINTER,
};
use super::key::EphemeralKey;
use crate::error::{Result, WasmOrdinalsError};
use crate::networks::Network;

/// Maximum size of a single data push in tapscript (520 bytes)
const MAX_PUSH_SIZE: usize = 520;

/// BIP340 signature with the default sighash (no trailing sighash byte)
const SCHNORR_SIG_SIZE: usize = 64;

fn push_bytes(data: &[u8]) -> Result<PushBytesBuf> {
    PushBytesBuf::try_from(data.to_vec())
        .map_err(|_| WasmOrdinalsError::invariant(format!("push of {} bytes", data.len())))
}

/// Push `data` split into MAX_PUSH_SIZE chunks; empty data pushes zero bytes
fn push_chunked(mut builder: Builder, data: &[u8]) -> Result<Builder> {
    if data.is_empty() {
        return Ok(builder.push_opcode(OP_PUSHBYTES_0));
    }
    for chunk in data.chunks(MAX_PUSH_SIZE) {
        builder = builder.push_slice(push_bytes(chunk)?);
    }
    Ok(builder)
}

fn push_tag(builder: Builder, tag: u8, value: &[u8]) -> Result<Builder> {
    Ok(builder.push_slice([tag]).push_slice(push_bytes(value)?))
}

/// One `OP_FALSE OP_IF ... OP_ENDIF` group
struct Group<'a> {
    protocol: &'a [u8],
    mimetype: Option<&'a str>,
    offset: u32,
    parent: Option<Vec<u8>>,
    metadata: Option<Vec<u8>>,
    body: Option<&'a [u8]>,
}

impl Group<'_> {
    fn append(&self, mut builder: Builder) -> Result<Builder> {
        builder = builder.push_opcode(OP_FALSE).push_opcode(OP_IF);
        builder = builder.push_slice(push_bytes(self.protocol)?);
        if let Some(mimetype) = self.mimetype {
            builder = push_tag(builder, TAG_CONTENT_TYPE, mimetype.as_bytes())?;
        }
        if self.offset > 0 {
            builder = push_tag(builder, TAG_POINTER, &encode_offset(self.offset))?;
        }
        if let Some(parent) = &self.parent {
            builder = push_tag(builder, TAG_PARENT, parent)?;
        }
        if let Some(metadata) = &self.metadata {
            // each chunk of metadata is its own tagged field
            for chunk in metadata.chunks(MAX_PUSH_SIZE) {
                builder = push_tag(builder, TAG_METADATA, chunk)?;
            }
        }
        if let Some(body) = self.body {
            builder = builder.push_opcode(OP_PUSHBYTES_0);
            builder = push_chunked(builder, body)?;
        }
        Ok(builder.push_opcode(OP_ENDIF))
    }
}

fn groups_for(inscription: &Inscription) -> Result<Vec<Group<'_>>> {
    let metadata = inscription.metadata.as_ref().map(encode_cbor).transpose()?;
    let offset = inscription.offset;
    let groups = match &inscription.content {
        ContentItem::Plain { mimetype, payload } => vec![Group {
            protocol: PROTOCOL_ID,
            mimetype: Some(mimetype.as_str()),
            offset,
            parent: None,
            metadata,
            body: Some(payload.as_slice()),
        }],
        ContentItem::ParentLinked {
            mimetype,
            payload,
            parent_mimetype,
            parent_payload,
        } => vec![
            Group {
                protocol: PROTOCOL_ID,
                mimetype: Some(mimetype.as_str()),
                offset,
                parent: None,
                metadata,
                body: Some(payload.as_slice()),
            },
            Group {
                protocol: PROTOCOL_ID,
                mimetype: Some(parent_mimetype.as_str()),
                offset,
                parent: None,
                metadata: None,
                body: Some(parent_payload.as_slice()),
            },
        ],
        ContentItem::RelationLinked {
            mimetype,
            payload,
            related_inscription,
        } => vec![Group {
            protocol: PROTOCOL_ID,
            mimetype: Some(mimetype.as_str()),
            offset,
            parent: Some(related_inscription.to_reference_bytes()),
            metadata: None,
            body: Some(payload.as_slice()),
        }],
        ContentItem::Blog {
            related_inscription,
            metadata: blog_metadata,
        } => vec![Group {
            protocol: BLOG_PROTOCOL_ID,
            mimetype: None,
            offset,
            parent: Some(related_inscription.to_reference_bytes()),
            metadata: Some(encode_cbor(blog_metadata)?),
            body: None,
        }],
    };
    Ok(groups)
}

/// Build the envelope leaf script
///
/// ```text
/// <pubkey> OP_CHECKSIG
/// OP_FALSE OP_IF
///   "ord"
///   01 <content_type>
///   [02 <offset>]       only when offset > 0
///   [03 <inscription_id>]
///   [05 <cbor_chunk_1> 05 <cbor_chunk_2> ...]
///   OP_0 <data_chunk_1> <data_chunk_2> ...
/// OP_ENDIF
/// ...one group per inscription
/// ```
pub fn build_envelope_script(
    internal_key: &XOnlyPublicKey,
    inscriptions: &[Inscription],
) -> Result<ScriptBuf> {
    if inscriptions.is_empty() {
        return Err(WasmOrdinalsError::new("envelope needs at least one inscription"));
    }

    let mut builder = Builder::new()
        .push_x_only_key(internal_key)
        .push_opcode(OP_CHECKSIG);

    for inscription in inscriptions {
        for group in groups_for(inscription)? {
            builder = group.append(builder)?;
        }
    }

    Ok(builder.into_script())
}

/// Serialized witness of a script-path spend: <signature> <script> <control_block>
pub fn script_path_witness_size(script: &ScriptBuf, control_block: &ControlBlock) -> usize {
    let mut witness = Witness::new();
    witness.push([0u8; SCHNORR_SIG_SIZE]);
    witness.push(script.as_bytes());
    witness.push(control_block.serialize());
    witness.size()
}

/// Taproot commitment to an envelope script
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    #[serde(with = "hex::serde")]
    script: Vec<u8>,
    #[serde(with = "hex::serde")]
    leaf_hash: [u8; 32],
    #[serde(with = "hex::serde")]
    internal_key: [u8; 32],
    #[serde(with = "hex::serde")]
    output_key: [u8; 32],
    #[serde(with = "hex::serde")]
    control_block: Vec<u8>,
    funding_address: String,
    witness_size: usize,
}

impl Envelope {
    /// Build the envelope for `inscriptions` controlled by `key`
    ///
    /// Identical inputs always produce the same script and address.
    pub fn build(
        inscriptions: &[Inscription],
        key: &EphemeralKey,
        network: Network,
    ) -> Result<Envelope> {
        let secp = Secp256k1::new();
        let internal_key = key.x_only_public_key();
        let script = build_envelope_script(&internal_key, inscriptions)?;

        let spend_info = TaprootBuilder::new()
            .add_leaf(0, script.clone())
            .map_err(|e| WasmOrdinalsError::invariant(format!("taproot tree: {:?}", e)))?
            .finalize(&secp, internal_key)
            .map_err(|e| WasmOrdinalsError::invariant(format!("taproot finalize: {:?}", e)))?;

        let control_block = spend_info
            .control_block(&(script.clone(), LeafVersion::TapScript))
            .ok_or_else(|| WasmOrdinalsError::invariant("missing control block"))?;

        let output_key = spend_info.output_key();
        let funding_address = Address::p2tr_tweaked(output_key, network.to_bitcoin_network());
        let witness_size = script_path_witness_size(&script, &control_block);
        let leaf_hash = TapLeafHash::from_script(&script, LeafVersion::TapScript);

        debug!(
            script_len = script.len(),
            witness_size,
            address = %funding_address,
            "built envelope"
        );

        Ok(Envelope {
            script: script.to_bytes(),
            leaf_hash: leaf_hash.to_byte_array(),
            internal_key: internal_key.serialize(),
            output_key: output_key.to_inner().serialize(),
            control_block: control_block.serialize(),
            funding_address: funding_address.to_string(),
            witness_size,
        })
    }

    pub fn script(&self) -> ScriptBuf {
        ScriptBuf::from_bytes(self.script.clone())
    }

    pub fn script_bytes(&self) -> &[u8] {
        &self.script
    }

    pub fn leaf_hash(&self) -> TapLeafHash {
        TapLeafHash::from_byte_array(self.leaf_hash)
    }

    pub fn internal_key(&self) -> Result<XOnlyPublicKey> {
        XOnlyPublicKey::from_slice(&self.internal_key)
            .map_err(|e| WasmOrdinalsError::invariant(format!("internal key: {}", e)))
    }

    pub fn output_key_bytes(&self) -> &[u8; 32] {
        &self.output_key
    }

    pub fn control_block(&self) -> Result<ControlBlock> {
        ControlBlock::decode(&self.control_block)
            .map_err(|e| WasmOrdinalsError::invariant(format!("control block: {:?}", e)))
    }

    pub fn control_block_bytes(&self) -> &[u8] {
        &self.control_block
    }

    pub fn funding_address(&self) -> &str {
        &self.funding_address
    }

    /// P2TR output script of the funding address (network-agnostic)
    pub fn output_script(&self) -> ScriptBuf {
        let mut bytes = Vec::with_capacity(34);
        bytes.push(0x51); // OP_1
        bytes.push(0x20); // PUSH32
        bytes.extend_from_slice(&self.output_key);
        ScriptBuf::from_bytes(bytes)
    }

    pub fn witness_size(&self) -> usize {
        self.witness_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inscriptions::content::InscriptionId;
    use miniscript::bitcoin::script::Instruction;
    use std::str::FromStr;

    fn test_key() -> EphemeralKey {
        EphemeralKey::from_slice(&[1u8; 32]).expect("32 bytes, within curve order")
    }

    fn pushes(script: &ScriptBuf) -> Vec<Vec<u8>> {
        script
            .instructions()
            .filter_map(|i| match i.unwrap() {
                Instruction::PushBytes(p) => Some(p.as_bytes().to_vec()),
                Instruction::Op(_) => None,
            })
            .collect()
    }

    fn related() -> InscriptionId {
        InscriptionId::from_str(&format!("{}i0", "ab".repeat(32))).unwrap()
    }

    #[test]
    fn test_plain_envelope_layout() {
        let key = test_key();
        let inscription = Inscription::new(ContentItem::plain("text/plain", b"Hello, World!".to_vec()));
        let script = build_envelope_script(&key.x_only_public_key(), &[inscription]).unwrap();

        let mut expected = vec![0x20];
        expected.extend_from_slice(&key.x_only_public_key().serialize());
        expected.extend_from_slice(&[0xac, 0x00, 0x63, 0x03]);
        expected.extend_from_slice(b"ord");
        expected.extend_from_slice(&[0x01, 0x01, 0x0a]);
        expected.extend_from_slice(b"text/plain");
        expected.extend_from_slice(&[0x00, 0x0d]);
        expected.extend_from_slice(b"Hello, World!");
        expected.push(0x68);
        assert_eq!(script.as_bytes(), expected.as_slice());
    }

    #[test]
    fn test_pointer_only_when_offset_positive() {
        let key = test_key().x_only_public_key();
        let at_zero = Inscription::new(ContentItem::plain("text/plain", b"a".to_vec()));
        let at_330 = at_zero.clone().with_offset(330);

        let zero_pushes = pushes(&build_envelope_script(&key, &[at_zero]).unwrap());
        assert!(!zero_pushes.contains(&vec![TAG_POINTER]));

        let script = build_envelope_script(&key, &[at_330]).unwrap();
        let p = pushes(&script);
        let idx = p.iter().position(|x| x == &vec![TAG_POINTER]).unwrap();
        assert_eq!(p[idx + 1], vec![0x4a, 0x01]);
    }

    #[test]
    fn test_empty_payload_pushes_zero_bytes() {
        let key = test_key().x_only_public_key();
        let script =
            build_envelope_script(&key, &[Inscription::new(ContentItem::plain("text/plain", vec![]))])
                .unwrap();
        let bytes = script.as_bytes();
        // ... OP_0 (body tag) OP_0 (empty body) OP_ENDIF
        assert_eq!(&bytes[bytes.len() - 3..], &[0x00, 0x00, 0x68]);
    }

    #[test]
    fn test_large_payload_is_chunked() {
        let key = test_key().x_only_public_key();
        let data = vec![0xABu8; 1_100];
        let script = build_envelope_script(
            &key,
            &[Inscription::new(ContentItem::plain("application/octet-stream", data))],
        )
        .unwrap();
        let sizes: Vec<usize> = pushes(&script).iter().map(Vec::len).collect();
        assert!(sizes.ends_with(&[0, 520, 520, 60]));
    }

    #[test]
    fn test_relation_linked_carries_reference() {
        let key = test_key().x_only_public_key();
        let content = ContentItem::RelationLinked {
            mimetype: "text/html".to_string(),
            payload: b"<p>child</p>".to_vec(),
            related_inscription: related(),
        };
        let p = pushes(&build_envelope_script(&key, &[Inscription::new(content)]).unwrap());
        let idx = p.iter().position(|x| x == &vec![TAG_PARENT]).unwrap();
        assert_eq!(p[idx + 1], related().to_reference_bytes());
        assert!(!p.contains(&vec![TAG_METADATA]));
    }

    #[test]
    fn test_parent_linked_emits_two_groups() {
        let key = test_key().x_only_public_key();
        let content = ContentItem::ParentLinked {
            mimetype: "text/html".to_string(),
            payload: b"main".to_vec(),
            parent_mimetype: "image/png".to_string(),
            parent_payload: vec![0x89, 0x50],
        };
        let script = build_envelope_script(&key, &[Inscription::new(content)]).unwrap();
        let p = pushes(&script);
        assert_eq!(p.iter().filter(|x| x.as_slice() == PROTOCOL_ID).count(), 2);
        let png = p.iter().position(|x| x == b"image/png").unwrap();
        let html = p.iter().position(|x| x == b"text/html").unwrap();
        assert!(html < png);
    }

    #[test]
    fn test_large_metadata_repeats_tag() {
        let key = test_key().x_only_public_key();
        let metadata = serde_json::json!({"description": "x".repeat(700)});
        let cbor = encode_cbor(&metadata).unwrap();
        assert!(cbor.len() > MAX_PUSH_SIZE);
        let inscription = Inscription::new(ContentItem::plain("text/plain", b"gm".to_vec()))
            .with_metadata(metadata);
        let p = pushes(&build_envelope_script(&key, &[inscription]).unwrap());

        let idx = p.iter().position(|x| x == &vec![TAG_METADATA]).unwrap();
        assert_eq!(p[idx + 1], cbor[..MAX_PUSH_SIZE]);
        assert_eq!(p[idx + 2], vec![TAG_METADATA]);
        assert_eq!(p[idx + 3], cbor[MAX_PUSH_SIZE..]);
        assert_eq!(p.iter().filter(|x| *x == &vec![TAG_METADATA]).count(), 2);
    }

    #[test]
    fn test_blog_uses_own_protocol_and_metadata() {
        let key = test_key().x_only_public_key();
        let metadata = serde_json::json!({"title": "first post"});
        let content = ContentItem::Blog {
            related_inscription: related(),
            metadata: metadata.clone(),
        };
        let p = pushes(&build_envelope_script(&key, &[Inscription::new(content)]).unwrap());
        assert!(p.contains(&BLOG_PROTOCOL_ID.to_vec()));
        assert!(!p.contains(&PROTOCOL_ID.to_vec()));
        let idx = p.iter().position(|x| x == &vec![TAG_METADATA]).unwrap();
        assert_eq!(p[idx + 1], encode_cbor(&metadata).unwrap());
        assert!(p.contains(&related().to_reference_bytes()));
    }

    #[test]
    fn test_envelope_is_deterministic() {
        let key = test_key();
        let inscriptions = vec![
            Inscription::new(ContentItem::plain("text/plain", b"one".to_vec())),
            Inscription::new(ContentItem::plain("text/plain", b"two".to_vec())).with_offset(546),
        ];
        let a = Envelope::build(&inscriptions, &key, Network::Bitcoin).unwrap();
        let b = Envelope::build(&inscriptions, &key, Network::Bitcoin).unwrap();
        assert_eq!(a, b);
        assert!(a.funding_address().starts_with("bc1p"));

        let testnet = Envelope::build(&inscriptions, &key, Network::Testnet).unwrap();
        assert_eq!(testnet.script_bytes(), a.script_bytes());
        assert!(testnet.funding_address().starts_with("tb1p"));
    }

    #[test]
    fn test_envelope_fields_are_consistent() {
        let key = test_key();
        let envelope = Envelope::build(
            &[Inscription::new(ContentItem::plain("text/plain", b"x".to_vec()))],
            &key,
            Network::Bitcoin,
        )
        .unwrap();
        assert_eq!(envelope.internal_key().unwrap(), key.x_only_public_key());
        assert_eq!(envelope.control_block_bytes().len(), 33);
        assert_eq!(
            envelope.witness_size(),
            1 + (1 + 64) + (1 + envelope.script_bytes().len()) + (1 + 33)
        );
        assert_eq!(
            envelope.leaf_hash(),
            TapLeafHash::from_script(&envelope.script(), LeafVersion::TapScript)
        );
        let address = crate::address::to_output_script(envelope.funding_address(), Network::Bitcoin)
            .unwrap();
        assert_eq!(address, envelope.output_script());

        let json = serde_json::to_string(&envelope).unwrap();
        assert_eq!(serde_json::from_str::<Envelope>(&json).unwrap(), envelope);
    }

    #[test]
    fn test_empty_inscription_list_rejected() {
        assert!(Envelope::build(&[], &test_key(), Network::Bitcoin).is_err());
    }
}
