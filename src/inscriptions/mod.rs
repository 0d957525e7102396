//! Inscription support for Bitcoin Ordinals
//!
//! This module builds the taproot envelope that carries inscription content
//! and signs the reveal transaction spending it.
//!
//! See: https://docs.ordinals.com/inscriptions.html

mod content;
mod envelope;
mod key;
mod reveal;

pub use content::{
    decode_offset, encode_offset, encode_cbor, layout_offsets, ContentItem, Inscription,
    InscriptionId, BLOG_PROTOCOL_ID, PROTOCOL_ID, TAG_CONTENT_TYPE, TAG_METADATA, TAG_PARENT,
    TAG_POINTER,
};
pub use envelope::{build_envelope_script, script_path_witness_size, Envelope};
pub use key::EphemeralKey;
pub use reveal::{
    build_reveal_transaction, required_commit_value, reveal_fee, reveal_outputs,
    sign_reveal_transaction,
};
