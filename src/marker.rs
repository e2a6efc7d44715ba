use bitcoin::consensus::encode::VarInt;
use bitcoin::consensus::{Decodable, Encodable};
use bitcoin::opcodes;
use bitcoin::script::{Instruction, PushBytesBuf};
use bitcoin::{Script, ScriptBuf};
use thiserror::Error;

use crate::leb128::{self, Leb128Error};

/// Two-byte tag opening every Open Assets marker payload (`"OA"`).
pub const MARKER_MAGIC: [u8; 2] = [0x4f, 0x41];

/// Protocol version carried after the magic, serialized little-endian.
pub const MARKER_VERSION: u16 = 1;

/// Structural failures of a payload whose magic and version matched.
///
/// A payload that does not start with the magic/version prefix is simply
/// not a marker; it never produces one of these errors.
#[derive(Debug, Error)]
pub enum MarkerError {
    /// The asset quantity count is missing or badly encoded.
    #[error("malformed asset quantity count")]
    BadQuantityCount,
    /// An asset quantity is truncated or exceeds the quantity domain.
    #[error(transparent)]
    Leb128(#[from] Leb128Error),
    /// The metadata length field is missing or badly encoded.
    #[error("malformed metadata length")]
    BadMetadataLength,
    /// The payload ends before the declared metadata length.
    #[error("truncated marker payload")]
    Truncated,
    /// Bytes remain after the metadata field.
    #[error("trailing bytes after marker payload")]
    TrailingData,
    /// The serialized payload does not fit a script push.
    #[error("marker payload too large for an OP_RETURN push")]
    PayloadTooLarge,
    /// Writing the serialized form failed.
    #[error("payload serialization failed: {0}")]
    Io(#[from] bitcoin::io::Error),
}

/// Payload of an Open Assets marker output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerPayload {
    /// Asset quantity of every non-marker output, in positional order.
    pub asset_quantities: Vec<u64>,
    /// Issuer-defined metadata.
    pub metadata: Vec<u8>,
}

impl MarkerPayload {
    /// Creates a marker payload.
    pub fn new(asset_quantities: Vec<u64>, metadata: Vec<u8>) -> Self {
        Self {
            asset_quantities,
            metadata,
        }
    }

    /// Serializes the payload: magic, version, CompactSize quantity count,
    /// LEB128 quantities, CompactSize metadata length, metadata bytes.
    pub fn serialize(&self) -> Result<Vec<u8>, MarkerError> {
        let mut buf = Vec::with_capacity(8 + self.asset_quantities.len() + self.metadata.len());
        buf.extend_from_slice(&MARKER_MAGIC);
        buf.extend_from_slice(&MARKER_VERSION.to_le_bytes());

        VarInt(self.asset_quantities.len() as u64).consensus_encode(&mut buf)?;
        for &quantity in &self.asset_quantities {
            leb128::encode(quantity, &mut buf)?;
        }

        VarInt(self.metadata.len() as u64).consensus_encode(&mut buf)?;
        buf.extend_from_slice(&self.metadata);

        Ok(buf)
    }

    /// Deserializes a marker payload.
    ///
    /// Returns `Ok(None)` when the payload does not open with the Open
    /// Assets magic and version (the bytes belong to some other protocol),
    /// and an error when the prefix matches but the structure is malformed.
    pub fn deserialize(payload: &[u8]) -> Result<Option<Self>, MarkerError> {
        if payload.len() < 4 {
            return Ok(None);
        }
        let (prefix, rest) = payload.split_at(4);
        if prefix[..2] != MARKER_MAGIC {
            return Ok(None);
        }
        if u16::from_le_bytes([prefix[2], prefix[3]]) != MARKER_VERSION {
            return Ok(None);
        }

        let mut cursor = rest;

        let count = VarInt::consensus_decode(&mut cursor)
            .map_err(|_| MarkerError::BadQuantityCount)?
            .0;
        let mut asset_quantities = Vec::new();
        for _ in 0..count {
            asset_quantities.push(leb128::decode(&mut cursor)?);
        }

        let metadata_len = VarInt::consensus_decode(&mut cursor)
            .map_err(|_| MarkerError::BadMetadataLength)?
            .0;
        let metadata_len = usize::try_from(metadata_len).map_err(|_| MarkerError::Truncated)?;
        if cursor.len() < metadata_len {
            return Err(MarkerError::Truncated);
        }
        let (metadata, remainder) = cursor.split_at(metadata_len);
        if !remainder.is_empty() {
            return Err(MarkerError::TrailingData);
        }

        Ok(Some(Self {
            asset_quantities,
            metadata: metadata.to_vec(),
        }))
    }

    /// Builds the complete marker output script for this payload.
    pub fn to_script(&self) -> Result<ScriptBuf, MarkerError> {
        build_script(self.serialize()?)
    }
}

/// Wraps a serialized payload into an `OP_RETURN` script.
pub fn build_script(payload: Vec<u8>) -> Result<ScriptBuf, MarkerError> {
    let push = PushBytesBuf::try_from(payload).map_err(|_| MarkerError::PayloadTooLarge)?;
    Ok(ScriptBuf::builder()
        .push_opcode(opcodes::all::OP_RETURN)
        .push_slice(push)
        .into_script())
}

/// Extracts the pushed payload from a candidate marker script.
///
/// The script must be exactly `OP_RETURN` followed by one push (a direct
/// push or OP_PUSHDATA1/2/4, minimality not required) and nothing else.
pub fn parse_script(script: &Script) -> Option<&[u8]> {
    let mut instructions = script.instructions();

    match instructions.next()?.ok()? {
        Instruction::Op(opcodes::all::OP_RETURN) => {}
        _ => return None,
    }

    let payload = match instructions.next()?.ok()? {
        Instruction::PushBytes(bytes) => bytes.as_bytes(),
        _ => return None,
    };

    if instructions.next().is_some() {
        return None;
    }

    Some(payload)
}
