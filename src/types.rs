use std::fmt;

use bitcoin::hashes::{hash160, Hash};
use bitcoin::{Amount, OutPoint, Script, ScriptBuf, TxOut};

/// Largest asset quantity representable in a marker output (2^63 - 1).
pub const MAX_ASSET_QUANTITY: u64 = (1 << 63) - 1;

/// 20-byte identifier of an Open Assets asset.
///
/// Derived from the output script spent by the first input of the issuing
/// transaction: `RIPEMD160(SHA256(script))`. Two outputs carry the same
/// asset if and only if their asset IDs are equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AssetId([u8; 20]);

impl AssetId {
    /// Derives the asset ID bound to an issuance script.
    pub fn from_script(script: &Script) -> Self {
        Self(hash160::Hash::hash(script.as_bytes()).to_byte_array())
    }

    /// Wraps a raw 20-byte identifier.
    pub fn from_byte_array(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    /// Returns the raw 20-byte identifier.
    pub fn as_byte_array(&self) -> &[u8; 20] {
        &self.0
    }
}

impl From<[u8; 20]> for AssetId {
    fn from(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

/// Position of an output relative to the marker output of its transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputCategory {
    /// The output carries no asset. This includes the marker output itself
    /// and every output of a transaction without a valid marker.
    #[default]
    Uncolored,
    /// The output sits before the marker output.
    Issuance,
    /// The output sits after the marker output, within the quantity list.
    Transfer,
}

/// A Bitcoin transaction output together with the asset attached to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColoredOutput {
    /// Satoshi value of the output.
    pub value: Amount,
    /// Output script.
    pub script_pubkey: ScriptBuf,
    /// ID of the asset carried by the output, if any.
    pub asset_id: Option<AssetId>,
    /// Number of asset units carried by the output (0 when uncolored).
    pub asset_quantity: u64,
    /// Position of the output relative to the marker output.
    pub category: OutputCategory,
    /// Metadata of the transaction's marker output, empty when there is none.
    pub metadata: Vec<u8>,
}

impl ColoredOutput {
    /// Builds an uncolored view of a raw transaction output.
    pub fn uncolored(output: &TxOut) -> Self {
        Self {
            value: output.value,
            script_pubkey: output.script_pubkey.clone(),
            asset_id: None,
            asset_quantity: 0,
            category: OutputCategory::Uncolored,
            metadata: Vec::new(),
        }
    }

    /// Builds a colored view of a raw transaction output.
    pub fn colored(
        output: &TxOut,
        asset_id: Option<AssetId>,
        asset_quantity: u64,
        category: OutputCategory,
    ) -> Self {
        Self {
            value: output.value,
            script_pubkey: output.script_pubkey.clone(),
            asset_id,
            asset_quantity,
            category,
            metadata: Vec::new(),
        }
    }

    /// Attaches the marker metadata of the enclosing transaction.
    pub(crate) fn carrying_metadata(mut self, metadata: &[u8]) -> Self {
        self.metadata = metadata.to_vec();
        self
    }
}

/// An unspent colored output together with the outpoint that locates it.
#[derive(Debug, Clone)]
pub struct SpendableOutput {
    /// Outpoint referencing the output.
    pub outpoint: OutPoint,
    /// The colored output itself.
    pub output: ColoredOutput,
}

impl SpendableOutput {
    /// Pairs a colored output with its outpoint.
    pub fn new(outpoint: OutPoint, output: ColoredOutput) -> Self {
        Self { outpoint, output }
    }
}

/// Details of a single bitcoin or asset transfer.
#[derive(Debug, Clone)]
pub struct TransferParameters {
    /// Unspent outputs available to fund the transfer.
    pub unspent_outputs: Vec<SpendableOutput>,
    /// Script receiving the assets or bitcoins. Only consulted when
    /// `amount` is non-zero.
    pub to_script: ScriptBuf,
    /// Script receiving any remaining change.
    pub change_script: ScriptBuf,
    /// Asset quantity or satoshi amount being sent.
    pub amount: u64,
}

impl TransferParameters {
    /// Creates the parameters for a transfer.
    pub fn new(
        unspent_outputs: Vec<SpendableOutput>,
        to_script: ScriptBuf,
        change_script: ScriptBuf,
        amount: u64,
    ) -> Self {
        Self {
            unspent_outputs,
            to_script,
            change_script,
            amount,
        }
    }
}
