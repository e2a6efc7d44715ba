//! # openassets-protocol
//!
//! A Rust implementation of the **Open Assets** colored-coin protocol — a
//! system that records the issuance and transfer of user-defined assets
//! inside ordinary Bitcoin transactions through OP_RETURN marker outputs.
//!
//! ## Overview
//!
//! This library provides a transport-agnostic and storage-agnostic
//! implementation of the Open Assets protocol. It answers two questions:
//! which asset, and how many units, a given transaction output carries
//! (the coloring engine), and how to assemble unsigned transactions that
//! issue, transfer, or swap assets (the transaction builder). Fetching
//! transactions, caching coloring results, signing, and broadcasting are
//! left to the integrating application.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use openassets_protocol::{
//!     ColoringEngine, MemoryCache, OpenAssetsConfig, TransactionBuilder,
//! };
//!
//! let engine = ColoringEngine::new(provider, MemoryCache::new());
//!
//! // Resolve the asset attached to an output (fetches ancestors lazily).
//! let output = engine.get_output(txid, vout).await?;
//!
//! // Plan an unsigned issuance transaction.
//! let builder = TransactionBuilder::new(OpenAssetsConfig::default());
//! let transaction = builder.issue(&issuance_params, b"metadata", fees)?;
//! ```

/// Unsigned transaction planning.
pub mod builder;
/// Coloring result cache abstraction.
pub mod cache;
/// Protocol configuration.
pub mod config;
/// Core coloring engine.
pub mod engine;
/// LEB128 integer codec used inside marker payloads.
pub mod leb128;
/// Marker output payload codec.
pub mod marker;
/// Transaction source abstraction.
pub mod provider;
/// Core types used by the protocol.
pub mod types;

pub use builder::{BuildError, TransactionBuilder};
pub use cache::{MemoryCache, NoopCache, OutputCache};
pub use config::OpenAssetsConfig;
pub use engine::{ColoringEngine, ColoringError};
pub use marker::{MarkerError, MarkerPayload};
pub use provider::{BoxError, TransactionProvider};
pub use types::{
    AssetId, ColoredOutput, OutputCategory, SpendableOutput, TransferParameters,
    MAX_ASSET_QUANTITY,
};
