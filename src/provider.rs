use async_trait::async_trait;
use bitcoin::{Transaction, Txid};

/// Error type carried through the engine unchanged by provider failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Source of raw Bitcoin transactions for the coloring engine.
///
/// Implementations typically wrap a node RPC client or a block index. The
/// engine only requires lookup by transaction ID; `Ok(None)` means the
/// transaction is unknown to the source, while `Err` reports a transport
/// failure and aborts the coloring call.
#[async_trait]
pub trait TransactionProvider: Send + Sync {
    /// Fetches a transaction by its ID.
    async fn get_transaction(&self, txid: &Txid) -> Result<Option<Transaction>, BoxError>;
}
