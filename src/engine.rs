use std::collections::{HashMap, HashSet};

use bitcoin::{OutPoint, Transaction, TxOut, Txid};
use thiserror::Error;
use tracing::debug;

use crate::cache::OutputCache;
use crate::marker::{self, MarkerPayload};
use crate::provider::TransactionProvider;
use crate::types::{AssetId, ColoredOutput, OutputCategory};

/// Errors raised while coloring outputs.
///
/// Malformed or unbalanced marker outputs are not errors: they downgrade
/// the transaction to uncolored and are only surfaced as diagnostics.
#[derive(Debug, Error)]
pub enum ColoringError {
    /// The provider does not know the requested transaction.
    #[error("transaction {0} not found")]
    TransactionNotFound(Txid),
    /// The requested output index does not exist in the transaction.
    #[error("output index {vout} out of range for transaction {txid}")]
    OutputIndexOutOfRange {
        /// Transaction the output was looked up in.
        txid: Txid,
        /// Requested output index.
        vout: u32,
    },
    /// The transaction provider failed; the underlying error is carried
    /// unchanged.
    #[error("transaction provider error: {0}")]
    Provider(#[source] crate::provider::BoxError),
}

/// The backtracking engine resolving the asset ID and asset quantity of
/// any transaction output.
///
/// The engine is driven by two injected collaborators: a
/// [`TransactionProvider`] delivering raw ancestor transactions and an
/// [`OutputCache`] memoizing per-outpoint coloring results. It performs no
/// other I/O and keeps no state of its own.
pub struct ColoringEngine<P, C> {
    provider: P,
    cache: C,
}

impl<P, C> ColoringEngine<P, C>
where
    P: TransactionProvider,
    C: OutputCache,
{
    /// Creates an engine over a transaction provider and an output cache.
    pub fn new(provider: P, cache: C) -> Self {
        Self { provider, cache }
    }

    /// Returns a reference to the output cache.
    pub fn cache(&self) -> &C {
        &self.cache
    }

    /// Resolves the colored view of the output `vout` of transaction
    /// `txid`, fetching and coloring ancestors as needed.
    ///
    /// Ancestors are walked depth-first with an explicit worklist, so
    /// arbitrarily deep spending chains do not grow the call stack. Every
    /// transaction colored along the way has all of its outputs written to
    /// the cache, which bounds the work to at most one coloring per
    /// outpoint over the cache's lifetime.
    pub async fn get_output(&self, txid: Txid, vout: u32) -> Result<ColoredOutput, ColoringError> {
        if let Some(hit) = self.cache.get(&txid, vout).await {
            return Ok(hit);
        }

        let mut fetched: HashMap<Txid, Transaction> = HashMap::new();
        let mut colored: HashMap<Txid, Vec<ColoredOutput>> = HashMap::new();
        let mut scheduled: HashSet<Txid> = HashSet::from([txid]);
        let mut stack: Vec<Txid> = vec![txid];

        while let Some(&current) = stack.last() {
            if colored.contains_key(&current) {
                stack.pop();
                continue;
            }

            if !fetched.contains_key(&current) {
                let tx = self
                    .provider
                    .get_transaction(&current)
                    .await
                    .map_err(ColoringError::Provider)?
                    .ok_or(ColoringError::TransactionNotFound(current))?;
                fetched.insert(current, tx);
            }
            let tx = &fetched[&current];

            let candidates = marker_candidates(&current, tx);
            if candidates.is_empty() {
                let outputs = tx.output.iter().map(ColoredOutput::uncolored).collect();
                self.commit(current, outputs, &mut colored).await;
                continue;
            }

            // A marker transaction needs every spent output colored first.
            let mut prev_outputs = Vec::with_capacity(tx.input.len());
            let mut missing = Vec::new();
            for input in &tx.input {
                let prev = input.previous_output;
                if let Some(outputs) = colored.get(&prev.txid) {
                    prev_outputs.push(output_at(outputs, prev)?);
                } else if let Some(hit) = self.cache.get(&prev.txid, prev.vout).await {
                    prev_outputs.push(hit);
                } else {
                    missing.push(prev.txid);
                }
            }

            if missing.is_empty() {
                let outputs = color_given_inputs(&current, tx, &candidates, &prev_outputs);
                self.commit(current, outputs, &mut colored).await;
                continue;
            }

            // Push in reverse so the first input's ancestry resolves first.
            let mut progressed = false;
            for dep in missing.into_iter().rev() {
                if scheduled.insert(dep) {
                    stack.push(dep);
                    progressed = true;
                }
            }
            if !progressed {
                // Every missing ancestor is already pending beneath this
                // transaction, which only happens when the provider reports
                // a cyclic ancestry.
                return Err(ColoringError::Provider(
                    format!("cyclic ancestry while coloring {current}").into(),
                ));
            }
        }

        let outputs = colored.remove(&txid).unwrap_or_default();
        outputs
            .into_iter()
            .nth(vout as usize)
            .ok_or(ColoringError::OutputIndexOutOfRange { txid, vout })
    }

    /// Computes the colored view of every output of `transaction`.
    ///
    /// Ancestors are fetched through [`Self::get_output`] only when the
    /// transaction carries a marker candidate. The results of this call are
    /// not cached; only ancestor lookups populate the cache.
    pub async fn color_transaction(
        &self,
        transaction: &Transaction,
    ) -> Result<Vec<ColoredOutput>, ColoringError> {
        let txid = transaction.compute_txid();
        let candidates = marker_candidates(&txid, transaction);
        if candidates.is_empty() {
            return Ok(transaction
                .output
                .iter()
                .map(ColoredOutput::uncolored)
                .collect());
        }

        let mut prev_outputs = Vec::with_capacity(transaction.input.len());
        for input in &transaction.input {
            let prev = input.previous_output;
            prev_outputs.push(self.get_output(prev.txid, prev.vout).await?);
        }

        Ok(color_given_inputs(
            &txid,
            transaction,
            &candidates,
            &prev_outputs,
        ))
    }

    async fn commit(
        &self,
        txid: Txid,
        outputs: Vec<ColoredOutput>,
        colored: &mut HashMap<Txid, Vec<ColoredOutput>>,
    ) {
        for (vout, output) in outputs.iter().enumerate() {
            self.cache.put(txid, vout as u32, output.clone()).await;
        }
        colored.insert(txid, outputs);
    }
}

fn output_at(outputs: &[ColoredOutput], outpoint: OutPoint) -> Result<ColoredOutput, ColoringError> {
    outputs
        .get(outpoint.vout as usize)
        .cloned()
        .ok_or(ColoringError::OutputIndexOutOfRange {
            txid: outpoint.txid,
            vout: outpoint.vout,
        })
}

/// Collects the well-formed marker payloads of a transaction in output
/// order. Structurally malformed payloads with a matching magic are
/// reported on the diagnostic channel and skipped.
fn marker_candidates(txid: &Txid, transaction: &Transaction) -> Vec<(usize, MarkerPayload)> {
    let mut candidates = Vec::new();
    for (index, output) in transaction.output.iter().enumerate() {
        let Some(payload) = marker::parse_script(&output.script_pubkey) else {
            continue;
        };
        match MarkerPayload::deserialize(payload) {
            Ok(Some(parsed)) => candidates.push((index, parsed)),
            Ok(None) => {}
            Err(error) => {
                debug!(%txid, vout = index, %error, "malformed marker payload ignored");
            }
        }
    }
    candidates
}

/// Colors the outputs of a marker transaction given the colored view of
/// its spent outputs. The first candidate whose quantity list satisfies
/// the coloring rules wins; if none does, every output is uncolored.
fn color_given_inputs(
    txid: &Txid,
    transaction: &Transaction,
    candidates: &[(usize, MarkerPayload)],
    inputs: &[ColoredOutput],
) -> Vec<ColoredOutput> {
    for (marker_index, payload) in candidates {
        if let Some(outputs) =
            compute_asset_ids(inputs, *marker_index, &transaction.output, payload)
        {
            return outputs;
        }
        debug!(%txid, vout = *marker_index, "marker rejected by coloring rules");
    }
    transaction
        .output
        .iter()
        .map(ColoredOutput::uncolored)
        .collect()
}

/// Applies the Open Assets coloring rules for one marker placement.
///
/// Returns `None` when the marker is invalid for this transaction: more
/// quantities than non-marker outputs, transfer demand exceeding the
/// colored input supply, or one transfer output spanning two assets.
fn compute_asset_ids(
    inputs: &[ColoredOutput],
    marker_index: usize,
    outputs: &[TxOut],
    payload: &MarkerPayload,
) -> Option<Vec<ColoredOutput>> {
    let quantities = &payload.asset_quantities;
    if quantities.len() > outputs.len().saturating_sub(1) {
        return None;
    }

    let mut result = Vec::with_capacity(outputs.len());

    // Issuance region: the asset is bound to the script spent by input 0.
    let issuance_asset_id = inputs
        .first()
        .map(|input| AssetId::from_script(&input.script_pubkey));
    for (index, output) in outputs.iter().take(marker_index).enumerate() {
        let quantity = quantities.get(index).copied().unwrap_or(0);
        let asset_id = if quantity > 0 {
            // A non-zero issuance needs an input to derive the asset from.
            Some(issuance_asset_id?)
        } else {
            None
        };
        result.push(ColoredOutput::colored(
            output,
            asset_id,
            quantity,
            OutputCategory::Issuance,
        ));
    }

    result.push(ColoredOutput::uncolored(&outputs[marker_index]));

    // Transfer region: the colored input units form a tape consumed in
    // order; each output must draw a run of identical-asset units.
    let mut input_iter = inputs.iter();
    let mut input_units_left: u64 = 0;
    let mut current_asset: Option<AssetId> = None;
    for index in marker_index + 1..outputs.len() {
        let (quantity, category) = if index <= quantities.len() {
            (quantities[index - 1], OutputCategory::Transfer)
        } else {
            (0, OutputCategory::Uncolored)
        };

        let mut units_left = quantity;
        let mut asset_id: Option<AssetId> = None;
        while units_left > 0 {
            if input_units_left == 0 {
                // Inputs exhausted before the demand was met.
                let input = input_iter.next()?;
                current_asset = input.asset_id;
                input_units_left = if input.asset_id.is_some() {
                    input.asset_quantity
                } else {
                    0
                };
                continue;
            }

            let progress = input_units_left.min(units_left);
            units_left -= progress;
            input_units_left -= progress;
            match (asset_id, current_asset) {
                (None, found) => asset_id = found,
                (Some(assigned), Some(found)) if assigned != found => return None,
                _ => {}
            }
        }

        result.push(ColoredOutput::colored(
            &outputs[index],
            asset_id,
            quantity,
            category,
        ));
    }

    Some(
        result
            .into_iter()
            .map(|output| output.carrying_metadata(&payload.metadata))
            .collect(),
    )
}
