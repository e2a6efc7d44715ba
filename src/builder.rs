use bitcoin::absolute::LockTime;
use bitcoin::transaction::Version;
use bitcoin::{Amount, Script, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Witness};
use thiserror::Error;
use tracing::debug;

use crate::config::OpenAssetsConfig;
use crate::marker::{MarkerError, MarkerPayload};
use crate::types::{AssetId, SpendableOutput, TransferParameters};

/// Errors raised while planning a transaction.
#[derive(Debug, Error)]
pub enum BuildError {
    /// The unspent outputs cannot cover the requested satoshi amount.
    #[error("insufficient funds: need {required} sat, have {available} sat")]
    InsufficientFunds {
        /// Satoshis needed, including fees and dust obligations.
        required: u64,
        /// Satoshis available across the eligible unspent outputs.
        available: u64,
    },
    /// The unspent outputs cannot cover the requested asset quantity.
    #[error("insufficient asset quantity for asset {asset_id}: need {required}, have {available}")]
    InsufficientAssets {
        /// Asset being collected.
        asset_id: AssetId,
        /// Units needed.
        required: u64,
        /// Units available across the eligible unspent outputs.
        available: u64,
    },
    /// A requested output value sits below the dust floor.
    #[error("output value {value} sat is below the dust limit {dust_limit} sat")]
    DustOutput {
        /// Requested satoshi value.
        value: u64,
        /// Configured floor.
        dust_limit: u64,
    },
    /// The marker output could not be assembled.
    #[error("marker output error: {0}")]
    Marker(#[from] MarkerError),
}

/// Planner for unsigned Open Assets transactions.
///
/// The builder consumes spendable outputs already colored by the engine and
/// lays out inputs and outputs so that asset quantities are conserved, the
/// satoshi ledger balances against the declared fees, and every
/// non-OP_RETURN output clears the configured dust floor. Inputs carry the
/// spent output's script as a placeholder until signing; the builder never
/// signs or broadcasts.
///
/// Coin selection is greedy in the iteration order of the supplied unspent
/// list. Callers curate that order.
#[derive(Debug, Clone, Default)]
pub struct TransactionBuilder {
    config: OpenAssetsConfig,
}

impl TransactionBuilder {
    /// Creates a builder with the given configuration.
    pub fn new(config: OpenAssetsConfig) -> Self {
        Self { config }
    }

    /// Returns a reference to the builder configuration.
    pub fn config(&self) -> &OpenAssetsConfig {
        &self.config
    }

    /// Creates a transaction issuing `issuance.amount` units of a new asset
    /// to `issuance.to_script`.
    ///
    /// The asset ID is bound to the script of the first input, so only
    /// outputs held on the issuance script should be supplied. Layout: the
    /// issuance output at the dust floor, the marker carrying the issued
    /// quantity and `metadata`, then the bitcoin change.
    pub fn issue(
        &self,
        issuance: &TransferParameters,
        metadata: &[u8],
        fees: u64,
    ) -> Result<Transaction, BuildError> {
        let dust = self.config.dust_limit;
        let target = dust.saturating_mul(2).saturating_add(fees);
        let (inputs, total) = self.collect_uncolored(&issuance.unspent_outputs, target)?;

        let outputs = vec![
            self.colored_output(&issuance.to_script),
            self.marker_output(&[issuance.amount], metadata)?,
            self.uncolored_output(&issuance.change_script, total - dust - fees)?,
        ];

        Ok(build_transaction(inputs, outputs))
    }

    /// Creates a transaction moving assets and bitcoins in one pass.
    ///
    /// Each asset spec contributes a transfer output and, when the greedy
    /// collection overshoots, an asset change output. Bitcoins left over
    /// after the asset outputs fund `btc.amount` and the fees; any shortfall
    /// is collected from `btc.unspent_outputs` (uncolored outputs only).
    /// Sub-dust bitcoin change is folded into the fees rather than emitted.
    pub fn transfer(
        &self,
        asset_specs: &[(AssetId, TransferParameters)],
        btc: &TransferParameters,
        fees: u64,
    ) -> Result<Transaction, BuildError> {
        let mut inputs: Vec<SpendableOutput> = Vec::new();
        let mut outputs: Vec<TxOut> = Vec::new();
        let mut asset_quantities: Vec<u64> = Vec::new();

        for (asset_id, spec) in asset_specs {
            let (collected, collected_quantity) =
                collect_colored(&spec.unspent_outputs, *asset_id, spec.amount)?;
            inputs.extend(collected);
            outputs.push(self.colored_output(&spec.to_script));
            asset_quantities.push(spec.amount);

            if collected_quantity > spec.amount {
                outputs.push(self.colored_output(&spec.change_script));
                asset_quantities.push(collected_quantity - spec.amount);
            }
        }

        let input_total: i128 = inputs
            .iter()
            .map(|input| i128::from(input.output.value.to_sat()))
            .sum();
        let output_total: i128 = outputs
            .iter()
            .map(|output| i128::from(output.value.to_sat()))
            .sum();
        let mut btc_excess = input_total - output_total;

        let needed = i128::from(btc.amount) + i128::from(fees);
        if btc_excess < needed {
            // The asset inputs do not carry enough bitcoin.
            let shortfall = (needed - btc_excess) as u64;
            let (extra, extra_total) = self.collect_uncolored(&btc.unspent_outputs, shortfall)?;
            inputs.extend(extra);
            btc_excess += i128::from(extra_total);
        }

        let change = btc_excess - needed;
        if change >= i128::from(self.config.dust_limit) {
            outputs.push(self.uncolored_output(&btc.change_script, change as u64)?);
        } else if change > 0 {
            debug!(residual = change as u64, "sub-dust change folded into fees");
        }

        if btc.amount > 0 {
            outputs.push(self.uncolored_output(&btc.to_script, btc.amount)?);
        }

        if !asset_quantities.is_empty() {
            outputs.insert(0, self.marker_output(&asset_quantities, b"")?);
        }

        Ok(build_transaction(inputs, outputs))
    }

    /// Creates a transaction sending `transfer_spec.amount` units of
    /// `asset_id`, returning asset change to `transfer_spec.change_script`
    /// and bitcoin change to `btc_change_script`.
    pub fn transfer_assets(
        &self,
        asset_id: AssetId,
        transfer_spec: &TransferParameters,
        btc_change_script: ScriptBuf,
        fees: u64,
    ) -> Result<Transaction, BuildError> {
        let btc = TransferParameters::new(
            transfer_spec.unspent_outputs.clone(),
            btc_change_script.clone(),
            btc_change_script,
            0,
        );
        self.transfer(&[(asset_id, transfer_spec.clone())], &btc, fees)
    }

    /// Creates a plain bitcoin transaction. Colored outputs in the unspent
    /// list are never selected.
    pub fn transfer_bitcoin(
        &self,
        transfer_spec: &TransferParameters,
        fees: u64,
    ) -> Result<Transaction, BuildError> {
        self.transfer(&[], transfer_spec, fees)
    }

    /// Creates a transaction swapping bitcoins against an asset. Each side
    /// supplies its own unspent outputs; the bitcoin side funds the fees.
    pub fn btc_asset_swap(
        &self,
        btc_spec: &TransferParameters,
        asset_id: AssetId,
        asset_spec: &TransferParameters,
        fees: u64,
    ) -> Result<Transaction, BuildError> {
        self.transfer(&[(asset_id, asset_spec.clone())], btc_spec, fees)
    }

    /// Creates a transaction swapping one asset against another. The first
    /// party funds the fees and receives any bitcoin change.
    pub fn asset_asset_swap(
        &self,
        asset1_id: AssetId,
        asset1_spec: &TransferParameters,
        asset2_id: AssetId,
        asset2_spec: &TransferParameters,
        fees: u64,
    ) -> Result<Transaction, BuildError> {
        let btc = TransferParameters::new(
            asset1_spec.unspent_outputs.clone(),
            asset1_spec.to_script.clone(),
            asset1_spec.change_script.clone(),
            0,
        );
        self.transfer(
            &[
                (asset1_id, asset1_spec.clone()),
                (asset2_id, asset2_spec.clone()),
            ],
            &btc,
            fees,
        )
    }

    /// Greedily collects uncolored outputs worth at least `target` satoshis.
    ///
    /// Collection runs past the target while the surplus would be sub-dust,
    /// so change stays spendable whenever the list allows it. Exhausting the
    /// list with the target met is accepted; the caller folds the sub-dust
    /// surplus into the fees.
    fn collect_uncolored(
        &self,
        unspent_outputs: &[SpendableOutput],
        target: u64,
    ) -> Result<(Vec<SpendableOutput>, u64), BuildError> {
        let dust = self.config.dust_limit;
        let mut collected = Vec::new();
        let mut total: u64 = 0;

        for unspent in unspent_outputs {
            if unspent.output.asset_id.is_none() {
                collected.push(unspent.clone());
                total = total.saturating_add(unspent.output.value.to_sat());
            }

            if total == target || total >= target.saturating_add(dust) {
                return Ok((collected, total));
            }
        }

        if total >= target {
            return Ok((collected, total));
        }

        Err(BuildError::InsufficientFunds {
            required: target,
            available: total,
        })
    }

    fn colored_output(&self, script: &Script) -> TxOut {
        TxOut {
            value: Amount::from_sat(self.config.dust_limit),
            script_pubkey: script.to_owned(),
        }
    }

    fn uncolored_output(&self, script: &Script, value: u64) -> Result<TxOut, BuildError> {
        if value < self.config.dust_limit {
            return Err(BuildError::DustOutput {
                value,
                dust_limit: self.config.dust_limit,
            });
        }
        Ok(TxOut {
            value: Amount::from_sat(value),
            script_pubkey: script.to_owned(),
        })
    }

    fn marker_output(&self, asset_quantities: &[u64], metadata: &[u8]) -> Result<TxOut, BuildError> {
        let payload = MarkerPayload::new(asset_quantities.to_vec(), metadata.to_vec());
        Ok(TxOut {
            value: Amount::from_sat(0),
            script_pubkey: payload.to_script()?,
        })
    }
}

/// Greedily collects outputs of `asset_id` worth at least `quantity` units.
fn collect_colored(
    unspent_outputs: &[SpendableOutput],
    asset_id: AssetId,
    quantity: u64,
) -> Result<(Vec<SpendableOutput>, u64), BuildError> {
    let mut collected = Vec::new();
    let mut total: u64 = 0;

    for unspent in unspent_outputs {
        if unspent.output.asset_id == Some(asset_id) {
            collected.push(unspent.clone());
            total = total.saturating_add(unspent.output.asset_quantity);
        }

        if total >= quantity {
            return Ok((collected, total));
        }
    }

    if total >= quantity {
        return Ok((collected, total));
    }

    Err(BuildError::InsufficientAssets {
        asset_id,
        required: quantity,
        available: total,
    })
}

/// Assembles the unsigned transaction. Inputs carry the spent output's
/// script as `script_sig` until a signer replaces it.
fn build_transaction(inputs: Vec<SpendableOutput>, outputs: Vec<TxOut>) -> Transaction {
    Transaction {
        version: Version::TWO,
        lock_time: LockTime::ZERO,
        input: inputs
            .into_iter()
            .map(|spendable| TxIn {
                previous_output: spendable.outpoint,
                script_sig: spendable.output.script_pubkey,
                sequence: Sequence::MAX,
                witness: Witness::new(),
            })
            .collect(),
        output: outputs,
    }
}
