pub mod error;
pub mod types;
pub mod watcher;

use crate::{
    oasis::{AccountAddress, BaseUnits, NodeConnection, ParaTime, quantity::Quantity},
    shared::signer::TransactionSigner,
};
use error::TransactionError;
use std::{sync::Arc, time::Duration};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use types::{
    SignedTransaction, UnsignedConsensusTransaction, UnsignedRuntimeTransaction,
    consensus_signature_context, runtime_signature_context,
};
use watcher::DepositWatcher;

/// Builds, signs and submits the faucet's transactions on behalf of its funding account.
pub struct TransactionSubmitter<N: NodeConnection, S: TransactionSigner> {
    node: Arc<N>,
    signer: Arc<S>,
    confirmation_timeout: Duration,
}

impl<N: NodeConnection, S: TransactionSigner> TransactionSubmitter<N, S> {
    pub fn new(node: Arc<N>, signer: Arc<S>, confirmation_timeout: Duration) -> Self {
        Self {
            node,
            signer,
            confirmation_timeout,
        }
    }

    pub fn node(&self) -> &Arc<N> {
        &self.node
    }

    pub fn funding_address(&self) -> &AccountAddress {
        self.signer.address()
    }

    async fn chain_context(&self) -> Result<String, TransactionError> {
        self.node.chain_context().await.map_err(|e| {
            error!("tx: failed to query chain context: {e}");
            TransactionError::ChainContextQueryFailed
        })
    }

    async fn sign(&self, context: &str, raw: &[u8]) -> Result<SignedTransaction, TransactionError> {
        let signature = self.signer.sign(context, raw).await.map_err(|e| {
            error!("tx: failed to sign transaction: {e}");
            TransactionError::SigningFailed
        })?;
        Ok(SignedTransaction::new(
            raw,
            self.signer.public_key(),
            &signature,
        ))
    }

    /// Fills in nonce and gas, signs and submits a consensus transaction. Success means the node
    /// accepted it.
    pub async fn sign_and_submit_consensus_tx(
        &self,
        mut tx: UnsignedConsensusTransaction,
    ) -> Result<(), TransactionError> {
        tx.nonce = self
            .node
            .consensus_signer_nonce(self.signer.address())
            .await
            .map_err(|e| {
                error!("tx/consensus: failed to query signer nonce: {e}");
                TransactionError::NonceQueryFailed
            })?;

        tx.fee.gas = self
            .node
            .consensus_estimate_gas(self.signer.public_key(), &tx)
            .await
            .map_err(|e| {
                error!("tx/consensus: failed to estimate gas: {e}");
                TransactionError::EstimationFailed
            })?;

        let chain_context = self.chain_context().await?;
        let raw = tx.encode().map_err(|e| {
            error!("tx/consensus: {e}");
            TransactionError::EncodingFailed
        })?;
        let signed = self
            .sign(&consensus_signature_context(&chain_context), &raw)
            .await?;

        self.node.consensus_submit_tx(&signed).await.map_err(|e| {
            error!("tx/consensus: failed to submit transaction: {e}");
            TransactionError::SubmissionFailed
        })?;

        debug!(
            "tx/consensus: submitted transaction with nonce {} and gas {}",
            tx.nonce, tx.fee.gas
        );
        Ok(())
    }

    pub async fn submit_consensus_transfer(
        &self,
        to: &AccountAddress,
        amount: Quantity,
    ) -> Result<(), TransactionError> {
        self.sign_and_submit_consensus_tx(UnsignedConsensusTransaction::new_transfer(
            to.clone(),
            amount,
        ))
        .await
    }

    pub async fn submit_allowance_increase(
        &self,
        beneficiary: &AccountAddress,
        amount_change: Quantity,
    ) -> Result<(), TransactionError> {
        self.sign_and_submit_consensus_tx(UnsignedConsensusTransaction::new_allow(
            beneficiary.clone(),
            amount_change,
        ))
        .await
    }

    /// Signs and submits a runtime transaction, returning a watcher for its deposit event.
    ///
    /// The event subscription is opened before submission, so the round that executes the
    /// transaction cannot be missed, and is cancelled again when submission fails.
    pub async fn sign_and_submit_meta_tx(
        &self,
        paratime: &ParaTime,
        mut tx: UnsignedRuntimeTransaction,
    ) -> Result<DepositWatcher, TransactionError> {
        let nonce = self
            .node
            .runtime_nonce(paratime, self.signer.address())
            .await
            .map_err(|e| {
                error!("tx/meta: failed to query nonce on {}: {e}", paratime.name);
                TransactionError::NonceQueryFailed
            })?;
        tx.append_auth_signature(self.signer.public_key(), nonce);

        tx.auth_info.fee.gas = self
            .node
            .runtime_estimate_gas(paratime, &tx)
            .await
            .map_err(|e| {
                error!("tx/meta: failed to estimate gas on {}: {e}", paratime.name);
                TransactionError::EstimationFailed
            })?;

        let chain_context = self.chain_context().await?;
        let raw = tx.encode().map_err(|e| {
            error!("tx/meta: {e}");
            TransactionError::EncodingFailed
        })?;
        let signed = self
            .sign(&runtime_signature_context(&paratime.id, &chain_context), &raw)
            .await?;

        let watch_cancel_token = CancellationToken::new();
        let events = self
            .node
            .watch_runtime_events(paratime, watch_cancel_token.clone())
            .await
            .map_err(|e| {
                error!("tx/meta: failed to watch events on {}: {e}", paratime.name);
                TransactionError::WatchEventsFailed
            })?;
        let watcher = DepositWatcher::new(
            events,
            self.signer.address().clone(),
            nonce,
            self.confirmation_timeout,
            watch_cancel_token,
        );

        // Dropping the watcher on any error below tears the subscription down.
        let meta = self
            .node
            .runtime_submit_tx_meta(paratime, &signed)
            .await
            .map_err(|e| {
                error!("tx/meta: failed to submit transaction on {}: {e}", paratime.name);
                TransactionError::SubmissionFailed
            })?;
        if let Some(check_tx_error) = meta.check_tx_error {
            error!(
                "tx/meta: transaction rejected on {}: module {} code {}: {}",
                paratime.name, check_tx_error.module, check_tx_error.code, check_tx_error.message
            );
            return Err(TransactionError::CheckTxFailed(check_tx_error));
        }

        info!(
            "tx/meta: submitted transaction with nonce {} on {} in round {}",
            nonce, paratime.name, meta.round
        );
        Ok(watcher)
    }

    pub async fn submit_meta_deposit(
        &self,
        paratime: &ParaTime,
        to: &AccountAddress,
        amount: BaseUnits,
    ) -> Result<DepositWatcher, TransactionError> {
        self.sign_and_submit_meta_tx(
            paratime,
            UnsignedRuntimeTransaction::new_deposit(to.clone(), amount),
        )
        .await
    }
}
