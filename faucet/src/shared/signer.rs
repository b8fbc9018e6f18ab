use crate::oasis::AccountAddress;
use anyhow::Error;
use async_trait::async_trait;

/// Holder of the faucet's long-lived key.
#[async_trait]
pub trait TransactionSigner: Send + Sync + 'static {
    /// Hex encoded public key.
    fn public_key(&self) -> &str;

    /// Address of the funding account controlled by the key.
    fn address(&self) -> &AccountAddress;

    /// Signs `message` under the domain separation `context`.
    async fn sign(&self, context: &str, message: &[u8]) -> Result<Vec<u8>, Error>;
}
