use super::signer::TransactionSigner;
use crate::{oasis::AccountAddress, utils::rpc_client::JSONRPCClient};
use anyhow::Error;
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

/// Signer backed by a remote signing service holding the faucet key.
pub struct RemoteSigner {
    client: JSONRPCClient,
    public_key: String,
    address: AccountAddress,
}

impl RemoteSigner {
    pub fn new(
        rpc_url: &str,
        timeout: Duration,
        public_key: &str,
        address: AccountAddress,
    ) -> Result<Self, Error> {
        let public_key = public_key.trim().trim_start_matches("0x").to_ascii_lowercase();
        if public_key.is_empty() {
            return Err(anyhow::anyhow!("RemoteSigner: public key is empty"));
        }
        hex::decode(&public_key)
            .map_err(|e| anyhow::anyhow!("RemoteSigner: invalid public key: {}", e))?;

        let client = JSONRPCClient::new_with_timeout(rpc_url, timeout)?;
        Ok(Self {
            client,
            public_key,
            address,
        })
    }
}

#[async_trait]
impl TransactionSigner for RemoteSigner {
    fn public_key(&self) -> &str {
        &self.public_key
    }

    fn address(&self) -> &AccountAddress {
        &self.address
    }

    async fn sign(&self, context: &str, message: &[u8]) -> Result<Vec<u8>, Error> {
        tracing::debug!(
            "RemoteSigner signing message, context: {}, len: {}",
            context,
            message.len()
        );

        let response = self
            .client
            .call_method(
                "signer_sign",
                vec![
                    Value::String(self.public_key.clone()),
                    Value::String(context.to_string()),
                    Value::String(format!("0x{}", hex::encode(message))),
                ],
            )
            .await
            .map_err(|e| anyhow::anyhow!("RemoteSigner: Failed to sign: {}", e))?;

        if let Some(signature) = response.as_str().map(|s| s.strip_prefix("0x").unwrap_or(s)) {
            return hex::decode(signature)
                .map_err(|e| anyhow::anyhow!("RemoteSigner: Failed to decode signature: {}", e));
        }

        Err(anyhow::anyhow!(
            "RemoteSigner: Failed to sign: unexpected response {}",
            response
        ))
    }
}
