use super::{
    AccountAddress, BlockEvents, ConsensusAccount, NodeConnection, NodeConnector, ParaTime,
    RuntimeEvent, SubmitTxMeta,
};
use crate::{
    transactions::types::{
        SignedTransaction, UnsignedConsensusTransaction, UnsignedRuntimeTransaction,
    },
    utils::{
        event_listener::{self, RoundSource},
        rpc_client::JSONRPCClient,
    },
};
use anyhow::Error;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::{sync::Arc, time::Duration};
use tokio::sync::mpsc::{self, Receiver};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

const EVENT_CHANNEL_SIZE: usize = 16;

fn decode<T: DeserializeOwned>(method: &str, value: Value) -> Result<T, Error> {
    serde_json::from_value(value)
        .map_err(|e| anyhow::anyhow!("Failed to decode {method} response: {e}"))
}

fn to_param<T: serde::Serialize>(value: &T) -> Result<Value, Error> {
    serde_json::to_value(value).map_err(|e| anyhow::anyhow!("Failed to encode request: {e}"))
}

/// Node connection speaking to the node's JSON-RPC gateway.
pub struct JsonRpcNode {
    client: Arc<JSONRPCClient>,
    event_poll_interval: Duration,
}

impl JsonRpcNode {
    pub fn new(client: JSONRPCClient, event_poll_interval: Duration) -> Self {
        Self {
            client: Arc::new(client),
            event_poll_interval,
        }
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Vec<Value>) -> Result<T, Error> {
        let result = self.client.call_method(method, params).await?;
        decode(method, result)
    }
}

#[async_trait]
impl NodeConnection for JsonRpcNode {
    async fn consensus_signer_nonce(&self, account: &AccountAddress) -> Result<u64, Error> {
        self.call(
            "consensus_getSignerNonce",
            vec![json!({ "account_address": account, "height": 0 })],
        )
        .await
    }

    async fn consensus_estimate_gas(
        &self,
        signer_public_key: &str,
        tx: &UnsignedConsensusTransaction,
    ) -> Result<u64, Error> {
        self.call(
            "consensus_estimateGas",
            vec![json!({ "signer": signer_public_key, "transaction": to_param(tx)? })],
        )
        .await
    }

    async fn consensus_submit_tx(&self, tx: &SignedTransaction) -> Result<(), Error> {
        self.client
            .call_method("consensus_submitTx", vec![to_param(tx)?])
            .await
            .map(|_| ())
    }

    async fn consensus_account(&self, owner: &AccountAddress) -> Result<ConsensusAccount, Error> {
        self.call(
            "staking_account",
            vec![json!({ "owner": owner, "height": 0 })],
        )
        .await
    }

    async fn chain_context(&self) -> Result<String, Error> {
        self.call("consensus_getChainContext", vec![]).await
    }

    async fn runtime_nonce(&self, paratime: &ParaTime, account: &AccountAddress) -> Result<u64, Error> {
        self.call(
            "runtime_accountsNonce",
            vec![json!(paratime.id), json!({ "address": account, "round": 0 })],
        )
        .await
    }

    async fn runtime_estimate_gas(
        &self,
        paratime: &ParaTime,
        tx: &UnsignedRuntimeTransaction,
    ) -> Result<u64, Error> {
        self.call(
            "runtime_estimateGas",
            vec![json!(paratime.id), json!({ "tx": to_param(tx)?, "round": 0 })],
        )
        .await
    }

    async fn runtime_submit_tx_meta(
        &self,
        paratime: &ParaTime,
        tx: &SignedTransaction,
    ) -> Result<SubmitTxMeta, Error> {
        self.call("runtime_submitTxMeta", vec![json!(paratime.id), to_param(tx)?])
            .await
    }

    async fn watch_runtime_events(
        &self,
        paratime: &ParaTime,
        cancel_token: CancellationToken,
    ) -> Result<Receiver<BlockEvents>, Error> {
        let source = RuntimeRounds {
            client: self.client.clone(),
            runtime_id: paratime.id.clone(),
        };
        // Anchor the stream now, so a round produced after this call is never skipped.
        let first_round = source.latest_round().await?.saturating_add(1);
        debug!(
            "Watching events of paratime {} from round {}",
            paratime.name, first_round
        );

        let (sender, receiver) = mpsc::channel(EVENT_CHANNEL_SIZE);
        let poll_interval = self.event_poll_interval;
        tokio::spawn(async move {
            event_listener::listen_for_round_events(
                source,
                first_round,
                sender,
                cancel_token,
                poll_interval,
            )
            .await;
        });

        Ok(receiver)
    }
}

struct RuntimeRounds {
    client: Arc<JSONRPCClient>,
    runtime_id: String,
}

#[async_trait]
impl RoundSource for RuntimeRounds {
    async fn latest_round(&self) -> Result<u64, Error> {
        let result = self
            .client
            .call_method("runtime_latestRound", vec![json!(self.runtime_id)])
            .await?;
        decode("runtime_latestRound", result)
    }

    async fn round_events(&self, round: u64) -> Result<Vec<RuntimeEvent>, Error> {
        let result = self
            .client
            .call_method("runtime_getEvents", vec![json!(self.runtime_id), json!(round)])
            .await?;
        if result.is_null() {
            return Ok(Vec::new());
        }
        decode("runtime_getEvents", result)
    }
}

/// Dials the node gateway and verifies it serves the expected network.
pub struct JsonRpcConnector {
    url: String,
    timeout: Duration,
    api_key: Option<String>,
    expected_chain_context: Option<String>,
    event_poll_interval: Duration,
}

impl JsonRpcConnector {
    pub fn new(
        url: &str,
        timeout: Duration,
        api_key: Option<String>,
        expected_chain_context: Option<String>,
        event_poll_interval: Duration,
    ) -> Self {
        Self {
            url: url.to_string(),
            timeout,
            api_key,
            expected_chain_context,
            event_poll_interval,
        }
    }
}

#[async_trait]
impl NodeConnector for JsonRpcConnector {
    type Connection = JsonRpcNode;

    async fn connect(&self) -> Result<Arc<JsonRpcNode>, Error> {
        let client = JSONRPCClient::new_with_timeout_and_api_key(
            &self.url,
            self.timeout,
            self.api_key.as_deref(),
        )?;
        let node = JsonRpcNode::new(client, self.event_poll_interval);

        let chain_context = node
            .chain_context()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to probe node at {}: {e}", self.url))?;
        if let Some(expected) = &self.expected_chain_context
            && *expected != chain_context
        {
            anyhow::bail!(
                "Node at {} serves chain context {chain_context}, expected {expected}",
                self.url
            );
        }

        info!("Connected to node at {}, chain context {}", self.url, chain_context);
        Ok(Arc::new(node))
    }
}
