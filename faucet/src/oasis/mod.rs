pub mod json_rpc;
pub mod quantity;

use crate::transactions::types::{SignedTransaction, UnsignedConsensusTransaction, UnsignedRuntimeTransaction};
use anyhow::Error;
use async_trait::async_trait;
use quantity::{Quantity, serde_decimal};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, fmt, sync::Arc};
use tokio::sync::mpsc::Receiver;
use tokio_util::sync::CancellationToken;

/// Account address on either ledger. Stored normalized so it can key the in-flight table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String")]
pub struct AccountAddress(String);

impl From<String> for AccountAddress {
    fn from(address: String) -> Self {
        Self::new(&address)
    }
}

impl AccountAddress {
    pub fn new(address: &str) -> Self {
        Self(address.trim().to_ascii_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParaTime {
    pub name: String,
    /// Runtime identifier, 64 hex characters.
    pub id: String,
    /// Consensus address the allowance is delegated to.
    pub bridge_address: AccountAddress,
    pub decimals: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaseUnits {
    #[serde(with = "serde_decimal")]
    pub amount: Quantity,
    /// Empty for the native denomination.
    #[serde(default)]
    pub denomination: String,
}

impl BaseUnits {
    pub fn native(amount: Quantity) -> Self {
        Self {
            amount,
            denomination: String::new(),
        }
    }
}

impl fmt::Display for BaseUnits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.denomination.is_empty() {
            write!(f, "{} <native>", self.amount)
        } else {
            write!(f, "{} {}", self.amount, self.denomination)
        }
    }
}

/// General staking account state of the funding account.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ConsensusAccount {
    #[serde(with = "serde_decimal")]
    pub balance: Quantity,
    #[serde(default)]
    pub nonce: u64,
    #[serde(default, deserialize_with = "deserialize_allowances")]
    pub allowances: HashMap<AccountAddress, Quantity>,
}

impl ConsensusAccount {
    /// Allowance delegated to `beneficiary`, zero when none was ever granted.
    pub fn allowance(&self, beneficiary: &AccountAddress) -> Quantity {
        self.allowances
            .get(beneficiary)
            .copied()
            .unwrap_or(Quantity::ZERO)
    }
}

fn deserialize_allowances<'de, D>(deserializer: D) -> Result<HashMap<AccountAddress, Quantity>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = HashMap::<String, String>::deserialize(deserializer)?;
    raw.into_iter()
        .map(|(address, amount)| {
            Quantity::from_str_radix(&amount, 10)
                .map(|amount| (AccountAddress::new(&address), amount))
                .map_err(serde::de::Error::custom)
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleError {
    pub module: String,
    pub code: u32,
    #[serde(default)]
    pub message: String,
}

/// Result of submitting a runtime transaction with metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SubmitTxMeta {
    #[serde(default)]
    pub round: u64,
    #[serde(default)]
    pub check_tx_error: Option<ModuleError>,
}

/// `consensus.Deposit` event emitted by the consensus accounts module of a paratime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositEvent {
    pub from: AccountAddress,
    pub nonce: u64,
    pub to: AccountAddress,
    pub amount: BaseUnits,
    #[serde(default)]
    pub error: Option<ModuleError>,
}

impl DepositEvent {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RuntimeEvent {
    Deposit(DepositEvent),
    #[serde(other)]
    Other,
}

/// Events emitted in a single paratime round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockEvents {
    pub round: u64,
    pub events: Vec<RuntimeEvent>,
}

/// RPC surface of a connected node, covering the consensus layer and the paratimes.
#[async_trait]
pub trait NodeConnection: Send + Sync + 'static {
    async fn consensus_signer_nonce(&self, account: &AccountAddress) -> Result<u64, Error>;

    async fn consensus_estimate_gas(
        &self,
        signer_public_key: &str,
        tx: &UnsignedConsensusTransaction,
    ) -> Result<u64, Error>;

    async fn consensus_submit_tx(&self, tx: &SignedTransaction) -> Result<(), Error>;

    async fn consensus_account(&self, owner: &AccountAddress) -> Result<ConsensusAccount, Error>;

    async fn chain_context(&self) -> Result<String, Error>;

    async fn runtime_nonce(&self, paratime: &ParaTime, account: &AccountAddress) -> Result<u64, Error>;

    async fn runtime_estimate_gas(
        &self,
        paratime: &ParaTime,
        tx: &UnsignedRuntimeTransaction,
    ) -> Result<u64, Error>;

    async fn runtime_submit_tx_meta(
        &self,
        paratime: &ParaTime,
        tx: &SignedTransaction,
    ) -> Result<SubmitTxMeta, Error>;

    /// Subscribes to the events of every new round of `paratime`. The receiver is closed when
    /// the stream fails or `cancel_token` is cancelled.
    async fn watch_runtime_events(
        &self,
        paratime: &ParaTime,
        cancel_token: CancellationToken,
    ) -> Result<Receiver<BlockEvents>, Error>;
}

/// Establishes node connections for the bank.
#[async_trait]
pub trait NodeConnector: Send + Sync + 'static {
    type Connection: NodeConnection;

    async fn connect(&self) -> Result<Arc<Self::Connection>, Error>;
}
