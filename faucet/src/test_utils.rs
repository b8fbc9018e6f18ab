use crate::{
    oasis::{
        AccountAddress, BaseUnits, BlockEvents, ConsensusAccount, DepositEvent, ModuleError,
        NodeConnection, NodeConnector, ParaTime, RuntimeEvent, SubmitTxMeta, quantity::Quantity,
    },
    shared::signer::TransactionSigner,
    transactions::types::{
        ConsensusCall, RuntimeCall, SignedTransaction, UnsignedConsensusTransaction,
        UnsignedRuntimeTransaction,
    },
};
use anyhow::Error;
use async_trait::async_trait;
use std::{
    collections::HashSet,
    sync::{
        Arc, Mutex, MutexGuard,
        atomic::{AtomicU64, Ordering},
    },
};
use tokio::sync::mpsc::{self, Receiver, Sender};
use tokio_util::sync::CancellationToken;

pub const FAUCET_ADDRESS: &str = "oasis1faucet";
pub const CHAIN_CONTEXT: &str = "abcd";

pub fn paratime(name: &str) -> ParaTime {
    ParaTime {
        name: name.to_string(),
        id: format!("{:0>64}", hex::encode(name)),
        bridge_address: AccountAddress::new(&format!("oasis1{name}bridge")),
        decimals: 18,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeStep {
    Nonce,
    EstimateGas,
    ChainContext,
    Submit,
    Watch,
    Account,
}

/// What the mock paratime emits once a deposit is accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DepositBehaviour {
    Confirm,
    Fail,
    Silent,
    /// Closes the event stream without emitting the deposit.
    Close,
}

pub struct MockNodeState {
    pub fail_at: Option<NodeStep>,
    pub consensus_nonce: u64,
    pub runtime_nonce: u64,
    pub account: ConsensusAccount,
    pub check_tx_error: Option<ModuleError>,
    pub deposit_behaviour: DepositBehaviour,
    pub failing_beneficiaries: HashSet<AccountAddress>,
    consensus_submitted: Vec<UnsignedConsensusTransaction>,
    runtime_submitted: Vec<UnsignedRuntimeTransaction>,
    watch_tokens: Vec<CancellationToken>,
    event_sender: Option<Sender<BlockEvents>>,
    round: u64,
}

/// In-memory node. Records every transaction it accepts and can be told to fail at any step.
pub struct MockNode {
    state: Mutex<MockNodeState>,
}

impl MockNode {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockNodeState {
                fail_at: None,
                consensus_nonce: 0,
                runtime_nonce: 0,
                account: ConsensusAccount::default(),
                check_tx_error: None,
                deposit_behaviour: DepositBehaviour::Confirm,
                failing_beneficiaries: HashSet::new(),
                consensus_submitted: Vec::new(),
                runtime_submitted: Vec::new(),
                watch_tokens: Vec::new(),
                event_sender: None,
                round: 0,
            }),
        }
    }

    pub fn state(&self) -> MutexGuard<'_, MockNodeState> {
        self.state.lock().unwrap()
    }

    pub fn fail_at(&self, step: NodeStep) {
        self.state().fail_at = Some(step);
    }

    pub fn set_allowance(&self, beneficiary: &AccountAddress, amount: u64) {
        self.state()
            .account
            .allowances
            .insert(beneficiary.clone(), Quantity::from(amount));
    }

    pub fn consensus_submitted(&self) -> Vec<UnsignedConsensusTransaction> {
        self.state().consensus_submitted.clone()
    }

    pub fn runtime_submitted(&self) -> Vec<UnsignedRuntimeTransaction> {
        self.state().runtime_submitted.clone()
    }

    pub fn watch_tokens(&self) -> Vec<CancellationToken> {
        self.state().watch_tokens.clone()
    }

    fn check(&self, step: NodeStep) -> Result<(), Error> {
        if self.state().fail_at == Some(step) {
            anyhow::bail!("mock node failure at {step:?}");
        }
        Ok(())
    }
}

fn decode_raw<T: serde::de::DeserializeOwned>(tx: &SignedTransaction) -> T {
    let raw = hex::decode(&tx.untrusted_raw_value).unwrap();
    serde_json::from_slice(&raw).unwrap()
}

#[async_trait]
impl NodeConnection for MockNode {
    async fn consensus_signer_nonce(&self, _account: &AccountAddress) -> Result<u64, Error> {
        self.check(NodeStep::Nonce)?;
        Ok(self.state().consensus_nonce)
    }

    async fn consensus_estimate_gas(
        &self,
        _signer_public_key: &str,
        _tx: &UnsignedConsensusTransaction,
    ) -> Result<u64, Error> {
        self.check(NodeStep::EstimateGas)?;
        Ok(1000)
    }

    async fn consensus_submit_tx(&self, tx: &SignedTransaction) -> Result<(), Error> {
        self.check(NodeStep::Submit)?;
        let tx: UnsignedConsensusTransaction = decode_raw(tx);
        let mut state = self.state();
        if let ConsensusCall::Allow { beneficiary, .. } = &tx.call
            && state.failing_beneficiaries.contains(beneficiary)
        {
            anyhow::bail!("mock node rejected allowance for {beneficiary}");
        }
        state.consensus_submitted.push(tx);
        state.consensus_nonce += 1;
        Ok(())
    }

    async fn consensus_account(&self, _owner: &AccountAddress) -> Result<ConsensusAccount, Error> {
        self.check(NodeStep::Account)?;
        Ok(self.state().account.clone())
    }

    async fn chain_context(&self) -> Result<String, Error> {
        self.check(NodeStep::ChainContext)?;
        Ok(CHAIN_CONTEXT.to_string())
    }

    async fn runtime_nonce(&self, _paratime: &ParaTime, _account: &AccountAddress) -> Result<u64, Error> {
        self.check(NodeStep::Nonce)?;
        Ok(self.state().runtime_nonce)
    }

    async fn runtime_estimate_gas(
        &self,
        _paratime: &ParaTime,
        _tx: &UnsignedRuntimeTransaction,
    ) -> Result<u64, Error> {
        self.check(NodeStep::EstimateGas)?;
        Ok(2000)
    }

    async fn runtime_submit_tx_meta(
        &self,
        _paratime: &ParaTime,
        tx: &SignedTransaction,
    ) -> Result<SubmitTxMeta, Error> {
        self.check(NodeStep::Submit)?;
        let tx: UnsignedRuntimeTransaction = decode_raw(tx);
        let mut state = self.state();
        if let Some(check_tx_error) = state.check_tx_error.clone() {
            return Ok(SubmitTxMeta {
                round: 0,
                check_tx_error: Some(check_tx_error),
            });
        }

        state.round += 1;
        state.runtime_nonce += 1;
        let round = state.round;
        let RuntimeCall::Deposit { to, amount } = tx.call.clone();
        let nonce = tx.auth_info.signer_info[0].nonce;
        state.runtime_submitted.push(tx);

        let error = match state.deposit_behaviour {
            DepositBehaviour::Silent => return Ok(SubmitTxMeta { round, check_tx_error: None }),
            DepositBehaviour::Close => {
                state.event_sender = None;
                return Ok(SubmitTxMeta { round, check_tx_error: None });
            }
            DepositBehaviour::Confirm => None,
            DepositBehaviour::Fail => Some(ModuleError {
                module: "consensus_accounts".to_string(),
                code: 1,
                message: "insufficient balance".to_string(),
            }),
        };
        if let Some(sender) = &state.event_sender {
            let _ = sender.try_send(BlockEvents {
                round,
                events: vec![RuntimeEvent::Deposit(DepositEvent {
                    from: AccountAddress::new(FAUCET_ADDRESS),
                    nonce,
                    to,
                    amount,
                    error,
                })],
            });
        }
        Ok(SubmitTxMeta {
            round,
            check_tx_error: None,
        })
    }

    async fn watch_runtime_events(
        &self,
        _paratime: &ParaTime,
        cancel_token: CancellationToken,
    ) -> Result<Receiver<BlockEvents>, Error> {
        self.check(NodeStep::Watch)?;
        let (sender, receiver) = mpsc::channel(16);
        let mut state = self.state();
        state.event_sender = Some(sender);
        state.watch_tokens.push(cancel_token);
        Ok(receiver)
    }
}

pub struct MockSigner {
    address: AccountAddress,
    public_key: String,
    fail: bool,
    contexts: Arc<Mutex<Vec<String>>>,
}

impl MockSigner {
    pub fn new() -> Self {
        Self {
            address: AccountAddress::new(FAUCET_ADDRESS),
            public_key: "ab".repeat(32),
            fail: false,
            contexts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new()
        }
    }

    /// Signing contexts seen so far.
    pub fn contexts(&self) -> Arc<Mutex<Vec<String>>> {
        self.contexts.clone()
    }
}

#[async_trait]
impl TransactionSigner for MockSigner {
    fn public_key(&self) -> &str {
        &self.public_key
    }

    fn address(&self) -> &AccountAddress {
        &self.address
    }

    async fn sign(&self, context: &str, _message: &[u8]) -> Result<Vec<u8>, Error> {
        if self.fail {
            anyhow::bail!("mock signer failure");
        }
        self.contexts.lock().unwrap().push(context.to_string());
        Ok(vec![0x51; 64])
    }
}

pub struct MockConnector {
    node: Arc<MockNode>,
    failures_left: AtomicU64,
    attempts: Arc<AtomicU64>,
}

impl MockConnector {
    pub fn new(node: Arc<MockNode>, failures: u64) -> Self {
        Self {
            node,
            failures_left: AtomicU64::new(failures),
            attempts: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn attempts(&self) -> Arc<AtomicU64> {
        self.attempts.clone()
    }
}

#[async_trait]
impl NodeConnector for MockConnector {
    type Connection = MockNode;

    async fn connect(&self) -> Result<Arc<MockNode>, Error> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let failed = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if failed {
            anyhow::bail!("mock node unreachable");
        }
        Ok(self.node.clone())
    }
}

pub fn native(amount: u64) -> BaseUnits {
    BaseUnits::native(Quantity::from(amount))
}
