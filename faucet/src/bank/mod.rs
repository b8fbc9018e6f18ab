pub mod address_lock;
pub mod ingress;
pub mod refill;
pub mod request;

use crate::{
    metrics::{Metrics, RequestStatus},
    oasis::{AccountAddress, BaseUnits, NodeConnection, NodeConnector, ParaTime, quantity::Quantity},
    shared::signer::TransactionSigner,
    transactions::{TransactionSubmitter, watcher::DepositOutcome},
    utils::retry::{RetryError, RetryPolicy, retry_with_fixed_delay},
};
use address_lock::{AddressLease, AddressLockTable};
use anyhow::Error;
use ingress::{FaucetHandle, QueuedRequest};
use refill::AllowanceRefiller;
use request::FundingTarget;
use std::{sync::Arc, time::Duration};
use tokio::{
    sync::{mpsc, watch},
    time::{Instant, MissedTickBehavior},
};
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BankState {
    Connecting,
    Ready,
    Draining,
    Stopped,
}

pub struct BankConfig {
    pub paratimes: Vec<ParaTime>,
    pub target_allowance: Quantity,
    pub consensus_decimals: u8,
    pub refill_interval: Duration,
    pub confirmation_timeout: Duration,
    pub connect_retry: RetryPolicy,
    pub allowance_alert_threshold: u64,
    pub request_queue_size: usize,
}

/// Single worker that owns the node connection and executes every funding operation in turn.
pub struct Bank<C: NodeConnector, S: TransactionSigner> {
    connector: C,
    signer: Arc<S>,
    config: BankConfig,
    requests: mpsc::Receiver<QueuedRequest>,
    state: watch::Sender<BankState>,
    confirmations: TaskTracker,
    metrics: Arc<Metrics>,
    cancel_token: CancellationToken,
}

impl<C: NodeConnector, S: TransactionSigner> Bank<C, S> {
    pub fn new(
        connector: C,
        signer: Arc<S>,
        config: BankConfig,
        locks: AddressLockTable,
        metrics: Arc<Metrics>,
        cancel_token: CancellationToken,
    ) -> (Self, FaucetHandle) {
        let (queue, requests) = mpsc::channel(config.request_queue_size);
        let (state, state_receiver) = watch::channel(BankState::Connecting);
        let handle = FaucetHandle::new(locks, queue, state_receiver);

        let bank = Self {
            connector,
            signer,
            config,
            requests,
            state,
            confirmations: TaskTracker::new(),
            metrics,
            cancel_token,
        };
        (bank, handle)
    }

    /// Tracker of the spawned confirmation tasks, closed once the bank stops.
    pub fn confirmations(&self) -> TaskTracker {
        self.confirmations.clone()
    }

    /// Runs until cancelled. Fails only when a connection attempt bound is configured and
    /// exhausted.
    pub async fn run(mut self) -> Result<(), Error> {
        let result = self.serve().await;
        self.drain();
        result
    }

    async fn serve(&mut self) -> Result<(), Error> {
        let Some(node) = self.connect().await? else {
            return Ok(());
        };

        let submitter =
            TransactionSubmitter::new(node, self.signer.clone(), self.config.confirmation_timeout);
        let mut refiller = AllowanceRefiller::new(
            self.config.paratimes.clone(),
            self.config.target_allowance,
            self.config.consensus_decimals,
            self.config.allowance_alert_threshold,
            self.metrics.clone(),
        );

        refiller.refill_allowances(&submitter).await;
        self.state.send_replace(BankState::Ready);
        info!("bank: ready, serving requests");

        let mut refill_timer = tokio::time::interval(self.config.refill_interval);
        refill_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first pass already ran above.
        refill_timer.reset();

        loop {
            tokio::select! {
                biased;
                _ = self.cancel_token.cancelled() => {
                    info!("bank: shutdown requested");
                    return Ok(());
                }
                _ = refill_timer.tick() => {
                    refiller.refill_allowances(&submitter).await;
                }
                queued = self.requests.recv() => {
                    let Some(queued) = queued else {
                        info!("bank: all request handles dropped");
                        return Ok(());
                    };
                    self.process_request(&submitter, queued).await;
                }
            }
        }
    }

    async fn connect(&self) -> Result<Option<Arc<C::Connection>>, Error> {
        info!("bank: connecting to node");
        let policy = self.config.connect_retry;
        let result = retry_with_fixed_delay(
            || self.connector.connect(),
            policy,
            &self.cancel_token,
            |attempt, e| {
                warn!(
                    "bank: failed to connect to node (attempt {attempt}): {e}, retrying in {:?}",
                    policy.delay
                )
            },
        )
        .await;

        match result {
            Ok(node) => {
                info!("bank: connected to node");
                Ok(Some(node))
            }
            Err(RetryError::Cancelled) => {
                info!("bank: shutdown requested while connecting");
                Ok(None)
            }
            Err(e) => {
                error!("bank: giving up connecting to node: {e}");
                Err(anyhow::anyhow!("Failed to connect to node: {e}"))
            }
        }
    }

    async fn process_request(
        &self,
        submitter: &TransactionSubmitter<C::Connection, S>,
        queued: QueuedRequest,
    ) {
        let QueuedRequest { request, lease } = queued;
        let started = Instant::now();
        let endpoint = request.endpoint().to_string();

        match request.target {
            FundingTarget::Consensus { amount } => {
                self.fund_consensus(submitter, &endpoint, &request.account, amount, started)
                    .await;
                drop(lease);
            }
            FundingTarget::ParaTime { paratime, amount } => {
                self.fund_paratime(submitter, endpoint, &paratime, amount, lease, started)
                    .await;
            }
        }
    }

    async fn fund_consensus(
        &self,
        submitter: &TransactionSubmitter<C::Connection, S>,
        endpoint: &str,
        account: &AccountAddress,
        amount: Quantity,
        started: Instant,
    ) {
        match submitter.submit_consensus_transfer(account, amount).await {
            Ok(()) => {
                info!("bank/consensus: funded {} with {} base units", account, amount);
                self.metrics
                    .observe_request_duration(endpoint, started.elapsed().as_secs_f64());
                self.metrics.inc_request(endpoint, RequestStatus::Success);
            }
            Err(e) => {
                error!(
                    "bank/consensus: failed to fund {} with {} base units: {e}",
                    account, amount
                );
                self.metrics.inc_request(endpoint, RequestStatus::Failure);
            }
        }
    }

    /// Submits the deposit and hands its confirmation, with the lease, to a tracked task.
    async fn fund_paratime(
        &self,
        submitter: &TransactionSubmitter<C::Connection, S>,
        endpoint: String,
        paratime: &ParaTime,
        amount: BaseUnits,
        lease: AddressLease,
        started: Instant,
    ) {
        let account = lease.address().clone();
        let watcher = match submitter
            .submit_meta_deposit(paratime, &account, amount.clone())
            .await
        {
            Ok(watcher) => watcher,
            Err(e) => {
                error!(
                    "bank/paratime: failed to submit deposit of {} to {} on {}: {e}",
                    amount, account, paratime.name
                );
                self.metrics.inc_request(&endpoint, RequestStatus::Failure);
                return;
            }
        };

        let metrics = self.metrics.clone();
        let paratime_name = paratime.name.clone();
        metrics.inc_pending_confirmations();
        self.confirmations.spawn(async move {
            let _lease = lease;
            let nonce = watcher.nonce();
            match watcher.wait().await {
                DepositOutcome::Confirmed(_) => {
                    info!(
                        "bank/paratime: deposited {} to {} on {} (nonce {})",
                        amount, account, paratime_name, nonce
                    );
                    metrics.observe_request_duration(&endpoint, started.elapsed().as_secs_f64());
                    metrics.inc_request(&endpoint, RequestStatus::Success);
                }
                DepositOutcome::Failed(event) => {
                    let (module, code) = event
                        .error
                        .map(|e| (e.module, e.code))
                        .unwrap_or_default();
                    error!(
                        "bank/paratime: deposit of {} to {} on {} failed: module {} code {}",
                        amount, account, paratime_name, module, code
                    );
                    metrics.inc_request(&endpoint, RequestStatus::Failure);
                }
                DepositOutcome::TimedOut => {
                    error!(
                        "bank/paratime: timed out waiting for deposit of {} to {} on {} (nonce {})",
                        amount, account, paratime_name, nonce
                    );
                    metrics.inc_request(&endpoint, RequestStatus::Failure);
                }
                DepositOutcome::StreamClosed => {
                    error!(
                        "bank/paratime: event stream of {} closed before deposit to {} was seen (nonce {})",
                        paratime_name, account, nonce
                    );
                    metrics.inc_request(&endpoint, RequestStatus::Failure);
                }
            }
            metrics.dec_pending_confirmations();
        });
    }

    fn drain(&mut self) {
        self.state.send_replace(BankState::Draining);
        self.requests.close();

        let mut dropped: usize = 0;
        while let Ok(queued) = self.requests.try_recv() {
            warn!(
                "bank: dropping queued request {} on shutdown",
                queued.request
            );
            dropped = dropped.saturating_add(1);
        }
        if dropped > 0 {
            warn!("bank: dropped {dropped} queued requests on shutdown");
        }

        self.confirmations.close();
        self.state.send_replace(BankState::Stopped);
        info!(
            "bank: stopped, {} confirmations still pending",
            self.confirmations.len()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        oasis::ModuleError,
        test_utils::{
            DepositBehaviour, MockConnector, MockNode, MockSigner, NodeStep, native, paratime,
        },
    };
    use ingress::AdmissionError;
    use request::FundingRequest;
    use std::sync::atomic::Ordering;
    use tokio::task::JoinHandle;

    struct TestBank {
        handle: FaucetHandle,
        locks: AddressLockTable,
        metrics: Arc<Metrics>,
        confirmations: TaskTracker,
        cancel_token: CancellationToken,
        task: JoinHandle<Result<(), Error>>,
    }

    fn config(paratimes: Vec<ParaTime>) -> BankConfig {
        BankConfig {
            paratimes,
            target_allowance: Quantity::from(500u64),
            consensus_decimals: 9,
            refill_interval: Duration::from_secs(3600),
            confirmation_timeout: Duration::from_secs(60),
            connect_retry: RetryPolicy {
                delay: Duration::from_secs(15),
                max_attempts: 0,
            },
            allowance_alert_threshold: 3,
            request_queue_size: 8,
        }
    }

    fn start(connector: MockConnector, config: BankConfig) -> TestBank {
        let locks = AddressLockTable::new();
        let metrics = Arc::new(Metrics::new());
        let cancel_token = CancellationToken::new();
        let (bank, handle) = Bank::new(
            connector,
            Arc::new(MockSigner::new()),
            config,
            locks.clone(),
            metrics.clone(),
            cancel_token.clone(),
        );
        let confirmations = bank.confirmations();
        TestBank {
            handle,
            locks,
            metrics,
            confirmations,
            cancel_token,
            task: tokio::spawn(bank.run()),
        }
    }

    async fn wait_until_released(locks: &AddressLockTable) {
        while locks.in_flight_count() > 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_ready_after_connect_retries_and_refill() {
        let node = Arc::new(MockNode::new());
        let emerald = paratime("emerald");
        node.set_allowance(&emerald.bridge_address, 100);
        let connector = MockConnector::new(node.clone(), 2);
        let attempts = connector.attempts();

        let started = Instant::now();
        let bank = start(connector, config(vec![emerald]));
        bank.handle.wait_ready().await.unwrap();

        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        assert!(started.elapsed() >= Duration::from_secs(30));
        assert_eq!(node.consensus_submitted().len(), 1);

        bank.cancel_token.cancel();
        assert!(bank.task.await.unwrap().is_ok());
        assert_eq!(bank.handle.state(), BankState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_attempt_bound() {
        let node = Arc::new(MockNode::new());
        let mut config = config(vec![]);
        config.connect_retry.max_attempts = 2;
        let bank = start(MockConnector::new(node, 5), config);

        assert!(bank.task.await.unwrap().is_err());
        assert!(bank.handle.wait_ready().await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_while_connecting() {
        let node = Arc::new(MockNode::new());
        let bank = start(MockConnector::new(node, u64::MAX), config(vec![]));

        tokio::time::sleep(Duration::from_secs(40)).await;
        bank.cancel_token.cancel();
        assert!(bank.task.await.unwrap().is_ok());
        assert_eq!(bank.handle.state(), BankState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_releases_queued_requests() {
        let node = Arc::new(MockNode::new());
        let bank = start(MockConnector::new(node.clone(), u64::MAX), config(vec![]));

        for account in ["oasis1a", "oasis1b"] {
            bank.handle
                .submit(FundingRequest::consensus(
                    AccountAddress::new(account),
                    Quantity::from(1u64),
                ))
                .unwrap();
        }
        assert_eq!(bank.locks.in_flight_count(), 2);

        bank.cancel_token.cancel();
        assert!(bank.task.await.unwrap().is_ok());
        assert_eq!(bank.locks.in_flight_count(), 0);
        assert!(node.consensus_submitted().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_consensus_request_releases_lock() {
        let node = Arc::new(MockNode::new());
        let bank = start(MockConnector::new(node.clone(), 0), config(vec![]));
        bank.handle.wait_ready().await.unwrap();

        let account = AccountAddress::new("oasis1dest");
        bank.handle
            .submit(FundingRequest::consensus(account.clone(), Quantity::from(10u64)))
            .unwrap();
        wait_until_released(&bank.locks).await;

        assert_eq!(node.consensus_submitted().len(), 1);
        assert!(bank.metrics.gather().contains(
            r#"faucet_requests{endpoint="consensus",status="success"} 1"#
        ));
        bank.handle
            .submit(FundingRequest::consensus(account, Quantity::from(10u64)))
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_request_releases_lock_and_loop_continues() {
        let node = Arc::new(MockNode::new());
        let bank = start(MockConnector::new(node.clone(), 0), config(vec![]));
        bank.handle.wait_ready().await.unwrap();

        node.fail_at(NodeStep::EstimateGas);
        bank.handle
            .submit(FundingRequest::consensus(
                AccountAddress::new("oasis1a"),
                Quantity::from(1u64),
            ))
            .unwrap();
        wait_until_released(&bank.locks).await;
        assert!(bank.metrics.gather().contains(
            r#"faucet_requests{endpoint="consensus",status="failure"} 1"#
        ));

        node.state().fail_at = None;
        bank.handle
            .submit(FundingRequest::consensus(
                AccountAddress::new("oasis1b"),
                Quantity::from(1u64),
            ))
            .unwrap();
        wait_until_released(&bank.locks).await;
        assert_eq!(node.consensus_submitted().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_paratime_lock_held_until_confirmation() {
        let node = Arc::new(MockNode::new());
        node.state().deposit_behaviour = DepositBehaviour::Silent;
        let emerald = paratime("emerald");
        let bank = start(MockConnector::new(node.clone(), 0), config(vec![emerald.clone()]));
        bank.handle.wait_ready().await.unwrap();

        let account = AccountAddress::new("0xdest");
        let request = FundingRequest::paratime(account.clone(), emerald, native(5));
        let started = Instant::now();
        bank.handle.submit(request.clone()).unwrap();

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(node.runtime_submitted().len(), 1);
        assert_eq!(
            bank.handle.submit(request.clone()),
            Err(AdmissionError::DuplicateInFlight)
        );

        wait_until_released(&bank.locks).await;
        assert!(started.elapsed() >= Duration::from_secs(60));
        assert!(bank.metrics.gather().contains(
            r#"faucet_requests{endpoint="emerald",status="failure"} 1"#
        ));
        assert_eq!(bank.handle.submit(request), Ok(()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_paratime_confirmation_success() {
        let node = Arc::new(MockNode::new());
        let emerald = paratime("emerald");
        let bank = start(MockConnector::new(node.clone(), 0), config(vec![emerald.clone()]));
        bank.handle.wait_ready().await.unwrap();

        bank.handle
            .submit(FundingRequest::paratime(
                AccountAddress::new("0xdest"),
                emerald,
                native(5),
            ))
            .unwrap();
        wait_until_released(&bank.locks).await;

        let output = bank.metrics.gather();
        assert!(output.contains(r#"faucet_requests{endpoint="emerald",status="success"} 1"#));
        assert!(output.contains("faucet_pending_confirmations 0"));
    }

    /// Funds `0xdest` on emerald once and checks the request failed without waiting for the
    /// confirmation timeout, its lock was released and the address is admitted again.
    async fn assert_paratime_request_fails_and_releases(
        setup: impl FnOnce(&MockNode),
        expected_deposits: usize,
    ) {
        let node = Arc::new(MockNode::new());
        let emerald = paratime("emerald");
        let bank = start(MockConnector::new(node.clone(), 0), config(vec![emerald.clone()]));
        bank.handle.wait_ready().await.unwrap();
        setup(&node);

        let request =
            FundingRequest::paratime(AccountAddress::new("0xdest"), emerald, native(5));
        let started = Instant::now();
        bank.handle.submit(request.clone()).unwrap();
        wait_until_released(&bank.locks).await;
        assert!(started.elapsed() < Duration::from_secs(60));

        let output = bank.metrics.gather();
        assert!(output.contains(r#"faucet_requests{endpoint="emerald",status="failure"} 1"#));
        assert!(!output.contains(r#"faucet_requests{endpoint="emerald",status="success"}"#));
        assert!(output.contains("faucet_pending_confirmations 0"));
        assert_eq!(node.runtime_submitted().len(), expected_deposits);
        let watch_tokens = node.watch_tokens();
        assert_eq!(watch_tokens.len(), 1);
        assert!(watch_tokens[0].is_cancelled());

        node.state().fail_at = None;
        node.state().check_tx_error = None;
        node.state().deposit_behaviour = DepositBehaviour::Confirm;
        assert_eq!(bank.handle.submit(request), Ok(()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_paratime_submit_failure_releases_lock() {
        assert_paratime_request_fails_and_releases(|node| node.fail_at(NodeStep::Submit), 0).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_paratime_check_tx_error_releases_lock() {
        assert_paratime_request_fails_and_releases(
            |node| {
                node.state().check_tx_error = Some(ModuleError {
                    module: "core".to_string(),
                    code: 5,
                    message: "out of gas".to_string(),
                });
            },
            0,
        )
        .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_paratime_failed_deposit_releases_lock() {
        assert_paratime_request_fails_and_releases(
            |node| node.state().deposit_behaviour = DepositBehaviour::Fail,
            1,
        )
        .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_paratime_closed_event_stream_releases_lock() {
        assert_paratime_request_fails_and_releases(
            |node| node.state().deposit_behaviour = DepositBehaviour::Close,
            1,
        )
        .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_drops_queue_and_tracks_confirmations() {
        let node = Arc::new(MockNode::new());
        node.state().deposit_behaviour = DepositBehaviour::Silent;
        let emerald = paratime("emerald");
        let bank = start(MockConnector::new(node.clone(), 0), config(vec![emerald.clone()]));
        bank.handle.wait_ready().await.unwrap();

        bank.handle
            .submit(FundingRequest::paratime(
                AccountAddress::new("0xdest"),
                emerald,
                native(5),
            ))
            .unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(bank.confirmations.len(), 1);

        bank.cancel_token.cancel();
        assert!(bank.task.await.unwrap().is_ok());
        assert_eq!(
            bank.handle.submit(FundingRequest::consensus(
                AccountAddress::new("oasis1late"),
                Quantity::from(1u64),
            )),
            Err(AdmissionError::ShuttingDown)
        );

        bank.confirmations.wait().await;
        assert_eq!(bank.locks.in_flight_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_refill() {
        let node = Arc::new(MockNode::new());
        let emerald = paratime("emerald");
        node.set_allowance(&emerald.bridge_address, 100);
        let bank = start(MockConnector::new(node.clone(), 0), config(vec![emerald]));
        bank.handle.wait_ready().await.unwrap();
        assert_eq!(node.consensus_submitted().len(), 1);

        tokio::time::sleep(Duration::from_secs(3601)).await;
        assert_eq!(node.consensus_submitted().len(), 2);
    }
}
