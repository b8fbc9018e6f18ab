use super::{
    BankState,
    address_lock::{AddressLease, AddressLockTable},
    request::FundingRequest,
};
use anyhow::Error;
use tokio::sync::{
    mpsc::{self, error::TrySendError},
    watch,
};
use tracing::{debug, warn};

/// Request admitted by ingress, holding the in-flight lock of its account.
pub struct QueuedRequest {
    pub request: FundingRequest,
    pub lease: AddressLease,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionError {
    DuplicateInFlight,
    QueueFull,
    ShuttingDown,
}

impl std::fmt::Display for AdmissionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl std::error::Error for AdmissionError {}

/// Entry point of the bank for the front door.
#[derive(Clone)]
pub struct FaucetHandle {
    locks: AddressLockTable,
    queue: mpsc::Sender<QueuedRequest>,
    state: watch::Receiver<BankState>,
}

impl FaucetHandle {
    pub(super) fn new(
        locks: AddressLockTable,
        queue: mpsc::Sender<QueuedRequest>,
        state: watch::Receiver<BankState>,
    ) -> Self {
        Self {
            locks,
            queue,
            state,
        }
    }

    pub fn state(&self) -> BankState {
        *self.state.borrow()
    }

    /// Waits until the bank is connected and its allowances were refilled once.
    pub async fn wait_ready(&self) -> Result<(), Error> {
        let mut state = self.state.clone();
        let reached = state
            .wait_for(|s| *s != BankState::Connecting)
            .await
            .map(|s| *s)
            .map_err(|_| anyhow::anyhow!("Bank stopped before becoming ready"))?;
        if reached != BankState::Ready {
            anyhow::bail!("Bank is {reached:?}, it will not become ready");
        }
        Ok(())
    }

    /// Admits `request` and queues it for the bank without waiting.
    ///
    /// A rejected request releases the lock of its account before returning.
    pub fn submit(&self, request: FundingRequest) -> Result<(), AdmissionError> {
        if matches!(self.state(), BankState::Draining | BankState::Stopped) {
            return Err(AdmissionError::ShuttingDown);
        }

        let Some(lease) = self.locks.try_lease(&request.account) else {
            debug!("ingress: request for {} already in flight", request.account);
            return Err(AdmissionError::DuplicateInFlight);
        };

        match self.queue.try_send(QueuedRequest { request, lease }) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(queued)) => {
                warn!("ingress: queue full, rejecting request {}", queued.request);
                Err(AdmissionError::QueueFull)
            }
            Err(TrySendError::Closed(_)) => Err(AdmissionError::ShuttingDown),
        }
    }
}
