use crate::oasis::{AccountAddress, BlockEvents, DepositEvent, RuntimeEvent};
use std::{pin::Pin, time::Duration};
use tokio::{
    sync::mpsc::Receiver,
    time::{Sleep, sleep},
};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DepositOutcome {
    Confirmed(DepositEvent),
    /// The deposit was executed but the paratime reported an error.
    Failed(DepositEvent),
    TimedOut,
    StreamClosed,
}

/// Finds the deposit sent by `from` with `nonce` among the events of one round.
pub fn find_deposit<'a>(
    block: &'a BlockEvents,
    from: &AccountAddress,
    nonce: u64,
) -> Option<&'a DepositEvent> {
    block.events.iter().find_map(|event| match event {
        RuntimeEvent::Deposit(deposit) if deposit.from == *from && deposit.nonce == nonce => {
            Some(deposit)
        }
        _ => None,
    })
}

/// Observes a paratime event stream for the deposit of one meta transaction.
///
/// Dropping the watcher cancels the underlying subscription.
pub struct DepositWatcher {
    events: Receiver<BlockEvents>,
    from: AccountAddress,
    nonce: u64,
    deadline: Pin<Box<Sleep>>,
    cancel_token: CancellationToken,
}

impl DepositWatcher {
    /// The timeout runs from construction, not from the first `wait` poll.
    pub fn new(
        events: Receiver<BlockEvents>,
        from: AccountAddress,
        nonce: u64,
        timeout: Duration,
        cancel_token: CancellationToken,
    ) -> Self {
        Self {
            events,
            from,
            nonce,
            deadline: Box::pin(sleep(timeout)),
            cancel_token,
        }
    }

    pub fn nonce(&self) -> u64 {
        self.nonce
    }

    /// Waits for the matching deposit, the stream closing or the deadline, whichever comes first.
    pub async fn wait(mut self) -> DepositOutcome {
        loop {
            tokio::select! {
                _ = &mut self.deadline => return DepositOutcome::TimedOut,
                block = self.events.recv() => {
                    let Some(block) = block else {
                        return DepositOutcome::StreamClosed;
                    };
                    if let Some(deposit) = find_deposit(&block, &self.from, self.nonce) {
                        return if deposit.is_success() {
                            DepositOutcome::Confirmed(deposit.clone())
                        } else {
                            DepositOutcome::Failed(deposit.clone())
                        };
                    }
                }
            }
        }
    }
}

impl Drop for DepositWatcher {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}
