use crate::oasis::{BlockEvents, RuntimeEvent};
use anyhow::Error;
use async_trait::async_trait;
use tokio::{
    select,
    sync::mpsc::Sender,
    time::{Duration, sleep},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Round indexed event log of a paratime.
#[async_trait]
pub trait RoundSource: Send + Sync + 'static {
    async fn latest_round(&self) -> Result<u64, Error>;

    async fn round_events(&self, round: u64) -> Result<Vec<RuntimeEvent>, Error>;
}

/// Feeds the events of every round starting at `first_round` into `sender`, in round order.
///
/// Returns (dropping `sender`, which closes the stream) on the first RPC failure, when the
/// receiver goes away or when `cancel_token` is cancelled.
pub async fn listen_for_round_events<S: RoundSource>(
    source: S,
    first_round: u64,
    sender: Sender<BlockEvents>,
    cancel_token: CancellationToken,
    poll_interval: Duration,
) {
    let mut next_round = first_round;

    loop {
        select! {
            _ = cancel_token.cancelled() => {
                debug!("RoundEvents: cancellation received, stopping at round {next_round}");
                return;
            }
            _ = sender.closed() => {
                debug!("RoundEvents: receiver dropped, stopping at round {next_round}");
                return;
            }
            _ = sleep(poll_interval) => {}
        }

        let latest_round = match source.latest_round().await {
            Ok(round) => round,
            Err(e) => {
                warn!("RoundEvents: failed to query latest round: {e}");
                return;
            }
        };

        while next_round <= latest_round {
            if cancel_token.is_cancelled() {
                return;
            }

            let events = match source.round_events(next_round).await {
                Ok(events) => events,
                Err(e) => {
                    warn!("RoundEvents: failed to fetch events of round {next_round}: {e}");
                    return;
                }
            };

            let block = BlockEvents {
                round: next_round,
                events,
            };
            if sender.send(block).await.is_err() {
                return;
            }
            next_round = next_round.saturating_add(1);
        }
    }
}
