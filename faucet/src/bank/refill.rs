use crate::{
    metrics::{CONSENSUS_ENDPOINT, Metrics, RequestStatus},
    oasis::{
        NodeConnection, ParaTime,
        quantity::{self, Quantity},
    },
    shared::signer::TransactionSigner,
    transactions::TransactionSubmitter,
};
use std::{collections::HashMap, sync::Arc};
use tracing::{error, info, warn};

/// What one refill pass did, per paratime.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RefillSummary {
    pub account_unavailable: bool,
    pub topped_up: Vec<(String, Quantity)>,
    pub sufficient: Vec<String>,
    pub failed: Vec<String>,
}

/// Keeps the allowance of every paratime bridge at the configured target.
pub struct AllowanceRefiller {
    paratimes: Vec<ParaTime>,
    target_allowance: Quantity,
    consensus_decimals: u8,
    alert_threshold: u64,
    consecutive_failures: HashMap<String, u64>,
    metrics: Arc<Metrics>,
}

impl AllowanceRefiller {
    pub fn new(
        paratimes: Vec<ParaTime>,
        target_allowance: Quantity,
        consensus_decimals: u8,
        alert_threshold: u64,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            paratimes,
            target_allowance,
            consensus_decimals,
            alert_threshold,
            consecutive_failures: HashMap::new(),
            metrics,
        }
    }

    pub fn consecutive_failures(&self, paratime: &str) -> u64 {
        self.consecutive_failures.get(paratime).copied().unwrap_or(0)
    }

    /// Tops up every paratime allowance that is below target. Failures are logged and skipped.
    pub async fn refill_allowances<N: NodeConnection, S: TransactionSigner>(
        &mut self,
        submitter: &TransactionSubmitter<N, S>,
    ) -> RefillSummary {
        info!("refill: refilling allowances");
        let mut summary = RefillSummary::default();

        let account = match submitter
            .node()
            .consensus_account(submitter.funding_address())
            .await
        {
            Ok(account) => account,
            Err(e) => {
                error!("refill: failed to query funding account: {e}");
                summary.account_unavailable = true;
                return summary;
            }
        };
        self.metrics.set_balance(
            CONSENSUS_ENDPOINT,
            quantity::to_f64(account.balance, self.consensus_decimals),
        );

        for paratime in &self.paratimes {
            let allowance = account.allowance(&paratime.bridge_address);
            self.metrics.set_balance(
                &paratime.name,
                quantity::to_f64(allowance, self.consensus_decimals),
            );
            info!("refill: {} allowance: {}", paratime.name, allowance);

            let shortfall = self.target_allowance.saturating_sub(allowance);
            if shortfall.is_zero() {
                info!(
                    "refill: paratime {} already has sufficient allowance: {}",
                    paratime.name, allowance
                );
                summary.sufficient.push(paratime.name.clone());
                continue;
            }

            match submitter
                .submit_allowance_increase(&paratime.bridge_address, shortfall)
                .await
            {
                Ok(()) => {
                    info!("refill: increased {} allowance by {}", paratime.name, shortfall);
                    self.metrics
                        .inc_allowance_refill(&paratime.name, RequestStatus::Success);
                    self.consecutive_failures.insert(paratime.name.clone(), 0);
                    self.metrics.set_allowance_refill_failures(&paratime.name, 0);
                    summary.topped_up.push((paratime.name.clone(), shortfall));
                }
                Err(e) => {
                    warn!("refill: failed to add allowance to paratime {}: {e}", paratime.name);
                    self.metrics
                        .inc_allowance_refill(&paratime.name, RequestStatus::Failure);
                    let failures = self
                        .consecutive_failures
                        .entry(paratime.name.clone())
                        .or_insert(0);
                    *failures = failures.saturating_add(1);
                    self.metrics
                        .set_allowance_refill_failures(&paratime.name, *failures);
                    if self.alert_threshold > 0 && *failures >= self.alert_threshold {
                        error!(
                            "refill: persistent low allowance on {}: {} consecutive top-ups failed, allowance {} of target {}",
                            paratime.name, failures, allowance, self.target_allowance
                        );
                    }
                    summary.failed.push(paratime.name.clone());
                }
            }
        }

        summary
    }
}
