use crate::{
    metrics::CONSENSUS_ENDPOINT,
    oasis::{AccountAddress, BaseUnits, ParaTime, quantity::Quantity},
};
use std::fmt;

/// Ledger a request is paid out on, with the amount in that ledger's denomination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FundingTarget {
    Consensus { amount: Quantity },
    ParaTime { paratime: ParaTime, amount: BaseUnits },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FundingRequest {
    pub account: AccountAddress,
    pub target: FundingTarget,
}

impl FundingRequest {
    pub fn consensus(account: AccountAddress, amount: Quantity) -> Self {
        Self {
            account,
            target: FundingTarget::Consensus { amount },
        }
    }

    pub fn paratime(account: AccountAddress, paratime: ParaTime, amount: BaseUnits) -> Self {
        Self {
            account,
            target: FundingTarget::ParaTime { paratime, amount },
        }
    }

    /// Label used for logs and request metrics.
    pub fn endpoint(&self) -> &str {
        match &self.target {
            FundingTarget::Consensus { .. } => CONSENSUS_ENDPOINT,
            FundingTarget::ParaTime { paratime, .. } => &paratime.name,
        }
    }
}

impl fmt::Display for FundingRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.target {
            FundingTarget::Consensus { amount } => {
                write!(f, "{} base units to {} on consensus", amount, self.account)
            }
            FundingTarget::ParaTime { paratime, amount } => {
                write!(f, "{} to {} on {}", amount, self.account, paratime.name)
            }
        }
    }
}
