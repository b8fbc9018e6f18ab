use crate::oasis::ModuleError;

/// Step of the sign-and-submit pipeline that failed. Nothing is accepted by the node unless the
/// pipeline returns `Ok`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionError {
    NonceQueryFailed,
    EstimationFailed,
    ChainContextQueryFailed,
    EncodingFailed,
    SigningFailed,
    WatchEventsFailed,
    SubmissionFailed,
    CheckTxFailed(ModuleError),
}

impl std::fmt::Display for TransactionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl std::error::Error for TransactionError {}
