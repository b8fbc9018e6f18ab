use std::{future::Future, time::Duration};
use tokio_util::sync::CancellationToken;

/// Fixed delay retry schedule.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub delay: Duration,
    /// Zero means retry until cancelled.
    pub max_attempts: u64,
}

impl RetryPolicy {
    fn exhausted(&self, attempts: u64) -> bool {
        self.max_attempts != 0 && attempts >= self.max_attempts
    }
}

#[derive(Debug)]
pub enum RetryError {
    Cancelled,
    Exhausted { attempts: u64, last_error: anyhow::Error },
}

impl std::fmt::Display for RetryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RetryError::Cancelled => write!(f, "Cancelled"),
            RetryError::Exhausted {
                attempts,
                last_error,
            } => write!(f, "Gave up after {attempts} attempts, last error: {last_error}"),
        }
    }
}

impl std::error::Error for RetryError {}

/// Retries `operation` with a fixed delay between attempts until it succeeds, the attempt bound
/// of `policy` is reached or `cancel_token` is cancelled.
///
/// `on_error` is called with the attempt number and error of every failed attempt.
pub async fn retry_with_fixed_delay<T, E, F, Fut>(
    operation: F,
    policy: RetryPolicy,
    cancel_token: &CancellationToken,
    mut on_error: impl FnMut(u64, &E),
) -> Result<T, RetryError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempts: u64 = 0;

    loop {
        if cancel_token.is_cancelled() {
            return Err(RetryError::Cancelled);
        }

        let result = tokio::select! {
            _ = cancel_token.cancelled() => return Err(RetryError::Cancelled),
            result = operation() => result,
        };
        attempts = attempts.saturating_add(1);

        match result {
            Ok(value) => return Ok(value),
            Err(e) => {
                on_error(attempts, &e);
                if policy.exhausted(attempts) {
                    return Err(RetryError::Exhausted {
                        attempts,
                        last_error: anyhow::anyhow!("{}", e),
                    });
                }
            }
        }

        tokio::select! {
            _ = cancel_token.cancelled() => return Err(RetryError::Cancelled),
            _ = tokio::time::sleep(policy.delay) => {}
        }
    }
}
