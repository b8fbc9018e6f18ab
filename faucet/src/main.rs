use anyhow::Error;
use oasis_faucet::{
    bank::{Bank, BankConfig, address_lock::AddressLockTable},
    frontend::{self, Frontend},
    metrics::{self, Metrics},
    oasis::json_rpc::JsonRpcConnector,
    shared::web3signer::RemoteSigner,
    utils::{config::Config, logging::init_logging, retry::RetryPolicy},
};
use std::{sync::Arc, time::Duration};
use tokio::signal::unix::{SignalKind, signal};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<(), Error> {
    init_logging();

    info!("🚰 Starting Oasis faucet v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::read_env_variables()?;
    let cancel_token = CancellationToken::new();

    let metrics = Arc::new(Metrics::new());

    // Set up panic hook to cancel token on panic
    let panic_cancel_token = cancel_token.clone();
    std::panic::set_hook(Box::new(move |panic_info| {
        error!("Panic occurred: {:?}", panic_info);
        panic_cancel_token.cancel();
        info!("Cancellation token triggered, initiating shutdown...");
    }));

    let signer = Arc::new(
        RemoteSigner::new(
            &config.signer_url,
            config.signer_timeout,
            &config.signer_public_key,
            config.faucet_address.clone(),
        )
        .map_err(|e| anyhow::anyhow!("Failed to create RemoteSigner: {}", e))?,
    );

    let connector = JsonRpcConnector::new(
        &config.node_rpc_url,
        config.node_rpc_timeout,
        config.node_rpc_api_key.clone(),
        config.chain_context.clone(),
        config.event_poll_interval,
    );

    let (bank, handle) = Bank::new(
        connector,
        signer,
        BankConfig {
            paratimes: config.paratimes.clone(),
            target_allowance: config.target_allowance,
            consensus_decimals: config.consensus_decimals,
            refill_interval: config.refill_interval,
            confirmation_timeout: config.confirmation_timeout,
            connect_retry: RetryPolicy {
                delay: config.connect_retry_delay,
                max_attempts: config.connect_max_attempts,
            },
            allowance_alert_threshold: config.allowance_alert_threshold,
            request_queue_size: config.request_queue_size,
        },
        AddressLockTable::new(),
        metrics.clone(),
        cancel_token.clone(),
    );
    let confirmations = bank.confirmations();

    let bank_cancel_token = cancel_token.clone();
    let bank_task = tokio::spawn(async move {
        if let Err(e) = bank.run().await {
            error!("bank: {}", e);
            bank_cancel_token.cancel();
        }
    });

    metrics::server::serve_metrics(metrics.clone(), config.metrics_port, cancel_token.clone());

    let frontend_task = frontend::serve_frontend(
        Arc::new(Frontend::new(
            handle,
            &config.paratimes,
            config.consensus_decimals,
        )),
        config.listen_addr,
        cancel_token.clone(),
    );

    wait_for_the_termination(cancel_token).await?;

    if let Err(e) = bank_task.await {
        error!("bank task failed: {}", e);
    }
    if let Err(e) = frontend_task.await {
        error!("frontend task failed: {}", e);
    }

    // Pending deposits can take at most one confirmation timeout to resolve.
    info!(
        "Waiting up to {}s for {} pending confirmations",
        config.confirmation_timeout.as_secs(),
        confirmations.len()
    );
    if tokio::time::timeout(
        config.confirmation_timeout.saturating_add(Duration::from_secs(1)),
        confirmations.wait(),
    )
    .await
    .is_err()
    {
        warn!(
            "Exiting with {} confirmations still pending",
            confirmations.len()
        );
    }

    info!("Faucet stopped");
    Ok(())
}

async fn wait_for_the_termination(cancel_token: CancellationToken) -> Result<(), Error> {
    info!("Starting signal handler...");
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("Failed to set up SIGTERM handler: {}", e))?;
    tokio::select! {
        _ = sigterm.recv() => {
            info!("Received SIGTERM, shutting down...");
            cancel_token.cancel();
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
            cancel_token.cancel();
        }
        _ = cancel_token.cancelled() => {
            info!("Shutdown signal received, exiting faucet...");
        }
    }
    Ok(())
}
