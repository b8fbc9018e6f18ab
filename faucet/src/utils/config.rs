use crate::{
    metrics::CONSENSUS_ENDPOINT,
    oasis::{AccountAddress, ParaTime, quantity::Quantity},
};
use anyhow::Error;
use std::{net::SocketAddr, str::FromStr, time::Duration};
use tracing::{info, warn};

pub struct Config {
    pub node_rpc_url: String,
    pub node_rpc_timeout: Duration,
    pub node_rpc_api_key: Option<String>,
    pub signer_url: String,
    pub signer_timeout: Duration,
    pub signer_public_key: String,
    pub faucet_address: AccountAddress,
    pub chain_context: Option<String>,
    pub paratimes: Vec<ParaTime>,
    pub target_allowance: Quantity,
    pub consensus_decimals: u8,
    pub refill_interval: Duration,
    pub confirmation_timeout: Duration,
    pub connect_retry_delay: Duration,
    pub connect_max_attempts: u64,
    pub event_poll_interval: Duration,
    pub request_queue_size: usize,
    pub allowance_alert_threshold: u64,
    pub listen_addr: SocketAddr,
    pub metrics_port: u16,
}

fn parse_env<T>(name: &str, default: &str) -> Result<T, Error>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let value = std::env::var(name).unwrap_or_else(|_| default.to_string());
    value
        .trim()
        .parse::<T>()
        .map_err(|e| anyhow::anyhow!("{name} has invalid value '{value}': {e}"))
}

fn required_env(name: &str) -> Result<String, Error> {
    match std::env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(value.trim().to_string()),
        _ => Err(anyhow::anyhow!("{name} env var is required")),
    }
}

/// Parses `name:id:bridge_address:decimals` entries separated by commas.
pub fn parse_paratimes(value: &str) -> Result<Vec<ParaTime>, Error> {
    let mut paratimes: Vec<ParaTime> = Vec::new();
    for entry in value.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let parts: Vec<&str> = entry.split(':').map(str::trim).collect();
        let [name, id, bridge_address, decimals] = parts.as_slice() else {
            anyhow::bail!("paratime entry '{entry}' must be name:id:bridge_address:decimals");
        };

        if name.is_empty() || name.eq_ignore_ascii_case(CONSENSUS_ENDPOINT) {
            anyhow::bail!("paratime entry '{entry}' has a reserved or empty name");
        }
        if id.len() != 64 || hex::decode(id).is_err() {
            anyhow::bail!("paratime {name} has invalid runtime id '{id}'");
        }
        let decimals = decimals
            .parse::<u8>()
            .map_err(|e| anyhow::anyhow!("paratime {name} has invalid decimals: {e}"))?;
        // Names are matched case-insensitively by the front door.
        if paratimes.iter().any(|p| p.name.eq_ignore_ascii_case(name)) {
            anyhow::bail!("paratime {name} is configured twice");
        }

        paratimes.push(ParaTime {
            name: name.to_string(),
            id: id.to_ascii_lowercase(),
            bridge_address: AccountAddress::new(bridge_address),
            decimals,
        });
    }
    Ok(paratimes)
}

impl Config {
    pub fn read_env_variables() -> Result<Self, Error> {
        // Load environment variables from .env file
        dotenvy::dotenv().ok();

        let node_rpc_url = std::env::var("NODE_RPC_URL").unwrap_or_else(|_| {
            warn!("No node RPC URL found in NODE_RPC_URL env var, using default");
            "http://127.0.0.1:8545".to_string()
        });
        let node_rpc_api_key = std::env::var("NODE_RPC_API_KEY").ok();

        let signer_url = std::env::var("SIGNER_URL").unwrap_or_else(|_| {
            warn!("No signer URL found in SIGNER_URL env var, using default");
            "http://127.0.0.1:9000".to_string()
        });
        let signer_public_key = required_env("SIGNER_PUBLIC_KEY")?;
        let faucet_address = AccountAddress::new(&required_env("FAUCET_ADDRESS")?);

        let chain_context = std::env::var("CHAIN_CONTEXT")
            .ok()
            .filter(|c| !c.trim().is_empty());
        if chain_context.is_none() {
            warn!("CHAIN_CONTEXT is not set, the node's chain context will not be verified");
        }

        let paratimes = parse_paratimes(&std::env::var("PARATIMES").unwrap_or_default())?;
        if paratimes.is_empty() {
            warn!("No paratimes configured in PARATIMES env var, only consensus funding is available");
        }

        let target_allowance: String = parse_env("TARGET_ALLOWANCE", "0")?;
        let target_allowance = Quantity::from_str_radix(&target_allowance, 10)
            .map_err(|e| anyhow::anyhow!("TARGET_ALLOWANCE must be a number: {e}"))?;

        let request_queue_size: usize = parse_env("REQUEST_QUEUE_SIZE", "100")?;
        if request_queue_size == 0 {
            anyhow::bail!("REQUEST_QUEUE_SIZE must be a positive number");
        }

        let refill_interval_sec: u64 = parse_env("REFILL_INTERVAL_SEC", "3600")?;
        if refill_interval_sec == 0 {
            anyhow::bail!("REFILL_INTERVAL_SEC must be a positive number");
        }

        let config = Self {
            node_rpc_url,
            node_rpc_timeout: Duration::from_millis(parse_env("NODE_RPC_TIMEOUT_MS", "10000")?),
            node_rpc_api_key,
            signer_url,
            signer_timeout: Duration::from_millis(parse_env("SIGNER_TIMEOUT_MS", "5000")?),
            signer_public_key,
            faucet_address,
            chain_context,
            paratimes,
            target_allowance,
            consensus_decimals: parse_env("CONSENSUS_DECIMALS", "9")?,
            refill_interval: Duration::from_secs(refill_interval_sec),
            confirmation_timeout: Duration::from_secs(parse_env("CONFIRMATION_TIMEOUT_SEC", "60")?),
            connect_retry_delay: Duration::from_secs(parse_env("CONNECT_RETRY_DELAY_SEC", "15")?),
            connect_max_attempts: parse_env("CONNECT_MAX_ATTEMPTS", "0")?,
            event_poll_interval: Duration::from_millis(parse_env("EVENT_POLL_INTERVAL_MS", "1000")?),
            request_queue_size,
            allowance_alert_threshold: parse_env("ALLOWANCE_ALERT_THRESHOLD", "3")?,
            listen_addr: parse_env("LISTEN_ADDR", "0.0.0.0:8080")?,
            metrics_port: parse_env("METRICS_PORT", "9898")?,
        };

        info!(
            r#"
Configuration:
Node RPC URL: {},
Node RPC timeout: {}ms
Signer URL: {},
Signer timeout: {}ms
Signer public key: {}
Faucet address: {}
Chain context: {:?}
ParaTimes: {:#?}
Target allowance: {}
Consensus decimals: {}
Refill interval: {}s
Confirmation timeout: {}s
Connect retry delay: {}s
Connect max attempts: {}
Event poll interval: {}ms
Request queue size: {}
Allowance alert threshold: {}
Listen address: {}
Metrics port: {}
"#,
            config.node_rpc_url,
            config.node_rpc_timeout.as_millis(),
            config.signer_url,
            config.signer_timeout.as_millis(),
            config.signer_public_key,
            config.faucet_address,
            config.chain_context,
            config.paratimes,
            config.target_allowance,
            config.consensus_decimals,
            config.refill_interval.as_secs(),
            config.confirmation_timeout.as_secs(),
            config.connect_retry_delay.as_secs(),
            config.connect_max_attempts,
            config.event_poll_interval.as_millis(),
            config.request_queue_size,
            config.allowance_alert_threshold,
            config.listen_addr,
            config.metrics_port,
        );

        Ok(config)
    }
}
