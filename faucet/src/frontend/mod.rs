use crate::{
    bank::{
        ingress::{AdmissionError, FaucetHandle},
        request::FundingRequest,
    },
    oasis::{AccountAddress, BaseUnits, ParaTime, quantity::parse_denominated},
};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, net::SocketAddr, sync::Arc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use warp::{Filter, Rejection, Reply, http::StatusCode};

const MAX_FORM_BYTES: u64 = 4096;

/// Form of `POST /api/v1/fund`. An empty paratime selects the consensus ledger.
#[derive(Debug, Default, Deserialize)]
pub struct FundForm {
    #[serde(default)]
    pub paratime: String,
    #[serde(default)]
    pub account: String,
    #[serde(default)]
    pub amount: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct FundResponse {
    result: String,
}

pub struct Frontend {
    handle: FaucetHandle,
    paratimes: HashMap<String, ParaTime>,
    consensus_decimals: u8,
}

impl Frontend {
    pub fn new(handle: FaucetHandle, paratimes: &[ParaTime], consensus_decimals: u8) -> Self {
        Self {
            handle,
            paratimes: paratimes
                .iter()
                .map(|p| (p.name.to_ascii_lowercase(), p.clone()))
                .collect(),
            consensus_decimals,
        }
    }

    fn parse_request(&self, form: &FundForm) -> Result<FundingRequest, String> {
        let paratime_name = form.paratime.trim().to_ascii_lowercase();
        let account = form.account.trim();
        let amount = form.amount.trim();

        if account.is_empty() {
            return Err("failed to fund account: invalid account: ''".to_string());
        }
        let account = AccountAddress::new(account);

        if paratime_name.is_empty() {
            let amount = parse_denominated(amount, self.consensus_decimals).map_err(|e| {
                warn!("frontend: invalid amount '{amount}': {e}");
                format!("failed to fund account: invalid amount: '{amount}'")
            })?;
            return Ok(FundingRequest::consensus(account, amount));
        }

        let Some(paratime) = self.paratimes.get(&paratime_name) else {
            warn!("frontend: invalid paratime: '{}'", form.paratime);
            return Err(format!(
                "failed to fund account: invalid paratime: '{}'",
                form.paratime.trim()
            ));
        };
        let amount = parse_denominated(amount, paratime.decimals).map_err(|e| {
            warn!("frontend: invalid amount '{amount}': {e}");
            format!("failed to fund account: invalid amount: '{amount}'")
        })?;
        Ok(FundingRequest::paratime(
            account,
            paratime.clone(),
            BaseUnits::native(amount),
        ))
    }

    fn fund(&self, form: FundForm) -> (StatusCode, String) {
        let request = match self.parse_request(&form) {
            Ok(request) => request,
            Err(result) => return (StatusCode::BAD_REQUEST, result),
        };

        let description = request.to_string();
        match self.handle.submit(request) {
            Ok(()) => {
                info!("frontend: request enqueued: {}", description);
                (StatusCode::OK, "funding request submitted".to_string())
            }
            Err(AdmissionError::DuplicateInFlight) => (
                StatusCode::FORBIDDEN,
                "funding request already pending, try again later".to_string(),
            ),
            Err(e @ (AdmissionError::QueueFull | AdmissionError::ShuttingDown)) => {
                warn!("frontend: request {} not admitted: {}", description, e);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "temporary failure, try again later".to_string(),
                )
            }
        }
    }
}

pub fn fund_route(
    frontend: Arc<Frontend>,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    warp::post()
        .and(warp::path!("api" / "v1" / "fund"))
        .and(warp::body::content_length_limit(MAX_FORM_BYTES))
        .and(warp::body::form())
        .map(move |form: FundForm| {
            let (status, result) = frontend.fund(form);
            warp::reply::with_status(warp::reply::json(&FundResponse { result }), status)
        })
}

/// Starts serving the front door once the bank is ready.
pub fn serve_frontend(
    frontend: Arc<Frontend>,
    addr: SocketAddr,
    cancel_token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            _ = cancel_token.cancelled() => return,
            ready = frontend.handle.wait_ready() => {
                if let Err(e) = ready {
                    warn!("frontend: not starting, {e}");
                    return;
                }
            }
        }
        info!("frontend: bank ready, starting HTTP server");

        let server = warp::serve(fund_route(frontend)).try_bind_with_graceful_shutdown(
            addr,
            async move {
                cancel_token.cancelled().await;
                info!("frontend: shutdown signal received, stopping HTTP server...");
            },
        );
        match server {
            Ok((addr, server)) => {
                info!("frontend: listening on {}", addr);
                server.await;
            }
            Err(e) => error!("frontend: failed to start HTTP server on {}: {}", addr, e),
        }
    })
}
