use crate::metrics::Metrics;
use std::{net::SocketAddr, sync::Arc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;
use warp::{Filter, Rejection, Reply};

const CONTENT_TYPE: &str = "text/plain; version=0.0.4";

/// `GET /metrics` in the Prometheus text format.
pub fn metrics_route(
    metrics: Arc<Metrics>,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    warp::get().and(warp::path!("metrics")).map(move || {
        warp::reply::with_header(metrics.gather(), "Content-Type", CONTENT_TYPE)
    })
}

pub fn serve_metrics(
    metrics: Arc<Metrics>,
    port: u16,
    cancel_token: CancellationToken,
) -> JoinHandle<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tokio::spawn(async move {
        let (addr, server) =
            warp::serve(metrics_route(metrics)).bind_with_graceful_shutdown(addr, async move {
                cancel_token.cancelled().await;
                info!("Shutdown signal received, stopping metrics server...");
            });

        info!("Metrics server listening on {}", addr);
        server.await;
    })
}
