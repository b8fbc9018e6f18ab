pub mod server;

use prometheus::{
    CounterVec, Encoder, Gauge, GaugeVec, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder,
};
use tracing::error;

pub const CONSENSUS_ENDPOINT: &str = "consensus";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestStatus {
    Success,
    Failure,
}

impl RequestStatus {
    fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Success => "success",
            RequestStatus::Failure => "failure",
        }
    }
}

pub struct Metrics {
    requests: CounterVec,
    request_duration: HistogramVec,
    balances: GaugeVec,
    allowance_refills: CounterVec,
    allowance_refill_failures: GaugeVec,
    pending_confirmations: Gauge,
    registry: Registry,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let requests = match CounterVec::new(
            Opts::new(
                "faucet_requests",
                "How many requests were processed, partitioned by endpoint and status",
            ),
            &["endpoint", "status"],
        ) {
            Ok(counter) => counter,
            Err(err) => panic!("Failed to create faucet_requests counter: {}", err),
        };

        if let Err(err) = registry.register(Box::new(requests.clone())) {
            error!("Error: Failed to register faucet_requests: {}", err);
        }

        let opts = HistogramOpts::new(
            "faucet_request_durations",
            "How long successful requests take to process, partitioned by endpoint",
        )
        .buckets(vec![
            0.1, 0.25, 0.5, 1.0, 2.0, 4.0, 6.0, 8.0, 10.0, 15.0, 20.0, 30.0, 45.0, 60.0,
        ]);
        let request_duration = match HistogramVec::new(opts, &["endpoint"]) {
            Ok(histogram) => histogram,
            Err(err) => panic!(
                "Failed to create faucet_request_durations histogram: {}",
                err
            ),
        };

        if let Err(err) = registry.register(Box::new(request_duration.clone())) {
            error!(
                "Error: Failed to register faucet_request_durations: {}",
                err
            );
        }

        let balances = match GaugeVec::new(
            Opts::new(
                "faucet_balances",
                "Balances of faucet funds, partitioned by network",
            ),
            &["network"],
        ) {
            Ok(gauge) => gauge,
            Err(err) => panic!("Failed to create faucet_balances gauge: {}", err),
        };

        if let Err(err) = registry.register(Box::new(balances.clone())) {
            error!("Error: Failed to register faucet_balances: {}", err);
        }

        let allowance_refills = match CounterVec::new(
            Opts::new(
                "faucet_allowance_refills",
                "Allowance top-up transactions, partitioned by paratime and status",
            ),
            &["paratime", "status"],
        ) {
            Ok(counter) => counter,
            Err(err) => panic!("Failed to create faucet_allowance_refills counter: {}", err),
        };

        if let Err(err) = registry.register(Box::new(allowance_refills.clone())) {
            error!("Error: Failed to register faucet_allowance_refills: {}", err);
        }

        let allowance_refill_failures = match GaugeVec::new(
            Opts::new(
                "faucet_allowance_refill_failures",
                "Consecutive failed allowance top-ups, partitioned by paratime",
            ),
            &["paratime"],
        ) {
            Ok(gauge) => gauge,
            Err(err) => panic!(
                "Failed to create faucet_allowance_refill_failures gauge: {}",
                err
            ),
        };

        if let Err(err) = registry.register(Box::new(allowance_refill_failures.clone())) {
            error!(
                "Error: Failed to register faucet_allowance_refill_failures: {}",
                err
            );
        }

        let pending_confirmations = match Gauge::new(
            "faucet_pending_confirmations",
            "Deposits submitted to a paratime that are still awaiting their confirming event",
        ) {
            Ok(gauge) => gauge,
            Err(err) => panic!("Failed to create faucet_pending_confirmations gauge: {}", err),
        };

        if let Err(err) = registry.register(Box::new(pending_confirmations.clone())) {
            error!(
                "Error: Failed to register faucet_pending_confirmations: {}",
                err
            );
        }

        Self {
            requests,
            request_duration,
            balances,
            allowance_refills,
            allowance_refill_failures,
            pending_confirmations,
            registry,
        }
    }

    pub fn inc_request(&self, endpoint: &str, status: RequestStatus) {
        if let Ok(metric) = self
            .requests
            .get_metric_with_label_values(&[endpoint, status.as_str()])
        {
            metric.inc();
        } else {
            error!("Failed to increment request counter for endpoint: {}", endpoint);
        }
    }

    pub fn observe_request_duration(&self, endpoint: &str, duration: f64) {
        if let Ok(metric) = self
            .request_duration
            .get_metric_with_label_values(&[endpoint])
        {
            metric.observe(duration);
        } else {
            error!(
                "Failed to observe request duration for endpoint: {}",
                endpoint
            );
        }
    }

    pub fn set_balance(&self, network: &str, balance: f64) {
        if let Ok(metric) = self.balances.get_metric_with_label_values(&[network]) {
            metric.set(balance);
        } else {
            error!("Failed to set balance gauge for network: {}", network);
        }
    }

    pub fn inc_allowance_refill(&self, paratime: &str, status: RequestStatus) {
        if let Ok(metric) = self
            .allowance_refills
            .get_metric_with_label_values(&[paratime, status.as_str()])
        {
            metric.inc();
        } else {
            error!(
                "Failed to increment allowance refill counter for paratime: {}",
                paratime
            );
        }
    }

    #[allow(clippy::cast_precision_loss)]
    pub fn set_allowance_refill_failures(&self, paratime: &str, failures: u64) {
        if let Ok(metric) = self
            .allowance_refill_failures
            .get_metric_with_label_values(&[paratime])
        {
            metric.set(failures as f64);
        } else {
            error!(
                "Failed to set allowance refill failures gauge for paratime: {}",
                paratime
            );
        }
    }

    pub fn inc_pending_confirmations(&self) {
        self.pending_confirmations.inc();
    }

    pub fn dec_pending_confirmations(&self) {
        self.pending_confirmations.dec();
    }

    pub fn gather(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
            error!("Failed to encode metrics: {}", e);
            return String::new();
        }

        match String::from_utf8(buffer) {
            Ok(metrics) => metrics,
            Err(e) => {
                error!("Failed to convert metrics to UTF-8: {}", e);
                String::new()
            }
        }
    }
}
