use std::sync::OnceLock;
use std::time::Duration;

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder,
};

static REGISTRY: OnceLock<Registry> = OnceLock::new();
static HTTP_REQUESTS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();
static HTTP_REQUEST_DURATION_SECONDS: OnceLock<HistogramVec> = OnceLock::new();
static CLAIM_OUTCOMES_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();
static LEDGER_CALL_DURATION_SECONDS: OnceLock<HistogramVec> = OnceLock::new();
static SPLIT_BRAIN_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();
static RECONCILIATIONS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

fn registry() -> &'static Registry {
    REGISTRY.get_or_init(Registry::new)
}

fn register_collector<T>(collector: T) -> T
where
    T: prometheus::core::Collector + Clone + 'static,
{
    let _ = registry().register(Box::new(collector.clone()));
    collector
}

fn http_requests_total() -> &'static IntCounterVec {
    HTTP_REQUESTS_TOTAL.get_or_init(|| {
        register_collector(
            IntCounterVec::new(
                Opts::new("swiftclaim_http_requests_total", "HTTP request count."),
                &["route", "method", "status"],
            )
            .expect("create swiftclaim_http_requests_total"),
        )
    })
}

fn http_request_duration_seconds() -> &'static HistogramVec {
    HTTP_REQUEST_DURATION_SECONDS.get_or_init(|| {
        register_collector(
            HistogramVec::new(
                HistogramOpts::new(
                    "swiftclaim_http_request_duration_seconds",
                    "HTTP request duration in seconds.",
                )
                .buckets(vec![
                    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0,
                ]),
                &["route", "method", "outcome"],
            )
            .expect("create swiftclaim_http_request_duration_seconds"),
        )
    })
}

fn claim_outcomes_total() -> &'static IntCounterVec {
    CLAIM_OUTCOMES_TOTAL.get_or_init(|| {
        register_collector(
            IntCounterVec::new(
                Opts::new(
                    "swiftclaim_claim_outcomes_total",
                    "Claim lifecycle operations by outcome.",
                ),
                &["operation", "outcome"],
            )
            .expect("create swiftclaim_claim_outcomes_total"),
        )
    })
}

fn ledger_call_duration_seconds() -> &'static HistogramVec {
    LEDGER_CALL_DURATION_SECONDS.get_or_init(|| {
        register_collector(
            HistogramVec::new(
                HistogramOpts::new(
                    "swiftclaim_ledger_call_duration_seconds",
                    "Ledger contract call duration in seconds, including confirmation.",
                )
                .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0]),
                &["function", "outcome"],
            )
            .expect("create swiftclaim_ledger_call_duration_seconds"),
        )
    })
}

fn split_brain_total() -> &'static IntCounterVec {
    SPLIT_BRAIN_TOTAL.get_or_init(|| {
        register_collector(
            IntCounterVec::new(
                Opts::new(
                    "swiftclaim_split_brain_total",
                    "Ledger writes that landed without a matching committed local record.",
                ),
                &["operation"],
            )
            .expect("create swiftclaim_split_brain_total"),
        )
    })
}

fn reconciliations_total() -> &'static IntCounterVec {
    RECONCILIATIONS_TOTAL.get_or_init(|| {
        register_collector(
            IntCounterVec::new(
                Opts::new(
                    "swiftclaim_reconciliations_total",
                    "Pending ledger submissions examined by the reconciler.",
                ),
                &["outcome"],
            )
            .expect("create swiftclaim_reconciliations_total"),
        )
    })
}

pub fn observe_http_request(route: &str, method: &str, status: u16, duration: Duration) {
    let status_str = status.to_string();
    http_requests_total()
        .with_label_values(&[route, method, status_str.as_str()])
        .inc();

    let outcome = if (200..400).contains(&status) {
        "success"
    } else {
        "error"
    };
    http_request_duration_seconds()
        .with_label_values(&[route, method, outcome])
        .observe(duration.as_secs_f64());
}

pub fn observe_claim_outcome(operation: &str, outcome: &str) {
    claim_outcomes_total()
        .with_label_values(&[operation, outcome])
        .inc();
}

pub fn observe_ledger_call(function: &str, outcome: &str, duration: Duration) {
    ledger_call_duration_seconds()
        .with_label_values(&[function, outcome])
        .observe(duration.as_secs_f64());
}

pub fn inc_split_brain(operation: &str) {
    split_brain_total().with_label_values(&[operation]).inc();
}

pub fn observe_reconciliation(outcome: &str) {
    reconciliations_total().with_label_values(&[outcome]).inc();
}

pub fn render() -> Result<(Vec<u8>, String), prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = registry().gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok((buffer, encoder.format_type().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rendered_text_contains_observed_series() {
        observe_claim_outcome("submit", "ok");
        inc_split_brain("verify");
        observe_ledger_call("submitClaim", "ok", Duration::from_millis(42));

        let (body, content_type) = render().expect("render should succeed");
        let text = String::from_utf8(body).expect("metrics are utf-8");

        assert!(content_type.starts_with("text/plain"));
        assert!(text.contains("swiftclaim_claim_outcomes_total{operation=\"submit\",outcome=\"ok\"}"));
        assert!(text.contains("swiftclaim_split_brain_total{operation=\"verify\"}"));
        assert!(text.contains("swiftclaim_ledger_call_duration_seconds_count{function=\"submitClaim\",outcome=\"ok\"}"));
    }
}
