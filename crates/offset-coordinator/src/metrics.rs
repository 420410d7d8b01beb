use lazy_static::lazy_static;
use prometheus::{core::Collector, opts, IntCounter, IntCounterVec, IntGauge, Registry};
use tracing::error;

lazy_static! {
    static ref WORKERS_ACTIVE: IntGauge =
        IntGauge::new("gatehouse_workers_active", "Live token-offset workers").unwrap();
    static ref OFFSET_REQUESTS_TOTAL: IntCounter = IntCounter::new(
        "gatehouse_offset_requests_total",
        "Offset requests received by the coordinator",
    )
    .unwrap();
    static ref OFFSET_REPLIES_TOTAL: IntCounterVec = IntCounterVec::new(
        opts!(
            "gatehouse_offset_replies_total",
            "Offset replies delivered grouped by outcome"
        ),
        &["outcome"]
    )
    .unwrap();
}

fn register<C>(registry: &Registry, collector: C)
where
    C: Collector + Clone + Send + Sync + 'static,
{
    if let Err(err) = registry.register(Box::new(collector.clone())) {
        if !matches!(err, prometheus::Error::AlreadyReg) {
            error!(?err, "failed to register coordinator metric");
        }
    }
}

pub fn register_metrics(registry: &Registry) {
    register(registry, WORKERS_ACTIVE.clone());
    register(registry, OFFSET_REQUESTS_TOTAL.clone());
    register(registry, OFFSET_REPLIES_TOTAL.clone());
}

pub fn worker_started() {
    WORKERS_ACTIVE.inc();
}

pub fn worker_finished() {
    WORKERS_ACTIVE.dec();
}

pub fn record_request() {
    OFFSET_REQUESTS_TOTAL.inc();
}

pub fn record_reply(success: bool) {
    let outcome = if success { "success" } else { "failure" };
    OFFSET_REPLIES_TOTAL.with_label_values(&[outcome]).inc();
}

pub fn requests_total() -> u64 {
    OFFSET_REQUESTS_TOTAL.get()
}
