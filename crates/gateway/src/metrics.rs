use lazy_static::lazy_static;
use prometheus::{Encoder, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use std::sync::Once;

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();
    pub static ref TOOL_CALLS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("gateway_tool_calls_total", "Tool calls handled, by tool and outcome."),
        &["tool", "outcome"]
    )
    .expect("valid tool call metric");
    pub static ref POLL_ATTEMPTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("gateway_poll_attempts_total", "Provider polls issued, by lifecycle phase."),
        &["phase"]
    )
    .expect("valid poll metric");
    pub static ref LEDGER_RECORDS: IntGauge =
        IntGauge::new("gateway_ledger_records", "Records currently held in the action ledger.")
            .expect("valid ledger metric");
}

static REGISTER: Once = Once::new();

/// Registers the gateway metrics with [`REGISTRY`]. Safe to call repeatedly.
pub fn register_metrics() {
    REGISTER.call_once(|| {
        let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
            Box::new(TOOL_CALLS_TOTAL.clone()),
            Box::new(POLL_ATTEMPTS_TOTAL.clone()),
            Box::new(LEDGER_RECORDS.clone()),
        ];
        for collector in collectors {
            if let Err(e) = REGISTRY.register(collector) {
                tracing::warn!("Failed to register metric: {}", e);
            }
        }
    });
}

// Function to gather metrics for exposition
pub fn gather_metrics() -> crate::Result<String> {
    register_metrics();

    let mut buffer = vec![];
    let encoder = TextEncoder::new();
    encoder.encode(&REGISTRY.gather(), &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| crate::Error::Internal(e.to_string()))
}
