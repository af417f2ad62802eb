use lazy_static::lazy_static;
use prometheus::{Counter, CounterVec, Encoder, Opts, Registry, TextEncoder};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();
    pub static ref READINGS_TOTAL: Counter = Counter::with_opts(Opts::new(
        "fleet_readings_total",
        "Total readings simulated across the fleet"
    ))
    .unwrap();
    pub static ref ALERTS_TOTAL: CounterVec = CounterVec::new(
        Opts::new("fleet_alerts_total", "Out-of-range readings by kind"),
        &["kind"]
    )
    .unwrap();
    pub static ref SINK_FAILURES_TOTAL: Counter = Counter::with_opts(Opts::new(
        "fleet_sink_failures_total",
        "Total workbook writes that were skipped"
    ))
    .unwrap();
    pub static ref RECORDS_SKIPPED_TOTAL: Counter = Counter::with_opts(Opts::new(
        "fleet_records_skipped_total",
        "Total malformed workbook sheets skipped at load"
    ))
    .unwrap();
}

pub fn init_metrics() -> Result<(), prometheus::Error> {
    REGISTRY.register(Box::new(READINGS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(ALERTS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(SINK_FAILURES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECORDS_SKIPPED_TOTAL.clone()))?;
    Ok(())
}

pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        return format!("# failed to encode metrics: {}\n", e);
    }
    String::from_utf8_lossy(&buffer).into_owned()
}
