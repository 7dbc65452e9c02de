//! Prometheus counters for processed payments

use once_cell::sync::Lazy;
use prometheus::{Counter, Encoder, IntCounterVec, Opts, Registry, TextEncoder};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

pub static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

pub static PAYMENTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let c = IntCounterVec::new(
        Opts::new("vision_pay_payments_total", "Payment processing attempts by outcome"),
        &["outcome"],
    )
    .expect("create payments counter");
    // register, ignore error if already registered
    let _ = REGISTRY.register(Box::new(c.clone()));
    c
});

pub static VOLUME_USD_TOTAL: Lazy<Counter> = Lazy::new(|| {
    let c = Counter::new("vision_pay_volume_usd_total", "USD value of completed payments")
        .expect("create volume counter");
    let _ = REGISTRY.register(Box::new(c.clone()));
    c
});

pub fn record_success(amount_usd: Decimal) {
    PAYMENTS_TOTAL.with_label_values(&["success"]).inc();
    VOLUME_USD_TOTAL.inc_by(amount_usd.to_f64().unwrap_or(0.0));
}

pub fn record_failure(label: &str) {
    PAYMENTS_TOTAL.with_label_values(&[label]).inc();
}

/// Text exposition of every registered metric
pub fn gather_text() -> String {
    Lazy::force(&PAYMENTS_TOTAL);
    Lazy::force(&VOLUME_USD_TOTAL);
    let mut buf = Vec::new();
    let encoder = TextEncoder::new();
    if let Err(e) = encoder.encode(&REGISTRY.gather(), &mut buf) {
        tracing::warn!("metrics encode failed: {}", e);
    }
    String::from_utf8(buf).unwrap_or_default()
}
