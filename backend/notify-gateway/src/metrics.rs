use actix_web::HttpResponse;
use once_cell::sync::Lazy;
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, TextEncoder};

static ENVELOPES_ENQUEUED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    let counter = IntCounter::new(
        "notify_gateway_envelopes_enqueued_total",
        "Envelopes accepted into the notification queue",
    )
    .expect("failed to create notify_gateway_envelopes_enqueued_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register notify_gateway_envelopes_enqueued_total");
    counter
});

static ENVELOPES_DELIVERED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    let counter = IntCounter::new(
        "notify_gateway_envelopes_delivered_total",
        "Envelopes delivered to at least one client",
    )
    .expect("failed to create notify_gateway_envelopes_delivered_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register notify_gateway_envelopes_delivered_total");
    counter
});

static ENVELOPES_RETRIED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    let counter = IntCounter::new(
        "notify_gateway_envelopes_retried_total",
        "Failed delivery attempts requeued for retry",
    )
    .expect("failed to create notify_gateway_envelopes_retried_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register notify_gateway_envelopes_retried_total");
    counter
});

static ENVELOPES_DROPPED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "notify_gateway_envelopes_dropped_total",
            "Envelopes dropped without delivery, by reason",
        ),
        &["reason"],
    )
    .expect("failed to create notify_gateway_envelopes_dropped_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register notify_gateway_envelopes_dropped_total");
    counter
});

static CONNECTED_CLIENTS: Lazy<IntGauge> = Lazy::new(|| {
    let gauge = IntGauge::new(
        "notify_gateway_connected_clients",
        "Live WebSocket consumers in the client registry",
    )
    .expect("failed to create notify_gateway_connected_clients");
    prometheus::default_registry()
        .register(Box::new(gauge.clone()))
        .expect("failed to register notify_gateway_connected_clients");
    gauge
});

pub fn envelope_enqueued() {
    ENVELOPES_ENQUEUED_TOTAL.inc();
}

pub fn envelope_delivered() {
    ENVELOPES_DELIVERED_TOTAL.inc();
}

pub fn envelope_retried() {
    ENVELOPES_RETRIED_TOTAL.inc();
}

/// reason: "capacity", "evicted", "expired", "retries_exhausted"
pub fn envelope_dropped(reason: &str) {
    ENVELOPES_DROPPED_TOTAL.with_label_values(&[reason]).inc();
}

pub fn client_connected() {
    CONNECTED_CLIENTS.inc();
}

pub fn client_disconnected() {
    CONNECTED_CLIENTS.dec();
}

pub async fn serve_metrics() -> HttpResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();

    let mut buffer = Vec::new();
    if let Err(err) = encoder.encode(&metric_families, &mut buffer) {
        return HttpResponse::InternalServerError().body(err.to_string());
    }

    HttpResponse::Ok()
        .content_type(encoder.format_type())
        .body(buffer)
}
