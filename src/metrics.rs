use once_cell::sync::Lazy;
use prometheus::{register_int_counter, register_int_counter_vec, IntCounter, IntCounterVec};

// Inbound messages by run outcome
static MESSAGES: Lazy<Option<IntCounterVec>> = Lazy::new(|| {
    register_int_counter_vec!(
        "provisiond_messages_total",
        "Queue messages handled since provisiond started",
        &["outcome"]
    )
    .ok()
});

// Container create calls by result
static CONTAINERS: Lazy<Option<IntCounterVec>> = Lazy::new(|| {
    register_int_counter_vec!(
        "provisiond_containers_total",
        "Container create calls issued to the runtime",
        &["result"]
    )
    .ok()
});

// Hand-offs to the shipper
static SHIPMENTS: Lazy<Option<IntCounter>> = Lazy::new(|| {
    register_int_counter!(
        "provisiond_shipments_total",
        "Assemblies handed off to the shipper"
    )
    .ok()
});

pub fn record_message(outcome: &str) {
    if let Some(counter) = MESSAGES.as_ref() {
        counter.with_label_values(&[outcome]).inc();
    }
}

pub fn record_container(result: &str) {
    if let Some(counter) = CONTAINERS.as_ref() {
        counter.with_label_values(&[result]).inc();
    }
}

pub fn record_shipment() {
    if let Some(counter) = SHIPMENTS.as_ref() {
        counter.inc();
    }
}
