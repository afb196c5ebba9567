//! Business metrics for the reservation lifecycle.
//!
//! Recorded through the `metrics` facade; without an installed recorder
//! every call is a no-op.
//!
//! # Exported Metrics
//!
//! ## Counters
//! - `boxoffice_transactions_total{status}` - Transactions entering each status
//! - `boxoffice_tickets_reserved_total` - Tickets reserved at creation
//! - `boxoffice_tickets_released_total` - Tickets returned by cancellation or compensation
//! - `boxoffice_capacity_rejections_total` - Reservations refused for capacity
//! - `boxoffice_code_collisions_total` - Transaction code collisions retried
//! - `boxoffice_compensations_total{outcome}` - Compensating steps by outcome

use crate::types::TransactionStatus;
use metrics::describe_counter;

/// Register metric descriptions. Call once at startup.
pub fn register_business_metrics() {
    describe_counter!(
        "boxoffice_transactions_total",
        "Transactions entering each status (pending, waiting_verification, success, cancelled)"
    );
    describe_counter!(
        "boxoffice_tickets_reserved_total",
        "Tickets reserved when transactions are created"
    );
    describe_counter!(
        "boxoffice_tickets_released_total",
        "Tickets returned to the available pool"
    );
    describe_counter!(
        "boxoffice_capacity_rejections_total",
        "Reservations refused because capacity would be exceeded"
    );
    describe_counter!(
        "boxoffice_code_collisions_total",
        "Transaction code collisions that triggered regeneration"
    );
    describe_counter!(
        "boxoffice_compensations_total",
        "Compensating steps by outcome (succeeded, failed)"
    );

    tracing::info!("Business metrics registered");
}

/// A transaction entered `status`.
pub fn record_transition(status: TransactionStatus) {
    metrics::counter!("boxoffice_transactions_total", "status" => status.as_str()).increment(1);
}

/// Tickets were reserved.
pub fn record_reserved(quantity: u32) {
    metrics::counter!("boxoffice_tickets_reserved_total").increment(u64::from(quantity));
}

/// Tickets were released.
pub fn record_released(quantity: u32) {
    metrics::counter!("boxoffice_tickets_released_total").increment(u64::from(quantity));
}

/// A reservation was refused for capacity.
pub fn record_capacity_rejection() {
    metrics::counter!("boxoffice_capacity_rejections_total").increment(1);
}

/// A generated code collided.
pub fn record_code_collision() {
    metrics::counter!("boxoffice_code_collisions_total").increment(1);
}

/// A compensating step finished.
pub fn record_compensation(succeeded: bool) {
    let outcome = if succeeded { "succeeded" } else { "failed" };
    metrics::counter!("boxoffice_compensations_total", "outcome" => outcome).increment(1);
}
