//! Operation metrics
//!
//! Counters go through the `metrics` facade. Installing a recorder/exporter is
//! left to the embedding application; without one these calls are no-ops.

use metrics::counter;

/// Record the outcome of a propagating engine operation
pub fn record_operation(operation: &'static str, success: bool) {
    counter!("dockhand_operations_total", "operation" => operation).increment(1);

    if !success {
        counter!("dockhand_operation_failures_total", "operation" => operation).increment(1);
    }
}

/// Record an error discarded by a best-effort cleanup operation
pub fn record_suppressed(operation: &'static str) {
    counter!("dockhand_suppressed_errors_total", "operation" => operation).increment(1);
}
