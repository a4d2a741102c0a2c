//! Telemetry utilities for operation timing and audit spans.

use std::time::Instant;

/// Guard for timing an authority operation and recording metrics.
///
/// Records operation latency when dropped.
pub struct OperationTimer {
    operation: &'static str,
    start: Instant,
}

impl OperationTimer {
    /// Start timing an operation.
    pub fn new(operation: &'static str) -> Self {
        Self {
            operation,
            start: Instant::now(),
        }
    }
}

impl Drop for OperationTimer {
    fn drop(&mut self) {
        let duration = self.start.elapsed().as_secs_f64();
        crate::metrics::record_operation(self.operation, duration);
    }
}

/// Standardized span constructors for authorization audit trails.
pub mod spans {
    use tracing::{Span, info_span};

    /// Span for one grant attempt.
    pub fn grant(request_id: &str, capability_id: &str) -> Span {
        info_span!("grant", request_id = %request_id, capability_id = %capability_id)
    }

    /// Span for a capability request submission.
    pub fn request(requester: &str, capability: &str) -> Span {
        info_span!("request", requester = %requester, capability = %capability)
    }
}
