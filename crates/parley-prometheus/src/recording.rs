// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Metric registration and recording helpers.
//!
//! Uses the metrics-rs facade so any recorder (Prometheus, statsd, etc.)
//! can collect these metrics. Without an installed recorder every call is
//! a no-op.

use metrics::{describe_counter, describe_gauge, describe_histogram};

/// Register all Parley metric descriptions.
///
/// Called once at startup after the recorder is installed.
pub fn register_metrics() {
    describe_counter!("parley_tickets_created_total", "Tickets opened at intake");
    describe_counter!(
        "parley_tickets_completed_total",
        "Tickets delivered and deleted"
    );
    describe_counter!(
        "parley_tickets_failed_total",
        "Tickets abandoned after exhausting AI retries"
    );
    describe_counter!(
        "parley_stale_deferrals_total",
        "Validations that re-enqueued a ticket behind the watermark"
    );
    describe_counter!("parley_ai_retries_total", "Failed AI calls scheduled for retry");
    describe_counter!("parley_step_errors_total", "Step handler errors by action");
    describe_gauge!("parley_active_workers", "Running conversation workers");
    describe_histogram!("parley_ai_latency_seconds", "AI completion latency in seconds");
}

pub fn record_ticket_created() {
    metrics::counter!("parley_tickets_created_total").increment(1);
}

pub fn record_ticket_completed() {
    metrics::counter!("parley_tickets_completed_total").increment(1);
}

pub fn record_ticket_failed() {
    metrics::counter!("parley_tickets_failed_total").increment(1);
}

pub fn record_stale_deferral() {
    metrics::counter!("parley_stale_deferrals_total").increment(1);
}

pub fn record_ai_retry() {
    metrics::counter!("parley_ai_retries_total").increment(1);
}

/// Record a step failure, labelled with the ticket action.
pub fn record_step_error(action: &str) {
    metrics::counter!("parley_step_errors_total", "action" => action.to_string()).increment(1);
}

/// Set the number of running conversation workers.
pub fn set_active_workers(count: usize) {
    metrics::gauge!("parley_active_workers").set(count as f64);
}

/// Record AI completion latency.
pub fn record_ai_latency(seconds: f64) {
    metrics::histogram!("parley_ai_latency_seconds").record(seconds);
}

#[cfg(test)]
mod tests {
    use super::*;
    use metrics_exporter_prometheus::PrometheusBuilder;

    #[test]
    fn helpers_are_noops_without_recorder() {
        record_ticket_created();
        record_step_error("Validate");
        set_active_workers(3);
        record_ai_latency(0.25);
    }

    #[test]
    fn counters_render_in_prometheus_format() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();

        metrics::with_local_recorder(&recorder, || {
            register_metrics();
            record_ticket_created();
            record_ticket_created();
            record_stale_deferral();
            record_step_error("SendReply");
            set_active_workers(2);
        });

        let rendered = handle.render();
        assert!(rendered.contains("parley_tickets_created_total 2"), "{rendered}");
        assert!(rendered.contains("parley_stale_deferrals_total 1"), "{rendered}");
        assert!(
            rendered.contains("parley_step_errors_total{action=\"SendReply\"} 1"),
            "{rendered}"
        );
        assert!(rendered.contains("parley_active_workers 2"), "{rendered}");
    }
}
